//! Fixed-size assignment cursor: UI-facing bookkeeping of which display
//! card is showing which detected individual.
//!
//! Slot indices are stable because each index is visually bound to a card
//! position. The cursor mirrors the persisted occupancy records but is
//! never authoritative: clearing a slot on presence loss does NOT log the
//! student out.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct AssignmentCursor {
    slots: Vec<Option<String>>,
}

impl AssignmentCursor {
    /// An arena of `max_faces` empty slots.
    pub fn new(max_faces: usize) -> Self {
        Self {
            slots: vec![None; max_faces],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Index of the first free slot, if any.
    pub fn free_index(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.as_deref() == Some(display_name))
    }

    pub fn bind(&mut self, index: usize, display_name: &str) {
        self.slots[index] = Some(display_name.to_string());
    }

    /// Clear slots whose name is no longer in the present set, returning the
    /// released indices. UI bookkeeping only.
    pub fn release_absent(&mut self, present: &HashSet<&str>) -> Vec<usize> {
        let mut released = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(name) = slot.as_deref() {
                if !present.contains(name) {
                    *slot = None;
                    released.push(i);
                }
            }
        }
        released
    }

    pub fn card(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    pub fn cards(&self) -> &[Option<String>] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_index_fills_in_order() {
        let mut cursor = AssignmentCursor::new(3);
        assert_eq!(cursor.free_index(), Some(0));
        cursor.bind(0, "Ana");
        assert_eq!(cursor.free_index(), Some(1));
        cursor.bind(1, "Luis");
        cursor.bind(2, "Mia");
        assert_eq!(cursor.free_index(), None);
    }

    #[test]
    fn test_release_absent_keeps_stable_indices() {
        let mut cursor = AssignmentCursor::new(3);
        cursor.bind(0, "Ana");
        cursor.bind(1, "Luis");
        cursor.bind(2, "Mia");

        let present: HashSet<&str> = ["Ana", "Mia"].into();
        let released = cursor.release_absent(&present);
        assert_eq!(released, vec![1]);
        // Remaining names stay at their original indices.
        assert_eq!(cursor.card(0), Some("Ana"));
        assert_eq!(cursor.card(1), None);
        assert_eq!(cursor.card(2), Some("Mia"));
        // The freed middle slot is reused first.
        assert_eq!(cursor.free_index(), Some(1));
    }

    #[test]
    fn test_contains() {
        let mut cursor = AssignmentCursor::new(2);
        cursor.bind(1, "Ana");
        assert!(cursor.contains("Ana"));
        assert!(!cursor.contains("Luis"));
    }

    #[test]
    fn test_zero_capacity_cursor() {
        let mut cursor = AssignmentCursor::new(0);
        assert_eq!(cursor.free_index(), None);
        assert!(cursor.release_absent(&HashSet::new()).is_empty());
    }
}
