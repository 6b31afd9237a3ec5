//! Exit flow: close the open occupancy record and free the station.

use chrono::Local;
use labtrack_store::types::StationStatus;
use labtrack_store::{Store, StoreError};

/// Release the station held by a recognized student.
///
/// Closes the open occupancy record for the student's latest active
/// enrollment, flips the slot back to available and returns its code.
/// `None` when the student holds nothing; a repeat sighting on a later
/// frame is therefore a no-op.
pub fn register_exit(store: &Store, student_id: i64) -> Result<Option<String>, StoreError> {
    let Some(enrollment) = store.latest_active_enrollment(student_id)? else {
        return Ok(None);
    };
    let Some(code) = store.open_occupancy_for_enrollment(&enrollment)? else {
        tracing::debug!(student_id, "no open occupancy; exit is a no-op");
        return Ok(None);
    };

    store.close_occupancy(&enrollment, &code, Local::now().time())?;
    store.set_slot_status(&code, StationStatus::Available)?;

    tracing::info!(student_id, enrollment = %enrollment, slot = %code, "station released");
    Ok(Some(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::assign_station;
    use crate::context::OperatorSession;

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.insert_student(2, "Ana", "Alvarez", None).unwrap();
        store
            .insert_enrollment("MAT-0002", 2, "7A", 2026, "Estudiante")
            .unwrap();
        store.insert_station("E-01", StationStatus::Available).unwrap();
        store
    }

    #[test]
    fn test_exit_closes_record_and_frees_slot() {
        let store = seeded();
        let op = OperatorSession::new("0912345678", "Prof. Vera", false);
        assign_station(&store, &op, 2).unwrap();
        assert_eq!(store.occupied_count().unwrap(), 1);

        assert_eq!(register_exit(&store, 2).unwrap().as_deref(), Some("E-01"));
        assert_eq!(store.occupied_count().unwrap(), 0);
        assert_eq!(store.open_record_count_for_slot("E-01").unwrap(), 0);
        // The slot is assignable again.
        assert_eq!(
            store.slot_status("E-01").unwrap(),
            Some(StationStatus::Available)
        );
    }

    #[test]
    fn test_exit_without_open_record_is_noop() {
        let store = seeded();
        assert_eq!(register_exit(&store, 2).unwrap(), None);
        assert_eq!(store.occupied_count().unwrap(), 0);
    }

    #[test]
    fn test_repeat_exit_is_noop() {
        let store = seeded();
        let op = OperatorSession::new("0912345678", "Prof. Vera", false);
        assign_station(&store, &op, 2).unwrap();
        assert!(register_exit(&store, 2).unwrap().is_some());
        assert_eq!(register_exit(&store, 2).unwrap(), None);
    }
}
