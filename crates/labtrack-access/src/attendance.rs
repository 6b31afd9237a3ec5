//! End-of-session attendance roll-up.

use chrono::Local;
use labtrack_store::types::AttendanceStatus;
use labtrack_store::{Store, StoreError};

/// Records the day's attendance exactly once, when the lab empties.
///
/// Fed the occupied-station count after every exit; the first time the
/// count reaches zero, every active enrollment in the grade gets one
/// `asistencias` row for today — `presente` when the enrollment shows up
/// in today's occupancy history, `ausente` otherwise. Later zero crossings
/// within the same tracker lifetime are ignored.
#[derive(Debug, Default)]
pub struct AttendanceTracker {
    recorded: bool,
}

impl AttendanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> bool {
        self.recorded
    }

    /// Call after each exit with the current occupied count. Returns the
    /// number of attendance rows written (0 when nothing fired).
    pub fn observe(
        &mut self,
        store: &Store,
        occupied: i64,
        grade: Option<&str>,
    ) -> Result<usize, StoreError> {
        if occupied != 0 || self.recorded {
            return Ok(0);
        }

        let grade = match grade {
            Some(g) => g.to_string(),
            None => match store.first_active_grade()? {
                Some(g) => g,
                None => return Ok(0),
            },
        };

        let today = Local::now().date_naive();
        let seen_today = store.enrollments_active_on(today)?;
        let roster = store.active_enrollments_in_grade(&grade)?;

        let mut written = 0;
        for enrollment in &roster {
            let status = if seen_today.contains(enrollment) {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            store.insert_attendance(enrollment, today, status)?;
            written += 1;
        }

        self.recorded = true;
        tracing::info!(grade = %grade, rows = written, "attendance recorded");
        Ok(written)
    }
}
