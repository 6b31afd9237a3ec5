//! Station assignment: deterministic slot targeting with fallback.

use crate::context::OperatorSession;
use chrono::Local;
use labtrack_store::types::StationStatus;
use labtrack_store::{Store, StoreError};

/// Assign a station to a recognized student.
///
/// Returns the assigned slot code, or `None` when nothing could or needed
/// to be assigned (no active enrollment, or no station left — resource
/// exhaustion is silent, not an error).
///
/// The target slot is chosen deterministically: the student's 0-based rank
/// in the same-grade active roster, sorted by surname case-insensitively,
/// maps rank N to `E-{N+1:02}`. When that slot does not exist or is held by
/// a different enrollment's open record, the lexicographically first
/// available slot is used instead.
///
/// Idempotent: an enrollment that already holds an open occupancy record
/// gets its existing slot back without a new row.
pub fn assign_station(
    store: &Store,
    operator: &OperatorSession,
    student_id: i64,
) -> Result<Option<String>, StoreError> {
    let Some(enrollment) = store.latest_active_enrollment(student_id)? else {
        tracing::debug!(student_id, "no active enrollment; nothing to assign");
        return Ok(None);
    };

    // Re-detection of an already-seated student returns the same slot.
    if let Some(existing) = store.open_occupancy_for_enrollment(&enrollment)? {
        tracing::debug!(student_id, slot = %existing, "already assigned");
        return Ok(Some(existing));
    }

    let Some(grade) = store.enrollment_grade(&enrollment)? else {
        return Ok(None);
    };

    let Some(target) = ranked_slot_code(store, &grade, student_id)? else {
        return Ok(None);
    };

    let code = match resolve_slot(store, &target, &enrollment)? {
        Some(code) => code,
        // Resource exhaustion: no row written, retried on a later tick.
        None => {
            tracing::warn!(student_id, target = %target, "no station available");
            return Ok(None);
        }
    };

    if store.slot_status(&code)? != Some(StationStatus::Occupied) {
        store.set_slot_status(&code, StationStatus::Occupied)?;
    }

    let now = Local::now();
    store.insert_occupancy(
        &enrollment,
        Some(&operator.cedula),
        &code,
        now.date_naive(),
        now.time(),
    )?;

    tracing::info!(student_id, enrollment = %enrollment, slot = %code, "station assigned");
    Ok(Some(code))
}

/// Slot code for the student's rank in the surname-sorted grade roster.
fn ranked_slot_code(
    store: &Store,
    grade: &str,
    student_id: i64,
) -> Result<Option<String>, StoreError> {
    let mut roster = store.grade_roster(grade)?;
    if roster.is_empty() {
        return Ok(None);
    }

    roster.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()));

    let Some(rank) = roster.iter().position(|(id, _)| *id == student_id) else {
        return Ok(None);
    };
    Ok(Some(format!("E-{:02}", rank + 1)))
}

/// Apply the fallback rules to the computed target slot.
fn resolve_slot(
    store: &Store,
    target: &str,
    enrollment: &str,
) -> Result<Option<String>, StoreError> {
    match store.slot_status(target)? {
        // Target slot was never registered: fall back.
        None => store.first_available_slot(),
        Some(StationStatus::Occupied) => {
            match store.open_occupancy_for_slot(target)? {
                // Held by someone else: fall back.
                Some(holder) if holder != enrollment => store.first_available_slot(),
                // Marked occupied with no (or our own) open record: the
                // open-record table wins, keep the target.
                _ => Ok(Some(target.to_string())),
            }
        }
        // Available — or damaged, which the legacy rules pass through;
        // retiring damaged stations is the station admin's job.
        Some(_) => Ok(Some(target.to_string())),
    }
}
