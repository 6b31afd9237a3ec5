//! labtrack-access — the station assignment state machine and its
//! surrounding session bookkeeping.
//!
//! Per individual and session the states are
//! `UNSEEN → DETECTED → ASSIGNED → RELEASED`: the frame matcher produces
//! DETECTED, [`assignment::assign_station`] moves to ASSIGNED, and the exit
//! flow ([`exit::register_exit`]) produces RELEASED. All decisions are
//! check-then-act against freshly read store state; a failed step degrades
//! to "nothing happened this tick" and the next tick retries naturally.

pub mod assignment;
pub mod attendance;
pub mod context;
pub mod cursor;
pub mod exit;

pub use assignment::assign_station;
pub use attendance::AttendanceTracker;
pub use context::OperatorSession;
pub use cursor::AssignmentCursor;
pub use exit::register_exit;
