//! Typed views over the Spanish status literals stored in the database.

/// Lifecycle state of a lab station ("equipo").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Available,
    Occupied,
    Damaged,
}

impl StationStatus {
    pub fn as_literal(self) -> &'static str {
        match self {
            StationStatus::Available => "disponible",
            StationStatus::Occupied => "ocupado",
            StationStatus::Damaged => "dañado",
        }
    }

    pub fn from_literal(literal: &str) -> Option<Self> {
        match literal {
            "disponible" => Some(StationStatus::Available),
            "ocupado" => Some(StationStatus::Occupied),
            "dañado" => Some(StationStatus::Damaged),
            _ => None,
        }
    }
}

/// Daily attendance outcome per enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_literal(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "presente",
            AttendanceStatus::Absent => "ausente",
        }
    }
}

/// A station row.
#[derive(Debug, Clone)]
pub struct Station {
    pub code: String,
    pub status: StationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_status_literal_round_trip() {
        for status in [
            StationStatus::Available,
            StationStatus::Occupied,
            StationStatus::Damaged,
        ] {
            assert_eq!(StationStatus::from_literal(status.as_literal()), Some(status));
        }
        assert_eq!(StationStatus::from_literal("libre"), None);
    }
}
