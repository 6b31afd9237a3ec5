//! labtrack-store — SQLite persistence for roster, stations, occupancy and
//! attendance.
//!
//! The schema keeps the institutional table names (`estudiantes`,
//! `matriculas`, `equipos`, `historial`, `asistencias`); an open occupancy
//! is a `historial` row with `hora_fin IS NULL`, and that is the sole
//! source of truth for "currently occupied".

pub mod types;

use chrono::{NaiveDate, NaiveTime};
use labtrack_core::RosterEntry;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use types::{AttendanceStatus, Station, StationStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unknown station status literal: {0}")]
    BadStationStatus(String),
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and initialize if needed) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests and diagnostics.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS estudiantes (
                 id_estudiante INTEGER PRIMARY KEY,
                 nombres       TEXT NOT NULL,
                 apellidos     TEXT NOT NULL,
                 foto_rostro   BLOB
             );
             CREATE TABLE IF NOT EXISTS matriculas (
                 id_matricula  TEXT PRIMARY KEY,
                 id_estudiante INTEGER NOT NULL REFERENCES estudiantes(id_estudiante),
                 grado         TEXT NOT NULL,
                 anio          INTEGER NOT NULL,
                 estado        TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS equipos (
                 id_equipo TEXT PRIMARY KEY,
                 estado    TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS historial (
                 id           INTEGER PRIMARY KEY AUTOINCREMENT,
                 id_matricula TEXT NOT NULL REFERENCES matriculas(id_matricula),
                 cedula       TEXT,
                 id_equipo    TEXT NOT NULL REFERENCES equipos(id_equipo),
                 fecha        TEXT NOT NULL,
                 hora_inicio  TEXT NOT NULL,
                 hora_fin     TEXT
             );
             CREATE TABLE IF NOT EXISTS asistencias (
                 id           INTEGER PRIMARY KEY AUTOINCREMENT,
                 id_matricula TEXT NOT NULL REFERENCES matriculas(id_matricula),
                 fecha        TEXT NOT NULL,
                 estado       TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    // ---- roster -----------------------------------------------------------

    /// Roster for an entry session: every student whose latest active
    /// enrollment matches the grade filter, with their reference photo.
    pub fn load_roster(&self, grade: Option<&str>) -> Result<Vec<RosterEntry>, StoreError> {
        let latest = self.latest_enrollments()?;

        let mut stmt = self.conn.prepare(
            "SELECT id_estudiante, nombres, apellidos, foto_rostro FROM estudiantes",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<Vec<u8>>>(3)?,
            ))
        })?;

        let mut roster = Vec::new();
        for row in rows {
            let (id, nombres, apellidos, photo) = row?;
            let Some(enrollment) = latest.iter().find(|e| e.student_id == id) else {
                continue;
            };
            if let Some(grade) = grade {
                if enrollment.grade != grade {
                    continue;
                }
            }
            roster.push(RosterEntry {
                student_id: id,
                display_name: format!("{nombres} {apellidos}"),
                surname: apellidos,
                photo,
            });
        }
        Ok(roster)
    }

    /// Roster for an exit session: students whose latest active enrollment
    /// currently holds an open occupancy record.
    pub fn load_occupied_roster(&self) -> Result<Vec<RosterEntry>, StoreError> {
        let roster = self.load_roster(None)?;
        let mut occupied = Vec::new();
        for entry in roster {
            let Some(enrollment) = self.latest_active_enrollment(entry.student_id)? else {
                continue;
            };
            if self.open_occupancy_for_enrollment(&enrollment)?.is_some() {
                occupied.push(entry);
            }
        }
        Ok(occupied)
    }

    /// Same-grade active roster used for deterministic ranking:
    /// (student_id, surname) per latest active enrollment in the grade.
    pub fn grade_roster(&self, grade: &str) -> Result<Vec<(i64, String)>, StoreError> {
        let latest = self.latest_enrollments()?;
        let mut stmt = self
            .conn
            .prepare("SELECT id_estudiante, apellidos FROM estudiantes")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut roster = Vec::new();
        for row in rows {
            let (id, apellidos) = row?;
            if latest
                .iter()
                .any(|e| e.student_id == id && e.grade == grade)
            {
                roster.push((id, apellidos));
            }
        }
        Ok(roster)
    }

    // ---- enrollments ------------------------------------------------------

    /// Latest active enrollment id for a student, by numeric suffix ordinal,
    /// descending. `None` when the student has no active enrollment.
    pub fn latest_active_enrollment(&self, student_id: i64) -> Result<Option<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id_matricula FROM matriculas
             WHERE id_estudiante = ?1 AND estado = 'Estudiante'",
        )?;
        let ids = stmt
            .query_map(params![student_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().max_by_key(|id| enrollment_ordinal(id)))
    }

    pub fn enrollment_grade(&self, enrollment_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT grado FROM matriculas WHERE id_matricula = ?1",
                params![enrollment_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// All active enrollments (matricula ids) in a grade, latest per student.
    pub fn active_enrollments_in_grade(&self, grade: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .latest_enrollments()?
            .into_iter()
            .filter(|e| e.grade == grade)
            .map(|e| e.enrollment_id)
            .collect())
    }

    /// First grade with any active enrollment, if one exists.
    pub fn first_active_grade(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT grado FROM matriculas WHERE estado = 'Estudiante' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Latest active enrollment per student, across all grades.
    fn latest_enrollments(&self) -> Result<Vec<LatestEnrollment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id_matricula, id_estudiante, grado FROM matriculas
             WHERE estado = 'Estudiante'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LatestEnrollment {
                enrollment_id: row.get(0)?,
                student_id: row.get(1)?,
                grade: row.get(2)?,
            })
        })?;

        let mut latest: Vec<LatestEnrollment> = Vec::new();
        for row in rows {
            let e = row?;
            match latest.iter_mut().find(|l| l.student_id == e.student_id) {
                Some(existing) => {
                    if enrollment_ordinal(&e.enrollment_id)
                        > enrollment_ordinal(&existing.enrollment_id)
                    {
                        *existing = e;
                    }
                }
                None => latest.push(e),
            }
        }
        Ok(latest)
    }

    // ---- stations ---------------------------------------------------------

    pub fn slot_status(&self, code: &str) -> Result<Option<StationStatus>, StoreError> {
        let literal: Option<String> = self
            .conn
            .query_row(
                "SELECT estado FROM equipos WHERE id_equipo = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?;
        literal
            .map(|l| StationStatus::from_literal(&l).ok_or(StoreError::BadStationStatus(l)))
            .transpose()
    }

    pub fn set_slot_status(&self, code: &str, status: StationStatus) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE equipos SET estado = ?1 WHERE id_equipo = ?2",
            params![status.as_literal(), code],
        )?;
        Ok(())
    }

    /// Lexicographically smallest available slot code, if any.
    pub fn first_available_slot(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id_equipo FROM equipos WHERE estado = 'disponible'
                 ORDER BY id_equipo ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn occupied_count(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM equipos WHERE estado = 'ocupado'",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn list_stations(&self) -> Result<Vec<Station>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id_equipo, estado FROM equipos ORDER BY id_equipo ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut stations = Vec::new();
        for row in rows {
            let (code, literal) = row?;
            let status = StationStatus::from_literal(&literal)
                .ok_or(StoreError::BadStationStatus(literal))?;
            stations.push(Station { code, status });
        }
        Ok(stations)
    }

    /// Register a new station with the next sequential `E-NN` code.
    pub fn add_station(&self) -> Result<String, StoreError> {
        let last: Option<String> = self
            .conn
            .query_row(
                "SELECT id_equipo FROM equipos ORDER BY id_equipo DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let code = match last.as_deref().and_then(station_ordinal) {
            Some(n) => format!("E-{:02}", n + 1),
            None => "E-01".to_string(),
        };

        self.conn.execute(
            "INSERT INTO equipos (id_equipo, estado) VALUES (?1, 'disponible')",
            params![code],
        )?;
        tracing::info!(station = %code, "station registered");
        Ok(code)
    }

    // ---- occupancy --------------------------------------------------------

    /// Slot held by the enrollment's open occupancy record, if any.
    pub fn open_occupancy_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id_equipo FROM historial
                 WHERE id_matricula = ?1 AND hora_fin IS NULL",
                params![enrollment_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Enrollment holding the slot's open occupancy record, if any.
    pub fn open_occupancy_for_slot(&self, code: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id_matricula FROM historial
                 WHERE id_equipo = ?1 AND hora_fin IS NULL",
                params![code],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Count of open occupancy records referencing a slot.
    pub fn open_record_count_for_slot(&self, code: &str) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM historial WHERE id_equipo = ?1 AND hora_fin IS NULL",
            params![code],
            |row| row.get(0),
        )?)
    }

    pub fn insert_occupancy(
        &self,
        enrollment_id: &str,
        operator_cedula: Option<&str>,
        code: &str,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO historial (id_matricula, cedula, id_equipo, fecha, hora_inicio, hora_fin)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                enrollment_id,
                operator_cedula,
                code,
                date.to_string(),
                start.format("%H:%M:%S").to_string(),
            ],
        )?;
        Ok(())
    }

    /// Stamp `hora_fin` on the enrollment's open record for the slot.
    pub fn close_occupancy(
        &self,
        enrollment_id: &str,
        code: &str,
        end: NaiveTime,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE historial SET hora_fin = ?1
             WHERE id_matricula = ?2 AND id_equipo = ?3 AND hora_fin IS NULL",
            params![end.format("%H:%M:%S").to_string(), enrollment_id, code],
        )?;
        Ok(())
    }

    /// Display names of students still holding a station.
    pub fn pending_exits(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT e.nombres || ' ' || e.apellidos
             FROM estudiantes e
             INNER JOIN matriculas m ON m.id_estudiante = e.id_estudiante
             INNER JOIN historial h ON h.id_matricula = m.id_matricula
             WHERE h.hora_fin IS NULL",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- attendance -------------------------------------------------------

    /// Enrollments with any occupancy record dated `date`.
    pub fn enrollments_active_on(&self, date: NaiveDate) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT id_matricula FROM historial WHERE fecha = ?1")?;
        let rows = stmt.query_map(params![date.to_string()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_attendance(
        &self,
        enrollment_id: &str,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO asistencias (id_matricula, fecha, estado) VALUES (?1, ?2, ?3)",
            params![enrollment_id, date.to_string(), status.as_literal()],
        )?;
        Ok(())
    }

    pub fn attendance_count_on(&self, date: NaiveDate) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM asistencias WHERE fecha = ?1",
            params![date.to_string()],
            |row| row.get(0),
        )?)
    }

    pub fn attendance_status(
        &self,
        enrollment_id: &str,
        date: NaiveDate,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT estado FROM asistencias WHERE id_matricula = ?1 AND fecha = ?2",
                params![enrollment_id, date.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ---- fixtures (tests, seeding) ----------------------------------------

    pub fn insert_student(
        &self,
        id: i64,
        nombres: &str,
        apellidos: &str,
        photo: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO estudiantes (id_estudiante, nombres, apellidos, foto_rostro)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, nombres, apellidos, photo],
        )?;
        Ok(())
    }

    pub fn insert_enrollment(
        &self,
        enrollment_id: &str,
        student_id: i64,
        grade: &str,
        year: i32,
        estado: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO matriculas (id_matricula, id_estudiante, grado, anio, estado)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![enrollment_id, student_id, grade, year, estado],
        )?;
        Ok(())
    }

    pub fn insert_station(&self, code: &str, status: StationStatus) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO equipos (id_equipo, estado) VALUES (?1, ?2)",
            params![code, status.as_literal()],
        )?;
        Ok(())
    }
}

struct LatestEnrollment {
    enrollment_id: String,
    student_id: i64,
    grade: String,
}

/// Numeric ordinal encoded as the trailing digit run of an enrollment id
/// ("MAT-0012" → 12). Ids without a trailing number sort lowest.
pub fn enrollment_ordinal(enrollment_id: &str) -> i64 {
    let digits: String = enrollment_id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(-1)
}

/// Trailing number of a station code ("E-07" → 7).
fn station_ordinal(code: &str) -> Option<i64> {
    code.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.insert_student(1, "Ana", "Zapata", None).unwrap();
        store.insert_student(2, "Luis", "Alvarez", None).unwrap();
        store
            .insert_enrollment("MAT-0001", 1, "7A", 2025, "Estudiante")
            .unwrap();
        store
            .insert_enrollment("MAT-0002", 2, "7A", 2025, "Estudiante")
            .unwrap();
        store.insert_station("E-01", StationStatus::Available).unwrap();
        store.insert_station("E-02", StationStatus::Available).unwrap();
        store
    }

    #[test]
    fn test_enrollment_ordinal_parsing() {
        assert_eq!(enrollment_ordinal("MAT-0012"), 12);
        assert_eq!(enrollment_ordinal("M7"), 7);
        assert_eq!(enrollment_ordinal("MAT-"), -1);
    }

    #[test]
    fn test_latest_enrollment_by_suffix_not_insertion_order() {
        let store = seeded();
        // A re-enrollment with a higher ordinal supersedes, regardless of
        // insertion order or grade.
        store
            .insert_enrollment("MAT-0010", 1, "8B", 2026, "Estudiante")
            .unwrap();
        assert_eq!(
            store.latest_active_enrollment(1).unwrap().as_deref(),
            Some("MAT-0010")
        );
        // Inactive rows never win.
        store
            .insert_enrollment("MAT-0020", 1, "9C", 2027, "Retirado")
            .unwrap();
        assert_eq!(
            store.latest_active_enrollment(1).unwrap().as_deref(),
            Some("MAT-0010")
        );
    }

    #[test]
    fn test_grade_roster_follows_latest_enrollment() {
        let store = seeded();
        store
            .insert_enrollment("MAT-0010", 1, "8B", 2026, "Estudiante")
            .unwrap();
        // Student 1 moved to 8B: only student 2 remains in 7A.
        let roster = store.grade_roster("7A").unwrap();
        assert_eq!(roster, vec![(2, "Alvarez".to_string())]);
        let roster = store.grade_roster("8B").unwrap();
        assert_eq!(roster, vec![(1, "Zapata".to_string())]);
    }

    #[test]
    fn test_first_available_slot_is_lexicographic() {
        let store = seeded();
        store.set_slot_status("E-01", StationStatus::Occupied).unwrap();
        assert_eq!(
            store.first_available_slot().unwrap().as_deref(),
            Some("E-02")
        );
    }

    #[test]
    fn test_add_station_continues_sequence() {
        let store = seeded();
        assert_eq!(store.add_station().unwrap(), "E-03");
        assert_eq!(store.add_station().unwrap(), "E-04");
    }

    #[test]
    fn test_add_station_starts_at_one() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.add_station().unwrap(), "E-01");
    }

    #[test]
    fn test_open_occupancy_round_trip() {
        let store = seeded();
        let date = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let start = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        store
            .insert_occupancy("MAT-0001", Some("123"), "E-01", date, start)
            .unwrap();

        assert_eq!(
            store.open_occupancy_for_enrollment("MAT-0001").unwrap().as_deref(),
            Some("E-01")
        );
        assert_eq!(
            store.open_occupancy_for_slot("E-01").unwrap().as_deref(),
            Some("MAT-0001")
        );

        let end = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        store.close_occupancy("MAT-0001", "E-01", end).unwrap();
        assert!(store.open_occupancy_for_enrollment("MAT-0001").unwrap().is_none());
        assert!(store.open_occupancy_for_slot("E-01").unwrap().is_none());
        // The closed row still counts for attendance on that date.
        assert_eq!(
            store.enrollments_active_on(date).unwrap(),
            vec!["MAT-0001".to_string()]
        );
    }

    #[test]
    fn test_load_roster_grade_filter() {
        let store = seeded();
        store
            .insert_enrollment("MAT-0010", 1, "8B", 2026, "Estudiante")
            .unwrap();
        let names: Vec<String> = store
            .load_roster(Some("7A"))
            .unwrap()
            .into_iter()
            .map(|e| e.display_name)
            .collect();
        assert_eq!(names, vec!["Luis Alvarez".to_string()]);
    }

    #[test]
    fn test_occupied_roster_and_pending_exits() {
        let store = seeded();
        let date = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let start = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        store
            .insert_occupancy("MAT-0002", None, "E-01", date, start)
            .unwrap();
        store.set_slot_status("E-01", StationStatus::Occupied).unwrap();

        let occupied = store.load_occupied_roster().unwrap();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].student_id, 2);
        assert_eq!(store.pending_exits().unwrap(), vec!["Luis Alvarez".to_string()]);
    }
}
