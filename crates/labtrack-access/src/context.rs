/// Identity of the staff member operating the current session.
///
/// Passed explicitly to every component that stamps records; there is no
/// process-global "logged in user" state.
#[derive(Debug, Clone)]
pub struct OperatorSession {
    /// National id of the operator, stamped on occupancy records.
    pub cedula: String,
    pub display_name: String,
    pub admin: bool,
}

impl OperatorSession {
    pub fn new(cedula: impl Into<String>, display_name: impl Into<String>, admin: bool) -> Self {
        Self {
            cedula: cedula.into(),
            display_name: display_name.into(),
            admin,
        }
    }
}
