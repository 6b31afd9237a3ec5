use crate::session::SharedStatus;
use zbus::interface;

/// D-Bus surface for the lab access daemon.
///
/// Bus name: org.labtrack.Access1
/// Object path: /org/labtrack/Access1
pub struct AccessService {
    status: SharedStatus,
}

impl AccessService {
    pub fn new(status: SharedStatus) -> Self {
        Self { status }
    }
}

#[interface(name = "org.labtrack.Access1")]
impl AccessService {
    /// Full daemon state as a JSON document.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.status.read().await;
        serde_json::to_string(&*snapshot)
            .map_err(|e| zbus::fdo::Error::Failed(format!("serialize status: {e}")))
    }

    /// Number of stations currently marked occupied.
    async fn occupied_count(&self) -> zbus::fdo::Result<i64> {
        Ok(self.status.read().await.occupied)
    }

    /// Display names of students still holding a station, as a JSON list.
    async fn pending_exits(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.status.read().await;
        serde_json::to_string(&snapshot.pending_exits)
            .map_err(|e| zbus::fdo::Error::Failed(format!("serialize pending exits: {e}")))
    }
}

/// Claim the bus name and export the service object.
pub async fn serve(status: SharedStatus) -> zbus::Result<zbus::Connection> {
    let conn = zbus::connection::Builder::session()?
        .name("org.labtrack.Access1")?
        .serve_at("/org/labtrack/Access1", AccessService::new(status))?
        .build()
        .await?;
    tracing::info!("D-Bus service registered at org.labtrack.Access1");
    Ok(conn)
}
