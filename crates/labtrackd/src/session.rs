//! The per-tick session loops.
//!
//! Entry admits recognized students, exit releases them. Both loops are
//! tick-driven and stateless across ticks beyond the cursor: a persistence
//! error abandons the current tick and the next one re-reads fresh store
//! state, so there is no retry machinery to get wedged.

use crate::config::Config;
use crate::engine::EngineHandle;
use labtrack_access::{assign_station, register_exit, AssignmentCursor, AttendanceTracker, OperatorSession};
use labtrack_core::RecognizedIndividual;
use labtrack_store::{Store, StoreError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Daemon state published over D-Bus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub mode: String,
    pub grade: Option<String>,
    /// Display cards, one per cursor slot.
    pub cards: Vec<Option<String>>,
    pub occupied: i64,
    pub pending_exits: Vec<String>,
}

pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

/// Entry session: admit students, assign stations, keep the cards fresh.
///
/// Runs until the task is dropped. `max_faces` sizes the cursor and caps
/// the recognition pass.
pub async fn entry_loop(
    store: Store,
    engine: EngineHandle,
    cfg: &Config,
    operator: OperatorSession,
    max_faces: usize,
    status: SharedStatus,
) -> anyhow::Result<()> {
    let roster = store.load_roster(cfg.grade.as_deref())?;
    tracing::info!(students = roster.len(), grade = ?cfg.grade, "entry roster loaded");
    engine.rebuild_gallery(roster).await?;

    let mut cursor = AssignmentCursor::new(max_faces);
    let mut interval = tokio::time::interval(Duration::from_millis(cfg.tick_interval_ms));
    let mut tick: u64 = 0;

    loop {
        interval.tick().await;
        tick += 1;
        if tick % cfg.recognition_stride.max(1) != 0 {
            continue;
        }

        let found = match engine.scan().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "scan failed; tick abandoned");
                continue;
            }
        };

        // Presence loss only clears the card; the occupancy record stays
        // open until the exit flow closes it.
        let present: HashSet<&str> = found.iter().map(|f| f.display_name.as_str()).collect();
        for index in cursor.release_absent(&present) {
            tracing::debug!(index, "card released on presence loss");
        }

        if let Err(e) = admit(&store, &operator, &mut cursor, &found) {
            tracing::warn!(error = %e, "assignment failed; tick abandoned");
            continue;
        }

        if let Err(e) = publish_status(&store, &cursor, cfg, &status).await {
            tracing::warn!(error = %e, "status refresh failed");
        }
    }
}

/// Assign a station to each newly seen individual with a free card.
fn admit(
    store: &Store,
    operator: &OperatorSession,
    cursor: &mut AssignmentCursor,
    found: &[RecognizedIndividual],
) -> Result<(), StoreError> {
    for individual in found {
        if cursor.contains(&individual.display_name) {
            continue;
        }
        let Some(index) = cursor.free_index() else {
            break;
        };
        // Cards bind only on a persisted assignment; a None (no enrollment,
        // no free station) leaves the card empty for the next tick.
        if let Some(code) = assign_station(store, operator, individual.student_id)? {
            cursor.bind(index, &individual.display_name);
            tracing::info!(
                student = %individual.display_name,
                slot = %code,
                card = index,
                "admitted"
            );
        }
    }
    Ok(())
}

/// Exit session: release stations and roll up attendance when the lab empties.
pub async fn exit_loop(
    store: Store,
    engine: EngineHandle,
    cfg: &Config,
    max_faces: usize,
    status: SharedStatus,
) -> anyhow::Result<()> {
    let roster = store.load_occupied_roster()?;
    tracing::info!(students = roster.len(), "exit roster loaded");
    engine.rebuild_gallery(roster).await?;

    let mut tracker = AttendanceTracker::new();
    let cursor = AssignmentCursor::new(max_faces);
    let mut interval = tokio::time::interval(Duration::from_millis(cfg.tick_interval_ms));
    let mut tick: u64 = 0;

    loop {
        interval.tick().await;
        tick += 1;
        if tick % cfg.recognition_stride.max(1) != 0 {
            continue;
        }

        let found = match engine.scan().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "scan failed; tick abandoned");
                continue;
            }
        };

        let mut released_any = false;
        for individual in &found {
            match register_exit(&store, individual.student_id) {
                Ok(Some(code)) => {
                    released_any = true;
                    tracing::info!(student = %individual.display_name, slot = %code, "released");
                    match store.occupied_count() {
                        Ok(occupied) => {
                            if let Err(e) =
                                tracker.observe(&store, occupied, cfg.grade.as_deref())
                            {
                                tracing::warn!(error = %e, "attendance roll-up failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "occupied count failed"),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "exit failed; tick abandoned");
                    break;
                }
            }
        }

        // Released students leave the gallery, so rebuild from the store.
        if released_any {
            match store.load_occupied_roster() {
                Ok(roster) => {
                    if let Err(e) = engine.rebuild_gallery(roster).await {
                        tracing::warn!(error = %e, "gallery rebuild failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "occupied roster reload failed"),
            }
        }

        if let Err(e) = publish_status(&store, &cursor, cfg, &status).await {
            tracing::warn!(error = %e, "status refresh failed");
        }
    }
}

async fn publish_status(
    store: &Store,
    cursor: &AssignmentCursor,
    cfg: &Config,
    status: &SharedStatus,
) -> Result<(), StoreError> {
    let snapshot = StatusSnapshot {
        mode: match cfg.mode {
            crate::config::Mode::Entry => "entry".to_string(),
            crate::config::Mode::Exit => "exit".to_string(),
        },
        grade: cfg.grade.clone(),
        cards: cursor.cards().to_vec(),
        occupied: store.occupied_count()?,
        pending_exits: store.pending_exits()?,
    };
    *status.write().await = snapshot;
    Ok(())
}
