use anyhow::{Context, Result};
use labtrack_access::OperatorSession;
use labtrack_core::{FaceExtractor, LandmarkProjector, OnnxEncoder, ENCODER_TOLERANCE, LANDMARK_TOLERANCE};
use labtrack_hw::Camera;
use labtrack_store::Store;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus;
mod engine;
mod session;

use config::{Config, ExtractorKind, Mode};
use session::{SharedStatus, StatusSnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("labtrackd starting");
    let cfg = Config::from_env();

    let capability = labtrack_hw::probe_with_cache(&cfg.camera_device, &cfg.capability_cache);
    let max_faces = capability.max_faces;
    tracing::info!(
        max_faces,
        camera_res = %capability.camera_res,
        category = %capability.res_category,
        "capability snapshot"
    );

    let (width, height) = parse_resolution(&capability.camera_res);
    let camera = Camera::open(&cfg.camera_device, width, height)
        .with_context(|| format!("opening camera {}", cfg.camera_device))?;
    let extractor = build_extractor(&cfg).context("loading face models")?;
    let engine = engine::spawn_engine(Box::new(camera), extractor, max_faces, cfg.warmup_frames);

    let store = Store::open(&cfg.db_path)
        .with_context(|| format!("opening database {}", cfg.db_path.display()))?;
    let operator = OperatorSession::new(&cfg.operator_cedula, &cfg.operator_name, false);

    let status: SharedStatus = Arc::new(RwLock::new(StatusSnapshot::default()));
    let _conn = dbus::serve(status.clone())
        .await
        .context("registering D-Bus service")?;

    tracing::info!(mode = ?cfg.mode, "labtrackd ready");

    // Ctrl-c is a hard cutover: the loop future is dropped mid-tick and no
    // in-flight recognition result is honored after stop.
    tokio::select! {
        result = run_session(&cfg, store, engine, operator, max_faces, status) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("labtrackd shutting down");
        }
    }

    Ok(())
}

async fn run_session(
    cfg: &Config,
    store: Store,
    engine: engine::EngineHandle,
    operator: OperatorSession,
    max_faces: usize,
    status: SharedStatus,
) -> Result<()> {
    match cfg.mode {
        Mode::Entry => session::entry_loop(store, engine, cfg, operator, max_faces, status).await,
        Mode::Exit => session::exit_loop(store, engine, cfg, max_faces, status).await,
    }
}

fn build_extractor(cfg: &Config) -> Result<Box<dyn FaceExtractor + Send>> {
    Ok(match cfg.extractor {
        ExtractorKind::Encoder => Box::new(OnnxEncoder::load(
            &cfg.detector_model_path(),
            &cfg.encoder_model_path(),
            cfg.tolerance.unwrap_or(ENCODER_TOLERANCE),
        )?),
        ExtractorKind::Landmarks => Box::new(LandmarkProjector::load(
            &cfg.detector_model_path(),
            cfg.tolerance.unwrap_or(LANDMARK_TOLERANCE),
        )?),
    })
}

/// Parse "WxH" from the capability snapshot, defaulting to 640x480.
fn parse_resolution(res: &str) -> (u32, u32) {
    let mut parts = res.splitn(2, 'x');
    let width = parts.next().and_then(|v| v.parse().ok()).unwrap_or(640);
    let height = parts.next().and_then(|v| v.parse().ok()).unwrap_or(480);
    (width, height)
}
