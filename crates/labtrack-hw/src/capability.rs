//! Hardware capability probe.
//!
//! Derives the simultaneous-face budget (`max_faces`) from the best camera
//! resolution the driver accepts plus host RAM and core count. The result
//! is cached as JSON; a later run re-probes only when one of the key fields
//! changed. The budget is configuration input for the recognition pipeline,
//! which never computes it itself.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Candidate resolutions, best first. The probe keeps the highest one the
/// driver actually accepts.
const RESOLUTION_LADDER: [(u32, u32); 7] = [
    (3840, 2160),
    (2560, 1440),
    (1920, 1080),
    (1280, 720),
    (1024, 576),
    (800, 600),
    (640, 480),
];

/// Guaranteed floor when the camera cannot be probed.
const DEFAULT_RESOLUTION: (u32, u32) = (640, 480);

/// Reference points used to classify the probed resolution.
const RESOLUTION_CLASSES: [(u32, u32, &str, u32); 4] = [
    (640, 480, "480p", 2),
    (1280, 720, "720p", 3),
    (1920, 1080, "1080p", 5),
    (3840, 2160, "4K", 8),
];

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache parse error: {0}")]
    CacheParse(#[from] serde_json::Error),
}

/// Snapshot of the probed hardware and the derived face budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilitySnapshot {
    pub cpu: String,
    pub cores: usize,
    /// Total RAM in whole tenths of a GB, e.g. 7.8.
    pub ram_gb: f64,
    pub camera_res: String,
    pub res_category: String,
    pub max_faces: usize,
}

impl CapabilitySnapshot {
    /// True when a key field differs from `other`, meaning the cached
    /// budget no longer describes this host.
    pub fn changed(&self, other: &CapabilitySnapshot) -> bool {
        self.cpu != other.cpu
            || self.cores != other.cores
            || self.ram_gb != other.ram_gb
            || self.camera_res != other.camera_res
    }
}

/// Probe the host and camera, deriving `max_faces`.
pub fn probe(camera_device: &str) -> CapabilitySnapshot {
    let (width, height) = probe_camera_resolution(camera_device);
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let ram_gb = total_ram_gb();
    let cpu = cpu_model();

    let (category, base) = classify_resolution(width, height);
    let factor = hardware_factor(ram_gb, cores);
    let max_faces = ((base as f64 * factor) as usize).max(1);

    tracing::info!(
        camera_res = %format!("{width}x{height}"),
        category,
        cores,
        ram_gb,
        max_faces,
        "hardware capability probed"
    );

    CapabilitySnapshot {
        cpu,
        cores,
        ram_gb,
        camera_res: format!("{width}x{height}"),
        res_category: category.to_string(),
        max_faces,
    }
}

/// Load the cached snapshot, or `None` when absent or unreadable.
pub fn load_cached(path: &Path) -> Option<CapabilitySnapshot> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding unreadable capability cache");
            None
        }
    }
}

pub fn save_cache(path: &Path, snapshot: &CapabilitySnapshot) -> Result<(), CapabilityError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(snapshot)?)?;
    Ok(())
}

/// Probe or reuse: the cache wins only when nothing relevant changed.
pub fn probe_with_cache(camera_device: &str, cache_path: &Path) -> CapabilitySnapshot {
    let fresh = probe(camera_device);
    if let Some(cached) = load_cached(cache_path) {
        if !cached.changed(&fresh) {
            return cached;
        }
        tracing::info!("hardware changed since last probe; refreshing capability cache");
    }
    if let Err(e) = save_cache(cache_path, &fresh) {
        tracing::warn!(error = %e, "could not write capability cache");
    }
    fresh
}

/// Walk the ladder and keep the highest resolution the driver accepts.
/// Falls back to 640x480 when the device cannot be opened at all.
fn probe_camera_resolution(device_path: &str) -> (u32, u32) {
    let Ok(device) = Device::with_path(device_path) else {
        tracing::warn!(device = device_path, "camera not probeable; assuming 640x480");
        return DEFAULT_RESOLUTION;
    };
    let Ok(mut fmt) = device.format() else {
        return DEFAULT_RESOLUTION;
    };

    let mut best = DEFAULT_RESOLUTION;
    for (w, h) in RESOLUTION_LADDER {
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = w;
        fmt.height = h;
        if let Ok(negotiated) = device.set_format(&fmt) {
            if negotiated.width >= best.0 && negotiated.height >= best.1 {
                best = (negotiated.width, negotiated.height);
            }
        }
    }
    best
}

/// Nearest reference class by Manhattan distance on (width, height).
fn classify_resolution(width: u32, height: u32) -> (&'static str, u32) {
    let mut best = ("480p", 2);
    let mut min_diff = u32::MAX;
    for (w, h, name, base) in RESOLUTION_CLASSES {
        let diff = width.abs_diff(w) + height.abs_diff(h);
        if diff < min_diff {
            min_diff = diff;
            best = (name, base);
        }
    }
    best
}

fn hardware_factor(ram_gb: f64, cores: usize) -> f64 {
    if ram_gb >= 16.0 && cores >= 8 {
        1.5
    } else if ram_gb >= 8.0 && cores >= 4 {
        1.2
    } else if ram_gb >= 4.0 {
        1.0
    } else {
        0.7
    }
}

/// Total RAM from /proc/meminfo, rounded to one decimal.
fn total_ram_gb() -> f64 {
    let Ok(meminfo) = fs::read_to_string("/proc/meminfo") else {
        return 0.0;
    };
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: f64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0.0);
            return (kb / (1024.0 * 1024.0) * 10.0).round() / 10.0;
        }
    }
    0.0
}

/// CPU model name from /proc/cpuinfo.
fn cpu_model() -> String {
    let Ok(cpuinfo) = fs::read_to_string("/proc/cpuinfo") else {
        return "unknown".to_string();
    };
    cpuinfo
        .lines()
        .find_map(|line| {
            line.strip_prefix("model name")
                .and_then(|rest| rest.split(':').nth(1))
                .map(|name| name.trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
