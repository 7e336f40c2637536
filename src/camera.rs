use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// A video input device as currently enumerated. Rebuilt on every refresh;
/// only the id is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    pub id: String,
    pub label: String,
}

/// Labels that suggest a rear-facing camera, matched case-insensitively.
const REAR_FACING_HINTS: [&str; 4] = ["back", "trasera", "rear", "environment"];

/// Non-fatal enumeration outcomes surfaced to the user inline.
#[derive(Debug, Error)]
pub enum CameraWarning {
    /// The V4L sysfs tree is absent, so scanning cannot work at all here.
    #[error("Esta plataforma no expone cámaras (sin soporte V4L). El escaneo queda bloqueado.")]
    Unavailable,
    /// The subsystem exists but nothing was enumerated.
    #[error("No se detectaron cámaras. Revisa permisos y conexiones del dispositivo.")]
    NoDevices,
}

/// Enumerates video input devices from the kernel's video4linux sysfs tree.
#[derive(Debug, Clone)]
pub struct CameraDirectory {
    root: PathBuf,
}

impl CameraDirectory {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/sys/class/video4linux"),
        }
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Lists currently attached cameras, sorted by device node for a stable
    /// presentation order.
    pub fn list(&self) -> Result<Vec<CameraDescriptor>, CameraWarning> {
        let entries = fs::read_dir(&self.root).map_err(|_| CameraWarning::Unavailable)?;

        let mut cameras: Vec<CameraDescriptor> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let node = entry.file_name().to_string_lossy().into_owned();
                if !node.starts_with("video") {
                    return None;
                }
                let label = fs::read_to_string(entry.path().join("name"))
                    .map(|s| s.trim().to_string())
                    .ok()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| format!("Cámara {node}"));
                Some(CameraDescriptor {
                    id: format!("/dev/{node}"),
                    label,
                })
            })
            .collect();

        cameras.sort_by(|a, b| a.id.cmp(&b.id));

        if cameras.is_empty() {
            return Err(CameraWarning::NoDevices);
        }
        info!("Enumerated {} camera(s)", cameras.len());
        Ok(cameras)
    }
}

impl Default for CameraDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Default selection policy: a remembered id wins whenever it is still
/// attached; otherwise prefer a rear-facing label; otherwise the first
/// enumerated device.
pub fn pick_default(cameras: &[CameraDescriptor], remembered: Option<&str>) -> Option<String> {
    if let Some(id) = remembered {
        if cameras.iter().any(|c| c.id == id) {
            return Some(id.to_string());
        }
    }
    let rear = cameras.iter().find(|c| {
        let label = c.label.to_lowercase();
        REAR_FACING_HINTS.iter().any(|hint| label.contains(hint))
    });
    rear.or_else(|| cameras.first()).map(|c| c.id.clone())
}

/// Cycles to the next camera after `current`, wrapping around. Returns None
/// when there is no other camera to switch to.
pub fn next_after(cameras: &[CameraDescriptor], current: Option<&str>) -> Option<String> {
    if cameras.len() < 2 {
        return None;
    }
    let idx = current
        .and_then(|id| cameras.iter().position(|c| c.id == id))
        .unwrap_or(0);
    Some(cameras[(idx + 1) % cameras.len()].id.clone())
}
