use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::app_dirs::AppDirs;
use crate::state::SessionState;

/// Durable per-device storage for the session state.
///
/// `load` never fails: missing or malformed data yields an empty state so a
/// corrupted file can never wedge the station.
pub trait StateStore {
    fn load(&self) -> SessionState;
    fn save(&self, state: &SessionState) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn for_role(role: &str) -> Self {
        let path = AppDirs::state_path(role)
            .unwrap_or_else(|| PathBuf::from(format!("qr.registros.{role}.v1.json")));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> SessionState {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<SessionState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Discarding malformed state at {:?}: {}", self.path, e);
                    SessionState::default()
                }
            },
            Err(_) => SessionState::default(),
        }
    }

    fn save(&self, state: &SessionState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(state).unwrap_or_default();
        fs::write(&self.path, data)?;
        info!("Saved session state to {:?}", self.path);
        Ok(())
    }
}

/// In-memory store for unit and headless integration tests.
pub struct MemoryStateStore {
    state: Mutex<SessionState>,
}

impl MemoryStateStore {
    pub fn new(initial: SessionState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> SessionState {
        self.snapshot()
    }

    fn save(&self, state: &SessionState) -> std::io::Result<()> {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state.clone();
        }
        Ok(())
    }
}
