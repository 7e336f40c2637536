use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("fichaje"),
            )
        } else {
            ProjectDirs::from("", "", "fichaje")
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    /// Role-scoped state file, so several roles on one device do not collide.
    /// The `.v1` suffix versions the on-disk schema.
    pub fn state_path(role: &str) -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join(format!("qr.registros.{role}.v1.json")))
    }

    /// Directory for the log file; the TUI cannot log to stdout.
    pub fn log_dir() -> Option<PathBuf> {
        Self::state_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_path_is_role_scoped_and_versioned() {
        let admin = AppDirs::state_path("administrativo").unwrap();
        let docente = AppDirs::state_path("docente").unwrap();

        assert!(admin
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("qr.registros.administrativo.v1"));
        assert_ne!(admin, docente);
    }
}
