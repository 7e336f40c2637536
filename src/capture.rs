use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::runtime::{AppEvent, EventBus};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Error al acceder a la cámara: no existe el dispositivo {device}.")]
    DeviceGone { device: String },
    #[error("No se pudo lanzar el escáner `{cmd}`: {source}. Revisa que esté instalado.")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("El escáner `{cmd}` no expone su salida estándar.")]
    NoStdout { cmd: String },
}

/// A live acquisition. Pausing drops decode lines at the session boundary;
/// the underlying scanner keeps running.
pub trait CaptureHandle: Send + std::fmt::Debug {
    fn pause(&mut self);
    fn resume(&mut self);
    fn shutdown(&mut self);
}

/// Acquires a camera and streams decode events into the shared bus.
/// `device: None` is the generic environment-facing request used as the
/// second tier of the start fallback.
pub trait CaptureBackend {
    fn spawn(
        &self,
        device: Option<&str>,
        events: EventBus,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// Production backend: spawns an external QR scanner (zbarcam by default)
/// and forwards each stdout line as one decode event. EOF means the scanner
/// died or was stopped, reported as `CaptureStopped`.
pub struct ScannerBackend {
    cmd: String,
}

impl ScannerBackend {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl CaptureBackend for ScannerBackend {
    fn spawn(
        &self,
        device: Option<&str>,
        events: EventBus,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        // Exact device ids are unreliable across reboots and hot-plugs;
        // fail fast so the session can fall back to a generic request.
        if let Some(d) = device {
            if !Path::new(d).exists() {
                return Err(CaptureError::DeviceGone {
                    device: d.to_string(),
                });
            }
        }

        let mut command = Command::new(&self.cmd);
        command
            .arg("--raw")
            .arg("--nodisplay")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(d) = device {
            command.arg(format!("--device={d}"));
        }

        let mut child = command.spawn().map_err(|source| CaptureError::Spawn {
            cmd: self.cmd.clone(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| CaptureError::NoStdout {
            cmd: self.cmd.clone(),
        })?;

        let paused = Arc::new(AtomicBool::new(false));
        let reader_paused = Arc::clone(&paused);
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(text) = line else { break };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if reader_paused.load(Ordering::Acquire) {
                    continue;
                }
                events.send(AppEvent::Decode(text.to_string()));
            }
            events.send(AppEvent::CaptureStopped);
        });

        info!(device = device.unwrap_or("(environment)"), "Scanner launched");
        Ok(Box::new(ProcessHandle { child, paused }))
    }
}

#[derive(Debug)]
struct ProcessHandle {
    child: Child,
    paused: Arc<AtomicBool>,
}

impl CaptureHandle for ProcessHandle {
    fn pause(&mut self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Release);
    }

    fn shutdown(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owns at most one live acquisition. Starting a new session always stops
/// the previous one first; switching cameras is a full stop/start cycle.
pub struct CaptureSession {
    backend: Box<dyn CaptureBackend>,
    active: Option<Box<dyn CaptureHandle>>,
}

impl CaptureSession {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    /// Two-tier acquisition: exact device first, then one retry with a
    /// generic environment-facing request before surfacing an error.
    pub fn start(&mut self, device: &str, events: EventBus) -> Result<(), CaptureError> {
        self.stop();
        let handle = match self.backend.spawn(Some(device), events.clone()) {
            Ok(handle) => handle,
            Err(first) => {
                warn!("Exact-device start failed ({first}); retrying generic request");
                self.backend.spawn(None, events)?
            }
        };
        self.active = Some(handle);
        info!(device, "Capture session started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.shutdown();
            info!("Capture session stopped");
        }
    }

    pub fn pause(&mut self) {
        if let Some(handle) = self.active.as_mut() {
            handle.pause();
        }
    }

    pub fn resume(&mut self) {
        if let Some(handle) = self.active.as_mut() {
            handle.resume();
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.active.is_some()
    }
}

/// Capture backend for unit and headless integration tests: never spawns a
/// process; tests inject decode events straight into the bus.
#[derive(Clone, Default)]
pub struct StubCaptureBackend {
    paused: Arc<AtomicBool>,
    spawned: Arc<AtomicUsize>,
}

impl StubCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::Acquire)
    }
}

impl CaptureBackend for StubCaptureBackend {
    fn spawn(
        &self,
        _device: Option<&str>,
        _events: EventBus,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        self.spawned.fetch_add(1, Ordering::AcqRel);
        self.paused.store(false, Ordering::Release);
        Ok(Box::new(StubHandle {
            paused: Arc::clone(&self.paused),
        }))
    }
}

#[derive(Debug)]
struct StubHandle {
    paused: Arc<AtomicBool>,
}

impl CaptureHandle for StubHandle {
    fn pause(&mut self) {
        self.paused.store(true, Ordering::Release);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Release);
    }

    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted backend: first-tier outcome is configurable, records the
    /// device arguments it was asked for.
    struct ScriptedBackend {
        exact_fails: bool,
        generic_fails: bool,
        requests: Arc<Mutex<Vec<Option<String>>>>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptedBackend {
        fn new(exact_fails: bool, generic_fails: bool) -> Self {
            Self {
                exact_fails,
                generic_fails,
                requests: Arc::new(Mutex::new(Vec::new())),
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[derive(Debug)]
    struct CountingHandle {
        shutdowns: Arc<AtomicUsize>,
    }

    impl CaptureHandle for CountingHandle {
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::AcqRel);
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn spawn(
            &self,
            device: Option<&str>,
            _events: EventBus,
        ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
            self.requests
                .lock()
                .unwrap()
                .push(device.map(str::to_string));
            let fails = if device.is_some() {
                self.exact_fails
            } else {
                self.generic_fails
            };
            if fails {
                return Err(CaptureError::DeviceGone {
                    device: device.unwrap_or("(environment)").to_string(),
                });
            }
            Ok(Box::new(CountingHandle {
                shutdowns: Arc::clone(&self.shutdowns),
            }))
        }
    }

    #[test]
    fn start_prefers_exact_device() {
        let backend = ScriptedBackend::new(false, false);
        let requests = Arc::clone(&backend.requests);
        let (bus, _rx) = EventBus::channel();

        let mut session = CaptureSession::new(Box::new(backend));
        session.start("/dev/video0", bus).unwrap();

        assert!(session.is_scanning());
        assert_eq!(
            *requests.lock().unwrap(),
            vec![Some("/dev/video0".to_string())]
        );
    }

    #[test]
    fn start_falls_back_to_generic_request() {
        let backend = ScriptedBackend::new(true, false);
        let requests = Arc::clone(&backend.requests);
        let (bus, _rx) = EventBus::channel();

        let mut session = CaptureSession::new(Box::new(backend));
        session.start("/dev/video0", bus).unwrap();

        assert!(session.is_scanning());
        assert_eq!(
            *requests.lock().unwrap(),
            vec![Some("/dev/video0".to_string()), None]
        );
    }

    #[test]
    fn start_surfaces_error_when_both_tiers_fail() {
        let backend = ScriptedBackend::new(true, true);
        let (bus, _rx) = EventBus::channel();

        let mut session = CaptureSession::new(Box::new(backend));
        let result = session.start("/dev/video0", bus);

        assert_matches!(result, Err(CaptureError::DeviceGone { .. }));
        assert!(!session.is_scanning());
    }

    #[test]
    fn restart_stops_previous_acquisition() {
        let backend = ScriptedBackend::new(false, false);
        let shutdowns = Arc::clone(&backend.shutdowns);
        let (bus, _rx) = EventBus::channel();

        let mut session = CaptureSession::new(Box::new(backend));
        session.start("/dev/video0", bus.clone()).unwrap();
        session.start("/dev/video1", bus).unwrap();

        assert_eq!(shutdowns.load(Ordering::Acquire), 1);
        assert!(session.is_scanning());
    }

    #[test]
    fn pause_and_resume_reach_the_handle() {
        let backend = StubCaptureBackend::new();
        let probe = backend.clone();
        let (bus, _rx) = EventBus::channel();

        let mut session = CaptureSession::new(Box::new(backend));
        session.start("/dev/video0", bus).unwrap();

        session.pause();
        assert!(probe.is_paused());
        session.resume();
        assert!(!probe.is_paused());
    }

    #[test]
    fn scanner_rejects_missing_exact_device() {
        let backend = ScannerBackend::new("zbarcam");
        let (bus, _rx) = EventBus::channel();

        let result = backend.spawn(Some("/dev/no-such-video9"), bus);
        assert_matches!(result, Err(CaptureError::DeviceGone { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn scanner_forwards_stdout_lines_and_reports_eof() {
        // `echo` prints its arguments and exits: one decode line, then EOF.
        let backend = ScannerBackend::new("echo");
        let (bus, rx) = EventBus::channel();

        let mut handle = backend.spawn(None, bus).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_matches!(first, AppEvent::Decode(text) if text == "--raw --nodisplay");
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_matches!(second, AppEvent::CaptureStopped);

        handle.shutdown();
    }
}
