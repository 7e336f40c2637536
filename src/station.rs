use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use itertools::Itertools;
use tracing::warn;

use crate::backend::{AttendanceBackend, AttendanceEvent, BackendError};
use crate::camera::{self, CameraDescriptor, CameraDirectory};
use crate::capture::{CaptureBackend, CaptureSession};
use crate::gate::SubmissionGate;
use crate::runtime::{AppEvent, EventBus};
use crate::state::{fmt_hhmm, truncate_to_minute, EventKind, SessionState};
use crate::store::StateStore;
use crate::summary::SummaryRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Ok,
    Warn,
    Error,
}

/// The inline one-line feedback area; every outcome lands here.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusLine {
    fn info(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            text: text.into(),
        }
    }

    fn ok(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Ok,
            text: text.into(),
        }
    }

    fn warn(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Warn,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::info("Listo.")
    }
}

/// Context captured at decode time, applied to the local cache only if the
/// backend accepts the submission.
#[derive(Debug, Clone)]
struct PendingSubmission {
    name: String,
    date: NaiveDate,
    time: NaiveTime,
}

/// The attendance station core: owns the session state, the roster, the
/// camera directory, the capture session and the submission gate. Driven
/// one event at a time from the runner, so it is fully exercisable without
/// a terminal.
pub struct Station {
    role: String,
    backend: Arc<dyn AttendanceBackend>,
    store: Box<dyn StateStore>,
    state: SessionState,
    roster: Vec<String>,
    selected: Option<usize>,
    camera_dir: CameraDirectory,
    cameras: Vec<CameraDescriptor>,
    current_camera: Option<String>,
    capture: CaptureSession,
    gate: SubmissionGate,
    pending: Option<PendingSubmission>,
    bus: EventBus,
    status: StatusLine,
}

impl Station {
    pub fn new(
        role: impl Into<String>,
        backend: Arc<dyn AttendanceBackend>,
        store: Box<dyn StateStore>,
        capture_backend: Box<dyn CaptureBackend>,
        camera_dir: CameraDirectory,
        bus: EventBus,
    ) -> Self {
        let state = store.load();
        let current_camera = state.camera_id.clone();
        Self {
            role: role.into(),
            backend,
            store,
            state,
            roster: Vec::new(),
            selected: None,
            camera_dir,
            cameras: Vec::new(),
            current_camera,
            capture: CaptureSession::new(capture_backend),
            gate: SubmissionGate::new(),
            pending: None,
            bus,
            status: StatusLine::default(),
        }
    }

    /// Startup sequence: roster, restored selections, camera directory.
    /// Either half may fail without stopping the other.
    pub fn bootstrap(&mut self) {
        match self.backend.fetch_people() {
            Ok(people) => {
                self.roster = people.into_iter().unique().collect();
                if !self.roster.is_empty() {
                    self.selected = self
                        .state
                        .name
                        .as_ref()
                        .and_then(|name| self.roster.iter().position(|n| n == name))
                        .or(Some(0));
                }
            }
            Err(e) => {
                warn!("Roster fetch failed: {e}");
                self.status = StatusLine::warn(
                    "No se pudo cargar la lista desde la hoja Miembros. Revisa la URL o permisos.",
                );
            }
        }
        self.refresh_cameras();
    }

    /// Re-enumerates cameras and re-applies the default-pick policy. Also
    /// the recovery path after granting camera permission.
    pub fn refresh_cameras(&mut self) {
        match self.camera_dir.list() {
            Ok(cameras) => {
                self.current_camera =
                    camera::pick_default(&cameras, self.state.camera_id.as_deref());
                self.cameras = cameras;
            }
            Err(warning) => {
                self.cameras.clear();
                self.current_camera = None;
                self.status = StatusLine::warn(warning.to_string());
            }
        }
    }

    // ---- selections -------------------------------------------------------

    pub fn person_next(&mut self) {
        if self.roster.is_empty() {
            return;
        }
        let next = match self.selected {
            Some(i) => (i + 1).min(self.roster.len() - 1),
            None => 0,
        };
        self.select_person(next);
    }

    pub fn person_prev(&mut self) {
        if self.roster.is_empty() {
            return;
        }
        let prev = self.selected.unwrap_or(0).saturating_sub(1);
        self.select_person(prev);
    }

    fn select_person(&mut self, idx: usize) {
        if let Some(name) = self.roster.get(idx) {
            self.selected = Some(idx);
            self.state.name = Some(name.clone());
            self.persist();
        }
    }

    pub fn camera_next(&mut self) {
        let Some(current) = self.camera_index() else {
            if let Some(first) = self.cameras.first() {
                let id = first.id.clone();
                self.set_camera(id);
            }
            return;
        };
        if current + 1 < self.cameras.len() {
            let id = self.cameras[current + 1].id.clone();
            self.set_camera(id);
        }
    }

    pub fn camera_prev(&mut self) {
        if let Some(current) = self.camera_index() {
            if current > 0 {
                let id = self.cameras[current - 1].id.clone();
                self.set_camera(id);
            }
        }
    }

    /// Cycles to the next camera; with fewer than two devices there is
    /// nothing to alternate to.
    pub fn flip_camera(&mut self) {
        match camera::next_after(&self.cameras, self.current_camera.as_deref()) {
            Some(next) => self.set_camera(next),
            None => {
                self.status = StatusLine::info("No hay más cámaras detectadas para alternar.");
            }
        }
    }

    fn set_camera(&mut self, id: String) {
        self.current_camera = Some(id.clone());
        self.state.camera_id = Some(id);
        self.persist();
        // No hot-swap: switching while scanning is a full stop/start cycle.
        if self.capture.is_scanning() {
            self.capture.stop();
            self.start_capture();
        }
    }

    // ---- capture ----------------------------------------------------------

    pub fn start_capture(&mut self) {
        if self.current_camera.is_none() {
            self.refresh_cameras();
        }
        let Some(device) = self.current_camera.clone() else {
            return; // refresh_cameras already surfaced the warning
        };
        match self.capture.start(&device, self.bus.clone()) {
            Ok(()) => {
                self.state.camera_id = Some(device);
                self.persist();
                self.status = StatusLine::info("Escaneando… apunta el código QR a la cámara.");
            }
            Err(e) => self.status = StatusLine::error(e.to_string()),
        }
    }

    pub fn stop_capture(&mut self) {
        if self.capture.is_scanning() {
            self.capture.stop();
            self.status = StatusLine::info("Escaneo detenido.");
        }
    }

    fn on_capture_stopped(&mut self) {
        if self.capture.is_scanning() {
            self.capture.stop();
            self.status = StatusLine::warn("El escáner terminó inesperadamente.");
        }
    }

    // ---- submission -------------------------------------------------------

    pub fn on_decode(&mut self, raw: &str) {
        self.on_decode_at(raw, Local::now(), Instant::now());
    }

    /// Gate entry point. Everything observable happens against the clocks
    /// captured here, which is what makes the flow deterministic in tests.
    pub fn on_decode_at(&mut self, raw: &str, now: DateTime<Local>, clock: Instant) {
        if !self.gate.try_begin() {
            return; // drop-while-busy: repeated frames of the same code
        }
        self.capture.pause();

        let Some(name) = self.selected_name() else {
            self.status = StatusLine::warn("Selecciona un nombre primero.");
            self.gate.settle(clock); // validation aborts still cool down
            return;
        };

        let date = now.date_naive();
        let time = truncate_to_minute(now.time());
        self.pending = Some(PendingSubmission {
            name: name.clone(),
            date,
            time,
        });
        self.status = StatusLine::info(format!(
            "Leyó: “{raw}” — {date} {} — Enviando…",
            fmt_hhmm(time)
        ));

        let event = AttendanceEvent {
            role: self.role.clone(),
            date,
            name,
            stamp: now.with_timezone(&Utc).to_rfc3339(),
            raw: raw.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let bus = self.bus.clone();
        std::thread::spawn(move || {
            let outcome = backend.submit(&event);
            bus.send(AppEvent::Submitted(outcome));
        });
    }

    pub fn on_submitted(&mut self, outcome: Result<EventKind, BackendError>, clock: Instant) {
        match (outcome, self.pending.take()) {
            (Ok(kind), Some(p)) => {
                self.state.name = Some(p.name.clone());
                self.state.record(p.date, kind, p.time);
                self.persist();
                self.status = StatusLine::ok(format!(
                    "{} — {kind} registrado: {} {}",
                    p.name,
                    p.date.format("%Y-%m-%d"),
                    fmt_hhmm(p.time)
                ));
            }
            (Err(e), _) => {
                // Every failure class leaves the local cache untouched.
                self.status = StatusLine::error(e.to_string());
            }
            (Ok(_), None) => warn!("Submission resolved with no pending context"),
        }
        self.gate.settle(clock);
    }

    pub fn on_tick(&mut self, clock: Instant) {
        if self.gate.poll(clock) {
            self.capture.resume();
        }
    }

    /// Dispatches the non-key events of the unified stream.
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Decode(text) => self.on_decode(&text),
            AppEvent::Submitted(outcome) => self.on_submitted(outcome, Instant::now()),
            AppEvent::Tick => self.on_tick(Instant::now()),
            AppEvent::CaptureStopped => self.on_capture_stopped(),
            AppEvent::Key(_) | AppEvent::Resize => {}
        }
    }

    // ---- local history ----------------------------------------------------

    pub fn clear_history(&mut self) {
        self.state.clear_history();
        self.persist();
        self.status = StatusLine::info("Histórico local borrado. (La hoja no se toca)");
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!("Failed to persist session state: {e}");
        }
    }

    // ---- projections ------------------------------------------------------

    /// With a configured roster, the current selection falls back to the
    /// persisted name; with no roster at all the station is in free-text/
    /// disabled mode and submissions must fail validation.
    pub fn selected_name(&self) -> Option<String> {
        if self.roster.is_empty() {
            return None;
        }
        self.selected
            .and_then(|i| self.roster.get(i))
            .cloned()
            .or_else(|| self.state.name.clone())
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
    }

    pub fn summary(&self, today: NaiveDate) -> SummaryRow {
        let selected = self.selected.and_then(|i| self.roster.get(i)).map(String::as_str);
        SummaryRow::project(&self.state, selected, today)
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// True when the backend-side people list is unconfigured.
    pub fn free_mode(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn cameras(&self) -> &[CameraDescriptor] {
        &self.cameras
    }

    pub fn camera_index(&self) -> Option<usize> {
        self.current_camera
            .as_deref()
            .and_then(|id| self.cameras.iter().position(|c| c.id == id))
    }

    pub fn is_scanning(&self) -> bool {
        self.capture.is_scanning()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }
}
