use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::state::EventKind;

const USER_AGENT: &str = concat!("fichaje/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One outbound check-in/check-out submission. Lives only for the duration
/// of a single request.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEvent {
    pub role: String,
    pub date: NaiveDate,
    pub name: String,
    /// Full RFC 3339 timestamp of the scan.
    pub stamp: String,
    /// Decoded QR payload, forwarded verbatim.
    pub raw: String,
}

/// Wire envelope the spreadsheet macro expects.
#[derive(Serialize)]
struct RegistroRequest<'a> {
    mode: &'static str,
    payload: &'a AttendanceEvent,
}

#[derive(Debug, Deserialize)]
struct RosterResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    people: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    ok: bool,
    #[serde(rename = "type")]
    kind: Option<EventKind>,
    error: Option<String>,
}

/// Everything that can go wrong talking to the backend. All variants are
/// surfaced inline and leave the local cache untouched.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Fetch falló (¿red?): {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} – {body}")]
    Http { status: u16, body: String },
    #[error("Respuesta no JSON: {body}")]
    Malformed { body: String },
    #[error("El servidor dijo: {reason}")]
    Rejected { reason: String },
}

/// Remote roster + attendance service. A trait seam so the station can be
/// driven by a fake in headless tests.
pub trait AttendanceBackend: Send + Sync {
    fn fetch_people(&self) -> Result<Vec<String>, BackendError>;
    fn submit(&self, event: &AttendanceEvent) -> Result<EventKind, BackendError>;
}

/// Classifies a roster response body. Separated from transport so the
/// parsing rules are testable without a live server.
pub fn classify_roster_response(
    success: bool,
    status: u16,
    body: &str,
) -> Result<Vec<String>, BackendError> {
    if !success {
        return Err(BackendError::Http {
            status,
            body: body.to_string(),
        });
    }
    let parsed: RosterResponse = serde_json::from_str(body).map_err(|_| BackendError::Malformed {
        body: body.to_string(),
    })?;
    if !parsed.ok {
        return Err(BackendError::Rejected {
            reason: parsed
                .error
                .unwrap_or_else(|| "No se pudo cargar la lista de miembros.".to_string()),
        });
    }
    Ok(parsed.people)
}

/// Classifies a submission response body.
///
/// Order matters and mirrors the recovery taxonomy: HTTP status first, then
/// JSON shape, then the application-level verdict. An `ok:true` response
/// that names no (or an unknown) event kind is malformed; the two-kind data
/// model is strict.
pub fn classify_submit_response(
    success: bool,
    status: u16,
    body: &str,
) -> Result<EventKind, BackendError> {
    if !success {
        return Err(BackendError::Http {
            status,
            body: body.to_string(),
        });
    }
    let parsed: SubmitResponse = serde_json::from_str(body).map_err(|_| BackendError::Malformed {
        body: body.to_string(),
    })?;
    if !parsed.ok {
        return Err(BackendError::Rejected {
            reason: parsed
                .error
                .unwrap_or_else(|| "Error desconocido".to_string()),
        });
    }
    parsed.kind.ok_or_else(|| BackendError::Malformed {
        body: body.to_string(),
    })
}

/// Blocking HTTP client against the spreadsheet web-app. Called from the
/// bootstrap path and from short-lived submission worker threads, never
/// from inside the draw loop.
pub struct HttpBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    role: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, role: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            role: role.into(),
        })
    }
}

impl AttendanceBackend for HttpBackend {
    fn fetch_people(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("mode", "meta"), ("role", self.role.as_str())])
            .send()?;
        let status = response.status();
        let body = response.text()?;
        let people = classify_roster_response(status.is_success(), status.as_u16(), &body)?;
        info!("Fetched roster with {} name(s)", people.len());
        Ok(people)
    }

    fn submit(&self, event: &AttendanceEvent) -> Result<EventKind, BackendError> {
        let envelope = RegistroRequest {
            mode: "registro",
            payload: event,
        };
        let body = serde_json::to_string(&envelope).map_err(|e| BackendError::Malformed {
            body: e.to_string(),
        })?;

        // The spreadsheet macro only accepts JSON delivered as plain text.
        let response = self
            .client
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=utf-8")
            .body(body)
            .send()?;
        let status = response.status();
        let text = response.text().unwrap_or_else(|_| "(sin cuerpo)".to_string());
        let kind = classify_submit_response(status.is_success(), status.as_u16(), &text)?;
        info!(kind = %kind, name = %event.name, "Submission accepted");
        Ok(kind)
    }
}

/// Canned backend for unit and headless integration tests: fixed roster,
/// scripted submission outcomes, records every submission it receives.
pub struct StaticBackend {
    roster: Result<Vec<String>, String>,
    outcomes: std::sync::Mutex<std::collections::VecDeque<Result<EventKind, BackendError>>>,
    submissions: std::sync::Mutex<Vec<AttendanceEvent>>,
}

impl StaticBackend {
    pub fn with_people(people: &[&str]) -> Self {
        Self {
            roster: Ok(people.iter().map(|s| s.to_string()).collect()),
            outcomes: std::sync::Mutex::new(std::collections::VecDeque::new()),
            submissions: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_roster_failure(reason: &str) -> Self {
        Self {
            roster: Err(reason.to_string()),
            outcomes: std::sync::Mutex::new(std::collections::VecDeque::new()),
            submissions: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queues the outcome for the next submission. With an empty queue,
    /// submissions resolve as `Ok(Ingreso)`.
    pub fn enqueue_outcome(&self, outcome: Result<EventKind, BackendError>) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
    }

    pub fn submissions(&self) -> Vec<AttendanceEvent> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl AttendanceBackend for StaticBackend {
    fn fetch_people(&self) -> Result<Vec<String>, BackendError> {
        match &self.roster {
            Ok(people) => Ok(people.clone()),
            Err(reason) => Err(BackendError::Rejected {
                reason: reason.clone(),
            }),
        }
    }

    fn submit(&self, event: &AttendanceEvent) -> Result<EventKind, BackendError> {
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(event.clone());
        }
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(Ok(EventKind::Ingreso))
    }
}
