use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::backend::BackendError;
use crate::state::EventKind;

/// Unified event type consumed by the app runner. Terminal input, ticks,
/// decoded scans and resolved submissions all arrive on one channel, so the
/// station stays a single-consumer loop.
#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    /// One decoded QR payload reported by the capture session.
    Decode(String),
    /// Outcome of the in-flight submission worker.
    Submitted(Result<EventKind, BackendError>),
    /// The external scanner process ended on its own.
    CaptureStopped,
}

/// Cloneable producer half of the event channel, handed to the capture
/// session and submission workers.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<AppEvent>,
}

impl EventBus {
    pub fn channel() -> (Self, Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// Best-effort send; a gone consumer means the app is shutting down.
    pub fn send(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }
}

/// Source of events for the runner.
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Consumer half over the shared channel (production and headless tests).
pub struct ChannelEventSource {
    rx: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Forwards crossterm key/resize events into the shared bus from a
/// dedicated reader thread.
pub fn spawn_terminal_events(bus: EventBus) {
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(CtEvent::Key(key)) => bus.send(AppEvent::Key(key)),
            Ok(CtEvent::Resize(_, _)) => bus.send(AppEvent::Resize),
            Ok(_) => {}
            Err(_) => break,
        }
    });
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }
}
