use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, TimeZone};

// Headless integration using the internal runtime + Station without a TTY.
// Verifies the scan-submit-cache flow end to end via Runner/ChannelEventSource.

use fichaje::backend::{AttendanceBackend, BackendError, StaticBackend};
use fichaje::camera::CameraDirectory;
use fichaje::capture::StubCaptureBackend;
use fichaje::runtime::{AppEvent, ChannelEventSource, EventBus, FixedTicker, Runner};
use fichaje::state::{EventKind, SessionState};
use fichaje::station::{Station, StatusKind};
use fichaje::store::MemoryStateStore;

struct Harness {
    station: Station,
    backend: Arc<StaticBackend>,
    runner: Runner<ChannelEventSource, FixedTicker>,
    _sysfs: tempfile::TempDir,
}

fn harness(people: &[&str], initial: SessionState) -> Harness {
    let sysfs = tempfile::tempdir().unwrap();
    let node = sysfs.path().join("video0");
    std::fs::create_dir_all(&node).unwrap();
    std::fs::write(node.join("name"), "Kiosk Camera").unwrap();

    let backend = Arc::new(StaticBackend::with_people(people));
    let (bus, rx) = EventBus::channel();
    let station = Station::new(
        "administrativo",
        Arc::clone(&backend) as Arc<dyn AttendanceBackend>,
        Box::new(MemoryStateStore::new(initial)),
        Box::new(StubCaptureBackend::new()),
        CameraDirectory::with_root(sysfs.path()),
        bus,
    );
    let runner = Runner::new(
        ChannelEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    Harness {
        station,
        backend,
        runner,
        _sysfs: sysfs,
    }
}

/// Steps the station until the in-flight submission resolves.
fn drive_until_submitted(station: &mut Station, runner: &Runner<ChannelEventSource, FixedTicker>) {
    for _ in 0..2000u32 {
        match runner.step() {
            ev @ AppEvent::Submitted(_) => {
                station.handle_event(ev);
                return;
            }
            ev => station.handle_event(ev),
        }
    }
    panic!("submission never resolved");
}

#[test]
fn scenario_ana_checks_in() {
    let mut h = harness(&["Ana", "Beto"], SessionState::default());
    h.station.bootstrap();
    assert_eq!(h.station.selected_name().as_deref(), Some("Ana"));

    let decode_time = Local.with_ymd_and_hms(2024, 5, 1, 8, 5, 0).unwrap();
    h.station.on_decode_at("XYZ", decode_time, Instant::now());

    drive_until_submitted(&mut h.station, &h.runner);

    let status = h.station.status();
    assert_eq!(status.kind, StatusKind::Ok);
    assert!(status.text.contains("Ana"), "{}", status.text);
    assert!(
        status.text.contains("Ingreso registrado: 2024-05-01 08:05"),
        "{}",
        status.text
    );

    let day = h
        .station
        .state()
        .day("2024-05-01".parse().unwrap())
        .expect("day recorded");
    assert_eq!(
        day.ingreso,
        Some(chrono::NaiveTime::from_hms_opt(8, 5, 0).unwrap())
    );
    assert_eq!(day.salida, None);

    let submissions = h.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].name, "Ana");
    assert_eq!(submissions[0].raw, "XYZ");
    assert_eq!(submissions[0].date, "2024-05-01".parse().unwrap());
}

#[test]
fn rapid_decode_burst_posts_once() {
    let mut h = harness(&["Ana"], SessionState::default());
    h.station.bootstrap();

    // A capture loop reports the same code many times while it stays in frame.
    for _ in 0..8 {
        h.station.on_decode("XYZ");
    }
    drive_until_submitted(&mut h.station, &h.runner);

    assert_eq!(h.backend.submission_count(), 1);
}

#[test]
fn failed_submission_keeps_history_byte_identical() {
    let mut h = harness(&["Ana"], SessionState::default());
    h.backend.enqueue_outcome(Err(BackendError::Rejected {
        reason: "fuera de horario".into(),
    }));
    h.station.bootstrap();

    let before = serde_json::to_vec(h.station.state()).unwrap();

    h.station.on_decode("XYZ");
    drive_until_submitted(&mut h.station, &h.runner);

    let after = serde_json::to_vec(h.station.state()).unwrap();
    assert_eq!(before, after);
    assert_eq!(h.station.status().kind, StatusKind::Error);
    assert!(h.station.status().text.contains("fuera de horario"));
}

#[test]
fn salida_fills_the_other_column() {
    let mut h = harness(&["Ana"], SessionState::default());
    h.backend.enqueue_outcome(Ok(EventKind::Ingreso));
    h.backend.enqueue_outcome(Ok(EventKind::Salida));
    h.station.bootstrap();

    let morning = Local.with_ymd_and_hms(2024, 5, 1, 8, 5, 0).unwrap();
    let t0 = Instant::now();
    h.station.on_decode_at("XYZ", morning, t0);
    drive_until_submitted(&mut h.station, &h.runner);

    // Let the cooldown elapse (with a wide margin), then scan out in the evening.
    h.station.on_tick(t0 + Duration::from_secs(60));
    let evening = Local.with_ymd_and_hms(2024, 5, 1, 17, 30, 0).unwrap();
    h.station
        .on_decode_at("XYZ", evening, t0 + Duration::from_secs(61));
    drive_until_submitted(&mut h.station, &h.runner);

    let day = h
        .station
        .state()
        .day("2024-05-01".parse().unwrap())
        .unwrap();
    assert_eq!(
        day.ingreso,
        Some(chrono::NaiveTime::from_hms_opt(8, 5, 0).unwrap())
    );
    assert_eq!(
        day.salida,
        Some(chrono::NaiveTime::from_hms_opt(17, 30, 0).unwrap())
    );
}

#[test]
fn empty_roster_never_reaches_the_network() {
    let mut h = harness(
        &[],
        SessionState {
            name: Some("Ana".into()),
            ..Default::default()
        },
    );
    h.station.bootstrap();
    assert!(h.station.free_mode());

    h.station.on_decode("XYZ");

    assert_eq!(h.backend.submission_count(), 0);
    assert_eq!(h.station.status().kind, StatusKind::Warn);
    assert!(h.station.status().text.contains("Selecciona un nombre"));
}
