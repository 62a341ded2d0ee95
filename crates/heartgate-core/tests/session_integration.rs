//! End-to-end session tests.
//!
//! These tests load a realistic TOML configuration, then drive a
//! session the way the host application does: sensor samples in,
//! periodic ticks with roster snapshots, media changes, and chart
//! reads at the end.

use chrono::{DateTime, Duration, TimeZone, Utc};
use indoc::indoc;

use heartgate_core::{
    Event, GovernancePhase, MappingConfig, MediaDescriptor, Participant, SensorSample, Session,
    SessionConfig,
};

const CONFIG: &str = indoc! {r##"
    coin_time_unit_ms = 10000
    tick_interval_ms = 1000
    governed_labels = ["workout"]
    grace_period_secs = 20

    [[zones]]
    id = "rest"
    name = "Rest"
    color = "#9e9e9e"
    min = 0
    coins = 0

    [[zones]]
    id = "warm"
    name = "Warm-up"
    color = "#4caf50"
    min = 110
    coins = 2

    [[zones]]
    id = "push"
    name = "Push"
    color = "#f44336"
    min = 150
    coins = 5

    [[users]]
    name = "ada"
    device_id = "hrm-1"

    [[users]]
    name = "bo"
    device_id = "hrm-2"

    [[policies]]
    id = "duo"
    name = "Duo rules"
    min_participants = 0

    [policies.base_requirement]
    warm = "all"
"##};

fn session() -> Session {
    let config = SessionConfig::from_toml(CONFIG).unwrap();
    Session::with_seed(config, Some(11)).unwrap()
}

fn sample(device: &str, bpm: f64, at: DateTime<Utc>) -> SensorSample {
    SensorSample {
        device_id: device.into(),
        profile: "heart_rate".into(),
        value: bpm,
        timestamp: at.timestamp_millis() as u64,
    }
}

fn participant(name: &str, device: &str, bpm: u32, active: bool) -> Participant {
    Participant {
        id: name.into(),
        name: name.into(),
        device_id: Some(device.into()),
        heart_rate: Some(bpm),
        is_active: active,
        zone_id: None,
        zone_color: None,
        is_guest: false,
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = SessionConfig::from_toml(CONFIG).unwrap();
    assert_eq!(config.coin_time_unit_ms, 10_000);
    assert_eq!(config.zones.len(), 3);
    assert_eq!(config.users[1].device_id.as_deref(), Some("hrm-2"));
    assert_eq!(config.policies[0].base_requirement.len(), 1);
}

#[test]
fn test_samples_ticks_and_events_flow() {
    let mut session = session();
    let start = t0();
    session.start(start);

    let roster = [
        participant("ada", "hrm-1", 120, true),
        participant("bo", "hrm-2", 130, true),
    ];
    // One minute of 1 Hz ticks with samples every 5s from each device.
    for i in 0..60i64 {
        let at = start + Duration::seconds(i);
        if i % 5 == 0 {
            session.ingest_sample(&sample("hrm-1", 120.0, at), at);
            session.ingest_sample(&sample("hrm-2", 130.0, at), at);
        }
        session.tick(&roster, at);
    }

    // 55s of warm-zone accrual at 10s per unit, rate 2: 10 coins each.
    let summary = session.reward_summary();
    assert_eq!(summary.total_coins, 20);
    assert_eq!(summary.per_user["ada"].total_coins, 10);
    assert_eq!(summary.buckets.get("#4caf50"), Some(&20));

    let events = session.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::SessionStarted { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ParticipantActive { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CoinsCommitted { user, .. } if user == "bo")));
    // Drained means drained.
    assert!(session.drain_events().is_empty());
}

#[test]
fn test_governance_reacts_to_media_and_roster() {
    let mut session = session();
    let start = t0();
    session.start(start);

    session.set_media(
        Some(MediaDescriptor {
            id: "vid".into(),
            labels: vec!["workout".into()],
            media_type: Some("video".into()),
        }),
        start,
    );
    assert_eq!(session.governance_state(start).status, GovernancePhase::Init);

    let warm = [
        participant("ada", "hrm-1", 120, true),
        participant("bo", "hrm-2", 130, true),
    ];
    session.tick(&warm, start + Duration::seconds(1));
    let state = session.governance_state(start + Duration::seconds(1));
    assert_eq!(state.status, GovernancePhase::Green);
    assert!(!state.video_locked);

    // "all" requires both; one cooling down starts the countdown.
    let cooled = [
        participant("ada", "hrm-1", 120, true),
        participant("bo", "hrm-2", 80, true),
    ];
    session.tick(&cooled, start + Duration::seconds(10));
    let state = session.governance_state(start + Duration::seconds(10));
    assert_eq!(state.status, GovernancePhase::Yellow);
    assert_eq!(state.countdown_seconds_remaining, Some(20));

    session.tick(&cooled, start + Duration::seconds(31));
    let state = session.governance_state(start + Duration::seconds(31));
    assert_eq!(state.status, GovernancePhase::Red);
    assert!(state.video_locked);
}

#[test]
fn test_chart_reflects_recorded_session() {
    let mut session = session();
    let start = t0();
    session.start(start);

    let roster = [participant("ada", "hrm-1", 120, true)];
    for i in 0..10i64 {
        let at = start + Duration::seconds(i);
        session.ingest_sample(&sample("hrm-1", 120.0, at), at);
        session.tick(&roster, at);
    }

    let paths = session.chart("ada", &MappingConfig::default());
    assert!(!paths.is_empty());
    // All coordinates land in the unit square.
    for path in &paths {
        for &(x, y) in &path.path_data {
            assert!((0.0..=1.0).contains(&x), "x out of range: {x}");
            assert!((0.0..=1.0).contains(&y), "y out of range: {y}");
        }
    }
}

#[test]
fn test_restart_after_stop_is_clean() {
    let mut session = session();
    let start = t0();
    session.start(start);

    let roster = [participant("ada", "hrm-1", 120, true)];
    for i in 0..30i64 {
        let at = start + Duration::seconds(i);
        session.ingest_sample(&sample("hrm-1", 120.0, at), at);
        session.tick(&roster, at);
    }
    assert!(session.reward_summary().total_coins > 0);

    session.stop(start + Duration::seconds(30));
    session.drain_events();

    session.start(start + Duration::seconds(60));
    assert_eq!(session.reward_summary().total_coins, 0);
    assert!(session.series().is_empty());
    assert!(session
        .chart("ada", &MappingConfig::default())
        .is_empty());
}

#[test]
fn test_ticks_ignored_while_stopped() {
    let mut session = session();
    let start = t0();

    // Never started: nothing records.
    let roster = [participant("ada", "hrm-1", 120, true)];
    session.ingest_sample(&sample("hrm-1", 120.0, start), start);
    session.tick(&roster, start);

    assert!(session.series().is_empty());
    assert!(session.drain_events().is_empty());
}
