// End to end tests of the telemetry to display pipeline
//
// A scripted telemetry source feeds the snapshot builder, the protocol server answers
// requests on an in-memory transport, and the written frames are decoded back.

use std::{thread, time::Duration};

use dashlink::{
    CompetitorEntry, Controller, ControllerSettings, FRAME_SIZE, FrameFormat, GapPolicy,
    MockTelemetrySource, ProtocolServer, SessionInfo, SharedSnapshot, Shutdown,
    SnapshotBuilder, VarValue, decode_frame, encode_frame,
    serial::{MockTransport, REQUEST_DATA},
    telemetry::{DriverInfo, ibt::Pacing, recorder, replay::RecordingReplaySource, vars},
};
use tempfile::TempDir;

/// A field of `cars` drivers, car 0 leading and every car a tenth of a lap behind the next.
fn race_session(cars: i32, player_car_idx: i32) -> (SessionInfo, MockTelemetrySource) {
    let session = SessionInfo {
        player_car_idx,
        drivers: (0..cars)
            .map(|car_idx| DriverInfo {
                car_idx,
                user_name: format!("Driver {}", car_idx),
                ..Default::default()
            })
            .collect(),
    };

    let mut source = MockTelemetrySource::new(Some(session.clone()));
    push_race_frame(&mut source, cars, 27.8);
    (session, source)
}

fn push_race_frame(source: &mut MockTelemetrySource, cars: i32, speed: f32) {
    source.push_frame([
        (vars::SPEED, VarValue::Float(speed)),
        (vars::GEAR, VarValue::Int(3)),
        (vars::RPM, VarValue::Float(6500.)),
        (vars::LAP, VarValue::Int(4)),
        (vars::LAP_BEST_LAP_TIME, VarValue::Float(83.456)),
        (vars::LAP_DELTA_TO_BEST_LAP, VarValue::Float(0.123)),
        (
            vars::CAR_IDX_LAP_DIST_PCT,
            VarValue::FloatArray((0..cars).map(|i| 0.95 - i as f32 * 0.1).collect()),
        ),
        (
            vars::CAR_IDX_EST_TIME,
            VarValue::FloatArray((0..cars).map(|i| 95. - i as f32 * 10.).collect()),
        ),
        (vars::CAR_IDX_LAP, VarValue::IntArray(vec![4; cars as usize])),
    ]);
}

#[test]
fn test_request_returns_sampled_telemetry() {
    let (_, source) = race_session(6, 3);
    let mut builder = SnapshotBuilder::new(source, GapPolicy::Relative, Duration::ZERO);
    let shared = SharedSnapshot::default();
    shared.publish(builder.sample().unwrap());

    let shutdown = Shutdown::default();
    let mut transport = MockTransport::new();
    transport
        .push_byte(REQUEST_DATA as u8)
        .shutdown_when_done(shutdown.clone());
    let written = transport.written();

    let stats = ProtocolServer::new(transport, shared.clone(), FrameFormat::Dashboard).run(&shutdown);
    assert_eq!(stats.served, 1);

    let written = written.lock().unwrap();
    assert_eq!(written.len(), FRAME_SIZE);
    assert_eq!(&written[1..6], b"100\0\0");

    let frame = decode_frame(&written).unwrap();
    assert_eq!(frame.gear, " 3");
    assert_eq!(frame.rpm, "6500");
    assert_eq!(frame.lap, "4  ");
    assert_eq!(frame.delta, "-.12");
    assert_eq!(frame.best_lap, "01:23.456");

    let names: Vec<&str> = frame.rows.iter().map(|r| r.driver_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Driver 1", "Driver 2", "Driver 3", "Driver 4", "Driver 5"]
    );
    assert_eq!(frame.rows[0].time_behind, "20.000");
    assert_eq!(frame.rows[2].time_behind, "0.000");
    assert_eq!(shared.read().position, Some(4));
}

#[test]
fn test_leader_window_is_padded() {
    let (_, source) = race_session(2, 0);
    let mut builder = SnapshotBuilder::new(source, GapPolicy::GapToAhead, Duration::ZERO);
    let snapshot = builder.sample().unwrap().clone();

    let frame = decode_frame(&encode_frame(FrameFormat::Dashboard, &snapshot)).unwrap();
    assert_eq!(frame.rows[0].driver_name, "---");
    assert_eq!(frame.rows[1].driver_name, "---");
    assert_eq!(frame.rows[2].driver_name, "Driver 0");
    assert_eq!(frame.rows[2].time_behind, "0.000");
    assert_eq!(frame.rows[3].driver_name, "Driver 1");
    assert_eq!(frame.rows[3].time_behind, "10.000");
    assert_eq!(frame.rows[4].driver_name, "---");
    assert_eq!(snapshot.standings[4], CompetitorEntry::padding());
}

#[test]
fn test_controller_serves_recorded_session() {
    let temp_dir = TempDir::new().unwrap();
    let recording = temp_dir.path().join("race.jsonl");

    // record a short session
    let (session, mut source) = race_session(3, 1);
    push_race_frame(&mut source, 3, 50.);
    let (recorded, handle) = recorder::record_to(source, recording.clone()).unwrap();
    let mut builder = SnapshotBuilder::new(recorded, GapPolicy::Relative, Duration::ZERO);
    while builder.sample().is_ok() {}
    drop(builder);
    handle.join().unwrap().unwrap();

    // serve it back through the whole controller
    let replay = RecordingReplaySource::from_file(&recording, Pacing::EveryUpdate).unwrap();
    assert_eq!(replay.len(), 2);

    let controller = Controller::new(ControllerSettings {
        sample_period: Duration::from_millis(1),
        frame_format: FrameFormat::Basic,
        ..Default::default()
    });
    let shared = controller.snapshot();
    let shutdown = controller.shutdown_handle();
    let watcher = thread::spawn(move || {
        while shared.read().tick < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        shutdown.trigger();
        shared.read()
    });

    controller.run(replay, MockTransport::new()).unwrap();
    let last = watcher.join().unwrap();

    assert_eq!(last.speed_kph, 180);
    assert_eq!(last.gear, 3);
    assert_eq!(last.standings[2].driver_name, session.drivers[1].user_name);
}
