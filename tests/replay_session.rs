//! Replay sessions end to end: file in, counters and capture out.

use std::path::{Path, PathBuf};

use anyhow::Result;
use bytes::Bytes;
use sonarlink::protocol::format::MessageId;
use sonarlink::protocol::{SimplePingBuilder, build_message};
use sonarlink::sleeper::MockSleeper;
use sonarlink::{
    FanRenderer, FrameLimit, ProcessControl, Session, SessionConfig, SessionState, Sonar,
    StopReason, lifecycle,
};

struct Fixture {
    _dir: tempfile::TempDir,
    input: PathBuf,
    capture: PathBuf,
    valid: Vec<Bytes>,
}

/// Three valid pings with one invalid message between the first and second.
fn three_valid_one_invalid() -> Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let valid: Vec<Bytes> = (1..=3)
        .map(|id| SimplePingBuilder::new().ping_id(id).dimensions(20, 16).build())
        .collect();
    let invalid = SimplePingBuilder::new().ping_id(99).data_size(1).build();

    let mut data = Vec::new();
    data.extend_from_slice(&valid[0]);
    data.extend_from_slice(&invalid);
    data.extend_from_slice(&valid[1]);
    data.extend_from_slice(&valid[2]);

    let input = dir.path().join("input.oculus");
    std::fs::write(&input, data)?;
    let capture = dir.path().join("capture.oculus");
    Ok(Fixture { _dir: dir, input, capture, valid })
}

fn concat(messages: &[Bytes]) -> Vec<u8> {
    messages.iter().flat_map(|m| m.iter().copied()).collect()
}

fn run(config: SessionConfig) -> Result<(sonarlink::SessionSummary, Session<FanRenderer>)> {
    let mut session = Session::new(config, FanRenderer::default(), ProcessControl::new());
    let summary = lifecycle::run(&mut session, &MockSleeper::new())?;
    Ok((summary, session))
}

#[test]
fn replay_counts_valid_pings_and_captures_them() -> Result<()> {
    let fixture = three_valid_one_invalid()?;
    let config = SessionConfig::replay(&fixture.input).with_capture(&fixture.capture);
    let (summary, session) = run(config)?;

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.stats.received, 4);
    assert_eq!(summary.stats.invalid, 1);
    assert_eq!(summary.reason, Some(StopReason::EndOfStream));
    assert_eq!(summary.to_string(), "3 sonar packets decoded");
    assert_eq!(session.state(), SessionState::Stopped);

    assert_eq!(std::fs::read(&fixture.capture)?, concat(&fixture.valid));
    assert_eq!(summary.stats.bytes_captured, concat(&fixture.valid).len() as u64);
    Ok(())
}

#[test]
fn frame_limit_stops_before_third_ping() -> Result<()> {
    let fixture = three_valid_one_invalid()?;
    let (summary, session) = run(
        SessionConfig::replay(&fixture.input)
            .with_capture(&fixture.capture)
            .with_frame_limit(FrameLimit::from_count(2)),
    )?;

    assert_eq!(summary.frames, 2);
    assert_eq!(summary.reason, Some(StopReason::FrameLimit));
    // first valid, invalid, second valid; the third is never read
    assert_eq!(summary.stats.received, 3);
    assert_eq!(std::fs::read(&fixture.capture)?, concat(&fixture.valid[..2]));
    assert_eq!(session.renderer().map(FanRenderer::frames_rendered), Some(2));
    Ok(())
}

#[test]
fn unwritable_capture_fails_at_start() -> Result<()> {
    let fixture = three_valid_one_invalid()?;
    let dir = fixture.capture.parent().unwrap_or(Path::new("/"));
    let capture = dir.join("no-such-dir").join("capture.oculus");

    let config = SessionConfig::replay(&fixture.input).with_capture(&capture);
    let mut session = Session::new(config, FanRenderer::default(), ProcessControl::new());
    let err = lifecycle::run(&mut session, &MockSleeper::new()).unwrap_err();

    assert!(err.is_open_error());
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.frames(), 0);
    assert!(!capture.exists());
    Ok(())
}

#[test]
fn capture_replays_to_the_same_result() -> Result<()> {
    let fixture = three_valid_one_invalid()?;
    run(SessionConfig::replay(&fixture.input).with_capture(&fixture.capture))?;

    let second = fixture.capture.with_file_name("second.oculus");
    let (summary, _) = run(SessionConfig::replay(&fixture.capture).with_capture(&second))?;

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.stats.invalid, 0);
    assert_eq!(std::fs::read(&second)?, std::fs::read(&fixture.capture)?);
    Ok(())
}

#[test]
fn unrecognized_input_is_an_open_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("photo.png");
    std::fs::write(&input, b"\x89PNG\r\n\x1a\n")?;

    let err = Sonar::open(&input, FanRenderer::default()).unwrap_err();
    assert!(err.is_open_error());
    Ok(())
}

#[test]
fn garbage_between_messages_is_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("noisy.oculus");
    let mut data = SimplePingBuilder::new().ping_id(1).build().to_vec();
    data.extend_from_slice(b"\x00\x01\x02 line noise ");
    data.extend_from_slice(&build_message(MessageId::Dummy, &[0; 16]));
    data.extend_from_slice(&SimplePingBuilder::new().ping_id(2).build());
    std::fs::write(&input, data)?;

    let mut session = Sonar::open(&input, FanRenderer::default())?;
    assert_eq!(session.drive_replay()?, StopReason::EndOfStream);
    let summary = session.stop()?;
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.stats.invalid, 1);
    Ok(())
}

#[test]
fn dropping_a_running_session_closes_capture() -> Result<()> {
    let fixture = three_valid_one_invalid()?;
    {
        let mut session = Session::new(
            SessionConfig::replay(&fixture.input).with_capture(&fixture.capture),
            FanRenderer::default(),
            ProcessControl::new(),
        );
        session.start()?;
        session.drive_replay()?;
    }
    assert_eq!(std::fs::read(&fixture.capture)?, concat(&fixture.valid));
    Ok(())
}
