//! Live sessions against a loopback stand-in for the sonar.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::Bytes;
use sonarlink::protocol::format::{MESSAGE_HEADER_SIZE, MessageId, SIMPLE_FIRE_PAYLOAD_SIZE};
use sonarlink::protocol::{SimpleFire, SimplePingBuilder, build_message};
use sonarlink::sleeper::RealSleeper;
use sonarlink::{
    FanRenderer, FrameLimit, PingRate, ProcessControl, Session, SessionConfig, SessionState, Sonar,
    SonarAddress, SonarConfiguration, StopReason, lifecycle,
};

type Server<T> = JoinHandle<std::io::Result<T>>;

/// Accepts one connection, reads the fire message, sends `messages`, then waits for the
/// client to hang up.
fn fake_sonar(messages: Vec<Bytes>) -> Result<(SocketAddr, Server<SimpleFire>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let handle = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept()?;
        socket.set_read_timeout(Some(Duration::from_secs(10)))?;

        let mut fire = vec![0u8; MESSAGE_HEADER_SIZE + SIMPLE_FIRE_PAYLOAD_SIZE];
        socket.read_exact(&mut fire)?;
        let fire = SimpleFire::parse(&fire).map_err(std::io::Error::other)?;

        for message in &messages {
            socket.write_all(message)?;
        }

        drain_until_hangup(&mut socket);
        Ok(fire)
    });

    Ok((addr, handle))
}

/// Serves one connection per entry in `sessions`. Every connection but the last is
/// closed by the sonar side once its messages are sent.
fn flaky_sonar(sessions: Vec<Vec<Bytes>>) -> Result<(SocketAddr, Server<usize>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let handle = std::thread::spawn(move || {
        let last = sessions.len().saturating_sub(1);
        for (n, messages) in sessions.iter().enumerate() {
            let (mut socket, _) = listener.accept()?;
            socket.set_read_timeout(Some(Duration::from_secs(10)))?;

            let mut fire = vec![0u8; MESSAGE_HEADER_SIZE + SIMPLE_FIRE_PAYLOAD_SIZE];
            socket.read_exact(&mut fire)?;
            for message in messages {
                socket.write_all(message)?;
            }
            if n < last {
                socket.shutdown(Shutdown::Write)?;
            }
            drain_until_hangup(&mut socket);
        }
        Ok(sessions.len())
    });

    Ok((addr, handle))
}

fn drain_until_hangup(socket: &mut TcpStream) {
    let mut buf = [0u8; 256];
    while let Ok(n) = socket.read(&mut buf) {
        if n == 0 {
            break;
        }
    }
}

fn wait_for_frames(session: &Session<FanRenderer>, frames: u64, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if session.frames() >= frames {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn connect(addr: SocketAddr) -> sonarlink::Result<Session<FanRenderer>> {
    let sonar = SonarConfiguration::default();
    Sonar::connect(SonarAddress::Explicit(addr), sonar, FanRenderer::default())
}

fn pings(n: u32) -> Vec<Bytes> {
    (0..n).map(|id| SimplePingBuilder::new().ping_id(id).build()).collect()
}

#[test]
fn live_session_stops_at_frame_limit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let capture = dir.path().join("live.oculus");

    let mut messages = pings(10);
    messages.insert(1, build_message(MessageId::Dummy, &[1, 2, 3, 4]));
    let expected: Vec<u8> =
        [&messages[0], &messages[2], &messages[3]].iter().flat_map(|m| m.iter().copied()).collect();

    let (addr, server) = fake_sonar(messages)?;
    let sonar = SonarConfiguration::default().with_ping_rate(PingRate::High);
    let config = SessionConfig::live(SonarAddress::Explicit(addr), sonar)
        .with_capture(&capture)
        .with_frame_limit(FrameLimit::from_count(3))
        .with_report_interval(Duration::from_millis(20));

    let mut session = Session::new(config, FanRenderer::default(), ProcessControl::new());
    let summary = lifecycle::run(&mut session, &RealSleeper)?;

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.reason, Some(StopReason::FrameLimit));
    assert_eq!(summary.stats.invalid, 1);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(std::fs::read(&capture)?, expected);

    let fire = server.join().map_err(|_| anyhow::anyhow!("server panicked"))??;
    assert_eq!(fire.ping_rate, PingRate::High);
    Ok(())
}

#[test]
fn interrupt_from_another_thread_stops_live_session() -> Result<()> {
    let (addr, server) = fake_sonar(pings(2))?;
    let control = ProcessControl::new();
    let config =
        SessionConfig::live(SonarAddress::Explicit(addr), SonarConfiguration::default())
            .with_report_interval(Duration::from_millis(20));
    let mut session = Session::new(config, FanRenderer::default(), control.clone());

    let interrupter = {
        let control = control.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            control.interrupt();
        })
    };

    let started = Instant::now();
    let summary = lifecycle::run(&mut session, &RealSleeper)?;
    interrupter.join().ok();

    assert_eq!(summary.reason, Some(StopReason::Interrupted));
    assert_eq!(summary.frames, 2);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!control.active.is_set());
    server.join().ok();
    Ok(())
}

#[test]
fn unreachable_sonar_still_starts_and_stops_cleanly() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut session = connect(addr)?;
    assert_eq!(session.state(), SessionState::Running);
    std::thread::sleep(Duration::from_millis(100));
    assert!(!session.should_stop());

    let first = session.stop()?;
    let second = session.stop()?;
    assert_eq!(first.frames, 0);
    assert_eq!(first, second);
    assert_eq!(first.reason, Some(StopReason::Requested));
    Ok(())
}

#[test]
fn sonar_disconnect_reconnects_and_keeps_counting() -> Result<()> {
    let (addr, server) = flaky_sonar(vec![pings(2), pings(2)])?;
    let mut session = connect(addr)?;

    assert!(wait_for_frames(&session, 2, Duration::from_secs(5)));
    assert_eq!(session.state(), SessionState::Running);
    assert!(!session.should_stop());

    // The second batch only arrives after the reconnect delay.
    let started = Instant::now();
    assert!(wait_for_frames(&session, 4, Duration::from_secs(10)));
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(session.state(), SessionState::Running);

    let summary = session.stop()?;
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.reason, Some(StopReason::Requested));
    assert_eq!(server.join().map_err(|_| anyhow::anyhow!("server panicked"))??, 2);
    Ok(())
}
