use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use sonarlink::cli::Cli;
use sonarlink::render::snapshot;
use sonarlink::sleeper::RealSleeper;
use sonarlink::{
    FanRenderer, LatestFrame, ProcessControl, PublishingRenderer, Session, SessionConfig,
    SessionSummary, lifecycle, logging,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = cli.session_config().context("invalid arguments")?;
    info!(mode = %config.mode(), limit = %config.frame_limit, "Starting sonarlink");

    let control = ProcessControl::new();
    if let Err(e) = control.install_interrupt_handler() {
        warn!("Running without interrupt handling: {}", e);
    }

    let frames = LatestFrame::new();
    let summary = if cli.no_window {
        run_session(config, control, frames.clone())
    } else {
        run_with_window(config, control, frames.clone())
    }
    .context("sonar session failed")?;

    if let Some(path) = &cli.snapshot {
        match frames.latest() {
            Some(frame) => {
                snapshot::write_ppm(&frame, path).context("cannot write snapshot")?;
                info!("Saved last frame to {}", path.display());
            }
            None => warn!("No ping was rendered, snapshot not written"),
        }
    }

    println!("{}", summary);
    Ok(())
}

fn run_session(
    config: SessionConfig,
    control: ProcessControl,
    frames: LatestFrame,
) -> sonarlink::Result<SessionSummary> {
    let renderer = PublishingRenderer::new(FanRenderer::default(), frames);
    let mut session = Session::new(config, renderer, control);
    lifecycle::run(&mut session, &RealSleeper)
}

/// Run the session on a worker thread while the viewer holds the main thread.
#[cfg(feature = "gui")]
fn run_with_window(
    config: SessionConfig,
    control: ProcessControl,
    frames: LatestFrame,
) -> sonarlink::Result<SessionSummary> {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let finished = Arc::new(AtomicBool::new(false));
    let worker = {
        let (control, frames, finished) = (control.clone(), frames.clone(), finished.clone());
        std::thread::Builder::new().name("sonar-session".to_string()).spawn(move || {
            let result = run_session(config, control, frames);
            finished.store(true, Ordering::Release);
            result
        })?
    };

    if let Err(e) = sonarlink::viewer::run(frames, control, finished) {
        warn!("Cannot open viewer window, continuing without it: {}", e);
    }

    worker.join().map_err(|_| sonarlink::SonarError::Thread {
        reason: "session thread panicked".to_string(),
    })?
}

#[cfg(not(feature = "gui"))]
fn run_with_window(
    config: SessionConfig,
    control: ProcessControl,
    frames: LatestFrame,
) -> sonarlink::Result<SessionSummary> {
    warn!("Built without the gui feature; running without a window");
    run_session(config, control, frames)
}
