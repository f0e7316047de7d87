use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use taperec::cli::{parse_line, Cli, Command, ParseError};
use taperec::guard::ExitGuards;
use taperec::logging::init_tracing;
use taperec::recorder::{Providers, Recorder, RecorderSettings};
use taperec::retry::ForegroundSignal;
use taperec::session::{Action, Outcome, Snapshot};
use taperec::shutdown::{ShutdownCoordinator, ShutdownPhase};

/// Bound on waiting for the capture to drain after a shutdown stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.load_config().context("Failed to load configuration")?;

    let guards = ExitGuards::new();
    let foreground = Arc::new(ForegroundSignal::new());
    let providers = Providers::from_config(&config, guards.clone(), foreground.clone());
    let recorder = Recorder::spawn(RecorderSettings::from_config(&config), providers);

    let coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.handle();
    let printer = tokio::spawn(print_snapshots(recorder.subscribe(), cli.json));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                if guards.should_block() {
                    tracing::warn!("Recording in progress; type 'stop' first or 'quit' to stop and exit");
                } else {
                    coordinator.signal();
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    coordinator.signal();
                    break;
                };
                // Typing at the prompt means the user is at the terminal.
                foreground.notify_foreground();
                match parse_line(&line, &config) {
                    Ok(Command::Action(action)) => recorder.send(action).await?,
                    Ok(Command::Status) => print_snapshot(&recorder.snapshot(), cli.json),
                    Ok(Command::Quit) => coordinator.signal(),
                    Err(ParseError::Empty) => {}
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }

    coordinator.advance(ShutdownPhase::StoppingSession);
    let mut snapshots = recorder.subscribe();
    if !snapshots.borrow().is_inactive() {
        recorder.send(Action::Stop).await?;
        let drained = tokio::time::timeout(
            STOP_TIMEOUT,
            snapshots.wait_for(|snapshot| snapshot.is_inactive()),
        )
        .await;
        if drained.is_err() {
            tracing::warn!("Session did not stop in time, tearing down anyway");
        }
    }

    coordinator.advance(ShutdownPhase::Teardown);
    let reports = recorder.shutdown().await?;
    for report in &reports {
        tracing::debug!(
            released = report.released,
            failed = report.failed,
            pipe = ?report.pipe,
            "Teardown report"
        );
    }

    printer.abort();
    coordinator.advance(ShutdownPhase::Complete);
    Ok(())
}

async fn print_snapshots(mut snapshots: watch::Receiver<Snapshot>, json: bool) {
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        print_snapshot(&snapshot, json);
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

fn print_snapshot(snapshot: &Snapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "Failed to encode snapshot"),
        }
        return;
    }

    let actions: Vec<&str> = snapshot.valid_actions.iter().map(|a| a.as_str()).collect();
    let mut line = format!("[{}] actions: {}", snapshot.state, actions.join(", "));
    if let Some(session) = snapshot.session {
        line.push_str(&format!(" session: {session}"));
    }
    match &snapshot.last_outcome {
        Some(Outcome::Error { message }) => {
            line.push_str(&format!(" last: error ({message})"));
        }
        Some(Outcome::Done) => line.push_str(" last: done"),
        None => {}
    }
    println!("{line}");
}
