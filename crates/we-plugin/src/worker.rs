//! Scanner worker
//!
//! Runs in a separate OS process spawned by the coordinator (the main
//! executable relaunched with `--waveedit-plugin-scanner`). A plug-in that
//! crashes at probe time takes this process down, not the editor; the
//! coordinator observes the lost pipe and carries on.

use std::io::{BufRead, Write};

use crate::protocol::{self, CoordinatorMessage, WorkerMessage};
use crate::{PluginFormatKind, PluginManager, PluginResult};

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn send<W: Write>(output: &mut W, msg: &WorkerMessage) -> PluginResult<()> {
    let line = protocol::encode(msg)?;
    writeln!(output, "{line}")?;
    output.flush()?;
    Ok(())
}

/// Worker main loop over arbitrary streams. Returns when told to shut down
/// or when the input pipe closes.
pub fn run_worker_io<R: BufRead, W: Write>(input: R, mut output: W) -> PluginResult<()> {
    send(&mut output, &WorkerMessage::Ready { pid: std::process::id() })?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let message: CoordinatorMessage = match protocol::decode(&line) {
            Ok(message) => message,
            Err(err) => {
                send(
                    &mut output,
                    &WorkerMessage::Error {
                        message: err.to_string(),
                    },
                )?;
                continue;
            }
        };

        match message {
            CoordinatorMessage::Heartbeat { time } => {
                send(&mut output, &WorkerMessage::HeartbeatAck { time })?;
            }
            CoordinatorMessage::Shutdown => break,
            CoordinatorMessage::ScanPlugin { path, format } => {
                send(
                    &mut output,
                    &WorkerMessage::ScanStarted {
                        path: path.clone(),
                        time: now_millis(),
                    },
                )?;

                let response = match PluginFormatKind::from_str_loose(&format) {
                    None => WorkerMessage::ScanFailed {
                        path,
                        error: format!("unknown plugin format '{format}'"),
                    },
                    Some(kind) => {
                        match PluginManager::probe_file(std::path::Path::new(&path), kind) {
                            Ok(descriptors) => WorkerMessage::ScanComplete { path, descriptors },
                            Err(err) => WorkerMessage::ScanFailed {
                                path,
                                error: err.to_string(),
                            },
                        }
                    }
                };
                send(&mut output, &response)?;
            }
        }
    }

    Ok(())
}

/// Entry point for worker mode on the real process: stdio pipes to the
/// parent. Exit code 0 on orderly shutdown.
pub fn run_worker() -> i32 {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    match run_worker_io(stdin.lock(), stdout.lock()) {
        Ok(()) => 0,
        Err(err) => {
            log::error!("scanner worker terminated: {err}");
            1
        }
    }
}
