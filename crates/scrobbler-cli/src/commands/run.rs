use super::context::AppContext;
use super::sync::summarize;
use crate::logging;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use scrobble_core::{
    ExclusionFilter, Scheduler, ScrobbleService, Scrobbler, ServiceHandle, ServiceNotice, SyncError, SyncMode,
    SyncReason, SyncTrigger,
};
use scrobble_models::{PlaybackEvent, PlaybackEventKind};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One line of host input on stdin
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostMessage {
    Command { command: HostCommand },
    Playback(PlaybackEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HostCommand {
    /// The host library finished a scan or clean
    LibraryUpdated,
    Sync,
    FullSync,
}

fn parse_line(line: &str) -> Result<Option<HostMessage>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

pub async fn run_service(no_startup_sync: bool, verbose: u8, quiet: bool, output: &Output) -> Result<()> {
    let ctx = AppContext::load()?;
    logging::init_logging_with_file(verbose, quiet, ctx.config.logging.file.clone())
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    let cancel = CancellationToken::new();
    let engine = Arc::new(ctx.engine(cancel.clone())?);
    let exclusions = ExclusionFilter::from_config(&ctx.config.exclusions);
    info!(exclusions = %exclusions.summary(), "Loaded exclusions");

    let scrobbler = Scrobbler::new(ctx.api.clone(), ctx.config.scrobble.clone(), exclusions);
    let (service, handle) = ScrobbleService::new(scrobbler, engine);
    let mut notices = service.subscribe();
    let service_task = tokio::spawn(service.run());

    let scheduler = Scheduler::new(
        handle.clone(),
        ctx.config.scheduler.interval.as_duration(),
        ctx.config.sync.sync_on_startup && !no_startup_sync,
        cancel.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    output.info("Scrobbler running, reading playback events from stdin (Ctrl-C to stop)");

    let mut reporter = NoticeReporter::new(output);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!(operation = "service_interrupt", "Interrupted, stopping");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if dispatch(&handle, &line, &mut reporter).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!(operation = "stdin_closed", "Input closed, stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read input, stopping");
                    break;
                }
            },
            notice = notices.recv() => match notice {
                Ok(notice) => reporter.report(&notice),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Dropped service notices"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    // Stops the active session and cancels in-flight syncs
    let _ = handle.shutdown();
    cancel.cancel();
    drop(handle);

    service_task
        .await
        .map_err(|e| eyre!("Scrobble service failed: {}", e))?;
    loop {
        match notices.try_recv() {
            Ok(notice) => reporter.report(&notice),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "Scheduler task failed");
    }

    output.success("Scrobbler stopped");
    Ok(())
}

fn dispatch(handle: &ServiceHandle, line: &str, reporter: &mut NoticeReporter<'_>) -> Result<(), scrobble_core::ServiceStopped> {
    let message = match parse_line(line) {
        Ok(Some(message)) => message,
        Ok(None) => return Ok(()),
        Err(e) => {
            warn!(error = %e, line = %line, "Ignoring malformed input line");
            return Ok(());
        }
    };

    match message {
        HostMessage::Playback(event) => {
            if event.kind == PlaybackEventKind::Started {
                reporter.now_playing = Some(event.identity.display_title());
            }
            handle.handle_event(event)
        }
        HostMessage::Command { command } => {
            debug!(?command, "Host command");
            let trigger = match command {
                HostCommand::LibraryUpdated => SyncTrigger::all(SyncReason::LibraryUpdate, SyncMode::Delta),
                HostCommand::Sync => SyncTrigger::all(SyncReason::Manual, SyncMode::Delta),
                HostCommand::FullSync => SyncTrigger::all(SyncReason::Manual, SyncMode::Full),
            };
            handle.trigger_sync(trigger)
        }
    }
}

/// Turns service notices into user-facing output
struct NoticeReporter<'a> {
    output: &'a Output,
    /// Title of the last started item; transitions don't carry it
    now_playing: Option<String>,
}

impl<'a> NoticeReporter<'a> {
    fn new(output: &'a Output) -> Self {
        Self {
            output,
            now_playing: None,
        }
    }

    fn title(&self) -> &str {
        self.now_playing.as_deref().unwrap_or("current item")
    }

    fn report(&mut self, notice: &ServiceNotice) {
        match notice {
            ServiceNotice::Playback(transition) => {
                if self.output.is_human() {
                    if transition.completions() > 0 {
                        self.output.success(format!("Marked as watched on SIMKL: {}", self.title()));
                    }
                    for failure in &transition.failures {
                        self.output
                            .warn(format!("SIMKL call failed for {}: {}", self.title(), failure.error));
                    }
                } else if !transition.emissions.is_empty() || !transition.failures.is_empty() {
                    self.output.data(
                        "playback",
                        &json!({
                            "title": self.now_playing,
                            "from": transition.from.to_string(),
                            "to": transition.to.to_string(),
                            "emissions": transition.emissions.iter().map(|e| format!("{:?}", e)).collect::<Vec<_>>(),
                            "completed": transition.completions() > 0,
                            "failures": transition.failures.iter().map(|f| f.error.to_string()).collect::<Vec<_>>(),
                        }),
                    );
                }
            }
            ServiceNotice::PlaybackSkipped(reason) => {
                self.output.info(format!("Not scrobbling: {}", reason));
            }
            ServiceNotice::Sync {
                reason,
                media_type,
                result,
            } => match result {
                Ok(report) => {
                    if self.output.is_human() {
                        self.output.info(format!("{} sync ({}): {}", media_type, reason, summarize(report)));
                    } else {
                        self.output.data("sync", report);
                    }
                }
                Err(SyncError::ReconciliationInProgress(_)) => {
                    debug!(media_type = %media_type, "Sync skipped, one is already running");
                }
                Err(e) => self.output.warn(format!("{} sync ({}) failed: {}", media_type, reason, e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrobble_models::MediaType;

    #[test]
    fn test_parse_playback_line() {
        let line = r#"{"kind":"started","media_type":"movie","source_path":"/media/m.mkv","identity":{"ids":{"imdb":"tt0133093"}}}"#;
        match parse_line(line).unwrap() {
            Some(HostMessage::Playback(event)) => {
                assert_eq!(event.kind, PlaybackEventKind::Started);
                assert_eq!(event.media_type, MediaType::Movie);
                assert_eq!(event.source_path, "/media/m.mkv");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_command_lines() {
        assert!(matches!(
            parse_line(r#"{"command":"library_updated"}"#).unwrap(),
            Some(HostMessage::Command {
                command: HostCommand::LibraryUpdated
            })
        ));
        assert!(matches!(
            parse_line(r#"{"command":"full_sync"}"#).unwrap(),
            Some(HostMessage::Command {
                command: HostCommand::FullSync
            })
        ));
    }

    #[test]
    fn test_blank_and_malformed_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"kind":"started"}"#).is_err());
    }
}
