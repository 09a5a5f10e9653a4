use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use scrobble_core::{SyncError, SyncReport};
use scrobble_models::MediaType;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::time::Duration;

/// One spinner per media type while a sync runs. Falls back to structured
/// log lines when not attached to a terminal.
pub struct SyncUI {
    _multi: MultiProgress,
    spinners: BTreeMap<MediaType, ProgressBar>,
    interactive: bool,
}

impl SyncUI {
    pub fn new(media_types: &[MediaType], enabled: bool) -> Self {
        let interactive = enabled && is_interactive();
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");

        let mut spinners = BTreeMap::new();
        for media_type in media_types {
            if interactive {
                let spinner = multi.add(ProgressBar::new_spinner());
                spinner.set_style(style.clone());
                spinner.set_message(format!("{}s: reconciling...", media_type));
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinners.insert(*media_type, spinner);
            } else {
                tracing::info!(operation = "sync_progress", media_type = %media_type, "Reconciling");
            }
        }

        Self {
            _multi: multi,
            spinners,
            interactive,
        }
    }

    pub fn finish(&self, media_type: MediaType, result: &Result<SyncReport, SyncError>) {
        let message = match result {
            Ok(report) => format!("{}s: {}", media_type, super::sync::summarize(report)),
            Err(e) => format!("{}s: failed: {}", media_type, e),
        };
        match self.spinners.get(&media_type) {
            Some(spinner) if self.interactive => spinner.finish_with_message(message),
            _ => tracing::info!(operation = "sync_progress", media_type = %media_type, message = %message, "Finished"),
        }
    }
}

pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
}
