use super::context::AppContext;
use super::sync_ui::SyncUI;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use scrobble_core::{SyncError, SyncMode, SyncReport};
use scrobble_models::MediaType;
use tokio_util::sync::CancellationToken;

/// Failures listed per media type before the rest is summarized
const MAX_LISTED_FAILURES: usize = 10;

pub async fn run_sync(movies: bool, episodes: bool, full: bool, dry_run: bool, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");
    let ctx = AppContext::load()?;

    let cancel = CancellationToken::new();
    let engine = ctx.engine(cancel.clone())?.with_dry_run(dry_run);

    let enabled = engine.enabled_media_types();
    let requested = requested_types(movies, episodes);
    let media_types: Vec<MediaType> = match requested {
        None => enabled.clone(),
        Some(requested) => {
            for media_type in requested.iter().filter(|t| !enabled.contains(*t)) {
                output.warn(format!("Syncing {}s is disabled in the configuration", media_type));
            }
            requested.into_iter().filter(|t| enabled.contains(t)).collect()
        }
    };
    if media_types.is_empty() {
        output.warn("Nothing to sync: every sync direction is disabled");
        return Ok(());
    }

    let mode = if full { SyncMode::Full } else { SyncMode::Delta };

    // Ctrl-C stops between items; whatever was applied stays applied
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let ui = SyncUI::new(&media_types, output.is_human() && !output.is_quiet());
    let results = engine.run_all(&media_types, mode).await;
    for (media_type, result) in media_types.iter().zip(&results) {
        ui.finish(*media_type, result);
    }

    let mut reports = Vec::new();
    let mut errors = Vec::new();
    for (media_type, result) in media_types.into_iter().zip(results) {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => errors.push((media_type, e)),
        }
    }

    if output.is_human() {
        if !reports.is_empty() && !output.is_quiet() {
            output.println(render_reports(&reports).to_string());
        }
        for report in &reports {
            print_failures(report, output);
        }
    } else {
        output.data("sync", &reports);
    }

    if errors.iter().any(|(_, e)| *e == SyncError::Unauthorized) {
        return Err(eyre!("SIMKL rejected the access token. Run 'scrobbler auth' again."));
    }
    for (media_type, e) in &errors {
        output.error(format!("{} sync failed: {}", media_type, e));
    }
    if !errors.is_empty() {
        return Err(eyre!("{} of the requested syncs failed", errors.len()));
    }

    if dry_run {
        output.info("Dry run: nothing was changed");
    } else if reports.iter().all(SyncReport::is_clean) {
        output.success("Sync completed");
    } else {
        output.warn("Sync finished with problems; the next sync will retry");
    }
    Ok(())
}

fn requested_types(movies: bool, episodes: bool) -> Option<Vec<MediaType>> {
    let mut types = Vec::new();
    if movies {
        types.push(MediaType::Movie);
    }
    if episodes {
        types.push(MediaType::Episode);
    }
    (!types.is_empty()).then_some(types)
}

/// One-line outcome of a run
pub fn summarize(report: &SyncReport) -> String {
    if report.dry_run {
        return format!(
            "would push {}, pull {}, prune {}",
            report.planned_push, report.planned_pull, report.planned_prune
        );
    }
    let mut summary = format!(
        "pushed {}, pulled {}, pruned {}",
        report.pushed, report.pulled, report.pruned
    );
    if report.skipped > 0 {
        summary.push_str(&format!(", {} not in library", report.skipped));
    }
    if !report.failures.is_empty() {
        summary.push_str(&format!(", {} failed", report.failures.len()));
    }
    if report.cancelled {
        summary.push_str(" (cancelled)");
    }
    summary
}

fn render_reports(reports: &[SyncReport]) -> Table {
    let dry_run = reports.iter().any(|r| r.dry_run);
    let mut table = Table::new();
    let header = if dry_run {
        vec!["Type", "Mode", "To push", "To pull", "To prune"]
    } else {
        vec!["Type", "Mode", "Pushed", "Pulled", "Pruned", "Skipped", "Failed", "Time"]
    };
    table.set_header(
        header
            .into_iter()
            .map(|h| Cell::new(h).fg(Color::Cyan).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );

    for report in reports {
        let mut row = vec![
            Cell::new(format!("{}s", report.media_type)),
            Cell::new(report.mode.to_string()),
        ];
        if dry_run {
            row.extend([
                Cell::new(report.planned_push),
                Cell::new(report.planned_pull),
                Cell::new(report.planned_prune),
            ]);
        } else {
            let failed = Cell::new(report.failures.len());
            row.extend([
                Cell::new(report.pushed),
                Cell::new(report.pulled),
                Cell::new(report.pruned),
                Cell::new(report.skipped),
                if report.failures.is_empty() { failed } else { failed.fg(Color::Red) },
                Cell::new(format!("{:.1}s", report.duration.as_secs_f64())),
            ]);
        }
        table.add_row(row);
    }

    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn print_failures(report: &SyncReport, output: &Output) {
    for failure in report.failures.iter().take(MAX_LISTED_FAILURES) {
        output.warn(format!(
            "{} {}: {}",
            failure.direction,
            failure.item.identity.display_title(),
            failure.error
        ));
    }
    if report.failures.len() > MAX_LISTED_FAILURES {
        output.warn(format!(
            "... and {} more {} failures",
            report.failures.len() - MAX_LISTED_FAILURES,
            report.media_type
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(dry_run: bool) -> SyncReport {
        SyncReport {
            media_type: MediaType::Movie,
            mode: SyncMode::Delta,
            dry_run,
            planned_push: 3,
            planned_pull: 2,
            planned_prune: 1,
            pushed: if dry_run { 0 } else { 3 },
            pulled: if dry_run { 0 } else { 1 },
            pruned: 0,
            skipped: if dry_run { 0 } else { 1 },
            failures: Vec::new(),
            cancelled: false,
            watermark_advanced: !dry_run,
            duration: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&report(true)), "would push 3, pull 2, prune 1");
        assert_eq!(
            summarize(&report(false)),
            "pushed 3, pulled 1, pruned 0, 1 not in library"
        );

        let mut cancelled = report(false);
        cancelled.cancelled = true;
        assert!(summarize(&cancelled).ends_with("(cancelled)"));
    }

    #[test]
    fn test_requested_types() {
        assert_eq!(requested_types(false, false), None);
        assert_eq!(requested_types(true, false), Some(vec![MediaType::Movie]));
        assert_eq!(
            requested_types(true, true),
            Some(vec![MediaType::Movie, MediaType::Episode])
        );
    }

    #[test]
    fn test_render_table_has_a_row_per_type() {
        let rendered = render_reports(&[report(false)]).to_string();
        assert!(rendered.contains("movies"));
        assert!(rendered.contains("Pushed"));

        let planned = render_reports(&[report(true)]).to_string();
        assert!(planned.contains("To push"));
    }
}
