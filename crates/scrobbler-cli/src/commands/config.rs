use super::prompts;
use super::sync_ui::is_interactive;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use owo_colors::OwoColorize;
use scrobble_config::{Config, CredentialStore, PathManager};
use scrobble_core::ExclusionFilter;
use serde_json::json;

pub fn show_config(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config_file = paths.config_file();

    if !config_file.exists() {
        output.warn(format!("Configuration file not found at: {}", config_file.display()));
        output.info("Create one with 'scrobbler config init --client-id <id>'.");
        return Ok(());
    }

    let config = Config::load_from_file(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    let credentials = CredentialStore::open(paths.credentials_file())
        .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    let problem = config.validate().err().map(|e| e.to_string());

    if !output.is_human() {
        let mut value = serde_json::to_value(&config)?;
        if let Some(id) = value.pointer_mut("/simkl/client_id") {
            *id = json!(mask_secret(&config.simkl.client_id));
        }
        output.data(
            "config",
            &json!({
                "config_file": config_file,
                "config": value,
                "valid": problem.is_none(),
                "problem": problem,
                "authenticated": credentials.get_simkl_access_token().is_some(),
                "username": credentials.get_simkl_username(),
            }),
        );
        return Ok(());
    }
    if output.is_quiet() {
        return Ok(());
    }

    let mut files = titled_table("Files");
    files.add_row(vec![Cell::new("Config"), Cell::new(config_file.display())]);
    files.add_row(vec![Cell::new("Credentials"), Cell::new(paths.credentials_file().display())]);
    files.add_row(vec![Cell::new("Sync state"), Cell::new(paths.sync_state_file().display())]);
    files.add_row(vec![Cell::new("Library"), Cell::new(paths.library_file().display())]);
    output.println(files.to_string());

    let simkl = &config.simkl;
    let account = match (credentials.get_simkl_access_token(), credentials.get_simkl_username()) {
        (Some(_), Some(name)) => name.green().to_string(),
        (Some(_), None) => "✓".green().to_string(),
        (None, _) => "not authenticated".red().to_string(),
    };
    let mut simkl_table = titled_table("SIMKL");
    simkl_table.add_row(vec![Cell::new("Client ID"), Cell::new(mask_secret(&simkl.client_id))]);
    simkl_table.add_row(vec![Cell::new("API"), Cell::new(&simkl.api_base)]);
    simkl_table.add_row(vec![Cell::new("Timeout"), Cell::new(format!("{}s", simkl.timeout_secs))]);
    simkl_table.add_row(vec![
        Cell::new("Retries"),
        Cell::new(format!(
            "{} attempts, {}-{} ms backoff",
            simkl.retry.max_attempts, simkl.retry.min_delay_ms, simkl.retry.max_delay_ms
        )),
    ]);
    simkl_table.add_row(vec![Cell::new("Account"), Cell::new(account)]);
    output.println(simkl_table.to_string());

    let scrobble = &config.scrobble;
    let mut scrobble_table = titled_table("Scrobbling");
    scrobble_table.add_row(vec![Cell::new("Movies"), Cell::new(check(scrobble.scrobble_movies))]);
    scrobble_table.add_row(vec![Cell::new("Episodes"), Cell::new(check(scrobble.scrobble_episodes))]);
    scrobble_table.add_row(vec![
        Cell::new("Watched at"),
        Cell::new(format!("{}%", scrobble.watched_threshold)),
    ]);
    scrobble_table.add_row(vec![
        Cell::new("SIMKL completes at"),
        Cell::new(format!("{}%", scrobble.remote_complete_threshold)),
    ]);
    scrobble_table.add_row(vec![
        Cell::new("Progress every"),
        Cell::new(format!("{} min", scrobble.progress_interval_secs / 60)),
    ]);
    scrobble_table.add_row(vec![
        Cell::new("Exclusions"),
        Cell::new(ExclusionFilter::from_config(&config.exclusions).summary()),
    ]);
    output.println(scrobble_table.to_string());

    let sync = &config.sync;
    let mut sync_table = titled_table("Sync");
    sync_table.add_row(vec![
        Cell::new("Movies"),
        Cell::new(format!("export {}  import {}", check(sync.export_movies), check(sync.import_movies))),
    ]);
    sync_table.add_row(vec![
        Cell::new("Episodes"),
        Cell::new(format!("export {}  import {}", check(sync.export_episodes), check(sync.import_episodes))),
    ]);
    sync_table.add_row(vec![Cell::new("Prune remote"), Cell::new(check(sync.prune_remote))]);
    sync_table.add_row(vec![Cell::new("Delta sync"), Cell::new(check(sync.delta))]);
    sync_table.add_row(vec![Cell::new("On startup"), Cell::new(check(sync.sync_on_startup))]);
    sync_table.add_row(vec![Cell::new("On library update"), Cell::new(check(sync.sync_on_library_update))]);
    let interval = match config.scheduler.interval.as_duration() {
        Some(every) => format!("every {} h", every.as_secs() / 3600),
        None => "off".to_string(),
    };
    sync_table.add_row(vec![Cell::new("Scheduled"), Cell::new(interval)]);
    output.println(sync_table.to_string());

    if let Some(log_file) = &config.logging.file {
        output.info(format!("Service log: {}", log_file.display()));
    }
    if let Some(problem) = problem {
        output.warn(format!("Configuration is not usable yet: {}", problem));
    }
    Ok(())
}

pub fn init_config(client_id: Option<String>, force: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config_file = paths.config_file();

    if config_file.exists() && !force {
        let overwrite = is_interactive()
            && output.is_human()
            && prompts::prompt_yes_no(
                &format!("{} already exists. Overwrite it?", config_file.display()),
                false,
            )?;
        if !overwrite {
            output.warn(format!(
                "Configuration already exists at {} (use --force to overwrite)",
                config_file.display()
            ));
            return Ok(());
        }
    }

    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create {}: {}", paths.config_dir().display(), e))?;

    let mut config = Config::template();
    if let Some(id) = client_id.filter(|id| !id.trim().is_empty()) {
        config.simkl.client_id = id.trim().to_string();
    }
    config
        .save_to_file(&config_file)
        .map_err(|e| eyre!("Failed to write {}: {}", config_file.display(), e))?;

    output.success(format!("Configuration written to {}", config_file.display()));
    if config.validate().is_err() {
        output.info("Set simkl.client_id in the file, then run 'scrobbler auth'.");
    } else {
        output.info("Next: run 'scrobbler auth' to link your SIMKL account.");
    }
    Ok(())
}

fn titled_table(title: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new(""),
    ]);
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn check(enabled: bool) -> String {
    if enabled {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

/// Keep enough of a secret to recognise it
fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("0123456789abcdef"), "0123****");
    }
}
