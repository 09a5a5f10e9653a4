use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use scrobble_config::PathManager;
use scrobble_core::LedgerStorage;
use std::fs;

pub fn run_clear(all: bool, state: bool, credentials: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();

    if !(all || state || credentials) {
        output.warn("No clear option specified. Use --state, --credentials, or --all");
        output.println("\nExample: scrobbler clear --state");
        return Ok(());
    }

    if all || state {
        clear_state(&paths, output)?;
    }
    if all || credentials {
        clear_credentials(&paths, output)?;
    }
    Ok(())
}

fn clear_state(paths: &PathManager, output: &Output) -> Result<()> {
    let ledger = LedgerStorage::new(paths.sync_state_file());
    let removed = ledger
        .clear()
        .map_err(|e| eyre!("Failed to clear sync state at {}: {}", ledger.path().display(), e))?;
    if removed {
        output.success(format!(
            "Cleared sync state: {} (the next sync will be a full sync)",
            ledger.path().display()
        ));
    } else {
        output.info("No sync state found to clear");
    }
    Ok(())
}

fn clear_credentials(paths: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = paths.credentials_file();
    if credentials_file.exists() {
        fs::remove_file(&credentials_file)
            .map_err(|e| eyre!("Failed to remove credentials file at {}: {}", credentials_file.display(), e))?;
        output.success(format!("Cleared credentials: {}", credentials_file.display()));
    } else {
        output.info("No credentials file found to clear");
    }
    Ok(())
}
