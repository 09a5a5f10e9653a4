use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use scrobble_api::{RetryPolicy, SimklApi, SimklClient};
use scrobble_config::{Config, CredentialStore, PathManager};
use scrobble_core::{FileLibrary, LedgerStorage, LibraryStore, SyncEngine};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a command needs to talk to SIMKL and the library
pub struct AppContext {
    pub paths: PathManager,
    pub config: Config,
    pub api: Arc<dyn SimklApi>,
    pub library: Arc<dyn LibraryStore>,
}

impl AppContext {
    /// Load configuration and credentials. Fails when no access token is
    /// stored, before any network call is made.
    pub fn load() -> Result<Self> {
        let paths = PathManager::default();
        let config = load_config(&paths)?;

        let credentials = CredentialStore::open(paths.credentials_file())
            .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
        let token = credentials
            .get_simkl_access_token()
            .ok_or_else(|| eyre!("Please authenticate first: run 'scrobbler auth'"))?;

        let client = SimklClient::new(&config.simkl)
            .map_err(|e| eyre!("Failed to create SIMKL client: {}", e))?
            .with_access_token(token.clone())
            .with_retry_policy(RetryPolicy::from(&config.simkl.retry));

        let library = FileLibrary::open(paths.library_file())
            .map_err(|e| eyre!("Failed to open library {}: {}", paths.library_file().display(), e))?;

        Ok(Self {
            paths,
            config,
            api: Arc::new(client),
            library: Arc::new(library),
        })
    }

    pub fn ledger(&self) -> LedgerStorage {
        LedgerStorage::new(self.paths.sync_state_file())
    }

    pub fn engine(&self, cancel: CancellationToken) -> Result<SyncEngine> {
        SyncEngine::new(
            self.api.clone(),
            self.library.clone(),
            self.config.sync.clone(),
            Some(self.ledger()),
            cancel,
        )
        .map_err(|e| eyre!("Failed to load sync state: {}", e))
    }
}

pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_path = paths.config_file();
    if !config_path.exists() {
        return Err(eyre!(
            "No configuration at {}. Run 'scrobbler config init' first.",
            config_path.display()
        ));
    }
    let config = Config::load_from_file(&config_path)
        .map_err(|e| eyre!("{}", e))
        .wrap_err_with(|| format!("Failed to load config from {}", config_path.display()))?;
    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration in {}: {}", config_path.display(), e))?;
    Ok(config)
}
