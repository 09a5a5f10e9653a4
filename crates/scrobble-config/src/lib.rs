pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{
    Config, ExclusionConfig, InvalidInterval, LoggingConfig, RetryConfig, SchedulerConfig,
    ScrobbleConfig, SimklConfig, SyncInterval, SyncOptions, MAX_CUSTOM_PATHS, MAX_INTERVAL_HOURS,
};
pub use credentials::CredentialStore;
pub use paths::{PathManager, HOME_ENV};
