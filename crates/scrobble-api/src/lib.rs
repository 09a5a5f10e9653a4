pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod payload;
pub mod traits;

pub use api::HISTORY_BATCH_SIZE;
pub use auth::{authenticate, AuthError, PinCode};
pub use client::{classify_status, RetryPolicy, SimklClient, StatusClass};
pub use error::ApiError;
pub use payload::Activities;
pub use traits::{ScrobbleAction, SimklApi};
