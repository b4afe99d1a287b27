pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod log_store;
pub mod mailer;
pub mod middleware;
pub mod quota;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod token_bucket;
pub mod validation;

pub use config::Config;
pub use error::ApiError;
pub use server::{build_state, create_app};
