pub mod batch;
pub mod browser_pool;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod health;
pub mod input;
pub mod logger;
pub mod portal;
pub mod rate_limit;
pub mod results;
pub mod session;
pub mod verifier;

pub use engine::{run_verification, VerificationReport, VerificationRequest};
pub use error::{ErrorKind, VerifyError};
pub use portal::{PortalBrowser, PortalPage};
