pub mod cli;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod index;
pub mod k8s;
pub mod lookup;
pub mod metrics;
pub mod reconciler;
pub mod server;

pub use error::{PodtagError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
