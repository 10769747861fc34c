pub mod aws;
pub mod config;
pub mod error;
pub mod event;

pub use config::{Config, DispatchConfig};
pub use error::*;
pub use event::*;
