pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::PrismConfig;
pub use error::{PrismError, Result};
pub use events::DomainEvent;
pub use types::*;
