pub mod config;
pub mod error;
pub mod types;

pub use config::XkemConfig;
pub use error::{CoreError, CoreResult};
pub use types::KemVariant;
