mod loader;
mod types;

pub use loader::{load_from_path, load_from_str};
pub use types::{Config, HitTableConfig, LoggingConfig, ParserPoolConfig, RuleConfig};
