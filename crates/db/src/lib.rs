pub mod connection;
pub mod migrations;
pub mod reference_cache;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use reference_cache::ReferenceCache;
