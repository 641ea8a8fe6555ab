pub mod api;
pub mod events;
pub mod schema;
pub mod settings;
pub mod sources;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
