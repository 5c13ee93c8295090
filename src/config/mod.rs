//! Configuration loading and application.
mod apply;
mod bus;
mod loader;
mod parse;
pub mod types;


pub use apply::apply_config;
pub use bus::BusSettings;
pub use loader::load_config;

#[cfg(test)]
pub(crate) use loader::load_config_file;
pub(crate) use parse::parse_duration_value;
