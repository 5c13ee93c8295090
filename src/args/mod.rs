//! CLI argument types and parsing helpers.
mod cli;
mod parsers;
mod types;


pub use cli::{ClientArgs, Command, GenerateArgs, LoadArgs, SendArgs};
pub use types::{OutputFormat, PositiveU64, PositiveUsize, TransportKind};
