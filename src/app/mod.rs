mod commands;
mod connect;
mod progress;
pub(crate) mod summary;

pub(crate) use commands::{run_generate, run_load_command, run_send};
