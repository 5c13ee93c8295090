use std::ffi::OsString;

use clap::{ArgMatches, CommandFactory, FromArgMatches};
use tracing::debug;

use crate::app;
use crate::args::{ClientArgs, Command};
use crate::config::{apply_config, load_config};
use crate::error::AppResult;
use crate::shutdown_handlers::{setup_signal_shutdown_handler, shutdown_channel};
use crate::system::logger::init_logging;

/// Parses the command line, layers the config file underneath it and runs
/// the selected subcommand on a multi-threaded runtime.
///
/// # Errors
///
/// Returns an error when the arguments or config are invalid, the runtime
/// cannot be built, or the subcommand fails.
pub fn run() -> AppResult<()> {
    let (args, matches) = parse_args(std::env::args_os())?;
    let args = resolve_args(args, &matches)?;

    init_logging(args.verbose, args.no_color);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(args))
}

fn parse_args<I, T>(raw_args: I) -> AppResult<(ClientArgs, ArgMatches)>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = ClientArgs::command().get_matches_from(raw_args);
    let args = ClientArgs::from_arg_matches(&matches)?;
    Ok((args, matches))
}

fn resolve_args(mut args: ClientArgs, matches: &ArgMatches) -> AppResult<ClientArgs> {
    if let Some(config) = load_config(args.config.as_deref())? {
        apply_config(&mut args, matches, &config)?;
    }
    Ok(args)
}

async fn run_async(args: ClientArgs) -> AppResult<()> {
    let (shutdown_tx, _shutdown_rx) = shutdown_channel();
    let signal_handle = setup_signal_shutdown_handler(&shutdown_tx);

    let result = match &args.command {
        Command::Send(send) => app::run_send(&args, send).await,
        Command::Load(load) => app::run_load_command(&args, load, &shutdown_tx).await,
        Command::Generate(generate) => app::run_generate(&args, generate),
    };

    drop(shutdown_tx.send(()));
    if let Err(err) = signal_handle.await {
        debug!("Signal handler ended abnormally: {}", err);
    }
    result
}
