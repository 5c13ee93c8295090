use clap::ArgMatches;
use clap::parser::ValueSource;

use crate::args::{ClientArgs, Command, PositiveU64, PositiveUsize};
use crate::error::{AppError, AppResult, ConfigError, ValidationError};

use super::types::{BusConfig, ClientConfig, ConfigFile, LoadConfig};

/// Fills every argument that was not given on the command line or through
/// the environment from `config`.
///
/// # Errors
///
/// Returns an error when a config value is malformed. A timeout that is
/// present but zero or unparsable is always an error.
pub fn apply_config(
    args: &mut ClientArgs,
    matches: &ArgMatches,
    config: &ConfigFile,
) -> AppResult<()> {
    if !is_explicit(matches, "transport")
        && let Some(transport) = config.transport
    {
        args.transport = transport;
    }
    if !is_explicit(matches, "output_format")
        && let Some(output_format) = config.output_format
    {
        args.output_format = output_format;
    }
    if !is_explicit(matches, "no_color")
        && let Some(no_color) = config.no_color
    {
        args.no_color = no_color;
    }

    if let Some(bus) = config.bus.as_ref() {
        apply_bus(args, matches, bus)?;
    }
    if let Some(client) = config.client.as_ref() {
        apply_client(args, matches, client)?;
    }

    if let Command::Load(load) = &mut args.command
        && let Some(load_matches) = matches.subcommand_matches("load")
    {
        let section = config.load.as_ref();
        if !is_explicit(load_matches, "requests")
            && let Some(requests) = section.and_then(|load| load.requests)
        {
            load.requests = ensure_positive_u64(requests, "load.requests")?;
        }
        if !is_explicit(load_matches, "concurrency")
            && let Some(concurrency) = load_concurrency(section, config.client.as_ref())
        {
            load.concurrency = ensure_positive_usize(concurrency, "load.concurrency")?;
        }
        if !is_explicit(load_matches, "run_timeout")
            && let Some(run_timeout) = section.and_then(|load| load.run_timeout.as_ref())
        {
            load.run_timeout = run_timeout
                .to_duration()
                .map_err(|err| invalid_field("load.run_timeout", err))?;
        }
        if !is_explicit(load_matches, "top_failures")
            && let Some(top) = section.and_then(|load| load.top_failures)
        {
            load.top_failures = top;
        }
    }

    Ok(())
}

fn apply_bus(args: &mut ClientArgs, matches: &ArgMatches, bus: &BusConfig) -> AppResult<()> {
    if !is_explicit(matches, "host")
        && let Some(host) = bus.host.as_ref()
    {
        args.host = non_empty(host, "bus.host")?;
    }
    if !is_explicit(matches, "port")
        && let Some(port) = bus.port
    {
        args.port = port;
    }
    if !is_explicit(matches, "user")
        && let Some(username) = bus.username.clone()
    {
        args.user = username;
    }
    if !is_explicit(matches, "pass")
        && let Some(password) = bus.password.clone()
    {
        args.pass = password;
    }
    if !is_explicit(matches, "vhost")
        && let Some(vhost) = bus.vhost.as_ref()
    {
        args.vhost = non_empty(vhost, "bus.vhost")?;
    }
    if !is_explicit(matches, "exchange")
        && let Some(exchange) = bus.exchange.as_ref()
    {
        args.exchange = non_empty(exchange, "bus.exchange")?;
    }
    if !is_explicit(matches, "routing_key")
        && let Some(routing_key) = bus.routing_key.clone()
    {
        args.routing_key = routing_key;
    }
    Ok(())
}

fn apply_client(
    args: &mut ClientArgs,
    matches: &ArgMatches,
    client: &ClientConfig,
) -> AppResult<()> {
    if !is_explicit(matches, "timeout")
        && let Some(timeout) = client.timeout.as_ref()
    {
        args.timeout = timeout
            .to_duration()
            .map_err(|err| invalid_field("client.timeout", err))?;
    }
    if !is_explicit(matches, "connect_attempts")
        && let Some(attempts) = client.connect_attempts
    {
        if attempts == 0 {
            return Err(invalid_field(
                "client.connect_attempts",
                ValidationError::ValueTooSmall { min: 1 },
            ));
        }
        args.connect_attempts = attempts;
    }
    if !is_explicit(matches, "connect_retry_delay")
        && let Some(delay) = client.connect_retry_delay.as_ref()
    {
        args.connect_retry_delay = delay
            .to_duration()
            .map_err(|err| invalid_field("client.connect_retry_delay", err))?;
    }
    Ok(())
}

fn load_concurrency(load: Option<&LoadConfig>, client: Option<&ClientConfig>) -> Option<usize> {
    load.and_then(|load| load.concurrency)
        .or_else(|| client.and_then(|client| client.concurrency))
}

fn is_explicit(matches: &ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(ValueSource::CommandLine | ValueSource::EnvVariable)
    )
}

fn non_empty(value: &str, field: &'static str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::config(ConfigError::EmptyField { field }));
    }
    Ok(trimmed.to_owned())
}

fn ensure_positive_u64(value: u64, field: &'static str) -> AppResult<PositiveU64> {
    PositiveU64::try_from(value).map_err(|err| invalid_field(field, err))
}

fn ensure_positive_usize(value: usize, field: &'static str) -> AppResult<PositiveUsize> {
    PositiveUsize::try_from(value).map_err(|err| invalid_field(field, err))
}

fn invalid_field(field: &'static str, source: ValidationError) -> AppError {
    AppError::config(ConfigError::InvalidField { field, source })
}
