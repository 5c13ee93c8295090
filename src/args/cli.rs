use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use super::parsers::{
    parse_duration_arg, parse_json_payload, parse_positive_u64, parse_positive_usize,
};
use super::types::{OutputFormat, PositiveU64, PositiveUsize, TransportKind};

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Send one registration request and print the reply
    Send(SendArgs),
    /// Fire a burst of registration requests and summarize the outcome
    Load(LoadArgs),
    /// Print random registration payloads without sending them
    Generate(GenerateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SendArgs {
    /// Registration payload as JSON
    #[arg(long, short, value_parser = parse_json_payload, conflicts_with = "random")]
    pub data: Option<serde_json::Value>,

    /// Send a randomly generated user (default when --data is absent)
    #[arg(long)]
    pub random: bool,
}

#[derive(Debug, Args, Clone)]
pub struct LoadArgs {
    /// Number of requests to send
    #[arg(long, short = 'n', default_value = "1000", value_parser = parse_positive_u64)]
    pub requests: PositiveU64,

    /// Maximum number of requests awaiting a reply at once
    #[arg(long, short = 'c', default_value = "50", value_parser = parse_positive_usize)]
    pub concurrency: PositiveUsize,

    /// Ceiling for the whole run (supports ms/s/m/h)
    #[arg(long = "run-timeout", default_value = "5m", value_parser = parse_duration_arg)]
    pub run_timeout: Duration,

    /// Number of most frequent failure categories to report
    #[arg(long = "top", default_value_t = 5)]
    pub top_failures: usize,

    /// Disable the live progress line
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// Number of payloads to print
    #[arg(long, short = 'n', default_value = "1", value_parser = parse_positive_u64)]
    pub count: PositiveU64,
}

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Correlated request/reply client and load harness for a RabbitMQ user-registration service."
)]
pub struct ClientArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (TOML or JSON)
    #[arg(long, short = 'C', global = true)]
    pub config: Option<String>,

    /// Message bus to use
    #[arg(
        long,
        value_enum,
        default_value = "amqp",
        env = "RPCSTRESS_TRANSPORT",
        global = true
    )]
    pub transport: TransportKind,

    /// Broker host
    #[arg(long, default_value = "localhost", env = "RABBITMQ_HOST", global = true)]
    pub host: String,

    /// Broker port
    #[arg(long, default_value_t = 5672, env = "RABBITMQ_PORT", global = true)]
    pub port: u16,

    /// Broker user
    #[arg(long, default_value = "admin", env = "RABBITMQ_USER", global = true)]
    pub user: String,

    /// Broker password
    #[arg(
        long,
        default_value = "admin123",
        env = "RABBITMQ_PASS",
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub pass: String,

    /// Broker virtual host
    #[arg(long, default_value = "/", global = true)]
    pub vhost: String,

    /// Exchange requests are published to
    #[arg(long, default_value = "validation", global = true)]
    pub exchange: String,

    /// Routing key requests are published with
    #[arg(long = "routing-key", default_value = "check", global = true)]
    pub routing_key: String,

    /// Time to wait for each reply (supports ms/s/m/h)
    #[arg(long, short, default_value = "30s", value_parser = parse_duration_arg, global = true)]
    pub timeout: Duration,

    /// Connection attempts before giving up
    #[arg(
        long = "connect-attempts",
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub connect_attempts: u32,

    /// Pause between connection attempts (supports ms/s/m/h)
    #[arg(
        long = "connect-retry-delay",
        default_value = "5s",
        value_parser = parse_duration_arg,
        global = true
    )]
    pub connect_retry_delay: Duration,

    /// Output format for results
    #[arg(long = "output-format", value_enum, default_value = "text", global = true)]
    pub output_format: OutputFormat,

    /// Enable debug logging (or set RPCSTRESS_LOG / RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}
