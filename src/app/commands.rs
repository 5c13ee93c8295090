use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::args::{ClientArgs, GenerateArgs, LoadArgs, OutputFormat, SendArgs};
use crate::error::AppResult;
use crate::load::{LoadHarness, LoadOptions, LoadProgress};
use crate::registration::{
    RegistrationReply, RegistrationWorkload, UserRegistration, generate_random_user,
};
use crate::rpc::{Reply, RpcClient};
use crate::shutdown::ShutdownSender;

use super::connect::connect_client;
use super::progress::setup_progress_indicator;
use super::summary::print_summary;

/// Upper bound for the progress line to render its final state.
const PROGRESS_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Sends one registration and prints the reply with its round-trip time.
pub(crate) async fn run_send(args: &ClientArgs, send: &SendArgs) -> AppResult<()> {
    let payload = send_payload(send)?;
    let client = connect_client(args).await?;

    let started = Instant::now();
    let result = client.send(payload, args.timeout).await;
    let round_trip_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    close_client(&client).await;

    let reply = result?;
    print_reply(&reply, round_trip_ms, args.output_format)
}

/// Runs the registration load and prints its summary. A Ctrl+C during the
/// run still prints the partial summary.
pub(crate) async fn run_load_command(
    args: &ClientArgs,
    load: &LoadArgs,
    shutdown_tx: &ShutdownSender,
) -> AppResult<()> {
    let options = LoadOptions {
        requests: load.requests.get(),
        concurrency: load.concurrency.get(),
        request_timeout: args.timeout,
        run_timeout: Some(load.run_timeout),
    };
    options.validate()?;

    let client = connect_client(args).await?;
    let mut harness = LoadHarness::new(Arc::clone(&client), Arc::new(RegistrationWorkload), options)
        .with_shutdown(shutdown_tx.subscribe());

    let progress_handle =
        if matches!(args.output_format, OutputFormat::Text) && !load.no_progress {
            let (progress_tx, progress_rx) = watch::channel(LoadProgress::default());
            harness = harness.with_progress(progress_tx);
            Some(setup_progress_indicator(progress_rx, args.no_color))
        } else {
            None
        };

    let result = harness.run().await;
    if let Some(handle) = progress_handle
        && tokio::time::timeout(PROGRESS_FLUSH_TIMEOUT, handle)
            .await
            .is_err()
    {
        debug!("Progress line did not finish in time");
    }
    close_client(&client).await;

    let stats = result?;
    print_summary(&stats, load.top_failures, args.output_format)
}

/// Prints random registration payloads without touching the bus.
pub(crate) fn run_generate(args: &ClientArgs, generate: &GenerateArgs) -> AppResult<()> {
    for _ in 0..generate.count.get() {
        let user = generate_random_user();
        let encoded = match args.output_format {
            OutputFormat::Text => serde_json::to_string_pretty(&user)?,
            OutputFormat::Json => serde_json::to_string(&user)?,
        };
        println!("{}", encoded);
    }
    Ok(())
}

fn send_payload(send: &SendArgs) -> AppResult<Vec<u8>> {
    let Some(data) = send.data.as_ref() else {
        let user = generate_random_user();
        info!("Sending random user {} (DNI {})", user.nombre, user.dni);
        return Ok(serde_json::to_vec(&user)?);
    };

    match serde_json::from_value::<UserRegistration>(data.clone()) {
        Ok(user) => user.validate()?,
        Err(err) => debug!("Payload is not a registration, sending as is: {}", err),
    }
    Ok(serde_json::to_vec(data)?)
}

fn print_reply(reply: &Reply, round_trip_ms: u64, format: OutputFormat) -> AppResult<()> {
    let parsed = reply.json::<RegistrationReply>();
    match format {
        OutputFormat::Json => {
            let body = reply
                .json::<serde_json::Value>()
                .unwrap_or_else(|_| serde_json::Value::String(reply.text()));
            let output = json!({
                "correlation_id": reply.id().to_string(),
                "round_trip_ms": round_trip_ms,
                "success": parsed.as_ref().is_ok_and(RegistrationReply::is_success),
                "reply": body,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            match parsed {
                Ok(body) => {
                    println!("Status: {}", body.status);
                    println!("Message: {}", body.message);
                    if let Some(user_id) = body.user_id {
                        println!("User ID: {}", user_id);
                    }
                    if let Some(friends) = body.amigos_guardados.as_ref() {
                        println!("Friends saved: {}", friends.join(", "));
                    }
                }
                Err(err) => {
                    warn!("Reply is not a registration reply: {}", err);
                    println!("Reply: {}", reply.text());
                }
            }
            println!("Correlation ID: {}", reply.id());
            println!("Round trip: {}ms", round_trip_ms);
        }
    }
    Ok(())
}

async fn close_client(client: &RpcClient) {
    if let Err(err) = client.close().await {
        warn!("Failed to close client cleanly: {}", err);
    }
}
