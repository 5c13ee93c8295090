use std::sync::Arc;

use tracing::{debug, info};

use crate::args::{ClientArgs, TransportKind};
use crate::config::BusSettings;
use crate::error::{AppResult, TransportError};
use crate::registration::RegistrationResponder;
use crate::rpc::RpcClient;
use crate::transport::{MemoryTransport, Responder, RetryPolicy, Transport, connect_with_retry};

/// Opens the configured bus and subscribes the client's reply channel,
/// retrying as configured.
pub(crate) async fn connect_client(args: &ClientArgs) -> AppResult<Arc<RpcClient>> {
    let bus = BusSettings::from_args(args);
    let policy = RetryPolicy {
        attempts: args.connect_attempts,
        delay: args.connect_retry_delay,
    };
    // Shared across attempts so the simulated service keeps its state.
    let responder: Arc<dyn Responder> = Arc::new(RegistrationResponder::default());

    let client = connect_with_retry(policy, |attempt| {
        let bus = bus.clone();
        let responder = Arc::clone(&responder);
        let kind = args.transport;
        async move {
            debug!("Connecting to {} (attempt {})", bus.target(), attempt);
            let transport = open_transport(kind, &bus, responder).await?;
            RpcClient::connect(transport, bus.destination()).await
        }
    })
    .await?;

    info!(
        "Client ready on {}; replies on {}",
        client.destination(),
        client.reply_to()
    );
    Ok(Arc::new(client))
}

async fn open_transport(
    kind: TransportKind,
    bus: &BusSettings,
    responder: Arc<dyn Responder>,
) -> Result<Arc<dyn Transport>, TransportError> {
    match kind {
        TransportKind::Memory => Ok(Arc::new(MemoryTransport::with_responder(responder))),
        TransportKind::Amqp => open_amqp(bus).await,
    }
}

#[cfg(feature = "amqp")]
async fn open_amqp(bus: &BusSettings) -> Result<Arc<dyn Transport>, TransportError> {
    let uri = bus.amqp_uri()?;
    let transport = crate::transport::AmqpTransport::connect(&uri, &bus.exchange).await?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "amqp"))]
async fn open_amqp(bus: &BusSettings) -> Result<Arc<dyn Transport>, TransportError> {
    // Validates the coordinates even though nothing can be dialed.
    bus.amqp_uri()?;
    Err(TransportError::Connect {
        target: bus.target(),
        message: "built without the `amqp` feature; rebuild with `--features amqp` or use `--transport memory`".to_owned(),
    })
}
