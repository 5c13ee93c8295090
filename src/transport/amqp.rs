//! RabbitMQ adapter built on `lapin`.
//!
//! Requests go to a durable direct exchange with `correlation_id` and
//! `reply_to` set in the message properties. Replies are consumed without
//! acks from an exclusive, server-named queue owned by this connection.
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use url::Url;

use crate::error::TransportError;

use super::{
    InboundMessage, OutboundMessage, REPLY_CHANNEL_CAPACITY, ReplySubscription, Transport,
};

const CONSUMER_TAG: &str = "rpcstress-replies";
const PERSISTENT_DELIVERY: u8 = 2;
const CLOSE_REPLY_CODE: u16 = 200;

pub struct AmqpTransport {
    connection: Connection,
    channel: Channel,
    reply_queue: String,
    consumer: Mutex<Option<Consumer>>,
}

impl AmqpTransport {
    /// Connects, declares `exchange` and opens the exclusive reply queue.
    ///
    /// # Errors
    ///
    /// Returns an error when any step of the handshake or topology setup
    /// fails.
    pub async fn connect(uri: &Url, exchange: &str) -> Result<Self, TransportError> {
        let target = redacted(uri);
        let connect_err = |err: lapin::Error| TransportError::Connect {
            target: target.clone(),
            message: err.to_string(),
        };

        let connection = Connection::connect(uri.as_str(), ConnectionProperties::default())
            .await
            .map_err(connect_err)?;
        let channel = connection.create_channel().await.map_err(connect_err)?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connect_err)?;
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connect_err)?;
        let reply_queue = queue.name().as_str().to_owned();
        let consumer = channel
            .basic_consume(
                &reply_queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connect_err)?;

        info!("Connected to {} (reply queue {})", target, reply_queue);
        Ok(Self {
            connection,
            channel,
            reply_queue,
            consumer: Mutex::new(Some(consumer)),
        })
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let destination = message.destination.to_string();
        let publish_err = |err: lapin::Error| TransportError::Publish {
            destination: destination.clone(),
            message: err.to_string(),
        };
        let properties = BasicProperties::default()
            .with_correlation_id(ShortString::from(message.correlation_id))
            .with_reply_to(ShortString::from(message.reply_to))
            .with_delivery_mode(PERSISTENT_DELIVERY);

        let confirm = self
            .channel
            .basic_publish(
                &message.destination.exchange,
                &message.destination.routing_key,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await
            .map_err(publish_err)?;
        confirm.await.map_err(publish_err)?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<ReplySubscription, TransportError> {
        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadySubscribed)?;
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);

        tokio::spawn(forward_deliveries(consumer, reply_tx));

        Ok(ReplySubscription {
            address: self.reply_queue.clone(),
            messages: reply_rx,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        let close_err = |err: lapin::Error| TransportError::Close {
            message: err.to_string(),
        };
        self.channel
            .close(CLOSE_REPLY_CODE, "client closing")
            .await
            .map_err(close_err)?;
        self.connection
            .close(CLOSE_REPLY_CODE, "client closing")
            .await
            .map_err(close_err)?;
        Ok(())
    }
}

async fn forward_deliveries(mut consumer: Consumer, reply_tx: mpsc::Sender<InboundMessage>) {
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("Reply consumer failed: {}", err);
                break;
            }
        };
        let correlation_id = delivery
            .properties
            .correlation_id()
            .as_ref()
            .map(|id| id.as_str().to_owned());
        let message = InboundMessage {
            correlation_id,
            payload: delivery.data,
        };
        if reply_tx.send(message).await.is_err() {
            debug!("Reply demultiplexer stopped; ending consumer");
            break;
        }
    }
}

fn redacted(uri: &Url) -> String {
    let host = uri.host_str().unwrap_or("unknown");
    match uri.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_owned(),
    }
}
