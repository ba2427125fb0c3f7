//! AMQP event gateway for outbound room events

use crate::amqp::messages::{MessageEnvelope, MessageUtils, ROOM_EVENTS_EXCHANGE};
use crate::error::{GameRoomError, Result};
use crate::types::{GameEvent, RoomCode};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for broadcasting game events
///
/// `publish_to_room` addresses everyone subscribed to a room;
/// `publish_to_caller` addresses only the originator of a command, which
/// is how creation acknowledgements and errors travel back.
#[async_trait]
pub trait BroadcastGateway: Send + Sync {
    /// Publish an event to every subscriber of a room
    async fn publish_to_room(&self, room_code: &RoomCode, event: GameEvent) -> Result<()>;

    /// Publish an event addressed to the command's caller only
    async fn publish_to_caller(&self, event: GameEvent) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
        }
    }
}

/// AMQP-based broadcast gateway implementation
pub struct AmqpBroadcastGateway {
    channel: Channel,
    config: GatewayConfig,
    published_messages: std::sync::Mutex<std::collections::HashSet<String>>, // For deduplication
}

impl AmqpBroadcastGateway {
    /// Create a new broadcast gateway and declare the events exchange
    pub async fn new(channel: Channel, config: GatewayConfig) -> Result<Self> {
        let gateway = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(std::collections::HashSet::new()),
        };

        gateway.setup_exchange().await?;

        Ok(gateway)
    }

    /// Declare the topic exchange room events flow through
    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(ROOM_EVENTS_EXCHANGE, "topic");
        self.channel.exchange_declare(args).await.map_err(|e| {
            GameRoomError::AmqpConnectionFailed {
                message: format!("Failed to declare room events exchange: {}", e),
            }
        })?;

        info!("Successfully set up room events exchange");
        Ok(())
    }

    /// Publish an envelope with retry logic
    async fn publish_envelope(&self, envelope: &MessageEnvelope<GameEvent>) -> Result<()> {
        // Check for deduplication
        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| GameRoomError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Message {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                GameRoomError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Successfully published {} event as message {}",
                        envelope.payload.name(),
                        envelope.correlation_id
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(&self, envelope: &MessageEnvelope<GameEvent>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(ROOM_EVENTS_EXCHANGE, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| GameRoomError::AmqpConnectionFailed {
                message: format!("Failed to publish event: {}", e),
            })?;

        Ok(())
    }

    /// Clear deduplication cache
    pub fn clear_deduplication_cache(&self) {
        if let Ok(mut published_messages) = self.published_messages.lock() {
            published_messages.clear();
        }
    }

    /// Get number of cached message IDs (for monitoring)
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl BroadcastGateway for AmqpBroadcastGateway {
    async fn publish_to_room(&self, room_code: &RoomCode, event: GameEvent) -> Result<()> {
        let routing_key = MessageUtils::room_routing_key(room_code, &event);
        let envelope = MessageEnvelope::new(event, routing_key);
        self.publish_envelope(&envelope).await
    }

    async fn publish_to_caller(&self, event: GameEvent) -> Result<()> {
        let routing_key = MessageUtils::caller_routing_key(&event);
        let envelope = MessageEnvelope::new(event, routing_key);
        self.publish_envelope(&envelope).await
    }
}

/// Recording target of a mock broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastTarget {
    Room(RoomCode),
    Caller,
}

/// Mock broadcast gateway for testing
#[derive(Debug, Default)]
pub struct MockBroadcastGateway {
    published_events: std::sync::Mutex<Vec<(BroadcastTarget, GameEvent)>>,
}

impl MockBroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published (target, event) pairs, in publish order
    pub fn published(&self) -> Vec<(BroadcastTarget, GameEvent)> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Event names published to a given room, in publish order
    pub fn event_names_for_room(&self, room_code: &RoomCode) -> Vec<&'static str> {
        self.published()
            .into_iter()
            .filter(|(target, _)| *target == BroadcastTarget::Room(room_code.clone()))
            .map(|(_, event)| event.name())
            .collect()
    }

    /// Event names published to the caller, in publish order
    pub fn caller_event_names(&self) -> Vec<&'static str> {
        self.published()
            .into_iter()
            .filter(|(target, _)| *target == BroadcastTarget::Caller)
            .map(|(_, event)| event.name())
            .collect()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl BroadcastGateway for MockBroadcastGateway {
    async fn publish_to_room(&self, room_code: &RoomCode, event: GameEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push((BroadcastTarget::Room(room_code.clone()), event));
        }
        Ok(())
    }

    async fn publish_to_caller(&self, event: GameEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push((BroadcastTarget::Caller, event));
        }
        Ok(())
    }
}
