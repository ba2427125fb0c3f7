//! AMQP message handlers for processing inbound game commands
//!
//! This module provides the message handling infrastructure for the quiz
//! room service: deserializing and validating game commands off the queue
//! and dispatching them to the engine behind the `MessageHandler` trait.

use crate::amqp::messages::MessageUtils;
use crate::error::{GameRoomError, Result};
use crate::types::GameCommand;
use amqprs::{
    channel::{BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Trait defining the interface for handling inbound AMQP messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a validated game command
    async fn handle_command(&self, command: GameCommand) -> Result<()>;

    /// Handle processing errors
    async fn handle_error(&self, error: GameRoomError, message_data: &[u8]);
}

/// Consumer for game command messages
pub struct GameCommandConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl GameCommandConsumer {
    /// Create a new game command consumer
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("command-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(CommandConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| GameRoomError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming game commands from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            GameRoomError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming game commands");
        Ok(())
    }
}

/// Internal consumer implementation
struct CommandConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl CommandConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    /// Process an incoming message
    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let command = MessageUtils::deserialize_game_command(content)?;

        info!("Game command parsed: {:?}", command);

        self.handler.handle_command(command).await?;

        Ok(())
    }
}

#[async_trait]
impl AsyncConsumer for CommandConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let routing_key = deliver.routing_key();

        info!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            routing_key,
            content.len()
        );

        let start_time = std::time::Instant::now();

        match self.process_message(&content).await {
            Ok(_) => {
                info!(
                    "Command processed successfully - delivery_tag: {}, processing_time: {:.2}ms",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                error!(
                    "Command processing failed - delivery_tag: {}, processing_time: {:.2}ms, error: {}",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0,
                    e
                );
                self.handler
                    .handle_error(
                        GameRoomError::InternalError {
                            message: e.to_string(),
                        },
                        &content,
                    )
                    .await;
            }
        }
    }
}

/// Mock message handler for testing
pub struct MockMessageHandler {
    pub received_commands: Arc<tokio::sync::Mutex<Vec<GameCommand>>>,
}

impl Default for MockMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self {
            received_commands: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_command(&self, command: GameCommand) -> Result<()> {
        let mut commands = self.received_commands.lock().await;
        commands.push(command);
        Ok(())
    }

    async fn handle_error(&self, error: GameRoomError, _message_data: &[u8]) {
        eprintln!("Mock handler received error: {}", error);
    }
}
