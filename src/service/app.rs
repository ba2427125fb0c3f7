//! Main application state and service coordination
//!
//! This module contains the production AppState that coordinates all
//! service components, AMQP connections, and background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{GameCommandConsumer, MessageHandler};
use crate::amqp::messages::{MessageUtils, GAME_COMMANDS_QUEUE};
use crate::broadcast::gateway::{AmqpBroadcastGateway, BroadcastGateway, GatewayConfig};
use crate::config::AppConfig;
use crate::error::{GameRoomError, Result as GameResult};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::persistence::InMemoryGameResultStore;
use crate::quiz::{StaticQuizProvider, StaticUserDirectory};
use crate::room::engine::GameRoomEngine;
use crate::room::QuestionTimer;
use crate::types::{GameCommand, GameEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Production message handler that dispatches commands into the engine
struct ProductionMessageHandler {
    engine: GameRoomEngine,
    gateway: Arc<dyn BroadcastGateway>,
    metrics_collector: Arc<MetricsCollector>,
}

impl ProductionMessageHandler {
    fn new(
        engine: GameRoomEngine,
        gateway: Arc<dyn BroadcastGateway>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            engine,
            gateway,
            metrics_collector,
        }
    }

    /// Run a single command against the engine
    async fn dispatch(&self, command: GameCommand) -> GameResult<()> {
        match command {
            GameCommand::CreateRoom {
                quiz_id,
                host_user_id,
            } => {
                self.engine.create_room(quiz_id, host_user_id).await?;
            }
            GameCommand::JoinRoom { room_code, user_id } => {
                self.engine.join_room(&room_code, user_id).await?;
            }
            GameCommand::StartGame { room_code } => {
                self.engine.start_game(&room_code).await?;
            }
            GameCommand::SubmitAnswer {
                room_code,
                user_id,
                question_id,
                answer,
                elapsed_ms,
            } => {
                self.engine
                    .submit_answer(&room_code, user_id, question_id, answer, elapsed_ms)
                    .await?;
            }
            GameCommand::DeleteRoom { room_code } => {
                self.engine.delete_room(&room_code).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_command(&self, command: GameCommand) -> GameResult<()> {
        let start_time = std::time::Instant::now();
        let command_name = command.name();

        info!("Processing {} command in production handler", command_name);

        MessageUtils::validate_game_command(&command)?;

        let result = self.dispatch(command).await;
        let processing_time = start_time.elapsed();
        self.metrics_collector.record_command_processed(processing_time);

        match result {
            Ok(()) => {
                info!(
                    "{} command processed successfully - time: {:.2}ms",
                    command_name,
                    processing_time.as_secs_f64() * 1000.0
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "{} command failed - time: {:.2}ms, error: {}",
                    command_name,
                    processing_time.as_secs_f64() * 1000.0,
                    e
                );

                // The caller learns about the failure as an event
                let error_event = GameEvent::Error {
                    message: e.to_string(),
                };
                if let Err(publish_err) = self.gateway.publish_to_caller(error_event).await {
                    warn!("Failed to publish error event: {}", publish_err);
                }

                Err(e)
            }
        }
    }

    async fn handle_error(&self, error: GameRoomError, message_data: &[u8]) {
        error!(
            "Production message handler error - type: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        // Log first 100 bytes of message for debugging (safely)
        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }

        let error_event = GameEvent::Error {
            message: error.to_string(),
        };
        if let Err(publish_err) = self.gateway.publish_to_caller(error_event).await {
            warn!("Failed to publish error event: {}", publish_err);
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Core game room engine
    engine: GameRoomEngine,

    /// Broadcast gateway shared with the message handler
    gateway: Arc<dyn BroadcastGateway>,

    /// AMQP connection for message handling
    amqp_connection: Arc<AmqpConnection>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// AMQP consumer for game commands
    command_consumer: Option<GameCommandConsumer>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing quiz room service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        // Initialize AMQP connection
        let amqp_connection = Self::initialize_amqp(&config).await?;

        // Initialize metrics service
        let metrics_service = Self::initialize_metrics(&config).await?;

        // Initialize the game room engine with metrics
        let (engine, gateway) = Self::initialize_game_system(
            &config,
            amqp_connection.clone(),
            metrics_service.collector(),
        )
        .await?;

        Ok(Self {
            config,
            engine,
            gateway,
            amqp_connection,
            metrics_service,
            background_tasks: Vec::new(),
            command_consumer: None,
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start all background services and message consumption
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting quiz room service");

        // Mark as running
        *self.is_running.write().await = true;

        // Start metrics service first
        self.start_metrics_service().await?;

        // Start AMQP message consumption
        self.start_amqp_consumption().await?;

        // Start background tasks
        self.start_background_tasks().await?;

        info!("Quiz room service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of quiz room service");

        // Mark as not running
        *self.is_running.write().await = false;

        // Stop AMQP message consumption
        if let Some(consumer) = &self.command_consumer {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("AMQP message consumption stopped");
            }
        }

        // Stop background tasks (including metrics service task)
        self.stop_background_tasks().await;

        // Stop metrics service
        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("Metrics service stopped");
        }

        // Get final statistics
        let final_stats =
            self.engine
                .get_stats()
                .await
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("Quiz room service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the game room engine for operations
    pub fn engine(&self) -> &GameRoomEngine {
        &self.engine
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Get AMQP connection for health checks
    pub fn amqp_connection(&self) -> Arc<AmqpConnection> {
        self.amqp_connection.clone()
    }

    /// Initialize metrics service
    async fn initialize_metrics(config: &AppConfig) -> Result<Arc<MetricsService>, ServiceError> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server = Arc::new(HealthServer::new(health_config, metrics_collector.clone()));
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(metrics_service)
    }

    /// Start metrics service
    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        // Clone necessary references for the background task
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        // Spawn the metrics service as a background task
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        // Add the handle to background tasks for proper shutdown
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("Metrics service started on port {}", port);
        Ok(())
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let amqp_config = AmqpConfig::from_settings(&config.amqp).map_err(|e| {
            ServiceError::AmqpConnection {
                message: format!("Failed to parse AMQP URL: {}", e),
            }
        })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    /// Initialize the game room engine and its collaborators
    async fn initialize_game_system(
        config: &AppConfig,
        amqp_connection: Arc<AmqpConnection>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<(GameRoomEngine, Arc<dyn BroadcastGateway>), ServiceError> {
        info!("Initializing game room components");

        // Get a channel from the connection
        let channel = amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open AMQP channel: {}", e),
            })?;

        // Initialize the broadcast gateway
        let gateway_config = GatewayConfig {
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            enable_deduplication: true,
        };
        let gateway: Arc<dyn BroadcastGateway> = Arc::new(
            AmqpBroadcastGateway::new(channel, gateway_config)
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize broadcast gateway: {}", e),
                })?,
        );

        // Initialize quiz content and user lookups
        let quiz_provider = Arc::new(StaticQuizProvider::new());
        let user_directory = Arc::new(StaticUserDirectory::new());

        // Initialize result storage
        let result_store = Arc::new(InMemoryGameResultStore::new());

        // Initialize the engine with the shared metrics collector
        let timer = Arc::new(QuestionTimer::new(config.question_time_budget()));
        let engine = GameRoomEngine::with_components(
            quiz_provider,
            user_directory,
            gateway.clone(),
            result_store,
            config.game.clone(),
            timer,
            metrics_collector,
        );

        Ok((engine, gateway))
    }

    /// Start AMQP message consumption
    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        info!("Starting AMQP message consumption system...");

        // Get a channel for consuming messages
        info!("Opening AMQP channel for message consumption...");
        let channel = self
            .amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        info!("AMQP channel opened successfully");

        // Declare the queue to ensure it exists
        info!("Declaring queue: '{}'...", GAME_COMMANDS_QUEUE);
        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(GAME_COMMANDS_QUEUE)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", GAME_COMMANDS_QUEUE, e),
            })?;

        info!("Queue '{}' declared successfully", GAME_COMMANDS_QUEUE);

        // Create message handler
        info!("Creating production message handler...");
        let message_handler = Arc::new(ProductionMessageHandler::new(
            self.engine.clone(),
            self.gateway.clone(),
            self.metrics_service.collector(),
        ));
        info!("Production message handler created");

        // Create and configure consumer
        info!("Setting up AMQP consumer...");
        let consumer = GameCommandConsumer::new(message_handler, channel);

        // Start consuming from the queue
        info!(
            "Starting message consumption from queue '{}'...",
            GAME_COMMANDS_QUEUE
        );
        consumer
            .start_consuming(GAME_COMMANDS_QUEUE)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        // Store consumer for cleanup
        self.command_consumer = Some(consumer);

        info!(
            "AMQP message consumption started successfully on queue: '{}'",
            GAME_COMMANDS_QUEUE
        );
        info!("Now listening for game commands from players...");
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&mut self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        // Metrics update task
        info!("Starting engine metrics update task (30s interval)...");
        let metrics_task = {
            let engine = self.engine.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Metrics update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match engine.get_stats().await {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - rooms: {}, games started: {}, answers: {}",
                                stats.active_rooms, stats.games_started, stats.answers_submitted
                            );
                            metrics_collector.update_from_engine_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get engine stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        // Service health metrics task
        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    // Update service uptime
                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    debug!(
                        "Updated service health metrics - uptime: {}s",
                        uptime_seconds
                    );

                    // Update health status (assume healthy for now)
                    metrics_collector.update_health_status(2); // 2 = healthy

                    // Update component health
                    metrics_collector.update_component_health("amqp", true);
                    metrics_collector.update_component_health("game_room_engine", true);
                    metrics_collector.update_component_health("metrics", true);
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(metrics_task);
        self.background_tasks.push(health_metrics_task);

        info!("2 background maintenance tasks started successfully");
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        // Cancel all background tasks
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        // Give tasks time to clean up gracefully
        info!("Waiting for background tasks to complete shutdown...");
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        info!("All {} background tasks stopped", task_count);
    }
}
