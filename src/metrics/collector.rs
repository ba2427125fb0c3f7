//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the quiz room service
//! using Prometheus metrics.

use crate::room::engine::GameRoomStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the quiz room service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Room-related metrics
    room_metrics: RoomMetrics,

    /// Player-related metrics
    player_metrics: PlayerMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Room-related metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Number of currently active rooms
    pub active_rooms: IntGauge,

    /// Total rooms created
    pub rooms_created_total: IntCounter,

    /// Total rooms cleaned up
    pub rooms_cleaned_total: IntCounter,

    /// Total games started
    pub games_started_total: IntCounter,

    /// Total games completed and flushed
    pub games_completed_total: IntCounter,

    /// Room code generation retries due to collisions
    pub room_code_retries_total: IntCounter,
}

/// Player-related metrics
#[derive(Clone)]
pub struct PlayerMetrics {
    /// Total participants joined, by join kind
    pub participants_joined_total: IntCounterVec,

    /// Total answers submitted, by correctness
    pub answers_submitted_total: IntCounterVec,

    /// Stale answer submissions rejected
    pub stale_submissions_total: IntCounter,

    /// Distribution of per-answer scores
    pub score_distribution: Histogram,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Game command processing time
    pub command_processing_duration: Histogram,

    /// Room operation durations
    pub room_operation_duration: HistogramVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,

    /// Persistence flush duration
    pub flush_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let player_metrics = PlayerMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            room_metrics,
            player_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get room metrics
    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    /// Get player metrics
    pub fn player(&self) -> &PlayerMetrics {
        &self.player_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update gauges from engine stats
    pub fn update_from_engine_stats(&self, stats: &GameRoomStats) {
        self.room_metrics
            .active_rooms
            .set(stats.active_rooms as i64);
    }

    /// Record a room being created
    pub fn record_room_created(&self) {
        self.room_metrics.rooms_created_total.inc();
        self.room_metrics.active_rooms.inc();
    }

    /// Record a room being cleaned up
    pub fn record_room_cleaned(&self) {
        self.room_metrics.rooms_cleaned_total.inc();
        self.room_metrics.active_rooms.dec();
    }

    /// Record a room code regeneration after a collision
    pub fn record_room_code_retry(&self) {
        self.room_metrics.room_code_retries_total.inc();
    }

    /// Record a participant joining
    pub fn record_participant_joined(&self, late: bool) {
        let kind = if late { "late" } else { "waiting" };
        self.player_metrics
            .participants_joined_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record a game starting
    pub fn record_game_started(&self) {
        self.room_metrics.games_started_total.inc();
    }

    /// Record a game completing, including its flush time
    pub fn record_game_completed(&self, flush_duration: Duration) {
        self.room_metrics.games_completed_total.inc();
        self.performance_metrics
            .flush_duration
            .observe(flush_duration.as_secs_f64());
    }

    /// Record an answer submission and its awarded score
    pub fn record_answer_submitted(&self, is_correct: bool, score: u32) {
        let status = if is_correct { "correct" } else { "incorrect" };
        self.player_metrics
            .answers_submitted_total
            .with_label_values(&[status])
            .inc();
        self.player_metrics.score_distribution.observe(score as f64);
    }

    /// Record a rejected stale submission
    pub fn record_stale_submission(&self) {
        self.player_metrics.stale_submissions_total.inc();
    }

    /// Record a game command being processed
    pub fn record_command_processed(&self, duration: Duration) {
        self.performance_metrics
            .command_processing_duration
            .observe(duration.as_secs_f64());
    }

    /// Record room operation duration
    pub fn record_room_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .room_operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("quiz_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "quiz_room_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("quiz_room_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "quiz_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("quiz_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms =
            IntGauge::new("quiz_room_active_rooms", "Number of currently active rooms")?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total =
            IntCounter::new("quiz_room_rooms_created_total", "Total rooms created")?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let rooms_cleaned_total =
            IntCounter::new("quiz_room_rooms_cleaned_total", "Total rooms cleaned up")?;
        registry.register(Box::new(rooms_cleaned_total.clone()))?;

        let games_started_total =
            IntCounter::new("quiz_room_games_started_total", "Total games started")?;
        registry.register(Box::new(games_started_total.clone()))?;

        let games_completed_total = IntCounter::new(
            "quiz_room_games_completed_total",
            "Total games completed and flushed",
        )?;
        registry.register(Box::new(games_completed_total.clone()))?;

        let room_code_retries_total = IntCounter::new(
            "quiz_room_room_code_retries_total",
            "Room code regenerations after collisions",
        )?;
        registry.register(Box::new(room_code_retries_total.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_created_total,
            rooms_cleaned_total,
            games_started_total,
            games_completed_total,
            room_code_retries_total,
        })
    }
}

impl PlayerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants_joined_total = IntCounterVec::new(
            Opts::new(
                "quiz_room_participants_joined_total",
                "Total participants joined",
            ),
            &["join_kind"],
        )?;
        registry.register(Box::new(participants_joined_total.clone()))?;

        let answers_submitted_total = IntCounterVec::new(
            Opts::new(
                "quiz_room_answers_submitted_total",
                "Total answers submitted",
            ),
            &["correctness"],
        )?;
        registry.register(Box::new(answers_submitted_total.clone()))?;

        let stale_submissions_total = IntCounter::new(
            "quiz_room_stale_submissions_total",
            "Stale answer submissions rejected",
        )?;
        registry.register(Box::new(stale_submissions_total.clone()))?;

        let score_distribution = Histogram::with_opts(
            HistogramOpts::new(
                "quiz_room_score_distribution",
                "Distribution of per-answer scores",
            )
            .buckets(vec![
                0.0, 1000.0, 2500.0, 5000.0, 7500.0, 9000.0, 10000.0,
            ]),
        )?;
        registry.register(Box::new(score_distribution.clone()))?;

        Ok(Self {
            participants_joined_total,
            answers_submitted_total,
            stale_submissions_total,
            score_distribution,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "quiz_room_command_processing_duration_seconds",
                "Game command processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(command_processing_duration.clone()))?;

        let room_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "quiz_room_room_operation_duration_seconds",
                "Room operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(room_operation_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "quiz_room_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        let flush_duration = Histogram::with_opts(
            HistogramOpts::new(
                "quiz_room_flush_duration_seconds",
                "Completed game flush duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(flush_duration.clone()))?;

        Ok(Self {
            command_processing_duration,
            room_operation_duration,
            amqp_operation_duration,
            flush_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
