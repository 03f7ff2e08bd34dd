//! # Application State Management
//!
//! Shared state accessed by every HTTP handler and WebSocket actor at once.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Allows multiple parts of the program to safely share ownership of data
//! - **Why needed**: Requests, WebSocket actors and the tick loop all hold the same state
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time
//! - **Poisoning**: a panicking writer poisons the lock; we take the inner value
//!   anyway, since config and metrics are always left in a valid state
//!
//! ## What lives here:
//! - **config**: runtime-updatable `AppConfig`
//! - **metrics**: HTTP request counters, written by the metrics middleware
//! - **sessions**: the `SessionManager` owning every response stream
//! - **tick_period**: `watch` channel the tick loop reads its period from

use crate::audio::session::SessionManager;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// The main application state that's shared across all HTTP request handlers.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: cloning copies the `Arc`s, not the data, so every
///   actix worker sees the same config, metrics and sessions
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// HTTP request metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Every registered response stream
    pub sessions: Arc<SessionManager>,

    /// Current tick period, published to the tick loop
    pub tick_period: Arc<watch::Sender<Duration>>,

    /// When the server started
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Per-endpoint statistics, keyed by `"METHOD /route/pattern"`
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// The session manager takes its limit and default reassembly settings
    /// from `config`.
    pub fn new(config: AppConfig) -> Self {
        let sessions = SessionManager::new(
            config.performance.max_concurrent_sessions,
            config.to_reassembly_config(),
        );

        let (tick_period, _) = watch::channel(config.tick_interval());

        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            sessions: Arc::new(sessions),
            tick_period: Arc::new(tick_period),
            start_time: Instant::now(),
        }
    }

    /// Receiver handed to `spawn_tick_loop`.
    pub fn tick_period_receiver(&self) -> watch::Receiver<Duration> {
        self.tick_period.subscribe()
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration after validating it.
    ///
    /// The session limit and tick period take effect immediately. New
    /// reassembly settings apply to streams created after this call; streams
    /// already running keep the settings they started with.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;

        self.sessions.set_max_sessions(new_config.performance.max_concurrent_sessions);
        self.sessions.set_default_config(new_config.to_reassembly_config());
        self.tick_period.send_replace(new_config.tick_interval());
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;

        info!("Configuration updated");
        Ok(())
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    /// Increment the total error counter (4xx and 5xx responses).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## HashMap operations:
    /// The first time we see an endpoint, `.entry().or_default()` creates a
    /// zeroed EndpointMetric; later requests update it in place.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones the data so we don't hold the lock while building the HTTP response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error Rate = Number of Errors ÷ Total Requests, from 0.0 to 1.0
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_rejects_invalid_and_propagates_valid() {
        let state = AppState::new(AppConfig::default());

        let mut invalid = state.get_config();
        invalid.reassembly.tick_interval_ms = 0;
        assert!(state.update_config(invalid).is_err());
        assert_eq!(state.get_config().reassembly.tick_interval_ms, 10);

        let mut valid = state.get_config();
        valid.reassembly.idle_timeout_ms = 2500;
        assert!(state.update_config(valid).is_ok());
        assert_eq!(
            state.sessions.default_config().idle_timeout,
            std::time::Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_update_config_applies_limit_and_tick_period_live() {
        let state = AppState::new(AppConfig::default());
        let period = state.tick_period_receiver();

        let mut updated = state.get_config();
        updated.performance.max_concurrent_sessions = 1;
        updated.reassembly.tick_interval_ms = 25;
        state.update_config(updated).unwrap();

        assert_eq!(state.sessions.max_sessions(), 1);
        assert_eq!(*period.borrow(), std::time::Duration::from_millis(25));

        let sink = || Arc::new(crate::audio::playback::UnitQueue::new());
        assert!(state.sessions.create_session(Some("a".into()), sink()).is_ok());
        assert!(state.sessions.create_session(Some("b".into()), sink()).is_err());
    }
}
