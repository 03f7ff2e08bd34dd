//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_REASSEMBLY__IDLE_TIMEOUT_MS, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use crate::audio::buffer::ReassemblyConfig;
use crate::audio::wav::SizePolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Smallest chunk that could hold a header; the data-chunk threshold may not go below it.
const MIN_DATA_CHUNK_FLOOR: usize = 44;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, performance, reassembly)
/// keeps the TOML file and the environment variable names readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub performance: PerformanceConfig,
    pub reassembly: ReassemblySettings,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Upper bound on simultaneously registered response streams.
    pub max_concurrent_sessions: usize,
}

/// Tuning for the response reassembler, in config-file units.
///
/// ## Fields:
/// - `nominal_sample_rate`: rate assumed before a header is decoded, and for
///   damaged headers without a transport hint
/// - `capacity_seconds`: flush once this much audio is buffered
/// - `idle_timeout_ms`: flush a buffer that has not grown for this long
/// - `tick_interval_ms`: consumption tick period
/// - `min_data_chunk_bytes`: longer chunks are data chunks
/// - `max_chunks_per_tick`: chunks popped per tick per stream
/// - `lenient_size_correction`: fix bad declared payload sizes instead of
///   rejecting the chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassemblySettings {
    pub nominal_sample_rate: u32,
    pub capacity_seconds: f64,
    pub idle_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub min_data_chunk_bytes: usize,
    pub max_chunks_per_tick: usize,
    pub lenient_size_correction: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(), // Localhost only (safe for development)
                port: 8080,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
            reassembly: ReassemblySettings {
                nominal_sample_rate: 44100,
                capacity_seconds: 3.0,
                idle_timeout_ms: 1500,
                tick_interval_ms: 10, // 100 ticks per second
                min_data_chunk_bytes: 46,
                max_chunks_per_tick: 1,
                lenient_size_correction: true,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_REASSEMBLY__IDLE_TIMEOUT_MS=2000`: Override the idle timeout
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    ///
    /// Nested keys are separated by a double underscore because the field
    /// names themselves contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        let reassembly = &self.reassembly;
        if reassembly.nominal_sample_rate == 0 {
            return Err(anyhow::anyhow!("Nominal sample rate must be greater than 0"));
        }

        if !reassembly.capacity_seconds.is_finite() || reassembly.capacity_seconds <= 0.0 {
            return Err(anyhow::anyhow!("Capacity seconds must be greater than 0"));
        }

        if reassembly.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!("Tick interval must be greater than 0"));
        }

        if reassembly.max_chunks_per_tick == 0 {
            return Err(anyhow::anyhow!("Max chunks per tick must be greater than 0"));
        }

        if reassembly.min_data_chunk_bytes < MIN_DATA_CHUNK_FLOOR {
            return Err(anyhow::anyhow!(
                "Min data chunk bytes must be at least {}",
                MIN_DATA_CHUNK_FLOOR
            ));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present are changed, so `{"reassembly": {"idle_timeout_ms": 2000}}`
    /// leaves everything else alone. The result is validated, and on failure
    /// `self` is left untouched.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;
        let mut updated = self.clone();

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                updated.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                updated.server.port = u16::try_from(port)?;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                updated.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        if let Some(reassembly) = partial_config.get("reassembly") {
            let target = &mut updated.reassembly;
            if let Some(rate) = reassembly.get("nominal_sample_rate").and_then(|v| v.as_u64()) {
                target.nominal_sample_rate = u32::try_from(rate)?;
            }
            if let Some(seconds) = reassembly.get("capacity_seconds").and_then(|v| v.as_f64()) {
                target.capacity_seconds = seconds;
            }
            if let Some(ms) = reassembly.get("idle_timeout_ms").and_then(|v| v.as_u64()) {
                target.idle_timeout_ms = ms;
            }
            if let Some(ms) = reassembly.get("tick_interval_ms").and_then(|v| v.as_u64()) {
                target.tick_interval_ms = ms;
            }
            if let Some(bytes) = reassembly.get("min_data_chunk_bytes").and_then(|v| v.as_u64()) {
                target.min_data_chunk_bytes = bytes as usize;
            }
            if let Some(chunks) = reassembly.get("max_chunks_per_tick").and_then(|v| v.as_u64()) {
                target.max_chunks_per_tick = chunks as usize;
            }
            if let Some(lenient) = reassembly
                .get("lenient_size_correction")
                .and_then(|v| v.as_bool())
            {
                target.lenient_size_correction = lenient;
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Engine-facing view of the reassembly section.
    pub fn to_reassembly_config(&self) -> ReassemblyConfig {
        let settings = &self.reassembly;
        ReassemblyConfig {
            nominal_sample_rate: settings.nominal_sample_rate,
            capacity_seconds: settings.capacity_seconds,
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            min_data_chunk_bytes: settings.min_data_chunk_bytes,
            max_chunks_per_tick: settings.max_chunks_per_tick,
            size_policy: if settings.lenient_size_correction {
                SizePolicy::Lenient
            } else {
                SizePolicy::Strict
            },
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.reassembly.tick_interval_ms)
    }
}
