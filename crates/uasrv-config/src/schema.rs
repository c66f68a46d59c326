// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for uasrv.
//!
//! Every limit the runtime enforces lives here: listener capacity and
//! handshake timeout, security token lifetimes, session and continuation
//! point limits, subscription revision bounds and monitored item queues.
//! Values are validated once at load time.
//!
//! # Schema Structure
//!
//! ```text
//! ServerConfig
//! ├── server: NetworkConfig
//! ├── secure_channel: SecureChannelConfig
//! ├── session: SessionConfig
//! ├── subscription: SubscriptionConfig
//! ├── monitored_item: MonitoredItemConfig
//! └── logging: LoggingConfig
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default OPC UA TCP port.
pub const DEFAULT_PORT: u16 = 4840;

/// Default maximum number of concurrent secure channels.
pub const DEFAULT_MAX_CONNECTIONS: usize = 20;

/// Default handshake and admission timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default maximum message size in bytes (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Smallest message size a server may negotiate.
pub const MIN_MESSAGE_SIZE: usize = 8192;

/// Default number of channels closed in parallel during shutdown.
pub const DEFAULT_SHUTDOWN_CONCURRENCY: usize = 4;

/// Default security token lifetime in milliseconds (10 minutes).
pub const DEFAULT_TOKEN_LIFETIME_MS: u64 = 600_000;

/// Default floor for a revised token lifetime in milliseconds.
pub const DEFAULT_MIN_TOKEN_LIFETIME_MS: u64 = 1_000;

/// Default ceiling for a revised token lifetime in milliseconds (1 hour).
pub const DEFAULT_MAX_TOKEN_LIFETIME_MS: u64 = 3_600_000;

/// Default maximum number of sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Default session timeout in milliseconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 60_000;

/// Default minimum session timeout in milliseconds.
pub const DEFAULT_MIN_SESSION_TIMEOUT_MS: u64 = 1_000;

/// Default maximum session timeout in milliseconds (1 hour).
pub const DEFAULT_MAX_SESSION_TIMEOUT_MS: u64 = 3_600_000;

/// Default continuation points per session.
pub const DEFAULT_MAX_CONTINUATION_POINTS: usize = 10;

/// Default housekeeping sweep interval in milliseconds.
pub const DEFAULT_HOUSEKEEPING_INTERVAL_MS: u64 = 1_000;

/// Default minimum publishing interval in milliseconds.
pub const DEFAULT_MIN_PUBLISHING_INTERVAL_MS: u64 = 50;

/// Default maximum publishing interval in milliseconds (10 minutes).
pub const DEFAULT_MAX_PUBLISHING_INTERVAL_MS: u64 = 600_000;

/// Default publishing interval in milliseconds.
pub const DEFAULT_PUBLISHING_INTERVAL_MS: u64 = 1_000;

/// Default max keep-alive count.
pub const DEFAULT_KEEP_ALIVE_COUNT: u32 = 10;

/// Upper bound for max keep-alive count.
pub const MAX_KEEP_ALIVE_COUNT: u32 = 12_000;

/// Default max lifetime count.
pub const DEFAULT_LIFETIME_COUNT: u32 = 60;

/// Upper bound for max lifetime count.
pub const MAX_LIFETIME_COUNT: u32 = 86_400;

/// Default subscriptions per session.
pub const DEFAULT_MAX_SUBSCRIPTIONS_PER_SESSION: usize = 50;

/// Default queued publish requests per session.
pub const DEFAULT_MAX_PUBLISH_REQUESTS: usize = 100;

/// Default monitored items per subscription.
pub const DEFAULT_MAX_MONITORED_ITEMS: usize = 1_000;

/// Default minimum sampling interval in milliseconds.
pub const DEFAULT_MIN_SAMPLING_INTERVAL_MS: u64 = 50;

/// Default sampling interval in milliseconds.
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 250;

/// Default maximum sampling interval in milliseconds.
pub const DEFAULT_MAX_SAMPLING_INTERVAL_MS: u64 = 600_000;

/// Default monitored item queue size.
pub const DEFAULT_QUEUE_SIZE: u32 = 1;

/// Default maximum monitored item queue size.
pub const DEFAULT_MAX_QUEUE_SIZE: u32 = 1_000;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for a uasrv instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: NetworkConfig,

    /// Secure channel token configuration.
    #[serde(default)]
    pub secure_channel: SecureChannelConfig,

    /// Session limits.
    #[serde(default)]
    pub session: SessionConfig,

    /// Subscription limits.
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Monitored item limits.
    #[serde(default)]
    pub monitored_item: MonitoredItemConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.secure_channel.validate()?;
        self.session.validate()?;
        self.subscription.validate()?;
        self.monitored_item.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// =============================================================================
// Network Configuration
// =============================================================================

/// TCP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Listen port (0 picks an ephemeral port).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of concurrent secure channels.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Handshake deadline and admission defer bound, in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Largest accepted frame in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Channels closed in parallel during shutdown.
    #[serde(default = "default_shutdown_concurrency")]
    pub shutdown_concurrency: usize,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_shutdown_concurrency() -> usize {
    DEFAULT_SHUTDOWN_CONCURRENCY
}

impl NetworkConfig {
    /// Validates the listener configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "server.max_connections",
                "cannot be zero",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::validation("server.timeout_ms", "cannot be zero"));
        }
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(ConfigError::out_of_range(
                "server.max_message_size",
                self.max_message_size,
                MIN_MESSAGE_SIZE,
                usize::MAX,
            ));
        }
        if self.shutdown_concurrency == 0 {
            return Err(ConfigError::validation(
                "server.shutdown_concurrency",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Returns the socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Returns the timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            shutdown_concurrency: DEFAULT_SHUTDOWN_CONCURRENCY,
        }
    }
}

// =============================================================================
// Secure Channel Configuration
// =============================================================================

/// Security token lifetime bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecureChannelConfig {
    /// Lifetime used when the client requests 0, and the upper bound of any revision.
    #[serde(default = "default_token_lifetime")]
    pub default_token_lifetime_ms: u64,

    /// Floor for revised lifetimes.
    #[serde(default = "default_min_token_lifetime")]
    pub minimum_token_lifetime_ms: u64,

    /// Configured ceiling for revised lifetimes.
    #[serde(default = "default_max_token_lifetime")]
    pub maximum_token_lifetime_ms: u64,
}

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_MS
}

fn default_min_token_lifetime() -> u64 {
    DEFAULT_MIN_TOKEN_LIFETIME_MS
}

fn default_max_token_lifetime() -> u64 {
    DEFAULT_MAX_TOKEN_LIFETIME_MS
}

impl SecureChannelConfig {
    /// Validates the token lifetime bounds.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.minimum_token_lifetime_ms == 0 {
            return Err(ConfigError::validation(
                "secure_channel.minimum_token_lifetime_ms",
                "cannot be zero",
            ));
        }
        if self.minimum_token_lifetime_ms > self.maximum_token_lifetime_ms {
            return Err(ConfigError::validation(
                "secure_channel.minimum_token_lifetime_ms",
                "must not exceed maximum_token_lifetime_ms",
            ));
        }
        if self.default_token_lifetime_ms < self.minimum_token_lifetime_ms
            || self.default_token_lifetime_ms > self.maximum_token_lifetime_ms
        {
            return Err(ConfigError::out_of_range(
                "secure_channel.default_token_lifetime_ms",
                self.default_token_lifetime_ms,
                self.minimum_token_lifetime_ms,
                self.maximum_token_lifetime_ms,
            ));
        }
        Ok(())
    }
}

impl Default for SecureChannelConfig {
    fn default() -> Self {
        Self {
            default_token_lifetime_ms: DEFAULT_TOKEN_LIFETIME_MS,
            minimum_token_lifetime_ms: DEFAULT_MIN_TOKEN_LIFETIME_MS,
            maximum_token_lifetime_ms: DEFAULT_MAX_TOKEN_LIFETIME_MS,
        }
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum number of concurrent sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Timeout used when the client requests 0.
    #[serde(default = "default_session_timeout")]
    pub default_timeout_ms: u64,

    /// Floor for revised session timeouts.
    #[serde(default = "default_min_session_timeout")]
    pub min_timeout_ms: u64,

    /// Ceiling for revised session timeouts.
    #[serde(default = "default_max_session_timeout")]
    pub max_timeout_ms: u64,

    /// Stored continuation points per session.
    #[serde(default = "default_max_continuation_points")]
    pub max_continuation_points: usize,

    /// Interval of the session expiry and publish timeout sweep.
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_ms: u64,
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_session_timeout() -> u64 {
    DEFAULT_SESSION_TIMEOUT_MS
}

fn default_min_session_timeout() -> u64 {
    DEFAULT_MIN_SESSION_TIMEOUT_MS
}

fn default_max_session_timeout() -> u64 {
    DEFAULT_MAX_SESSION_TIMEOUT_MS
}

fn default_max_continuation_points() -> usize {
    DEFAULT_MAX_CONTINUATION_POINTS
}

fn default_housekeeping_interval() -> u64 {
    DEFAULT_HOUSEKEEPING_INTERVAL_MS
}

impl SessionConfig {
    /// Validates the session limits.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_sessions == 0 {
            return Err(ConfigError::validation("session.max_sessions", "cannot be zero"));
        }
        if self.min_timeout_ms == 0 || self.min_timeout_ms > self.max_timeout_ms {
            return Err(ConfigError::validation(
                "session.min_timeout_ms",
                "must be non-zero and not exceed max_timeout_ms",
            ));
        }
        if self.default_timeout_ms < self.min_timeout_ms
            || self.default_timeout_ms > self.max_timeout_ms
        {
            return Err(ConfigError::out_of_range(
                "session.default_timeout_ms",
                self.default_timeout_ms,
                self.min_timeout_ms,
                self.max_timeout_ms,
            ));
        }
        if self.housekeeping_interval_ms == 0 {
            return Err(ConfigError::validation(
                "session.housekeeping_interval_ms",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Revises a client-requested session timeout. Zero means the default.
    pub fn revise_timeout(&self, requested_ms: u64) -> Duration {
        let ms = if requested_ms == 0 {
            self.default_timeout_ms
        } else {
            requested_ms.clamp(self.min_timeout_ms, self.max_timeout_ms)
        };
        Duration::from_millis(ms)
    }

    /// Returns the housekeeping interval as a Duration.
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            default_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            min_timeout_ms: DEFAULT_MIN_SESSION_TIMEOUT_MS,
            max_timeout_ms: DEFAULT_MAX_SESSION_TIMEOUT_MS,
            max_continuation_points: DEFAULT_MAX_CONTINUATION_POINTS,
            housekeeping_interval_ms: DEFAULT_HOUSEKEEPING_INTERVAL_MS,
        }
    }
}

// =============================================================================
// Subscription Configuration
// =============================================================================

/// Subscription revision bounds and per-session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Minimum publishing interval.
    #[serde(default = "default_min_publishing_interval")]
    pub min_publishing_interval_ms: u64,

    /// Maximum publishing interval.
    #[serde(default = "default_max_publishing_interval")]
    pub max_publishing_interval_ms: u64,

    /// Publishing interval used when the client requests 0.
    #[serde(default = "default_publishing_interval")]
    pub default_publishing_interval_ms: u64,

    /// Keep-alive count used when the client requests 0.
    #[serde(default = "default_keep_alive_count")]
    pub default_keep_alive_count: u32,

    /// Upper bound for the keep-alive count.
    #[serde(default = "default_max_keep_alive_count")]
    pub max_keep_alive_count: u32,

    /// Lifetime count used when the client requests 0.
    #[serde(default = "default_lifetime_count")]
    pub default_lifetime_count: u32,

    /// Upper bound for the lifetime count.
    #[serde(default = "default_max_lifetime_count")]
    pub max_lifetime_count: u32,

    /// Subscriptions a single session may own.
    #[serde(default = "default_max_subscriptions_per_session")]
    pub max_subscriptions_per_session: usize,

    /// Publish requests queued per session before the oldest is rejected.
    #[serde(default = "default_max_publish_requests")]
    pub max_publish_requests: usize,

    /// Notifications per publish response (0 = unlimited).
    #[serde(default)]
    pub max_notifications_per_publish: usize,

    /// Monitored items a single subscription may own.
    #[serde(default = "default_max_monitored_items")]
    pub max_monitored_items_per_subscription: usize,
}

fn default_min_publishing_interval() -> u64 {
    DEFAULT_MIN_PUBLISHING_INTERVAL_MS
}

fn default_max_publishing_interval() -> u64 {
    DEFAULT_MAX_PUBLISHING_INTERVAL_MS
}

fn default_publishing_interval() -> u64 {
    DEFAULT_PUBLISHING_INTERVAL_MS
}

fn default_keep_alive_count() -> u32 {
    DEFAULT_KEEP_ALIVE_COUNT
}

fn default_max_keep_alive_count() -> u32 {
    MAX_KEEP_ALIVE_COUNT
}

fn default_lifetime_count() -> u32 {
    DEFAULT_LIFETIME_COUNT
}

fn default_max_lifetime_count() -> u32 {
    MAX_LIFETIME_COUNT
}

fn default_max_subscriptions_per_session() -> usize {
    DEFAULT_MAX_SUBSCRIPTIONS_PER_SESSION
}

fn default_max_publish_requests() -> usize {
    DEFAULT_MAX_PUBLISH_REQUESTS
}

fn default_max_monitored_items() -> usize {
    DEFAULT_MAX_MONITORED_ITEMS
}

impl SubscriptionConfig {
    /// Validates the subscription limits.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_publishing_interval_ms == 0
            || self.min_publishing_interval_ms > self.max_publishing_interval_ms
        {
            return Err(ConfigError::validation(
                "subscription.min_publishing_interval_ms",
                "must be non-zero and not exceed max_publishing_interval_ms",
            ));
        }
        if self.default_publishing_interval_ms < self.min_publishing_interval_ms
            || self.default_publishing_interval_ms > self.max_publishing_interval_ms
        {
            return Err(ConfigError::out_of_range(
                "subscription.default_publishing_interval_ms",
                self.default_publishing_interval_ms,
                self.min_publishing_interval_ms,
                self.max_publishing_interval_ms,
            ));
        }
        if self.default_keep_alive_count == 0
            || self.default_keep_alive_count > self.max_keep_alive_count
        {
            return Err(ConfigError::out_of_range(
                "subscription.default_keep_alive_count",
                self.default_keep_alive_count,
                1,
                self.max_keep_alive_count,
            ));
        }
        if self.max_lifetime_count < self.max_keep_alive_count.saturating_mul(3) {
            return Err(ConfigError::validation(
                "subscription.max_lifetime_count",
                "must be at least three times max_keep_alive_count",
            ));
        }
        if self.default_lifetime_count > self.max_lifetime_count {
            return Err(ConfigError::out_of_range(
                "subscription.default_lifetime_count",
                self.default_lifetime_count,
                0,
                self.max_lifetime_count,
            ));
        }
        if self.max_subscriptions_per_session == 0 {
            return Err(ConfigError::validation(
                "subscription.max_subscriptions_per_session",
                "cannot be zero",
            ));
        }
        if self.max_publish_requests == 0 {
            return Err(ConfigError::validation(
                "subscription.max_publish_requests",
                "cannot be zero",
            ));
        }
        if self.max_monitored_items_per_subscription == 0 {
            return Err(ConfigError::validation(
                "subscription.max_monitored_items_per_subscription",
                "cannot be zero",
            ));
        }
        Ok(())
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            min_publishing_interval_ms: DEFAULT_MIN_PUBLISHING_INTERVAL_MS,
            max_publishing_interval_ms: DEFAULT_MAX_PUBLISHING_INTERVAL_MS,
            default_publishing_interval_ms: DEFAULT_PUBLISHING_INTERVAL_MS,
            default_keep_alive_count: DEFAULT_KEEP_ALIVE_COUNT,
            max_keep_alive_count: MAX_KEEP_ALIVE_COUNT,
            default_lifetime_count: DEFAULT_LIFETIME_COUNT,
            max_lifetime_count: MAX_LIFETIME_COUNT,
            max_subscriptions_per_session: DEFAULT_MAX_SUBSCRIPTIONS_PER_SESSION,
            max_publish_requests: DEFAULT_MAX_PUBLISH_REQUESTS,
            max_notifications_per_publish: 0,
            max_monitored_items_per_subscription: DEFAULT_MAX_MONITORED_ITEMS,
        }
    }
}

// =============================================================================
// Monitored Item Configuration
// =============================================================================

/// Monitored item sampling and queue bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoredItemConfig {
    /// Fastest sampling interval.
    #[serde(default = "default_min_sampling_interval")]
    pub min_sampling_interval_ms: u64,

    /// Slowest sampling interval.
    #[serde(default = "default_max_sampling_interval")]
    pub max_sampling_interval_ms: u64,

    /// Sampling interval used when the client requests 0.
    #[serde(default = "default_sampling_interval")]
    pub default_sampling_interval_ms: u64,

    /// Queue size used when the client requests 0.
    #[serde(default = "default_queue_size")]
    pub default_queue_size: u32,

    /// Upper bound for queue size.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u32,

    /// Default discard policy.
    #[serde(default = "default_discard_oldest")]
    pub discard_oldest: bool,
}

fn default_min_sampling_interval() -> u64 {
    DEFAULT_MIN_SAMPLING_INTERVAL_MS
}

fn default_max_sampling_interval() -> u64 {
    DEFAULT_MAX_SAMPLING_INTERVAL_MS
}

fn default_sampling_interval() -> u64 {
    DEFAULT_SAMPLING_INTERVAL_MS
}

fn default_queue_size() -> u32 {
    DEFAULT_QUEUE_SIZE
}

fn default_max_queue_size() -> u32 {
    DEFAULT_MAX_QUEUE_SIZE
}

fn default_discard_oldest() -> bool {
    true
}

impl MonitoredItemConfig {
    /// Validates the monitored item bounds.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_sampling_interval_ms == 0 {
            return Err(ConfigError::validation(
                "monitored_item.min_sampling_interval_ms",
                "cannot be zero",
            ));
        }
        if self.max_sampling_interval_ms < self.min_sampling_interval_ms {
            return Err(ConfigError::validation(
                "monitored_item.max_sampling_interval_ms",
                "must not be below min_sampling_interval_ms",
            ));
        }
        if !(self.min_sampling_interval_ms..=self.max_sampling_interval_ms)
            .contains(&self.default_sampling_interval_ms)
        {
            return Err(ConfigError::out_of_range(
                "monitored_item.default_sampling_interval_ms",
                self.default_sampling_interval_ms,
                self.min_sampling_interval_ms,
                self.max_sampling_interval_ms,
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::validation(
                "monitored_item.max_queue_size",
                "cannot be zero",
            ));
        }
        if self.default_queue_size == 0 || self.default_queue_size > self.max_queue_size {
            return Err(ConfigError::out_of_range(
                "monitored_item.default_queue_size",
                self.default_queue_size,
                1,
                self.max_queue_size,
            ));
        }
        Ok(())
    }
}

impl Default for MonitoredItemConfig {
    fn default() -> Self {
        Self {
            min_sampling_interval_ms: DEFAULT_MIN_SAMPLING_INTERVAL_MS,
            max_sampling_interval_ms: DEFAULT_MAX_SAMPLING_INTERVAL_MS,
            default_sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            default_queue_size: DEFAULT_QUEUE_SIZE,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Validates the logging configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Compact single-line text.
    Compact,
    /// JSON for log aggregation.
    Json,
}

impl LogFormat {
    /// Returns the format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}
