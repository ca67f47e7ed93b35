//! Gateway configuration.

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CoalescePolicy, limit::DEFAULT_OUTPUT_LIMIT};

/// Smallest accepted output budget; failure messages must still fit.
pub const MIN_OUTPUT_LIMIT: usize = 64;

/// How streamed chunks reach the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum StreamPipeline {
    /// Regroup fragments under a size/latency policy.
    Coalesced(CoalescePolicy),
    /// Forward fragments exactly as the channel produced them.
    Passthrough,
}

impl Default for StreamPipeline {
    fn default() -> Self {
        Self::Coalesced(CoalescePolicy::default())
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be at least {min}, got {value}")]
    TooSmall {
        key: &'static str,
        min: usize,
        value: usize,
    },
}

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Character budget for returned output.
    pub output_limit: usize,
    /// Ceiling applied to invocations that do not set their own.
    pub hard_timeout: Option<Duration>,
    /// Default streaming pipeline.
    pub stream_pipeline: StreamPipeline,
    /// Apply the output limit to suspendable executions as well.
    pub limit_async_output: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
            hard_timeout: None,
            stream_pipeline: StreamPipeline::default(),
            limit_async_output: true,
        }
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns error if a value is present but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(limit) = parse::<usize>(&lookup, "GATEWAY_OUTPUT_LIMIT")? {
            if limit < MIN_OUTPUT_LIMIT {
                return Err(ConfigError::TooSmall {
                    key: "GATEWAY_OUTPUT_LIMIT",
                    min: MIN_OUTPUT_LIMIT,
                    value: limit,
                });
            }
            config.output_limit = limit;
        }

        config.hard_timeout = parse::<u64>(&lookup, "HARD_TIMEOUT")?.map(Duration::from_secs);

        if let Some(limit_async) = parse_flag(&lookup, "GATEWAY_LIMIT_ASYNC")? {
            config.limit_async_output = limit_async;
        }

        let raw = parse_flag(&lookup, "GATEWAY_STREAM_RAW")?.unwrap_or(true);
        config.stream_pipeline = if raw {
            let mut policy = CoalescePolicy::default();
            if let Some(bytes) = parse::<usize>(&lookup, "GATEWAY_COALESCE_BYTES")? {
                policy.max_bytes = bytes.max(1);
            }
            if let Some(ms) = parse::<u64>(&lookup, "GATEWAY_COALESCE_DELAY_MS")? {
                policy.max_delay = Duration::from_millis(ms);
            }
            StreamPipeline::Coalesced(policy)
        } else {
            StreamPipeline::Passthrough
        };

        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
