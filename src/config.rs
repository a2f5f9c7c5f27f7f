//! Engine Configuration
//!
//! Defaults match the limits users are told about; every field can be
//! overridden from `TABULAR_*` environment variables.

use crate::error::{EngineError, Result};
use crate::ingestion::detector::FileFamily;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Per-family upload ceilings, in megabytes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SizeLimits {
    pub delimited_mb: u64,
    pub spreadsheet_mb: u64,
    pub free_text_mb: u64,
    pub json_mb: u64,
    pub document_mb: u64,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            delimited_mb: 10,
            spreadsheet_mb: 8,
            free_text_mb: 5,
            json_mb: 5,
            document_mb: 6,
        }
    }
}

impl SizeLimits {
    /// Ceiling for a family; `None` for families that are rejected anyway.
    pub fn limit_mb(&self, family: FileFamily) -> Option<u64> {
        match family {
            FileFamily::Delimited => Some(self.delimited_mb),
            FileFamily::Spreadsheet => Some(self.spreadsheet_mb),
            FileFamily::FreeText => Some(self.free_text_mb),
            FileFamily::Json => Some(self.json_mb),
            FileFamily::Document => Some(self.document_mb),
            FileFamily::Unknown => None,
        }
    }

    pub fn largest_mb(&self) -> u64 {
        [
            self.delimited_mb,
            self.spreadsheet_mb,
            self.free_text_mb,
            self.json_mb,
            self.document_mb,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

pub fn megabytes_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    /// Rows sampled per column.
    pub sample_cap: usize,
    /// Share of non-null values a type must exceed to win the vote.
    pub majority_threshold: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sample_cap: 1000,
            majority_threshold: 0.70,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SniffConfig {
    /// Non-blank lines inspected when sniffing a delimiter.
    pub sniff_lines: usize,
    /// Below this dialect confidence free text is not treated as delimited.
    pub free_text_min_confidence: u8,
    pub fixed_width_sample_lines: usize,
}

impl Default for SniffConfig {
    fn default() -> Self {
        Self {
            sniff_lines: 20,
            free_text_min_confidence: 60,
            fixed_width_sample_lines: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Attempts handed to the external repair service.
    pub repair_attempts: u8,
    /// Total retry attempts per draft, fallbacks included.
    pub attempt_budget: u8,
    /// Rows shown to the repair service.
    pub sample_rows: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            repair_attempts: 2,
            attempt_budget: 5,
            sample_rows: 5,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub size_limits: SizeLimits,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub sniff: SniffConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        override_from_env("TABULAR_MAX_DELIMITED_MB", &mut config.size_limits.delimited_mb)?;
        override_from_env("TABULAR_MAX_SPREADSHEET_MB", &mut config.size_limits.spreadsheet_mb)?;
        override_from_env("TABULAR_MAX_FREE_TEXT_MB", &mut config.size_limits.free_text_mb)?;
        override_from_env("TABULAR_MAX_JSON_MB", &mut config.size_limits.json_mb)?;
        override_from_env("TABULAR_MAX_DOCUMENT_MB", &mut config.size_limits.document_mb)?;
        override_from_env("TABULAR_INFERENCE_SAMPLE_CAP", &mut config.inference.sample_cap)?;
        override_from_env("TABULAR_INFERENCE_THRESHOLD", &mut config.inference.majority_threshold)?;
        override_from_env("TABULAR_SNIFF_LINES", &mut config.sniff.sniff_lines)?;
        override_from_env("TABULAR_REPAIR_ATTEMPTS", &mut config.retry.repair_attempts)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.inference.majority_threshold) {
            return Err(EngineError::Config(format!(
                "majority_threshold must be in [0, 1), got {}",
                self.inference.majority_threshold
            )));
        }
        if self.retry.repair_attempts.saturating_add(3) > self.retry.attempt_budget {
            return Err(EngineError::Config(format!(
                "attempt_budget {} leaves no room for {} repair attempts plus the three fallback stages",
                self.retry.attempt_budget, self.retry.repair_attempts
            )));
        }
        if self.inference.sample_cap == 0 || self.sniff.sniff_lines == 0 {
            return Err(EngineError::Config("sample sizes must be positive".to_string()));
        }
        Ok(())
    }
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) -> Result<()> {
    if let Ok(raw) = std::env::var(key) {
        *slot = raw
            .trim()
            .parse::<T>()
            .map_err(|_| EngineError::Config(format!("{} has an invalid value: {}", key, raw)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = SizeLimits::default();
        assert_eq!(limits.limit_mb(FileFamily::Delimited), Some(10));
        assert_eq!(limits.limit_mb(FileFamily::Spreadsheet), Some(8));
        assert_eq!(limits.limit_mb(FileFamily::Unknown), None);
        assert_eq!(limits.largest_mb(), 10);
    }

    #[test]
    fn test_validate_rejects_small_budget() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());
        config.retry.attempt_budget = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        assert_eq!(megabytes_to_bytes(u64::MAX), u64::MAX);
        assert_eq!(megabytes_to_bytes(2), 2 * 1024 * 1024);

        let mut config = EngineConfig::default();
        config.retry.repair_attempts = u8::MAX;
        config.retry.attempt_budget = u8::MAX;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }
}
