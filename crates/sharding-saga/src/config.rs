//! Saga coordinator configuration.
//!
//! ```yaml
//! transactionMaxRetries: 3
//! compensationMaxRetries: 5
//! transactionRetryDelay: 500ms
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading a [`SagaConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read saga config: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse saga config: {0}")]
	Parse(String),
}

/// Retry budget handed to the compensation engine with every graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SagaConfig {
	/// Maximum number of forward retries per branch under forward recovery
	#[serde(default = "default_max_retries")]
	pub transaction_max_retries: u32,

	/// Maximum number of retries per revert statement under backward recovery
	#[serde(default = "default_max_retries")]
	pub compensation_max_retries: u32,

	/// Fixed delay between two attempts of the same statement
	#[serde(default = "default_retry_delay", with = "serde_dur")]
	pub transaction_retry_delay: Duration,
}

fn default_max_retries() -> u32 {
	5
}

fn default_retry_delay() -> Duration {
	Duration::from_secs(5)
}

impl Default for SagaConfig {
	fn default() -> Self {
		Self {
			transaction_max_retries: default_max_retries(),
			compensation_max_retries: default_max_retries(),
			transaction_retry_delay: default_retry_delay(),
		}
	}
}

impl SagaConfig {
	pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
		serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	pub fn from_json(text: &str) -> Result<Self, ConfigError> {
		serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Load a config file. Files ending in `.json` are parsed as JSON, anything
	/// else as YAML.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = fs_err::read_to_string(path)?;
		match path.extension().and_then(|e| e.to_str()) {
			Some("json") => Self::from_json(&text),
			_ => Self::from_yaml(&text),
		}
	}
}

/// Serde helpers for durations written as `"250us"`, `"500ms"`, `"5s"`, `"1m"`
/// or `"1h"`. Serialization picks the largest unit that is exact.
pub(crate) mod serde_dur {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let nanos = duration.subsec_nanos();
		let text = if nanos == 0 {
			format!("{}s", duration.as_secs())
		} else if nanos % 1_000_000 == 0 {
			format!("{}ms", duration.as_millis())
		} else if nanos % 1_000 == 0 {
			format!("{}us", duration.as_micros())
		} else {
			format!("{}ns", duration.as_nanos())
		};
		serializer.serialize_str(&text)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		parse(&s).map_err(serde::de::Error::custom)
	}

	pub fn parse(s: &str) -> Result<Duration, String> {
		let s = s.trim();
		let (digits, unit) = s
			.find(|c: char| !c.is_ascii_digit())
			.map(|idx| s.split_at(idx))
			.ok_or_else(|| format!("missing unit in duration: {s}"))?;
		let value: u64 = digits
			.parse()
			.map_err(|_| format!("invalid duration format: {s}"))?;
		let secs = |factor: u64| {
			value
				.checked_mul(factor)
				.map(Duration::from_secs)
				.ok_or_else(|| format!("duration out of range: {s}"))
		};
		match unit {
			"ns" => Ok(Duration::from_nanos(value)),
			"us" => Ok(Duration::from_micros(value)),
			"ms" => Ok(Duration::from_millis(value)),
			"s" => secs(1),
			"m" => secs(60),
			"h" => secs(3600),
			_ => Err(format!("invalid duration format: {s}")),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_defaults_when_empty() {
		let config = SagaConfig::from_json("{}").unwrap();
		assert_eq!(config, SagaConfig::default());
		assert_eq!(config.transaction_max_retries, 5);
		assert_eq!(config.transaction_retry_delay, Duration::from_secs(5));
	}

	#[test]
	fn test_yaml_config() {
		let yaml = "transactionMaxRetries: 3\ncompensationMaxRetries: 7\ntransactionRetryDelay: 250ms\n";
		let config = SagaConfig::from_yaml(yaml).unwrap();
		assert_eq!(config.transaction_max_retries, 3);
		assert_eq!(config.compensation_max_retries, 7);
		assert_eq!(config.transaction_retry_delay, Duration::from_millis(250));
	}

	#[test]
	fn test_denies_unknown_fields() {
		let result = SagaConfig::from_json(r#"{"maxRetries": 3}"#);
		assert_matches!(result, Err(ConfigError::Parse(_)));
	}

	#[test]
	fn test_invalid_duration() {
		assert!(SagaConfig::from_json(r#"{"transactionRetryDelay": "soon"}"#).is_err());
		assert!(SagaConfig::from_json(r#"{"transactionRetryDelay": "10"}"#).is_err());
		assert!(SagaConfig::from_json(r#"{"transactionRetryDelay": "10d"}"#).is_err());
	}

	#[test]
	fn test_duration_units() {
		assert_eq!(serde_dur::parse("2m").unwrap(), Duration::from_secs(120));
		assert_eq!(serde_dur::parse("1h").unwrap(), Duration::from_secs(3600));
		assert_eq!(serde_dur::parse(" 15s ").unwrap(), Duration::from_secs(15));
	}

	#[test]
	fn test_serialize_keeps_millis() {
		let config = SagaConfig {
			transaction_retry_delay: Duration::from_millis(1500),
			..Default::default()
		};
		let json = serde_json::to_value(&config).unwrap();
		assert_eq!(json["transactionRetryDelay"], "1500ms");

		let back: SagaConfig = serde_json::from_value(json).unwrap();
		assert_eq!(back, config);
	}

	#[test]
	fn test_oversized_duration_is_parse_error() {
		let result = SagaConfig::from_yaml("transactionRetryDelay: 99999999999999999h");
		assert_matches!(result, Err(ConfigError::Parse(msg)) if msg.contains("out of range"));
		assert!(serde_dur::parse("18446744073709551615m").is_err());
	}

	#[test]
	fn test_sub_millisecond_delay_survives_serialization() {
		for (delay, text) in [
			(Duration::from_micros(1500), "1500us"),
			(Duration::from_nanos(2_000_001), "2000001ns"),
			(Duration::ZERO, "0s"),
		] {
			let config = SagaConfig {
				transaction_retry_delay: delay,
				..Default::default()
			};
			let json = serde_json::to_value(&config).unwrap();
			assert_eq!(json["transactionRetryDelay"], text);

			let back: SagaConfig = serde_json::from_value(json).unwrap();
			assert_eq!(back.transaction_retry_delay, delay);
		}
	}

	#[test]
	fn test_from_file() {
		let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
		writeln!(file, "compensationMaxRetries: 1").unwrap();

		let config = SagaConfig::from_file(file.path()).unwrap();
		assert_eq!(config.compensation_max_retries, 1);
		assert_eq!(config.transaction_max_retries, 5);
	}

	#[test]
	fn test_from_missing_file() {
		let result = SagaConfig::from_file("/nonexistent/saga.yaml");
		assert_matches!(result, Err(ConfigError::Io(_)));
	}
}
