//! Configuration for the Miden node connection and the facilitator engine.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::MidenChainReference;

/// Configuration for a Miden chain connection.
///
/// Used to build a [`MidenChainProvider`](super::provider::MidenChainProvider).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidenChainConfig {
    /// The chain reference (`testnet` or `mainnet`).
    pub chain_reference: MidenChainReference,
    /// The Miden node RPC endpoint URL.
    pub rpc_url: String,
}

/// What happens when a payment carries more than the required amount.
///
/// Overpaid value is never refunded by the facilitator. The policy only
/// decides whether such a payment is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// Accept `paid >= required`; the excess stays with the recipient.
    #[default]
    RetainedByRecipient,
    /// Accept only `paid == required`.
    RejectExcess,
}

impl OverpaymentPolicy {
    /// Returns true if `paid` satisfies `required` under this policy.
    pub fn accepts(self, required: u64, paid: u64) -> bool {
        match self {
            OverpaymentPolicy::RetainedByRecipient => paid >= required,
            OverpaymentPolicy::RejectExcess => paid == required,
        }
    }
}

impl fmt::Display for OverpaymentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverpaymentPolicy::RetainedByRecipient => write!(f, "retain"),
            OverpaymentPolicy::RejectExcess => write!(f, "reject"),
        }
    }
}

impl FromStr for OverpaymentPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retain" | "retained_by_recipient" => Ok(OverpaymentPolicy::RetainedByRecipient),
            "reject" | "reject_excess" => Ok(OverpaymentPolicy::RejectExcess),
            other => Err(ConfigError::Invalid {
                key: "FACILITATOR_OVERPAYMENT",
                value: other.to_string(),
            }),
        }
    }
}

/// Tunables of the verification and settlement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacilitatorConfig {
    /// Target security level in bits for STARK proof verification.
    pub security_level: u32,
    /// Upper bound on entries in each of the verified and receipt caches.
    pub cache_capacity: usize,
    /// How long a verified transaction stays reusable by a later settle.
    pub verified_ttl_secs: u64,
    /// How long a settlement receipt short-circuits duplicate settles.
    pub receipt_ttl_secs: u64,
    pub overpayment: OverpaymentPolicy,
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            security_level: 96,
            cache_capacity: 10_000,
            verified_ttl_secs: 300,
            receipt_ttl_secs: 3_600,
            overpayment: OverpaymentPolicy::default(),
        }
    }
}

impl FacilitatorConfig {
    /// Builds a config from `FACILITATOR_*` environment variables, falling
    /// back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_parse("FACILITATOR_SECURITY_LEVEL")? {
            config.security_level = v;
        }
        if let Some(v) = env_parse("FACILITATOR_CACHE_CAPACITY")? {
            config.cache_capacity = v;
        }
        if let Some(v) = env_parse("FACILITATOR_VERIFIED_TTL_SECS")? {
            config.verified_ttl_secs = v;
        }
        if let Some(v) = env_parse("FACILITATOR_RECEIPT_TTL_SECS")? {
            config.receipt_ttl_secs = v;
        }
        if let Ok(v) = env::var("FACILITATOR_OVERPAYMENT") {
            config.overpayment = v.parse()?;
        }
        Ok(config)
    }

    pub fn verified_ttl(&self) -> Duration {
        Duration::from_secs(self.verified_ttl_secs)
    }

    pub fn receipt_ttl(&self) -> Duration {
        Duration::from_secs(self.receipt_ttl_secs)
    }
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}

/// Error returned when configuration values cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_monotonic() {
        let policy = OverpaymentPolicy::default();
        assert!(policy.accepts(1_000_000, 1_000_000));
        assert!(policy.accepts(1_000_000, 1_000_001));
        assert!(policy.accepts(0, u64::MAX));
        assert!(!policy.accepts(1_000_000, 999_999));
    }

    #[test]
    fn test_reject_excess_requires_equality() {
        let policy = OverpaymentPolicy::RejectExcess;
        assert!(policy.accepts(1_000_000, 1_000_000));
        assert!(!policy.accepts(1_000_000, 1_000_001));
        assert!(!policy.accepts(1_000_000, 999_999));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "retain".parse::<OverpaymentPolicy>().unwrap(),
            OverpaymentPolicy::RetainedByRecipient
        );
        assert_eq!(
            "reject_excess".parse::<OverpaymentPolicy>().unwrap(),
            OverpaymentPolicy::RejectExcess
        );
        assert!("refund".parse::<OverpaymentPolicy>().is_err());
    }

    #[test]
    fn test_config_json_uses_defaults_for_missing_fields() {
        let config: FacilitatorConfig =
            serde_json::from_str(r#"{"overpayment":"reject_excess","cacheCapacity":8}"#).unwrap();
        assert_eq!(config.overpayment, OverpaymentPolicy::RejectExcess);
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.security_level, 96);
        assert_eq!(config.receipt_ttl(), Duration::from_secs(3_600));
    }
}
