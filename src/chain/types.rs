//! Wire format types for Miden chain identifiers and amounts.
//!
//! Account ids, chain references and token deployments as they appear in
//! x402 requirements and payloads. All of them serialize as strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use x402_types::chain::ChainId;

/// The CAIP-2 namespace for Miden chains.
pub const MIDEN_NAMESPACE: &str = "miden";

/// The byte length of a Miden account ID (120 bits).
pub const MIDEN_ACCOUNT_ID_BYTE_LEN: usize = 15;

// ============================================================================
// MidenAccountAddress
// ============================================================================

/// A Miden account ID that serializes as a `0x`-prefixed hex string.
///
/// Used for payers, recipients and faucets (the asset identifier of a
/// fungible token is the id of the faucet account that issues it).
///
/// # Example
///
/// ```
/// use x402_miden_engine::chain::MidenAccountAddress;
///
/// let addr: MidenAccountAddress = "0xabcdef1234567890abcdef12345678".parse().unwrap();
/// assert_eq!(addr.to_string(), "0xabcdef1234567890abcdef12345678");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MidenAccountAddress([u8; MIDEN_ACCOUNT_ID_BYTE_LEN]);

impl MidenAccountAddress {
    /// Wraps a raw 15-byte account id.
    pub const fn new(bytes: [u8; MIDEN_ACCOUNT_ID_BYTE_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an address from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 15 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MidenAddressParseError> {
        let array: [u8; MIDEN_ACCOUNT_ID_BYTE_LEN] =
            bytes
                .try_into()
                .map_err(|_| MidenAddressParseError::InvalidLength {
                    expected: MIDEN_ACCOUNT_ID_BYTE_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Returns the raw bytes of the account ID.
    pub fn as_bytes(&self) -> &[u8; MIDEN_ACCOUNT_ID_BYTE_LEN] {
        &self.0
    }

    /// Returns the hex-encoded account ID with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for MidenAccountAddress {
    type Err = MidenAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(s).map_err(|e| MidenAddressParseError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Display for MidenAccountAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for MidenAccountAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MidenAccountAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Conversions to and from the miden-protocol `AccountId` type.
#[cfg(feature = "miden-native")]
impl MidenAccountAddress {
    /// Converts this address to a miden-protocol `AccountId`.
    ///
    /// Fails when the bytes do not form a valid account id (version, type
    /// and storage-mode bits are checked by `AccountId::from_hex`).
    pub fn to_account_id(
        &self,
    ) -> Result<miden_protocol::account::AccountId, MidenAddressParseError> {
        miden_protocol::account::AccountId::from_hex(&self.to_hex())
            .map_err(|e| MidenAddressParseError::InvalidAccountId(e.to_string()))
    }

    /// Creates an address from a miden-protocol `AccountId`.
    pub fn from_account_id(id: miden_protocol::account::AccountId) -> Self {
        Self(<[u8; MIDEN_ACCOUNT_ID_BYTE_LEN]>::from(id))
    }
}

/// Error returned when parsing a Miden account address.
#[derive(Debug, thiserror::Error)]
pub enum MidenAddressParseError {
    /// The hex string is invalid.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// The byte length is wrong.
    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    /// The bytes are not a valid protocol account id.
    #[cfg(feature = "miden-native")]
    #[error("Invalid account ID: {0}")]
    InvalidAccountId(String),
}

// ============================================================================
// MidenChainReference
// ============================================================================

/// A Miden chain reference (`testnet` or `mainnet`).
///
/// Combined with the `miden` namespace this forms a CAIP-2 chain ID such as
/// `miden:testnet`.
///
/// ```
/// use x402_miden_engine::chain::MidenChainReference;
/// use x402_types::chain::ChainId;
///
/// let chain_id: ChainId = MidenChainReference::testnet().into();
/// assert_eq!(chain_id.to_string(), "miden:testnet");
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MidenChainReference(String);

impl MidenChainReference {
    /// Returns the Miden testnet chain reference.
    pub fn testnet() -> Self {
        Self("testnet".to_string())
    }

    /// Returns the Miden mainnet chain reference.
    pub fn mainnet() -> Self {
        Self("mainnet".to_string())
    }

    /// Converts this chain reference to a CAIP-2 [`ChainId`].
    pub fn as_chain_id(&self) -> ChainId {
        ChainId::new(MIDEN_NAMESPACE, &self.0)
    }

    /// Returns the inner reference string.
    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl Display for MidenChainReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MidenChainReference> for ChainId {
    fn from(value: MidenChainReference) -> Self {
        ChainId::new(MIDEN_NAMESPACE, value.0)
    }
}

impl From<&MidenChainReference> for ChainId {
    fn from(value: &MidenChainReference) -> Self {
        value.as_chain_id()
    }
}

impl TryFrom<&ChainId> for MidenChainReference {
    type Error = MidenChainReferenceFormatError;

    fn try_from(value: &ChainId) -> Result<Self, Self::Error> {
        if value.namespace != MIDEN_NAMESPACE {
            return Err(MidenChainReferenceFormatError::InvalidNamespace(
                value.namespace.clone(),
            ));
        }
        MidenChainReference::try_from(value.reference.as_str())
    }
}

impl TryFrom<ChainId> for MidenChainReference {
    type Error = MidenChainReferenceFormatError;

    fn try_from(value: ChainId) -> Result<Self, Self::Error> {
        MidenChainReference::try_from(&value)
    }
}

impl TryFrom<&str> for MidenChainReference {
    type Error = MidenChainReferenceFormatError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "testnet" | "mainnet" => Ok(MidenChainReference(value.to_string())),
            _ => Err(MidenChainReferenceFormatError::InvalidReference(
                value.to_string(),
            )),
        }
    }
}

/// Error returned when converting into a [`MidenChainReference`].
#[derive(Debug, thiserror::Error)]
pub enum MidenChainReferenceFormatError {
    #[error("Invalid namespace {0}, expected miden")]
    InvalidNamespace(String),
    #[error("Invalid reference {0}, expected testnet or mainnet")]
    InvalidReference(String),
}

// ============================================================================
// MidenTokenDeployment
// ============================================================================

/// A fungible token issued by a faucet account on a Miden chain.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MidenTokenDeployment {
    /// The chain this faucet is deployed on.
    pub chain_reference: MidenChainReference,
    /// The faucet account ID; doubles as the asset identifier.
    pub faucet_id: MidenAccountAddress,
    /// Number of decimal places (6 for USDC-equivalents).
    pub decimals: u8,
}

/// A token amount in smallest units, paired with its deployment.
#[derive(Debug, Clone)]
pub struct MidenDeployedTokenAmount {
    pub amount: u64,
    pub token: MidenTokenDeployment,
}

impl MidenTokenDeployment {
    /// Creates a token amount from a value already in smallest units.
    pub fn amount(&self, v: u64) -> MidenDeployedTokenAmount {
        MidenDeployedTokenAmount {
            amount: v,
            token: self.clone(),
        }
    }

    /// Parses a human-readable amount such as `"10.50"` into smallest units.
    ///
    /// # Errors
    ///
    /// Fails on malformed input, more fractional digits than the token has
    /// decimals, or overflow of `u64`.
    pub fn parse(&self, v: &str) -> Result<MidenDeployedTokenAmount, MidenAmountParseError> {
        let (whole, frac) = match v.split_once('.') {
            Some((whole, frac)) if !frac.contains('.') => (whole, frac),
            Some(_) => return Err(MidenAmountParseError::InvalidFormat(v.to_string())),
            None => (v, ""),
        };

        let frac_len = frac.len() as u32;
        if frac_len > u32::from(self.decimals) {
            return Err(MidenAmountParseError::TooManyDecimals {
                got: frac_len,
                max: self.decimals,
            });
        }

        let parse_digits = |digits: &str| -> Result<u64, MidenAmountParseError> {
            if digits.is_empty() {
                return Ok(0);
            }
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(MidenAmountParseError::InvalidFormat(v.to_string()));
            }
            digits.parse().map_err(|_| MidenAmountParseError::Overflow)
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(MidenAmountParseError::InvalidFormat(v.to_string()));
        }
        let whole_val = parse_digits(whole)?;
        let frac_val = parse_digits(frac)?;

        let scale = 10u64
            .checked_pow(u32::from(self.decimals))
            .ok_or(MidenAmountParseError::Overflow)?;
        let frac_scale = 10u64
            .checked_pow(u32::from(self.decimals) - frac_len)
            .ok_or(MidenAmountParseError::Overflow)?;

        let total = whole_val
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_val.checked_mul(frac_scale)?))
            .ok_or(MidenAmountParseError::Overflow)?;

        Ok(self.amount(total))
    }
}

/// Error returned when parsing a token amount.
#[derive(Debug, thiserror::Error)]
pub enum MidenAmountParseError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),
    #[error("Too many decimal places: got {got}, max {max}")]
    TooManyDecimals { got: u32, max: u8 },
    #[error("Amount overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc_like(decimals: u8) -> MidenTokenDeployment {
        MidenTokenDeployment {
            chain_reference: MidenChainReference::testnet(),
            faucet_id: "0xaabbccddeeff00112233aabbccddee".parse().unwrap(),
            decimals,
        }
    }

    #[test]
    fn test_chain_reference_to_chain_id() {
        let chain_id: ChainId = MidenChainReference::testnet().into();
        assert_eq!(chain_id.namespace, "miden");
        assert_eq!(chain_id.reference, "testnet");
        assert_eq!(chain_id.to_string(), "miden:testnet");
    }

    #[test]
    fn test_chain_id_to_chain_reference() {
        let reference = MidenChainReference::try_from(ChainId::new("miden", "mainnet")).unwrap();
        assert_eq!(reference.inner(), "mainnet");
    }

    #[test]
    fn test_chain_id_rejects_foreign_namespace_and_unknown_reference() {
        assert!(MidenChainReference::try_from(ChainId::new("eip155", "8453")).is_err());
        assert!(MidenChainReference::try_from(ChainId::new("miden", "devnet")).is_err());
    }

    #[test]
    fn test_address_with_and_without_prefix() {
        let a: MidenAccountAddress = "0xabcdef1234567890abcdef12345678".parse().unwrap();
        let b: MidenAccountAddress = "abcdef1234567890abcdef12345678".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(b.to_string(), "0xabcdef1234567890abcdef12345678");
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("abcdef".parse::<MidenAccountAddress>().is_err());
        assert!(
            "abcdef1234567890abcdef1234567890"
                .parse::<MidenAccountAddress>()
                .is_err()
        );
        assert!(MidenAccountAddress::from_bytes(&[0u8; 14]).is_err());
    }

    #[test]
    fn test_address_serde_is_hex_string() {
        let addr = MidenAccountAddress::new([0x11; 15]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0x111111111111111111111111111111\"");
        let back: MidenAccountAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn test_parse_amounts() {
        let token = usdc_like(6);
        assert_eq!(token.parse("100").unwrap().amount, 100_000_000);
        assert_eq!(token.parse("1.50").unwrap().amount, 1_500_000);
        assert_eq!(token.parse("0.000001").unwrap().amount, 1);
        assert_eq!(token.parse(".5").unwrap().amount, 500_000);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let token = usdc_like(2);
        assert!(matches!(
            token.parse("1.234"),
            Err(MidenAmountParseError::TooManyDecimals { got: 3, max: 2 })
        ));
        assert!(token.parse("1.2.3").is_err());
        assert!(token.parse("-1").is_err());
        assert!(token.parse("").is_err());
        assert!(matches!(
            token.parse("184467440737095517"),
            Err(MidenAmountParseError::Overflow)
        ));
    }

    #[test]
    fn test_parse_with_oversized_decimals_overflows() {
        let token = usdc_like(20);
        assert!(matches!(token.parse("1"), Err(MidenAmountParseError::Overflow)));
        assert!(matches!(token.parse("0.5"), Err(MidenAmountParseError::Overflow)));
        assert_eq!(usdc_like(19).parse("1").unwrap().amount, 10u64.pow(19));
    }
}
