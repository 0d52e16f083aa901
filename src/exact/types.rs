//! Wire types and outcomes for the Miden "exact" payment scheme.
//!
//! Requests follow the x402 v2 JSON shape. Outcomes serialize to the v2
//! response bodies, with a machine-readable reason tag on failure.

use serde::{Deserialize, Serialize};
use x402_types::chain::ChainId;

use crate::chain::MidenAccountAddress;
use crate::privacy::{BindError, PrivacyMode};
use crate::proof::ProofError;
use crate::settlement::SettleError;

use super::requirements::{MismatchKind, RequirementsError};

/// String literal for the "exact" scheme name.
#[derive(Debug, Clone, Copy)]
pub struct ExactScheme;

impl AsRef<str> for ExactScheme {
    fn as_ref(&self) -> &str {
        "exact"
    }
}

impl std::fmt::Display for ExactScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exact")
    }
}

fn default_max_timeout_seconds() -> u64 {
    300
}

/// What a resource server requires, or what a client claims to have paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Kept as a free string so a foreign scheme is reported as a mismatch
    /// rather than a parse failure.
    pub scheme: String,
    pub network: ChainId,
    /// Amount in the token's smallest unit, as a decimal string.
    pub amount: String,
    pub pay_to: MidenAccountAddress,
    /// Faucet account id of the fungible token.
    pub asset: MidenAccountAddress,
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The Miden-specific part of a payment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidenExactPayload {
    /// The paying account.
    pub from: MidenAccountAddress,
    /// Serialized proven transaction (hex).
    pub proven_transaction: String,
    pub transaction_id: String,
    /// Serialized transaction inputs (hex), forwarded to the node on settle.
    pub transaction_inputs: String,
    #[serde(default)]
    pub privacy_mode: PrivacyMode,
    /// Full content of a private output note (hex), disclosed to the facilitator only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_data: Option<String>,
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, MidenExactError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| MidenExactError::MalformedPayload(format!("{field}: {e}")))
}

impl MidenExactPayload {
    pub fn proven_transaction_bytes(&self) -> Result<Vec<u8>, MidenExactError> {
        decode_hex("provenTransaction", &self.proven_transaction)
    }

    pub fn transaction_inputs_bytes(&self) -> Result<Vec<u8>, MidenExactError> {
        decode_hex("transactionInputs", &self.transaction_inputs)
    }

    /// Disclosed note bytes. Undecodable hex is a malformed note, not a malformed payload.
    pub fn note_data_bytes(&self) -> Option<Result<Vec<u8>, BindError>> {
        self.note_data.as_deref().map(|note| {
            hex::decode(note.strip_prefix("0x").unwrap_or(note))
                .map_err(|e| BindError::MalformedNote(e.to_string()))
        })
    }
}

/// A client's payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    /// The requirements the client chose to satisfy.
    pub accepted: PaymentRequirements,
    pub payload: MidenExactPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: u8,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Settle requests carry the same data as verify requests.
pub type SettleRequest = VerifyRequest;

/// Machine-readable reason a payment was rejected or not settled.
///
/// Tags name the failed check only; they never carry hashes, ids or
/// backend error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    SchemeMismatch,
    NetworkMismatch,
    AssetMismatch,
    AmountMismatch,
    RecipientMismatch,
    MalformedPayload,
    MalformedRequirements,
    ProofDecodeError,
    ProofInvalid,
    TransactionIdMismatch,
    PayerMismatch,
    MissingNoteData,
    PaymentNotFound,
    MalformedNote,
    NoteNotFound,
    NoteNotPayToId,
    GenesisUnavailable,
    SubmissionFailed,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::SchemeMismatch => "scheme_mismatch",
            InvalidReason::NetworkMismatch => "network_mismatch",
            InvalidReason::AssetMismatch => "asset_mismatch",
            InvalidReason::AmountMismatch => "amount_mismatch",
            InvalidReason::RecipientMismatch => "recipient_mismatch",
            InvalidReason::MalformedPayload => "malformed_payload",
            InvalidReason::MalformedRequirements => "malformed_requirements",
            InvalidReason::ProofDecodeError => "proof_decode_error",
            InvalidReason::ProofInvalid => "proof_invalid",
            InvalidReason::TransactionIdMismatch => "transaction_id_mismatch",
            InvalidReason::PayerMismatch => "payer_mismatch",
            InvalidReason::MissingNoteData => "missing_note_data",
            InvalidReason::PaymentNotFound => "payment_not_found",
            InvalidReason::MalformedNote => "malformed_note",
            InvalidReason::NoteNotFound => "note_not_found",
            InvalidReason::NoteNotPayToId => "note_not_pay_to_id",
            InvalidReason::GenesisUnavailable => "genesis_unavailable",
            InvalidReason::SubmissionFailed => "submission_failed",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<MismatchKind> for InvalidReason {
    fn from(kind: MismatchKind) -> Self {
        match kind {
            MismatchKind::SchemeMismatch => InvalidReason::SchemeMismatch,
            MismatchKind::NetworkMismatch => InvalidReason::NetworkMismatch,
            MismatchKind::AssetMismatch => InvalidReason::AssetMismatch,
            MismatchKind::AmountMismatch => InvalidReason::AmountMismatch,
            MismatchKind::RecipientMismatch => InvalidReason::RecipientMismatch,
        }
    }
}

/// Errors of the Miden exact scheme, by layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MidenExactError {
    #[error("Requirements mismatch: {0}")]
    Mismatch(#[from] MismatchKind),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Malformed requirements: {0}")]
    MalformedRequirements(#[from] RequirementsError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error("Transaction id does not match the proven transaction")]
    TransactionIdMismatch,

    #[error("Payer does not match the account that executed the transaction")]
    PayerMismatch,

    #[error("Trusted-facilitator payment without note data")]
    MissingNoteData,

    #[error("No public pay-to-id output note satisfies the requirements")]
    PaymentNotFound,

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Settle(#[from] SettleError),
}

impl MidenExactError {
    /// The reason tag reported to the caller.
    pub fn reason(&self) -> InvalidReason {
        match self {
            MidenExactError::Mismatch(kind) => (*kind).into(),
            MidenExactError::MalformedPayload(_) => InvalidReason::MalformedPayload,
            MidenExactError::MalformedRequirements(_) => InvalidReason::MalformedRequirements,
            MidenExactError::Proof(ProofError::Decode(_)) => InvalidReason::ProofDecodeError,
            MidenExactError::Proof(ProofError::Invalid(_)) => InvalidReason::ProofInvalid,
            MidenExactError::TransactionIdMismatch => InvalidReason::TransactionIdMismatch,
            MidenExactError::PayerMismatch => InvalidReason::PayerMismatch,
            MidenExactError::MissingNoteData => InvalidReason::MissingNoteData,
            MidenExactError::PaymentNotFound => InvalidReason::PaymentNotFound,
            MidenExactError::Bind(BindError::MalformedNote(_)) => InvalidReason::MalformedNote,
            MidenExactError::Bind(BindError::NoteNotFound) => InvalidReason::NoteNotFound,
            MidenExactError::Bind(BindError::NotPayToId) => InvalidReason::NoteNotPayToId,
            MidenExactError::Bind(BindError::Mismatch(kind)) => (*kind).into(),
            MidenExactError::Settle(SettleError::Genesis(_)) => InvalidReason::GenesisUnavailable,
            MidenExactError::Settle(SettleError::SubmissionFailed { .. }) => {
                InvalidReason::SubmissionFailed
            }
        }
    }
}

/// Outcome of a verify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    Valid { payer: MidenAccountAddress },
    Invalid { reason: InvalidReason },
}

impl VerifyResponse {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<MidenAccountAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<InvalidReason>,
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(*payer),
                invalid_reason: None,
            },
            VerifyResponse::Invalid { reason } => VerifyResponseWire {
                is_valid: false,
                payer: None,
                invalid_reason: Some(*reason),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        match (wire.is_valid, wire.payer, wire.invalid_reason) {
            (true, Some(payer), _) => Ok(VerifyResponse::Valid { payer }),
            (false, _, Some(reason)) => Ok(VerifyResponse::Invalid { reason }),
            (true, None, _) => Err(serde::de::Error::missing_field("payer")),
            (false, _, None) => Err(serde::de::Error::missing_field("invalidReason")),
        }
    }
}

/// Outcome of a settle call.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleResponse {
    Success {
        payer: MidenAccountAddress,
        /// Ledger reference of the submitted transaction.
        transaction: String,
        network: ChainId,
    },
    Failure {
        reason: InvalidReason,
    },
}

impl SettleResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, SettleResponse::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<MidenAccountAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<ChainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<InvalidReason>,
}

impl Serialize for SettleResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire = match self {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                payer: Some(*payer),
                transaction: Some(transaction.clone()),
                network: Some(network.clone()),
                error_reason: None,
            },
            SettleResponse::Failure { reason } => SettleResponseWire {
                success: false,
                payer: None,
                transaction: None,
                network: None,
                error_reason: Some(*reason),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            match (wire.payer, wire.transaction, wire.network) {
                (Some(payer), Some(transaction), Some(network)) => Ok(SettleResponse::Success {
                    payer,
                    transaction,
                    network,
                }),
                _ => Err(serde::de::Error::custom(
                    "successful settle response requires payer, transaction and network",
                )),
            }
        } else {
            wire.error_reason
                .map(|reason| SettleResponse::Failure { reason })
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_defaults_for_older_clients() {
        let payload: MidenExactPayload = serde_json::from_value(json!({
            "from": "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a",
            "provenTransaction": "deadbeef",
            "transactionId": "0x01",
            "transactionInputs": "00"
        }))
        .unwrap();
        assert_eq!(payload.privacy_mode, PrivacyMode::Public);
        assert!(payload.note_data.is_none());
        assert_eq!(payload.proven_transaction_bytes().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_bad_hex_is_malformed_payload() {
        let payload = MidenExactPayload {
            from: MidenAccountAddress::new([1; 15]),
            proven_transaction: "zz".to_string(),
            transaction_id: "0x01".to_string(),
            transaction_inputs: "0x00".to_string(),
            privacy_mode: PrivacyMode::TrustedFacilitator,
            note_data: Some("xyz".to_string()),
        };
        assert_eq!(
            payload.proven_transaction_bytes().unwrap_err().reason(),
            InvalidReason::MalformedPayload
        );
        assert!(payload.transaction_inputs_bytes().is_ok());
        assert!(matches!(
            payload.note_data_bytes(),
            Some(Err(BindError::MalformedNote(_)))
        ));
    }

    #[test]
    fn test_requirements_wire_shape() {
        let requirements: PaymentRequirements = serde_json::from_value(json!({
            "scheme": "exact",
            "network": "miden:testnet",
            "amount": "1000000",
            "payTo": "0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b",
            "asset": "0x0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c"
        }))
        .unwrap();
        assert_eq!(requirements.max_timeout_seconds, 300);
        assert_eq!(requirements.network.to_string(), "miden:testnet");
        let back = serde_json::to_value(&requirements).unwrap();
        assert_eq!(back["payTo"], "0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        assert!(back.get("extra").is_none());
    }

    #[test]
    fn test_verify_response_json() {
        let valid = VerifyResponse::Valid {
            payer: MidenAccountAddress::new([0x0a; 15]),
        };
        assert_eq!(
            serde_json::to_value(&valid).unwrap(),
            json!({"isValid": true, "payer": "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"})
        );

        let invalid = VerifyResponse::Invalid {
            reason: InvalidReason::NoteNotFound,
        };
        let value = serde_json::to_value(&invalid).unwrap();
        assert_eq!(value, json!({"isValid": false, "invalidReason": "note_not_found"}));
        assert_eq!(serde_json::from_value::<VerifyResponse>(value).unwrap(), invalid);
    }

    #[test]
    fn test_settle_response_json() {
        let failure = SettleResponse::Failure {
            reason: InvalidReason::GenesisUnavailable,
        };
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"success": false, "errorReason": "genesis_unavailable"})
        );
        assert!(serde_json::from_value::<SettleResponse>(json!({"success": true})).is_err());
    }

    #[test]
    fn test_reason_tags_match_serde() {
        for reason in [
            InvalidReason::ProofInvalid,
            InvalidReason::NoteNotPayToId,
            InvalidReason::TransactionIdMismatch,
        ] {
            assert_eq!(
                serde_json::to_value(reason).unwrap(),
                serde_json::Value::String(reason.as_str().to_string())
            );
        }
    }

    #[test]
    fn test_bind_mismatch_reports_field_not_binding() {
        let err = MidenExactError::from(BindError::Mismatch(MismatchKind::RecipientMismatch));
        assert_eq!(err.reason(), InvalidReason::RecipientMismatch);
        let err = MidenExactError::from(SettleError::SubmissionFailed {
            cause: "node at 10.0.0.1 refused".to_string(),
        });
        assert_eq!(err.reason().as_str(), "submission_failed");
    }
}
