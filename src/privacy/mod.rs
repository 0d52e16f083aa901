//! Privacy modes and the note commitment binder.
//!
//! - **Public**: the payment note is fully visible on-chain and is read
//!   straight out of the proven transaction's outputs.
//! - **TrustedFacilitator**: only the note's commitment is on-chain. The
//!   client discloses the full note to the facilitator in `noteData`, and
//!   [`bind`] checks that it hashes to one of the transaction's declared
//!   output ids before any of its content is trusted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chain::{MidenAccountAddress, OverpaymentPolicy};
use crate::exact::requirements::{MismatchKind, PaymentTerms};
use crate::proof::DecodedTransaction;

pub mod commitment;
pub use commitment::{Digest, PortableNote};

/// Privacy mode declared by a payment payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivacyMode {
    /// Notes fully visible on-chain (default).
    #[default]
    Public,
    /// Notes private on-chain, disclosed off-chain to the facilitator.
    TrustedFacilitator,
}

impl fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivacyMode::Public => write!(f, "public"),
            PrivacyMode::TrustedFacilitator => write!(f, "trusted_facilitator"),
        }
    }
}

impl FromStr for PrivacyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(PrivacyMode::Public),
            "trusted_facilitator" => Ok(PrivacyMode::TrustedFacilitator),
            other => Err(format!("unknown privacy mode: '{other}'")),
        }
    }
}

impl Serialize for PrivacyMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PrivacyMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PrivacyMode::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of an output note as committed on the ledger.
///
/// Compared as an exact string; backends must render ids canonically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fungible asset carried by a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FungibleAssetData {
    pub faucet_id: MidenAccountAddress,
    pub amount: u64,
}

/// The content of a note whose id has been computed from that content.
///
/// Produced by a [`ProofVerifier`](crate::proof::ProofVerifier) either from
/// a public output note of a verified transaction, or from disclosed
/// `noteData` bytes. In the latter case it must go through [`bind`] before
/// its fields mean anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedNote {
    pub id: NoteId,
    /// Target account when the note is a pay-to-id note, `None` for any other script.
    pub target: Option<MidenAccountAddress>,
    pub assets: Vec<FungibleAssetData>,
}

impl RevealedNote {
    /// Total amount of `faucet` carried by this note.
    pub fn amount_of(&self, faucet: &MidenAccountAddress) -> u64 {
        self.assets
            .iter()
            .filter(|asset| &asset.faucet_id == faucet)
            .fold(0u64, |acc, asset| acc.saturating_add(asset.amount))
    }
}

/// Why a disclosed note could not be bound to the transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// `noteData` is not valid hex or does not decode as a note.
    #[error("Malformed note data: {0}")]
    MalformedNote(String),
    /// The note's computed id is not among the transaction's output ids.
    #[error("Note not found among transaction outputs")]
    NoteNotFound,
    /// The note is bound but is not a pay-to-id note.
    #[error("Note is not a pay-to-id note")]
    NotPayToId,
    /// The note is bound but does not satisfy the payment requirements.
    #[error("Bound note does not match requirements: {0}")]
    Mismatch(MismatchKind),
}

/// Binds a disclosed note to a verified transaction and checks its payment.
///
/// The note's id must exactly equal one of the transaction's declared output
/// ids. Only then are its recipient and assets compared against `terms`.
pub fn bind(
    decoded: &DecodedTransaction,
    note: RevealedNote,
    terms: &PaymentTerms,
    policy: OverpaymentPolicy,
) -> Result<RevealedNote, BindError> {
    if !decoded.has_output(&note.id) {
        return Err(BindError::NoteNotFound);
    }
    let target = note.target.ok_or(BindError::NotPayToId)?;
    terms
        .match_note(&target, &note, policy)
        .map_err(BindError::Mismatch)?;
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::stub::StubTransaction;

    const PAYER: MidenAccountAddress = MidenAccountAddress::new([0x0a; 15]);
    const RECIPIENT: MidenAccountAddress = MidenAccountAddress::new([0x0b; 15]);
    const FAUCET: MidenAccountAddress = MidenAccountAddress::new([0x0c; 15]);

    fn terms() -> PaymentTerms {
        PaymentTerms {
            asset: FAUCET,
            amount: 1_000_000,
            pay_to: RECIPIENT,
        }
    }

    fn private_payment(amount: u64) -> (PortableNote, DecodedTransaction) {
        let note = PortableNote::p2id(
            RECIPIENT,
            vec![FungibleAssetData {
                faucet_id: FAUCET,
                amount,
            }],
            Digest::new([7; 32]),
        );
        let tx = StubTransaction::builder(PAYER).private_note(&note).build();
        (note, tx.decode())
    }

    #[test]
    fn test_privacy_mode_serde_values() {
        assert_eq!(serde_json::to_string(&PrivacyMode::Public).unwrap(), "\"public\"");
        assert_eq!(
            serde_json::to_string(&PrivacyMode::TrustedFacilitator).unwrap(),
            "\"trusted_facilitator\""
        );
        assert!(serde_json::from_str::<PrivacyMode>("\"shielded\"").is_err());
        assert_eq!(PrivacyMode::default(), PrivacyMode::Public);
    }

    #[test]
    fn test_bind_accepts_matching_note() {
        let (note, decoded) = private_payment(1_000_000);
        let bound = bind(&decoded, note.reveal(), &terms(), OverpaymentPolicy::default()).unwrap();
        assert_eq!(bound.target, Some(RECIPIENT));
        assert_eq!(bound.amount_of(&FAUCET), 1_000_000);
    }

    #[test]
    fn test_bind_rejects_note_absent_from_outputs() {
        let (mut note, decoded) = private_payment(1_000_000);
        note.assets[0].amount = 999_999;
        assert_eq!(
            bind(&decoded, note.reveal(), &terms(), OverpaymentPolicy::default()),
            Err(BindError::NoteNotFound)
        );
    }

    #[test]
    fn test_bind_checks_terms_after_binding() {
        let (note, decoded) = private_payment(500);
        assert_eq!(
            bind(&decoded, note.reveal(), &terms(), OverpaymentPolicy::default()),
            Err(BindError::Mismatch(MismatchKind::AmountMismatch))
        );
    }

    #[test]
    fn test_bind_rejects_non_p2id_script() {
        let mut note = PortableNote::p2id(
            RECIPIENT,
            vec![FungibleAssetData {
                faucet_id: FAUCET,
                amount: 1_000_000,
            }],
            Digest::new([1; 32]),
        );
        note.script_root = Digest::new([0xee; 32]);
        let decoded = StubTransaction::builder(PAYER).private_note(&note).build().decode();
        assert_eq!(
            bind(&decoded, note.reveal(), &terms(), OverpaymentPolicy::default()),
            Err(BindError::NotPayToId)
        );
    }

    #[test]
    fn test_amount_of_sums_same_faucet() {
        let note = RevealedNote {
            id: NoteId::new("0x01"),
            target: Some(RECIPIENT),
            assets: vec![
                FungibleAssetData { faucet_id: FAUCET, amount: 400 },
                FungibleAssetData { faucet_id: PAYER, amount: 9_999 },
                FungibleAssetData { faucet_id: FAUCET, amount: 600 },
            ],
        };
        assert_eq!(note.amount_of(&FAUCET), 1_000);
    }
}
