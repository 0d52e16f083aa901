//! Proof verification backends.
//!
//! A [`ProofVerifier`] turns the opaque `provenTransaction` bytes of a payload
//! into a [`DecodedTransaction`], checking the validity proof on the way.
//! The backend is chosen when the facilitator is constructed:
//!
//! - [`NativeVerifier`] (feature `miden-native`) deserializes a
//!   `ProvenTransaction` and checks its STARK proof with `miden-tx`.
//! - [`StubVerifier`] accepts the self-describing test encoding from
//!   [`stub`], whose "proof" is a hash over the transaction body.

use crate::chain::MidenAccountAddress;
use crate::privacy::{BindError, NoteId, RevealedNote};

pub mod stub;
pub use stub::StubVerifier;

#[cfg(feature = "miden-native")]
pub mod native;
#[cfg(feature = "miden-native")]
pub use native::NativeVerifier;

/// Decodes and verifies proven transactions, and decodes disclosed notes.
///
/// Both operations are pure and CPU-bound; implementations hold no
/// per-request state.
pub trait ProofVerifier: Send + Sync {
    /// Decodes `proven_tx` and verifies its validity proof.
    fn verify_proof(&self, proven_tx: &[u8]) -> Result<DecodedTransaction, ProofError>;

    /// Decodes a disclosed note and computes its id with the ledger's
    /// commitment scheme. The result is not yet bound to any transaction.
    fn reveal_note(&self, note_bytes: &[u8]) -> Result<RevealedNote, BindError>;
}

/// Why a proven transaction was rejected. Both variants are terminal for the bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("Failed to decode proven transaction: {0}")]
    Decode(String),
    #[error("Validity proof rejected: {0}")]
    Invalid(String),
}

/// An output note of a decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNoteView {
    pub id: NoteId,
    /// Full note content when the note is public on-chain.
    pub public: Option<RevealedNote>,
}

/// A proven transaction whose proof has been verified.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    id: String,
    account: MidenAccountAddress,
    outputs: Vec<OutputNoteView>,
    bytes: Vec<u8>,
}

impl DecodedTransaction {
    /// Assembles a decoded transaction. Only verifiers should call this.
    pub fn new(
        id: impl Into<String>,
        account: MidenAccountAddress,
        outputs: Vec<OutputNoteView>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            account,
            outputs,
            bytes,
        }
    }

    /// Transaction id as rendered by the backend.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The account that executed the transaction, i.e. the payer.
    pub fn account(&self) -> &MidenAccountAddress {
        &self.account
    }

    pub fn outputs(&self) -> &[OutputNoteView] {
        &self.outputs
    }

    /// The exact bytes the proof was verified over.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True if one of the declared output notes has exactly this id.
    pub fn has_output(&self, id: &NoteId) -> bool {
        self.outputs.iter().any(|output| &output.id == id)
    }

    /// Output notes whose content is visible on-chain.
    pub fn public_notes(&self) -> impl Iterator<Item = &RevealedNote> {
        self.outputs.iter().filter_map(|output| output.public.as_ref())
    }

    /// Compares a client-supplied transaction id with the decoded one,
    /// ignoring a `0x` prefix and hex case.
    pub fn matches_id(&self, claimed: &str) -> bool {
        fn normalize(s: &str) -> String {
            s.trim_start_matches("0x").to_ascii_lowercase()
        }
        !claimed.is_empty() && normalize(claimed) == normalize(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded() -> DecodedTransaction {
        DecodedTransaction::new(
            "0xABcd01",
            MidenAccountAddress::new([1; 15]),
            vec![
                OutputNoteView {
                    id: NoteId::new("0x11"),
                    public: None,
                },
                OutputNoteView {
                    id: NoteId::new("0x22"),
                    public: Some(RevealedNote {
                        id: NoteId::new("0x22"),
                        target: None,
                        assets: vec![],
                    }),
                },
            ],
            vec![9, 9, 9],
        )
    }

    #[test]
    fn test_matches_id_normalizes_prefix_and_case() {
        let tx = decoded();
        assert!(tx.matches_id("0xabcd01"));
        assert!(tx.matches_id("ABCD01"));
        assert!(!tx.matches_id("0xabcd02"));
        assert!(!tx.matches_id(""));
    }

    #[test]
    fn test_output_lookup_is_exact() {
        let tx = decoded();
        assert!(tx.has_output(&NoteId::new("0x11")));
        assert!(!tx.has_output(&NoteId::new("0x1")));
        assert_eq!(tx.public_notes().count(), 1);
    }
}
