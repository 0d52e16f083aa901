//! STARK proof verification with the Miden protocol libraries.

use miden_protocol::note::Note;
use miden_protocol::transaction::{OutputNote, ProvenTransaction};
use miden_protocol::utils::serde::Deserializable;
use miden_standards::note::{P2idNote, P2idNoteStorage};
use miden_tx::TransactionVerifier;

use super::{DecodedTransaction, OutputNoteView, ProofError, ProofVerifier};
use crate::chain::MidenAccountAddress;
use crate::privacy::{BindError, FungibleAssetData, NoteId, RevealedNote};

/// Verifies `ProvenTransaction`s and decodes `Note`s.
#[derive(Debug, Clone)]
pub struct NativeVerifier {
    security_level: u32,
}

impl NativeVerifier {
    /// `security_level` is the minimum proof security in bits (96 is standard).
    pub fn new(security_level: u32) -> Self {
        Self { security_level }
    }
}

impl Default for NativeVerifier {
    fn default() -> Self {
        Self::new(96)
    }
}

fn reveal(note: &Note) -> RevealedNote {
    let recipient = note.recipient();
    let target = if recipient.script().root() == P2idNote::script_root() {
        P2idNoteStorage::try_from(recipient.storage().items())
            .ok()
            .map(|storage| MidenAccountAddress::from_account_id(storage.target()))
    } else {
        None
    };

    let assets = note
        .assets()
        .iter_fungible()
        .map(|fungible| FungibleAssetData {
            faucet_id: MidenAccountAddress::from_account_id(fungible.faucet_id()),
            amount: fungible.amount(),
        })
        .collect();

    RevealedNote {
        id: NoteId::new(format!("{}", note.id())),
        target,
        assets,
    }
}

impl ProofVerifier for NativeVerifier {
    fn verify_proof(&self, proven_tx: &[u8]) -> Result<DecodedTransaction, ProofError> {
        let tx = ProvenTransaction::read_from_bytes(proven_tx)
            .map_err(|e| ProofError::Decode(e.to_string()))?;

        TransactionVerifier::new(self.security_level)
            .verify(&tx)
            .map_err(|e| ProofError::Invalid(e.to_string()))?;

        let outputs = tx
            .output_notes()
            .iter()
            .map(|output| OutputNoteView {
                id: NoteId::new(format!("{}", output.id())),
                public: match output {
                    OutputNote::Full(note) => Some(reveal(note)),
                    _ => None,
                },
            })
            .collect();

        Ok(DecodedTransaction::new(
            format!("{}", tx.id()),
            MidenAccountAddress::from_account_id(tx.account_id()),
            outputs,
            proven_tx.to_vec(),
        ))
    }

    fn reveal_note(&self, note_bytes: &[u8]) -> Result<RevealedNote, BindError> {
        Note::read_from_bytes(note_bytes)
            .map(|note| reveal(&note))
            .map_err(|e| BindError::MalformedNote(e.to_string()))
    }
}
