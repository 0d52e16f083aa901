//! Stub proof backend and its transaction encoding.
//!
//! A [`StubTransaction`] is JSON: the executing account, its output notes
//! (public ones in full, private ones by id only) and a "proof" that is a
//! BLAKE3 hash over the body. The transaction id is another hash over the
//! same body. This keeps the whole verify/bind/settle pipeline testable
//! without a STARK prover, and it is never a substitute for one in
//! production.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::{DecodedTransaction, OutputNoteView, ProofError, ProofVerifier};
use crate::chain::MidenAccountAddress;
use crate::privacy::{BindError, Digest, NoteId, PortableNote, RevealedNote};

const PROOF_DOMAIN: &[u8] = b"x402-miden:stub-proof:v1";
const TX_ID_DOMAIN: &[u8] = b"x402-miden:stub-tx-id:v1";

/// An output note in the stub encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StubOutputNote {
    Public { note: PortableNote },
    Private { id: NoteId },
}

/// A transaction in the stub encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubTransaction {
    pub account_id: MidenAccountAddress,
    pub output_notes: Vec<StubOutputNote>,
    pub proof: Digest,
}

impl StubTransaction {
    pub fn builder(account_id: MidenAccountAddress) -> StubTransactionBuilder {
        StubTransactionBuilder {
            account_id,
            output_notes: Vec::new(),
        }
    }

    fn body_bytes(account_id: &MidenAccountAddress, output_notes: &[StubOutputNote]) -> Vec<u8> {
        serde_json::to_vec(&(account_id, output_notes)).unwrap_or_default()
    }

    fn hash_with(domain: &[u8], body: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(body);
        Digest::new(*hasher.finalize().as_bytes())
    }

    /// The proof a correctly "proven" transaction with this body carries.
    pub fn expected_proof(&self) -> Digest {
        Self::hash_with(
            PROOF_DOMAIN,
            &Self::body_bytes(&self.account_id, &self.output_notes),
        )
    }

    pub fn id(&self) -> String {
        Self::hash_with(
            TX_ID_DOMAIN,
            &Self::body_bytes(&self.account_id, &self.output_notes),
        )
        .to_hex()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decodes without checking the proof.
    pub fn decode(&self) -> DecodedTransaction {
        let outputs = self
            .output_notes
            .iter()
            .map(|output| match output {
                StubOutputNote::Public { note } => {
                    let revealed = note.reveal();
                    OutputNoteView {
                        id: revealed.id.clone(),
                        public: Some(revealed),
                    }
                }
                StubOutputNote::Private { id } => OutputNoteView {
                    id: id.clone(),
                    public: None,
                },
            })
            .collect();
        DecodedTransaction::new(self.id(), self.account_id, outputs, self.to_bytes())
    }
}

/// Builds a [`StubTransaction`] with a valid proof.
#[derive(Debug, Clone)]
pub struct StubTransactionBuilder {
    account_id: MidenAccountAddress,
    output_notes: Vec<StubOutputNote>,
}

impl StubTransactionBuilder {
    /// Adds a note whose full content is on-chain.
    pub fn public_note(mut self, note: &PortableNote) -> Self {
        self.output_notes.push(StubOutputNote::Public { note: note.clone() });
        self
    }

    /// Adds a note of which only the id is on-chain.
    pub fn private_note(mut self, note: &PortableNote) -> Self {
        self.output_notes
            .push(StubOutputNote::Private { id: note.id() });
        self
    }

    pub fn build(self) -> StubTransaction {
        let mut tx = StubTransaction {
            account_id: self.account_id,
            output_notes: self.output_notes,
            proof: Digest::EMPTY,
        };
        tx.proof = tx.expected_proof();
        tx
    }
}

/// Verifier for [`StubTransaction`] bytes and [`PortableNote`] bytes.
#[derive(Debug, Default)]
pub struct StubVerifier {
    verifications: AtomicUsize,
}

impl StubVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of proof checks performed so far, successful or not.
    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

impl ProofVerifier for StubVerifier {
    fn verify_proof(&self, proven_tx: &[u8]) -> Result<DecodedTransaction, ProofError> {
        let tx: StubTransaction =
            serde_json::from_slice(proven_tx).map_err(|e| ProofError::Decode(e.to_string()))?;
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if tx.proof != tx.expected_proof() {
            return Err(ProofError::Invalid("stub proof does not match body".to_string()));
        }
        let decoded = tx.decode();
        // Verify over the bytes as received, not a re-encoding.
        Ok(DecodedTransaction::new(
            decoded.id(),
            *decoded.account(),
            decoded.outputs().to_vec(),
            proven_tx.to_vec(),
        ))
    }

    fn reveal_note(&self, note_bytes: &[u8]) -> Result<RevealedNote, BindError> {
        PortableNote::from_bytes(note_bytes)
            .map(|note| note.reveal())
            .map_err(|e| BindError::MalformedNote(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privacy::FungibleAssetData;

    fn note() -> PortableNote {
        PortableNote::p2id(
            MidenAccountAddress::new([2; 15]),
            vec![FungibleAssetData {
                faucet_id: MidenAccountAddress::new([3; 15]),
                amount: 10,
            }],
            Digest::new([4; 32]),
        )
    }

    #[test]
    fn test_valid_transaction_verifies() {
        let tx = StubTransaction::builder(MidenAccountAddress::new([1; 15]))
            .public_note(&note())
            .build();
        let verifier = StubVerifier::new();
        let decoded = verifier.verify_proof(&tx.to_bytes()).unwrap();
        assert_eq!(decoded.id(), tx.id());
        assert_eq!(decoded.account(), &MidenAccountAddress::new([1; 15]));
        assert_eq!(decoded.bytes(), tx.to_bytes().as_slice());
        assert!(decoded.has_output(&note().id()));
        assert_eq!(verifier.verifications(), 1);
    }

    #[test]
    fn test_tampered_body_fails_proof() {
        let mut tx = StubTransaction::builder(MidenAccountAddress::new([1; 15]))
            .private_note(&note())
            .build();
        tx.account_id = MidenAccountAddress::new([9; 15]);
        assert!(matches!(
            StubVerifier::new().verify_proof(&tx.to_bytes()),
            Err(ProofError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_fails_decode() {
        assert!(matches!(
            StubVerifier::new().verify_proof(b"\x00\x01not json"),
            Err(ProofError::Decode(_))
        ));
    }

    #[test]
    fn test_private_output_hides_content() {
        let tx = StubTransaction::builder(MidenAccountAddress::new([1; 15]))
            .private_note(&note())
            .build();
        let decoded = tx.decode();
        assert!(decoded.has_output(&note().id()));
        assert_eq!(decoded.public_notes().count(), 0);
    }

    #[test]
    fn test_reveal_note_rejects_garbage() {
        assert!(matches!(
            StubVerifier::new().reveal_note(b"nope"),
            Err(BindError::MalformedNote(_))
        ));
    }
}
