//! Tests that require the `miden-native` feature flag.
//!
//! These exercise `NativeVerifier` and the account id conversions against
//! the real miden-protocol types.

#![cfg(feature = "miden-native")]

use miden_protocol::Word;
use miden_protocol::account::{AccountId, AccountIdVersion, AccountStorageMode, AccountType};
use miden_protocol::asset::FungibleAsset;
use miden_protocol::block::BlockNumber;
use miden_protocol::transaction::ProvenTransaction;
use miden_protocol::utils::serde::Serializable;
use miden_protocol::vm::ExecutionProof;

use x402_miden_engine::chain::MidenAccountAddress;
use x402_miden_engine::proof::{NativeVerifier, ProofError, ProofVerifier};
use x402_miden_engine::privacy::BindError;

fn dummy_account(seed: u8, account_type: AccountType, storage: AccountStorageMode) -> AccountId {
    AccountId::dummy([seed; 15], AccountIdVersion::Version0, account_type, storage)
}

fn dummy_proven_transaction() -> ProvenTransaction {
    let account_id = dummy_account(
        7,
        AccountType::RegularAccountUpdatableCode,
        AccountStorageMode::Private,
    );
    let faucet_id = dummy_account(8, AccountType::FungibleFaucet, AccountStorageMode::Public);

    miden_protocol::transaction::ProvenTransactionBuilder::new(
        account_id,
        [5u8; 32].try_into().unwrap(),
        [6u8; 32].try_into().unwrap(),
        [7u8; 32].try_into().unwrap(),
        BlockNumber::from(10),
        Word::default(),
        FungibleAsset::new(faucet_id, 100).expect("valid asset"),
        BlockNumber::from(200),
        ExecutionProof::new_dummy(),
    )
    .build()
    .expect("should build")
}

// ============================================================================
// AccountId Conversion Tests
// ============================================================================

#[test]
fn test_account_id_roundtrip() {
    let original = dummy_account(
        42,
        AccountType::RegularAccountUpdatableCode,
        AccountStorageMode::Public,
    );

    let addr = MidenAccountAddress::from_account_id(original);
    let recovered = addr.to_account_id().expect("should parse back to AccountId");

    assert_eq!(original, recovered);
}

#[test]
fn test_from_account_id_hex_format() {
    let id = dummy_account(1, AccountType::FungibleFaucet, AccountStorageMode::Private);
    let hex = MidenAccountAddress::from_account_id(id).to_hex();

    assert!(hex.starts_with("0x"), "Expected 0x prefix, got: {hex}");
    assert_eq!(hex.len(), 2 + 30);
}

// ============================================================================
// NativeVerifier Tests
// ============================================================================

#[test]
fn test_native_verifier_rejects_garbage() {
    let verifier = NativeVerifier::default();
    assert!(matches!(
        verifier.verify_proof(&[0xde, 0xad, 0xbe, 0xef]),
        Err(ProofError::Decode(_))
    ));
}

#[test]
fn test_native_verifier_rejects_dummy_proof() {
    let tx = dummy_proven_transaction();
    let verifier = NativeVerifier::new(96);
    assert!(matches!(
        verifier.verify_proof(&tx.to_bytes()),
        Err(ProofError::Invalid(_))
    ));
}

#[test]
fn test_native_verifier_rejects_truncated_transaction() {
    let bytes = dummy_proven_transaction().to_bytes();
    let verifier = NativeVerifier::default();
    assert!(matches!(
        verifier.verify_proof(&bytes[..bytes.len() / 2]),
        Err(ProofError::Decode(_))
    ));
}

#[test]
fn test_native_reveal_note_rejects_garbage() {
    assert!(matches!(
        NativeVerifier::default().reveal_note(b"not a note"),
        Err(BindError::MalformedNote(_))
    ));
}

#[test]
fn test_p2id_script_root_consistency() {
    use miden_standards::note::P2idNote;

    assert_eq!(P2idNote::script_root(), P2idNote::script_root());
}
