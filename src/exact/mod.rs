//! The Miden "exact" payment scheme.
//!
//! A client pays by creating a pay-to-id (P2ID) note for the recipient,
//! executing and proving the transaction locally, and sending the serialized
//! `ProvenTransaction` as the payment payload. The facilitator never signs
//! anything: it checks the requirements, verifies the proof, finds or binds
//! the payment note, and relays the transaction to the node.
//!
//! With [`PrivacyMode::TrustedFacilitator`](crate::privacy::PrivacyMode) the
//! payment note is private on-chain and its content is disclosed only to the
//! facilitator, which binds it to the transaction through the note id.

pub mod facilitator;
pub use facilitator::*;

pub mod requirements;
pub use requirements::{MismatchKind, PaymentTerms, RequirementsError, match_requirements};

pub mod state;
pub use state::{PaymentAttempt, PaymentState};

#[cfg(feature = "server")]
pub mod server;

pub mod types;
pub use types::*;

use x402_types::scheme::X402SchemeId;

/// Scheme identifier for Miden exact payments.
pub struct V2MidenExact;

impl X402SchemeId for V2MidenExact {
    fn namespace(&self) -> &str {
        "miden"
    }

    fn scheme(&self) -> &str {
        ExactScheme.as_ref()
    }
}
