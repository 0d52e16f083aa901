//! Lifecycle of a single payment attempt.
//!
//! ```text
//! Received -> RequirementsChecked -> ProofVerified -> [NoteBound] -> Settled
//!     \______________\___________________\_______________\_________-> Rejected
//! ```
//!
//! `Settled` and `Rejected` are terminal and no state is revisited. Verify
//! stops at `ProofVerified` or `NoteBound`; settle walks the same path again
//! (possibly from cached verification) before reaching `Settled`.

use std::fmt;

use super::types::MidenExactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Received,
    RequirementsChecked,
    ProofVerified,
    NoteBound,
    Settled,
    Rejected,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentState::Settled | PaymentState::Rejected)
    }

    /// True if `next` is a legal successor of this state.
    pub fn can_advance_to(self, next: PaymentState) -> bool {
        use PaymentState::*;
        match (self, next) {
            (from, Rejected) => !from.is_terminal(),
            (Received, RequirementsChecked)
            | (RequirementsChecked, ProofVerified)
            | (ProofVerified, NoteBound)
            | (ProofVerified, Settled)
            | (NoteBound, Settled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Received => "received",
            PaymentState::RequirementsChecked => "requirements_checked",
            PaymentState::ProofVerified => "proof_verified",
            PaymentState::NoteBound => "note_bound",
            PaymentState::Settled => "settled",
            PaymentState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one verify or settle call through [`PaymentState`].
#[derive(Debug)]
pub struct PaymentAttempt {
    transaction_id: String,
    state: PaymentState,
}

impl PaymentAttempt {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            state: PaymentState::Received,
        }
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn advance(&mut self, next: PaymentState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            transaction_id = %self.transaction_id,
            from = %self.state,
            state = %next,
            "Payment state transition"
        );
        self.state = next;
    }

    /// Moves to `Rejected`, logging the internal cause, and hands the error back.
    pub fn reject(&mut self, error: MidenExactError) -> MidenExactError {
        tracing::warn!(
            transaction_id = %self.transaction_id,
            state = %self.state,
            reason = %error.reason(),
            error = %error,
            "Payment rejected"
        );
        self.advance(PaymentState::Rejected);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentState::*;

    #[test]
    fn test_happy_paths() {
        let public = [Received, RequirementsChecked, ProofVerified, Settled];
        let private = [Received, RequirementsChecked, ProofVerified, NoteBound, Settled];
        for path in [&public[..], &private[..]] {
            for pair in path.windows(2) {
                assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_no_skipping_or_revisiting() {
        assert!(!Received.can_advance_to(ProofVerified));
        assert!(!RequirementsChecked.can_advance_to(Settled));
        assert!(!ProofVerified.can_advance_to(RequirementsChecked));
        assert!(!NoteBound.can_advance_to(NoteBound));
    }

    #[test]
    fn test_terminal_states() {
        for state in [Received, RequirementsChecked, ProofVerified, NoteBound] {
            assert!(state.can_advance_to(Rejected));
        }
        for state in [Settled, Rejected] {
            assert!(state.is_terminal());
            assert!(!state.can_advance_to(Rejected));
            assert!(!state.can_advance_to(Received));
        }
    }

    #[test]
    fn test_reject_returns_error() {
        let mut attempt = PaymentAttempt::new("0x01");
        attempt.advance(RequirementsChecked);
        let err = attempt.reject(MidenExactError::PaymentNotFound);
        assert_eq!(err, MidenExactError::PaymentNotFound);
        assert_eq!(attempt.state(), Rejected);
    }
}
