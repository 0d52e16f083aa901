//! Requirement matching.
//!
//! Cheap structural checks that run before any proof work: the client's
//! `accepted` block must name the same scheme, network, asset and recipient
//! as the server's requirements, and an amount the overpayment policy
//! accepts. Once a note's content is trusted (public on-chain, or bound by
//! commitment) the same asset/amount/recipient checks run against it.

use crate::chain::{MidenAccountAddress, OverpaymentPolicy};
use crate::privacy::RevealedNote;

use super::types::{ExactScheme, PaymentRequirements};

/// Which field of a payment failed to match the requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MismatchKind {
    #[error("scheme mismatch")]
    SchemeMismatch,
    #[error("network mismatch")]
    NetworkMismatch,
    #[error("asset mismatch")]
    AssetMismatch,
    #[error("amount mismatch")]
    AmountMismatch,
    #[error("recipient mismatch")]
    RecipientMismatch,
}

impl MismatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchKind::SchemeMismatch => "scheme_mismatch",
            MismatchKind::NetworkMismatch => "network_mismatch",
            MismatchKind::AssetMismatch => "asset_mismatch",
            MismatchKind::AmountMismatch => "amount_mismatch",
            MismatchKind::RecipientMismatch => "recipient_mismatch",
        }
    }
}

/// Why server-issued requirements could not be turned into [`PaymentTerms`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementsError {
    #[error("amount {0:?} is not a decimal u64")]
    InvalidAmount(String),
}

/// The parsed asset, amount and recipient a payment must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTerms {
    pub asset: MidenAccountAddress,
    pub amount: u64,
    pub pay_to: MidenAccountAddress,
}

impl PaymentTerms {
    /// Extracts terms from server-issued requirements.
    ///
    /// # Errors
    ///
    /// Fails if `amount` is not a decimal `u64`.
    pub fn from_requirements(
        requirements: &PaymentRequirements,
    ) -> Result<Self, RequirementsError> {
        let amount = parse_amount(&requirements.amount)
            .ok_or_else(|| RequirementsError::InvalidAmount(requirements.amount.clone()))?;
        Ok(Self {
            asset: requirements.asset,
            amount,
            pay_to: requirements.pay_to,
        })
    }

    /// Checks a trusted note's recipient and assets against these terms.
    ///
    /// Recipient is checked first, then presence of the asset, then the
    /// summed amount of that asset under `policy`.
    pub fn match_note(
        &self,
        target: &MidenAccountAddress,
        note: &RevealedNote,
        policy: OverpaymentPolicy,
    ) -> Result<(), MismatchKind> {
        if target != &self.pay_to {
            return Err(MismatchKind::RecipientMismatch);
        }
        if !note.assets.iter().any(|asset| asset.faucet_id == self.asset) {
            return Err(MismatchKind::AssetMismatch);
        }
        if !policy.accepts(self.amount, note.amount_of(&self.asset)) {
            return Err(MismatchKind::AmountMismatch);
        }
        Ok(())
    }
}

fn parse_amount(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Matches what the client claims to have paid against what is required.
///
/// Fields are checked in a fixed order (scheme, network, asset, amount,
/// recipient) and the first mismatch is returned.
pub fn match_requirements(
    required: &PaymentRequirements,
    accepted: &PaymentRequirements,
    policy: OverpaymentPolicy,
) -> Result<(), MismatchKind> {
    let exact = ExactScheme.as_ref();
    if required.scheme != exact || accepted.scheme != exact {
        return Err(MismatchKind::SchemeMismatch);
    }
    if accepted.network != required.network {
        return Err(MismatchKind::NetworkMismatch);
    }
    if accepted.asset != required.asset {
        return Err(MismatchKind::AssetMismatch);
    }
    let required_amount = parse_amount(&required.amount).ok_or(MismatchKind::AmountMismatch)?;
    let paid = parse_amount(&accepted.amount).ok_or(MismatchKind::AmountMismatch)?;
    if !policy.accepts(required_amount, paid) {
        return Err(MismatchKind::AmountMismatch);
    }
    if accepted.pay_to != required.pay_to {
        return Err(MismatchKind::RecipientMismatch);
    }
    Ok(())
}
