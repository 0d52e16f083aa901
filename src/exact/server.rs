//! Price tags for 402 responses.
//!
//! ```ignore
//! use x402_miden_engine::V2MidenExact;
//! use x402_miden_engine::chain::MidenTokenDeployment;
//!
//! let usdc = MidenTokenDeployment::testnet_usdc();
//! let requirements = V2MidenExact::price_tag(recipient, usdc.amount(1_000_000));
//! ```

use crate::chain::{MidenAccountAddress, MidenDeployedTokenAmount};
use crate::exact::V2MidenExact;
use crate::exact::types::{ExactScheme, PaymentRequirements};

/// Seconds a client has to complete payment after receiving the price tag.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

impl V2MidenExact {
    /// Builds the requirements a resource server advertises for a Miden payment.
    pub fn price_tag(
        pay_to: MidenAccountAddress,
        asset: MidenDeployedTokenAmount,
    ) -> PaymentRequirements {
        PaymentRequirements {
            scheme: ExactScheme.to_string(),
            network: asset.token.chain_reference.as_chain_id(),
            amount: asset.amount.to_string(),
            pay_to,
            asset: asset.token.faucet_id,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            extra: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MidenChainReference, MidenTokenDeployment};

    #[test]
    fn test_price_tag_fields() {
        let token = MidenTokenDeployment {
            chain_reference: MidenChainReference::testnet(),
            faucet_id: MidenAccountAddress::new([0x0c; 15]),
            decimals: 6,
        };
        let pay_to = MidenAccountAddress::new([0x0b; 15]);
        let requirements = V2MidenExact::price_tag(pay_to, token.amount(1_000_000));

        assert_eq!(requirements.scheme, "exact");
        assert_eq!(requirements.network.to_string(), "miden:testnet");
        assert_eq!(requirements.amount, "1000000");
        assert_eq!(requirements.pay_to, pay_to);
        assert_eq!(requirements.asset, token.faucet_id);
        assert_eq!(requirements.max_timeout_seconds, 300);
    }
}
