//! Known Miden networks and token deployments.

use x402_types::chain::ChainId;

use crate::chain::{MidenAccountAddress, MidenChainReference, MidenTokenDeployment};

/// Constructors for well-known Miden networks.
///
/// ```ignore
/// use x402_miden_engine::KnownNetworkMiden;
/// use x402_types::chain::ChainId;
///
/// assert_eq!(ChainId::miden_testnet().to_string(), "miden:testnet");
/// ```
pub trait KnownNetworkMiden<A> {
    fn miden_testnet() -> A;
    fn miden_mainnet() -> A;
}

impl KnownNetworkMiden<ChainId> for ChainId {
    fn miden_testnet() -> ChainId {
        MidenChainReference::testnet().as_chain_id()
    }

    fn miden_mainnet() -> ChainId {
        MidenChainReference::mainnet().as_chain_id()
    }
}

/// USDC-equivalent fungible token, issued by a faucet account.
pub struct MidenUSDC;

/// Overrides the testnet faucet id, e.g. `MIDEN_TESTNET_FAUCET_ID=0x...`.
pub const TESTNET_FAUCET_ENV: &str = "MIDEN_TESTNET_FAUCET_ID";

/// Public fungible-token faucet on Miden testnet. May change across testnet resets.
pub const DEFAULT_TESTNET_FAUCET: MidenAccountAddress = MidenAccountAddress::new([
    0x37, 0xd5, 0x97, 0x7a, 0x8e, 0x16, 0xd8, 0x20, 0x5a, 0x36, 0x08, 0x20, 0xf0, 0x23, 0x0f,
]);

fn testnet_faucet_id() -> MidenAccountAddress {
    match std::env::var(TESTNET_FAUCET_ENV) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            tracing::warn!(value = %value, error = %e, "Ignoring invalid {TESTNET_FAUCET_ENV}");
            DEFAULT_TESTNET_FAUCET
        }),
        Err(_) => DEFAULT_TESTNET_FAUCET,
    }
}

impl KnownNetworkMiden<MidenTokenDeployment> for MidenUSDC {
    fn miden_testnet() -> MidenTokenDeployment {
        MidenTokenDeployment {
            chain_reference: MidenChainReference::testnet(),
            faucet_id: testnet_faucet_id(),
            decimals: 6,
        }
    }

    fn miden_mainnet() -> MidenTokenDeployment {
        MidenTokenDeployment {
            chain_reference: MidenChainReference::mainnet(),
            // Placeholder until a mainnet faucet exists.
            faucet_id: MidenAccountAddress::new([0; 15]),
            decimals: 6,
        }
    }
}

impl MidenTokenDeployment {
    pub fn testnet_usdc() -> Self {
        MidenUSDC::miden_testnet()
    }

    pub fn mainnet_usdc() -> Self {
        MidenUSDC::miden_mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_chain_ids() {
        assert_eq!(ChainId::miden_testnet().to_string(), "miden:testnet");
        assert_eq!(ChainId::miden_mainnet().to_string(), "miden:mainnet");
    }

    #[test]
    fn test_default_faucet_hex() {
        assert_eq!(
            DEFAULT_TESTNET_FAUCET.to_hex(),
            "0x37d5977a8e16d8205a360820f0230f"
        );
    }

    #[test]
    fn test_usdc_deployments() {
        let mainnet = MidenTokenDeployment::mainnet_usdc();
        assert_eq!(mainnet.decimals, 6);
        assert_eq!(mainnet.chain_reference, MidenChainReference::mainnet());
        assert_eq!(MidenTokenDeployment::testnet_usdc().decimals, 6);
    }
}
