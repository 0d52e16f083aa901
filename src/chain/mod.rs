//! Core Miden chain types, configuration, and the ledger RPC boundary.
//!
//! - [`MidenAccountAddress`] - account id wrapper (payers, recipients, faucets)
//! - [`MidenChainReference`] - `testnet` or `mainnet`
//! - [`MidenTokenDeployment`] - faucet-issued token info
//! - [`MidenChainConfig`], [`FacilitatorConfig`] - connection and engine settings
//! - [`LedgerRpc`], [`MidenChainProvider`] - node operations used for settlement

pub mod types;
pub use types::*;

pub mod config;
pub use config::*;

pub mod provider;
pub use provider::*;
