//! Verification and settlement engine for x402 payments on the Miden rollup.
//!
//! A client pays for an HTTP resource by proving a Miden transaction that
//! creates a pay-to-id note for the recipient. The engine in this crate
//! decides whether such a payment satisfies a resource server's requirements
//! and relays it to the network exactly once:
//!
//! 1. [`exact::match_requirements`] compares the client's accepted terms with
//!    the requirements before any proof work.
//! 2. A [`proof::ProofVerifier`] decodes the proven transaction and checks its
//!    validity proof. Results are cached per transaction id.
//! 3. The payment note is read from the transaction's public outputs, or, for
//!    private notes, disclosed off-chain and bound to an output id by
//!    [`privacy::bind`].
//! 4. [`settlement::SettlementSubmitter`] binds the genesis commitment once
//!    and submits each transaction id at most once.
//!
//! # Feature Flags
//!
//! - `server` - price tags for 402 responses
//! - `facilitator` - `X402SchemeFacilitator` adapter for x402 hosts
//! - `miden-native` - STARK verification with `miden-tx` and `miden-protocol`
//! - `miden-client-native` - gRPC node connection via `miden-client` (includes `miden-native`)
//!
//! # Usage
//!
//! ```ignore
//! use x402_miden_engine::V2MidenExactFacilitator;
//! use x402_miden_engine::chain::{FacilitatorConfig, MidenChainProvider};
//! use x402_miden_engine::proof::NativeVerifier;
//!
//! let config = FacilitatorConfig::from_env()?;
//! let facilitator = V2MidenExactFacilitator::new(
//!     NativeVerifier::new(config.security_level),
//!     MidenChainProvider::from_config(&chain_config)?,
//!     config,
//! );
//! facilitator.initialize().await?;
//! let response = facilitator.verify(&request);
//! ```

pub mod cache;
pub mod chain;
pub mod exact;
pub mod privacy;
pub mod proof;
pub mod settlement;

mod networks;
pub use networks::*;

pub use exact::{V2MidenExact, V2MidenExactFacilitator};
