//! Ledger RPC boundary used by the settlement path.
//!
//! [`LedgerRpc`] is the capability the engine depends on. [`MidenChainProvider`]
//! implements it against a Miden node over gRPC when the `miden-client-native`
//! feature is enabled; without it every call reports `NotImplemented`.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use x402_types::chain::{ChainId, ChainProviderOps};

use super::{MidenAccountAddress, MidenChainConfig, MidenChainReference};

/// Commitment of the network's genesis block header, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenesisCommitment(String);

impl GenesisCommitment {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// True for an empty or all-zero commitment, which no real network has.
    pub fn is_empty(&self) -> bool {
        self.0
            .strip_prefix("0x")
            .unwrap_or(&self.0)
            .bytes()
            .all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for GenesisCommitment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger-assigned reference of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionReference(String);

impl TransactionReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node operations the facilitator needs.
///
/// Implementations must be safe to share across concurrent requests.
/// `fetch_genesis_commitment` is called at most once per successful bind by
/// [`GenesisBinding`](crate::settlement::GenesisBinding); the other calls
/// are only made after that bind succeeded.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// The chain this connection talks to.
    fn chain_reference(&self) -> &MidenChainReference;

    /// Fetches the genesis block commitment and binds the connection to it.
    async fn fetch_genesis_commitment(&self) -> Result<GenesisCommitment, MidenProviderError>;

    /// Submits a serialized proven transaction with its serialized inputs.
    async fn submit_transaction(
        &self,
        proven_tx_bytes: &[u8],
        transaction_inputs_bytes: &[u8],
    ) -> Result<TransactionReference, MidenProviderError>;

    /// Returns the balance of `faucet` in the vault of a public `account`.
    async fn query_account_vault(
        &self,
        account: &MidenAccountAddress,
        faucet: &MidenAccountAddress,
    ) -> Result<u64, MidenProviderError>;
}

/// Connection to a Miden node.
///
/// ```ignore
/// use x402_miden_engine::chain::{MidenChainConfig, MidenChainProvider, MidenChainReference};
///
/// let provider = MidenChainProvider::from_config(&MidenChainConfig {
///     chain_reference: MidenChainReference::testnet(),
///     rpc_url: "https://rpc.testnet.miden.io".to_string(),
/// })?;
/// ```
pub struct MidenChainProvider {
    chain_reference: MidenChainReference,
    rpc_url: String,
    #[cfg(feature = "miden-client-native")]
    rpc_client: std::sync::Arc<miden_client::rpc::GrpcClient>,
}

impl MidenChainProvider {
    /// Creates a provider from configuration.
    ///
    /// # Errors
    ///
    /// With `miden-client-native`, fails if the RPC URL is not a valid endpoint.
    pub fn from_config(config: &MidenChainConfig) -> Result<Self, MidenProviderError> {
        #[cfg(feature = "miden-client-native")]
        let rpc_client = {
            let endpoint: miden_client::rpc::Endpoint =
                config.rpc_url.as_str().try_into().map_err(|_| {
                    MidenProviderError::ConnectionError(format!(
                        "Invalid RPC endpoint '{}'",
                        config.rpc_url
                    ))
                })?;
            std::sync::Arc::new(miden_client::rpc::GrpcClient::new(&endpoint, 10_000))
        };

        Ok(Self {
            chain_reference: config.chain_reference.clone(),
            rpc_url: config.rpc_url.clone(),
            #[cfg(feature = "miden-client-native")]
            rpc_client,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl LedgerRpc for MidenChainProvider {
    fn chain_reference(&self) -> &MidenChainReference {
        &self.chain_reference
    }

    async fn fetch_genesis_commitment(&self) -> Result<GenesisCommitment, MidenProviderError> {
        #[cfg(feature = "miden-client-native")]
        {
            use miden_client::rpc::NodeRpcClient;
            use miden_protocol::block::BlockNumber;

            let (genesis_header, _) = self
                .rpc_client
                .get_block_header_by_number(Some(BlockNumber::GENESIS), false)
                .await
                .map_err(|e| {
                    MidenProviderError::ConnectionError(format!(
                        "Failed to fetch genesis block header: {e}"
                    ))
                })?;

            let commitment = genesis_header.commitment();
            // The node checks this value in request headers on every later call.
            self.rpc_client
                .set_genesis_commitment(commitment)
                .await
                .map_err(|e| {
                    MidenProviderError::ConnectionError(format!(
                        "Failed to set genesis commitment: {e}"
                    ))
                })?;

            tracing::info!(
                rpc_url = %self.rpc_url,
                genesis = %commitment.to_hex(),
                "Bound to Miden genesis"
            );
            Ok(GenesisCommitment::new(commitment.to_hex()))
        }

        #[cfg(not(feature = "miden-client-native"))]
        {
            Err(MidenProviderError::NotImplemented(
                "fetch_genesis_commitment requires miden-client-native feature".to_string(),
            ))
        }
    }

    async fn submit_transaction(
        &self,
        proven_tx_bytes: &[u8],
        transaction_inputs_bytes: &[u8],
    ) -> Result<TransactionReference, MidenProviderError> {
        #[cfg(feature = "miden-client-native")]
        {
            use miden_client::rpc::NodeRpcClient;
            use miden_protocol::transaction::{ProvenTransaction, TransactionInputs};
            use miden_protocol::utils::serde::Deserializable;

            let proven_tx = ProvenTransaction::read_from_bytes(proven_tx_bytes).map_err(|e| {
                MidenProviderError::SubmissionError(format!(
                    "Failed to deserialize ProvenTransaction: {e}"
                ))
            })?;
            let tx_inputs =
                TransactionInputs::read_from_bytes(transaction_inputs_bytes).map_err(|e| {
                    MidenProviderError::SubmissionError(format!(
                        "Failed to deserialize TransactionInputs: {e}"
                    ))
                })?;

            let tx_id = proven_tx.id();
            tracing::info!(tx_id = %tx_id, rpc_url = %self.rpc_url, "Submitting ProvenTransaction");

            let block_num = self
                .rpc_client
                .submit_proven_transaction(proven_tx, tx_inputs)
                .await
                .map_err(|e| MidenProviderError::TransactionRejected(e.to_string()))?;

            tracing::info!(
                tx_id = %tx_id,
                block_num = %block_num,
                "ProvenTransaction admitted to mempool"
            );
            Ok(TransactionReference::new(format!("{tx_id}")))
        }

        #[cfg(not(feature = "miden-client-native"))]
        {
            let _ = (proven_tx_bytes, transaction_inputs_bytes);
            Err(MidenProviderError::NotImplemented(
                "submit_transaction requires miden-client-native feature".to_string(),
            ))
        }
    }

    async fn query_account_vault(
        &self,
        account: &MidenAccountAddress,
        faucet: &MidenAccountAddress,
    ) -> Result<u64, MidenProviderError> {
        #[cfg(feature = "miden-client-native")]
        {
            use miden_client::rpc::NodeRpcClient;

            let account_id = account
                .to_account_id()
                .map_err(|e| MidenProviderError::QueryError(format!("{account}: {e}")))?;
            let faucet_id = faucet
                .to_account_id()
                .map_err(|e| MidenProviderError::QueryError(format!("{faucet}: {e}")))?;

            let fetched = self
                .rpc_client
                .get_account_details(account_id)
                .await
                .map_err(|e| {
                    MidenProviderError::QueryError(format!(
                        "get_account_details failed for {account}: {e}"
                    ))
                })?;

            match fetched.account() {
                Some(acct) => acct.vault().get_balance(faucet_id).map_err(|e| {
                    MidenProviderError::QueryError(format!("vault lookup for {faucet}: {e}"))
                }),
                None => Err(MidenProviderError::QueryError(format!(
                    "Account {account} is private; its vault is not visible via RPC"
                ))),
            }
        }

        #[cfg(not(feature = "miden-client-native"))]
        {
            let _ = (account, faucet);
            Err(MidenProviderError::NotImplemented(
                "query_account_vault requires miden-client-native feature".to_string(),
            ))
        }
    }
}

impl ChainProviderOps for MidenChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        // Clients prove and sign their own transactions; the facilitator only relays.
        vec![]
    }

    fn chain_id(&self) -> ChainId {
        self.chain_reference.as_chain_id()
    }
}

/// Errors from the Miden node connection.
#[derive(Debug, thiserror::Error)]
pub enum MidenProviderError {
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transaction submission failed: {0}")]
    SubmissionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_commitment_emptiness() {
        assert!(GenesisCommitment::new("").is_empty());
        assert!(GenesisCommitment::new("0x").is_empty());
        assert!(GenesisCommitment::new("0x0000000000").is_empty());
        assert!(!GenesisCommitment::new("0x00a0").is_empty());
    }

    #[cfg(not(feature = "miden-client-native"))]
    #[tokio::test]
    async fn test_provider_without_client_reports_not_implemented() {
        let provider = MidenChainProvider::from_config(&MidenChainConfig {
            chain_reference: MidenChainReference::testnet(),
            rpc_url: "https://rpc.testnet.miden.io".to_string(),
        })
        .unwrap();
        assert_eq!(provider.chain_id().to_string(), "miden:testnet");
        assert!(matches!(
            provider.fetch_genesis_commitment().await,
            Err(MidenProviderError::NotImplemented(_))
        ));
        assert!(matches!(
            provider.submit_transaction(&[1], &[2]).await,
            Err(MidenProviderError::NotImplemented(_))
        ));
    }
}
