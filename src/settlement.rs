//! Settlement submission with genesis binding and per-transaction idempotency.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::cache::ReceiptCache;
use crate::chain::{GenesisCommitment, LedgerRpc, MidenChainReference, TransactionReference};
use crate::proof::DecodedTransaction;

/// Why the genesis commitment could not be established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenesisError {
    #[error("Failed to fetch genesis commitment: {0}")]
    Fetch(String),
    #[error("Node returned an empty genesis commitment")]
    EmptyCommitment,
    #[error("Genesis is bound to {bound}, not {requested}")]
    ChainMismatch { bound: String, requested: String },
}

/// Why a verified transaction was not settled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettleError {
    /// The network identity is not established; nothing was submitted.
    #[error("Genesis binding unavailable: {0}")]
    Genesis(#[from] GenesisError),
    /// The node was unreachable or rejected the transaction. Not retried here.
    #[error("Submission failed: {cause}")]
    SubmissionFailed { cause: String },
}

/// Proof that a transaction was accepted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub transaction_id: String,
    pub reference: TransactionReference,
}

/// The network's genesis commitment, fetched at most once per binding.
///
/// Concurrent first callers share a single fetch. A failed fetch leaves the
/// binding empty so the next caller tries again; a successful one is never
/// replaced. A binding belongs to the first chain it is fetched for. Share
/// one `Arc<GenesisBinding>` between facilitators of the same chain so the
/// process fetches genesis once (see
/// [`V2MidenExactFacilitator::with_genesis`](crate::exact::V2MidenExactFacilitator::with_genesis)).
#[derive(Debug, Default)]
pub struct GenesisBinding {
    cell: OnceCell<(MidenChainReference, GenesisCommitment)>,
}

impl GenesisBinding {
    /// Creates an unbound binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound commitment, if a fetch has succeeded.
    pub fn get(&self) -> Option<&GenesisCommitment> {
        self.cell.get().map(|(_, commitment)| commitment)
    }

    /// The chain the commitment was fetched for.
    pub fn chain(&self) -> Option<&MidenChainReference> {
        self.cell.get().map(|(chain, _)| chain)
    }

    /// Returns true once a fetch has succeeded.
    pub fn is_bound(&self) -> bool {
        self.cell.initialized()
    }

    /// Returns the bound commitment, fetching it through `rpc` on first use.
    ///
    /// # Errors
    ///
    /// Fails when the fetch fails, the node returns an empty commitment, or
    /// the binding already holds the genesis of a different chain.
    pub async fn get_or_fetch<R>(&self, rpc: &R) -> Result<&GenesisCommitment, GenesisError>
    where
        R: LedgerRpc + ?Sized,
    {
        let (chain, commitment) = self
            .cell
            .get_or_try_init(|| async {
                let commitment = rpc
                    .fetch_genesis_commitment()
                    .await
                    .map_err(|e| GenesisError::Fetch(e.to_string()))?;
                if commitment.is_empty() {
                    return Err(GenesisError::EmptyCommitment);
                }
                tracing::info!(
                    genesis = %commitment,
                    network = %rpc.chain_reference(),
                    "Genesis commitment bound"
                );
                Ok((rpc.chain_reference().clone(), commitment))
            })
            .await?;
        if chain != rpc.chain_reference() {
            return Err(GenesisError::ChainMismatch {
                bound: chain.to_string(),
                requested: rpc.chain_reference().to_string(),
            });
        }
        Ok(commitment)
    }
}

/// Relays verified transactions to the node, at most once per transaction id
/// while the receipt is retained.
pub struct SettlementSubmitter<R> {
    rpc: R,
    genesis: Arc<GenesisBinding>,
    receipts: ReceiptCache,
}

impl<R: LedgerRpc> SettlementSubmitter<R> {
    /// Creates a submitter with its own genesis binding.
    pub fn new(rpc: R, receipts: ReceiptCache) -> Self {
        Self::with_genesis(rpc, receipts, Arc::new(GenesisBinding::new()))
    }

    /// Creates a submitter that shares `genesis` with other submitters.
    pub fn with_genesis(rpc: R, receipts: ReceiptCache, genesis: Arc<GenesisBinding>) -> Self {
        Self {
            rpc,
            genesis,
            receipts,
        }
    }

    /// Returns the node connection.
    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Returns the genesis binding settlement depends on.
    pub fn genesis(&self) -> &Arc<GenesisBinding> {
        &self.genesis
    }

    /// Returns the settlement receipts.
    pub fn receipts(&self) -> &ReceiptCache {
        &self.receipts
    }

    /// Binds the genesis commitment eagerly.
    pub async fn initialize(&self) -> Result<&GenesisCommitment, GenesisError> {
        self.genesis.get_or_fetch(&self.rpc).await
    }

    /// Submits `decoded` with its serialized inputs, or returns the receipt
    /// of an earlier submission of the same transaction id.
    ///
    /// Concurrent settles of one transaction share a single submission. A
    /// failed submission is reported and leaves no receipt behind.
    pub async fn settle(
        &self,
        decoded: &DecodedTransaction,
        transaction_inputs: &[u8],
    ) -> Result<SettlementReceipt, SettleError> {
        if let Some(receipt) = self.receipts.get(decoded.id()) {
            tracing::debug!(
                transaction_id = %decoded.id(),
                "Returning cached settlement receipt"
            );
            return Ok(receipt);
        }

        let slot: Arc<OnceCell<SettlementReceipt>> = self.receipts.slot(decoded.id());
        let receipt = slot
            .get_or_try_init(|| async {
                self.genesis.get_or_fetch(&self.rpc).await?;
                let reference = self
                    .rpc
                    .submit_transaction(decoded.bytes(), transaction_inputs)
                    .await
                    .map_err(|e| SettleError::SubmissionFailed {
                        cause: e.to_string(),
                    })?;
                tracing::info!(
                    transaction_id = %decoded.id(),
                    reference = %reference,
                    "Transaction submitted"
                );
                Ok::<_, SettleError>(SettlementReceipt {
                    transaction_id: decoded.id().to_string(),
                    reference,
                })
            })
            .await?;
        Ok(receipt.clone())
    }

    /// Drops expired receipts whose submission has finished.
    pub fn purge_expired(&self) -> usize {
        self.receipts.purge_expired()
    }
}
