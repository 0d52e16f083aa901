//! Facilitator-side verification and settlement for the Miden exact scheme.
//!
//! 1. **Verify**: match the client's accepted terms against the requirements,
//!    verify the proven transaction (or reuse an earlier verification of the
//!    same bytes), then find the payment in a public output note or bind the
//!    disclosed private note to the transaction's outputs.
//! 2. **Settle**: repeat verify, then submit once per transaction id.

use std::sync::Arc;

use x402_types::chain::ChainId;

use crate::cache::{ReceiptCache, VerifiedCache};
use crate::chain::{
    FacilitatorConfig, GenesisCommitment, LedgerRpc, MidenAccountAddress, MidenProviderError,
};
use crate::privacy::{self, PrivacyMode};
use crate::proof::{DecodedTransaction, ProofVerifier};
use crate::settlement::{GenesisBinding, GenesisError, SettlementSubmitter};

use super::requirements::{MismatchKind, PaymentTerms, match_requirements};
use super::state::{PaymentAttempt, PaymentState};
use super::types::{
    InvalidReason, MidenExactError, SettleRequest, SettleResponse, VerifyRequest, VerifyResponse,
};

/// A payment that passed every check short of settlement.
struct CheckedPayment {
    payer: MidenAccountAddress,
    decoded: Arc<DecodedTransaction>,
}

/// A payment that passed every settlement check and awaits submission.
pub struct PreparedSettlement {
    attempt: PaymentAttempt,
    checked: CheckedPayment,
    inputs: Vec<u8>,
}

impl PreparedSettlement {
    /// The account that pays.
    pub fn payer(&self) -> &MidenAccountAddress {
        &self.checked.payer
    }

    /// Id of the verified transaction to submit.
    pub fn transaction_id(&self) -> &str {
        self.checked.decoded.id()
    }
}

/// Verification and settlement engine for Miden exact payments.
///
/// `V` selects the proof backend, `R` the node connection. Both are fixed at
/// construction.
pub struct V2MidenExactFacilitator<V, R> {
    verifier: V,
    submitter: SettlementSubmitter<R>,
    verified: VerifiedCache,
    config: FacilitatorConfig,
}

impl<V: ProofVerifier, R: LedgerRpc> V2MidenExactFacilitator<V, R> {
    /// Creates a facilitator with its own genesis binding.
    ///
    /// Every instance fetches genesis once. Hosts running several
    /// facilitators for one chain should use [`with_genesis`](Self::with_genesis).
    pub fn new(verifier: V, rpc: R, config: FacilitatorConfig) -> Self {
        Self::with_genesis(verifier, rpc, config, Arc::new(GenesisBinding::new()))
    }

    /// Creates a facilitator sharing `genesis` with others on the same chain.
    pub fn with_genesis(
        verifier: V,
        rpc: R,
        config: FacilitatorConfig,
        genesis: Arc<GenesisBinding>,
    ) -> Self {
        let receipts = ReceiptCache::new(config.cache_capacity, config.receipt_ttl());
        Self {
            verifier,
            submitter: SettlementSubmitter::with_genesis(rpc, receipts, genesis),
            verified: VerifiedCache::new(config.cache_capacity, config.verified_ttl()),
            config,
        }
    }

    /// Returns the engine settings.
    pub fn config(&self) -> &FacilitatorConfig {
        &self.config
    }

    /// Returns the proof backend.
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Returns the node connection.
    pub fn rpc(&self) -> &R {
        self.submitter.rpc()
    }

    /// Returns the CAIP-2 id of the chain this facilitator settles on.
    pub fn network(&self) -> ChainId {
        self.rpc().chain_reference().as_chain_id()
    }

    /// Returns the bound genesis commitment, if any.
    pub fn genesis(&self) -> Option<&GenesisCommitment> {
        self.submitter.genesis().get()
    }

    /// Returns the genesis binding, for sharing with another facilitator.
    pub fn genesis_binding(&self) -> Arc<GenesisBinding> {
        Arc::clone(self.submitter.genesis())
    }

    /// Binds the genesis commitment. Hosts call this at startup and refuse
    /// to serve if it fails.
    pub async fn initialize(&self) -> Result<&GenesisCommitment, GenesisError> {
        self.submitter.initialize().await
    }

    /// Verifies a payment without touching the ledger.
    pub fn verify(&self, request: &VerifyRequest) -> VerifyResponse {
        let mut attempt = PaymentAttempt::new(&request.payment_payload.payload.transaction_id);
        match self.check(request, &mut attempt) {
            Ok(checked) => {
                tracing::info!(
                    transaction_id = %checked.decoded.id(),
                    payer = %checked.payer,
                    state = %attempt.state(),
                    "Payment verified"
                );
                VerifyResponse::Valid {
                    payer: checked.payer,
                }
            }
            Err(err) => VerifyResponse::Invalid {
                reason: attempt.reject(err).reason(),
            },
        }
    }

    /// Verifies a payment and relays it to the node, once per transaction id.
    ///
    /// Runs [`prepare_settlement`](Self::prepare_settlement) inline. Hosts
    /// on an async runtime should run that step on a blocking thread and
    /// call [`submit`](Self::submit) themselves.
    pub async fn settle(&self, request: &SettleRequest) -> SettleResponse {
        match self.prepare_settlement(request) {
            Ok(prepared) => self.submit(prepared).await,
            Err(reason) => SettleResponse::Failure { reason },
        }
    }

    /// Runs every settlement check, including proof verification on a
    /// cache miss. CPU-bound; never touches the ledger.
    pub fn prepare_settlement(
        &self,
        request: &SettleRequest,
    ) -> Result<PreparedSettlement, InvalidReason> {
        let mut attempt = PaymentAttempt::new(&request.payment_payload.payload.transaction_id);
        let prepared = self.check(request, &mut attempt).and_then(|checked| {
            let inputs = request.payment_payload.payload.transaction_inputs_bytes()?;
            Ok((checked, inputs))
        });
        match prepared {
            Ok((checked, inputs)) => Ok(PreparedSettlement {
                attempt,
                checked,
                inputs,
            }),
            Err(err) => Err(attempt.reject(err).reason()),
        }
    }

    /// Submits a prepared payment, or returns the receipt of an earlier
    /// submission of the same transaction id.
    pub async fn submit(&self, prepared: PreparedSettlement) -> SettleResponse {
        let PreparedSettlement {
            mut attempt,
            checked,
            inputs,
        } = prepared;
        match self.submitter.settle(&checked.decoded, &inputs).await {
            Ok(receipt) => {
                attempt.advance(PaymentState::Settled);
                tracing::info!(
                    transaction_id = %receipt.transaction_id,
                    payer = %checked.payer,
                    reference = %receipt.reference,
                    "Payment settled"
                );
                SettleResponse::Success {
                    payer: checked.payer,
                    transaction: receipt.reference.to_string(),
                    network: self.network(),
                }
            }
            Err(err) => SettleResponse::Failure {
                reason: attempt.reject(err.into()).reason(),
            },
        }
    }

    /// Balance of `faucet` in a public account's vault.
    pub async fn account_balance(
        &self,
        account: &MidenAccountAddress,
        faucet: &MidenAccountAddress,
    ) -> Result<u64, MidenProviderError> {
        self.rpc().query_account_vault(account, faucet).await
    }

    /// Drops expired verification and receipt entries.
    pub fn purge_expired(&self) -> usize {
        let purged = self.verified.purge_expired() + self.submitter.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired cache entries");
        }
        purged
    }

    fn check(
        &self,
        request: &VerifyRequest,
        attempt: &mut PaymentAttempt,
    ) -> Result<CheckedPayment, MidenExactError> {
        let requirements = &request.payment_requirements;
        let payload = &request.payment_payload;
        let policy = self.config.overpayment;

        // Structural checks first; nothing below is cheap.
        let terms = PaymentTerms::from_requirements(requirements)?;
        if requirements.network != self.network() {
            return Err(MismatchKind::NetworkMismatch.into());
        }
        match_requirements(requirements, &payload.accepted, policy)?;
        attempt.advance(PaymentState::RequirementsChecked);

        let miden = &payload.payload;
        let proven_tx = miden.proven_transaction_bytes()?;
        let decoded = self.verified_transaction(&miden.transaction_id, &proven_tx)?;
        if !decoded.matches_id(&miden.transaction_id) {
            return Err(MidenExactError::TransactionIdMismatch);
        }
        if decoded.account() != &miden.from {
            return Err(MidenExactError::PayerMismatch);
        }
        attempt.advance(PaymentState::ProofVerified);

        match (miden.note_data_bytes(), miden.privacy_mode) {
            (Some(note_bytes), _) => {
                let revealed = self.verifier.reveal_note(&note_bytes?)?;
                privacy::bind(&decoded, revealed, &terms, policy)?;
                attempt.advance(PaymentState::NoteBound);
            }
            (None, PrivacyMode::TrustedFacilitator) => {
                return Err(MidenExactError::MissingNoteData);
            }
            (None, PrivacyMode::Public) => {
                let paid = decoded.public_notes().any(|note| {
                    note.target
                        .is_some_and(|target| terms.match_note(&target, note, policy).is_ok())
                });
                if !paid {
                    return Err(MidenExactError::PaymentNotFound);
                }
            }
        }

        Ok(CheckedPayment {
            payer: *decoded.account(),
            decoded,
        })
    }

    fn verified_transaction(
        &self,
        transaction_id: &str,
        proven_tx: &[u8],
    ) -> Result<Arc<DecodedTransaction>, MidenExactError> {
        if let Some(decoded) = self.verified.get(transaction_id, proven_tx) {
            tracing::debug!(transaction_id, "Reusing verified transaction");
            return Ok(decoded);
        }
        let decoded = Arc::new(self.verifier.verify_proof(proven_tx)?);
        self.verified.insert(Arc::clone(&decoded));
        Ok(decoded)
    }
}

#[cfg(feature = "facilitator")]
mod x402 {
    use std::collections::HashMap;

    use serde::Serialize;
    use serde::de::DeserializeOwned;
    use tokio::runtime::{Handle, RuntimeFlavor};
    use x402_types::chain::ChainProviderOps;
    use x402_types::proto;
    use x402_types::proto::v2;
    use x402_types::scheme::{X402SchemeFacilitator, X402SchemeFacilitatorError};

    use super::V2MidenExactFacilitator;
    use crate::chain::LedgerRpc;
    use crate::exact::types::{
        ExactScheme, InvalidReason, SettleRequest, SettleResponse, VerifyRequest, VerifyResponse,
    };
    use crate::proof::ProofVerifier;

    fn convert<P: Serialize, T: DeserializeOwned>(
        request: &P,
    ) -> Result<T, X402SchemeFacilitatorError> {
        serde_json::to_value(request)
            .and_then(serde_json::from_value)
            .map_err(|e| {
                X402SchemeFacilitatorError::PaymentVerification(
                    proto::PaymentVerificationError::InvalidFormat(e.to_string()),
                )
            })
    }

    /// Runs CPU-bound checks without stalling other tasks on a multi-thread
    /// runtime. A current-thread runtime cannot hand off its only worker.
    fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(f)
            }
            _ => f(),
        }
    }

    fn rejected(reason: InvalidReason) -> X402SchemeFacilitatorError {
        X402SchemeFacilitatorError::PaymentVerification(
            proto::PaymentVerificationError::InvalidFormat(reason.to_string()),
        )
    }

    #[async_trait::async_trait]
    impl<V, R> X402SchemeFacilitator for V2MidenExactFacilitator<V, R>
    where
        V: ProofVerifier + 'static,
        R: LedgerRpc + ChainProviderOps + 'static,
    {
        async fn verify(
            &self,
            request: &proto::VerifyRequest,
        ) -> Result<proto::VerifyResponse, X402SchemeFacilitatorError> {
            let request: VerifyRequest = convert(request)?;
            match run_blocking(|| V2MidenExactFacilitator::verify(self, &request)) {
                VerifyResponse::Valid { payer } => {
                    Ok(v2::VerifyResponse::valid(payer.to_string()).into())
                }
                VerifyResponse::Invalid { reason } => Err(rejected(reason)),
            }
        }

        async fn settle(
            &self,
            request: &proto::SettleRequest,
        ) -> Result<proto::SettleResponse, X402SchemeFacilitatorError> {
            let request: SettleRequest = convert(request)?;
            let response = match run_blocking(|| self.prepare_settlement(&request)) {
                Ok(prepared) => self.submit(prepared).await,
                Err(reason) => SettleResponse::Failure { reason },
            };
            match response {
                SettleResponse::Success {
                    payer,
                    transaction,
                    network,
                } => Ok(v2::SettleResponse::Success {
                    payer: payer.to_string(),
                    transaction,
                    network: network.to_string(),
                }
                .into()),
                SettleResponse::Failure { reason } => match reason {
                    InvalidReason::GenesisUnavailable | InvalidReason::SubmissionFailed => {
                        Err(X402SchemeFacilitatorError::OnchainFailure(reason.to_string()))
                    }
                    _ => Err(rejected(reason)),
                },
            }
        }

        async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError> {
            let chain_id = self.rpc().chain_id();
            let kinds = vec![proto::SupportedPaymentKind {
                x402_version: v2::X402Version2.into(),
                scheme: ExactScheme.to_string(),
                network: chain_id.clone().into(),
                extra: None,
            }];
            let signers = {
                let mut signers = HashMap::with_capacity(1);
                signers.insert(chain_id, self.rpc().signer_addresses());
                signers
            };
            Ok(proto::SupportedResponse {
                kinds,
                extensions: Vec::new(),
                signers,
            })
        }
    }
}

#[cfg(all(feature = "facilitator", feature = "miden-native"))]
mod builder {
    use x402_types::scheme::{X402SchemeFacilitator, X402SchemeFacilitatorBuilder};

    use super::V2MidenExactFacilitator;
    use crate::chain::{FacilitatorConfig, MidenChainProvider};
    use crate::exact::V2MidenExact;
    use crate::proof::NativeVerifier;

    impl X402SchemeFacilitatorBuilder<MidenChainProvider> for V2MidenExact {
        fn build(
            &self,
            provider: MidenChainProvider,
            config: Option<serde_json::Value>,
        ) -> Result<Box<dyn X402SchemeFacilitator>, Box<dyn std::error::Error>> {
            let config: FacilitatorConfig = match config {
                Some(value) => serde_json::from_value(value)?,
                None => FacilitatorConfig::default(),
            };
            let verifier = NativeVerifier::new(config.security_level);
            Ok(Box::new(V2MidenExactFacilitator::new(
                verifier, provider, config,
            )))
        }
    }
}
