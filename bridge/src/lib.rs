//! Vescrow settlement bridge.
//!
//! Reacts to `EscrowSignal` logs: looks up the attestation for the signalled
//! agreement, re-verifies its signature locally, and only then writes the
//! agreement id to the Receiver, which runs `executeIfSatisfied`. Every
//! step before the write fails closed to a skip, and the write itself is
//! safe to repeat.

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::Middleware;
use ethers::types::{Address, Log, H256};
use tracing::{debug, info, instrument, warn};
use vescrow_core::attestation::TaskStatus;
use vescrow_core::receiver::encode_report;

pub mod attestation_client;
pub mod config;
pub mod error;
pub mod signal;
pub mod writer;

pub use attestation_client::{AttestationSource, HttpAttestationSource};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use writer::{EthReportWriter, LocalReportWriter, ReportWriter};

/// Why a signal did not lead to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Log is not an `EscrowSignal` or carries no usable id.
    UndecodableSignal,
    /// Store unreachable or its answer unusable.
    AttestationUnavailable,
    NotCompleted(TaskStatus),
    /// Store says completed but the record does not parse.
    MalformedAttestation(String),
    /// Store says completed but the signature does not recover to the worker.
    SignatureMismatch,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndecodableSignal => f.write_str("undecodable signal"),
            Self::AttestationUnavailable => f.write_str("attestation unavailable"),
            Self::NotCompleted(status) => write!(f, "attestation {status}"),
            Self::MalformedAttestation(e) => write!(f, "malformed attestation: {e}"),
            Self::SignatureMismatch => f.write_str("signature does not match worker"),
        }
    }
}

/// Terminal outcome of processing one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Submitted {
        agreement_id: u64,
        tx_hash: H256,
    },
    Skipped {
        agreement_id: Option<u64>,
        reason: SkipReason,
    },
}

impl SettlementOutcome {
    fn skipped(agreement_id: u64, reason: SkipReason) -> Self {
        Self::Skipped {
            agreement_id: Some(agreement_id),
            reason,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

/// Per-signal settlement logic. Holds no mutable state, so clones can
/// process signals concurrently.
#[derive(Clone)]
pub struct Bridge {
    chain_id: u64,
    source: Arc<dyn AttestationSource>,
    writer: Arc<dyn ReportWriter>,
}

impl Bridge {
    pub fn new(
        chain_id: u64,
        source: Arc<dyn AttestationSource>,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        Self {
            chain_id,
            source,
            writer,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Processes one observed log.
    pub async fn handle_log(&self, log: &Log) -> Result<SettlementOutcome> {
        match signal::agreement_id(log) {
            Some(id) => self.process(id).await,
            None => {
                debug!(topics = ?log.topics, "Ignoring undecodable log");
                Ok(SettlementOutcome::Skipped {
                    agreement_id: None,
                    reason: SkipReason::UndecodableSignal,
                })
            }
        }
    }

    /// Settles `agreement_id` if its attestation verifies.
    ///
    /// Only a failed report submission is an `Err`; re-running after one
    /// is safe because the ledger pays out at most once.
    #[instrument(skip(self), fields(chain_id = self.chain_id))]
    pub async fn process(&self, agreement_id: u64) -> Result<SettlementOutcome> {
        let Some(report) = self.source.fetch(self.chain_id, agreement_id).await else {
            return Ok(SettlementOutcome::skipped(
                agreement_id,
                SkipReason::AttestationUnavailable,
            ));
        };
        if report.status != TaskStatus::Completed {
            debug!(status = %report.status, "Attestation not completed");
            return Ok(SettlementOutcome::skipped(
                agreement_id,
                SkipReason::NotCompleted(report.status),
            ));
        }

        // the store's verdict is not trusted on its own
        let completion = match report.completion() {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "Completed attestation is malformed");
                return Ok(SettlementOutcome::skipped(
                    agreement_id,
                    SkipReason::MalformedAttestation(e.to_string()),
                ));
            }
        };
        if !completion.is_signed_by_worker() {
            warn!(worker = ?completion.worker, "Attestation signature does not recover to worker");
            return Ok(SettlementOutcome::skipped(
                agreement_id,
                SkipReason::SignatureMismatch,
            ));
        }

        let tx_hash = self.writer.submit(encode_report(agreement_id)).await?;
        info!(?tx_hash, "Settlement report submitted");
        Ok(SettlementOutcome::Submitted {
            agreement_id,
            tx_hash,
        })
    }

    /// Follows `EscrowSignal` logs of `ledger` from `from_block` (or the
    /// current head) and processes each one on its own task.
    ///
    /// RPC failures are logged and retried on the next tick; the loop only
    /// returns if the initial head cannot be read.
    ///
    /// A failed report submission is only logged: the scanned range has
    /// already advanced, so the log is not revisited. Re-deliver such an
    /// agreement with [`Bridge::process`] (`vescrow-bridge process --id`).
    pub async fn watch<M>(
        &self,
        provider: Arc<M>,
        ledger: Address,
        from_block: Option<u64>,
        poll_interval: Duration,
    ) -> Result<()>
    where
        M: Middleware + 'static,
    {
        let mut next = match from_block {
            Some(block) => block,
            None => provider
                .get_block_number()
                .await
                .map_err(|e| BridgeError::Blockchain(e.to_string()))?
                .as_u64(),
        };
        info!(?ledger, from_block = next, "Watching for escrow signals");

        let filter = signal::signal_filter(ledger);
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            let head = match provider.get_block_number().await {
                Ok(head) => head.as_u64(),
                Err(e) => {
                    warn!(error = %e, "Failed to read chain head");
                    continue;
                }
            };
            if head < next {
                continue;
            }

            let range = filter.clone().from_block(next).to_block(head);
            let logs = match provider.get_logs(&range).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(error = %e, from = next, to = head, "Failed to fetch signal logs");
                    continue;
                }
            };
            debug!(count = logs.len(), from = next, to = head, "Signal logs fetched");
            for log in logs {
                let bridge = self.clone();
                tokio::spawn(async move {
                    match bridge.handle_log(&log).await {
                        Ok(SettlementOutcome::Skipped { agreement_id, reason }) => {
                            info!(?agreement_id, %reason, "Signal skipped");
                        }
                        Ok(SettlementOutcome::Submitted { .. }) => {}
                        Err(e) => {
                            let tx = log.transaction_hash;
                            warn!(error = %e, ?tx, "Report submission failed");
                        }
                    }
                });
            }
            next = head + 1;
        }
    }
}
