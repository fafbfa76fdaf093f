//! Attestation store: writes are shape-checked only, every read re-verifies.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use vescrow_core::attestation::{ClaimRequest, Completion, StatusReport, TaskStatus};

use crate::db::{TaskRecord, TaskRepository};
use crate::error::Result;
use crate::reader::ExternalStateReader;

pub struct AttestationStore {
    repo: Arc<TaskRepository>,
    reader: Arc<dyn ExternalStateReader>,
    read_timeout: Duration,
}

impl AttestationStore {
    pub fn new(
        repo: TaskRepository,
        reader: Arc<dyn ExternalStateReader>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            repo: Arc::new(repo),
            reader,
            read_timeout,
        }
    }

    /// Runs a repository call on the blocking pool; SQLite I/O never
    /// occupies an async worker.
    async fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TaskRepository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        tokio::task::spawn_blocking(move || f(&repo)).await?
    }

    /// Validates and stores a completion claim.
    ///
    /// Nothing is verified here; the stored status is an unverified
    /// `pending` marker (or `disputed`, which a claim never clears).
    #[instrument(skip_all)]
    pub async fn record_completion(&self, claim: &ClaimRequest) -> Result<StatusReport> {
        let completion = Completion::try_from(claim)?;
        let stored = completion.clone();
        let status = self.with_repo(move |repo| repo.upsert_claim(&stored)).await?;
        info!(
            chain_id = completion.chain_id,
            agreement_id = completion.agreement_id,
            worker = ?completion.worker,
            "Completion claim recorded"
        );
        Ok(StatusReport::bare(
            completion.chain_id,
            completion.agreement_id,
            status,
        ))
    }

    /// Current status of `(chain_id, agreement_id)`.
    ///
    /// `completed` is only returned after the signature recovers to the
    /// stored worker and the target's live state equals the claimed value.
    /// Any failure along the way, including a slow or failing chain read,
    /// reports `pending`.
    #[instrument(skip(self))]
    pub async fn read_status(&self, chain_id: u64, agreement_id: u64) -> Result<StatusReport> {
        let record = self
            .with_repo(move |repo| repo.get(chain_id, agreement_id))
            .await?;
        let Some(record) = record else {
            return Ok(StatusReport::bare(
                chain_id,
                agreement_id,
                TaskStatus::Pending,
            ));
        };
        if record.status == TaskStatus::Disputed {
            return Ok(record.report(TaskStatus::Disputed));
        }

        let status = self.verify(&record).await;
        if status != record.status {
            let cached = self
                .with_repo(move |repo| repo.cache_status(chain_id, agreement_id, status))
                .await;
            if let Err(e) = cached {
                warn!(error = %e, "Failed to cache verified status");
            }
        }
        Ok(record.report(status))
    }

    /// Terminally marks the key disputed.
    #[instrument(skip(self))]
    pub async fn mark_disputed(
        &self,
        chain_id: u64,
        agreement_id: u64,
        reason: Option<&str>,
    ) -> Result<StatusReport> {
        let stored = reason.map(str::to_string);
        self.with_repo(move |repo| {
            repo.mark_disputed(chain_id, agreement_id, stored.as_deref())
        })
        .await?;
        info!("Attestation disputed");
        let mut report = StatusReport::bare(chain_id, agreement_id, TaskStatus::Disputed);
        report.dispute_reason = reason.map(str::to_string);
        Ok(report)
    }

    async fn verify(&self, record: &TaskRecord) -> TaskStatus {
        let completion = match record.report(TaskStatus::Pending).completion() {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "Incomplete record");
                return TaskStatus::Pending;
            }
        };
        if !completion.is_signed_by_worker() {
            debug!(worker = ?completion.worker, "Signature does not recover to worker");
            return TaskStatus::Pending;
        }

        let read = self
            .reader
            .read(completion.target, completion.key_word());
        match timeout(self.read_timeout, read).await {
            Ok(Ok(live)) if live == completion.value_word() => TaskStatus::Completed,
            Ok(Ok(live)) => {
                debug!(%live, claimed = %completion.value, "Target state does not match claim");
                TaskStatus::Pending
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Target state read failed");
                TaskStatus::Pending
            }
            Err(_) => {
                warn!(timeout = ?self.read_timeout, "Target state read timed out");
                TaskStatus::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Address, H256, U256};
    use k256::ecdsa::SigningKey;
    use parking_lot::Mutex;
    use vescrow_core::attestation::{
        address_of, canonical_message, sign_message, signature_hex, Numeric,
    };
    use vescrow_core::state::StateBook;

    use super::*;
    use crate::error::StoreError;
    use crate::reader::SharedStateReader;

    const CHAIN_ID: u64 = 31337;

    struct FailingReader;

    #[async_trait::async_trait]
    impl ExternalStateReader for FailingReader {
        async fn read(&self, _target: Address, _key: U256) -> Result<U256> {
            Err(StoreError::ChainRead("connection refused".into()))
        }
    }

    struct SlowReader;

    #[async_trait::async_trait]
    impl ExternalStateReader for SlowReader {
        async fn read(&self, _target: Address, _key: U256) -> Result<U256> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(U256::from(42))
        }
    }

    fn target() -> Address {
        Address::repeat_byte(0x77)
    }

    fn claim(agreement_id: u64, value: &str) -> ClaimRequest {
        let key = SigningKey::from_slice(&[0x11; 32]).unwrap();
        let tx_hash = H256::repeat_byte(0x0a);
        let message =
            canonical_message(CHAIN_ID, agreement_id, target(), "1", value, tx_hash, 1_000);
        let signature = sign_message(&key, &message).unwrap();
        ClaimRequest {
            chain_id: Numeric::Int(CHAIN_ID),
            agreement_id: Numeric::Int(agreement_id),
            worker: format!("{:#x}", address_of(&key)),
            tx_hash: format!("{tx_hash:#x}"),
            completed_at: Numeric::Int(1_000),
            target: format!("{:#x}", target()),
            key: "1".into(),
            value: value.into(),
            signature: signature_hex(&signature),
        }
    }

    fn store_with_state(value: u64) -> AttestationStore {
        let mut book = StateBook::new();
        book.set(target(), U256::from(1), U256::from(value));
        let reader = SharedStateReader::new(Arc::new(Mutex::new(book)));
        store_with(Arc::new(reader))
    }

    fn store_with(reader: Arc<dyn ExternalStateReader>) -> AttestationStore {
        AttestationStore::new(
            TaskRepository::open_in_memory().unwrap(),
            reader,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn unknown_key_is_pending() {
        let store = store_with_state(42);
        let report = store.read_status(CHAIN_ID, 1).await.unwrap();
        assert_eq!(report, StatusReport::bare(CHAIN_ID, 1, TaskStatus::Pending));
    }

    #[tokio::test]
    async fn verified_claim_is_completed() {
        let store = store_with_state(42);
        let stored = store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);

        let report = store.read_status(CHAIN_ID, 1).await.unwrap();
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.value.as_deref(), Some("42"));
        assert!(report.completion().unwrap().is_signed_by_worker());
    }

    #[tokio::test]
    async fn mismatched_state_is_pending() {
        let store = store_with_state(41);
        store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn tampered_claims_are_pending() {
        let store = store_with_state(42);

        let mut wrong_worker = claim(1, "42");
        wrong_worker.worker = format!("{:#x}", Address::repeat_byte(0x99));
        store.record_completion(&wrong_worker).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Pending
        );

        let mut wrong_signature = claim(2, "42");
        wrong_signature.signature = claim(3, "42").signature;
        store.record_completion(&wrong_signature).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 2).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn read_failures_fail_closed() {
        let store = store_with(Arc::new(FailingReader));
        store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Pending
        );

        let store = store_with(Arc::new(SlowReader));
        store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn dispute_is_never_overridden() {
        let store = store_with_state(42);
        store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Completed
        );

        store.mark_disputed(CHAIN_ID, 1, Some("fraud")).await.unwrap();
        let report = store.read_status(CHAIN_ID, 1).await.unwrap();
        assert_eq!(report.status, TaskStatus::Disputed);
        assert_eq!(report.dispute_reason.as_deref(), Some("fraud"));

        store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Disputed
        );
    }

    #[tokio::test]
    async fn cached_completion_is_not_trusted() {
        let book = Arc::new(Mutex::new(StateBook::new()));
        book.lock().set(target(), U256::from(1), U256::from(42));
        let store = store_with(Arc::new(SharedStateReader::new(book.clone())));

        store.record_completion(&claim(1, "42")).await.unwrap();
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Completed
        );

        // target state moves on; the cached `completed` must not be served
        book.lock().set(target(), U256::from(1), U256::from(0));
        assert_eq!(
            store.read_status(CHAIN_ID, 1).await.unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn malformed_claim_is_rejected() {
        let store = store_with_state(42);
        let mut bad = claim(1, "42");
        bad.tx_hash = "0x1234".into();
        assert!(matches!(
            store.record_completion(&bad).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_keys_do_not_interfere() {
        let store = Arc::new(store_with_state(42));
        let tasks: Vec<_> = (1..=16u64)
            .map(|id| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let value = if id % 2 == 0 { "42" } else { "41" };
                    store.record_completion(&claim(id, value)).await.unwrap();
                    store.read_status(CHAIN_ID, id).await.unwrap().status
                })
            })
            .collect();

        for (id, task) in (1..=16u64).zip(tasks) {
            let expected = if id % 2 == 0 {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            };
            assert_eq!(task.await.unwrap(), expected, "agreement {id}");
        }
    }
}
