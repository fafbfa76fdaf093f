use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, H256, U256};
use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use vescrow_bridge::{
    Bridge, BridgeError, HttpAttestationSource, LocalReportWriter, ReportWriter,
    SettlementOutcome, SkipReason,
};
use vescrow_core::attestation::{
    address_of, canonical_message, sign_message, signature_hex, ClaimRequest, Numeric, TaskStatus,
};
use vescrow_core::token::{Balances, TokenLedger};
use vescrow_core::{
    AgreementState, Condition, ConditionImplRegistry, ConditionKind, FeeConfig, Ledger,
    LedgerConfig, LocalChain, NewAgreement, Receiver,
};
use vescrow_store::api::{self, AppState};
use vescrow_store::reader::SharedStateReader;
use vescrow_store::{AttestationStore, TaskRepository};

const CHAIN_ID: u64 = 31337;
const START: u64 = 1_700_000_000;
const HOUR: u64 = 3_600;
const STATE_EQUALS: u8 = 2;
const KEY: u64 = 1;
const VALUE: u64 = 7;

fn payer() -> Address {
    Address::repeat_byte(0x01)
}

fn payee() -> Address {
    Address::repeat_byte(0x02)
}

fn asset() -> Address {
    Address::repeat_byte(0xaa)
}

fn target() -> Address {
    Address::repeat_byte(0x77)
}

fn bridge_sender() -> Address {
    Address::repeat_byte(0xb0)
}

fn worker_key() -> SigningKey {
    SigningKey::from_slice(&[0x42; 32]).unwrap()
}

/// Counts writes reaching the receiver.
struct CountingWriter {
    inner: LocalReportWriter,
    writes: AtomicUsize,
}

#[async_trait::async_trait]
impl ReportWriter for CountingWriter {
    async fn submit(&self, payload: Vec<u8>) -> vescrow_bridge::Result<H256> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(payload).await
    }
}

struct Harness {
    chain: Arc<Mutex<LocalChain>>,
    store_url: String,
    writer: Arc<CountingWriter>,
    bridge: Bridge,
    agreement_id: u64,
}

fn local_chain() -> LocalChain {
    let mut conditions = ConditionImplRegistry::new();
    conditions.set(STATE_EQUALS, Some(ConditionKind::StateEquals));
    let config = LedgerConfig {
        owner: Address::repeat_byte(0x0f),
        fee: FeeConfig {
            fee_bps: 0,
            recipient: Address::repeat_byte(0x03),
        },
        conditions,
    };
    let mut tokens = Balances::new();
    tokens.mint(asset(), payer(), 100).unwrap();

    let ledger = Ledger::new(Address::repeat_byte(0xee), config, tokens);
    let receiver = Receiver::new(Address::repeat_byte(0xc0), bridge_sender());
    LocalChain::new(CHAIN_ID, START, ledger, receiver)
}

async fn harness() -> Harness {
    let mut chain = local_chain();
    let agreement_id = chain
        .create_agreement(
            payer(),
            NewAgreement {
                payee: payee(),
                asset: asset(),
                amount: 100,
                deadline: START + HOUR,
                condition: Condition::state_equals(
                    STATE_EQUALS,
                    target(),
                    U256::from(KEY),
                    U256::from(VALUE),
                ),
            },
        )
        .unwrap();
    chain.deposit(payer(), agreement_id).unwrap();
    let chain = Arc::new(Mutex::new(chain));

    let store = AttestationStore::new(
        TaskRepository::open_in_memory().unwrap(),
        Arc::new(SharedStateReader::new(chain.clone())),
        Duration::from_secs(1),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let store_url = format!("http://{}", listener.local_addr().unwrap());
    let state = AppState {
        store: Arc::new(store),
    };
    tokio::spawn(api::serve(listener, state, 64 * 1024, std::future::pending()));

    let writer = Arc::new(CountingWriter {
        inner: LocalReportWriter::new(chain.clone(), bridge_sender()),
        writes: AtomicUsize::new(0),
    });
    let source = HttpAttestationSource::new(&store_url, Duration::from_secs(2)).unwrap();
    let bridge = Bridge::new(CHAIN_ID, Arc::new(source), writer.clone());

    Harness {
        chain,
        store_url,
        writer,
        bridge,
        agreement_id,
    }
}

fn claim(agreement_id: u64, signer: &SigningKey) -> ClaimRequest {
    let tx_hash = H256::repeat_byte(0x0b);
    let completed_at = START + 60;
    let key = KEY.to_string();
    let value = VALUE.to_string();
    let message = canonical_message(
        CHAIN_ID,
        agreement_id,
        target(),
        &key,
        &value,
        tx_hash,
        completed_at,
    );
    let signature = sign_message(signer, &message).unwrap();
    ClaimRequest {
        chain_id: Numeric::Int(CHAIN_ID),
        agreement_id: Numeric::Int(agreement_id),
        worker: format!("{:#x}", address_of(&worker_key())),
        tx_hash: format!("{tx_hash:#x}"),
        completed_at: Numeric::Int(completed_at),
        target: format!("{:#x}", target()),
        key,
        value,
        signature: signature_hex(&signature),
    }
}

async fn post_claim(store_url: &str, claim: &ClaimRequest) {
    let response = reqwest::Client::new()
        .post(format!("{store_url}/tasks/complete"))
        .json(claim)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

fn agreement_state(chain: &Mutex<LocalChain>, id: u64) -> AgreementState {
    chain.lock().ledger().agreement(id).unwrap().state
}

fn balance(chain: &Mutex<LocalChain>, holder: Address) -> u128 {
    chain.lock().ledger().tokens().balance_of(asset(), holder)
}

#[tokio::test]
async fn settles_verified_completion_once() {
    let h = harness().await;
    let id = h.agreement_id;

    h.chain
        .lock()
        .set_state(target(), U256::from(KEY), U256::from(VALUE));
    post_claim(&h.store_url, &claim(id, &worker_key())).await;

    // creation and deposit both signal the same agreement
    let signals = h.chain.lock().signals();
    assert_eq!(signals, vec![id, id]);

    let first = h.bridge.process(signals[0]).await.unwrap();
    assert!(first.is_submitted());
    assert_eq!(agreement_state(&h.chain, id), AgreementState::Completed);
    assert_eq!(balance(&h.chain, payee()), 100);

    // re-delivery writes again but pays nothing
    let second = h.bridge.process(signals[1]).await.unwrap();
    assert!(second.is_submitted());
    assert_eq!(h.writer.writes.load(Ordering::SeqCst), 2);
    assert_eq!(balance(&h.chain, payee()), 100);
    assert_eq!(agreement_state(&h.chain, id), AgreementState::Completed);
}

#[tokio::test]
async fn concurrent_signals_pay_out_once() {
    let h = harness().await;
    let id = h.agreement_id;
    h.chain
        .lock()
        .set_state(target(), U256::from(KEY), U256::from(VALUE));
    post_claim(&h.store_url, &claim(id, &worker_key())).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let bridge = h.bridge.clone();
            tokio::spawn(async move { bridge.process(id).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_submitted());
    }

    assert_eq!(balance(&h.chain, payee()), 100);
    assert_eq!(balance(&h.chain, payer()), 0);
}

#[tokio::test]
async fn forged_signature_is_skipped() {
    let h = harness().await;
    let id = h.agreement_id;
    h.chain
        .lock()
        .set_state(target(), U256::from(KEY), U256::from(VALUE));

    let impostor = SigningKey::from_slice(&[0x43; 32]).unwrap();
    post_claim(&h.store_url, &claim(id, &impostor)).await;

    let outcome = h.bridge.process(id).await.unwrap();
    assert_eq!(
        outcome,
        SettlementOutcome::Skipped {
            agreement_id: Some(id),
            reason: SkipReason::NotCompleted(TaskStatus::Pending),
        }
    );
    assert_eq!(h.writer.writes.load(Ordering::SeqCst), 0);
    assert_eq!(agreement_state(&h.chain, id), AgreementState::Funded);
}

#[tokio::test]
async fn claim_without_external_state_is_skipped() {
    let h = harness().await;
    let id = h.agreement_id;
    post_claim(&h.store_url, &claim(id, &worker_key())).await;

    let outcome = h.bridge.process(id).await.unwrap();
    assert!(!outcome.is_submitted());
    assert_eq!(h.writer.writes.load(Ordering::SeqCst), 0);
    assert_eq!(agreement_state(&h.chain, id), AgreementState::Funded);
}

#[tokio::test]
async fn refund_after_deadline_without_claim() {
    let h = harness().await;
    let id = h.agreement_id;

    let outcome = h.bridge.process(id).await.unwrap();
    assert_eq!(
        outcome,
        SettlementOutcome::Skipped {
            agreement_id: Some(id),
            reason: SkipReason::NotCompleted(TaskStatus::Pending),
        }
    );

    let mut chain = h.chain.lock();
    chain.advance(HOUR + 1);
    chain.refund(payer(), id).unwrap();
    assert_eq!(
        chain.ledger().agreement(id).unwrap().state,
        AgreementState::Refunded
    );
    assert_eq!(chain.ledger().tokens().balance_of(asset(), payer()), 100);
}

#[tokio::test]
async fn unreachable_store_is_a_skip() {
    let chain = Arc::new(Mutex::new(local_chain()));
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let store_url = format!("http://{closed}");
    let source = HttpAttestationSource::new(&store_url, Duration::from_millis(500)).unwrap();
    let bridge = Bridge::new(
        CHAIN_ID,
        Arc::new(source),
        Arc::new(LocalReportWriter::new(chain, bridge_sender())),
    );

    assert_eq!(
        bridge.process(1).await.unwrap(),
        SettlementOutcome::Skipped {
            agreement_id: Some(1),
            reason: SkipReason::AttestationUnavailable,
        }
    );
}

#[tokio::test]
async fn receiver_rejects_unauthorized_writer() {
    let h = harness().await;
    let id = h.agreement_id;
    h.chain
        .lock()
        .set_state(target(), U256::from(KEY), U256::from(VALUE));
    post_claim(&h.store_url, &claim(id, &worker_key())).await;

    let rogue = Bridge::new(
        CHAIN_ID,
        Arc::new(HttpAttestationSource::new(&h.store_url, Duration::from_secs(2)).unwrap()),
        Arc::new(LocalReportWriter::new(h.chain.clone(), payee())),
    );
    assert!(matches!(
        rogue.process(id).await,
        Err(BridgeError::Rejected(_))
    ));
    assert_eq!(agreement_state(&h.chain, id), AgreementState::Funded);

    assert!(h.bridge.process(id).await.unwrap().is_submitted());
    assert_eq!(balance(&h.chain, payee()), 100);
}
