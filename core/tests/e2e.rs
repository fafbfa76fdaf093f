use ethers_core::types::{Address, U256};
use vescrow_core::error::{LedgerError, ReceiverError};
use vescrow_core::receiver::encode_report;
use vescrow_core::token::{Balances, TokenLedger};
use vescrow_core::{
    AgreementState, Condition, ConditionImplRegistry, ConditionKind, Execution, FeeConfig, Ledger,
    LedgerConfig, LocalChain, NewAgreement, Receiver, SkipReason,
};

const CHAIN_ID: u64 = 31337;
const START: u64 = 1_700_000_000;
const HOUR: u64 = 3_600;
const STATE_EQUALS: u8 = 2;

fn assert_err<T: std::fmt::Debug, E>(res: std::result::Result<T, E>, expected: E)
where
    E: std::fmt::Debug + PartialEq,
{
    match res {
        Err(e) => assert_eq!(e, expected),
        Ok(v) => panic!("Expected error, got Ok({v:?})"),
    }
}

struct Actors {
    payer: Address,
    payee: Address,
    bridge: Address,
    asset: Address,
    target: Address,
}

fn actors() -> Actors {
    Actors {
        payer: Address::repeat_byte(0x01),
        payee: Address::repeat_byte(0x02),
        bridge: Address::repeat_byte(0xb0),
        asset: Address::repeat_byte(0xaa),
        target: Address::repeat_byte(0x77),
    }
}

fn chain(a: &Actors) -> LocalChain {
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
    tokens.mint(a.asset, a.payer, 100).unwrap();

    let ledger = Ledger::new(Address::repeat_byte(0xee), config, tokens);
    let receiver = Receiver::new(Address::repeat_byte(0xc0), a.bridge);
    LocalChain::new(CHAIN_ID, START, ledger, receiver)
}

fn funded_agreement(chain: &mut LocalChain, a: &Actors) -> u64 {
    let id = chain
        .create_agreement(
            a.payer,
            NewAgreement {
                payee: a.payee,
                asset: a.asset,
                amount: 100,
                deadline: START + HOUR,
                condition: Condition::state_equals(
                    STATE_EQUALS,
                    a.target,
                    U256::from(1),
                    U256::from(7),
                ),
            },
        )
        .unwrap();
    chain.deposit(a.payer, id).unwrap();
    id
}

#[test]
fn settles_once_external_state_matches() {
    let a = actors();
    let mut chain = chain(&a);
    let id = funded_agreement(&mut chain, &a);
    assert_eq!(chain.signals(), vec![id, id]);

    // state not yet written: report is a cost-free skip
    assert_eq!(
        chain.submit_report(a.bridge, &encode_report(id)),
        Ok(Execution::Skipped(SkipReason::ConditionNotSatisfied))
    );

    chain.set_state(a.target, U256::from(1), U256::from(7));
    assert!(chain
        .submit_report(a.bridge, &encode_report(id))
        .unwrap()
        .is_executed());
    assert_eq!(
        chain.ledger().agreement(id).unwrap().state,
        AgreementState::Completed
    );
    assert_eq!(chain.ledger().tokens().balance_of(a.asset, a.payee), 100);

    // duplicate delivery pays nothing
    assert_eq!(
        chain.submit_report(a.bridge, &encode_report(id)),
        Ok(Execution::Skipped(SkipReason::NotFunded))
    );
    assert_eq!(chain.ledger().tokens().balance_of(a.asset, a.payee), 100);
}

#[test]
fn unauthorized_report_changes_nothing() {
    let a = actors();
    let mut chain = chain(&a);
    let id = funded_agreement(&mut chain, &a);
    chain.set_state(a.target, U256::from(1), U256::from(7));

    assert_err(
        chain.submit_report(a.payee, &encode_report(id)),
        ReceiverError::UnauthorizedSender(a.payee),
    );
    assert_eq!(
        chain.ledger().agreement(id).unwrap().state,
        AgreementState::Funded
    );
}

#[test]
fn refunds_after_deadline_without_claim() {
    let a = actors();
    let mut chain = chain(&a);
    let id = funded_agreement(&mut chain, &a);
    assert_eq!(chain.ledger().tokens().balance_of(a.asset, a.payer), 0);

    assert_err(
        chain.refund(a.payer, id),
        LedgerError::DeadlineNotPassed {
            deadline: START + HOUR,
            now: START,
        },
    );

    chain.advance(HOUR + 1);
    chain.set_state(a.target, U256::from(1), U256::from(7));
    assert_eq!(
        chain.execute_if_satisfied(a.payee, id),
        Ok(Execution::Skipped(SkipReason::DeadlinePassed))
    );

    chain.refund(a.payer, id).unwrap();
    assert_eq!(
        chain.ledger().agreement(id).unwrap().state,
        AgreementState::Refunded
    );
    assert_eq!(chain.ledger().tokens().balance_of(a.asset, a.payer), 100);
    assert_err(
        chain.refund(a.payer, id),
        LedgerError::InvalidState {
            id,
            state: AgreementState::Refunded,
        },
    );
}
