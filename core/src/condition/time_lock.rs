use ethers_core::types::{Address, U256};

use super::{read_word, EvalEnv, Evaluator};

/// Time-based condition.
///
/// `data` is a single 32-byte big-endian timestamp; satisfied iff
/// `now >= timestamp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeLock;

impl Evaluator for TimeLock {
    fn is_satisfied(&self, _target: Option<Address>, data: &[u8], env: &EvalEnv<'_>) -> bool {
        if data.len() != 32 {
            return false;
        }
        read_word(data, 0).is_some_and(|unlock_at| U256::from(env.now) >= unlock_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::state::StateBook;

    fn check(cond: &Condition, now: u64) -> bool {
        let state = StateBook::new();
        let env = EvalEnv { now, state: &state };
        TimeLock.is_satisfied(cond.target, &cond.data, &env)
    }

    #[test]
    fn unlocks_at_timestamp() {
        let cond = Condition::time_lock(1, 1_000);
        assert!(!check(&cond, 999));
        assert!(check(&cond, 1_000));
        assert!(check(&cond, 5_000));
    }

    #[test]
    fn malformed_data_never_satisfies() {
        let mut cond = Condition::time_lock(1, 0);
        cond.data.pop();
        assert!(!check(&cond, u64::MAX));

        cond.data = vec![0u8; 64];
        assert!(!check(&cond, u64::MAX));
    }
}
