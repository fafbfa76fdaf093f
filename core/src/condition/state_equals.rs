use ethers_core::types::Address;

use super::{read_word, EvalEnv, Evaluator};

/// External-state condition.
///
/// `data` is two 32-byte big-endian words `(key, value)`; satisfied iff the
/// live state of `target` at `key` equals `value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEquals;

impl Evaluator for StateEquals {
    fn is_satisfied(&self, target: Option<Address>, data: &[u8], env: &EvalEnv<'_>) -> bool {
        let Some(target) = target else {
            return false;
        };
        if data.len() != 64 {
            return false;
        }
        let (Some(key), Some(expected)) = (read_word(data, 0), read_word(data, 1)) else {
            return false;
        };
        env.state
            .value_at(target, key)
            .is_some_and(|live| live == expected)
    }
}
