//! Pure coin-ledger rules (spec §4.6), grounded on
//! `repository.py::add_transaction`/`purchase_reward`. Shared by
//! `store::mock::MockStore` and `store::sqlx_store::SqlxStore` so both
//! backends apply identical clamp/precondition logic around their own
//! I/O.

use crate::error::EngineError;
use crate::model::Reward;

/// Computes the new balance for a non-purchase credit/debit. Positive
/// amounts always apply unconditionally. Negative amounts clamp at zero
/// unless `allow_negative_balance` is set.
pub fn apply_signed_amount(current: i64, amount: i64, allow_negative_balance: bool) -> i64 {
    let new_balance = current + amount;
    if amount < 0 && !allow_negative_balance {
        new_balance.max(0)
    } else {
        new_balance
    }
}

/// Validates a reward purchase's preconditions against the current
/// balance, in the order spec §4.6/§9 specifies. Does not mutate
/// anything; callers apply the debit themselves inside their own
/// transaction once this returns `Ok`.
pub fn check_purchase_preconditions(reward: &Reward, balance: i64) -> Result<(), EngineError> {
    use crate::model::RewardType;

    if !reward.is_active {
        return Err(EngineError::PreconditionFailed("unavailable".into()));
    }

    if reward.reward_type == RewardType::Limited && reward.remaining_count == Some(0) {
        return Err(EngineError::PreconditionFailed("sold out".into()));
    }

    if balance < reward.price {
        return Err(EngineError::PreconditionFailed("insufficient".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use uuid::Uuid;

    fn reward(price: i64, active: bool) -> Reward {
        Reward {
            id: Uuid::new_v4(),
            name: "Movie night".into(),
            description: None,
            price,
            reward_type: crate::model::RewardType::Single,
            remaining_count: None,
            initial_count: None,
            is_active: active,
            created_at: Local::now(),
        }
    }

    #[test]
    fn credit_applies_unconditionally() {
        assert_eq!(apply_signed_amount(10, 5, false), 15);
    }

    #[test]
    fn debit_clamps_at_zero_when_disallowed() {
        assert_eq!(apply_signed_amount(3, -10, false), 0);
    }

    #[test]
    fn debit_goes_negative_when_allowed() {
        assert_eq!(apply_signed_amount(3, -10, true), -7);
    }

    #[test]
    fn purchase_fails_insufficient_funds() {
        let r = reward(50, true);
        assert!(matches!(
            check_purchase_preconditions(&r, 40),
            Err(EngineError::PreconditionFailed(msg)) if msg == "insufficient"
        ));
    }

    #[test]
    fn purchase_succeeds_at_exact_balance() {
        let r = reward(50, true);
        assert!(check_purchase_preconditions(&r, 50).is_ok());
    }

    #[test]
    fn purchase_fails_inactive_reward() {
        let r = reward(10, false);
        assert!(matches!(
            check_purchase_preconditions(&r, 1000),
            Err(EngineError::PreconditionFailed(msg)) if msg == "unavailable"
        ));
    }
}
