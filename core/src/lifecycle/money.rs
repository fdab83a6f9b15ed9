// tradeflow/src/lifecycle/money.rs

//! Integer money arithmetic. All amounts are minor units (cents).

use serde::{Deserialize, Serialize};

use crate::lifecycle::error::{LifecycleError, LifecycleResult};

/// The deposit and the balance left to pay for a deposit-plan order.
///
/// `balance_due_cents + deposit_cents == total` holds for every value built by
/// [`DepositSplit::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSplit {
  pub total_cents: i64,
  pub deposit_cents: i64,
  pub balance_due_cents: i64,
}

impl DepositSplit {
  /// Deposit is `total * percentage / 100`, rounded half up to the cent.
  pub fn compute(total_cents: i64, percentage: i32) -> LifecycleResult<Self> {
    if total_cents < 0 {
      return Err(LifecycleError::Validation(format!(
        "order total must not be negative (got {total_cents})"
      )));
    }
    if !(0..=100).contains(&percentage) {
      return Err(LifecycleError::Validation(format!(
        "deposit percentage must be between 0 and 100 (got {percentage})"
      )));
    }

    let scaled = i128::from(total_cents) * i128::from(percentage);
    let deposit = (scaled + 50) / 100;
    // deposit <= total, so this always fits
    let deposit_cents = i64::try_from(deposit)
      .map_err(|_| LifecycleError::Validation("deposit amount overflow".to_string()))?;

    Ok(Self {
      total_cents,
      deposit_cents,
      balance_due_cents: total_cents - deposit_cents,
    })
  }
}

/// `unit_price * quantity`, failing instead of wrapping.
pub fn line_total(unit_price_cents: i64, quantity: i32) -> LifecycleResult<i64> {
  if quantity < 1 {
    return Err(LifecycleError::Validation(format!(
      "quantity must be at least 1 (got {quantity})"
    )));
  }
  if unit_price_cents < 0 {
    return Err(LifecycleError::Validation(format!(
      "unit price must not be negative (got {unit_price_cents})"
    )));
  }
  unit_price_cents
    .checked_mul(i64::from(quantity))
    .ok_or_else(|| LifecycleError::Validation("line total overflows".to_string()))
}

/// Sum of line totals, failing on overflow.
pub fn sum_cents<I: IntoIterator<Item = i64>>(amounts: I) -> LifecycleResult<i64> {
  amounts.into_iter().try_fold(0i64, |acc, amount| {
    acc
      .checked_add(amount)
      .ok_or_else(|| LifecycleError::Validation("order total overflows".to_string()))
  })
}
