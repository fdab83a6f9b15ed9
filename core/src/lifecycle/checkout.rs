// tradeflow/src/lifecycle/checkout.rs

//! Order drafts: the order and its item snapshots, built from either an
//! accepted quote or a direct catalogue purchase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::machine::Lifecycle;
use crate::lifecycle::money::{line_total, sum_cents, DepositSplit};
use crate::lifecycle::order::{Order, OrderItem};
use crate::lifecycle::payment::PaymentPlan;
use crate::lifecycle::quote::{Quote, QuoteStatus};
use crate::lifecycle::rfq::{Rfq, RfqStatus};

/// One line of a direct purchase, with the catalogue values it was priced
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectLine {
  pub product_id: Uuid,
  pub supplier_id: Option<Uuid>,
  pub quantity: i32,
  pub unit_price_cents: i64,
  pub min_order_quantity: i32,
  pub stock_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDraft {
  pub order: Order,
  pub items: Vec<OrderItem>,
}

impl OrderDraft {
  /// Builds the order for an accepted quote and converts the RFQ.
  ///
  /// `rfq` is mutated to `converted`; the caller persists both in one commit.
  pub fn from_quote(
    rfq: &mut Rfq,
    quote: &Quote,
    buyer_id: Uuid,
    plan: PaymentPlan,
    now: DateTime<Utc>,
  ) -> LifecycleResult<Self> {
    if rfq.buyer_id != buyer_id {
      return Err(LifecycleError::NotParty {
        entity: RfqStatus::ENTITY,
        id: rfq.id,
        user_id: buyer_id,
      });
    }
    if quote.rfq_id != rfq.id {
      return Err(LifecycleError::Validation(format!(
        "quote {} does not belong to RFQ {}",
        quote.id, rfq.id
      )));
    }
    if quote.status != QuoteStatus::Accepted {
      return Err(LifecycleError::Validation(format!(
        "quote {} is '{}', only accepted quotes can be checked out",
        quote.id, quote.status
      )));
    }
    match rfq.status {
      RfqStatus::Accepted => {}
      other => {
        return Err(LifecycleError::Closed {
          entity: RfqStatus::ENTITY,
          id: rfq.id,
          status: other.as_str(),
        })
      }
    }
    if plan == PaymentPlan::Deposit && quote.deposit_percentage <= 0 {
      return Err(LifecycleError::Validation(
        "this quote does not offer a deposit plan".to_string(),
      ));
    }

    let mut order = Order::new(buyer_id, quote.total_price_cents, plan, now);
    order.rfq_id = Some(rfq.id);
    order.quote_id = Some(quote.id);
    if plan == PaymentPlan::Deposit {
      let split = DepositSplit::compute(quote.total_price_cents, quote.deposit_percentage)?;
      order.deposit_amount_cents = Some(split.deposit_cents);
      order.balance_due_cents = Some(split.balance_due_cents);
    }

    let item = OrderItem {
      id: Uuid::new_v4(),
      order_id: order.id,
      product_id: rfq.product_id,
      supplier_id: Some(quote.supplier_id),
      quantity: quote.agreed_quantity,
      unit_price_cents: quote.unit_price_cents,
    };

    rfq.transition(RfqStatus::Converted, now)?;

    Ok(Self {
      order,
      items: vec![item],
    })
  }

  /// Builds an order for a direct purchase. Only `full` and `escrow` plans
  /// apply; deposits are negotiated through quotes.
  pub fn direct(buyer_id: Uuid, lines: &[DirectLine], plan: PaymentPlan, now: DateTime<Utc>) -> LifecycleResult<Self> {
    if lines.is_empty() {
      return Err(LifecycleError::Validation("checkout needs at least one line".to_string()));
    }
    if plan == PaymentPlan::Deposit {
      return Err(LifecycleError::Validation(
        "deposit payment is only available for quoted orders".to_string(),
      ));
    }

    for (idx, line) in lines.iter().enumerate() {
      if lines[..idx].iter().any(|l| l.product_id == line.product_id) {
        return Err(LifecycleError::Validation(format!(
          "product {} appears more than once",
          line.product_id
        )));
      }
      if line.supplier_id == Some(buyer_id) {
        return Err(LifecycleError::Validation(format!(
          "product {} is sold by the buyer",
          line.product_id
        )));
      }
      if line.quantity < line.min_order_quantity.max(1) {
        return Err(LifecycleError::Validation(format!(
          "product {} needs a quantity of at least {} (got {})",
          line.product_id,
          line.min_order_quantity.max(1),
          line.quantity
        )));
      }
      if line.quantity > line.stock_quantity {
        return Err(LifecycleError::Validation(format!(
          "product {} has only {} in stock (requested {})",
          line.product_id, line.stock_quantity, line.quantity
        )));
      }
    }

    let line_totals = lines
      .iter()
      .map(|l| line_total(l.unit_price_cents, l.quantity))
      .collect::<LifecycleResult<Vec<i64>>>()?;
    let total = sum_cents(line_totals)?;

    let order = Order::new(buyer_id, total, plan, now);
    let items = lines
      .iter()
      .map(|line| OrderItem {
        id: Uuid::new_v4(),
        order_id: order.id,
        product_id: line.product_id,
        supplier_id: line.supplier_id,
        quantity: line.quantity,
        unit_price_cents: line.unit_price_cents,
      })
      .collect();

    Ok(Self { order, items })
  }

  pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
    self.order.idempotency_key = key.filter(|k| !k.trim().is_empty());
    self
  }
}
