// apps/marketplace/src/pipelines/negotiation_pipeline.rs

//! Accept, reject, counter and revise. The four flows share the load, persist
//! and notify steps; each adds a single step that applies its action.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Actor, Role};
use crate::pipelines::common_steps::{loaded, materialize_expiry, notify_step};
use crate::pipelines::contexts::{AcceptQuote, CounterQuote, NegotiationCtxData, RejectQuote, ReviseQuote};
use crate::state::AppState;
use tradeflow::lifecycle::quote::SIBLING_ACCEPTED_REASON;
use tradeflow::{
  ContextData, FlowRegistry, Lifecycle, LifecycleError, NegotiationLog, Pipeline, PipelineControl, Quote, QuoteStatus,
  RevisionKind, Rfq, RfqStatus, SkipCondition,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// A negotiation action on one quote.
pub trait QuoteAction: Clone + Send + Sync + 'static {
  const FLOW: &'static str;
  /// The side of the RFQ allowed to take this action.
  const PARTY: Role;
  /// Past tense used in log lines and notifications.
  const VERB: &'static str;
}

impl QuoteAction for AcceptQuote {
  const FLOW: &'static str = "accept_quote";
  const PARTY: Role = Role::Buyer;
  const VERB: &'static str = "accepted";
}

impl QuoteAction for RejectQuote {
  const FLOW: &'static str = "reject_quote";
  const PARTY: Role = Role::Buyer;
  const VERB: &'static str = "rejected";
}

impl QuoteAction for CounterQuote {
  const FLOW: &'static str = "counter_quote";
  const PARTY: Role = Role::Buyer;
  const VERB: &'static str = "countered";
}

impl QuoteAction for ReviseQuote {
  const FLOW: &'static str = "revise_quote";
  const PARTY: Role = Role::Supplier;
  const VERB: &'static str = "revised";
}

fn ensure_party<A: QuoteAction>(actor: &Actor, rfq: &Rfq, quote: &Quote) -> AppResult<()> {
  actor.require(&[A::PARTY])?;
  let owner = match A::PARTY {
    Role::Supplier => quote.supplier_id,
    _ => rfq.buyer_id,
  };
  if owner == actor.user_id {
    Ok(())
  } else {
    Err(
      LifecycleError::NotParty {
        entity: QuoteStatus::ENTITY,
        id: quote.id,
        user_id: actor.user_id,
      }
      .into(),
    )
  }
}

#[instrument(name = "negotiation_step::load", skip(ctx_data), fields(flow = A::FLOW), err)]
async fn load_negotiation<A: QuoteAction>(ctx_data: ContextData<NegotiationCtxData<A>>) -> AppResult<PipelineControl> {
  let (app_state, quote_id, actor, now) = {
    let guard = ctx_data.read();
    (guard.app_state.clone(), guard.quote_id, guard.actor, guard.now)
  };
  let quote = app_state.store.get_quote(quote_id).await?;
  let mut rfq = app_state.store.get_rfq(quote.rfq_id).await?;
  ensure_party::<A>(&actor, &rfq, &quote)?;

  materialize_expiry(&app_state, &mut rfq, now).await?;
  let siblings: Vec<Quote> = app_state
    .store
    .list_quotes(rfq.id)
    .await?
    .into_iter()
    .filter(|q| q.id != quote.id)
    .collect();
  let log = NegotiationLog::from_revisions(rfq.id, app_state.store.list_revisions(rfq.id).await?)?;

  ctx_data.update(|data| {
    data.rfq = Some(rfq);
    data.quote = Some(quote);
    data.siblings = siblings;
    data.log = Some(log);
  });
  Ok(PipelineControl::Continue)
}

/// The shared skeleton: load, `<apply_step>`, persist and, when `notify` is
/// set, an optional notification of `notify_user`.
fn negotiation_pipeline<A: QuoteAction>(
  apply_step: &str,
  persist_step: &str,
  notify_step_name: Option<&str>,
) -> Pipeline<NegotiationCtxData<A>, AppError> {
  let skip_without_recipient: SkipCondition<NegotiationCtxData<A>> =
    Arc::new(|ctx_data: ContextData<NegotiationCtxData<A>>| ctx_data.with(|d| d.notify_user.is_none()));

  let mut steps = vec![
    ("load_negotiation", false, None),
    (apply_step, false, None),
    (persist_step, false, None),
  ];
  if let Some(name) = notify_step_name {
    steps.push((name, true, Some(skip_without_recipient)));
  }
  let mut p = Pipeline::<NegotiationCtxData<A>, AppError>::new(A::FLOW, &steps);

  p.on_root("load_negotiation", load_negotiation::<A>);

  p.on_root(persist_step, |ctx_data: ContextData<NegotiationCtxData<A>>| {
    Box::pin(async move {
      let (store, changes, quote_id) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), guard.changes.clone(), guard.quote_id)
      };
      let writes = changes.len();
      store.commit(changes).await?;
      info!("Negotiation Flow (Quote {}): {} persisted with {} writes.", quote_id, A::VERB, writes);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  if let Some(name) = notify_step_name {
    p.on_root(name, |ctx_data: ContextData<NegotiationCtxData<A>>| {
      Box::pin(async move {
        let (app_state, to_user, quote, now) = {
          let guard = ctx_data.read();
          (
            guard.app_state.clone(),
            guard.notify_user,
            loaded(&guard.quote, "quote")?,
            guard.now,
          )
        };
        let Some(to_user) = to_user else {
          return Ok(PipelineControl::Continue);
        };
        notify_step(
          &app_state,
          to_user,
          &format!("Quote {} {}", quote.id, A::VERB),
          &format!(
            "Quote {} on RFQ {} is now {} at {} cents per unit (revision {}).",
            quote.id, quote.rfq_id, quote.status, quote.unit_price_cents, quote.revision
          ),
          now,
        )
        .await
      })
    });
  }

  p
}

fn register_accept(flows: &FlowRegistry<AppError>) {
  let mut p = negotiation_pipeline::<AcceptQuote>("guard_acceptance", "persist_acceptance", Some("notify_supplier"));

  p.on_root("guard_acceptance", |ctx_data: ContextData<NegotiationCtxData<AcceptQuote>>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let now = data.now;
      let buyer_id = data.actor.user_id;
      let mut rfq = loaded(&data.rfq, "rfq")?;
      let mut quote = loaded(&data.quote, "quote")?;
      let mut log = loaded(&data.log, "negotiation log")?;

      quote.accept(&rfq, now)?;
      rfq.transition(RfqStatus::Accepted, now)?;

      // the RFQ row goes first: it is the version two concurrent accepts race on
      data.changes.update_rfq(&mut rfq);
      data.changes.update_quote(&mut quote);
      let accepted = log.record(&quote, RevisionKind::Accepted, buyer_id, None, now);
      data.changes.append_revision(accepted);

      let mut withdrawn = 0;
      for sibling in data.siblings.iter_mut() {
        if sibling.withdraw_for_sibling(now)? {
          let revision = log.record(
            sibling,
            RevisionKind::Rejected,
            buyer_id,
            Some(SIBLING_ACCEPTED_REASON.to_string()),
            now,
          );
          data.changes.update_quote(sibling);
          data.changes.append_revision(revision);
          withdrawn += 1;
        }
      }
      info!(
        "Negotiation Flow (RFQ {}): quote {} accepted, {} competing quotes withdrawn.",
        rfq.id, quote.id, withdrawn
      );

      data.notify_user = Some(quote.supplier_id);
      data.rfq = Some(rfq);
      data.quote = Some(quote);
      data.log = Some(log);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_reject(flows: &FlowRegistry<AppError>) {
  let mut p = negotiation_pipeline::<RejectQuote>("apply_rejection", "persist_rejection", None);

  p.on_root("apply_rejection", |ctx_data: ContextData<NegotiationCtxData<RejectQuote>>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let now = data.now;
      let mut rfq = loaded(&data.rfq, "rfq")?;
      let mut quote = loaded(&data.quote, "quote")?;
      let mut log = loaded(&data.log, "negotiation log")?;
      let reason = data.action.reason.clone();

      quote.reject(&reason, now)?;

      // rejecting the last open quote rejects the request itself
      let others_live = data.siblings.iter().any(|q| q.is_live());
      if !others_live && rfq.effective_status(now) == RfqStatus::Quoted {
        rfq.transition(RfqStatus::Rejected, now)?;
        data.changes.update_rfq(&mut rfq);
        info!("Negotiation Flow (RFQ {}): last open quote rejected, RFQ rejected.", rfq.id);
      }
      data.changes.update_quote(&mut quote);
      let revision = log.record(
        &quote,
        RevisionKind::Rejected,
        data.actor.user_id,
        quote.rejection_reason.clone(),
        now,
      );
      data.changes.append_revision(revision);

      data.rfq = Some(rfq);
      data.quote = Some(quote);
      data.log = Some(log);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_counter(flows: &FlowRegistry<AppError>, app_state: &AppState) {
  let max_rounds = app_state.config.max_counter_rounds;
  let mut p = negotiation_pipeline::<CounterQuote>("apply_counter", "persist_counter", Some("notify_supplier"));

  p.on_root("apply_counter", move |ctx_data: ContextData<NegotiationCtxData<CounterQuote>>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let now = data.now;
      let rfq = loaded(&data.rfq, "rfq")?;
      let mut quote = loaded(&data.quote, "quote")?;
      let mut log = loaded(&data.log, "negotiation log")?;
      let CounterQuote {
        counter_price_cents,
        note,
      } = data.action.clone();

      log.ensure_counter_allowed(quote.id, max_rounds)?;
      quote.counter(&rfq, counter_price_cents, note, now)?;
      data.changes.update_quote(&mut quote);
      let revision = log.record(
        &quote,
        RevisionKind::Countered,
        data.actor.user_id,
        quote.counter_note.clone(),
        now,
      );
      data.changes.append_revision(revision);
      info!(
        "Negotiation Flow (Quote {}): countered at {} cents (round {} of {}).",
        quote.id,
        counter_price_cents,
        log.rounds(quote.id),
        max_rounds
      );

      data.notify_user = Some(quote.supplier_id);
      data.quote = Some(quote);
      data.log = Some(log);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

fn register_revise(flows: &FlowRegistry<AppError>) {
  let mut p = negotiation_pipeline::<ReviseQuote>("apply_revision", "persist_revision", Some("notify_buyer"));

  p.on_root("apply_revision", |ctx_data: ContextData<NegotiationCtxData<ReviseQuote>>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let data = &mut *guard;
      let now = data.now;
      let rfq = loaded(&data.rfq, "rfq")?;
      let mut quote = loaded(&data.quote, "quote")?;
      let mut log = loaded(&data.log, "negotiation log")?;
      let revision = data.action.revision.clone();
      let note = revision.note.clone();

      quote.revise(&rfq, revision, now)?;
      data.changes.update_quote(&mut quote);
      let entry = log.record(&quote, RevisionKind::Revised, data.actor.user_id, note, now);
      data.changes.append_revision(entry);
      info!(
        "Negotiation Flow (Quote {}): revision {} at {} cents x {}.",
        quote.id, quote.revision, quote.unit_price_cents, quote.agreed_quantity
      );

      data.notify_user = Some(rfq.buyer_id);
      data.quote = Some(quote);
      data.log = Some(log);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register(p);
}

pub fn register_negotiation_pipelines(flows: &FlowRegistry<AppError>, app_state: &AppState) {
  register_accept(flows);
  register_reject(flows);
  register_counter(flows, app_state);
  register_revise(flows);
}
