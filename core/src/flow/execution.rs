// tradeflow/src/flow/execution.rs

//! `Pipeline::run()`: walks the steps in order and drives each step's phases.

use crate::error::FlowError;
use crate::flow::context::ContextData;
use crate::flow::control::{PipelineControl, PipelineResult};
use crate::flow::pipeline::{Phase, Pipeline, StepDef};
use tracing::{event, info_span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes the pipeline against `ctx_data`.
  ///
  /// Returns `Stopped` as soon as any handler asks to stop, the first handler
  /// error unchanged, and `FlowError::HandlerMissing` (converted into `Err`)
  /// when a required step has nothing registered.
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, flow = self.name, num_steps = self.steps.len(), "Flow execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = info_span!(
        "flow_step",
        flow = self.name,
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );

      match self.run_step(step_def, ctx_data.clone()).instrument(step_span).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => {
          event!(Level::INFO, flow = self.name, step_name = %step_def.name, "Flow stopped by a handler.");
          return Ok(PipelineResult::Stopped);
        }
        Err(e) => {
          event!(Level::WARN, flow = self.name, step_name = %step_def.name, error = %e, "Flow step failed.");
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, flow = self.name, "Flow execution completed.");
    Ok(PipelineResult::Completed)
  }

  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> Result<PipelineControl, Err> {
    if let Some(skip_if) = &step_def.skip_if {
      if skip_if(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by its skip condition.");
        return Ok(PipelineControl::Continue);
      }
    }

    let hooks = match self.hooks.get(step_def.name.as_str()) {
      Some(hooks) if !hooks.is_empty() => hooks,
      _ if step_def.optional => {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return Ok(PipelineControl::Continue);
      }
      _ => {
        event!(Level::ERROR, "Non-optional step has no handlers.");
        return Err(Err::from(FlowError::HandlerMissing {
          flow: self.name,
          step_name: step_def.name.clone(),
        }));
      }
    };

    for phase in Phase::ORDER {
      for (handler_idx, handler_fn) in hooks.phase(phase).iter().enumerate() {
        event!(Level::TRACE, phase = phase.label(), handler_index = handler_idx, "Running handler.");
        if handler_fn(ctx_data.clone()).await? == PipelineControl::Stop {
          event!(Level::DEBUG, phase = phase.label(), "Handler requested stop.");
          return Ok(PipelineControl::Stop);
        }
      }
    }

    Ok(PipelineControl::Continue)
  }
}
