// tradeflow/src/flow/mod.rs

//! The step-flow engine marketplace operations run on.
//!
//! A `Pipeline<TData, Err>` is an ordered list of named steps. Each step may
//! carry `before`, `on` and `after` handlers operating on a shared
//! `ContextData<TData>`. Handlers return `PipelineControl` to continue or stop.
//! A `FlowRegistry` keys pipelines by their context data type so callers only
//! need to build the context and hand it over.

pub mod context;
pub mod control;
pub mod execution;
pub mod pipeline;
pub mod registry;

pub use context::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use pipeline::{Handler, HandlerFuture, Phase, Pipeline, SkipCondition, StepDef};
pub use registry::FlowRegistry;
