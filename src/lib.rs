//! SignalFx invocation, error and duration metrics for Azure Functions handlers
//!
//! Every instrumented invocation opens its own ingest session, sends
//! `azure.function.invocations` before the handler runs, then `azure.function.duration` and,
//! for failed invocations, `azure.function.errors`, and flushes before returning. Counters and
//! gauges emitted through the [metrics] macros inside the handler are sent along with them.

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use {
    builder::Builder,
    collector::{InvocationRecorder, Recorded},
    config::{Config, Environment, ProcessEnv, Settings},
    dimensions::{resolve_default_dimensions, Dimensions},
    error::Error,
    ingest::{HttpIngest, HttpSession, Ingest, IngestSession},
    invocation::{Context, FunctionContext, Invocation},
    sfx::{Datapoint, DatapointBatch},
    wrapper::{Instrumentation, InvocationScope, DURATION, ERRORS, INVOCATIONS},
};

mod builder;
mod collector;
pub mod config;
pub mod dimensions;
mod error;
mod ingest;
mod invocation;
pub mod regions;
#[cfg(feature = "tower")]
pub mod service;
mod sfx;
mod wrapper;
