//! # Wrapper
//!
//! Instruments function handlers: every invocation opens its own ingest session, counts the
//! invocation, times the handler, counts failures and flushes before returning.

use super::collector::{InvocationRecorder, Recorded};
use super::config::{Config, Environment, ProcessEnv};
use super::dimensions::{self, Dimensions};
use super::ingest::{HttpIngest, Ingest, IngestSession};
use super::invocation::{FunctionContext, Invocation};
use super::sfx::Datapoint;
use super::Error;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, warn};

pub const INVOCATIONS: &str = "azure.function.invocations";
pub const ERRORS: &str = "azure.function.errors";
pub const DURATION: &str = "azure.function.duration";

/// SignalFx instrumentation for function handlers
///
/// Use [Builder](super::Builder) to construct. Holds configuration only, so one value can be
/// shared by any number of concurrent invocations.
///
/// # Example
/// ```no_run
/// use signalfx_azure_function::{BoxError, Context, Invocation};
///
/// let mut handler = signalfx_azure_function::Builder::new()
///     .with_dimension("team", "payments")
///     .init()
///     .unwrap()
///     .instrument(|invocation: Invocation<String>| -> Result<usize, BoxError> {
///         metrics::counter!("characters").increment(invocation.payload.len() as u64);
///         Ok(invocation.payload.len())
///     });
///
/// handler(Invocation::new("hello".to_string(), Context::new("HttpTrigger"))).unwrap();
/// ```
#[derive(Clone)]
pub struct Instrumentation<I = HttpIngest, V = ProcessEnv> {
    config: Config,
    ingest: I,
    env: V,
}

impl<I: Ingest, V: Environment> Instrumentation<I, V> {
    pub(crate) fn new(config: Config, ingest: I, env: V) -> Self {
        Self { config, ingest, env }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve configuration and dimensions, open a session and count the invocation
    ///
    /// Nothing is sent when configuration or region lookup fails. Delivery problems are logged
    /// and never fail the invocation.
    pub fn begin(&self, context: &impl FunctionContext) -> Result<InvocationScope<I::Session>, Error> {
        let settings = self.config.resolve(&self.env)?;

        let mut dimensions = dimensions::resolve_default_dimensions(&self.env, context)?;
        dimensions.insert(dimensions::METRIC_SOURCE, dimensions::METRIC_SOURCE_VALUE);
        dimensions.merge(&self.config.extra_dimensions);

        let session = match self
            .ingest
            .open(&settings.ingest_endpoint, &settings.access_token, settings.send_timeout)
        {
            Ok(session) => Some(session),
            Err(err) => {
                error!("Failed to open ingest session, invocation goes unmeasured: {err}");
                None
            }
        };

        let mut scope = InvocationScope {
            session,
            dimensions,
            started: Instant::now(),
        };

        if let Err(err) = scope.send(vec![Datapoint::new(INVOCATIONS, 1)], Vec::new()) {
            warn!("Failed to send invocation count: {err}");
        }

        scope.started = Instant::now();
        Ok(scope)
    }

    /// Run one invocation of `handler` under instrumentation
    ///
    /// The handler's result is returned unchanged, whether or not its metrics could be
    /// delivered. A panicking handler is counted as failed and the panic resumed once metrics
    /// are flushed.
    pub fn call<R, T, E, F>(&self, handler: F, invocation: Invocation<R>) -> Result<T, E>
    where
        F: FnOnce(Invocation<R>) -> Result<T, E>,
        E: From<Error>,
    {
        let scope = self.begin(&invocation.context)?;
        let recorder = InvocationRecorder::new();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            metrics::with_local_recorder(&recorder, || handler(invocation))
        }));

        match outcome {
            Ok(result) => {
                scope.finish(result.is_err(), recorder.drain());
                result
            }
            Err(payload) => {
                scope.finish(true, recorder.drain());
                panic::resume_unwind(payload)
            }
        }
    }

    /// Wrap `handler` into a handler with the same signature that instruments every call
    pub fn instrument<R, T, E, F>(self, mut handler: F) -> impl FnMut(Invocation<R>) -> Result<T, E>
    where
        F: FnMut(Invocation<R>) -> Result<T, E>,
        E: From<Error>,
    {
        move |invocation| self.call(&mut handler, invocation)
    }
}

/// State of a single instrumented invocation, never shared between invocations
///
/// Without a session (it could not be opened) nothing is sent.
pub struct InvocationScope<S: IngestSession> {
    session: Option<S>,
    dimensions: Dimensions,
    started: Instant,
}

impl<S: IngestSession> InvocationScope<S> {
    /// Default dimensions applied to every datapoint of this invocation
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    fn send(&mut self, counters: Vec<Datapoint>, gauges: Vec<Datapoint>) -> Result<(), Error> {
        let counters: Vec<Datapoint> = counters.into_iter().map(|d| d.with_defaults(&self.dimensions)).collect();
        let gauges: Vec<Datapoint> = gauges.into_iter().map(|d| d.with_defaults(&self.dimensions)).collect();

        debug!("Counters to send: {counters:?}");
        debug!("Gauges to send: {gauges:?}");

        match &mut self.session {
            Some(session) => session.send(&counters, &gauges),
            None => Ok(()),
        }
    }

    /// Send the duration, the error counter when `failed` and whatever the handler recorded,
    /// then stop the session
    /// * The session is stopped even if sending fails
    /// * Delivery failures are logged, the invocation's outcome never depends on them
    pub fn finish(mut self, failed: bool, recorded: Recorded) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;

        let mut counters = Vec::with_capacity(recorded.counters.len() + 1);
        if failed {
            counters.push(Datapoint::new(ERRORS, 1));
        }
        counters.extend(recorded.counters);

        let mut gauges = Vec::with_capacity(recorded.gauges.len() + 1);
        gauges.push(Datapoint::new(DURATION, elapsed_ms));
        gauges.extend(recorded.gauges);

        if let Err(err) = self.send(counters, gauges) {
            warn!("Failed to send invocation metrics: {err}");
        }

        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.stop() {
                warn!("Failed to flush metrics: {err}");
            }
        }
    }
}
