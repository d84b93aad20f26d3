//! [tower] middleware applying the instrumentation to async handlers
//!
//! *this module requires the `tower` feature flag*
//!
//! # Example
//! ```no_run
//! use signalfx_azure_function::service::MetricsLayer;
//! use signalfx_azure_function::{BoxError, Context, Invocation};
//! use std::sync::Arc;
//! use tower::{Layer, ServiceExt};
//!
//! async fn handler(invocation: Invocation<String>) -> Result<String, BoxError> {
//!     metrics::counter!("greetings").increment(1);
//!     Ok(format!("Hello {}", invocation.payload))
//! }
//!
//! # async fn run() -> Result<(), BoxError> {
//! let instrumentation = Arc::new(signalfx_azure_function::Builder::new().init()?);
//!
//! let greeting = MetricsLayer::new(instrumentation)
//!     .layer(tower::service_fn(handler))
//!     .oneshot(Invocation::new("world".to_string(), Context::new("HttpTrigger")))
//!     .await?;
//! assert_eq!(greeting, "Hello world");
//! # Ok(())
//! # }
//! ```

use super::collector::{InvocationRecorder, Recorded};
use super::config::{Environment, ProcessEnv};
use super::ingest::{HttpIngest, Ingest, IngestSession};
use super::invocation::Invocation;
use super::wrapper::{Instrumentation, InvocationScope};
use super::Error;
use pin_project::{pin_project, pinned_drop};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// [tower::Layer] producing [MetricsService]s that share one [Instrumentation]
pub struct MetricsLayer<I = HttpIngest, V = ProcessEnv> {
    instrumentation: Arc<Instrumentation<I, V>>,
}

impl<I, V> MetricsLayer<I, V> {
    pub fn new(instrumentation: Arc<Instrumentation<I, V>>) -> Self {
        Self { instrumentation }
    }
}

impl<I, V> Clone for MetricsLayer<I, V> {
    fn clone(&self) -> Self {
        Self {
            instrumentation: self.instrumentation.clone(),
        }
    }
}

impl<S, I, V> tower::Layer<S> for MetricsLayer<I, V> {
    type Service = MetricsService<S, I, V>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService::new(self.instrumentation.clone(), inner)
    }
}

/// [tower::Service] counting, timing and flushing around each call of the inner service
///
/// The invocation starts when [call](tower::Service::call) is made: the invocation count is
/// queued and the duration measured from there. Flushing runs on tokio's blocking pool when a
/// runtime is available so the executor never waits on SignalFx. A response future dropped
/// before completion is counted as a failed invocation and flushed in the background.
pub struct MetricsService<S, I = HttpIngest, V = ProcessEnv> {
    instrumentation: Arc<Instrumentation<I, V>>,
    inner: S,
}

impl<S, I, V> MetricsService<S, I, V> {
    pub fn new(instrumentation: Arc<Instrumentation<I, V>>, inner: S) -> Self {
        Self { instrumentation, inner }
    }
}

impl<S: Clone, I, V> Clone for MetricsService<S, I, V> {
    fn clone(&self) -> Self {
        Self {
            instrumentation: self.instrumentation.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S, R, I, V> tower::Service<Invocation<R>> for MetricsService<S, I, V>
where
    S: tower::Service<Invocation<R>>,
    S::Error: From<Error>,
    I: Ingest,
    I::Session: Send + 'static,
    V: Environment,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = MetricsServiceFuture<S::Future, I::Session, S::Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Invocation<R>) -> Self::Future {
        // Configuration errors short circuit before the inner service sees the request
        match self.instrumentation.begin(&req.context) {
            Ok(scope) => MetricsServiceFuture::Running {
                scope: Some(scope),
                recorder: InvocationRecorder::new(),
                inner: self.inner.call(req),
            },
            Err(err) => MetricsServiceFuture::Rejected { error: Some(err.into()) },
        }
    }
}

/// Finish `scope` on the blocking pool of the current tokio runtime, or inline without one
fn flush<T>(scope: InvocationScope<T>, failed: bool, recorded: Recorded) -> Option<JoinHandle<()>>
where
    T: IngestSession + Send + 'static,
{
    match Handle::try_current() {
        Ok(runtime) => Some(runtime.spawn_blocking(move || scope.finish(failed, recorded))),
        Err(_) => {
            scope.finish(failed, recorded);
            None
        }
    }
}

#[pin_project(PinnedDrop, project = MetricsServiceFutureProj)]
#[doc(hidden)]
pub enum MetricsServiceFuture<F, T: IngestSession + Send + 'static, R, E> {
    Rejected {
        error: Option<E>,
    },
    Running {
        scope: Option<InvocationScope<T>>,
        recorder: InvocationRecorder,
        #[pin]
        inner: F,
    },
    Flushing {
        result: Option<Result<R, E>>,
        flushing: JoinHandle<()>,
    },
}

impl<F, T, R, E> Future for MetricsServiceFuture<F, T, R, E>
where
    F: Future<Output = Result<R, E>>,
    T: IngestSession + Send + 'static,
{
    type Output = Result<R, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.as_mut().project() {
                MetricsServiceFutureProj::Rejected { error } => {
                    return Poll::Ready(Err(error.take().expect("MetricsServiceFuture polled after completion")));
                }
                MetricsServiceFutureProj::Running { scope, recorder, inner } => {
                    // Handler metrics are recorded one poll at a time so they stay with this invocation
                    let result = futures::ready!(metrics::with_local_recorder(&*recorder, || inner.poll(cx)));

                    let scope = scope.take().expect("MetricsServiceFuture polled after completion");
                    match flush(scope, result.is_err(), recorder.drain()) {
                        Some(flushing) => self.set(MetricsServiceFuture::Flushing {
                            result: Some(result),
                            flushing,
                        }),
                        None => return Poll::Ready(result),
                    }
                }
                MetricsServiceFutureProj::Flushing { result, flushing } => {
                    if let Err(err) = futures::ready!(Pin::new(flushing).poll(cx)) {
                        error!("Metrics flush task failed: {err}");
                    }
                    return Poll::Ready(result.take().expect("MetricsServiceFuture polled after completion"));
                }
            }
        }
    }
}

#[pinned_drop]
impl<F, T: IngestSession + Send + 'static, R, E> PinnedDrop for MetricsServiceFuture<F, T, R, E> {
    fn drop(self: Pin<&mut Self>) {
        if let MetricsServiceFutureProj::Running { scope, recorder, .. } = self.project() {
            if let Some(scope) = scope.take() {
                debug!("Invocation dropped before completion, counting it as failed");
                flush(scope, true, recorder.drain());
            }
        }
    }
}
