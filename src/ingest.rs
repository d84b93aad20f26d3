//! # Ingest
//!
//! Sessions delivering datapoint batches to SignalFx. One session is opened per invocation and
//! stopped before the invocation returns.

use super::sfx::{Datapoint, DatapointBatch};
use super::Error;
use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

const DATAPOINT_PATH: &str = "/v2/datapoint";

const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-sf-token");

/// Time allowed to establish the connection, on top of the send timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens ingest sessions
pub trait Ingest {
    type Session: IngestSession;

    fn open(&self, endpoint: &str, access_token: &str, timeout: Duration) -> Result<Self::Session, Error>;
}

pub trait IngestSession {
    /// Queue one batch of counters and gauges for delivery
    fn send(&mut self, counters: &[Datapoint], gauges: &[Datapoint]) -> Result<(), Error>;

    /// Block until every queued batch is delivered or timed out, then close the session
    /// * Calling stop more than once is allowed and never re-sends anything
    fn stop(&mut self) -> Result<(), Error>;
}

/// [Ingest] over HTTP using the SignalFx JSON datapoint API
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpIngest;

impl Ingest for HttpIngest {
    type Session = HttpSession;

    fn open(&self, endpoint: &str, access_token: &str, timeout: Duration) -> Result<HttpSession, Error> {
        HttpSession::start(format!("{endpoint}{DATAPOINT_PATH}"), access_token.to_string(), timeout)
    }
}

/// Session backed by a worker thread posting each queued batch in order
///
/// Delivery failures are logged as they happen and the first one is returned from
/// [stop](IngestSession::stop).
pub struct HttpSession {
    sender: Option<mpsc::Sender<Bytes>>,
    worker: Option<thread::JoinHandle<Result<(), Error>>>,
}

impl HttpSession {
    fn start(url: String, access_token: String, timeout: Duration) -> Result<Self, Error> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("signalfx-ingest".into())
            .spawn(move || deliver(&url, &access_token, timeout, receiver))
            .map_err(Error::Spawn)?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl IngestSession for HttpSession {
    fn send(&mut self, counters: &[Datapoint], gauges: &[Datapoint]) -> Result<(), Error> {
        let sender = self.sender.as_ref().ok_or(Error::SessionStopped)?;

        let batch = DatapointBatch {
            counter: counters,
            gauge: gauges,
        };
        if batch.is_empty() {
            return Ok(());
        }

        // The worker only hangs up early when it failed to start, stop() reports why
        sender.send(batch.encode()?).map_err(|_| Error::SessionStopped)
    }

    fn stop(&mut self) -> Result<(), Error> {
        // Closing the channel lets the worker drain the queue and exit
        self.sender.take();

        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| Error::WorkerPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("Ingest session dropped with undelivered datapoints: {err}");
        }
    }
}

/// Worker loop, runs until the session's sender is dropped
fn deliver(url: &str, access_token: &str, timeout: Duration, receiver: mpsc::Receiver<Bytes>) -> Result<(), Error> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(CONNECT_TIMEOUT + timeout)
        .build()?;

    let mut outcome = Ok(());

    for body in receiver {
        let result = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(TOKEN_HEADER, access_token)
            .body(body)
            .send()
            .map_err(Error::from)
            .and_then(|response| match response.status() {
                status if status.is_success() => Ok(()),
                status => Err(Error::Rejected(status)),
            });

        match result {
            Ok(()) => debug!("Delivered datapoints to {url}"),
            Err(err) => {
                error!("Failed to deliver datapoints to {url}: {err}");
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens here, but nothing is ever sent either
    const UNUSED_ENDPOINT: &str = "http://127.0.0.1:9";

    #[test]
    fn stop_is_idempotent() {
        let mut session = HttpIngest.open(UNUSED_ENDPOINT, "SFXTOKEN", Duration::from_millis(300)).unwrap();

        session.stop().unwrap();
        session.stop().unwrap();
    }

    #[test]
    fn send_after_stop() {
        let mut session = HttpIngest.open(UNUSED_ENDPOINT, "SFXTOKEN", Duration::from_millis(300)).unwrap();
        session.stop().unwrap();

        let err = session
            .send(&[Datapoint::new("azure.function.invocations", 1)], &[])
            .unwrap_err();
        assert!(matches!(err, Error::SessionStopped));
    }

    #[test]
    fn empty_batches_are_not_queued() {
        let mut session = HttpIngest.open(UNUSED_ENDPOINT, "SFXTOKEN", Duration::from_millis(300)).unwrap();

        // Anything queued would fail to connect and surface from stop()
        session.send(&[], &[]).unwrap();
        session.stop().unwrap();
    }
}
