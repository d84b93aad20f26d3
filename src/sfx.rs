//! # SFX
//!
//! Helpers for serializing SignalFx datapoint batches via serde_json
//!
//! <https://dev.splunk.com/observability/reference/api/ingest_data/latest#endpoint-send-metrics>

use super::{dimensions::Dimensions, Error};
use bytes::Bytes;
use serde::Serialize;
use serde_json::value::Value;

/// A single metric sample, counter or gauge depending on which bucket it is sent in
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Datapoint {
    pub metric: String,
    pub value: Value,
    pub dimensions: Dimensions,
}

impl Datapoint {
    pub fn new(metric: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            metric: metric.into(),
            value: value.into(),
            dimensions: Dimensions::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name, value);
        self
    }

    /// This datapoint with its dimensions layered over `defaults`
    pub fn with_defaults(self, defaults: &Dimensions) -> Self {
        Self {
            dimensions: self.dimensions.over(defaults),
            ..self
        }
    }
}

/// Body of `POST /v2/datapoint`
#[derive(Serialize)]
pub struct DatapointBatch<'a> {
    #[serde(skip_serializing_if = "no_datapoints")]
    pub counter: &'a [Datapoint],
    #[serde(skip_serializing_if = "no_datapoints")]
    pub gauge: &'a [Datapoint],
}

fn no_datapoints(datapoints: &&[Datapoint]) -> bool {
    datapoints.is_empty()
}

impl DatapointBatch<'_> {
    pub fn is_empty(&self) -> bool {
        self.counter.is_empty() && self.gauge.is_empty()
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}
