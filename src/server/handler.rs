//! Response sinks.
//!
//! The state machine never builds wire messages itself. It reports what
//! happened to a [`ResponseHandler`] owned by whoever drives one dispatch
//! cycle; [`ResponseCollector`] is the handler the connection driver uses.

use crate::bolt::message::{BoltResponse, RecordMessage, SuccessMessage};
use crate::bolt::packstream::{PackStreamValue, ValueMap};
use crate::bolt::BoltError;

/// Sink for the outcome of one request.
///
/// Every request ends in exactly one of `on_success`, `on_failure` or
/// `on_ignored`, optionally preceded by metadata and records.
pub trait ResponseHandler {
    /// Attach a metadata entry to the upcoming SUCCESS.
    fn on_metadata(&mut self, key: &str, value: PackStreamValue);

    /// Stream one result row.
    fn on_record(&mut self, fields: Vec<PackStreamValue>);

    /// The request succeeded.
    fn on_success(&mut self);

    /// The request failed. `error` carries the status code and retryability.
    fn on_failure(&mut self, error: &BoltError);

    /// The request was skipped because the session is failed or interrupted.
    fn on_ignored(&mut self);
}

/// Collects responses in the order they were produced.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    metadata: ValueMap,
    responses: Vec<BoltResponse>,
}

impl ResponseCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses collected so far.
    pub fn responses(&self) -> &[BoltResponse] {
        &self.responses
    }

    /// The final response, if the request has finished.
    pub fn summary(&self) -> Option<&BoltResponse> {
        self.responses
            .last()
            .filter(|r| !matches!(r, BoltResponse::Record(_)))
    }

    /// Records streamed so far.
    pub fn records(&self) -> impl Iterator<Item = &RecordMessage> {
        self.responses.iter().filter_map(|r| match r {
            BoltResponse::Record(record) => Some(record),
            _ => None,
        })
    }

    /// Take the collected responses.
    pub fn into_responses(self) -> Vec<BoltResponse> {
        self.responses
    }
}

impl ResponseHandler for ResponseCollector {
    fn on_metadata(&mut self, key: &str, value: PackStreamValue) {
        self.metadata.insert(key.to_string(), value);
    }

    fn on_record(&mut self, fields: Vec<PackStreamValue>) {
        self.responses.push(BoltResponse::Record(RecordMessage::new(fields)));
    }

    fn on_success(&mut self) {
        let metadata = std::mem::take(&mut self.metadata);
        self.responses
            .push(BoltResponse::Success(SuccessMessage::with_metadata(metadata)));
    }

    fn on_failure(&mut self, error: &BoltError) {
        // metadata gathered before the failure belongs to nothing
        self.metadata.clear();
        self.responses.push(BoltResponse::Failure(error.to_failure()));
    }

    fn on_ignored(&mut self) {
        self.metadata.clear();
        self.responses.push(BoltResponse::Ignored);
    }
}
