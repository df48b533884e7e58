use serde_json::Value;
use tracing::{debug, info, warn};

use crate::message::{Feature, Response};

/// Observes every inbound response, in arrival order.
///
/// Nothing a processor does affects the control flow of the exchange.
pub trait ResponseProcessor: Send {
    fn process(&mut self, response: &Response);
}

impl<F> ResponseProcessor for F
where
    F: FnMut(&Response) + Send,
{
    fn process(&mut self, response: &Response) {
        self(response)
    }
}

/// Logs a short, feature-specific summary of each response.
#[derive(Debug, Clone)]
pub struct FeatureProcessor {
    feature: Feature,
    processed: u64,
}

impl FeatureProcessor {
    pub fn new(feature: Feature) -> Self {
        Self {
            feature,
            processed: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn log_labels(results: &Value) {
        for annotation in array(results, "label_annotations") {
            let description = annotation
                .pointer("/entity/description")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>");
            let frame = annotation.pointer("/frames/0");
            let offset = frame.and_then(|f| f.get("time_offset")).and_then(Value::as_f64);
            let confidence = frame.and_then(|f| f.get("confidence")).and_then(Value::as_f64);
            info!(description, ?offset, ?confidence, "label");
        }
    }

    fn log_shots(results: &Value) {
        for annotation in array(results, "shot_annotations") {
            let start = annotation.get("start_time_offset").and_then(Value::as_f64);
            let end = annotation.get("end_time_offset").and_then(Value::as_f64);
            info!(?start, ?end, "shot");
        }
    }
}

impl ResponseProcessor for FeatureProcessor {
    fn process(&mut self, response: &Response) {
        self.processed += 1;
        if let Some(error) = &response.error {
            warn!(code = error.code, message = %error.message, "response carries an error");
            return;
        }
        match self.feature {
            Feature::LabelDetection => Self::log_labels(&response.results),
            Feature::ShotChangeDetection => Self::log_shots(&response.results),
            other => debug!(feature = %other, results = %response.results, "response"),
        }
    }
}

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}
