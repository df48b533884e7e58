use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The inference feature requested for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    LabelDetection,
    #[default]
    ShotChangeDetection,
    ExplicitContentDetection,
    ObjectTracking,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::LabelDetection,
        Feature::ShotChangeDetection,
        Feature::ExplicitContentDetection,
        Feature::ObjectTracking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::LabelDetection => "label_detection",
            Feature::ShotChangeDetection => "shot_change_detection",
            Feature::ExplicitContentDetection => "explicit_content_detection",
            Feature::ObjectTracking => "object_tracking",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Feature::ALL.iter().map(|f| f.as_str()).collect();
                format!("unknown feature '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// One-time configuration sent as the first message of every exchange.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    pub feature: Feature,
    /// Only meaningful for [`Feature::LabelDetection`]; dropped otherwise.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stationary_camera: bool,
    /// Extra feature options passed through verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl StreamConfig {
    pub fn new(feature: Feature) -> Self {
        Self {
            feature,
            ..Self::default()
        }
    }

    /// Set the stationary-camera hint. Ignored unless the feature is label detection.
    pub fn with_stationary_camera(mut self, stationary: bool) -> Self {
        self.stationary_camera = stationary && self.feature == Feature::LabelDetection;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Always the first message.
    Config(StreamConfig),
    /// One chunk of raw content.
    Content(Bytes),
}

/// Application-level error attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// An inbound message.
///
/// `results` is opaque to the pipeline; it is handed to the processor and
/// persisted as-is when `error` is unset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub results: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn with_results(results: Value) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn with_error(code: i32, message: impl Into<String>) -> Self {
        Self {
            results: Value::Null,
            error: Some(ResponseError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Final status reported by the channel once both directions are done.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinalStatus {
    pub code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl FinalStatus {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn feature_parses_loosely() {
        assert_eq!("label_detection".parse::<Feature>().unwrap(), Feature::LabelDetection);
        assert_eq!("Object-Tracking".parse::<Feature>().unwrap(), Feature::ObjectTracking);
        let err = "faces".parse::<Feature>().unwrap_err();
        assert!(err.contains("shot_change_detection"));
    }

    #[test]
    fn stationary_camera_only_for_label_detection() {
        let cfg = StreamConfig::new(Feature::LabelDetection).with_stationary_camera(true);
        assert_eq!(
            serde_json::to_value(&cfg).unwrap(),
            json!({"feature": "label_detection", "stationary_camera": true})
        );

        let cfg = StreamConfig::new(Feature::ShotChangeDetection).with_stationary_camera(true);
        assert_eq!(
            serde_json::to_value(&cfg).unwrap(),
            json!({"feature": "shot_change_detection"})
        );
    }

    #[test]
    fn response_error_flag() {
        let ok: Response = serde_json::from_str(r#"{"results":{"labels":[]}}"#).unwrap();
        assert!(!ok.is_error());

        let failed: Response =
            serde_json::from_str(r#"{"error":{"code":3,"message":"bad chunk"}}"#).unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.results, Value::Null);
        assert_eq!(failed.error.unwrap().message, "bad chunk");
    }

    #[test]
    fn final_status_defaults_to_ok() {
        let status: FinalStatus = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert!(status.is_ok());
        assert!(!FinalStatus::error(14, "unavailable").is_ok());
    }
}
