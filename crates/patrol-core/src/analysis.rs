//! Analysis result types.

use serde::{Deserialize, Serialize};

/// What the analysis capability returns for one error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub root_cause: String,
    pub suggested_fix: String,
    pub confidence_score: i32,
}

/// The cached outcome of analyzing one fingerprinted error.
///
/// Immutable once produced; the cache hands out clones, never references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub fingerprint: String,
    pub root_cause: String,
    pub suggested_fix: String,
    pub confidence_score: i32,
    /// Unix epoch milliseconds.
    pub analyzed_at: i64,
    /// Id of the event that triggered this analysis.
    pub event_id: String,
}

impl AnalysisResult {
    /// Severity bucket derived from the confidence score.
    pub fn severity_level(&self) -> &'static str {
        match self.confidence_score {
            90..=100 => "critical",
            70..=89 => "high",
            50..=69 => "medium",
            30..=49 => "low",
            _ => "info",
        }
    }
}

/// Normalize a provider-reported confidence to the 0-100 scale.
///
/// Some models answer on a 1-10 scale; anything else is clamped.
pub fn clamp_confidence(score: i32) -> i32 {
    let scaled = if score > 0 && score <= 10 {
        score * 10
    } else {
        score
    };
    scaled.clamp(0, 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(8), 80);
        assert_eq!(clamp_confidence(10), 100);
        assert_eq!(clamp_confidence(85), 85);
        assert_eq!(clamp_confidence(0), 0);
        assert_eq!(clamp_confidence(-5), 0);
        assert_eq!(clamp_confidence(250), 100);
    }

    #[test]
    fn test_severity_level() {
        let mut result = AnalysisResult {
            fingerprint: "abc".to_string(),
            root_cause: String::new(),
            suggested_fix: String::new(),
            confidence_score: 95,
            analyzed_at: 0,
            event_id: "evt".to_string(),
        };
        assert_eq!(result.severity_level(), "critical");

        result.confidence_score = 75;
        assert_eq!(result.severity_level(), "high");

        result.confidence_score = 55;
        assert_eq!(result.severity_level(), "medium");

        result.confidence_score = 35;
        assert_eq!(result.severity_level(), "low");

        result.confidence_score = 10;
        assert_eq!(result.severity_level(), "info");
    }

    #[test]
    fn test_result_wire_format() {
        let result = AnalysisResult {
            fingerprint: "deadbeef".to_string(),
            root_cause: "missing null check".to_string(),
            suggested_fix: "guard the access".to_string(),
            confidence_score: 80,
            analyzed_at: 1707817200000,
            event_id: "evt-1".to_string(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rootCause"], "missing null check");
        assert_eq!(json["confidenceScore"], 80);
        assert_eq!(json["eventId"], "evt-1");
    }
}
