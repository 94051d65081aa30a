//! Result log records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::analysis::AnalysisResult;
use crate::source::{SourceDescriptor, VideoSource};

/// One persisted analysis. Identity is its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// When the analysis finished (ISO-8601)
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub video_source: SourceDescriptor,
    pub analysis_result: AnalysisResult,
}

impl AnalysisRecord {
    /// Record a result for `source`, stamped now.
    pub fn new(source: &VideoSource, result: AnalysisResult) -> Self {
        Self {
            timestamp: Utc::now(),
            video_source: source.descriptor(),
            analysis_result: result,
        }
    }
}

/// RFC 3339, or an ISO-8601 timestamp without offset (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&text) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// The accumulated analyses, in chronological (insertion) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultLog {
    pub analyses: Vec<AnalysisRecord>,
}

impl ResultLog {
    pub fn push(&mut self, record: AnalysisRecord) {
        self.analyses.push(record);
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            summary: "요약".to_string(),
            tags: vec!["게임".to_string()],
            category: "게임".to_string(),
        }
    }

    #[test]
    fn test_record_wire_format() {
        let record = AnalysisRecord::new(&VideoSource::local("a.mp4"), sample_result());
        let json = serde_json::to_value(&record).unwrap();

        assert!(json["timestamp"].is_string());
        assert_eq!(json["video_source"]["type"], "local");
        assert_eq!(json["analysis_result"]["category"], "게임");
    }

    #[test]
    fn test_log_preserves_order() {
        let mut log = ResultLog::default();
        log.push(AnalysisRecord::new(&VideoSource::local("1.mp4"), sample_result()));
        log.push(AnalysisRecord::new(&VideoSource::local("2.mp4"), sample_result()));

        let text = serde_json::to_string(&log).unwrap();
        let parsed: ResultLog = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.analyses[1].video_source,
            VideoSource::local("2.mp4").descriptor()
        );
    }

    #[test]
    fn test_timestamp_without_offset_is_read_as_utc() {
        let json = serde_json::json!({
            "timestamp": "2024-05-01T12:00:00.123456",
            "video_source": {"type": "local", "file_path": "old.mp4"},
            "analysis_result": {"summary": "요약", "tags": ["게임"], "category": "게임"}
        });
        let record: AnalysisRecord = serde_json::from_value(json).unwrap();

        assert_eq!(
            record.timestamp.to_rfc3339(),
            "2024-05-01T12:00:00.123456+00:00"
        );
    }

    #[test]
    fn test_invalid_timestamp_is_rejected() {
        let json = serde_json::json!({
            "timestamp": "yesterday",
            "video_source": {"type": "local", "file_path": "old.mp4"},
            "analysis_result": {"summary": "요약", "tags": ["게임"], "category": "게임"}
        });
        assert!(serde_json::from_value::<AnalysisRecord>(json).is_err());
    }
}
