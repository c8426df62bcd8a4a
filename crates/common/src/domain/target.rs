use crate::domain::Submission;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated submission stamped with who sent it and when it arrived.
///
/// Field names are serialized in PascalCase (`Vendor`, `Timestamp`, `Point`)
/// and stored verbatim as the persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Target {
    pub vendor: String,
    pub timestamp: DateTime<Utc>,
    pub point: Submission,
}

impl Target {
    /// Build a target for a submission received now.
    pub fn new(vendor: impl Into<String>, point: Submission) -> Self {
        Self::received_at(vendor, point, Utc::now())
    }

    pub fn received_at(
        vendor: impl Into<String>,
        point: Submission,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            timestamp,
            point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Feature, Geometry};
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_submission() -> Submission {
        let mut properties = serde_json::Map::new();
        properties.insert("prop0".to_string(), json!("value0"));
        Submission::Feature(Feature::new(Geometry::point(102.0, 0.5).unwrap(), properties))
    }

    #[test]
    fn test_new_stamps_current_time() {
        let before = Utc::now();
        let target = Target::new("123", sample_submission());
        let after = Utc::now();

        assert_eq!(target.vendor, "123");
        assert!(target.timestamp >= before && target.timestamp <= after);
    }

    #[test]
    fn test_serializes_with_pascal_case_fields() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let target = Target::received_at("123", sample_submission(), timestamp);

        let value = serde_json::to_value(&target).unwrap();

        assert_eq!(
            value,
            json!({
                "Vendor": "123",
                "Timestamp": "2024-05-01T12:00:00Z",
                "Point": {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [102.0, 0.5]},
                    "properties": {"prop0": "value0"}
                }
            })
        );
    }

    #[test]
    fn test_decodes_back_to_same_target() {
        let target = Target::new("vendor-7", sample_submission());

        let bytes = serde_json::to_vec(&target).unwrap();
        let decoded: Target = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, target);
    }
}
