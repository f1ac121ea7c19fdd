//! JSON shapes for `POST /compute_travel_estimates` and `eta estimate`.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use eta_core::{EstimateResult, EstimationRequest, RegionId};
use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a decoded request is rejected before estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    /// The region id is absent, not positive, or too large.
    #[error("missing/invalid service region id")]
    InvalidServiceRegion,
    /// The dispatch time is absent.
    #[error("missing dispatch time")]
    MissingDispatchTime,
    /// The locations map is absent.
    #[error("missing locations")]
    MissingLocations,
    /// The pairs map is absent.
    #[error("missing pairs")]
    MissingPairs,
}

/// A point as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Coordinates> for Coord<f64> {
    fn from(value: Coordinates) -> Self {
        Self {
            x: value.longitude,
            y: value.latitude,
        }
    }
}

/// Request body before validation. Every field is optional so that absent
/// and `null` fields surface as validation errors rather than decode errors.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ComputeTravelEstimatesRequest {
    #[serde(default)]
    pub service_region_id: Option<i64>,
    #[serde(default)]
    pub dispatch_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub locations: Option<HashMap<String, Coordinates>>,
    #[serde(default)]
    pub pairs: Option<HashMap<String, Vec<String>>>,
}

impl ComputeTravelEstimatesRequest {
    /// Check required fields and convert into an engine request.
    ///
    /// Fields are checked in the order region, dispatch time, locations,
    /// pairs; the first failure is reported.
    ///
    /// # Errors
    ///
    /// Returns [`RequestValidationError`] for the first missing or invalid
    /// field.
    pub fn into_request(self) -> Result<EstimationRequest, RequestValidationError> {
        let region = self
            .service_region_id
            .filter(|id| *id > 0)
            .and_then(|id| RegionId::try_from(id).ok())
            .ok_or(RequestValidationError::InvalidServiceRegion)?;
        let dispatch_time = self
            .dispatch_time
            .ok_or(RequestValidationError::MissingDispatchTime)?;
        let locations = self
            .locations
            .ok_or(RequestValidationError::MissingLocations)?;
        let pairs = self.pairs.ok_or(RequestValidationError::MissingPairs)?;

        let mut request = EstimationRequest::new(region, dispatch_time);
        request.locations = locations
            .into_iter()
            .map(|(id, coordinates)| (id, coordinates.into()))
            .collect();
        request.pairs = pairs;
        Ok(request)
    }
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedTravelEstimates {
    pub travel_estimates: EstimateResult,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn valid() -> serde_json::Value {
        json!({
            "service_region_id": 1,
            "dispatch_time": "2024-01-02T08:00:00Z",
            "locations": {
                "A": {"latitude": 0.0, "longitude": 0.0},
                "B": {"latitude": 1.0, "longitude": 0.0}
            },
            "pairs": {"A": ["B"]}
        })
    }

    fn decode(value: serde_json::Value) -> ComputeTravelEstimatesRequest {
        serde_json::from_value(value).expect("request decodes")
    }

    #[rstest]
    fn converts_a_complete_request(valid: serde_json::Value) {
        let request = decode(valid).into_request().expect("valid request");
        assert_eq!(request.region, 1);
        assert_eq!(request.pairs["A"], vec!["B".to_owned()]);
        assert_eq!(request.locations["B"], Coord { x: 0.0, y: 1.0 });
    }

    #[rstest]
    #[case("service_region_id", json!(null), RequestValidationError::InvalidServiceRegion)]
    #[case("service_region_id", json!(0), RequestValidationError::InvalidServiceRegion)]
    #[case("service_region_id", json!(-4), RequestValidationError::InvalidServiceRegion)]
    #[case("service_region_id", json!(5_000_000_000_i64), RequestValidationError::InvalidServiceRegion)]
    #[case("dispatch_time", json!(null), RequestValidationError::MissingDispatchTime)]
    #[case("locations", json!(null), RequestValidationError::MissingLocations)]
    #[case("pairs", json!(null), RequestValidationError::MissingPairs)]
    fn rejects_missing_fields(
        mut valid: serde_json::Value,
        #[case] field: &str,
        #[case] value: serde_json::Value,
        #[case] expected: RequestValidationError,
    ) {
        valid[field] = value;
        assert_eq!(decode(valid).into_request(), Err(expected));
    }

    #[rstest]
    fn empty_maps_are_valid(mut valid: serde_json::Value) {
        valid["locations"] = json!({});
        valid["pairs"] = json!({});
        let request = decode(valid).into_request().expect("empty maps are allowed");
        assert_eq!(request.pair_count(), 0);
    }

    #[rstest]
    fn reports_the_first_failure() {
        let err = ComputeTravelEstimatesRequest::default()
            .into_request()
            .expect_err("nothing set");
        assert_eq!(err, RequestValidationError::InvalidServiceRegion);
    }
}
