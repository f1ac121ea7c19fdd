//! Shapes exchanged between adapters and the estimation engine.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use geo::Coord;

/// Identifier of a service region.
pub type RegionId = u32;

/// Parameters for an estimate request.
///
/// Every identifier referenced by `pairs` is expected to exist in
/// `locations`. The engine does not enforce this: a pair with an unknown
/// endpoint is dropped from the result rather than failing the request.
///
/// # Examples
/// ```rust
/// use std::collections::HashMap;
/// use chrono::DateTime;
/// use geo::Coord;
/// use eta_core::EstimationRequest;
///
/// let dispatch_time = DateTime::parse_from_rfc3339("2024-01-02T08:00:00Z").unwrap();
/// let request = EstimationRequest::new(1, dispatch_time)
///     .with_location("A", Coord { x: 0.0, y: 0.0 })
///     .with_location("B", Coord { x: 1.0, y: 0.0 })
///     .with_pair("A", "B");
/// assert_eq!(request.pair_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationRequest {
    /// Service region used to select the speed profile.
    pub region: RegionId,
    /// Dispatch instant; its offset decides the local day and minute.
    pub dispatch_time: DateTime<FixedOffset>,
    /// Coordinates keyed by location identifier (`x` = longitude).
    pub locations: HashMap<String, Coord<f64>>,
    /// Destinations to estimate, keyed by origin identifier.
    pub pairs: HashMap<String, Vec<String>>,
}

impl EstimationRequest {
    /// Create a request with no locations or pairs.
    #[must_use]
    pub fn new(region: RegionId, dispatch_time: DateTime<FixedOffset>) -> Self {
        Self {
            region,
            dispatch_time,
            locations: HashMap::new(),
            pairs: HashMap::new(),
        }
    }

    /// Add or replace a location.
    #[must_use]
    pub fn with_location(mut self, id: impl Into<String>, location: Coord<f64>) -> Self {
        self.locations.insert(id.into(), location);
        self
    }

    /// Append `destination` to the list of `origin`.
    #[must_use]
    pub fn with_pair(mut self, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        self.pairs
            .entry(origin.into())
            .or_default()
            .push(destination.into());
        self
    }

    /// Register `origin` with no destinations.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.pairs.entry(origin.into()).or_default();
        self
    }

    /// Total number of (origin, destination) pairs, counting duplicates.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }
}

/// Estimated distance (miles) and time (hours) for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TravelEstimate {
    /// Great-circle distance rounded to two decimals.
    pub distance: f64,
    /// Travel time at the resolved speed, rounded to two decimals.
    pub time: f64,
}

impl TravelEstimate {
    /// Build an estimate from raw values, rounding both to two decimals.
    #[must_use]
    pub fn rounded(distance: f64, time: f64) -> Self {
        Self {
            distance: round_to_hundredths(distance),
            time: round_to_hundredths(time),
        }
    }
}

/// Estimates keyed by origin, then by destination.
///
/// Outer keys always equal the origin keys of the request, even for origins
/// without destinations.
pub type EstimateResult = HashMap<String, HashMap<String, TravelEstimate>>;

/// Round half away from zero to two decimal places.
#[must_use]
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
