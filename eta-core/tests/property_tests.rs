//! Property-based tests for distance and the estimation engine.
//!
//! # Invariants tested
//!
//! - **Symmetry:** `distance(a, b) == distance(b, a)`.
//! - **Identity:** `distance(a, a) == 0`.
//! - **Key set:** the result holds exactly the pairs whose endpoints both
//!   have locations, and every requested origin.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use eta_core::test_support::FixedSpeedLookup;
use eta_core::{
    EstimationRequest, HaversineEstimator, RequestContext, TravelEstimator, haversine_miles,
};
use geo::Coord;
use proptest::prelude::*;

fn coord() -> impl Strategy<Value = Coord<f64>> {
    (-180.0_f64..=180.0, -90.0_f64..=90.0).prop_map(|(x, y)| Coord { x, y })
}

/// Location identifiers drawn from a small alphabet so that pairs often
/// reference ids without a location.
fn id() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["A", "B", "C", "D", "E", "F"]).prop_map(str::to_owned)
}

fn request() -> impl Strategy<Value = EstimationRequest> {
    (
        prop::collection::hash_map(id(), coord(), 0..5),
        prop::collection::hash_map(id(), prop::collection::vec(id(), 0..5), 0..5),
    )
        .prop_map(|(locations, pairs)| {
            let at = DateTime::parse_from_rfc3339("2024-01-02T08:00:00Z").expect("timestamp");
            let mut request = EstimationRequest::new(1, at);
            request.locations = locations;
            request.pairs = pairs;
            request
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn distance_is_symmetric(a in coord(), b in coord()) {
        let forward = haversine_miles(a, b);
        let backward = haversine_miles(b, a);
        prop_assert!((forward - backward).abs() < 1e-9);
        prop_assert!(forward >= 0.0);
    }

    #[test]
    fn distance_to_self_is_zero(a in coord()) {
        prop_assert_eq!(haversine_miles(a, a), 0.0);
    }

    #[test]
    fn result_keys_match_resolvable_pairs(request in request()) {
        let expected_origins: HashSet<String> = request.pairs.keys().cloned().collect();
        let expected_pairs: HashSet<(String, String)> = request
            .pairs
            .iter()
            .filter(|(origin, _)| request.locations.contains_key(*origin))
            .flat_map(|(origin, destinations)| {
                destinations
                    .iter()
                    .filter(|destination| request.locations.contains_key(*destination))
                    .map(move |destination| (origin.clone(), destination.clone()))
            })
            .collect();

        let estimator = HaversineEstimator::new(Arc::new(FixedSpeedLookup::new(12.0)));
        let result = estimator
            .estimate(&RequestContext::background(), request)
            .expect("estimate succeeds");

        let origins: HashSet<String> = result.keys().cloned().collect();
        let pairs: HashSet<(String, String)> = result
            .iter()
            .flat_map(|(origin, row)| {
                row.keys().map(move |destination| (origin.clone(), destination.clone()))
            })
            .collect();
        prop_assert_eq!(origins, expected_origins);
        prop_assert_eq!(pairs, expected_pairs);
    }
}
