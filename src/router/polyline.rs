//! Route geometry as decoded coordinate sequences.
//!
//! The OSRM client requests `geometries=geojson` rather than the encoded
//! polyline format, so geometry arrives already decoded off the wire; this
//! module just holds the resulting point sequence as a value type.

use serde::{Deserialize, Serialize};

/// A route geometry as decoded (lat, lon) points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_polyline() {
        let polyline = Polyline::new(vec![]);
        assert!(polyline.points().is_empty());
    }

    #[test]
    fn stores_points_in_order() {
        let points = vec![(38.5, -120.2), (40.7, -120.95)];
        let polyline = Polyline::new(points.clone());
        assert_eq!(polyline.points(), points.as_slice());
        assert_eq!(polyline.into_points(), points);
    }
}
