//! Great-circle distance fallback, used when the Router Client reports
//! `Unavailable` and the caller opts into a fallback estimate (§4.A).

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle travel time estimator: straight-line distance divided by an
/// assumed average speed, rounded up to whole minutes.
#[derive(Debug, Clone, Copy)]
pub struct GreatCircleEstimator {
    pub speed_kmh: f64,
}

impl Default for GreatCircleEstimator {
    fn default() -> Self {
        Self { speed_kmh: 45.0 }
    }
}

impl GreatCircleEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    pub fn distance_km(from: (f64, f64), to: (f64, f64)) -> f64 {
        let (lat1, lon1) = from;
        let (lat2, lon2) = to;

        let lat1_rad = lat1.to_radians();
        let lat2_rad = lat2.to_radians();
        let delta_lat = (lat2 - lat1).to_radians();
        let delta_lon = (lon2 - lon1).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    /// Estimated travel time in whole minutes, rounded up per §4.A.
    pub fn minutes(&self, from: (f64, f64), to: (f64, f64)) -> u32 {
        if from == to {
            return 0;
        }
        let km = Self::distance_km(from, to);
        let hours = km / self.speed_kmh;
        (hours * 60.0).ceil() as u32
    }
}
