//! Geodesic primitives: point-to-point distance and radius bounding boxes.
//!
//! Distances are computed on a sphere of radius [`EARTH_RADIUS_M`]; this is
//! an approximation (the real Earth is an oblate spheroid) adequate for the
//! short-range driver-feedback distances this crate is used for.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, per spec.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

impl Location {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// Great-circle distance to `other`, in meters.
    ///
    /// Uses the spherical law of cosines. Rounding error can push the
    /// cosine argument very slightly outside `[-1, 1]` for near-antipodal
    /// or near-identical points; such values are clamped rather than
    /// propagated as NaN.
    pub fn distance_to(&self, other: &Location) -> f64 {
        if self.lat == other.lat && self.long == other.long {
            return 0.0;
        }
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlong = (other.long - self.long).to_radians();

        let cos_angle = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlong.cos();
        let clamped = cos_angle.clamp(-1.0, 1.0);
        EARTH_RADIUS_M * clamped.acos()
    }

    /// Axis-aligned bounding box covering every point within `radius_m` of
    /// this location.
    ///
    /// `Δlat = r/R`; `Δlong = asin(sin(r/R) / cos(lat))`, clamped so a pole
    /// does not overflow `asin`'s domain.
    pub fn bounding_box(&self, radius_m: f64) -> BoundingBox {
        let lat_r = self.lat.to_radians();
        let dlat = radius_m / EARTH_RADIUS_M;

        let cos_lat = lat_r.cos();
        let dlong = if cos_lat.abs() < 1e-12 {
            std::f64::consts::PI
        } else {
            let arg = (dlat.sin() / cos_lat).clamp(-1.0, 1.0);
            arg.asin()
        };

        BoundingBox {
            min_lat: self.lat - dlat.to_degrees(),
            max_lat: self.lat + dlat.to_degrees(),
            min_long: self.long - dlong.to_degrees(),
            max_long: self.long + dlong.to_degrees(),
        }
    }
}

/// An axis-aligned lat/long box, used by the score index's spatial lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_long: f64,
    pub max_long: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &Location) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.long >= self.min_long
            && point.long <= self.max_long
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_for_identical_points() {
        let a = Location::new(40.4, -3.7);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Location::new(40.4, -3.7);
        let b = Location::new(40.41, -3.71);
        let d_ab = a.distance_to(&b);
        let d_ba = b.distance_to(&a);
        assert!((d_ab - d_ba).abs() < 1e-6);
    }

    #[test]
    fn distance_matches_known_value_roughly() {
        // Madrid-ish two points roughly 1.4km apart.
        let a = Location::new(40.4, -3.7);
        let b = Location::new(40.41, -3.71);
        let d = a.distance_to(&b);
        assert!(d > 1000.0 && d < 1700.0, "unexpected distance: {d}");
    }

    #[test]
    fn distance_clamps_antipodal_points_without_nan() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(0.0, 180.0);
        let d = a.distance_to(&b);
        assert!(!d.is_nan());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn bounding_box_contains_center_and_nearby_points() {
        let center = Location::new(40.4, -3.7);
        let bbox = center.bounding_box(1000.0);
        assert!(bbox.contains(&center));

        let nearby = Location::new(40.4005, -3.7);
        assert!(bbox.contains(&nearby));
    }

    #[test]
    fn bounding_box_excludes_far_points() {
        let center = Location::new(40.4, -3.7);
        let bbox = center.bounding_box(100.0);
        let far = Location::new(41.4, -3.7);
        assert!(!bbox.contains(&far));
    }

    #[test]
    fn bounding_box_handles_near_pole_without_panicking() {
        let center = Location::new(89.9999, 10.0);
        let bbox = center.bounding_box(5000.0);
        assert!(bbox.max_long > bbox.min_long || bbox.min_long > bbox.max_long);
        assert!(!bbox.max_long.is_nan());
    }
}
