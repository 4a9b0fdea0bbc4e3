//! Great-circle distance and place-name resolution for location reminders.

use super::types::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points, in meters.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// `true` when `position` lies within `radius_m` of `target` (boundary inclusive).
pub fn within_radius(position: GeoPoint, target: GeoPoint, radius_m: f64) -> bool {
    distance_m(position, target) <= radius_m
}

/// Resolves place names ("office", "Main St 5") to coordinates.
///
/// Returning `None` means the name is unknown; creation then fails instead of
/// storing a made-up location.
pub trait LocationResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<GeoPoint>;
}

/// A resolver backed by a fixed table of named places.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    places: std::collections::HashMap<String, GeoPoint>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: &str, point: GeoPoint) -> Self {
        self.places.insert(name.to_lowercase(), point);
        self
    }
}

impl LocationResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Option<GeoPoint> {
        self.places.get(&name.trim().to_lowercase()).copied()
    }
}
