//! Great-circle distance helpers.

use ride_protocol::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average urban driving speed used for arrival and duration estimates.
pub(crate) const AVERAGE_SPEED_KMH: f64 = 25.0;

/// Haversine distance between two points in kilometres.
#[must_use]
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat_from = from.lat.to_radians();
    let lat_to = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

/// Minutes needed to cover `distance_km` at the average speed.
pub(crate) fn travel_minutes(distance_km: f64) -> f64 {
    distance_km / AVERAGE_SPEED_KMH * 60.0
}

/// Whole minutes until arrival, never less than one.
pub(crate) fn arrival_minutes(distance_km: f64) -> u32 {
    let minutes = travel_minutes(distance_km).ceil();
    if minutes.is_finite() && minutes >= 1.0 {
        // Bounded by half the earth's circumference at city speed.
        minutes.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}
