//! Fare estimation for new ride requests.

use ride_protocol::{Place, VehicleType};

use super::geo::{haversine_km, travel_minutes};

/// Quotes a fare for a trip before it starts.
pub trait FareEstimator: Send + Sync {
    /// Returns the estimated fare for travelling from `pickup` to `drop`.
    fn estimate(&self, pickup: &Place, drop: &Place, vehicle_type: VehicleType) -> f64;
}

/// Per-vehicle tariff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCard {
    /// Flat charge for every trip.
    pub base: f64,
    /// Charge per kilometre travelled.
    pub per_km: f64,
    /// Charge per minute of estimated travel time.
    pub per_minute: f64,
}

impl RateCard {
    /// Smallest fare ever quoted for this vehicle class.
    #[must_use]
    pub fn minimum_fare(&self) -> f64 {
        self.base * 0.5
    }
}

/// Estimator that applies a fixed tariff per vehicle class.
///
/// Distance is the straight-line distance between pickup and drop, and
/// travel time assumes the average city speed. The result is rounded to whole
/// currency units and never falls below half the base fare.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateCardFareEstimator;

impl RateCardFareEstimator {
    /// Tariff applied to `vehicle_type`.
    #[must_use]
    pub const fn rate_card(vehicle_type: VehicleType) -> RateCard {
        match vehicle_type {
            VehicleType::AutoRickshaw => RateCard {
                base: 30.0,
                per_km: 11.0,
                per_minute: 1.0,
            },
            VehicleType::CarEconomy => RateCard {
                base: 50.0,
                per_km: 15.0,
                per_minute: 2.0,
            },
            VehicleType::CarPremium => RateCard {
                base: 80.0,
                per_km: 20.0,
                per_minute: 3.0,
            },
            VehicleType::Bike => RateCard {
                base: 20.0,
                per_km: 8.0,
                per_minute: 0.5,
            },
        }
    }
}

impl FareEstimator for RateCardFareEstimator {
    fn estimate(&self, pickup: &Place, drop: &Place, vehicle_type: VehicleType) -> f64 {
        let card = Self::rate_card(vehicle_type);
        let distance_km = haversine_km(pickup.point(), drop.point());
        let minutes = travel_minutes(distance_km);
        let fare = card.base + distance_km * card.per_km + minutes * card.per_minute;
        fare.max(card.minimum_fare()).round()
    }
}
