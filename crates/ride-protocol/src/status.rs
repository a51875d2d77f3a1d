//! Enumerations shared by requests and broadcasts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of the marketplace a session speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A passenger requesting rides.
    Rider,
    /// A driver offering rides.
    Driver,
}

impl Role {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rider => "rider",
            Self::Driver => "driver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vehicle class requested by a rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    /// Three-wheeled auto rickshaw.
    AutoRickshaw,
    /// Standard hatchback or sedan.
    CarEconomy,
    /// Premium sedan.
    CarPremium,
    /// Motorcycle taxi.
    Bike,
}

impl VehicleType {
    /// All vehicle classes in wire order.
    pub const ALL: [Self; 4] = [
        Self::AutoRickshaw,
        Self::CarEconomy,
        Self::CarPremium,
        Self::Bike,
    ];

    /// Wire name of the vehicle class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoRickshaw => "AUTO_RICKSHAW",
            Self::CarEconomy => "CAR_ECONOMY",
            Self::CarPremium => "CAR_PREMIUM",
            Self::Bike => "BIKE",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = VehicleTypeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| VehicleTypeParseError(value.to_owned()))
    }
}

/// Unknown vehicle class name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown vehicle type '{0}'")]
pub struct VehicleTypeParseError(pub String);

/// Lifecycle position of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    /// Requested and waiting for a driver.
    Requested,
    /// A driver has claimed the ride.
    Accepted,
    /// The driver is at the pickup point.
    Arrived,
    /// The rider is on board.
    InProgress,
    /// The trip finished and the fare is settled.
    Completed,
    /// Either party called the ride off.
    Cancelled,
}

impl RideStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Accepted => "ACCEPTED",
            Self::Arrived => "ARRIVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal rides accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who triggered a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    /// The rider who requested the ride.
    Rider,
    /// The assigned driver.
    Driver,
    /// The daemon itself.
    System,
}

impl From<Role> for Initiator {
    fn from(role: Role) -> Self {
        match role {
            Role::Rider => Self::Rider,
            Role::Driver => Self::Driver,
        }
    }
}

/// Why a live ride was flagged for attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagReason {
    /// The assigned driver's connection dropped.
    DriverDisconnected,
    /// The rider's connection dropped.
    RiderDisconnected,
}

impl From<Role> for FlagReason {
    fn from(role: Role) -> Self {
        match role {
            Role::Rider => Self::RiderDisconnected,
            Role::Driver => Self::DriverDisconnected,
        }
    }
}
