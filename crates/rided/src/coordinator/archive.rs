//! Hand-off point for rides that reached a terminal state.

use tracing::{info, warn};

use super::RIDES_TARGET;
use super::rides::RideRecord;

/// Receives every ride that completes or is cancelled.
///
/// Called after the ride left the live table. Implementations must not block
/// for long and cannot fail the ride: errors are theirs to report.
pub trait RideArchive: Send + Sync {
    /// Persists a terminal ride.
    fn persist_ride(&self, ride: &RideRecord);
}

/// Archive that writes each terminal ride to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRideArchive;

impl RideArchive for TracingRideArchive {
    fn persist_ride(&self, ride: &RideRecord) {
        match serde_json::to_string(ride) {
            Ok(record) => info!(
                target: RIDES_TARGET,
                ride_id = %ride.ride_id,
                status = %ride.status,
                record,
                "ride archived"
            ),
            Err(error) => warn!(
                target: RIDES_TARGET,
                ride_id = %ride.ride_id,
                %error,
                "failed to serialise archived ride"
            ),
        }
    }
}
