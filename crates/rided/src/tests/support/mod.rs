//! Shared fixtures for the daemon's behavioural suites.

mod config_loader;
mod process_world;
mod reporter;
mod session;
mod world;

pub use config_loader::{FailingConfigLoader, InvalidSettingsLoader, TestConfigLoader};
pub use process_world::{ProcessTestWorld, StepResult};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use session::SessionClient;
pub use world::{TestWorld, world};
