//! Configuration loaders covering the success and failure paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ortho_config::OrthoError;
use tempfile::TempDir;

use ride_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader that places the daemon socket in a private temporary directory.
#[derive(Clone)]
pub struct TestConfigLoader {
    dir: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temporary socket directory");
        Self { dir: Arc::new(dir) }
    }

    /// Directory holding the socket and the runtime artefacts.
    pub fn runtime_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the Unix socket the daemon binds.
    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join("rided.sock")
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let socket = self.socket_path();
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(
                socket.to_str().expect("socket path should be UTF-8"),
            ),
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unparseable socket on the command line.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("rided"),
            OsString::from("--daemon-socket"),
            OsString::from("carrier-pigeon://socket"),
        ])
    }
}

/// Loader whose configuration parses but carries an unusable fan-out radius.
pub struct InvalidSettingsLoader(pub TestConfigLoader);

impl ConfigLoader for InvalidSettingsLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let config = self.0.load()?;
        Ok(Config {
            fan_out_radius_km: -1.0,
            ..config
        })
    }
}
