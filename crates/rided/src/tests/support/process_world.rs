//! Process supervision world shared across daemon lifecycle scenarios.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ride_config::RuntimePaths;
use serde_json::Value;

use crate::bootstrap::ConfigLoader;
use crate::health::HealthReporter;
use crate::process::daemonizer::{DaemonizeError, Daemonizer};
use crate::process::launch::{LaunchPlan, ProcessControl, ServiceDeps, run_daemon_with};
use crate::process::shutdown::{ShutdownError, ShutdownSignal};
use crate::process::{LaunchError, LaunchMode};

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;
use super::session::SessionClient;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub type StepResult = Result<(), String>;

pub struct ProcessTestWorld {
    loader: TestConfigLoader,
    reporter: Arc<RecordingHealthReporter>,
    daemonizer: TestDaemonizer,
    shutdown: TestShutdownSignal,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
    pub sessions: Vec<SessionClient>,
}

impl Default for ProcessTestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTestWorld {
    pub fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemonizer: TestDaemonizer::default(),
            shutdown: TestShutdownSignal::new(),
            handle: None,
            result: None,
            sessions: Vec::new(),
        }
    }

    fn plan<L>(
        &self,
        mode: LaunchMode,
        loader: L,
        shutdown: TestShutdownSignal,
    ) -> LaunchPlan<L, TestDaemonizer, TestShutdownSignal> {
        LaunchPlan {
            process: ProcessControl {
                mode,
                daemonizer: self.daemonizer.clone(),
                shutdown,
            },
            services: ServiceDeps {
                loader,
                reporter: Arc::clone(&self.reporter) as Arc<dyn HealthReporter>,
            },
        }
    }

    pub fn start_background(&mut self) -> StepResult {
        if self.handle.is_some() {
            return Err("daemon already running".to_owned());
        }
        let plan = self.plan(
            LaunchMode::Background,
            self.loader.clone(),
            self.shutdown.clone(),
        );
        self.handle = Some(thread::spawn(move || run_daemon_with(plan)));
        self.wait_for_status("ready")
    }

    /// Runs a foreground launch to completion with shutdown already requested.
    pub fn run_foreground(&mut self) {
        let shutdown = TestShutdownSignal::new();
        shutdown.trigger();
        let plan = self.plan(LaunchMode::Foreground, self.loader.clone(), shutdown);
        self.result = Some(run_daemon_with(plan));
    }

    pub fn run_with_invalid_config(&mut self) {
        let plan = self.plan(
            LaunchMode::Foreground,
            FailingConfigLoader,
            TestShutdownSignal::new(),
        );
        self.result = Some(run_daemon_with(plan));
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn join_background(&mut self) -> StepResult {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| "daemon not running".to_owned())?;
        let result = handle
            .join()
            .map_err(|_| "daemon thread panicked".to_owned())?;
        self.result = Some(result);
        Ok(())
    }

    pub fn connect(&mut self) -> &mut SessionClient {
        self.sessions
            .push(SessionClient::connect_unix(&self.loader.socket_path()));
        self.sessions.last_mut().expect("session just pushed")
    }

    fn runtime_paths(&self) -> RuntimePaths {
        let config = self.loader.load().expect("test config");
        RuntimePaths::from_config(&config).expect("runtime paths")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.runtime_paths().lock_path().to_path_buf()
    }

    pub fn pid_path(&self) -> PathBuf {
        self.runtime_paths().pid_path().to_path_buf()
    }

    pub fn health_path(&self) -> PathBuf {
        self.runtime_paths().health_path().to_path_buf()
    }

    pub fn read_health(&self) -> Result<Value, String> {
        let content = fs::read_to_string(self.health_path()).map_err(|error| error.to_string())?;
        serde_json::from_str(&content).map_err(|error| error.to_string())
    }

    pub fn write_stale_runtime(&self) -> StepResult {
        fs::write(self.lock_path(), b"").map_err(|error| error.to_string())?;
        fs::write(self.pid_path(), b"0\n").map_err(|error| error.to_string())
    }

    pub fn daemonizer_calls(&self) -> usize {
        self.daemonizer.calls()
    }

    pub fn reporter(&self) -> &RecordingHealthReporter {
        &self.reporter
    }

    pub fn last_result(&self) -> Option<&Result<(), LaunchError>> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&LaunchError> {
        self.result.as_ref()?.as_ref().err()
    }

    fn wait_for_status(&self, expected: &str) -> StepResult {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self
                .read_health()
                .is_ok_and(|snapshot| snapshot["status"] == expected)
            {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(format!("daemon did not publish {expected} health snapshot"))
    }
}

impl Drop for ProcessTestWorld {
    fn drop(&mut self) {
        self.sessions.clear();
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
    }
}

#[derive(Clone, Default)]
pub struct TestDaemonizer {
    calls: Arc<AtomicUsize>,
}

impl TestDaemonizer {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Daemonizer for TestDaemonizer {
    fn daemonize(&self, _paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().expect("shutdown mutex poisoned") = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}
