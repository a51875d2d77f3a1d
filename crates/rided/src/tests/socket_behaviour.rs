//! Behavioural tests for the session socket listener.

use std::cell::RefCell;
use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use ride_config::{DispatchSettings, SocketEndpoint};
use ride_protocol::{ClientEvent, Hello, Role, ServerEvent, SessionId};

use crate::coordinator::Coordinator;
use crate::dispatch::DispatchConnectionHandler;
use crate::transport::{ListenerHandle, SocketListener};

use super::support::SessionClient;

struct ListenerWorld {
    endpoint: SocketEndpoint,
    coordinator: Arc<Coordinator>,
    listener: Option<ListenerHandle>,
    address: Option<SocketAddr>,
    bind_error: Option<String>,
    reserved: Option<TcpListener>,
    socket_dir: Option<TempDir>,
    clients: Vec<SessionClient>,
    session_ids: Vec<SessionId>,
}

impl ListenerWorld {
    fn new() -> Self {
        Self {
            endpoint: SocketEndpoint::tcp("127.0.0.1", 0),
            coordinator: Arc::new(Coordinator::new(DispatchSettings::default())),
            listener: None,
            address: None,
            bind_error: None,
            reserved: None,
            socket_dir: None,
            clients: Vec::new(),
            session_ids: Vec::new(),
        }
    }

    fn use_unix_socket(&mut self) {
        let dir = TempDir::new().expect("socket dir");
        let path = dir.path().join("rided.sock");
        self.endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 socket path"));
        self.socket_dir = Some(dir);
    }

    fn start_listener(&mut self) {
        let handler = Arc::new(DispatchConnectionHandler::new(Arc::clone(&self.coordinator)));
        let started = SocketListener::bind(&self.endpoint).and_then(|listener| {
            self.address = listener.local_addr();
            listener.start(handler)
        });
        match started {
            Ok(handle) => self.listener = Some(handle),
            Err(error) => self.bind_error = Some(error.to_string()),
        }
    }

    fn reserve_port(&mut self) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind reserved port");
        let port = listener.local_addr().expect("local addr").port();
        self.endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        self.reserved = Some(listener);
    }

    fn connect(&self) -> SessionClient {
        match &self.endpoint {
            SocketEndpoint::Tcp { .. } => {
                SessionClient::connect_tcp(self.address.expect("listener address should be set"))
            }
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => SessionClient::connect_unix(path.as_std_path()),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => panic!("unix sockets are unsupported here"),
        }
    }

    fn hello(&mut self, role: Role) {
        let mut client = self.connect();
        client.send(&ClientEvent::Hello(Hello { role }));
        match client.wait_for("connection-established") {
            ServerEvent::ConnectionEstablished(ack) => self.session_ids.push(ack.session_id),
            other => panic!("unexpected event: {other:?}"),
        }
        self.clients.push(client);
    }

    fn wait_for_sessions(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.coordinator.registry().session_count() == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl Drop for ListenerWorld {
    fn drop(&mut self) {
        self.clients.clear();
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            drop(handle.join());
        }
        self.reserved = None;
    }
}

#[fixture]
fn world() -> RefCell<ListenerWorld> {
    RefCell::new(ListenerWorld::new())
}

fn start_running_listener(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().start_listener();
    assert!(
        world.borrow().bind_error.is_none(),
        "listener start failed: {:?}",
        world.borrow().bind_error
    );
}

#[given("a TCP socket listener is running")]
fn given_tcp_listener(world: &RefCell<ListenerWorld>) {
    start_running_listener(world);
}

#[given("a Unix socket listener is running")]
fn given_unix_listener(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().use_unix_socket();
    start_running_listener(world);
}

#[given("a TCP socket is already bound")]
fn given_tcp_in_use(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().reserve_port();
}

#[when("a rider says hello")]
fn when_rider_hello(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().hello(Role::Rider);
}

#[when("a driver says hello")]
fn when_driver_hello(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().hello(Role::Driver);
}

#[when("every client disconnects")]
fn when_clients_disconnect(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().clients.clear();
}

#[when("the listener starts on the same socket")]
fn when_listener_starts_same_socket(world: &RefCell<ListenerWorld>) {
    world.borrow_mut().start_listener();
}

#[then("the daemon holds {count} sessions")]
fn then_sessions_plural(world: &RefCell<ListenerWorld>, count: usize) {
    assert_sessions(world, count);
}

#[then("the daemon holds {count} session")]
fn then_sessions_singular(world: &RefCell<ListenerWorld>, count: usize) {
    assert_sessions(world, count);
}

fn assert_sessions(world: &RefCell<ListenerWorld>, count: usize) {
    let world = world.borrow();
    assert!(
        world.wait_for_sessions(count),
        "expected {count} sessions, got {}",
        world.coordinator.registry().session_count()
    );
}

#[then("every session has its own id")]
fn then_distinct_ids(world: &RefCell<ListenerWorld>) {
    let world = world.borrow();
    let distinct: HashSet<_> = world.session_ids.iter().copied().collect();
    assert_eq!(distinct.len(), world.session_ids.len());
}

#[then("starting the listener fails")]
fn then_listener_fails(world: &RefCell<ListenerWorld>) {
    assert!(
        world.borrow().bind_error.is_some(),
        "expected listener start to fail"
    );
}

#[scenario(path = "tests/features/daemon_socket.feature")]
fn daemon_socket_listener(#[from(world)] world: RefCell<ListenerWorld>) {
    drop(world);
}
