//! TCP reachability driver.
//!
//! `TcpDriver` supervises plain TCP reachability of the database endpoint
//! named by the URI. It does not speak any database protocol: a successful
//! dial counts as `connected`, the peer closing the socket as
//! `disconnected`. With `autoReconnect` enabled (the default) the watcher
//! redials on its own and reports `reconnected`, the way a real driver does.
//! A failed `connect` call reports `error` as well as rejecting.
//!
//! Recognized transport keys:
//!
//! | Key                   | Default | Meaning                                 |
//! |-----------------------|---------|-----------------------------------------|
//! | `defaultPort`         | 27017   | Port used when the URI has none         |
//! | `connectTimeoutMS`    | 0       | Bound on each dial, `0` waits forever   |
//! | `autoReconnect`       | true    | Redial after the peer closes            |
//! | `reconnectIntervalMS` | 1000    | Pause between redials, at least 10      |

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use connwarden_supervisor::{Driver, DriverError, LifecycleEvent, TransportOptions};
use tokio::{io::AsyncReadExt, net::TcpStream, sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_PORT: u16 = 27017;
const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
const MIN_RECONNECT_INTERVAL_MS: u64 = 10;
const EVENT_CAPACITY: usize = 64;

/// Host and port extracted from a database URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parses `scheme://[user[:pass]@]host[:port][,host2...][/db][?query]`.
    ///
    /// The scheme is optional. Only the first host of a seed list is used.
    pub fn parse(uri: &str, default_port: u16) -> Result<Self, DriverError> {
        let invalid = |reason: &str| DriverError::InvalidUri(format!("{uri}: {reason}"));

        let rest = match uri.split_once("://") {
            Some((_, rest)) => rest,
            None => uri,
        };
        let authority = rest.split(['/', '?']).next().unwrap_or_default();
        let hosts = match authority.rsplit_once('@') {
            Some((_, hosts)) => hosts,
            None => authority,
        };
        let first = hosts.split(',').next().unwrap_or_default().trim();
        if first.is_empty() {
            return Err(invalid("missing host"));
        }

        let (host, port) = if let Some(bracketed) = first.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            (host, tail.strip_prefix(':'))
        } else {
            match first.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (first, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid("invalid port"))?,
            None => default_port,
        };

        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }

    fn address(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Dial settings taken from the transport options.
#[derive(Debug, Clone)]
struct DialSettings {
    connect_timeout: Option<Duration>,
    auto_reconnect: bool,
    reconnect_interval: Duration,
}

impl DialSettings {
    fn from_options(options: &TransportOptions) -> Self {
        DialSettings {
            connect_timeout: options
                .get_u64("connectTimeoutMS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            auto_reconnect: options.get_bool("autoReconnect").unwrap_or(true),
            reconnect_interval: Duration::from_millis(
                options
                    .get_u64("reconnectIntervalMS")
                    .unwrap_or(DEFAULT_RECONNECT_INTERVAL_MS)
                    .max(MIN_RECONNECT_INTERVAL_MS),
            ),
        }
    }
}

async fn dial(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<TcpStream, DriverError> {
    let connect = TcpStream::connect(endpoint.address());
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
            DriverError::Connect(format!("{endpoint}: timed out after {}ms", limit.as_millis()))
        })?,
        None => connect.await,
    };
    result.map_err(|e| DriverError::Connect(format!("{endpoint}: {e}")))
}

/// One connected session: the watcher task and its stop token.
#[derive(Debug)]
struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Driver that treats TCP reachability of the endpoint as the connection.
#[derive(Debug)]
pub struct TcpDriver {
    events: broadcast::Sender<LifecycleEvent>,
    session: Mutex<Option<Session>>,
    debug: Arc<AtomicBool>,
}

impl TcpDriver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            session: Mutex::new(None),
            debug: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn establish(
        &self,
        uri: &str,
        options: &TransportOptions,
    ) -> Result<(Endpoint, DialSettings, TcpStream), DriverError> {
        let default_port = options
            .get_u64("defaultPort")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        let endpoint = Endpoint::parse(uri, default_port)?;
        let settings = DialSettings::from_options(options);

        debug!("Dialing {}", endpoint);
        let stream = dial(&endpoint, settings.connect_timeout).await?;
        Ok((endpoint, settings, stream))
    }

    fn replace_session(&self, next: Option<Session>) {
        let previous = match self.session.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        if let Some(session) = previous {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}

impl Default for TcpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for TcpDriver {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    async fn connect(&self, uri: &str, options: &TransportOptions) -> Result<(), DriverError> {
        let (endpoint, settings, stream) = match self.establish(uri, options).await {
            Ok(established) => established,
            Err(e) => {
                let _ = self.events.send(LifecycleEvent::Error(e.to_string()));
                return Err(e);
            }
        };
        info!("TCP connection to {} established", endpoint);

        let cancel = CancellationToken::new();
        let watcher = Watcher {
            endpoint,
            settings,
            events: self.events.clone(),
            debug: self.debug.clone(),
            cancel: cancel.clone(),
        };
        let _ = self.events.send(LifecycleEvent::Connected);
        let task = tokio::spawn(watcher.run(stream));
        self.replace_session(Some(Session { cancel, task }));
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.replace_session(None);
        debug!("TCP driver closed");
        Ok(())
    }

    fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }
}

/// Watches one connection and redials after the peer closes it.
struct Watcher {
    endpoint: Endpoint,
    settings: DialSettings,
    events: broadcast::Sender<LifecycleEvent>,
    debug: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Watcher {
    async fn run(self, mut stream: TcpStream) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.wait_closed(&mut stream) => {}
            }

            warn!("TCP connection to {} lost", self.endpoint);
            self.emit(LifecycleEvent::Disconnected);

            if !self.settings.auto_reconnect {
                return;
            }

            match self.redial().await {
                Some(next) => {
                    stream = next;
                    info!("TCP connection to {} re-established", self.endpoint);
                    self.emit(LifecycleEvent::Reconnected);
                }
                None => return,
            }
        }
    }

    /// Reads until EOF or a socket error. Anything the peer sends is discarded.
    async fn wait_closed(&self, stream: &mut TcpStream) {
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => return,
                Ok(n) => {
                    if self.debug.load(Ordering::Relaxed) {
                        debug!("Discarded {} unsolicited bytes from {}", n, self.endpoint);
                    }
                }
                Err(e) => {
                    debug!("Read from {} failed: {}", self.endpoint, e);
                    return;
                }
            }
        }
    }

    /// Redials until it succeeds or the session is cancelled.
    ///
    /// Only the first failure of an outage is reported as an `error` event.
    async fn redial(&self) -> Option<TcpStream> {
        let mut reported = false;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.settings.reconnect_interval) => {}
            }

            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                attempt = dial(&self.endpoint, self.settings.connect_timeout) => attempt,
            };
            match attempt {
                Ok(stream) => return Some(stream),
                Err(e) if !reported => {
                    reported = true;
                    self.emit(LifecycleEvent::Error(e.to_string()));
                }
                Err(e) => debug!("Redial failed: {}", e),
            }
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        if self.events.send(event).is_err() {
            debug!("No lifecycle subscribers");
        }
    }
}
