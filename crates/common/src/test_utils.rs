//! Test utilities for the pigpio remote client
//!
//! Provides a scripted mock daemon, notification record builders and timeout
//! helpers for tests across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::level_record;
//!
//! let rec = level_record(1, 500, 0b100);
//! assert_eq!(rec.levels, 0b100);
//! assert_eq!(rec.flags, 0);
//! ```

use bytes::Bytes;
use protocol::commands::{BR1, HWVER, MODEG, MODES, NOIB, PIGPV, READ, TICK, WRITE};
use protocol::{
    NTFY_FLAGS_ALIVE, NTFY_FLAGS_EVENT, NTFY_FLAGS_WDOG, NotificationRecord, Request,
    ResponseFrame, ResponseResult, encode_response, read_request_async,
};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

/// Find a local TCP port nothing is listening on right now
pub fn unused_port() -> crate::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Plain level report
pub fn level_record(seq: u16, tick: u32, levels: u32) -> NotificationRecord {
    NotificationRecord {
        seq,
        flags: 0,
        tick,
        levels,
    }
}

/// Hardware event record for event `id`
pub fn event_record(seq: u16, tick: u32, id: u8) -> NotificationRecord {
    NotificationRecord {
        seq,
        flags: NTFY_FLAGS_EVENT | (id as u16 & 0x1F),
        tick,
        levels: 0,
    }
}

/// Keep-alive record carrying the current levels
pub fn keepalive_record(seq: u16, tick: u32, levels: u32) -> NotificationRecord {
    NotificationRecord {
        seq,
        flags: NTFY_FLAGS_ALIVE,
        tick,
        levels,
    }
}

/// Watchdog timeout record for `gpio`
pub fn watchdog_record(seq: u16, tick: u32, gpio: u8, levels: u32) -> NotificationRecord {
    NotificationRecord {
        seq,
        flags: NTFY_FLAGS_WDOG | (gpio as u16 & 0x1F),
        tick,
        levels,
    }
}

/// How the mock daemon answers one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Echo header with this result word
    Value(u32),
    /// Echo header with a negative error code
    Error(i32),
    /// Echo header with a payload; result word is the payload length
    Extended(Vec<u8>),
    /// Never answer
    Silent,
    /// Write these exact bytes instead of a frame
    Raw(Vec<u8>),
}

/// Initial daemon state
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// PIGPV reply
    pub pigpio_version: u32,
    /// HWVER reply
    pub hw_revision: u32,
    /// Handle returned for NOIB
    pub handle: i32,
    /// Bank 1 levels returned for BR1 and READ
    pub levels: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            pigpio_version: 79,
            hw_revision: 0x00a0_2082,
            handle: 0,
            levels: 0,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    config: Mutex<MockConfig>,
    modes: Mutex<HashMap<u32, u32>>,
    scripted: Mutex<HashMap<u32, VecDeque<MockReply>>>,
    fixed: Mutex<HashMap<u32, MockReply>>,
    noib_reply: Mutex<Option<MockReply>>,
    requests: Mutex<Vec<Request>>,
    sinks: Mutex<Vec<mpsc::UnboundedSender<Bytes>>>,
    held: watch::Sender<bool>,
    kill: broadcast::Sender<()>,
    command_connections: AtomicUsize,
    notification_connections: AtomicUsize,
    started: Instant,
}

impl Shared {
    fn default_reply(&self, req: &Request) -> MockReply {
        let mut config = lock(&self.config);
        match req.command {
            PIGPV => MockReply::Value(config.pigpio_version),
            HWVER => MockReply::Value(config.hw_revision),
            BR1 => MockReply::Value(config.levels),
            TICK => MockReply::Value(self.started.elapsed().as_micros() as u32),
            READ => MockReply::Value((config.levels >> (req.p1 & 31)) & 1),
            WRITE => {
                let bit = 1u32 << (req.p1 & 31);
                if req.p2 == 0 {
                    config.levels &= !bit;
                } else {
                    config.levels |= bit;
                }
                MockReply::Value(0)
            }
            MODES => {
                lock(&self.modes).insert(req.p1, req.p2);
                MockReply::Value(0)
            }
            MODEG => MockReply::Value(lock(&self.modes).get(&req.p1).copied().unwrap_or(0)),
            _ => MockReply::Value(0),
        }
    }

    /// Log the request and build the bytes to send back, if any
    fn reply_to(&self, req: &Request) -> Option<Bytes> {
        lock(&self.requests).push(req.clone());

        let scripted = lock(&self.scripted)
            .get_mut(&req.command)
            .and_then(VecDeque::pop_front);
        let reply = scripted
            .or_else(|| lock(&self.fixed).get(&req.command).cloned())
            .unwrap_or_else(|| self.default_reply(req));

        let result = match reply {
            MockReply::Value(v) => ResponseResult::Value(v),
            MockReply::Error(code) => ResponseResult::Error(code),
            MockReply::Extended(ext) if ext.is_empty() => ResponseResult::Value(0),
            MockReply::Extended(ext) => ResponseResult::Extended(Bytes::from(ext)),
            MockReply::Silent => return None,
            MockReply::Raw(bytes) => return Some(Bytes::from(bytes)),
        };
        Some(encode_response(&ResponseFrame {
            command: req.command,
            p1: req.p1,
            p2: req.p2,
            result,
        }))
    }

    fn noib_reply(&self) -> Option<Bytes> {
        let handle = lock(&self.config).handle;
        let reply = lock(&self.noib_reply)
            .clone()
            .unwrap_or(MockReply::Value(handle as u32));
        let result = match reply {
            MockReply::Value(v) => ResponseResult::Value(v),
            MockReply::Error(code) => ResponseResult::Error(code),
            MockReply::Extended(_) | MockReply::Silent => return None,
            MockReply::Raw(bytes) => return Some(Bytes::from(bytes)),
        };
        Some(encode_response(&ResponseFrame {
            command: NOIB,
            p1: 0,
            p2: 0,
            result,
        }))
    }
}

/// A fake pigpio daemon on 127.0.0.1
///
/// Every accepted socket is classified by its first request: `NOIB` makes it
/// a notification socket, anything else a command socket. Command requests
/// are logged and answered from the script, the fixed replies, or a small
/// built-in model of the daemon.
pub struct MockDaemon {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl MockDaemon {
    /// Start on an ephemeral port with default state
    pub async fn start() -> crate::Result<Self> {
        Self::start_with(MockConfig::default()).await
    }

    /// Start on an ephemeral port with the given state
    pub async fn start_with(config: MockConfig) -> crate::Result<Self> {
        Self::start_on(0, config).await
    }

    /// Start on a specific port
    pub async fn start_on(port: u16, config: MockConfig) -> crate::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;

        let (held, _) = watch::channel(false);
        let (kill, _) = broadcast::channel(4);
        let shared = Arc::new(Shared {
            config: Mutex::new(config),
            modes: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            fixed: Mutex::new(HashMap::new()),
            noib_reply: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
            held,
            kill,
            command_connections: AtomicUsize::new(0),
            notification_connections: AtomicUsize::new(0),
            started: Instant::now(),
        });

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("mock daemon accepted {}", peer);
                tokio::spawn(serve(stream, accept_shared.clone()));
            }
        });

        Ok(Self {
            addr,
            shared,
            accept_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Answer the next `command` request with `reply`, once
    pub fn script_reply(&self, command: u32, reply: MockReply) {
        lock(&self.shared.scripted)
            .entry(command)
            .or_default()
            .push_back(reply);
    }

    /// Answer every `command` request with `reply` until changed
    pub fn set_reply(&self, command: u32, reply: MockReply) {
        lock(&self.shared.fixed).insert(command, reply);
    }

    /// Override the NOIB handshake reply (`Raw` for a malformed echo)
    pub fn set_noib_reply(&self, reply: MockReply) {
        *lock(&self.shared.noib_reply) = Some(reply);
    }

    pub fn set_levels(&self, levels: u32) {
        lock(&self.shared.config).levels = levels;
    }

    pub fn levels(&self) -> u32 {
        lock(&self.shared.config).levels
    }

    pub fn set_handle(&self, handle: i32) {
        lock(&self.shared.config).handle = handle;
    }

    /// Buffer command replies instead of sending them
    pub fn hold_replies(&self) {
        self.shared.held.send_replace(true);
    }

    /// Flush buffered replies in order and stop buffering
    pub fn release_replies(&self) {
        self.shared.held.send_replace(false);
    }

    /// Every command socket request received so far
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.shared.requests).clone()
    }

    /// Command codes received so far, in order
    pub fn commands(&self) -> Vec<u32> {
        lock(&self.shared.requests)
            .iter()
            .map(|r| r.command)
            .collect()
    }

    /// Number of requests received for `command`
    pub fn count(&self, command: u32) -> usize {
        lock(&self.shared.requests)
            .iter()
            .filter(|r| r.command == command)
            .count()
    }

    pub fn clear_requests(&self) {
        lock(&self.shared.requests).clear();
    }

    /// Send a record to every open notification socket
    pub fn push_notification(&self, record: &NotificationRecord) -> usize {
        self.push_raw(&record.encode())
    }

    /// Send raw bytes to every open notification socket
    ///
    /// Returns the number of sockets written to.
    pub fn push_raw(&self, bytes: &[u8]) -> usize {
        let bytes = Bytes::copy_from_slice(bytes);
        let mut sinks = lock(&self.shared.sinks);
        sinks.retain(|sink| sink.send(bytes.clone()).is_ok());
        sinks.len()
    }

    /// Number of notification sockets still open
    pub fn open_notification_sockets(&self) -> usize {
        let mut sinks = lock(&self.shared.sinks);
        sinks.retain(|sink| !sink.is_closed());
        sinks.len()
    }

    /// Close every accepted socket; the listener keeps accepting
    pub fn disconnect_all(&self) {
        let _ = self.shared.kill.send(());
        lock(&self.shared.sinks).clear();
    }

    /// Total command sockets accepted
    pub fn command_connections(&self) -> usize {
        self.shared.command_connections.load(Ordering::SeqCst)
    }

    /// Total notification sockets accepted
    pub fn notification_connections(&self) -> usize {
        self.shared.notification_connections.load(Ordering::SeqCst)
    }

    /// Poll `condition` until it holds or [`DEFAULT_TEST_TIMEOUT`] passes
    pub async fn wait_for<F>(&self, mut condition: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + DEFAULT_TEST_TIMEOUT;
        while Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition(self)
    }

    /// Stop accepting and close every socket
    pub fn shutdown(&self) {
        self.accept_task.abort();
        self.disconnect_all();
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let mut kill = shared.kill.subscribe();
    let (mut rd, wr) = stream.into_split();

    let first = tokio::select! {
        req = read_request_async(&mut rd) => req,
        _ = kill.recv() => return,
    };
    let Ok(first) = first else {
        return;
    };

    if first.command == NOIB {
        serve_notifications(rd, wr, kill, shared).await;
    } else {
        serve_commands(first, rd, wr, kill, shared).await;
    }
}

async fn serve_notifications(
    mut rd: OwnedReadHalf,
    mut wr: OwnedWriteHalf,
    mut kill: broadcast::Receiver<()>,
    shared: Arc<Shared>,
) {
    shared
        .notification_connections
        .fetch_add(1, Ordering::SeqCst);

    if let Some(reply) = shared.noib_reply()
        && wr.write_all(&reply).await.is_err()
    {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    lock(&shared.sinks).push(tx);

    let mut scratch = [0u8; 64];
    loop {
        tokio::select! {
            bytes = rx.recv() => match bytes {
                Some(bytes) => {
                    if wr.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            n = rd.read(&mut scratch) => match n {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
            _ = kill.recv() => break,
        }
    }
}

async fn serve_commands(
    first: Request,
    mut rd: OwnedReadHalf,
    mut wr: OwnedWriteHalf,
    mut kill: broadcast::Receiver<()>,
    shared: Arc<Shared>,
) {
    shared.command_connections.fetch_add(1, Ordering::SeqCst);

    let (req_tx, mut req_rx) = mpsc::unbounded_channel();
    let _ = req_tx.send(first);
    let reader = tokio::spawn(async move {
        while let Ok(req) = read_request_async(&mut rd).await {
            if req_tx.send(req).is_err() {
                break;
            }
        }
    });

    let mut held_rx = shared.held.subscribe();
    let mut pending: Vec<Bytes> = Vec::new();

    loop {
        tokio::select! {
            req = req_rx.recv() => {
                let Some(req) = req else { break };
                let Some(reply) = shared.reply_to(&req) else { continue };
                let held = *held_rx.borrow();
                if held {
                    pending.push(reply);
                } else if wr.write_all(&reply).await.is_err() {
                    break;
                }
            }
            changed = held_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let held = *held_rx.borrow_and_update();
                if !held {
                    let mut failed = false;
                    for reply in pending.drain(..) {
                        if wr.write_all(&reply).await.is_err() {
                            failed = true;
                            break;
                        }
                    }
                    if failed {
                        break;
                    }
                }
            }
            _ = kill.recv() => break,
        }
    }

    reader.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{RECORD_SIZE, open_notification_handle, read_response_async, write_request_async};

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
        })
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_record_builders() {
        assert_eq!(event_record(0, 1, 31).flags, NTFY_FLAGS_EVENT | 31);
        assert_eq!(keepalive_record(0, 1, 5).flags, NTFY_FLAGS_ALIVE);
        assert_eq!(watchdog_record(0, 1, 4, 0).flags, NTFY_FLAGS_WDOG | 4);
    }

    #[tokio::test]
    async fn test_mock_daemon_answers_commands() {
        let daemon = MockDaemon::start().await.unwrap();
        daemon.script_reply(READ, MockReply::Error(-3));

        let mut stream = TcpStream::connect(daemon.addr()).await.unwrap();
        write_request_async(&mut stream, &Request::new(PIGPV, 0, 0, 0))
            .await
            .unwrap();
        let reply = read_response_async(&mut stream).await.unwrap();
        assert_eq!(reply.result, ResponseResult::Value(79));

        write_request_async(&mut stream, &Request::new(READ, 4, 0, 0))
            .await
            .unwrap();
        let reply = read_response_async(&mut stream).await.unwrap();
        assert_eq!(reply.result, ResponseResult::Error(-3));
        assert_eq!(reply.p1, 4);

        assert_eq!(daemon.commands(), vec![PIGPV, READ]);
        assert_eq!(daemon.command_connections(), 1);
    }

    #[tokio::test]
    async fn test_mock_daemon_notification_socket() {
        let daemon = MockDaemon::start_with(MockConfig {
            handle: 3,
            ..Default::default()
        })
        .await
        .unwrap();

        let mut stream = TcpStream::connect(daemon.addr()).await.unwrap();
        assert_eq!(open_notification_handle(&mut stream).await.unwrap(), 3);
        assert!(daemon.wait_for(|d| d.open_notification_sockets() == 1).await);

        assert_eq!(daemon.push_notification(&level_record(1, 10, 0xF0)), 1);
        let mut raw = [0u8; RECORD_SIZE];
        stream.read_exact(&mut raw).await.unwrap();
        assert_eq!(NotificationRecord::decode(&raw).levels, 0xF0);

        daemon.disconnect_all();
        let n = stream.read(&mut raw).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_mock_daemon_holds_replies() {
        let daemon = MockDaemon::start().await.unwrap();
        daemon.hold_replies();

        let mut stream = TcpStream::connect(daemon.addr()).await.unwrap();
        write_request_async(&mut stream, &Request::new(WRITE, 4, 1, 0))
            .await
            .unwrap();
        assert!(daemon.wait_for(|d| d.count(WRITE) == 1).await);

        let pending = with_timeout(Duration::from_millis(50), read_response_async(&mut stream)).await;
        assert!(pending.is_err());

        daemon.release_replies();
        let reply = read_response_async(&mut stream).await.unwrap();
        assert_eq!(reply.command, WRITE);
        assert_eq!(daemon.levels(), 1 << 4);
    }
}
