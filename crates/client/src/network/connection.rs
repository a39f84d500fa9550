//! Per-socket connection handling
//!
//! A session owns two [`Link`]s, one per socket role. A link tracks its
//! lifecycle state, the retry schedule, and the tasks that move bytes between
//! the TCP stream and the session task. Every connection attempt gets a fresh
//! generation number; events carrying an older generation are stale and must
//! be ignored by the owner.

use bytes::{Bytes, BytesMut};
use protocol::{ProtocolError, open_notification_handle};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Read buffer size for socket reader tasks
const READ_CHUNK: usize = 4096;

/// Which of the two daemon sockets a link drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketRole {
    Command,
    Notification,
}

impl std::fmt::Display for SocketRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketRole::Command => write!(f, "command socket"),
            SocketRole::Notification => write!(f, "notification socket"),
        }
    }
}

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No socket and no attempt in progress
    Disconnected,
    /// TCP connect (and NOIB for notifications) in progress
    Connecting,
    /// Waiting for the backoff before the next attempt
    RetryPending,
    /// Transport up, session handshake not finished
    Handshaking,
    /// Fully usable
    Connected,
}

/// Something that happened on a link, forwarded to the session task
#[derive(Debug)]
pub struct LinkEvent {
    pub role: SocketRole,
    pub generation: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug)]
pub enum LinkEventKind {
    /// TCP connected; notification links also finished NOIB
    Established {
        stream: TcpStream,
        /// Signed NOIB result for notification links
        handle: Option<i32>,
    },
    /// TCP connect failed
    ConnectFailed(std::io::Error),
    /// Connected but NOIB was rejected or malformed
    HandshakeFailed(ProtocolError),
    /// Bytes read from the socket
    Data(Bytes),
    /// Peer closed the socket
    Closed,
    /// Read or write failed on an open socket
    Failed(std::io::Error),
}

/// What to do after a failed connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again at the given instant
    RetryAt(Instant),
    /// Retry window open but the backoff lies past any representable instant
    Wait,
    /// No retry window configured
    GiveUp,
}

/// Timer that fired on a retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTick {
    /// Backoff elapsed, attempt again
    Reconnect,
    /// Overall retry window elapsed
    Expired,
}

/// Overall retry window plus the pending backoff
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    backoff: Duration,
    armed: bool,
    /// None while armed means the window never closes
    deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl RetrySchedule {
    pub fn new(backoff: Duration) -> Self {
        Self {
            backoff,
            armed: false,
            deadline: None,
            reconnect_at: None,
        }
    }

    /// Start the retry window; a zero timeout leaves it unarmed
    pub fn arm(&mut self, now: Instant, timeout: Duration) {
        self.reconnect_at = None;
        self.armed = !timeout.is_zero();
        self.deadline = if self.armed {
            now.checked_add(timeout)
        } else {
            None
        };
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn on_failure(&mut self, now: Instant) -> RetryDecision {
        if !self.armed {
            return RetryDecision::GiveUp;
        }
        self.reconnect_at = now.checked_add(self.backoff);
        match self.reconnect_at {
            Some(at) => RetryDecision::RetryAt(at),
            None => RetryDecision::Wait,
        }
    }

    pub fn cancel(&mut self) {
        self.armed = false;
        self.deadline = None;
        self.reconnect_at = None;
    }

    /// Earliest instant at which [`poll`](Self::poll) has something to report
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.deadline, self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Report a due timer; expiry wins over a reconnect due at the same time
    pub fn poll(&mut self, now: Instant) -> Option<RetryTick> {
        if self.deadline.is_some_and(|d| d <= now) {
            self.cancel();
            return Some(RetryTick::Expired);
        }
        if self.reconnect_at.is_some_and(|r| r <= now) {
            self.reconnect_at = None;
            return Some(RetryTick::Reconnect);
        }
        None
    }
}

/// One daemon socket and the tasks serving it
pub struct Link {
    role: SocketRole,
    state: LinkState,
    generation: u64,
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    tasks: Vec<JoinHandle<()>>,
    pub retry: RetrySchedule,
}

impl Link {
    pub fn new(role: SocketRole, backoff: Duration) -> Self {
        Self {
            role,
            state: LinkState::Disconnected,
            generation: 0,
            writer: None,
            tasks: Vec::new(),
            retry: RetrySchedule::new(backoff),
        }
    }

    pub fn role(&self) -> SocketRole {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn set_state(&mut self, state: LinkState) {
        debug!("{}: {:?} -> {:?}", self.role, self.state, state);
        self.state = state;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Anything in progress or up
    pub fn is_active(&self) -> bool {
        self.state != LinkState::Disconnected
    }

    /// Transport is up
    pub fn is_open(&self) -> bool {
        matches!(self.state, LinkState::Handshaking | LinkState::Connected)
    }

    /// Spawn one connect attempt
    pub fn attempt(&mut self, host: &str, port: u16, events: mpsc::UnboundedSender<LinkEvent>) {
        self.abort_tasks();
        self.generation += 1;
        self.set_state(LinkState::Connecting);

        let role = self.role;
        let generation = self.generation;
        let host = host.to_string();
        self.tasks.push(tokio::spawn(async move {
            let kind = match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => establish(role, stream).await,
                Err(e) => LinkEventKind::ConnectFailed(e),
            };
            let _ = events.send(LinkEvent {
                role,
                generation,
                kind,
            });
        }));
    }

    /// Take ownership of a connected stream and start its reader and writer
    pub fn attach(&mut self, stream: TcpStream, events: mpsc::UnboundedSender<LinkEvent>) {
        self.abort_tasks();
        let _ = stream.set_nodelay(true);
        let (rd, wr) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        self.tasks
            .push(spawn_reader(self.role, self.generation, rd, events.clone()));
        self.tasks
            .push(spawn_writer(self.role, self.generation, wr, rx, events));
        self.writer = Some(tx);
        self.set_state(LinkState::Handshaking);
    }

    /// Queue bytes for the writer task; false when there is no open socket
    pub fn send(&self, bytes: Bytes) -> bool {
        match &self.writer {
            Some(writer) => writer.send(bytes).is_ok(),
            None => false,
        }
    }

    /// Drop the socket and every task; returns whether the transport was open
    pub fn teardown(&mut self) -> bool {
        let was_open = self.is_open();
        self.abort_tasks();
        self.writer = None;
        self.retry.cancel();
        self.generation += 1;
        if self.state != LinkState::Disconnected {
            self.set_state(LinkState::Disconnected);
        }
        was_open
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn establish(role: SocketRole, mut stream: TcpStream) -> LinkEventKind {
    match role {
        SocketRole::Command => LinkEventKind::Established {
            stream,
            handle: None,
        },
        SocketRole::Notification => match open_notification_handle(&mut stream).await {
            Ok(handle) => LinkEventKind::Established {
                stream,
                handle: Some(handle),
            },
            Err(e) => LinkEventKind::HandshakeFailed(e),
        },
    }
}

fn spawn_reader(
    role: SocketRole,
    generation: u64,
    mut rd: OwnedReadHalf,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            buf.reserve(READ_CHUNK);
            let kind = match rd.read_buf(&mut buf).await {
                Ok(0) => LinkEventKind::Closed,
                Ok(n) => {
                    trace!("{} read {} bytes", role, n);
                    LinkEventKind::Data(buf.split().freeze())
                }
                Err(e) => LinkEventKind::Failed(e),
            };
            let done = !matches!(kind, LinkEventKind::Data(_));
            if events
                .send(LinkEvent {
                    role,
                    generation,
                    kind,
                })
                .is_err()
                || done
            {
                break;
            }
        }
    })
}

fn spawn_writer(
    role: SocketRole,
    generation: u64,
    mut wr: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = wr.write_all(&bytes).await {
                let _ = events.send(LinkEvent {
                    role,
                    generation,
                    kind: LinkEventKind::Failed(e),
                });
                return;
            }
        }
        let _ = wr.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::commands::NOIB;
    use tokio::net::TcpListener;

    #[test]
    fn test_retry_unarmed_gives_up() {
        let mut retry = RetrySchedule::new(Duration::from_secs(5));
        let now = Instant::now();
        retry.arm(now, Duration::ZERO);
        assert!(!retry.is_armed());
        assert_eq!(retry.on_failure(now), RetryDecision::GiveUp);
        assert_eq!(retry.next_deadline(), None);
    }

    #[test]
    fn test_retry_backoff_then_expiry() {
        let mut retry = RetrySchedule::new(Duration::from_secs(5));
        let now = Instant::now();
        retry.arm(now, Duration::from_secs(60));

        let at = now + Duration::from_secs(5);
        assert_eq!(retry.on_failure(now), RetryDecision::RetryAt(at));
        assert_eq!(retry.next_deadline(), Some(at));
        assert_eq!(retry.poll(now), None);
        assert_eq!(retry.poll(at), Some(RetryTick::Reconnect));
        assert_eq!(retry.next_deadline(), Some(now + Duration::from_secs(60)));

        retry.on_failure(now + Duration::from_secs(58));
        assert_eq!(
            retry.poll(now + Duration::from_secs(63)),
            Some(RetryTick::Expired)
        );
        assert!(!retry.is_armed());
        assert_eq!(retry.next_deadline(), None);
    }

    #[test]
    fn test_retry_huge_durations() {
        let now = Instant::now();
        let mut retry = RetrySchedule::new(Duration::MAX);
        retry.arm(now, Duration::MAX);
        assert!(retry.is_armed());
        assert_eq!(retry.next_deadline(), None);

        assert_eq!(retry.on_failure(now), RetryDecision::Wait);
        assert_eq!(retry.next_deadline(), None);
        assert_eq!(retry.poll(now + Duration::from_secs(86_400)), None);

        retry.cancel();
        assert_eq!(retry.on_failure(now), RetryDecision::GiveUp);
    }

    #[test]
    fn test_retry_cancel() {
        let mut retry = RetrySchedule::new(Duration::from_millis(10));
        let now = Instant::now();
        retry.arm(now, Duration::from_secs(1));
        retry.on_failure(now);
        retry.cancel();
        assert_eq!(retry.poll(now + Duration::from_secs(2)), None);
    }

    #[tokio::test]
    async fn test_command_link_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut link = Link::new(SocketRole::Command, Duration::from_secs(5));
        link.attempt("127.0.0.1", port, tx.clone());
        assert_eq!(link.state(), LinkState::Connecting);

        let (mut server, _) = listener.accept().await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(link.is_current(event.generation));
        let LinkEventKind::Established { stream, handle } = event.kind else {
            panic!("expected established");
        };
        assert_eq!(handle, None);

        link.attach(stream, tx);
        assert!(link.is_open());
        assert!(link.send(Bytes::from_static(b"ping")));

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, LinkEventKind::Data(ref b) if b.as_ref() == b"pong"));

        drop(server);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, LinkEventKind::Closed));

        assert!(link.teardown());
        assert!(!link.is_current(event.generation));
        assert!(!link.send(Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn test_notification_link_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut link = Link::new(SocketRole::Notification, Duration::from_secs(5));
        link.attempt("127.0.0.1", port, tx);

        let (mut server, _) = listener.accept().await.unwrap();
        let mut req = [0u8; 16];
        server.read_exact(&mut req).await.unwrap();
        let mut reply = Vec::new();
        for word in [NOIB, 0, 0, 4] {
            reply.extend_from_slice(&word.to_le_bytes());
        }
        server.write_all(&reply).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.kind,
            LinkEventKind::Established {
                handle: Some(4),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = Link::new(SocketRole::Command, Duration::from_secs(5));
        link.attempt("127.0.0.1", port, tx);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, LinkEventKind::ConnectFailed(_)));
    }
}
