//! pigpio session
//!
//! A [`PigpioClient`] is a cheap handle onto one session task. The task owns
//! both daemon sockets, the request pipeline, the watcher registry and the
//! session info; handles talk to it over a bounded command channel and get
//! answers back on oneshot channels. Nothing in here is shared behind a lock.
//!
//! Session lifecycle (connected, disconnected, errors, hardware events) is
//! published on a broadcast channel, see [`PigpioClient::subscribe`].

use async_channel::TrySendError;
use bytes::Bytes;
use protocol::commands::{BR1, EVM, HC, HWVER, NB, NC, NP, PIGPV, TICK};
use protocol::{RecordBuffer, RecordKind, Request, ResponseFrame, encode_request};
use std::future::Future;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::connection::{
    Link, LinkEvent, LinkEventKind, LinkState, RetryDecision, RetryTick, SocketRole,
};
use super::info::SessionInfo;
use super::keepalive::{KEEPALIVE_REASON, KeepAlive};
use super::notify::{WatchCallback, WatchEvent, WatcherId, WatcherRegistry};
use super::pipeline::{Outbound, RequestPipeline};
use super::response::{Reply, ResponseAssembler, frame_result};
use crate::config::SessionConfig;
use crate::error::{ClientError, Result};

/// Command channel depth between handles and the session task
const INBOX_CAPACITY: usize = 256;

/// Lagging subscribers lose the oldest events beyond this
const EVENT_CAPACITY: usize = 64;

/// EVM mask bit for the BSC peripheral event
const BSC_EVENT_BIT: u32 = 1 << 31;

const REASON_CLIENT_CLOSED: &str = "connection closed by client";
const REASON_DESTROYED: &str = "destroyed";
const REASON_RETRY_EXPIRED: &str = "could not connect";
const REASON_PROTOCOL: &str = "pigpio protocol error";

/// Session lifecycle events
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Both sockets are up and the handshake finished
    Connected(SessionInfo),
    /// The session went down
    Disconnected(String),
    /// Asynchronous error with no caller to report it to
    Error(ClientError),
    /// Hardware event record; id 31 is the BSC peripheral
    HardwareEvent { id: u8, tick: u32 },
}

/// Where a response goes once it arrives
enum Completion {
    Caller(oneshot::Sender<Result<Reply>>),
    /// Errors surface as [`SessionEvent::Error`]
    Detached,
    Internal(InternalOp),
}

/// Requests the session issues on its own behalf
enum InternalOp {
    ProtocolVersion,
    HardwareVersion,
    PrimeLevels,
    EnableEvents,
    RearmWatchers,
    StartWatcher {
        id: WatcherId,
        responder: oneshot::Sender<Result<WatcherId>>,
    },
    StopWatcher {
        id: WatcherId,
        responder: oneshot::Sender<Result<()>>,
    },
}

enum SessionCommand {
    Connect {
        target: Option<(String, u16)>,
        responder: oneshot::Sender<Result<SessionInfo>>,
    },
    Close {
        reason: &'static str,
        responder: oneshot::Sender<()>,
    },
    Request {
        command: u32,
        wire: Bytes,
        completion: Completion,
    },
    /// Request whose first parameter is the notification handle
    HandleRequest {
        command: u32,
        responder: oneshot::Sender<Result<Reply>>,
    },
    StartWatcher {
        bits: u32,
        callback: WatchCallback,
        responder: oneshot::Sender<Result<WatcherId>>,
    },
    StopWatcher {
        id: WatcherId,
        responder: oneshot::Sender<Result<()>>,
    },
    Info {
        responder: oneshot::Sender<SessionInfo>,
    },
    Handle {
        responder: oneshot::Sender<Option<u32>>,
    },
    EmitError(ClientError),
}

/// Handle onto a pigpio session
///
/// Clones share the same session. The session task exits once every handle
/// has been dropped.
///
/// # Example
/// ```no_run
/// use client::{PigpioClient, SessionConfig};
///
/// # async fn demo() -> client::Result<()> {
/// let pi = PigpioClient::new(SessionConfig::new("raspberrypi", 8888));
/// let info = pi.connect().await?;
/// println!("pigpio v{} on hardware type {}", info.pigpio_version, info.hardware_type);
/// let tick = pi.get_current_tick().await?;
/// println!("tick {}", tick);
/// pi.end().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PigpioClient {
    inbox: async_channel::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl PigpioClient {
    /// Start a session task; no connection is made until [`connect`](Self::connect)
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        let (inbox, inbox_rx) = async_channel::bounded(INBOX_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let actor = SessionActor::new(config, events.clone(), link_tx);
        tokio::spawn(actor.run(inbox_rx, link_rx));

        Self { inbox, events }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Open both sockets and run the handshake
    ///
    /// Resolves once the session is ready. With a retry timeout configured,
    /// failed attempts are retried until it expires. Calling this on a live
    /// session drops the current connection first.
    pub async fn connect(&self) -> Result<SessionInfo> {
        self.call(|responder| SessionCommand::Connect {
            target: None,
            responder,
        })
        .await?
    }

    /// Like [`connect`](Self::connect) but to a different daemon
    pub async fn connect_to(&self, host: impl Into<String>, port: u16) -> Result<SessionInfo> {
        let target = Some((host.into(), port));
        self.call(|responder| SessionCommand::Connect { target, responder })
            .await?
    }

    /// Close both sockets; resolves after the disconnected event
    pub async fn end(&self) -> Result<()> {
        self.close(REASON_CLIENT_CLOSED).await
    }

    /// Drop both sockets immediately
    pub async fn destroy(&self) -> Result<()> {
        self.close(REASON_DESTROYED).await
    }

    async fn close(&self, reason: &'static str) -> Result<()> {
        self.call(|responder| SessionCommand::Close { reason, responder })
            .await
    }

    /// Send a command and wait for its response
    ///
    /// Daemon error codes come back as [`ClientError::Pigpio`].
    pub async fn request(&self, command: u32, p1: u32, p2: u32, p3: u32) -> Result<Reply> {
        self.send_request(Request::new(command, p1, p2, p3)).await
    }

    /// Send an extended-request command with its payload
    pub async fn request_ext(
        &self,
        command: u32,
        p1: u32,
        p2: u32,
        extension: impl Into<Bytes>,
    ) -> Result<Reply> {
        self.send_request(Request::with_extension(command, p1, p2, extension))
            .await
    }

    /// Send any request and wait for its response
    pub async fn send_request(&self, request: Request) -> Result<Reply> {
        let wire = encode_request(&request)?;
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Request {
            command: request.command,
            wire,
            completion: Completion::Caller(tx),
        })
        .await?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Send a request without waiting; a failure becomes a session error event
    pub async fn submit(&self, request: Request) -> Result<()> {
        let wire = encode_request(&request)?;
        self.send(SessionCommand::Request {
            command: request.command,
            wire,
            completion: Completion::Detached,
        })
        .await
    }

    /// Callback form of [`request`](Self::request)
    ///
    /// The request is queued before this returns, so consecutive calls reach
    /// the daemon in call order. Only the wait for the response runs on a
    /// spawned task. A full command channel fails the request instead of
    /// waiting.
    pub fn request_with<F>(&self, command: u32, p1: u32, p2: u32, p3: u32, callback: F)
    where
        F: FnOnce(Result<Reply>) + Send + 'static,
    {
        let queued = encode_request(&Request::new(command, p1, p2, p3))
            .map_err(ClientError::from)
            .and_then(|wire| {
                let (tx, rx) = oneshot::channel();
                self.inbox
                    .try_send(SessionCommand::Request {
                        command,
                        wire,
                        completion: Completion::Caller(tx),
                    })
                    .map_err(|e| match e {
                        TrySendError::Full(_) => {
                            ClientError::Internal("session command channel full".to_string())
                        }
                        TrySendError::Closed(_) => ClientError::SessionClosed,
                    })?;
                Ok(rx)
            });

        tokio::spawn(async move {
            let result = match queued {
                Ok(rx) => rx.await.unwrap_or(Err(ClientError::SessionClosed)),
                Err(e) => Err(e),
            };
            callback(result);
        });
    }

    /// Watch the bank 1 bits in `bits`
    ///
    /// The callback runs on the session task for every change that touches
    /// one of the bits, and once more with [`WatchEvent::Stopped`] when the
    /// watcher goes away. At most 32 watchers can be registered.
    pub async fn start_notifications<F>(&self, bits: u32, callback: F) -> Result<WatcherId>
    where
        F: FnMut(WatchEvent) + Send + 'static,
    {
        let callback: WatchCallback = Box::new(callback);
        self.call(|responder| SessionCommand::StartWatcher {
            bits,
            callback,
            responder,
        })
        .await?
    }

    /// Channel form of [`start_notifications`](Self::start_notifications)
    ///
    /// The stream ends after [`WatchEvent::Stopped`].
    pub async fn watch(&self, bits: u32) -> Result<(WatcherId, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .start_notifications(bits, move |event| {
                let _ = tx.send(event);
            })
            .await?;
        Ok((id, rx))
    }

    /// Remove a watcher; its callback gets the terminal event first
    pub async fn stop_notifications(&self, id: WatcherId) -> Result<()> {
        self.call(|responder| SessionCommand::StopWatcher { id, responder })
            .await?
    }

    /// Pause reports on the notification handle (NP)
    pub async fn pause_notifications(&self) -> Result<()> {
        self.handle_request(NP).await.map(|_| ())
    }

    /// Close the notification handle (NC)
    ///
    /// The daemon drops the notification socket afterwards, which ends the
    /// session.
    pub async fn close_notifications(&self) -> Result<()> {
        self.handle_request(NC).await.map(|_| ())
    }

    async fn handle_request(&self, command: u32) -> Result<Reply> {
        self.call(|responder| SessionCommand::HandleRequest { command, responder })
            .await?
    }

    /// Snapshot of the session info
    pub async fn info(&self) -> Result<SessionInfo> {
        self.call(|responder| SessionCommand::Info { responder })
            .await
    }

    /// Notification handle, when the notification socket is up
    pub async fn handle(&self) -> Result<Option<u32>> {
        self.call(|responder| SessionCommand::Handle { responder })
            .await
    }

    /// Publish an error on the session event channel
    pub async fn emit_error(&self, error: ClientError) -> Result<()> {
        self.send(SessionCommand::EmitError(error)).await
    }

    /// Microseconds since daemon boot, wrapping at 2^32
    pub async fn get_current_tick(&self) -> Result<u32> {
        Ok(self.request(TICK, 0, 0, 0).await?.value)
    }

    /// Levels of GPIO 0-31
    pub async fn read_bank1(&self) -> Result<u32> {
        Ok(self.request(BR1, 0, 0, 0).await?.value)
    }

    /// Start a hardware clock on `gpio`
    pub async fn hw_clock(&self, gpio: u32, frequency: u32) -> Result<()> {
        self.request(HC, gpio, frequency, 0).await.map(|_| ())
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.inbox
            .send(command)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }
}

/// State owned by the session task
struct SessionActor {
    config: SessionConfig,
    info: SessionInfo,
    command: Link,
    notification: Link,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    pipeline: RequestPipeline<Completion>,
    assembler: ResponseAssembler,
    records: RecordBuffer,
    watchers: WatcherRegistry,
    keepalive: KeepAlive,
    /// Notification handle from NOIB
    handle: Option<u32>,
    /// `Connected` already published for this connection
    announced: bool,
    connect_waiters: Vec<oneshot::Sender<Result<SessionInfo>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionActor {
    fn new(
        config: SessionConfig,
        events: broadcast::Sender<SessionEvent>,
        link_tx: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            info: SessionInfo::new(&config),
            command: Link::new(SocketRole::Command, config.retry_backoff),
            notification: Link::new(SocketRole::Notification, config.retry_backoff),
            link_tx,
            pipeline: RequestPipeline::new(config.pipelining),
            assembler: ResponseAssembler::new(),
            records: RecordBuffer::new(),
            watchers: WatcherRegistry::new(),
            keepalive: KeepAlive::new(config.keepalive),
            handle: None,
            announced: false,
            connect_waiters: Vec::new(),
            events,
            config,
        }
    }

    async fn run(
        mut self,
        inbox: async_channel::Receiver<SessionCommand>,
        mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    ) {
        debug!("Session task started for {}", self.config.address());
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = inbox.recv() => match command {
                    Ok(command) => self.handle_command(command),
                    Err(_) => break,
                },
                Some(event) = link_rx.recv() => self.handle_link_event(event),
                _ = sleep_until_opt(deadline) => self.handle_timers(Instant::now()),
            }
        }

        self.shutdown("session dropped", ClientError::SessionClosed, false);
        self.watchers.stop_all();
        debug!("Session task stopped for {}", self.config.address());
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.command.retry.next_deadline(),
            self.notification.retry.next_deadline(),
            self.keepalive.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn link_mut(&mut self, role: SocketRole) -> &mut Link {
        match role {
            SocketRole::Command => &mut self.command,
            SocketRole::Notification => &mut self.notification,
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { target, responder } => self.connect(target, responder),
            SessionCommand::Close { reason, responder } => {
                self.shutdown(reason, ClientError::Abandoned, true);
                let _ = responder.send(());
            }
            SessionCommand::Request {
                command,
                wire,
                completion,
            } => self.submit(command, wire, completion),
            SessionCommand::HandleRequest { command, responder } => match self.handle {
                Some(handle) => self.submit_request(
                    Request::new(command, handle, 0, 0),
                    Completion::Caller(responder),
                ),
                None => {
                    let _ = responder.send(Err(ClientError::NotConnected));
                }
            },
            SessionCommand::StartWatcher {
                bits,
                callback,
                responder,
            } => self.start_watcher(bits, callback, responder),
            SessionCommand::StopWatcher { id, responder } => self.stop_watcher(id, responder),
            SessionCommand::Info { responder } => {
                let _ = responder.send(self.info.clone());
            }
            SessionCommand::Handle { responder } => {
                let _ = responder.send(self.handle);
            }
            SessionCommand::EmitError(error) => self.emit(SessionEvent::Error(error)),
        }
    }

    fn connect(
        &mut self,
        target: Option<(String, u16)>,
        responder: oneshot::Sender<Result<SessionInfo>>,
    ) {
        if self.command.is_active() || self.notification.is_active() {
            debug!("Reconnect requested, dropping current connection");
            self.shutdown(REASON_CLIENT_CLOSED, ClientError::Abandoned, false);
        }

        if let Some((host, port)) = target {
            self.config.host = host;
            self.config.port = port;
        }
        self.info.host = self.config.host.clone();
        self.info.port = self.config.port;
        self.info.pipelining = self.config.pipelining;
        self.info.timeout = self.config.retry_timeout;
        self.connect_waiters.push(responder);

        info!("Connecting to pigpio daemon at {}", self.config.address());
        let now = Instant::now();
        for role in [SocketRole::Command, SocketRole::Notification] {
            let (host, port, timeout) = (
                self.config.host.clone(),
                self.config.port,
                self.config.retry_timeout,
            );
            let events = self.link_tx.clone();
            let link = self.link_mut(role);
            link.retry.arm(now, timeout);
            link.attempt(&host, port, events);
        }
    }

    fn submit_request(&mut self, request: Request, completion: Completion) {
        match encode_request(&request) {
            Ok(wire) => self.submit(request.command, wire, completion),
            Err(e) => self.complete(completion, Err(e.into())),
        }
    }

    fn submit(&mut self, command: u32, wire: Bytes, completion: Completion) {
        if !self.command.is_open() {
            self.complete(completion, Err(ClientError::NotConnected));
            return;
        }
        trace!("queue {} ({} bytes)", protocol::command_name(command).unwrap_or("?"), wire.len());
        if let Some(bytes) = self.pipeline.submit(Outbound {
            command,
            wire,
            completion,
        }) {
            self.command.send(bytes);
        }
    }

    fn start_watcher(
        &mut self,
        bits: u32,
        callback: WatchCallback,
        responder: oneshot::Sender<Result<WatcherId>>,
    ) {
        let Some(handle) = self.handle.filter(|_| self.command.is_open()) else {
            let _ = responder.send(Err(ClientError::NotConnected));
            return;
        };

        let first = self.watchers.mask() == 0;
        let id = match self.watchers.register(bits, callback) {
            Ok(id) => id,
            Err(e) => {
                let _ = responder.send(Err(e));
                return;
            }
        };
        debug!("Watcher {} registered for bits {:#010x}", id, bits);

        if first {
            self.submit_request(
                Request::new(BR1, 0, 0, 0),
                Completion::Internal(InternalOp::PrimeLevels),
            );
        }
        let mask = self.watchers.mask();
        self.submit_request(
            Request::new(NB, handle, mask, 0),
            Completion::Internal(InternalOp::StartWatcher { id, responder }),
        );
    }

    fn stop_watcher(&mut self, id: WatcherId, responder: oneshot::Sender<Result<()>>) {
        let handle = self.handle.filter(|_| self.command.is_open());
        let Some(handle) = handle else {
            let result = if self.watchers.finish_stop(id) {
                Ok(())
            } else {
                Err(ClientError::UnknownWatcher(id.0))
            };
            let _ = responder.send(result);
            return;
        };

        match self.watchers.begin_stop(id) {
            Ok(mask) => self.submit_request(
                Request::new(NB, handle, mask, 0),
                Completion::Internal(InternalOp::StopWatcher { id, responder }),
            ),
            Err(e) => {
                let _ = responder.send(Err(e));
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        let LinkEvent {
            role,
            generation,
            kind,
        } = event;
        if !self.link_mut(role).is_current(generation) {
            trace!("Dropping stale {} event", role);
            return;
        }

        match kind {
            LinkEventKind::Established { stream, handle } => {
                let events = self.link_tx.clone();
                match role {
                    SocketRole::Command => {
                        self.command.retry.cancel();
                        self.command.attach(stream, events);
                        self.assembler.reset();
                        self.submit_request(
                            Request::new(PIGPV, 0, 0, 0),
                            Completion::Internal(InternalOp::ProtocolVersion),
                        );
                        self.submit_request(
                            Request::new(HWVER, 0, 0, 0),
                            Completion::Internal(InternalOp::HardwareVersion),
                        );
                    }
                    SocketRole::Notification => match handle {
                        Some(handle) if handle >= 0 => {
                            self.notification.retry.cancel();
                            self.notification.attach(stream, events);
                            self.notification.set_state(LinkState::Connected);
                            self.records.clear();
                            self.handle = Some(handle as u32);
                            self.info.notification_socket = Some(true);
                            self.keepalive.arm(Instant::now());
                            debug!("Notification handle {}", handle);
                            self.check_ready();
                        }
                        other => {
                            let err = ClientError::Handshake(format!(
                                "NOIB returned {}",
                                other.unwrap_or_default()
                            ));
                            self.emit(SessionEvent::Error(err.clone()));
                            self.fail_connect(role, err);
                        }
                    },
                }
            }
            LinkEventKind::ConnectFailed(e) => self.on_connect_failed(role, e),
            LinkEventKind::HandshakeFailed(e) => {
                let err = ClientError::from(e);
                self.emit(SessionEvent::Error(err.clone()));
                self.fail_connect(role, err);
            }
            LinkEventKind::Data(bytes) => match role {
                SocketRole::Command => self.on_command_data(&bytes),
                SocketRole::Notification => self.on_notification_data(&bytes),
            },
            LinkEventKind::Closed => {
                let pending = match role {
                    SocketRole::Command => self.assembler.pending(),
                    SocketRole::Notification => self.records.len(),
                };
                if pending > 0 {
                    warn!("{} closed with {} bytes of a partial frame", role, pending);
                }
                info!("{} closed by peer", role);
                self.shutdown(&format!("{} closed", role), ClientError::Abandoned, true);
            }
            LinkEventKind::Failed(e) => {
                warn!("{} failed: {}", role, e);
                let reason = format!("{} error: {}", role, e);
                self.emit(SessionEvent::Error(ClientError::from(e)));
                self.shutdown(&reason, ClientError::Abandoned, true);
            }
        }
    }

    fn on_connect_failed(&mut self, role: SocketRole, e: std::io::Error) {
        let now = Instant::now();
        let link = self.link_mut(role);
        match link.retry.on_failure(now) {
            RetryDecision::RetryAt(at) => {
                link.set_state(LinkState::RetryPending);
                warn!(
                    "{} connect failed: {}, retrying in {:?}",
                    role,
                    e,
                    at.saturating_duration_since(now)
                );
            }
            RetryDecision::Wait => {
                link.set_state(LinkState::RetryPending);
                warn!("{} connect failed: {}, no retry scheduled", role, e);
            }
            RetryDecision::GiveUp => {
                let err = ClientError::ConnectFailed {
                    address: self.config.address(),
                    reason: e.to_string(),
                };
                self.emit(SessionEvent::Error(err.clone()));
                self.fail_connect(role, err);
            }
        }
    }

    /// A connect attempt failed for good
    fn fail_connect(&mut self, role: SocketRole, err: ClientError) {
        error!("{}: {}", role, err);
        let reason = err.to_string();
        self.shutdown(&reason, err, true);
    }

    fn on_command_data(&mut self, chunk: &[u8]) {
        let assembled = self.assembler.feed(chunk);
        let processed = assembled.frames.len();
        for frame in assembled.frames {
            self.on_frame(frame);
        }

        // One held request per processed frame
        for _ in 0..processed {
            match self.pipeline.release() {
                Some(bytes) => {
                    self.command.send(bytes);
                }
                None => break,
            }
        }

        if let Some(e) = assembled.error {
            warn!("Command socket framing error: {}", e);
            self.emit(SessionEvent::Error(ClientError::from(e)));
            self.shutdown(REASON_PROTOCOL, ClientError::Abandoned, true);
        }
    }

    fn on_frame(&mut self, frame: ResponseFrame) {
        let Some(in_flight) = self.pipeline.complete() else {
            warn!("Response to command {} with no pending request", frame.command);
            self.emit(SessionEvent::Error(ClientError::Internal(
                "response with no pending request".to_string(),
            )));
            return;
        };
        if in_flight.command != frame.command {
            debug!(
                "Response echoes command {}, expected {}",
                frame.command, in_flight.command
            );
        }
        self.complete(in_flight.completion, frame_result(&frame));
    }

    fn complete(&mut self, completion: Completion, result: Result<Reply>) {
        match completion {
            Completion::Caller(tx) => {
                let _ = tx.send(result);
            }
            Completion::Detached => {
                if let Err(e) = result {
                    self.emit(SessionEvent::Error(e));
                }
            }
            Completion::Internal(op) => self.on_internal(op, result),
        }
    }

    fn on_internal(&mut self, op: InternalOp, result: Result<Reply>) {
        match op {
            InternalOp::ProtocolVersion => match result {
                Ok(reply) => self.info.pigpio_version = reply.value,
                Err(e) => warn!("PIGPV failed: {}", e),
            },
            InternalOp::HardwareVersion => {
                match result {
                    Ok(reply) => self.info.apply_hardware_revision(reply.value),
                    Err(e) => warn!("HWVER failed: {}", e),
                }
                if self.command.is_open() {
                    self.command.set_state(LinkState::Connected);
                    self.info.command_socket = Some(true);
                    debug!(
                        "pigpio v{}, hardware revision {:#x} (type {}, mask {:#010x})",
                        self.info.pigpio_version,
                        self.info.hw_version,
                        self.info.hardware_type,
                        self.info.user_gpio_mask
                    );
                    self.check_ready();
                }
            }
            InternalOp::PrimeLevels => match result {
                Ok(reply) => self.watchers.prime(reply.value),
                Err(e) => warn!("BR1 prime failed: {}", e),
            },
            InternalOp::EnableEvents => {
                if let Err(e) = result {
                    warn!("Failed to enable BSC events: {}", e);
                }
            }
            InternalOp::RearmWatchers => {
                if let Err(e) = result {
                    warn!("Failed to re-arm watchers: {}", e);
                }
            }
            InternalOp::StartWatcher { id, responder } => match result {
                Ok(_) => {
                    let _ = responder.send(Ok(id));
                }
                Err(e) => {
                    self.watchers.finish_stop(id);
                    let _ = responder.send(Err(e));
                }
            },
            InternalOp::StopWatcher { id, responder } => {
                self.watchers.finish_stop(id);
                debug!("Watcher {} stopped", id);
                let _ = responder.send(result.map(|_| ()));
            }
        }
    }

    /// Publish `Connected` once both sockets finished their handshake
    fn check_ready(&mut self) {
        if self.announced || !self.info.is_ready() {
            return;
        }
        let Some(handle) = self.handle else {
            return;
        };
        self.announced = true;
        info!(
            "Connected to pigpio v{} at {}",
            self.info.pigpio_version,
            self.config.address()
        );

        self.emit(SessionEvent::Connected(self.info.clone()));
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(self.info.clone()));
        }

        self.submit_request(
            Request::new(EVM, handle, BSC_EVENT_BIT, 0),
            Completion::Internal(InternalOp::EnableEvents),
        );

        let mask = self.watchers.mask();
        if mask != 0 {
            debug!("Re-arming {} watchers with mask {:#010x}", self.watchers.len(), mask);
            self.submit_request(
                Request::new(BR1, 0, 0, 0),
                Completion::Internal(InternalOp::PrimeLevels),
            );
            self.submit_request(
                Request::new(NB, handle, mask, 0),
                Completion::Internal(InternalOp::RearmWatchers),
            );
        }
    }

    fn on_notification_data(&mut self, chunk: &[u8]) {
        self.keepalive.touch(Instant::now());
        for record in self.records.drain_chunk(chunk) {
            match record.kind() {
                RecordKind::Event(id) => {
                    trace!("Hardware event {} at tick {}", id, record.tick);
                    self.emit(SessionEvent::HardwareEvent {
                        id,
                        tick: record.tick,
                    });
                    continue;
                }
                RecordKind::Watchdog(gpio) => {
                    debug!("Watchdog timeout on gpio {} at tick {}", gpio, record.tick)
                }
                RecordKind::KeepAlive => trace!("Keep-alive at tick {}", record.tick),
                RecordKind::Levels => {}
            }
            self.watchers.dispatch(record.levels, record.tick);
        }
    }

    fn handle_timers(&mut self, now: Instant) {
        for role in [SocketRole::Command, SocketRole::Notification] {
            let Some(tick) = self.link_mut(role).retry.poll(now) else {
                continue;
            };
            match tick {
                RetryTick::Reconnect => {
                    if self.link_mut(role).state() == LinkState::RetryPending {
                        debug!("Retrying {}", role);
                        let (host, port) = (self.config.host.clone(), self.config.port);
                        let events = self.link_tx.clone();
                        self.link_mut(role).attempt(&host, port, events);
                    }
                }
                RetryTick::Expired => {
                    let state = self.link_mut(role).state();
                    if matches!(state, LinkState::Connecting | LinkState::RetryPending) {
                        error!("{}: retry timeout expired", role);
                        self.emit(SessionEvent::Error(ClientError::RetryTimeout));
                        self.shutdown(REASON_RETRY_EXPIRED, ClientError::RetryTimeout, true);
                    }
                }
            }
        }

        if self.keepalive.expired(now) {
            warn!("No notification traffic, {}", KEEPALIVE_REASON);
            self.shutdown(KEEPALIVE_REASON, ClientError::Abandoned, true);
        }
    }

    /// Tear down both sockets and abandon everything in flight
    ///
    /// `error` goes to pending `connect` calls. `Disconnected` is published
    /// when `announce` is set and a socket was open.
    fn shutdown(&mut self, reason: &str, error: ClientError, announce: bool) {
        let command_open = self.command.teardown();
        let notification_open = self.notification.teardown();

        self.assembler.reset();
        self.records.clear();
        self.keepalive.disarm();
        self.handle = None;
        self.announced = false;
        for flag in [
            &mut self.info.command_socket,
            &mut self.info.notification_socket,
        ] {
            if flag.is_some() {
                *flag = Some(false);
            }
        }

        let abandoned = self.pipeline.flush();
        if !abandoned.is_empty() {
            debug!("Abandoning {} requests", abandoned.len());
        }
        for completion in abandoned {
            self.abandon(completion);
        }

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }

        if announce && (command_open || notification_open) {
            info!("Disconnected: {}", reason);
            self.emit(SessionEvent::Disconnected(reason.to_string()));
        }
    }

    fn abandon(&mut self, completion: Completion) {
        match completion {
            Completion::Caller(tx) => {
                let _ = tx.send(Err(ClientError::Abandoned));
            }
            Completion::Detached => {}
            Completion::Internal(InternalOp::StartWatcher { id, responder }) => {
                self.watchers.finish_stop(id);
                let _ = responder.send(Err(ClientError::Abandoned));
            }
            Completion::Internal(InternalOp::StopWatcher { id, responder }) => {
                self.watchers.finish_stop(id);
                let _ = responder.send(Err(ClientError::Abandoned));
            }
            Completion::Internal(_) => {}
        }
    }
}

fn sleep_until_opt(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}
