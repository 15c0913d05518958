//! High-level telemetry client API.
//!
//! [`TelemetryClient::spawn`] starts one session task that owns the TCP link,
//! pumps snapshots at a fixed interval and reports what happens on an event
//! channel. The handle only sends control messages; it never touches the link.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{SessionMachine, SessionState, Trigger};
use crate::core::{
    COLLECT_INTERVAL, CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_SERVER_URL, MAX_FRAME_SIZE,
    MetricsSource, RECONNECT_BACKOFF, REPLY_TIMEOUT, TEARDOWN_GRACE,
};
use crate::crypto::Codec;
use crate::transport::{FramedLink, TransportError, TransportResult};

/// Errors that can occur in the telemetry client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server URL could not be turned into a connect address.
    #[error("invalid server url {url:?}: {reason}")]
    InvalidServerUrl {
        /// URL as configured.
        url: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The session task has exited.
    #[error("session task is not running")]
    SessionClosed,

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, `tcp://host:port` or `host:port`. The port defaults to 12345.
    pub server_url: String,

    /// Time between snapshots while connected.
    pub collect_interval: Duration,

    /// Wait before retrying after a failed attempt or a reset.
    pub backoff: Duration,

    /// Bound on the wait for each reply.
    pub reply_timeout: Duration,

    /// Bound on each TCP connect.
    pub connect_timeout: Duration,

    /// Pause after tearing down a live link on reconnect.
    pub teardown_grace: Duration,

    /// Largest accepted frame body.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            collect_interval: COLLECT_INTERVAL,
            backoff: RECONNECT_BACKOFF,
            reply_timeout: REPLY_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            teardown_grace: TEARDOWN_GRACE,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Address to hand to `TcpStream::connect`.
    pub fn server_addr(&self) -> Result<String, ClientError> {
        parse_server_url(&self.server_url)
    }
}

/// Builder for creating a [`ClientConfig`].
#[derive(Debug, Default)]
pub struct TelemetryClientBuilder {
    config: ClientConfig,
}

impl TelemetryClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server URL.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Set the collection interval.
    pub fn collect_interval(mut self, interval: Duration) -> Self {
        self.config.collect_interval = interval;
        self
    }

    /// Set the reconnect backoff.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the reply timeout.
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the teardown grace period.
    pub fn teardown_grace(mut self, grace: Duration) -> Self {
        self.config.teardown_grace = grace;
        self
    }

    /// Set the frame size limit.
    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.config.max_frame_size = max;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Turn a configured server URL into a `host:port` connect address.
///
/// Accepts `tcp://host:port`, `host:port`, bare hosts and IPv6 literals.
pub fn parse_server_url(url: &str) -> Result<String, ClientError> {
    let invalid = |reason| ClientError::InvalidServerUrl {
        url: url.to_string(),
        reason,
    };

    let trimmed = url.trim();
    let rest = match trimmed.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(invalid("only tcp:// urls are supported")),
        None => trimmed,
    };
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(invalid("missing host"));
    }
    if rest.contains('/') {
        return Err(invalid("paths are not supported"));
    }

    // [v6]:port or [v6]
    if let Some(inner) = rest.strip_prefix('[') {
        return match inner.split_once(']') {
            Some((host, "")) if !host.is_empty() => Ok(format!("[{host}]:{DEFAULT_PORT}")),
            Some((host, port)) if !host.is_empty() => match port.strip_prefix(':') {
                Some(port) if port.parse::<u16>().is_ok() => Ok(rest.to_string()),
                _ => Err(invalid("bad port")),
            },
            _ => Err(invalid("unterminated ipv6 literal")),
        };
    }

    match rest.matches(':').count() {
        0 => Ok(format!("{rest}:{DEFAULT_PORT}")),
        1 => {
            let (host, port) = rest.split_once(':').ok_or_else(|| invalid("bad port"))?;
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            port.parse::<u16>().map_err(|_| invalid("bad port"))?;
            Ok(rest.to_string())
        }
        // Bare IPv6 literal.
        _ => Ok(format!("[{rest}]:{DEFAULT_PORT}")),
    }
}

/// What the session reports to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Link came up (`true`) or went down (`false`).
    ConnectionStatus(bool),
    /// A decrypted reply, or a human-readable error line.
    MessageReceived(String),
}

#[derive(Debug)]
enum Control {
    Reconnect,
    Shutdown,
}

/// Handle to a running telemetry session.
///
/// Dropping the handle stops the session.
///
/// # Example
///
/// ```ignore
/// use telemetry_relay::client::{TelemetryClient, TelemetryClientBuilder};
///
/// let config = TelemetryClientBuilder::new()
///     .server_url("tcp://10.0.0.5:12345")
///     .build();
///
/// let (client, mut events) = TelemetryClient::spawn(config, SystemCollector::new(), codec)?;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// ```
#[derive(Debug)]
pub struct TelemetryClient {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl TelemetryClient {
    /// Start a session task on the current tokio runtime.
    ///
    /// Returns the handle and the receiving end of the event channel.
    pub fn spawn<C>(
        config: ClientConfig,
        collector: C,
        codec: Codec,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), ClientError>
    where
        C: MetricsSource,
    {
        let addr = config.server_addr()?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let driver = SessionDriver {
            config,
            addr,
            codec,
            collector,
            machine: SessionMachine::new(),
            control: control_rx,
            events: events_tx,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run());

        let client = Self {
            control: control_tx,
            state: state_rx,
            task: Some(task),
        };
        Ok((client, events_rx))
    }

    /// Drop the current link (if any) and start a fresh connect attempt.
    ///
    /// A no-op while an attempt is already in progress.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.control
            .send(Control::Reconnect)
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state changes.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Stop the session and wait for its task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.control.send(Control::Shutdown);
        }
    }
}

// =============================================================================
// SESSION TASK
// =============================================================================

enum Flow {
    Continue,
    Stop,
}

enum Wake<T> {
    Control(Option<Control>),
    Done(T),
}

struct SessionDriver<C> {
    config: ClientConfig,
    addr: String,
    codec: Codec,
    collector: C,
    machine: SessionMachine,
    control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
}

impl<C: MetricsSource> SessionDriver<C> {
    async fn run(mut self) {
        info!(server = %self.addr, "telemetry session starting");
        self.apply(Trigger::Start);

        loop {
            let flow = match self.machine.state() {
                SessionState::Disconnected => self.idle().await,
                SessionState::BackingOff => self.back_off().await,
                SessionState::Connecting | SessionState::Connected => self.connect().await,
            };
            if let Flow::Stop = flow {
                break;
            }
        }

        self.apply(Trigger::Stop);
        info!(server = %self.addr, "telemetry session stopped");
    }

    fn apply(&mut self, trigger: Trigger) {
        match self.machine.apply(trigger) {
            Ok(t) => {
                if t.from != t.to {
                    info!(from = %t.from, to = %t.to, "session state changed");
                }
                self.state.send_replace(t.to);
                if let Some(up) = t.status {
                    self.emit(SessionEvent::ConnectionStatus(up));
                }
            }
            Err(e) => warn!(error = %e, "ignored session trigger"),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The sink may have gone away; the session keeps running regardless.
        let _ = self.events.send(event);
    }

    fn on_control(&mut self, control: Option<Control>) -> Flow {
        match control {
            Some(Control::Reconnect) => {
                self.apply(Trigger::Reconnect);
                Flow::Continue
            }
            Some(Control::Shutdown) | None => Flow::Stop,
        }
    }

    async fn idle(&mut self) -> Flow {
        debug!("session idle until reconnect");
        let control = self.control.recv().await;
        self.on_control(control)
    }

    async fn back_off(&mut self) -> Flow {
        let backoff = self.config.backoff;
        debug!(?backoff, "backing off");

        let wake = tokio::select! {
            c = self.control.recv() => Wake::Control(c),
            _ = tokio::time::sleep(backoff) => Wake::Done(()),
        };
        match wake {
            Wake::Control(c) => self.on_control(c),
            Wake::Done(()) => {
                self.apply(Trigger::BackoffElapsed);
                Flow::Continue
            }
        }
    }

    async fn connect(&mut self) -> Flow {
        let addr = self.addr.clone();
        let attempt = FramedLink::connect(&addr, self.codec.clone(), self.config.connect_timeout);
        tokio::pin!(attempt);

        let result = loop {
            let wake = tokio::select! {
                c = self.control.recv() => Wake::Control(c),
                r = &mut attempt => Wake::Done(r),
            };
            match wake {
                Wake::Control(Some(Control::Reconnect)) => {
                    debug!("reconnect requested while connecting");
                    self.apply(Trigger::Reconnect);
                }
                Wake::Control(_) => return Flow::Stop,
                Wake::Done(r) => break r,
            }
        };

        match result {
            Ok(link) => {
                let link = link.with_max_frame_size(self.config.max_frame_size);
                info!(server = %self.addr, "connected");
                self.apply(Trigger::ConnectSucceeded);
                self.pump(link).await
            }
            Err(e) => {
                warn!(server = %self.addr, error = %e, "connect failed");
                self.emit(SessionEvent::MessageReceived(format!("connection failed: {e}")));
                self.apply(Trigger::ConnectFailed);
                Flow::Continue
            }
        }
    }

    async fn pump(&mut self, mut link: FramedLink<TcpStream>) -> Flow {
        let interval = self.config.collect_interval;
        let reply_timeout = self.config.reply_timeout;

        let wake = {
            let exchange = exchange_loop(
                &mut link,
                &mut self.collector,
                &self.events,
                interval,
                reply_timeout,
            );
            tokio::select! {
                c = self.control.recv() => Wake::Control(c),
                r = exchange => Wake::Done(r),
            }
        };
        // Closing the socket is what cancels a pending read.
        drop(link);

        match wake {
            Wake::Control(Some(Control::Reconnect)) => {
                info!("reconnect requested; dropping link");
                self.apply(Trigger::Reconnect);
                tokio::time::sleep(self.config.teardown_grace).await;
                Flow::Continue
            }
            Wake::Control(_) => Flow::Stop,
            Wake::Done(Err(e)) => {
                let reset = e.is_reset();
                if reset {
                    warn!(error = %e, "link reset by peer");
                } else {
                    warn!(error = %e, "link failed");
                }
                self.emit(SessionEvent::MessageReceived(format!("connection error: {e}")));
                self.apply(Trigger::LinkFailed { reset });
                Flow::Continue
            }
            Wake::Done(Ok(())) => Flow::Continue,
        }
    }
}

/// Collect, send, await the reply, forward it, sleep. Returns only on error.
async fn exchange_loop<C: MetricsSource>(
    link: &mut FramedLink<TcpStream>,
    collector: &mut C,
    events: &mpsc::UnboundedSender<SessionEvent>,
    interval: Duration,
    reply_timeout: Duration,
) -> TransportResult<()> {
    loop {
        let text = collector.collect().to_canonical_text()?;
        let reply = link.request(&text, reply_timeout).await?;
        debug!(bytes = text.len(), reply = %reply, "snapshot acknowledged");
        let _ = events.send(SessionEvent::MessageReceived(reply));
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use tokio::net::TcpListener;

    use super::*;
    use crate::core::{ACK_TEXT, KEY_SIZE};
    use crate::crypto::PresharedKey;
    use crate::snapshot::MetricsSnapshot;

    const WAIT: Duration = Duration::from_secs(5);

    fn codec(byte: u8) -> Codec {
        Codec::new(PresharedKey::from_bytes([byte; KEY_SIZE]))
    }

    fn fast_config(addr: &str) -> ClientConfig {
        TelemetryClientBuilder::new()
            .server_url(format!("tcp://{addr}"))
            .collect_interval(Duration::from_millis(20))
            .backoff(Duration::from_millis(200))
            .reply_timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_secs(2))
            .teardown_grace(Duration::from_millis(10))
            .build()
    }

    /// Acknowledge every frame on every accepted connection.
    async fn ack_server(key: u8) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut link = FramedLink::new(stream, codec(key));
                    while let Ok(text) = link.recv_text().await {
                        assert!(MetricsSnapshot::parse(&text).is_ok());
                        if link.send_text(ACK_TEXT).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    async fn free_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    async fn wait_for_state(client: &TelemetryClient, want: SessionState) {
        let mut rx = client.state_changes();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    #[test]
    fn test_parse_server_url() {
        assert_eq!(parse_server_url("tcp://example.com:9000").unwrap(), "example.com:9000");
        assert_eq!(parse_server_url("10.0.0.5:12345").unwrap(), "10.0.0.5:12345");
        assert_eq!(parse_server_url("tcp://10.0.0.5").unwrap(), "10.0.0.5:12345");
        assert_eq!(parse_server_url(" localhost/ ").unwrap(), "localhost:12345");
        assert_eq!(parse_server_url("tcp://[::1]:7000").unwrap(), "[::1]:7000");
        assert_eq!(parse_server_url("[::1]").unwrap(), "[::1]:12345");
        assert_eq!(parse_server_url("::1").unwrap(), "[::1]:12345");
    }

    #[test]
    fn test_parse_server_url_rejects() {
        for url in [
            "",
            "tcp://",
            "ws://host:1",
            "host:notaport",
            "host:99999",
            ":12345",
            "host:1/path",
            "[::1",
            "[::1]x",
        ] {
            assert!(
                matches!(parse_server_url(url), Err(ClientError::InvalidServerUrl { .. })),
                "{url:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = TelemetryClientBuilder::new().build();
        assert_eq!(config.collect_interval, COLLECT_INTERVAL);
        assert_eq!(config.backoff, RECONNECT_BACKOFF);
        assert_eq!(config.reply_timeout, REPLY_TIMEOUT);
        assert_eq!(config.server_addr().unwrap(), "127.0.0.1:12345");
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_url() {
        let config = TelemetryClientBuilder::new().server_url("udp://x").build();
        let result = TelemetryClient::spawn(config, MetricsSnapshot::unavailable, codec(1));
        assert!(matches!(result, Err(ClientError::InvalidServerUrl { .. })));
    }

    #[tokio::test]
    async fn test_acks_are_forwarded() {
        let addr = ack_server(1).await;
        let (client, mut events) =
            TelemetryClient::spawn(fast_config(&addr), MetricsSnapshot::unavailable, codec(1))
                .unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::ConnectionStatus(true));
        for _ in 0..3 {
            assert_eq!(
                next_event(&mut events).await,
                SessionEvent::MessageReceived(ACK_TEXT.to_string())
            );
        }
        assert_eq!(client.state(), SessionState::Connected);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_acks_never_outrun_sends() {
        let addr = ack_server(2).await;
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sent);
        let collector = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            MetricsSnapshot::unavailable()
        };

        let (client, mut events) =
            TelemetryClient::spawn(fast_config(&addr), collector, codec(2)).unwrap();

        let mut acks = 0;
        while acks < 5 {
            if let SessionEvent::MessageReceived(_) = next_event(&mut events).await {
                acks += 1;
                assert!(sent.load(Ordering::SeqCst) >= acks);
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_attempts_back_off() {
        let addr = free_addr().await;
        let config = fast_config(&addr);
        let backoff = config.backoff;
        let (client, mut events) =
            TelemetryClient::spawn(config, MetricsSnapshot::unavailable, codec(3)).unwrap();

        let mut downs = Vec::new();
        while downs.len() < 3 {
            match next_event(&mut events).await {
                SessionEvent::ConnectionStatus(false) => downs.push(Instant::now()),
                SessionEvent::ConnectionStatus(true) => panic!("nothing is listening"),
                SessionEvent::MessageReceived(_) => {}
            }
        }
        for pair in downs.windows(2) {
            assert!(pair[1] - pair[0] >= backoff.mul_f32(0.8));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_close_backs_off_then_recovers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            // First connection: read one frame and hang up.
            let (stream, _) = listener.accept().await.unwrap();
            let mut link = FramedLink::new(stream, codec(4));
            let _ = link.recv_text().await;
            drop(link);

            let (stream, _) = listener.accept().await.unwrap();
            let mut link = FramedLink::new(stream, codec(4));
            while link.recv_text().await.is_ok() {
                if link.send_text(ACK_TEXT).await.is_err() {
                    break;
                }
            }
        });

        let config = fast_config(&addr);
        let backoff = config.backoff;
        let (client, mut events) =
            TelemetryClient::spawn(config, MetricsSnapshot::unavailable, codec(4)).unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::ConnectionStatus(true));
        let mut downs = Vec::new();
        let up = loop {
            match next_event(&mut events).await {
                SessionEvent::ConnectionStatus(false) => {
                    downs.push(Instant::now());
                    assert_eq!(client.state(), SessionState::BackingOff);
                }
                SessionEvent::ConnectionStatus(true) => break Instant::now(),
                SessionEvent::MessageReceived(_) => {}
            }
        };
        assert_eq!(downs.len(), 1, "one status drop per reset");
        assert!(up - downs[0] >= backoff);
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::MessageReceived(ACK_TEXT.to_string())
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_reply_disconnects_until_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            // First connection answers under the wrong key.
            let (stream, _) = listener.accept().await.unwrap();
            let mut rogue = FramedLink::new(stream, codec(99));
            let _ = rogue.recv_frame().await;
            rogue.send_text(ACK_TEXT).await.unwrap();

            // Keep the rogue link open so the failure is the reply, not the close.
            let (stream, _) = listener.accept().await.unwrap();
            drop(rogue);
            let mut link = FramedLink::new(stream, codec(5));
            while link.recv_text().await.is_ok() {
                if link.send_text(ACK_TEXT).await.is_err() {
                    break;
                }
            }
        });

        let (client, mut events) =
            TelemetryClient::spawn(fast_config(&addr), MetricsSnapshot::unavailable, codec(5))
                .unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::ConnectionStatus(true));
        wait_for_state(&client, SessionState::Disconnected).await;

        // No automatic retry.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(client.state(), SessionState::Disconnected);

        client.reconnect().unwrap();
        wait_for_state(&client, SessionState::Connected).await;

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut link = FramedLink::new(stream, codec(6));
            // Read but never answer.
            while link.recv_frame().await.is_ok() {}
        });

        let config = TelemetryClientBuilder::new()
            .server_url(addr)
            .reply_timeout(Duration::from_millis(100))
            .backoff(Duration::from_secs(30))
            .build();
        let (client, mut events) =
            TelemetryClient::spawn(config, MetricsSnapshot::unavailable, codec(6)).unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::ConnectionStatus(true));
        wait_for_state(&client, SessionState::BackingOff).await;

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_from_connected_reports_down_then_up() {
        let addr = ack_server(7).await;
        let (client, mut events) =
            TelemetryClient::spawn(fast_config(&addr), MetricsSnapshot::unavailable, codec(7))
                .unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::ConnectionStatus(true));
        client.reconnect().unwrap();

        let mut statuses = Vec::new();
        while statuses.len() < 2 {
            if let SessionEvent::ConnectionStatus(up) = next_event(&mut events).await {
                statuses.push(up);
            }
        }
        assert_eq!(statuses, vec![false, true]);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_event_channel() {
        let addr = free_addr().await;
        let (client, mut events) =
            TelemetryClient::spawn(fast_config(&addr), MetricsSnapshot::unavailable, codec(8))
                .unwrap();

        client.shutdown().await;
        while events.recv().await.is_some() {}
    }
}
