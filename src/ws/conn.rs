use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::Credentials;
use crate::errors::Error;
use crate::signer::Signer;
use crate::ws::frame::{ControlFrame, LoginArgs};
use crate::ws::router::{Dispatched, OpKind, Router};
use crate::ws::topic::Topic;

/// Public channels need no authentication; private channels require the
/// login handshake before any subscribe is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
}

/// Tunables for one WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Bound on a subscriber's wait for the connection to become ready.
    pub connect_timeout: Duration,
    /// Bound on the wait for one control-frame acknowledgment.
    pub ack_timeout: Duration,
    /// The venue disconnects silently without periodic pings.
    pub ping_interval: Duration,
    /// Inbound silence beyond this is treated as connection death.
    pub pong_timeout: Duration,
    /// Base delay of the exponential reconnect backoff.
    pub reconnect_delay: Duration,
    /// Consecutive failed reconnects tolerated before giving up; reaching
    /// ready resets the budget.
    pub max_reconnect_attempts: u32,
    /// Bound on the login handshake of a private connection.
    pub login_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
            login_timeout: Duration::from_secs(10),
        }
    }
}

enum ServeExit {
    /// Explicit shutdown observed.
    Closing,
    /// Socket died; `was_ready` resets the reconnect budget.
    Lost { was_ready: bool },
    /// The venue rejected the login handshake.
    LoginFailed,
}

struct Shared {
    url: String,
    scope: Scope,
    credentials: Credentials,
    signer: Arc<Signer>,
    config: WsConfig,
    router: Router,
    state_tx: watch::Sender<ConnState>,
    out_tx: mpsc::Sender<String>,
    // Taken by the socket task on first start.
    out_rx: Mutex<Option<mpsc::Receiver<String>>>,
    started: AtomicBool,
    login_error: Mutex<Option<String>>,
}

/// One physical socket per scope. The socket lives on a background task;
/// callers interact through the router registration API plus the
/// subscribe/unsubscribe control path here. A fresh socket is established
/// transparently after failure, replaying every live topic so long-lived
/// receivers keep delivering.
pub struct WsConnection {
    shared: Arc<Shared>,
}

impl WsConnection {
    pub fn new(
        url: impl Into<String>,
        scope: Scope,
        credentials: Credentials,
        signer: Arc<Signer>,
        config: WsConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnState::Disconnected);
        let (out_tx, out_rx) = mpsc::channel(64);
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                scope,
                credentials,
                signer,
                config,
                router: Router::new(),
                state_tx,
                out_tx,
                out_rx: Mutex::new(Some(out_rx)),
                started: AtomicBool::new(false),
                login_error: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn router(&self) -> &Router {
        &self.shared.router
    }

    pub fn scope(&self) -> Scope {
        self.shared.scope
    }

    pub fn state(&self) -> ConnState {
        *self.shared.state_tx.borrow()
    }

    /// Frames dropped for a topic because its sink was full or its payload
    /// failed to decode.
    pub fn dropped_frames(&self, topic: &Topic) -> u64 {
        self.shared.router.dropped_frames(topic)
    }

    /// Lazily spawn the socket task.
    fn start(&self) {
        if self.state() == ConnState::Closing {
            return;
        }
        if self
            .shared
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let out_rx = self
            .shared
            .out_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(out_rx) = out_rx {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(run(shared, out_rx));
        }
    }

    /// Suspend until the connection is `Ready`, bounded by the connect
    /// timeout. Login rejections observed while waiting surface as auth
    /// errors instead of a bare timeout.
    pub async fn ensure_ready(&self) -> Result<(), Error> {
        self.start();
        let mut state_rx = self.shared.state_tx.subscribe();
        let wait = async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnState::Ready => return Ok(()),
                    ConnState::Closing => return Err(Error::Closed),
                    ConnState::Disconnected => {
                        if let Some(msg) = self.take_login_error() {
                            return Err(Error::Auth(msg));
                        }
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(Error::Closed);
                }
            }
        };
        timeout(self.shared.config.connect_timeout, wait)
            .await
            .map_err(|_| Error::ConnectTimeout)?
    }

    fn take_login_error(&self) -> Option<String> {
        self.shared
            .login_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    async fn send(&self, text: String) -> Result<(), Error> {
        self.shared.out_tx.send(text).await.map_err(|_| Error::Closed)
    }

    /// Issue one batched subscribe control frame for `topics` and wait for
    /// every acknowledgment. Sinks must already be registered.
    pub async fn subscribe(&self, topics: Vec<Topic>) -> Result<(), Error> {
        if topics.is_empty() {
            return Ok(());
        }
        self.ensure_ready().await?;
        let waiters = self.shared.router.begin_ops(&topics, OpKind::Subscribe)?;
        let frame = ControlFrame::subscribe(&topics)?.to_text()?;
        if let Err(e) = self.send(frame).await {
            for (topic, _) in &waiters {
                self.shared.router.cancel_op(topic);
            }
            return Err(e);
        }
        self.await_acks(waiters).await
    }

    /// Issue one batched unsubscribe for the live subset of `topics`.
    /// Unknown or dead topics are a no-op success. While disconnected there
    /// is no wire subscription to tear down, so entries are only
    /// deactivated locally.
    pub async fn unsubscribe(&self, topics: Vec<Topic>, clear_sink: bool) -> Result<(), Error> {
        let mut live = Vec::new();
        for topic in topics {
            if self.shared.router.is_live(&topic) {
                live.push(topic);
            } else if clear_sink {
                self.shared.router.deactivate(&topic, true);
            }
        }
        if live.is_empty() {
            return Ok(());
        }
        if self.state() != ConnState::Ready {
            for topic in &live {
                self.shared.router.deactivate(topic, clear_sink);
            }
            return Ok(());
        }
        let waiters = self
            .shared
            .router
            .begin_ops(&live, OpKind::Unsubscribe { clear_sink })?;
        let frame = ControlFrame::unsubscribe(&live)?.to_text()?;
        if let Err(e) = self.send(frame).await {
            for (topic, _) in &waiters {
                self.shared.router.cancel_op(topic);
            }
            return Err(e);
        }
        self.await_acks(waiters).await
    }

    /// Re-subscribe a topic whose sink was retained across an earlier
    /// unsubscribe, without re-declaring its typed parameters.
    pub async fn resume(&self, topic: Topic) -> Result<(), Error> {
        if !self.shared.router.reactivate(&topic)? {
            return Ok(());
        }
        self.subscribe(vec![topic]).await
    }

    async fn await_acks(
        &self,
        waiters: Vec<(Topic, tokio::sync::oneshot::Receiver<Result<(), Error>>)>,
    ) -> Result<(), Error> {
        let mut outcome = Ok(());
        // Drain every waiter so no pending op outlives its caller.
        for (topic, rx) in waiters {
            let result = match timeout(self.shared.config.ack_timeout, rx).await {
                Err(_) => {
                    self.shared.router.cancel_op(&topic);
                    Err(Error::AckTimeout)
                }
                Ok(Err(_)) => Err(Error::Closed),
                Ok(Ok(res)) => res,
            };
            if outcome.is_ok() {
                outcome = result;
            }
        }
        outcome
    }

    /// Shut the connection down. In-flight waits are cancelled, the socket
    /// closes, and every sink observes a terminal close.
    pub fn close(&self) {
        // send_replace records the state even when no receiver exists yet,
        // which is the case before the socket task has ever started.
        self.shared.state_tx.send_replace(ConnState::Closing);
        if !self.shared.started.load(Ordering::Acquire) {
            // No task exists to run the teardown.
            self.shared.router.close_all();
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn is_closing(state_rx: &watch::Receiver<ConnState>) -> bool {
    *state_rx.borrow() == ConnState::Closing
}

async fn wait_closing(state_rx: &mut watch::Receiver<ConnState>) {
    loop {
        if *state_rx.borrow_and_update() == ConnState::Closing {
            return;
        }
        if state_rx.changed().await.is_err() {
            return;
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.saturating_sub(1).min(6));
    let capped = exp.min(Duration::from_secs(60));
    capped + Duration::from_millis(rand::thread_rng().gen_range(0..250))
}

impl Shared {
    fn set_state(&self, next: ConnState) {
        // Never clobber an explicit shutdown.
        self.state_tx.send_if_modified(|state| {
            if *state == ConnState::Closing || *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn record_login_error(&self, msg: String) {
        *self
            .login_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(msg);
    }

    fn login_frame(&self) -> Result<String, Error> {
        let timestamp = self.signer.epoch_timestamp();
        let sign = self.signer.sign_login(&timestamp)?;
        ControlFrame::login(LoginArgs {
            api_key: self.credentials.api_key().to_string(),
            passphrase: self.credentials.passphrase().to_string(),
            timestamp,
            sign,
        })?
        .to_text()
    }

    /// Drive one established socket until it dies or shutdown is requested.
    async fn serve(
        &self,
        stream: WsStream,
        out_rx: &mut mpsc::Receiver<String>,
        state_rx: &mut watch::Receiver<ConnState>,
    ) -> ServeExit {
        let (mut write, mut read) = stream.split();

        if self.scope == Scope::Private {
            self.set_state(ConnState::Authenticating);
            let frame = match self.login_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    self.record_login_error(e.to_string());
                    return ServeExit::LoginFailed;
                }
            };
            if write.send(Message::Text(frame)).await.is_err() {
                return ServeExit::Lost { was_ready: false };
            }
            let login = timeout(self.config.login_timeout, async {
                while let Some(msg) = read.next().await {
                    let Ok(Message::Text(text)) = msg else {
                        continue;
                    };
                    match self.router.dispatch(&text) {
                        Dispatched::Login { ok, code, msg } => return Some((ok, code, msg)),
                        // The venue rejects bad credentials with a bare
                        // error event instead of a login ack.
                        Dispatched::ErrorEvent { code, msg } => return Some((false, code, msg)),
                        _ => {}
                    }
                }
                None
            })
            .await;
            match login {
                Ok(Some((true, _, _))) => debug!(url = %self.url, "login accepted"),
                Ok(Some((false, code, msg))) => {
                    warn!(code, msg = %msg, "login rejected");
                    self.record_login_error(format!("login rejected: code {code}, msg: {msg}"));
                    return ServeExit::LoginFailed;
                }
                Ok(None) => return ServeExit::Lost { was_ready: false },
                Err(_) => {
                    self.record_login_error("login timed out".to_string());
                    return ServeExit::LoginFailed;
                }
            }
        }

        self.set_state(ConnState::Ready);
        if is_closing(state_rx) {
            let _ = write.send(Message::Close(None)).await;
            return ServeExit::Closing;
        }
        info!(url = %self.url, scope = ?self.scope, "connection ready");

        // Replay every live topic in one batched frame so receivers keep
        // delivering across the reconnect.
        let replay = self.router.live_topics();
        if !replay.is_empty() {
            info!(count = replay.len(), "resubscribing live topics");
            let frame = ControlFrame::subscribe(&replay).and_then(|f| f.to_text());
            match frame {
                Ok(text) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        return ServeExit::Lost { was_ready: true };
                    }
                }
                Err(e) => error!(error = %e, "failed to encode replay frame"),
            }
        }

        let mut ping = interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        let mut last_rx = Instant::now();
        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_rx = Instant::now();
                        match self.router.dispatch(&text) {
                            Dispatched::Login { code, msg, .. } => {
                                debug!(code, msg = %msg, "unexpected login ack while ready");
                            }
                            Dispatched::ErrorEvent { code, msg } => {
                                warn!(code, msg = %msg, "venue error event");
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_rx = Instant::now();
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return ServeExit::Lost { was_ready: true };
                        }
                    }
                    Some(Ok(Message::Pong(_))) => last_rx = Instant::now(),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(url = %self.url, "server closed connection");
                        return ServeExit::Lost { was_ready: true };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "read error");
                        return ServeExit::Lost { was_ready: true };
                    }
                },
                out = out_rx.recv() => match out {
                    Some(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            return ServeExit::Lost { was_ready: true };
                        }
                    }
                    // Every sender dropped means the handle is gone.
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return ServeExit::Closing;
                    }
                },
                _ = ping.tick() => {
                    if last_rx.elapsed() > self.config.pong_timeout {
                        warn!(url = %self.url, "missed pong, treating connection as dead");
                        return ServeExit::Lost { was_ready: true };
                    }
                    if write.send(Message::Text("ping".to_string())).await.is_err() {
                        return ServeExit::Lost { was_ready: true };
                    }
                },
                () = wait_closing(state_rx) => {
                    let _ = write.send(Message::Close(None)).await;
                    return ServeExit::Closing;
                },
            }
        }
    }
}

/// Background socket task: connect, serve, reconnect with backoff until the
/// retry budget is exhausted or shutdown is requested.
async fn run(shared: Arc<Shared>, mut out_rx: mpsc::Receiver<String>) {
    let mut state_rx = shared.state_tx.subscribe();
    let mut attempts: u32 = 0;
    loop {
        if is_closing(&state_rx) {
            break;
        }
        shared.set_state(ConnState::Connecting);
        let connected =
            timeout(shared.config.connect_timeout, connect_async(shared.url.as_str())).await;
        match connected {
            Ok(Ok((stream, _))) => {
                match shared.serve(stream, &mut out_rx, &mut state_rx).await {
                    ServeExit::Closing => break,
                    ServeExit::Lost { was_ready } => {
                        if was_ready {
                            attempts = 0;
                        }
                        shared
                            .router
                            .fail_all_pending(|| Error::Transport("connection lost".to_string()));
                    }
                    ServeExit::LoginFailed => {
                        shared
                            .router
                            .fail_all_pending(|| Error::Auth("login failed".to_string()));
                    }
                }
            }
            Ok(Err(e)) => warn!(url = %shared.url, error = %e, "connect failed"),
            Err(_) => warn!(url = %shared.url, "connect timed out"),
        }
        if is_closing(&state_rx) {
            break;
        }
        shared.set_state(ConnState::Disconnected);
        attempts += 1;
        if attempts > shared.config.max_reconnect_attempts {
            error!(url = %shared.url, attempts, "reconnect budget exhausted");
            break;
        }
        let delay = backoff_delay(shared.config.reconnect_delay, attempts);
        debug!(url = %shared.url, attempt = attempts, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            () = sleep(delay) => {}
            () = wait_closing(&mut state_rx) => break,
        }
    }
    shared.router.close_all();
    shared.state_tx.send_replace(ConnState::Closing);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(1);
        let jitter = Duration::from_millis(250);
        assert!(backoff_delay(base, 1) < Duration::from_secs(1) + jitter + Duration::from_millis(1));
        assert!(backoff_delay(base, 3) >= Duration::from_secs(4));
        assert!(backoff_delay(base, 99) <= Duration::from_secs(60) + jitter);
    }

    #[test]
    fn default_config_keeps_ping_inside_pong_window() {
        let cfg = WsConfig::default();
        assert!(cfg.ping_interval < cfg.pong_timeout);
    }
}
