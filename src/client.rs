//! The async client driver.
//!
//! [`Client::connect`] spawns a driver task that owns the transport and
//! the sans-IO core: it reads messages, executes the core's actions,
//! applies the outbound throttle, answers PING probes, and reconnects
//! with jittered exponential backoff. Applications talk to it through a
//! cloneable [`ClientHandle`] and receive [`Event`]s on a channel.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::core::{Action, Actions, ClientCore, ConnectionState};
use crate::error::ClientError;
use crate::event::Event;
use crate::irc::MAX_BODY_LEN;
use crate::message::Message;
use crate::request::{RequestKey, RequestOutcome, WhoisInfo, WhowasInfo};
use crate::state::ModeValue;
use crate::throttle::{is_throttled_command, Throttle};
use crate::transport::{ConnectOptions, Transport, TransportSink};

/// Backoff starts here and doubles per failed attempt.
const BACKOFF_BASE: Duration = Duration::from_secs(5);
/// Backoff never exceeds this.
const BACKOFF_CAP: Duration = Duration::from_secs(300);
/// A registration that held this long resets the backoff.
const STABLE_PERIOD: Duration = Duration::from_secs(60);

/// Requests from the handle to the driver.
enum Command {
    SendRaw(Message),
    Join {
        channel: String,
        key: Option<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Part {
        channel: String,
        reason: Option<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Kick {
        channel: String,
        target: String,
        reason: Option<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Cycle {
        channel: String,
        reason: Option<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    SetTopic {
        channel: String,
        topic: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    SetMode {
        target: String,
        args: Vec<String>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    SetNickname(String),
    SetAway(Option<String>),
    Whois {
        nick: String,
        reply: oneshot::Sender<Result<RequestOutcome, ClientError>>,
    },
    Whowas {
        nick: String,
        reply: oneshot::Sender<Result<RequestOutcome, ClientError>>,
    },
    Monitor {
        nick: String,
        reply: oneshot::Sender<bool>,
    },
    Unmonitor {
        nick: String,
        reply: oneshot::Sender<bool>,
    },
    Quit(Option<String>),
}

/// How a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EndKind {
    /// User-initiated; do not reconnect.
    Quit,
    /// Transport or protocol forced; reconnect with backoff.
    Dropped,
}

/// A handle for talking to a running client.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    request_timeout: Duration,
}

impl ClientHandle {
    /// Current connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    async fn send_cmd(&self, cmd: Command) -> Result<(), ClientError> {
        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Closed)
    }

    /// Send a raw message. Chat commands go through the throttle.
    pub async fn send_raw(&self, msg: Message) -> Result<(), ClientError> {
        self.send_cmd(Command::SendRaw(msg)).await
    }

    /// Message a channel or user, splitting long bodies across lines.
    pub async fn message(&self, target: &str, text: &str) -> Result<(), ClientError> {
        for chunk in split_chat_text(target, text) {
            self.send_raw(Message::privmsg(target, &chunk)).await?;
        }
        Ok(())
    }

    /// Notice a channel or user, splitting long bodies across lines.
    pub async fn notice(&self, target: &str, text: &str) -> Result<(), ClientError> {
        for chunk in split_chat_text(target, text) {
            self.send_raw(Message::notice(target, &chunk)).await?;
        }
        Ok(())
    }

    pub async fn join(&self, channel: &str, key: Option<&str>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Join {
            channel: channel.to_string(),
            key: key.map(String::from),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub async fn part(&self, channel: &str, reason: Option<&str>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Part {
            channel: channel.to_string(),
            reason: reason.map(String::from),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub async fn kick(
        &self,
        channel: &str,
        target: &str,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Kick {
            channel: channel.to_string(),
            target: target.to_string(),
            reason: reason.map(String::from),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Part and rejoin a channel, reusing its key if one is set.
    pub async fn cycle(&self, channel: &str, reason: Option<&str>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Cycle {
            channel: channel.to_string(),
            reason: reason.map(String::from),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub async fn set_topic(&self, channel: &str, topic: &str) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::SetTopic {
            channel: channel.to_string(),
            topic: topic.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    pub async fn set_mode(&self, target: &str, args: &[&str]) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::SetMode {
            target: target.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Ask for a new nickname. Rely on [`Event::NickChange`] for success.
    pub async fn set_nickname(&self, nick: &str) -> Result<(), ClientError> {
        self.send_cmd(Command::SetNickname(nick.to_string())).await
    }

    /// Mark ourselves away.
    pub async fn away(&self, message: &str) -> Result<(), ClientError> {
        self.send_cmd(Command::SetAway(Some(message.to_string()))).await
    }

    /// Clear our away status.
    pub async fn back(&self) -> Result<(), ClientError> {
        self.send_cmd(Command::SetAway(None)).await
    }

    /// WHOIS a nickname; resolves when the end numeric arrives.
    ///
    /// `Ok(None)` means the server knows no such nick.
    pub async fn whois(&self, nick: &str) -> Result<Option<WhoisInfo>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Whois {
            nick: nick.to_string(),
            reply,
        })
        .await?;
        match self.await_request(rx).await? {
            RequestOutcome::Whois(info) => Ok(info),
            other => unreachable!("whois resolved with {:?}", other),
        }
    }

    /// WHOWAS a nickname; resolves on the end numeric.
    pub async fn whowas(&self, nick: &str) -> Result<Option<WhowasInfo>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Whowas {
            nick: nick.to_string(),
            reply,
        })
        .await?;
        match self.await_request(rx).await? {
            RequestOutcome::Whowas(info) => Ok(info),
            other => unreachable!("whowas resolved with {:?}", other),
        }
    }

    async fn await_request(
        &self,
        rx: oneshot::Receiver<Result<RequestOutcome, ClientError>>,
    ) -> Result<RequestOutcome, ClientError> {
        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Err(_)) => Err(ClientError::Closed),
            Ok(Ok(result)) => result,
        }
    }

    /// Start monitoring a nickname. Returns whether the server supports
    /// MONITOR.
    pub async fn monitor(&self, nick: &str) -> Result<bool, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Monitor {
            nick: nick.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Stop monitoring a nickname.
    pub async fn unmonitor(&self, nick: &str) -> Result<bool, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(Command::Unmonitor {
            nick: nick.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Quit and stop reconnecting.
    pub async fn quit(&self, message: Option<&str>) -> Result<(), ClientError> {
        self.send_cmd(Command::Quit(message.map(String::from))).await
    }
}

/// Split chat text on newlines and the per-line byte budget.
///
/// The budget leaves room for our own hostmask as relayed by the server,
/// which we cannot know exactly; empty lines become a single space since
/// some servers reject empty messages.
fn split_chat_text(target: &str, text: &str) -> Vec<String> {
    let budget = MAX_BODY_LEN
        .saturating_sub("PRIVMSG  :\r\n".len() + target.len() + 96)
        .max(64);

    let mut out = Vec::new();
    for line in text.replace('\r', "").split('\n') {
        if line.is_empty() {
            out.push(" ".to_string());
            continue;
        }
        let mut rest = line;
        while !rest.is_empty() {
            let mut end = rest.len().min(budget);
            while end > 0 && !rest.is_char_boundary(end) {
                end -= 1;
            }
            out.push(rest[..end].to_string());
            rest = &rest[end..];
        }
    }
    out
}

/// Connect a client and spawn its driver on the current runtime.
///
/// Returns the command handle and the event stream.
pub struct Client;

impl Client {
    pub fn connect(
        host: &str,
        port: u16,
        config: Config,
    ) -> (ClientHandle, mpsc::Receiver<Event>) {
        let (handle, events, driver) = build_driver(host, port, config);
        tokio::spawn(driver.run());
        (handle, events)
    }
}

/// Per-connection driver context: the write half and its queues.
struct ConnCtx {
    sink: TransportSink,
    chat_queue: VecDeque<Message>,
    throttle: Throttle,
    sasl_deadline: Option<Instant>,
}

impl ConnCtx {
    async fn write(&mut self, msg: Message) -> Result<(), crate::error::ProtocolError> {
        if is_throttled_command(&msg.command) {
            self.chat_queue.push_back(msg);
            self.flush_chat().await
        } else {
            self.sink.send(msg).await
        }
    }

    async fn flush_chat(&mut self) -> Result<(), crate::error::ProtocolError> {
        while !self.chat_queue.is_empty() && self.throttle.try_acquire() {
            let msg = self.chat_queue.pop_front().expect("queue non-empty");
            self.sink.send(msg).await?;
        }
        Ok(())
    }
}

struct Driver {
    opts: ConnectOptions,
    core: ClientCore,
    event_tx: mpsc::Sender<Event>,
    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    waiters: HashMap<RequestKey, Vec<oneshot::Sender<Result<RequestOutcome, ClientError>>>>,
    /// User commands issued before registration, replayed after 001.
    deferred: VecDeque<Command>,
    registered_at: Option<Instant>,
}

fn build_driver(
    host: &str,
    port: u16,
    config: Config,
) -> (ClientHandle, mpsc::Receiver<Event>, Driver) {
    let (event_tx, event_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let opts = ConnectOptions {
        host: host.to_string(),
        port,
        tls: config.tls,
        tls_verify: config.tls_verify,
        tls_client_cert: config.tls_client_cert.clone(),
        tls_client_cert_key: config.tls_client_cert_key.clone(),
        tls_client_cert_password: config.tls_client_cert_password.clone(),
        encoding: config.encoding,
    };
    let handle = ClientHandle {
        cmd_tx,
        state_rx,
        request_timeout: config.request_timeout,
    };
    let driver = Driver {
        opts,
        core: ClientCore::new(config),
        event_tx,
        cmd_rx,
        state_tx,
        waiters: HashMap::new(),
        deferred: VecDeque::new(),
        registered_at: None,
    };
    (handle, event_rx, driver)
}

impl Driver {
    fn sync_state(&self) {
        let _ = self.state_tx.send(self.core.connection);
    }

    /// Run the driver inside a span naming the server, so log lines from
    /// clients sharing one pool stay attributable.
    async fn run(self) {
        let span = info_span!("client", server = %self.opts.host, port = self.opts.port);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) {
        let mut backoff = Backoff::default();
        loop {
            self.core.connection = ConnectionState::Connecting;
            self.sync_state();
            self.registered_at = None;

            match Transport::connect(&self.opts).await {
                Ok(transport) => {
                    info!("connected");
                    let end = self.drive_connection(transport).await;
                    let stable = self
                        .registered_at
                        .is_some_and(|at| at.elapsed() >= STABLE_PERIOD);
                    self.fail_waiters();
                    for cmd in self.deferred.drain(..) {
                        reject_offline(cmd);
                    }

                    match end {
                        Ok(EndKind::Quit) => {
                            let acts = self.core.closed();
                            self.emit_offline(acts).await;
                            self.sync_state();
                            return;
                        }
                        Ok(EndKind::Dropped) | Err(_) => {
                            if let Err(e) = &end {
                                warn!(error = %e, "connection failed");
                            }
                            let acts = self.core.connection_lost();
                            self.emit_offline(acts).await;
                            self.sync_state();
                            if stable {
                                backoff.reset();
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connect failed");
                }
            }

            self.core.connection = ConnectionState::Reconnecting;
            self.sync_state();
            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
            if !self.wait_backoff(delay).await {
                let acts = self.core.closed();
                self.emit_offline(acts).await;
                self.sync_state();
                return;
            }
        }
    }

    /// Sleep out the backoff, still answering commands. Returns false on
    /// quit (or when every handle is gone).
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Quit(_)) => return false,
                    Some(cmd) => reject_offline(cmd),
                },
            }
        }
    }

    async fn drive_connection(
        &mut self,
        transport: Transport,
    ) -> Result<EndKind, crate::error::ProtocolError> {
        let (sink, mut stream) = transport.split();
        let mut ctx = ConnCtx {
            sink,
            chat_queue: VecDeque::new(),
            throttle: Throttle::default(),
            sasl_deadline: None,
        };
        let mut last_inbound = Instant::now();
        let mut ping_probe_sent = false;
        let ping_timeout = self.core.config.ping_timeout;

        let acts = self.core.start();
        self.sync_state();
        if let Some(end) = self.perform(acts, &mut ctx).await? {
            return Ok(end);
        }

        loop {
            ctx.flush_chat().await?;

            let far_future = Instant::now() + Duration::from_secs(86400);
            let ping_deadline = if ping_probe_sent {
                last_inbound + 2 * ping_timeout
            } else {
                last_inbound + ping_timeout
            };
            let sasl_deadline = ctx.sasl_deadline.unwrap_or(far_future);
            let throttle_wakeup = if ctx.chat_queue.is_empty() {
                far_future
            } else {
                ctx.throttle.next_ready().unwrap_or(far_future)
            };

            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        // All handles dropped; quit quietly.
                        let quit = self.core.config.quit_message.clone();
                        let _ = ctx.sink.send(Message::cmd("QUIT", &[&quit])).await;
                        return Ok(EndKind::Quit);
                    };
                    if let Some(end) = self.handle_command(cmd, &mut ctx).await? {
                        return Ok(end);
                    }
                }

                inbound = stream.next() => match inbound {
                    Some(Ok(msg)) => {
                        last_inbound = Instant::now();
                        ping_probe_sent = false;
                        let acts = self.core.handle_message(&msg);
                        if let Some(end) = self.perform(acts, &mut ctx).await? {
                            return Ok(end);
                        }
                        self.replay_deferred(&mut ctx).await?;
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        debug!("peer closed the connection");
                        return Ok(EndKind::Dropped);
                    }
                },

                _ = sleep_until(ping_deadline) => {
                    if ping_probe_sent {
                        warn!("no data within twice the ping timeout, declaring transport dead");
                        return Ok(EndKind::Dropped);
                    }
                    ping_probe_sent = true;
                    let probe = Message::cmd("PING", &[&self.opts.host]);
                    ctx.sink.send(probe).await?;
                }

                _ = sleep_until(sasl_deadline), if ctx.sasl_deadline.is_some() => {
                    ctx.sasl_deadline = None;
                    let acts = self.core.sasl_timeout();
                    if let Some(end) = self.perform(acts, &mut ctx).await? {
                        return Ok(end);
                    }
                }

                _ = sleep_until(throttle_wakeup), if !ctx.chat_queue.is_empty() => {
                    // Loop around to flush the chat queue.
                }
            }
        }
    }

    /// Execute core actions. Returns the session end, if one was ordered.
    async fn perform(
        &mut self,
        acts: Actions,
        ctx: &mut ConnCtx,
    ) -> Result<Option<EndKind>, crate::error::ProtocolError> {
        let mut end = None;
        for act in acts {
            match act {
                Action::Send(msg) => ctx.sink.send(msg).await?,
                Action::SendThrottled(msg) => {
                    ctx.chat_queue.push_back(msg);
                    ctx.flush_chat().await?;
                }
                Action::Emit(event) => {
                    if matches!(event, Event::Connect) {
                        self.registered_at = Some(Instant::now());
                        self.sync_state();
                    }
                    let _ = self.event_tx.send(event).await;
                }
                Action::CompleteRequest(key, outcome) => {
                    if let Some(txs) = self.waiters.remove(&key) {
                        for tx in txs {
                            let _ = tx.send(Ok(outcome.clone()));
                        }
                    }
                }
                Action::SaslTimer(arm) => {
                    ctx.sasl_deadline =
                        arm.then(|| Instant::now() + self.core.config.sasl_timeout);
                }
                Action::Disconnect { expected } => {
                    end = Some(if expected { EndKind::Quit } else { EndKind::Dropped });
                }
            }
        }
        Ok(end)
    }

    /// Deliver events and completions when no transport exists.
    async fn emit_offline(&mut self, acts: Actions) {
        for act in acts {
            match act {
                Action::Emit(event) => {
                    let _ = self.event_tx.send(event).await;
                }
                Action::CompleteRequest(key, outcome) => {
                    if let Some(txs) = self.waiters.remove(&key) {
                        for tx in txs {
                            let _ = tx.send(Ok(outcome.clone()));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn fail_waiters(&mut self) {
        for (_, txs) in self.waiters.drain() {
            for tx in txs {
                let _ = tx.send(Err(ClientError::Disconnected));
            }
        }
    }

    async fn replay_deferred(
        &mut self,
        ctx: &mut ConnCtx,
    ) -> Result<(), crate::error::ProtocolError> {
        if !self.core.registered() {
            return Ok(());
        }
        while let Some(cmd) = self.deferred.pop_front() {
            if self.handle_command(cmd, ctx).await?.is_some() {
                break;
            }
        }
        Ok(())
    }

    async fn handle_command(
        &mut self,
        cmd: Command,
        ctx: &mut ConnCtx,
    ) -> Result<Option<EndKind>, crate::error::ProtocolError> {
        // The handshake strictly precedes user traffic; park anything
        // user-level until 001.
        if !self.core.registered() && !matches!(cmd, Command::Quit(_)) {
            self.deferred.push_back(cmd);
            return Ok(None);
        }

        match cmd {
            Command::SendRaw(msg) => ctx.write(msg).await?,
            Command::Join { channel, key, reply } => {
                if self.core.state.in_channel(&channel) {
                    let _ = reply.send(Err(ClientError::AlreadyInChannel(channel)));
                } else {
                    ctx.sink.send(Message::join(&channel, key.as_deref())).await?;
                    let _ = reply.send(Ok(()));
                }
            }
            Command::Part { channel, reason, reply } => {
                if !self.core.state.in_channel(&channel) {
                    let _ = reply.send(Err(ClientError::NotInChannel(channel)));
                } else {
                    let msg = match &reason {
                        Some(reason) => Message::cmd("PART", &[&channel, reason]),
                        None => Message::cmd("PART", &[&channel]),
                    };
                    ctx.sink.send(msg).await?;
                    let _ = reply.send(Ok(()));
                }
            }
            Command::Kick { channel, target, reason, reply } => {
                if !self.core.state.in_channel(&channel) {
                    let _ = reply.send(Err(ClientError::NotInChannel(channel)));
                } else {
                    let msg = match &reason {
                        Some(reason) => Message::cmd("KICK", &[&channel, &target, reason]),
                        None => Message::cmd("KICK", &[&channel, &target]),
                    };
                    ctx.sink.send(msg).await?;
                    let _ = reply.send(Ok(()));
                }
            }
            Command::Cycle { channel, reason, reply } => {
                if !self.core.state.in_channel(&channel) {
                    let _ = reply.send(Err(ClientError::NotInChannel(channel)));
                } else {
                    let key = self.core.state.channel(&channel).and_then(|ch| {
                        match ch.modes.get(&'k') {
                            Some(ModeValue::Param(key)) => Some(key.clone()),
                            _ => None,
                        }
                    });
                    let part = match &reason {
                        Some(reason) => Message::cmd("PART", &[&channel, reason]),
                        None => Message::cmd("PART", &[&channel]),
                    };
                    ctx.sink.send(part).await?;
                    ctx.sink.send(Message::join(&channel, key.as_deref())).await?;
                    let _ = reply.send(Ok(()));
                }
            }
            Command::SetTopic { channel, topic, reply } => {
                if !self.core.state.in_channel(&channel) {
                    let _ = reply.send(Err(ClientError::NotInChannel(channel)));
                } else {
                    ctx.sink.send(Message::cmd("TOPIC", &[&channel, &topic])).await?;
                    let _ = reply.send(Ok(()));
                }
            }
            Command::SetMode { target, args, reply } => {
                if self.core.params.is_channel(&target) && !self.core.state.in_channel(&target) {
                    let _ = reply.send(Err(ClientError::NotInChannel(target)));
                } else {
                    let mut params = vec![target];
                    params.extend(args);
                    ctx.sink.send(Message::new("MODE", params)).await?;
                    let _ = reply.send(Ok(()));
                }
            }
            Command::SetNickname(nick) => {
                ctx.sink.send(Message::cmd("NICK", &[&nick])).await?;
            }
            Command::SetAway(message) => {
                let msg = match &message {
                    Some(text) => Message::cmd("AWAY", &[text]),
                    None => Message::cmd("AWAY", &[]),
                };
                ctx.sink.send(msg).await?;
            }
            Command::Whois { nick, reply } => {
                let mut acts = Actions::new();
                let key = self.core.begin_whois(&nick, &mut acts);
                self.waiters.entry(key).or_default().push(reply);
                return self.perform(acts, ctx).await;
            }
            Command::Whowas { nick, reply } => {
                let mut acts = Actions::new();
                let key = self.core.begin_whowas(&nick, &mut acts);
                self.waiters.entry(key).or_default().push(reply);
                return self.perform(acts, ctx).await;
            }
            Command::Monitor { nick, reply } => {
                let mut acts = Actions::new();
                let supported = self.core.monitor(&nick, &mut acts);
                let _ = reply.send(supported);
                return self.perform(acts, ctx).await;
            }
            Command::Unmonitor { nick, reply } => {
                let mut acts = Actions::new();
                let supported = self.core.unmonitor(&nick, &mut acts);
                let _ = reply.send(supported);
                return self.perform(acts, ctx).await;
            }
            Command::Quit(message) => {
                self.core.connection = ConnectionState::Closing;
                self.sync_state();
                let text = message.unwrap_or_else(|| self.core.config.quit_message.clone());
                let _ = ctx.sink.send(Message::cmd("QUIT", &[&text])).await;
                return Ok(Some(EndKind::Quit));
            }
        }
        Ok(None)
    }
}

/// Answer a command received while no connection exists.
fn reject_offline(cmd: Command) {
    match cmd {
        Command::Join { reply, .. }
        | Command::Part { reply, .. }
        | Command::Kick { reply, .. }
        | Command::Cycle { reply, .. }
        | Command::SetTopic { reply, .. }
        | Command::SetMode { reply, .. } => {
            let _ = reply.send(Err(ClientError::Disconnected));
        }
        Command::Whois { reply, .. } | Command::Whowas { reply, .. } => {
            let _ = reply.send(Err(ClientError::Disconnected));
        }
        Command::Monitor { reply, .. } | Command::Unmonitor { reply, .. } => {
            let _ = reply.send(false);
        }
        Command::SendRaw(_) | Command::SetNickname(_) | Command::SetAway(_) | Command::Quit(_) => {}
    }
}

/// Exponential backoff with ±10% jitter.
#[derive(Default)]
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let exp = BACKOFF_BASE.as_secs_f64() * 2f64.powi(self.attempt.min(16) as i32);
        let capped = exp.min(BACKOFF_CAP.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);
        let jitter = 0.9 + rand::thread_rng().gen::<f64>() * 0.2;
        Duration::from_secs_f64(capped * jitter)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Runs many clients on one cooperative, single-threaded scheduler.
///
/// Clients are interleaved fairly at their suspension points by the
/// local task scheduler. A client belongs to at most one pool.
#[derive(Default)]
pub struct ClientPool {
    drivers: Vec<Pin<Box<dyn Future<Output = ()>>>>,
}

impl ClientPool {
    pub fn new() -> ClientPool {
        ClientPool::default()
    }

    /// Register a client with the pool. The driver starts running when
    /// [`handle_forever`](Self::handle_forever) is called.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        config: Config,
    ) -> (ClientHandle, mpsc::Receiver<Event>) {
        let (handle, events, driver) = build_driver(host, port, config);
        self.drivers.push(Box::pin(driver.run()));
        (handle, events)
    }

    /// Drive every client until all of them have disconnected for good.
    pub fn handle_forever(self) -> std::io::Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = tokio::task::LocalSet::new();
        for driver in self.drivers {
            local.spawn_local(driver);
        }
        rt.block_on(local);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chat_text_short() {
        assert_eq!(split_chat_text("#c", "hello"), vec!["hello"]);
    }

    #[test]
    fn test_split_chat_text_newlines_and_empties() {
        assert_eq!(split_chat_text("#c", "a\nb"), vec!["a", "b"]);
        assert_eq!(split_chat_text("#c", "a\r\n\r\nb"), vec!["a", " ", "b"]);
    }

    #[test]
    fn test_split_chat_text_long_lines() {
        let long = "x".repeat(1000);
        let chunks = split_chat_text("#chan", &long);
        assert!(chunks.len() >= 2);
        let reassembled: String = chunks.concat();
        assert_eq!(reassembled, long);
        for chunk in &chunks {
            assert!(chunk.len() + "#chan".len() + 128 <= MAX_BODY_LEN + 64);
        }
    }

    #[test]
    fn test_split_chat_text_multibyte_boundary() {
        let text = "é".repeat(400);
        let chunks = split_chat_text("#c", &text);
        let reassembled: String = chunks.concat();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let mut backoff = Backoff::default();
        let first = backoff.next_delay();
        assert!(first >= Duration::from_secs_f64(4.5) && first <= Duration::from_secs_f64(5.5));
        let second = backoff.next_delay();
        assert!(second >= Duration::from_secs_f64(9.0) && second <= Duration::from_secs_f64(11.0));

        for _ in 0..10 {
            backoff.next_delay();
        }
        let capped = backoff.next_delay();
        assert!(capped <= Duration::from_secs_f64(330.0));
        assert!(capped >= Duration::from_secs_f64(270.0));

        backoff.reset();
        let again = backoff.next_delay();
        assert!(again <= Duration::from_secs_f64(5.5));
    }
}
