//! Interactive chat session.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──connect ok──► Active ──/quit, peer close, signal──► Closing ──► Closed
//!     ▲                        │
//!     └──── /manga <id> ───────┘   (old connection torn down first)
//! ```
//!
//! Three tasks run while `Active`:
//!
//! - **Input loop**: [`Session::run`], reading lines and sending through the
//!   shared [`ConnectionSender`].
//! - **Receive loop**: one spawned task per connection, rendering messages.
//! - **Signal loop**: owned by the caller, holding an [`Interrupter`].
//!
//! They coordinate only through the one-shot [`StopSignal`]; whichever
//! trigger fires first closes the connection, everyone else just exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::command::{self, Command, HELP};
use super::console::Console;
use super::history::HistoryClient;
use super::render::{history_lines, render_message};
use super::types::{OutgoingMessage, Room};
use crate::ws::{Connection, ConnectionReceiver, ConnectionSender, WsResult};

/// Hint shown whenever the chat server looks unreachable.
const SERVER_HINT: &str = "Check if chat server is running";

/// One-shot stop gate shared by the session's loops.
///
/// Starts open; [`trigger`](Self::trigger) closes it exactly once.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    fired: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    /// New, untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate. Returns `true` only for the caller that closed it.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.fired.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether the gate has been closed.
    pub fn is_triggered(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the gate is closed (immediately if it already is).
    pub async fn stopped(&self) {
        loop {
            // Register before checking so a trigger in between is not missed
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Slot holding the write half of the current connection, if any.
type Link = Arc<Mutex<Option<ConnectionSender>>>;

fn current_sender(link: &Link) -> Option<ConnectionSender> {
    link.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace_sender(link: &Link, sender: Option<ConnectionSender>) -> Option<ConnectionSender> {
    std::mem::replace(
        &mut *link.lock().unwrap_or_else(PoisonError::into_inner),
        sender,
    )
}

/// Handle the signal loop uses to stop a running session from outside.
#[derive(Debug, Clone)]
pub struct Interrupter {
    stop: StopSignal,
    link: Link,
}

impl Interrupter {
    /// Trigger the stop signal and, if this call won, close the connection.
    ///
    /// Returns `false` when the session was already stopping.
    pub async fn interrupt(&self) -> bool {
        if !self.stop.trigger() {
            return false;
        }
        log::info!("[Chat] Interrupted, closing connection");
        if let Some(sender) = current_sender(&self.link) {
            if let Err(e) = sender.close().await {
                log::debug!("[Chat] Close after interrupt failed: {e}");
            }
        }
        true
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress, or waiting for a room switch after a failed one.
    Connecting,
    /// Connected; input and receive loops running.
    Active,
    /// Stop signal fired; connection being closed.
    Closing,
    /// Connection closed; the session is finished.
    Closed,
}

/// Connection and history settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chat WebSocket endpoint, e.g. `ws://localhost:9093/chat`.
    pub chat_url: String,
    /// Chat server HTTP base URL for history requests.
    pub http_url: String,
    /// Messages fetched by `/history`.
    pub history_limit: usize,
}

/// Whether the input loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// One interactive chat session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    history: HistoryClient,
    room: Room,
    state: SessionState,
    stop: StopSignal,
    link: Link,
    receive_task: Option<JoinHandle<()>>,
    console: Arc<dyn Console>,
}

impl Session {
    /// Create a session for `room`. Nothing is dialled until [`connect`](Self::connect).
    pub fn new(config: SessionConfig, room: Room, console: Arc<dyn Console>) -> Result<Self> {
        let history = HistoryClient::new(config.http_url.clone())?;
        Ok(Self {
            config,
            history,
            room,
            state: SessionState::Connecting,
            stop: StopSignal::new(),
            link: Arc::new(Mutex::new(None)),
            receive_task: None,
            console,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Room the session is (or is trying to be) joined to.
    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Handle for stopping the session from a signal handler.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            stop: self.stop.clone(),
            link: Arc::clone(&self.link),
        }
    }

    /// Open a connection to the current room and start its receive loop.
    pub async fn connect(&mut self) -> WsResult<()> {
        self.state = SessionState::Connecting;
        let connection = Connection::connect(&self.config.chat_url, self.room.manga_id()).await?;
        self.attach(connection).await;
        Ok(())
    }

    /// Adopt an upgraded connection for the current room.
    ///
    /// If the stop signal fired while the connection was being opened, the
    /// connection is closed straight away and the session moves to `Closing`.
    pub async fn attach(&mut self, connection: Connection) {
        let (sender, receiver) = connection.into_split();
        // Publish before checking the gate so an interrupt sees it either way
        replace_sender(&self.link, Some(sender.clone()));
        if self.stop.is_triggered() {
            log::info!("[Chat] Stopped while joining {}, closing", self.room);
            self.state = SessionState::Closing;
            if let Err(e) = sender.close().await {
                log::debug!("[Chat] Close of late connection failed: {e}");
            }
            return;
        }

        self.receive_task = Some(tokio::spawn(receive_loop(
            receiver,
            sender,
            self.stop.clone(),
            Arc::clone(&self.console),
        )));
        self.state = SessionState::Active;
        log::info!("[Chat] Joined {} chat", self.room);

        self.console.line(&format!(
            "Connected to {} chat at {}",
            self.room, self.config.chat_url
        ));
        self.console.line("Type a message and press Enter. /help lists commands, /quit leaves.");
    }

    /// Run the input loop until `/quit`, end of input, or the stop signal.
    pub async fn run<I>(&mut self, input: I) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let stop = self.stop.clone();

        loop {
            let line = tokio::select! {
                () = stop.stopped() => break,
                line = lines.next_line() => line.context("Failed to read input")?,
            };
            let Some(line) = line else {
                log::info!("[Chat] End of input");
                self.shutdown().await;
                break;
            };
            if self.handle_line(&line).await == Flow::Stop || stop.is_triggered() {
                break;
            }
        }

        self.stop_receive_loop().await;
        // Whoever won the stop has closed it already; close is idempotent
        if let Some(sender) = current_sender(&self.link) {
            if let Err(e) = sender.close().await {
                log::debug!("[Chat] Final close failed: {e}");
            }
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        match command::parse(line) {
            Ok(None) => Flow::Continue,
            Ok(Some(command)) => self.dispatch(command).await,
            Err(usage) => {
                self.console.error(&usage.to_string(), None);
                Flow::Continue
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Flow {
        match command {
            Command::Say(text) => {
                let message = OutgoingMessage::message(text, self.room.manga_id());
                self.send(&message).await
            }
            Command::Quit => {
                self.shutdown().await;
                self.console.line("Left the chat.");
                Flow::Stop
            }
            Command::Help => {
                self.console.line(HELP);
                Flow::Continue
            }
            Command::Users => self.send(&OutgoingMessage::users()).await,
            Command::Pm { to, text } => self.send(&OutgoingMessage::pm(to, text)).await,
            Command::Manga(id) => {
                self.switch_room(Room::Manga(id)).await;
                Flow::Continue
            }
            Command::History => {
                self.show_history().await;
                Flow::Continue
            }
            Command::Status => {
                let message = OutgoingMessage::status(self.room.manga_id());
                self.send(&message).await
            }
            Command::Unknown(name) => {
                self.console.error(
                    &format!("Unknown command: {name}"),
                    Some("Type /help for available commands"),
                );
                Flow::Continue
            }
        }
    }

    async fn send(&mut self, message: &OutgoingMessage) -> Flow {
        let Some(sender) = current_sender(&self.link) else {
            self.console
                .error("Not connected", Some("Use /manga <id> to join a room"));
            return Flow::Continue;
        };
        match sender.send(message).await {
            Ok(()) => Flow::Continue,
            Err(e) if !e.is_disconnect() => {
                log::error!("[Chat] Send failed: {e}");
                self.console.error(&format!("Failed to send message: {e}"), None);
                Flow::Continue
            }
            Err(e) => {
                log::error!("[Chat] Send failed, treating as disconnect: {e}");
                if self.stop.trigger() {
                    self.state = SessionState::Closing;
                    self.console
                        .error(&format!("Connection lost: {e}"), Some(SERVER_HINT));
                    if let Err(e) = sender.close().await {
                        log::debug!("[Chat] Close after send failure failed: {e}");
                    }
                }
                Flow::Stop
            }
        }
    }

    /// Fire the stop signal and close the connection if we got there first.
    async fn shutdown(&mut self) {
        if !self.stop.trigger() {
            return;
        }
        self.state = SessionState::Closing;
        if let Some(sender) = current_sender(&self.link) {
            if let Err(e) = sender.close().await {
                log::debug!("[Chat] Close failed: {e}");
            }
        }
    }

    /// Abort the receive task before its connection is closed, so a close
    /// reply from the server cannot fire the session-wide stop signal.
    ///
    /// The abort can cut a pong off mid-write while it holds the writer lock.
    /// The close frame that follows may then land after a partial frame; only
    /// the connection being discarded is affected.
    async fn stop_receive_loop(&mut self) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
            // Cancelled is the expected outcome
            let _ = task.await;
        }
    }

    async fn switch_room(&mut self, room: Room) {
        log::info!("[Chat] Switching from {} to {}", self.room, room);
        self.stop_receive_loop().await;
        if let Some(old) = replace_sender(&self.link, None) {
            if let Err(e) = old.close().await {
                log::debug!("[Chat] Closing previous room failed: {e}");
            }
        }

        self.room = room;
        if let Err(e) = self.connect().await {
            log::error!("[Chat] Failed to join {}: {e}", self.room);
            self.state = SessionState::Connecting;
            self.console.error(
                &format!("Failed to join {} chat: {e}", self.room),
                Some(&format!("{SERVER_HINT} at {}", self.config.chat_url)),
            );
        }
    }

    async fn show_history(&self) {
        match self
            .history
            .fetch(self.room.history_key(), self.config.history_limit)
            .await
        {
            Ok(history) => {
                for line in history_lines(&history) {
                    self.console.line(&line);
                }
            }
            Err(e) => {
                log::error!("[Chat] History request failed: {e:#}");
                self.console.error(
                    &format!("Failed to fetch history: {e:#}"),
                    Some(&format!("{SERVER_HINT} at {}", self.history.base_url())),
                );
            }
        }
    }
}

/// Render incoming messages until the stream ends or the session stops.
async fn receive_loop(
    mut receiver: ConnectionReceiver,
    sender: ConnectionSender,
    stop: StopSignal,
    console: Arc<dyn Console>,
) {
    loop {
        let result = tokio::select! {
            () = stop.stopped() => return,
            result = receiver.receive() => result,
        };
        match result {
            Ok(Some(message)) => console.line(&render_message(&message)),
            Ok(None) => {
                if stop.trigger() {
                    console.line("Connection closed");
                    if let Err(e) = sender.close().await {
                        log::debug!("[Chat] Close after peer close failed: {e}");
                    }
                }
                return;
            }
            Err(e) => {
                log::error!("[Chat] Receive failed: {e}");
                if stop.trigger() {
                    console.error(&format!("Connection lost: {e}"), Some(SERVER_HINT));
                    if let Err(e) = sender.close().await {
                        log::debug!("[Chat] Close after receive error failed: {e}");
                    }
                }
                return;
            }
        }
    }
}
