//! WebSocket connection channel running on its own bridge thread
//!
//! ```text
//! Render thread (macroquad)        │  Bridge thread (tokio)
//! ──────────────────────────────── │ ─────────────────────────────
//! Connection::poll()               │  run_channel()
//!   ← events.try_recv()            │    read.next() → events.send()
//! ChannelHandle::send(msg)         │
//!   → commands.send(Send)          │    commands.recv() → write.send()
//! Connection::set_keys(keys)       │
//!   → keys watch                   │    input tick (50ms) → throttler
//! ```
//!
//! The session store lives on the render thread only; the bridge thread
//! sees nothing but commands, key snapshots and the connection state.
//! There is no reconnection: once closed, the channel stays closed.

use crate::input::{DirectionKeys, InputThrottler, INPUT_TICK};
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ClientMessage;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Lifecycle events delivered to the render thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    Closed,
    Errored(String),
}

/// Requests from the render thread to the bridge thread.
#[derive(Debug)]
pub enum ChannelCommand {
    Send(ClientMessage),
    StartInput,
    Shutdown,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// What the session needs from the channel.
pub trait Outbound {
    fn state(&self) -> ConnectionState;

    /// Queues a message; dropped unless the channel is open.
    fn send(&self, message: ClientMessage);

    /// Arms the input throttler.
    fn start_input(&self);
}

/// Connection state readable from both threads.
#[derive(Debug, Clone, Default)]
pub struct ConnectionCell(Arc<AtomicU8>);

impl ConnectionCell {
    pub fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    fn set(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closed => 2,
        };
        self.0.store(raw, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    state: ConnectionCell,
}

impl Outbound for ChannelHandle {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, message: ClientMessage) {
        if self.state.get() != ConnectionState::Open {
            debug!("Channel not open, dropping {:?}", message);
            return;
        }
        if self.commands.send(ChannelCommand::Send(message)).is_err() {
            debug!("Bridge thread gone, dropping outbound message");
        }
    }

    fn start_input(&self) {
        if self.commands.send(ChannelCommand::StartInput).is_err() {
            debug!("Bridge thread gone, input loop not started");
        }
    }
}

/// Render-thread side of the channel.
pub struct Connection {
    handle: ChannelHandle,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    keys: watch::Sender<DirectionKeys>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Connection {
    /// Spawns the bridge thread and starts connecting to `url`.
    ///
    /// Connection failures are not returned here; they arrive as
    /// [`ChannelEvent::Errored`].
    pub fn open(url: impl Into<String>) -> std::io::Result<Self> {
        let url = url.into();
        let state = ConnectionCell::default();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (keys_tx, keys_rx) = watch::channel(DirectionKeys::default());

        let bridge_state = state.clone();
        let thread = thread::Builder::new()
            .name("viewer-channel".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to create channel runtime: {}", e);
                        bridge_state.set(ConnectionState::Closed);
                        let _ = event_tx.send(ChannelEvent::Errored(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(run_channel(url, bridge_state, event_tx, command_rx, keys_rx));
            })?;

        Ok(Self {
            handle: ChannelHandle {
                commands: command_tx,
                state,
            },
            events: event_rx,
            keys: keys_tx,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state.get()
    }

    /// Drains all pending events without blocking.
    pub fn poll(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for the next event; `None` once the bridge thread is gone.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Publishes the latest key snapshot for the input loop.
    pub fn set_keys(&self, keys: DirectionKeys) {
        self.keys.send_if_modified(|current| {
            if *current == keys {
                return false;
            }
            *current = keys;
            true
        });
    }

    /// Closes the socket and waits for the bridge thread to finish.
    pub fn shutdown(&mut self) {
        let _ = self.handle.commands.send(ChannelCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Channel thread panicked");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.handle.commands.send(ChannelCommand::Shutdown);
    }
}

async fn send_message<S>(sink: &mut S, message: &ClientMessage) -> Result<(), ChannelError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = message.encode()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Runs the throttler against the tick's scheduled deadline, so move spacing
/// follows the interval grid rather than when the tick got handled.
fn input_tick(
    throttler: &mut InputThrottler,
    deadline: tokio::time::Instant,
    state: &ConnectionCell,
    keys_rx: &watch::Receiver<DirectionKeys>,
) -> Vec<ClientMessage> {
    let keys = *keys_rx.borrow();
    let open = state.get() == ConnectionState::Open;
    throttler.tick(deadline.into_std(), open, keys)
}

async fn run_channel(
    url: String,
    state: ConnectionCell,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    keys_rx: watch::Receiver<DirectionKeys>,
) {
    info!("Connecting to {}", url);

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", url, e);
            state.set(ConnectionState::Closed);
            let _ = event_tx.send(ChannelEvent::Errored(e.to_string()));
            return;
        }
    };

    info!("Connected to {}", url);
    state.set(ConnectionState::Open);
    let _ = event_tx.send(ChannelEvent::Opened);

    let (mut write, mut read) = stream.split();
    let mut throttler = InputThrottler::new();
    let mut input_interval = interval(INPUT_TICK);
    input_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ending = 'channel: loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = event_tx.send(ChannelEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        let _ = event_tx.send(ChannelEvent::Message(text));
                    }
                    Err(_) => warn!("Dropping non UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the connection: {:?}", frame);
                    break 'channel ChannelEvent::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving frame: {}", e);
                    break 'channel ChannelEvent::Errored(e.to_string());
                }
                None => break 'channel ChannelEvent::Closed,
            },

            command = command_rx.recv() => match command {
                Some(ChannelCommand::Send(message)) => match send_message(&mut write, &message).await {
                    Ok(()) => {}
                    Err(ChannelError::Encode(e)) => error!("Dropping {:?}: {}", message, e),
                    Err(e) => {
                        error!("Error sending message: {}", e);
                        break 'channel ChannelEvent::Errored(e.to_string());
                    }
                },
                Some(ChannelCommand::StartInput) => {
                    if !throttler.is_armed() {
                        info!("Input loop started");
                        throttler.arm();
                    }
                }
                Some(ChannelCommand::Shutdown) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break 'channel ChannelEvent::Closed;
                }
            },

            deadline = input_interval.tick(), if throttler.is_armed() => {
                for message in input_tick(&mut throttler, deadline, &state, &keys_rx) {
                    if let Err(e) = send_message(&mut write, &message).await {
                        error!("Error sending input: {}", e);
                        break 'channel ChannelEvent::Errored(e.to_string());
                    }
                }
            },
        }
    };

    throttler.disarm();
    state.set(ConnectionState::Closed);
    info!("Channel closed, input loop stopped");
    let _ = event_tx.send(ending);
}
