//! # World Viewer Client Library
//!
//! Client side of a shared top-down world: it shows the world image, the
//! local avatar and every other connected avatar, and keeps their positions
//! in step with an authoritative server over a WebSocket.
//!
//! ## Architecture Overview
//!
//! The server owns every position. The client never predicts its own
//! movement; it sends movement commands and draws whatever the server
//! reports back. What the client adds is presentation: remote avatars are
//! smoothed between sparse updates, and the camera follows the local
//! avatar's last confirmed position.
//!
//! ### Two Loops
//! Rendering runs on the main thread at display rate. The socket and the
//! input sampling loop run on a separate bridge thread with its own tokio
//! runtime, so movement commands keep flowing at a fixed cadence even when
//! frames stall. The threads share no mutable state besides the connection
//! state flag; everything else crosses as messages.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The [`game::Session`] context object: world info, local player, remote
//! players, viewport and avatar catalog, plus the handlers for every
//! server message.
//!
//! ### Interpolation Module (`interpolation`)
//! Per-tick exponential smoothing of remote players toward their targets.
//!
//! ### Camera Module (`camera`)
//! Centers and clamps the visible window of the world.
//!
//! ### Input Module (`input`)
//! Key sampling and the throttler turning held keys into `move`/`stop`.
//!
//! ### Network Module (`network`)
//! The bridge thread owning the WebSocket and the input loop.
//!
//! ### Assets, HUD and Rendering (`assets`, `hud`, `rendering`)
//! The collaborators the session drives: avatar frame caching, status and
//! chat display, and macroquad drawing.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::{Collaborators, Session};
//! use client::hud::Hud;
//! use client::assets::TextureAssets;
//! use client::network::Connection;
//! use std::time::Instant;
//!
//! let mut session = Session::new("ann", 800.0, 600.0);
//! session.set_world(2048, 2048);
//!
//! let mut connection = Connection::open("ws://127.0.0.1:8080")?;
//! let channel = connection.handle().clone();
//! let mut assets = TextureAssets::new("assets")?;
//! let mut hud = Hud::new();
//!
//! // Once per frame:
//! for event in connection.poll() {
//!     let mut ctx = Collaborators { channel: &channel, assets: &mut assets, ui: &mut hud };
//!     session.on_channel_event(event, &mut ctx, Instant::now());
//! }
//! session.advance_presentation();
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod assets;
pub mod camera;
pub mod config;
pub mod game;
pub mod hud;
pub mod input;
pub mod interpolation;
pub mod network;
pub mod rendering;
