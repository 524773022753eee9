use clap::Parser;
use client::assets::TextureAssets;
use client::config::ClientConfig;
use client::game::{Collaborators, Session};
use client::hud::Hud;
use client::input::DirectionKeys;
use client::network::Connection;
use client::rendering::Renderer;
use log::{error, info, warn};
use macroquad::prelude::*;
use std::io::BufRead;
use std::time::Instant;
use tokio::sync::mpsc;

fn window_conf() -> Conf {
    let config = ClientConfig::parse();
    Conf {
        window_title: "World Viewer".to_owned(),
        window_width: config.width as i32,
        window_height: config.height as i32,
        window_resizable: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ClientConfig::parse();

    info!("Starting client...");
    info!("Connecting to: {}", config.server);
    info!("Controls: WASD/arrows to move, click to walk to a point, type in the terminal to chat");

    if let Err(e) = run(config).await {
        error!("Client stopped: {}", e);
    }
}

async fn run(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let world_texture = match &config.world_image {
        Some(path) => {
            let texture = load_texture(&path.to_string_lossy())
                .await
                .map_err(|e| format!("failed to load world image {}: {:?}", path.display(), e))?;
            Some(texture)
        }
        None => None,
    };

    let (world_width, world_height) = match &world_texture {
        Some(texture) => (texture.width() as u32, texture.height() as u32),
        None => (config.world_width, config.world_height),
    };

    let (surface_w, surface_h) = Renderer::surface_size();
    let mut session = Session::new(&config.username, surface_w, surface_h);
    session.set_world(world_width, world_height);
    info!("World is {}x{}", world_width, world_height);

    let mut assets = TextureAssets::new(&config.assets)?;
    info!("Avatar frames resolve against {}", assets.root().display());

    let mut hud = Hud::new();
    let renderer = Renderer::new(world_texture);
    let mut chat_lines = spawn_stdin_reader();

    let mut connection = Connection::open(config.server.clone())?;
    let channel = connection.handle().clone();

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        let now = Instant::now();
        connection.set_keys(DirectionKeys::sample());

        let (surface_w, surface_h) = Renderer::surface_size();
        session.resize(surface_w, surface_h);

        {
            let mut ctx = Collaborators {
                channel: &channel,
                assets: &mut assets,
                ui: &mut hud,
            };
            for event in connection.poll() {
                session.on_channel_event(event, &mut ctx, now);
            }
        }

        for (avatar_id, result) in assets.take_completed() {
            session.on_avatar_cached(avatar_id, result);
        }

        if is_mouse_button_pressed(MouseButton::Left) {
            let (mouse_x, mouse_y) = mouse_position();
            if let Some((x, y)) = session.request_move_to(mouse_x, mouse_y, &channel) {
                info!("Walking to ({}, {})", x, y);
            }
        }

        while let Ok(line) = chat_lines.try_recv() {
            if !line.trim().is_empty() && !session.send_chat(&line, &channel) {
                warn!("Chat not sent: not connected");
            }
        }

        session.advance_presentation();
        renderer.render(&session, &assets, &hud);

        next_frame().await;
    }

    connection.shutdown();
    Ok(())
}

/// Forwards terminal lines to the frame loop as chat messages.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = std::thread::Builder::new()
        .name("viewer-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Chat input unavailable: {}", e);
    }

    rx
}
