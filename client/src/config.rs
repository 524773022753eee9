use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ClientConfig {
    /// WebSocket URL of the world server
    #[arg(short = 's', long, env = "VIEWER_SERVER", default_value = "ws://127.0.0.1:8080")]
    pub server: String,

    /// Name to join with
    #[arg(short = 'u', long, env = "VIEWER_USERNAME", default_value = "player")]
    pub username: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    pub width: u32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    pub height: u32,

    /// World image; its size becomes the world size
    #[arg(long)]
    pub world_image: Option<PathBuf>,

    /// World width when no image is given
    #[arg(long, default_value = "2048")]
    pub world_width: u32,

    /// World height when no image is given
    #[arg(long, default_value = "2048")]
    pub world_height: u32,

    /// Directory avatar frame paths are resolved against
    #[arg(short = 'a', long, env = "VIEWER_ASSETS", default_value = "assets")]
    pub assets: PathBuf,
}
