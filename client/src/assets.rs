//! Avatar frame catalog and the asset-cache contract the session drives

use log::{debug, warn};
use macroquad::texture::{Image, Texture2D};
use shared::{AvatarDescriptor, AvatarId, DirectionalFrames, Facing};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read frame {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode frame {path:?}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("avatar `{0}` has no frames for {1:?}")]
    MissingFrames(AvatarId, Facing),
}

/// Handle to one renderable frame. `texture` indexes the renderer's texture store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub texture: usize,
    pub flip_x: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvatarFrames {
    pub north: Vec<Frame>,
    pub south: Vec<Frame>,
    pub east: Vec<Frame>,
    pub west: Vec<Frame>,
}

impl AvatarFrames {
    pub fn sequence(&self, facing: Facing) -> &[Frame] {
        match facing {
            Facing::North => &self.north,
            Facing::South => &self.south,
            Facing::East => &self.east,
            Facing::West => &self.west,
        }
    }

    /// Picks the frame for a facing, wrapping the animation index.
    pub fn frame(&self, facing: Facing, animation_frame: u32) -> Option<Frame> {
        let sequence = self.sequence(facing);
        if sequence.is_empty() {
            return None;
        }
        Some(sequence[animation_frame as usize % sequence.len()])
    }
}

#[derive(Debug, Default)]
pub struct AvatarCatalog {
    avatars: HashMap<AvatarId, AvatarFrames>,
}

impl AvatarCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, avatar_id: AvatarId, frames: AvatarFrames) {
        self.avatars.insert(avatar_id, frames);
    }

    pub fn contains(&self, avatar_id: &str) -> bool {
        self.avatars.contains_key(avatar_id)
    }

    pub fn frame(&self, avatar_id: &str, facing: Facing, animation_frame: u32) -> Option<Frame> {
        self.avatars.get(avatar_id)?.frame(facing, animation_frame)
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }
}

/// Result of one caching request, handed back to the session when ready.
pub type CacheCompletion = (AvatarId, Result<AvatarFrames, AssetError>);

/// Caches avatar frames for drawing.
///
/// Implementations report completion later through
/// [`crate::game::Session::on_avatar_cached`]; this call must not block on
/// reading or decoding.
pub trait AssetCache {
    fn cache_avatar_frames(&mut self, avatar_id: &str, descriptor: &AvatarDescriptor);
}

/// Frame images decoded off the render thread, waiting for upload.
pub struct DecodedAvatar {
    pub north: Vec<Image>,
    pub south: Vec<Image>,
    pub east: Vec<Image>,
    /// `None` when the descriptor had no west frames.
    pub west: Option<Vec<Image>>,
}

type LoadRequest = (AvatarId, DirectionalFrames);
type LoadResult = (AvatarId, Result<DecodedAvatar, AssetError>);

/// Loads frame images from disk into macroquad textures.
///
/// Frame sources are paths relative to `root`. Reading and decoding run on a
/// loader thread; only the texture upload happens on the render thread, in
/// [`TextureAssets::take_completed`]. A descriptor without west frames reuses
/// the east textures drawn mirrored.
pub struct TextureAssets {
    root: PathBuf,
    textures: Vec<Texture2D>,
    requested: HashSet<AvatarId>,
    requests: mpsc::UnboundedSender<LoadRequest>,
    loaded: mpsc::UnboundedReceiver<LoadResult>,
}

impl TextureAssets {
    /// Starts the loader thread.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<LoadRequest>();
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();

        let loader_root = root.clone();
        thread::Builder::new()
            .name("viewer-assets".into())
            .spawn(move || {
                while let Some((avatar_id, frames)) = request_rx.blocking_recv() {
                    let result = decode_avatar(&loader_root, &avatar_id, &frames);
                    if loaded_tx.send((avatar_id, result)).is_err() {
                        break;
                    }
                }
                debug!("Asset loader stopped");
            })?;

        Ok(Self {
            root,
            textures: Vec::new(),
            requested: HashSet::new(),
            requests: request_tx,
            loaded: loaded_rx,
        })
    }

    pub fn texture(&self, frame: Frame) -> Option<&Texture2D> {
        self.textures.get(frame.texture)
    }

    /// Uploads whatever the loader has finished so the frame loop can feed
    /// it to the session. Never waits on the loader.
    pub fn take_completed(&mut self) -> Vec<CacheCompletion> {
        let mut completed = Vec::new();
        while let Ok((avatar_id, result)) = self.loaded.try_recv() {
            let result = result.map(|decoded| self.upload(decoded));
            if let Err(e) = &result {
                warn!("Caching avatar {} failed: {}", avatar_id, e);
                // Allow a later descriptor to retry.
                self.requested.remove(&avatar_id);
            }
            completed.push((avatar_id, result));
        }
        completed
    }

    fn upload(&mut self, decoded: DecodedAvatar) -> AvatarFrames {
        let north = self.upload_sequence(&decoded.north);
        let south = self.upload_sequence(&decoded.south);
        let east = self.upload_sequence(&decoded.east);
        let west = match &decoded.west {
            Some(images) => self.upload_sequence(images),
            None => mirrored(&east),
        };

        AvatarFrames {
            north,
            south,
            east,
            west,
        }
    }

    fn upload_sequence(&mut self, images: &[Image]) -> Vec<Frame> {
        images
            .iter()
            .map(|image| {
                self.textures.push(Texture2D::from_image(image));
                Frame {
                    texture: self.textures.len() - 1,
                    flip_x: false,
                }
            })
            .collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetCache for TextureAssets {
    fn cache_avatar_frames(&mut self, avatar_id: &str, descriptor: &AvatarDescriptor) {
        if !self.requested.insert(avatar_id.to_string()) {
            debug!("Avatar {} already requested", avatar_id);
            return;
        }

        let request = (avatar_id.to_string(), descriptor.frames.clone());
        if self.requests.send(request).is_err() {
            warn!("Asset loader gone, avatar {} will not be drawn", avatar_id);
            self.requested.remove(avatar_id);
        }
    }
}

fn decode_frame(root: &Path, source: &str) -> Result<Image, AssetError> {
    let path = root.join(source);
    let bytes = std::fs::read(&path).map_err(|source| AssetError::Io {
        path: path.clone(),
        source,
    })?;
    Image::from_file_with_format(&bytes, None).map_err(|e| AssetError::Decode {
        path,
        message: format!("{:?}", e),
    })
}

fn decode_sequence(
    root: &Path,
    avatar_id: &str,
    facing: Facing,
    sources: &[String],
) -> Result<Vec<Image>, AssetError> {
    if sources.is_empty() {
        return Err(AssetError::MissingFrames(avatar_id.to_string(), facing));
    }
    sources.iter().map(|source| decode_frame(root, source)).collect()
}

/// Reads and decodes every frame of one avatar. Safe to call off the
/// render thread: no textures are created here.
pub fn decode_avatar(
    root: &Path,
    avatar_id: &str,
    frames: &DirectionalFrames,
) -> Result<DecodedAvatar, AssetError> {
    let north = decode_sequence(root, avatar_id, Facing::North, &frames.north)?;
    let south = decode_sequence(root, avatar_id, Facing::South, &frames.south)?;
    let east = decode_sequence(root, avatar_id, Facing::East, &frames.east)?;
    let west = if frames.west.is_empty() {
        None
    } else {
        Some(decode_sequence(root, avatar_id, Facing::West, &frames.west)?)
    };

    Ok(DecodedAvatar {
        north,
        south,
        east,
        west,
    })
}

/// Reuses a sequence drawn horizontally flipped.
pub fn mirrored(frames: &[Frame]) -> Vec<Frame> {
    frames
        .iter()
        .map(|frame| Frame {
            texture: frame.texture,
            flip_x: !frame.flip_x,
        })
        .collect()
}
