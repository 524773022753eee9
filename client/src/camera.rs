//! Camera derivation: centers the view on the local player's authoritative
//! position and clamps it to the world bounds.

use crate::game::{LocalPlayer, WorldInfo};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    /// Top-left of the visible world window; unset until the first server position.
    pub camera: Option<Camera>,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            camera: None,
        }
    }

    /// Recomputes the camera, leaving the previous value in place when
    /// [`derive_camera`] has nothing to say yet.
    pub fn recompute(&mut self, local: &LocalPlayer, world: &WorldInfo) {
        if let Some(camera) = derive_camera(local, (self.width, self.height), world) {
            self.camera = Some(camera);
        }
    }

    pub fn world_to_screen(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        self.camera.map(|camera| (x - camera.x, y - camera.y))
    }

    pub fn screen_to_world(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        self.camera.map(|camera| (x + camera.x, y + camera.y))
    }
}

/// Clamps one axis into `[0, max(0, world - view)]`.
pub fn clamp_axis(desired: f32, world: f32, view: f32) -> f32 {
    desired.clamp(0.0, (world - view).max(0.0))
}

pub fn derive_camera(
    local: &LocalPlayer,
    viewport: (f32, f32),
    world: &WorldInfo,
) -> Option<Camera> {
    if !world.ready || world.width == 0 || world.height == 0 || !local.has_server_position {
        return None;
    }

    let (view_w, view_h) = viewport;
    let desired_x = local.x as f32 - view_w / 2.0;
    let desired_y = local.y as f32 - view_h / 2.0;

    Some(Camera {
        x: clamp_axis(desired_x, world.width as f32, view_w),
        y: clamp_axis(desired_y, world.height as f32, view_h),
    })
}
