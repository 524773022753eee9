use crate::assets::TextureAssets;
use crate::camera::Camera;
use crate::game::{Drawable, Session, WorldInfo};
use crate::hud::{ChatLine, Hud};
use crate::network::ConnectionState;
use macroquad::prelude::*;

const GRID_SPACING: f32 = 64.0;
const LABEL_SIZE: f32 = 16.0;
const CHAT_LINE_HEIGHT: f32 = 16.0;

pub struct Renderer {
    world: Option<Texture2D>,
}

impl Renderer {
    pub fn new(world: Option<Texture2D>) -> Self {
        Renderer { world }
    }

    /// Current size of the render surface.
    pub fn surface_size() -> (f32, f32) {
        (screen_width(), screen_height())
    }

    pub fn render(&self, session: &Session, assets: &TextureAssets, hud: &Hud) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        match session.viewport.camera {
            Some(camera) => {
                self.draw_world(camera, &session.world);
                for drawable in session.drawables() {
                    self.draw_avatar(&drawable, assets);
                }
            }
            None => {
                draw_text("Waiting for the server...", 20.0, screen_height() / 2.0, 24.0, GRAY);
            }
        }

        self.draw_ui(hud);
    }

    fn draw_world(&self, camera: Camera, world: &WorldInfo) {
        let (view_w, view_h) = Self::surface_size();
        let visible_w = view_w.min(world.width as f32);
        let visible_h = view_h.min(world.height as f32);

        match &self.world {
            Some(texture) => {
                draw_texture_ex(
                    texture,
                    0.0,
                    0.0,
                    WHITE,
                    DrawTextureParams {
                        source: Some(Rect::new(camera.x, camera.y, visible_w, visible_h)),
                        dest_size: Some(vec2(visible_w, visible_h)),
                        ..Default::default()
                    },
                );
            }
            None => self.draw_grid(camera, visible_w, visible_h),
        }

        draw_rectangle_lines(
            -camera.x,
            -camera.y,
            world.width as f32,
            world.height as f32,
            2.0,
            Color::from_rgba(68, 68, 68, 255),
        );
    }

    fn draw_grid(&self, camera: Camera, visible_w: f32, visible_h: f32) {
        let line_color = Color::from_rgba(40, 40, 40, 255);

        let mut x = -(camera.x % GRID_SPACING);
        while x <= visible_w {
            draw_line(x, 0.0, x, visible_h, 1.0, line_color);
            x += GRID_SPACING;
        }

        let mut y = -(camera.y % GRID_SPACING);
        while y <= visible_h {
            draw_line(0.0, y, visible_w, y, 1.0, line_color);
            y += GRID_SPACING;
        }
    }

    fn draw_avatar(&self, drawable: &Drawable, assets: &TextureAssets) {
        let Some(texture) = assets.texture(drawable.frame) else {
            return;
        };

        let width = texture.width();
        let height = texture.height();
        let x = drawable.screen_x - width / 2.0;
        let y = drawable.screen_y - height / 2.0;

        draw_texture_ex(
            texture,
            x,
            y,
            WHITE,
            DrawTextureParams {
                flip_x: drawable.frame.flip_x,
                ..Default::default()
            },
        );

        let label_color = if drawable.is_local {
            GREEN
        } else {
            WHITE
        };
        let label_width = measure_text(&drawable.label, None, LABEL_SIZE as u16, 1.0).width;
        draw_text(
            &drawable.label,
            drawable.screen_x - label_width / 2.0,
            y - 4.0,
            LABEL_SIZE,
            label_color,
        );
    }

    fn draw_ui(&self, hud: &Hud) {
        let y_start = 10.0;

        let connection_color = match hud.connection {
            ConnectionState::Open => GREEN,
            ConnectionState::Connecting => YELLOW,
            ConnectionState::Closed => RED,
        };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        draw_text(hud.status_text(), 22.0, y_start + 8.0, 16.0, WHITE);

        let player_text = format!("{} players", hud.player_count);
        draw_text(&player_text, 10.0, y_start + 26.0, 16.0, WHITE);

        let bottom = screen_height() - 10.0;
        let lines = hud.chat.len() as f32;
        for (i, line) in hud.chat.iter().enumerate() {
            let y = bottom - (lines - 1.0 - i as f32) * CHAT_LINE_HEIGHT;
            match line {
                ChatLine::Message { username, message } => {
                    draw_text(&format!("<{}> {}", username, message), 10.0, y, 16.0, WHITE);
                }
                ChatLine::Notice(text) => {
                    draw_text(text, 10.0, y, 16.0, Color::from_rgba(0, 170, 255, 255));
                }
            }
        }
    }
}
