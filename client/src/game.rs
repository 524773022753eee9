use crate::assets::{AssetCache, AssetError, AvatarCatalog, AvatarFrames, Frame};
use crate::camera::Viewport;
use crate::hud::UiNotifier;
use crate::interpolation;
use crate::network::{ChannelEvent, ConnectionState, Outbound};
use log::{debug, error, info, warn};
use shared::{
    AvatarDescriptor, AvatarId, ClientMessage, Facing, JoinGame, PlayerId, PlayerRecord,
    PlayerUpdate, ServerMessage,
};
use std::collections::HashMap;
use std::time::Instant;

/// Size of the world image. Fixed once the image has loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldInfo {
    pub width: u32,
    pub height: u32,
    pub ready: bool,
}

impl WorldInfo {
    pub fn loaded(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ready: true,
        }
    }
}

/// The player this client controls. Its position is only ever written from
/// server messages.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayer {
    pub id: Option<PlayerId>,
    pub username: String,
    pub x: i32,
    pub y: i32,
    pub facing: Facing,
    pub animation_frame: u32,
    pub avatar: Option<AvatarId>,
    /// An authoritative position has been received.
    pub has_server_position: bool,
    /// Avatar frames are cached and the player can be drawn.
    pub ready: bool,
}

impl LocalPlayer {
    pub fn new(username: String) -> Self {
        Self {
            id: None,
            username,
            x: 0,
            y: 0,
            facing: Facing::default(),
            animation_frame: 0,
            avatar: None,
            has_server_position: false,
            ready: false,
        }
    }

    fn apply_record(&mut self, record: &PlayerRecord) {
        self.x = record.x;
        self.y = record.y;
        self.facing = record.facing;
        self.animation_frame = record.animation_frame;
        self.avatar = record.avatar.clone();
        if !record.username.is_empty() {
            self.username = record.username.clone();
        }
        self.has_server_position = true;
    }

    fn apply_update(&mut self, update: &PlayerUpdate) {
        if let Some(x) = update.x {
            self.x = x;
        }
        if let Some(y) = update.y {
            self.y = y;
        }
        if update.x.is_some() && update.y.is_some() {
            self.has_server_position = true;
        }
        if let Some(facing) = update.facing {
            self.facing = facing;
        }
        if let Some(frame) = update.animation_frame {
            self.animation_frame = frame;
        }
    }
}

/// Another connected player, drawn at a smoothed position.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub id: PlayerId,
    pub username: String,
    pub avatar: Option<AvatarId>,
    pub x: f64,
    pub y: f64,
    pub target_x: f64,
    pub target_y: f64,
    pub facing: Facing,
    pub animation_frame: u32,
    pub last_update: Instant,
}

impl RemotePlayer {
    pub fn new(id: PlayerId, username: String, avatar: Option<AvatarId>, x: i32, y: i32) -> Self {
        Self {
            id,
            username,
            avatar,
            x: f64::from(x),
            y: f64::from(y),
            target_x: f64::from(x),
            target_y: f64::from(y),
            facing: Facing::default(),
            animation_frame: 0,
            last_update: Instant::now(),
        }
    }

    fn from_record(id: &str, record: &PlayerRecord, now: Instant) -> Self {
        let username = if record.username.is_empty() {
            id.to_string()
        } else {
            record.username.clone()
        };

        Self {
            facing: record.facing,
            animation_frame: record.animation_frame,
            last_update: now,
            ..Self::new(id.to_string(), username, record.avatar.clone(), record.x, record.y)
        }
    }

    fn retarget(&mut self, update: &PlayerUpdate, now: Instant) {
        if let Some(x) = update.x {
            self.target_x = f64::from(x);
        }
        if let Some(y) = update.y {
            self.target_y = f64::from(y);
        }
        if let Some(facing) = update.facing {
            self.facing = facing;
        }
        if let Some(frame) = update.animation_frame {
            self.animation_frame = frame;
        }
        self.last_update = now;
    }
}

/// One avatar ready to draw, already in screen space.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    pub frame: Frame,
    pub screen_x: f32,
    pub screen_y: f32,
    pub label: String,
    pub is_local: bool,
}

/// Everything the session calls out to while handling an event.
pub struct Collaborators<'a> {
    pub channel: &'a dyn Outbound,
    pub assets: &'a mut dyn AssetCache,
    pub ui: &'a mut dyn UiNotifier,
}

/// State of one connection run: world, players, camera and avatar frames.
pub struct Session {
    pub world: WorldInfo,
    pub local: LocalPlayer,
    pub remotes: HashMap<PlayerId, RemotePlayer>,
    pub viewport: Viewport,
    pub avatars: AvatarCatalog,
    commands_permitted: bool,
}

impl Session {
    pub fn new(username: impl Into<String>, viewport_width: f32, viewport_height: f32) -> Self {
        Self {
            world: WorldInfo::default(),
            local: LocalPlayer::new(username.into()),
            remotes: HashMap::new(),
            viewport: Viewport::new(viewport_width, viewport_height),
            avatars: AvatarCatalog::new(),
            commands_permitted: false,
        }
    }

    /// Records the world size once its image has loaded.
    pub fn set_world(&mut self, width: u32, height: u32) {
        if self.world.ready {
            warn!(
                "World already loaded at {}x{}, ignoring {}x{}",
                self.world.width, self.world.height, width, height
            );
            return;
        }
        self.world = WorldInfo::loaded(width, height);
        self.viewport.recompute(&self.local, &self.world);
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        if self.viewport.width == width && self.viewport.height == height {
            return;
        }
        self.viewport.width = width;
        self.viewport.height = height;
        self.viewport.recompute(&self.local, &self.world);
    }

    /// True once the server has placed us and until the channel closes.
    pub fn commands_permitted(&self) -> bool {
        self.commands_permitted
    }

    pub fn player_count(&self) -> usize {
        self.remotes.len() + usize::from(self.local.id.is_some())
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent, ctx: &mut Collaborators, now: Instant) {
        match event {
            ChannelEvent::Opened => {
                ctx.ui.set_connection_state(ConnectionState::Open);
                info!("Joining as {}", self.local.username);
                ctx.channel.send(ClientMessage::JoinGame {
                    username: self.local.username.clone(),
                });
            }
            ChannelEvent::Message(raw) => self.handle_raw(&raw, ctx, now),
            ChannelEvent::Closed => {
                warn!("Disconnected from server");
                self.commands_permitted = false;
                ctx.ui.set_connection_state(ConnectionState::Closed);
            }
            ChannelEvent::Errored(reason) => {
                error!("Connection error: {}", reason);
                self.commands_permitted = false;
                ctx.ui.set_connection_state(ConnectionState::Closed);
            }
        }
    }

    /// Decodes one text frame; undecodable frames are logged and dropped.
    pub fn handle_raw(&mut self, raw: &str, ctx: &mut Collaborators, now: Instant) {
        match ServerMessage::decode(raw) {
            Ok(message) => self.handle_message(message, ctx, now),
            Err(e) => warn!("Dropping server message: {}", e),
        }
    }

    pub fn handle_message(&mut self, message: ServerMessage, ctx: &mut Collaborators, now: Instant) {
        debug!("Handling {}", message.action());
        match message {
            ServerMessage::JoinGame(join) => self.on_join_game(join, ctx, now),
            ServerMessage::PlayersMoved { players } => self.on_players_moved(players, ctx, now),
            ServerMessage::PlayerJoined { player, avatar } => {
                self.on_player_joined(player, avatar, ctx, now)
            }
            ServerMessage::PlayerLeft { player_id } => self.on_player_left(&player_id, ctx),
            ServerMessage::Chat { username, message } => ctx.ui.append_chat(&username, &message),
        }
    }

    fn on_join_game(&mut self, join: JoinGame, ctx: &mut Collaborators, now: Instant) {
        if !join.success {
            warn!(
                "Join rejected: {}",
                join.error.as_deref().unwrap_or("no reason given")
            );
            return;
        }

        let Some(player_id) = join.player_id else {
            warn!("Dropping join_game: success without playerId");
            return;
        };

        match join.players.get(&player_id) {
            Some(record) => self.local.apply_record(record),
            None => warn!("join_game did not include our own player {}", player_id),
        }

        for (id, record) in &join.players {
            if *id == player_id {
                continue;
            }
            self.remotes
                .insert(id.clone(), RemotePlayer::from_record(id, record, now));
        }

        for (avatar_id, descriptor) in &join.avatars {
            ctx.assets.cache_avatar_frames(avatar_id, descriptor);
        }

        match &self.local.avatar {
            Some(avatar) if self.avatars.contains(avatar) => self.local.ready = true,
            Some(avatar) if !join.avatars.contains_key(avatar) => {
                warn!("No frames sent for our avatar {}", avatar)
            }
            _ => {}
        }

        info!(
            "Joined as {} ({}) with {} other players",
            self.local.username,
            player_id,
            self.remotes.len()
        );
        self.local.id = Some(player_id);

        self.viewport.recompute(&self.local, &self.world);
        self.open_command_gate(ctx);
        ctx.ui.set_player_count(self.player_count());
    }

    /// Commands flow only once the server has placed the local player.
    fn open_command_gate(&mut self, ctx: &mut Collaborators) {
        if self.commands_permitted || !self.local.has_server_position {
            return;
        }
        self.commands_permitted = true;
        ctx.channel.start_input();
    }

    fn on_players_moved(
        &mut self,
        players: HashMap<PlayerId, PlayerUpdate>,
        ctx: &mut Collaborators,
        now: Instant,
    ) {
        let mut local_moved = false;

        for (id, update) in &players {
            if self.local.id.as_deref() == Some(id.as_str()) {
                self.local.apply_update(update);
                local_moved = true;
                continue;
            }

            match self.remotes.get_mut(id) {
                Some(remote) => remote.retarget(update, now),
                None => debug!("Ignoring move for unknown player {}", id),
            }
        }

        if local_moved {
            self.viewport.recompute(&self.local, &self.world);
            self.open_command_gate(ctx);
        }
    }

    fn on_player_joined(
        &mut self,
        player: PlayerRecord,
        avatar: Option<AvatarDescriptor>,
        ctx: &mut Collaborators,
        now: Instant,
    ) {
        if player.id.is_empty() {
            warn!("Dropping player_joined without a player id");
            return;
        }
        if self.local.id.as_deref() == Some(player.id.as_str()) {
            debug!("Ignoring player_joined for ourselves");
            return;
        }

        let mut remote = RemotePlayer::from_record(&player.id, &player, now);
        if let Some(descriptor) = &avatar {
            if remote.avatar.is_none() && !descriptor.name.is_empty() {
                remote.avatar = Some(descriptor.name.clone());
            }
            match &remote.avatar {
                Some(avatar_id) if !self.avatars.contains(avatar_id) => {
                    ctx.assets.cache_avatar_frames(avatar_id, descriptor)
                }
                _ => {}
            }
        }

        ctx.ui.announce(&format!("{} joined", remote.username));
        self.remotes.insert(player.id, remote);
        ctx.ui.set_player_count(self.player_count());
    }

    fn on_player_left(&mut self, player_id: &str, ctx: &mut Collaborators) {
        match self.remotes.remove(player_id) {
            Some(remote) => {
                ctx.ui.announce(&format!("{} left", remote.username));
                ctx.ui.set_player_count(self.player_count());
            }
            None => debug!("player_left for unknown player {}", player_id),
        }
    }

    /// Completion of an avatar caching request.
    pub fn on_avatar_cached(&mut self, avatar_id: AvatarId, result: Result<AvatarFrames, AssetError>) {
        match result {
            Ok(frames) => {
                if self.local.avatar.as_deref() == Some(avatar_id.as_str()) {
                    info!("Local avatar {} ready", avatar_id);
                    self.local.ready = true;
                }
                self.avatars.insert(avatar_id, frames);
            }
            Err(e) => warn!("Avatar {} will not be drawn: {}", avatar_id, e),
        }
    }

    /// One presentation tick: move remote players toward their targets.
    pub fn advance_presentation(&mut self) {
        interpolation::advance_all(self.remotes.values_mut());
    }

    /// Sends a move-to-point command for a click at screen coordinates.
    pub fn request_move_to(
        &self,
        screen_x: f32,
        screen_y: f32,
        channel: &dyn Outbound,
    ) -> Option<(i32, i32)> {
        if !self.commands_permitted {
            return None;
        }

        let (world_x, world_y) = self.viewport.screen_to_world(screen_x, screen_y)?;
        let max_x = self.world.width.saturating_sub(1) as i32;
        let max_y = self.world.height.saturating_sub(1) as i32;
        let x = (world_x.round() as i32).clamp(0, max_x);
        let y = (world_y.round() as i32).clamp(0, max_y);

        channel.send(ClientMessage::move_to(x, y));
        Some((x, y))
    }

    pub fn send_chat(&self, text: &str, channel: &dyn Outbound) -> bool {
        let message = text.trim();
        if message.is_empty() || channel.state() != ConnectionState::Open {
            return false;
        }

        channel.send(ClientMessage::Chat {
            message: message.to_string(),
        });
        true
    }

    /// Avatars to draw this frame, back to front.
    pub fn drawables(&self) -> Vec<Drawable> {
        let Some(camera) = self.viewport.camera else {
            return Vec::new();
        };

        let mut drawables: Vec<(f64, Drawable)> = Vec::with_capacity(self.remotes.len() + 1);

        for remote in self.remotes.values() {
            let Some(avatar) = &remote.avatar else {
                continue;
            };
            if let Some(frame) = self.avatars.frame(avatar, remote.facing, remote.animation_frame) {
                drawables.push((
                    remote.y,
                    Drawable {
                        frame,
                        screen_x: (remote.x - f64::from(camera.x)) as f32,
                        screen_y: (remote.y - f64::from(camera.y)) as f32,
                        label: remote.username.clone(),
                        is_local: false,
                    },
                ));
            }
        }

        if self.local.ready && self.local.has_server_position {
            let frame = self.local.avatar.as_deref().and_then(|avatar| {
                self.avatars
                    .frame(avatar, self.local.facing, self.local.animation_frame)
            });
            if let Some(frame) = frame {
                drawables.push((
                    f64::from(self.local.y),
                    Drawable {
                        frame,
                        screen_x: self.local.x as f32 - camera.x,
                        screen_y: self.local.y as f32 - camera.y,
                        label: self.local.username.clone(),
                        is_local: true,
                    },
                ));
            }
        }

        drawables.sort_by(|a, b| a.0.total_cmp(&b.0));
        drawables.into_iter().map(|(_, drawable)| drawable).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::hud::{ChatLine, Hud};
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    struct RecordingChannel {
        state: Cell<ConnectionState>,
        sent: RefCell<Vec<ClientMessage>>,
        input_started: Cell<bool>,
    }

    impl RecordingChannel {
        fn open() -> Self {
            Self {
                state: Cell::new(ConnectionState::Open),
                sent: RefCell::new(Vec::new()),
                input_started: Cell::new(false),
            }
        }
    }

    impl Outbound for RecordingChannel {
        fn state(&self) -> ConnectionState {
            self.state.get()
        }

        fn send(&self, message: ClientMessage) {
            if self.state.get() == ConnectionState::Open {
                self.sent.borrow_mut().push(message);
            }
        }

        fn start_input(&self) {
            self.input_started.set(true);
        }
    }

    #[derive(Default)]
    struct RecordingAssets {
        requested: Vec<AvatarId>,
    }

    impl AssetCache for RecordingAssets {
        fn cache_avatar_frames(&mut self, avatar_id: &str, _descriptor: &AvatarDescriptor) {
            self.requested.push(avatar_id.to_string());
        }
    }

    struct Harness {
        channel: RecordingChannel,
        assets: RecordingAssets,
        hud: Hud,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                channel: RecordingChannel::open(),
                assets: RecordingAssets::default(),
                hud: Hud::new(),
            }
        }

        fn ctx(&mut self) -> Collaborators<'_> {
            Collaborators {
                channel: &self.channel,
                assets: &mut self.assets,
                ui: &mut self.hud,
            }
        }

        fn feed(&mut self, session: &mut Session, message: serde_json::Value) {
            session.handle_raw(&message.to_string(), &mut self.ctx(), Instant::now());
        }
    }

    fn frames() -> AvatarFrames {
        let frame = Frame {
            texture: 0,
            flip_x: false,
        };
        AvatarFrames {
            north: vec![frame],
            south: vec![frame],
            east: vec![frame],
            west: vec![frame],
        }
    }

    fn joined_session(harness: &mut Harness) -> Session {
        let mut session = Session::new("ann", 800.0, 600.0);
        session.set_world(2048, 2048);
        harness.feed(
            &mut session,
            json!({
                "action": "join_game",
                "success": true,
                "playerId": "1",
                "players": {
                    "1": {"x": 1024, "y": 1024, "avatar": "knight", "username": "ann"},
                    "2": {"x": 10, "y": 20, "facing": "west", "avatar": "mage", "username": "bob"}
                },
                "avatars": {"knight": {"name": "knight"}, "mage": {"name": "mage"}}
            }),
        );
        session
    }

    #[test]
    fn test_join_seeds_only_local_player() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        harness.feed(
            &mut session,
            json!({
                "action": "join_game",
                "success": true,
                "playerId": "42",
                "players": {"42": {"x": 100, "y": 200, "facing": "north", "animationFrame": 1, "avatar": "a"}},
                "avatars": {}
            }),
        );

        assert_eq!(session.local.id.as_deref(), Some("42"));
        assert_eq!((session.local.x, session.local.y), (100, 200));
        assert_eq!(session.local.facing, Facing::North);
        assert!(session.local.has_server_position);
        assert!(session.remotes.is_empty());
        assert!(session.commands_permitted());
        assert!(harness.channel.input_started.get());
        assert_eq!(harness.hud.player_count, 1);
    }

    #[test]
    fn test_join_seeds_remotes_and_requests_avatars() {
        let mut harness = Harness::new();
        let session = joined_session(&mut harness);

        let bob = &session.remotes["2"];
        assert_eq!((bob.x, bob.y), (10.0, 20.0));
        assert_eq!((bob.target_x, bob.target_y), (10.0, 20.0));
        assert_eq!(bob.facing, Facing::West);
        assert_eq!(bob.username, "bob");

        let mut requested = harness.assets.requested.clone();
        requested.sort();
        assert_eq!(requested, vec!["knight".to_string(), "mage".to_string()]);

        assert_eq!(session.viewport.camera, Some(Camera { x: 624.0, y: 724.0 }));
        assert!(!session.local.ready);
        assert_eq!(harness.hud.player_count, 2);
    }

    #[test]
    fn test_join_rejection_changes_nothing() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        harness.feed(
            &mut session,
            json!({"action": "join_game", "success": false, "error": "server full"}),
        );

        assert_eq!(session.local, LocalPlayer::new("ann".to_string()));
        assert!(session.remotes.is_empty());
        assert!(!session.commands_permitted());
        assert!(!harness.channel.input_started.get());
    }

    #[test]
    fn test_join_without_own_entry_waits_for_position() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        session.set_world(2048, 2048);
        harness.feed(
            &mut session,
            json!({
                "action": "join_game",
                "success": true,
                "playerId": "42",
                "players": {"7": {"x": 10, "y": 20, "username": "bob"}},
                "avatars": {}
            }),
        );

        assert_eq!(session.local.id.as_deref(), Some("42"));
        assert!(!session.local.has_server_position);
        assert!(!session.commands_permitted());
        assert!(!harness.channel.input_started.get());
        assert_eq!(session.viewport.camera, None);
        assert_eq!(session.request_move_to(400.0, 300.0, &harness.channel), None);

        // Half a position is not a placement.
        harness.feed(
            &mut session,
            json!({"action": "players_moved", "players": {"42": {"x": 1024}}}),
        );
        assert!(!session.commands_permitted());
        assert!(!harness.channel.input_started.get());

        harness.feed(
            &mut session,
            json!({"action": "players_moved", "players": {"42": {"x": 1024, "y": 1024}}}),
        );
        assert!(session.local.has_server_position);
        assert!(session.commands_permitted());
        assert!(harness.channel.input_started.get());
        assert_eq!(session.viewport.camera, Some(Camera { x: 624.0, y: 724.0 }));
    }

    #[test]
    fn test_join_without_player_id_is_dropped() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        harness.feed(&mut session, json!({"action": "join_game", "success": true}));

        assert!(session.local.id.is_none());
        assert!(!session.commands_permitted());
    }

    #[test]
    fn test_opened_sends_join_request() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        session.on_channel_event(ChannelEvent::Opened, &mut harness.ctx(), Instant::now());

        assert_eq!(
            harness.channel.sent.borrow().as_slice(),
            &[ClientMessage::JoinGame {
                username: "ann".to_string()
            }]
        );
        assert_eq!(harness.hud.connection, ConnectionState::Open);
    }

    #[test]
    fn test_close_and_error_revoke_commands() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);
        assert!(session.commands_permitted());

        session.on_channel_event(ChannelEvent::Closed, &mut harness.ctx(), Instant::now());
        assert!(!session.commands_permitted());
        assert_eq!(harness.hud.connection, ConnectionState::Closed);

        let mut session = joined_session(&mut harness);
        session.on_channel_event(
            ChannelEvent::Errored("reset".to_string()),
            &mut harness.ctx(),
            Instant::now(),
        );
        assert!(!session.commands_permitted());
    }

    #[test]
    fn test_local_move_snaps_and_recenters_camera() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);

        harness.feed(
            &mut session,
            json!({"action": "players_moved", "players": {"1": {"x": 2000, "y": 100, "facing": "east", "animationFrame": 3}}}),
        );

        assert_eq!((session.local.x, session.local.y), (2000, 100));
        assert_eq!(session.local.facing, Facing::East);
        assert_eq!(session.local.animation_frame, 3);
        assert_eq!(session.viewport.camera, Some(Camera { x: 1248.0, y: 0.0 }));
    }

    #[test]
    fn test_remote_move_sets_target_only() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);
        let before = session.remotes["2"].last_update;

        harness.feed(
            &mut session,
            json!({"action": "players_moved", "players": {"2": {"x": 110, "y": 20}}}),
        );

        let bob = &session.remotes["2"];
        assert_eq!((bob.x, bob.y), (10.0, 20.0));
        assert_eq!((bob.target_x, bob.target_y), (110.0, 20.0));
        assert!(bob.last_update >= before);

        session.advance_presentation();
        assert_eq!(session.remotes["2"].x, 20.0);
    }

    #[test]
    fn test_unknown_player_move_is_ignored() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);

        harness.feed(
            &mut session,
            json!({"action": "players_moved", "players": {"99": {"x": 1, "y": 1}}}),
        );

        assert_eq!(session.remotes.len(), 1);
        assert!(!session.remotes.contains_key("99"));
    }

    #[test]
    fn test_camera_waits_for_server_position() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        session.set_world(2048, 2048);
        session.resize(1024.0, 768.0);
        assert_eq!(session.viewport.camera, None);

        harness.feed(
            &mut session,
            json!({"action": "players_moved", "players": {"1": {"x": 500, "y": 500}}}),
        );
        assert_eq!(session.viewport.camera, None);
    }

    #[test]
    fn test_resize_recomputes_camera() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);

        session.resize(1024.0, 768.0);
        assert_eq!(session.viewport.camera, Some(Camera { x: 512.0, y: 640.0 }));
    }

    #[test]
    fn test_player_joined_and_left() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);

        harness.feed(
            &mut session,
            json!({
                "action": "player_joined",
                "player": {"id": "3", "x": 300, "y": 400, "avatar": "rogue", "username": "cid"},
                "avatar": {"name": "rogue", "frames": {}}
            }),
        );

        let cid = &session.remotes["3"];
        assert_eq!((cid.x, cid.y), (300.0, 400.0));
        assert_eq!((cid.target_x, cid.target_y), (300.0, 400.0));
        assert!(harness.assets.requested.contains(&"rogue".to_string()));
        assert_eq!(harness.hud.player_count, 3);
        assert_eq!(
            harness.hud.chat.back(),
            Some(&ChatLine::Notice("cid joined".to_string()))
        );

        harness.feed(&mut session, json!({"action": "player_left", "playerId": "3"}));
        assert!(!session.remotes.contains_key("3"));
        assert_eq!(harness.hud.player_count, 2);
        assert_eq!(
            harness.hud.chat.back(),
            Some(&ChatLine::Notice("cid left".to_string()))
        );
    }

    #[test]
    fn test_player_joined_skips_cataloged_avatar() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);
        session.on_avatar_cached("rogue".to_string(), Ok(frames()));
        harness.assets.requested.clear();

        harness.feed(
            &mut session,
            json!({
                "action": "player_joined",
                "player": {"id": "3", "x": 300, "y": 400, "avatar": "rogue", "username": "cid"},
                "avatar": {"name": "rogue", "frames": {}}
            }),
        );

        assert!(session.remotes.contains_key("3"));
        assert!(harness.assets.requested.is_empty());
    }

    #[test]
    fn test_unknown_player_left_is_noop() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);
        let before = session.remotes.clone();

        harness.feed(&mut session, json!({"action": "player_left", "playerId": "77"}));
        assert_eq!(session.remotes, before);
    }

    #[test]
    fn test_player_joined_for_self_is_ignored() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);

        harness.feed(
            &mut session,
            json!({"action": "player_joined", "player": {"id": "1", "x": 0, "y": 0}}),
        );
        assert!(!session.remotes.contains_key("1"));
    }

    #[test]
    fn test_chat_is_forwarded() {
        let mut harness = Harness::new();
        let mut session = Session::new("ann", 800.0, 600.0);
        harness.feed(
            &mut session,
            json!({"action": "chat", "username": "bob", "message": "hello"}),
        );

        assert_eq!(
            harness.hud.chat.back(),
            Some(&ChatLine::Message {
                username: "bob".to_string(),
                message: "hello".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);
        let remotes = session.remotes.clone();
        let local = session.local.clone();

        for raw in ["{broken", r#"{"action":"dance"}"#, r#"{"players":{}}"#, r#"{"action":"players_moved"}"#] {
            session.handle_raw(raw, &mut harness.ctx(), Instant::now());
        }

        assert_eq!(session.remotes, remotes);
        assert_eq!(session.local, local);
    }

    #[test]
    fn test_avatar_cache_sets_local_ready() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);
        assert!(session.drawables().iter().all(|d| !d.is_local));

        session.on_avatar_cached(
            "mage".to_string(),
            Err(AssetError::MissingFrames("mage".to_string(), Facing::North)),
        );
        assert!(!session.local.ready);
        assert!(session.drawables().is_empty());

        session.on_avatar_cached("knight".to_string(), Ok(frames()));
        assert!(session.local.ready);

        let drawables = session.drawables();
        assert_eq!(drawables.len(), 1);
        assert!(drawables[0].is_local);
        assert_eq!((drawables[0].screen_x, drawables[0].screen_y), (400.0, 300.0));
    }

    #[test]
    fn test_stale_avatar_after_leave_is_tolerated() {
        let mut harness = Harness::new();
        let mut session = joined_session(&mut harness);

        harness.feed(&mut session, json!({"action": "player_left", "playerId": "2"}));
        session.on_avatar_cached("mage".to_string(), Ok(frames()));

        assert!(session.avatars.contains("mage"));
        assert!(session.remotes.is_empty());
    }

    #[test]
    fn test_move_to_requires_permission() {
        let mut harness = Harness::new();
        let session = Session::new("ann", 800.0, 600.0);
        assert_eq!(session.request_move_to(10.0, 10.0, &harness.channel), None);

        let session = joined_session(&mut harness);
        harness.channel.sent.borrow_mut().clear();

        assert_eq!(
            session.request_move_to(400.0, 300.0, &harness.channel),
            Some((1024, 1024))
        );
        assert_eq!(
            session.request_move_to(5000.0, -50.0, &harness.channel),
            Some((2047, 674))
        );
        assert_eq!(
            harness.channel.sent.borrow().as_slice(),
            &[ClientMessage::move_to(1024, 1024), ClientMessage::move_to(2047, 674)]
        );
    }

    #[test]
    fn test_send_chat_trims_and_requires_open_channel() {
        let harness = Harness::new();
        let session = Session::new("ann", 800.0, 600.0);

        assert!(!session.send_chat("   ", &harness.channel));
        assert!(session.send_chat("  hi there ", &harness.channel));
        assert_eq!(
            harness.channel.sent.borrow().as_slice(),
            &[ClientMessage::Chat {
                message: "hi there".to_string()
            }]
        );

        harness.channel.state.set(ConnectionState::Closed);
        assert!(!session.send_chat("again", &harness.channel));
    }

    #[test]
    fn test_world_is_set_once() {
        let mut session = Session::new("ann", 800.0, 600.0);
        session.set_world(100, 100);
        session.set_world(5000, 5000);
        assert_eq!(session.world, WorldInfo::loaded(100, 100));
    }
}
