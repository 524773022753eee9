//! Status, player count and chat log shown over the world

use crate::network::ConnectionState;
use log::info;
use std::collections::VecDeque;

/// Lines of chat kept for display.
pub const CHAT_HISTORY: usize = 8;

/// UI side effects the session triggers.
pub trait UiNotifier {
    fn set_connection_state(&mut self, state: ConnectionState);
    fn set_player_count(&mut self, count: usize);
    fn append_chat(&mut self, username: &str, message: &str);
    fn announce(&mut self, text: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatLine {
    Message { username: String, message: String },
    Notice(String),
}

#[derive(Debug)]
pub struct Hud {
    pub connection: ConnectionState,
    pub player_count: usize,
    pub chat: VecDeque<ChatLine>,
}

impl Hud {
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Connecting,
            player_count: 0,
            chat: VecDeque::with_capacity(CHAT_HISTORY),
        }
    }

    fn push(&mut self, line: ChatLine) {
        if self.chat.len() == CHAT_HISTORY {
            self.chat.pop_front();
        }
        self.chat.push_back(line);
    }

    pub fn status_text(&self) -> &'static str {
        match self.connection {
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Open => "Connected",
            ConnectionState::Closed => "Disconnected",
        }
    }
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl UiNotifier for Hud {
    fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection = state;
    }

    fn set_player_count(&mut self, count: usize) {
        self.player_count = count;
    }

    fn append_chat(&mut self, username: &str, message: &str) {
        info!("<{}> {}", username, message);
        self.push(ChatLine::Message {
            username: username.to_string(),
            message: message.to_string(),
        });
    }

    fn announce(&mut self, text: &str) {
        info!("{}", text);
        self.push(ChatLine::Notice(text.to_string()));
    }
}
