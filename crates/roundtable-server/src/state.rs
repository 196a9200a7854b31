use anyhow::Result;
use std::sync::Arc;

use roundtable::rooms::{build_room, build_room_with, Room, RoomKind, RoomProviders};
use roundtable::settings::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub default_room: RoomKind,
    providers: Option<RoomProviders>,
}

impl AppState {
    pub fn new(settings: Settings, default_room: RoomKind) -> Self {
        Self {
            settings: Arc::new(settings),
            default_room,
            providers: None,
        }
    }

    /// Every room built from this state talks to the given providers
    #[allow(dead_code)]
    pub fn with_providers(mut self, providers: RoomProviders) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Rooms are built per request so concurrent visitors never share a conversation
    pub fn build_room(&self, kind: Option<RoomKind>) -> Result<Room> {
        let kind = kind.unwrap_or(self.default_room);
        match &self.providers {
            Some(providers) => build_room_with(kind, &self.settings, providers.clone()),
            None => build_room(kind, &self.settings),
        }
    }
}
