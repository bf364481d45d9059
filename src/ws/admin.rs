//! Admin-only command handlers.
//!
//! Authorization is checked in the dispatch layer before these run.

use crate::catalog::FPS_DEFAULT_GAME;
use crate::protocol::ServerEvent;
use crate::state::{fps, snapshot_events, splatoon, AppState, DEFAULT_CARD_COLORS};
use crate::types::*;

/// Begin the ceremony even with fewer than two registered teams
/// (admin-controlled lobbies).
pub async fn handle_start(state: &AppState, lobby_id: LobbyId) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        let result = match lobby.game_family() {
            GameFamily::Fps => fps::start_fps(lobby, &mut outbox),
            GameFamily::Splatoon => splatoon::start_splatoon(lobby, &mut outbox),
        };
        if let Err(reason) = result {
            tracing::warn!(lobby = %lobby_id, %reason, "admin start refused");
            return None;
        }
        tracing::info!(lobby = %lobby_id, "ceremony started by admin");
    }
    state.flush(outbox).await;
    None
}

/// Evict everyone, drop the lobby from the store, clear the OBS pin if
/// it pointed here.
pub async fn handle_delete(state: &AppState, lobby_id: LobbyId) -> Option<ServerEvent> {
    let Some(lobby) = state.delete_lobby(&lobby_id).await else {
        return Some(ServerEvent::LobbyUndefined { lobby_id });
    };
    tracing::info!(lobby = %lobby_id, "lobby deleted by admin");

    let room = lobby.room_conns();
    {
        let mut connections = state.connections.write().await;
        for conn in &room {
            if let Some(handle) = connections.get_mut(conn) {
                handle.joined.remove(&lobby_id);
            }
        }
    }

    let mut outbox = state.outbox().await;
    outbox.to_conns(
        room,
        ServerEvent::LobbyDeleted {
            lobby_id: lobby_id.clone(),
        },
    );
    {
        let mut pin = state.obs_lobby.write().await;
        if pin.as_deref() == Some(lobby_id.as_str()) {
            *pin = None;
            outbox.to_obs(ServerEvent::BackendClearObs);
        }
    }
    let lobbies = state.lobby_summaries().await;
    outbox.to_all(ServerEvent::LobbiesUpdated { lobbies });
    state.flush(outbox).await;
    None
}

/// Flip the process-wide coin-flip default for newly created lobbies.
pub async fn handle_coin_flip_update(state: &AppState, coin_flip: bool) -> Option<ServerEvent> {
    *state.coin_flip_default.write().await = coin_flip;
    tracing::info!(coin_flip, "coin flip default updated");
    let _ = state.broadcast.send(ServerEvent::CoinFlipUpdated {
        coin_flip,
        first_team: None,
    });
    None
}

/// Replace the global FPS pool, or reset it to the builtin default.
/// Running lobbies keep the copies they took at creation.
pub async fn handle_edit_fps_map_pool(
    state: &AppState,
    map_pool: Option<Vec<MapName>>,
) -> Option<ServerEvent> {
    if let Some(pool) = &map_pool {
        if pool.is_empty() {
            tracing::warn!("empty map pool edit ignored");
            return None;
        }
    }
    let resetting = map_pool.is_none();
    state
        .catalog
        .write()
        .await
        .set_fps_map_pool(FPS_DEFAULT_GAME, map_pool);
    tracing::info!(reset = resetting, "fps map pool edited");
    None
}

pub async fn handle_edit_card_colors(
    state: &AppState,
    card_colors: Option<Vec<String>>,
) -> Option<ServerEvent> {
    let colors =
        card_colors.unwrap_or_else(|| DEFAULT_CARD_COLORS.iter().map(|s| s.to_string()).collect());
    *state.card_colors.write().await = colors.clone();
    let _ = state
        .broadcast
        .send(ServerEvent::CardColorsUpdated { card_colors: colors });
    None
}

/// Pin a lobby to the OBS views room and replay its state there.
pub async fn handle_set_obs_lobby(state: &AppState, lobby_id: LobbyId) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let lobbies = state.lobbies.read().await;
        let Some(lobby) = lobbies.get(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        outbox.to_obs(ServerEvent::ObsLobbyPinned {
            lobby_id: lobby_id.clone(),
        });
        for event in snapshot_events(lobby) {
            outbox.to_obs(event);
        }
    }
    *state.obs_lobby.write().await = Some(lobby_id.clone());
    tracing::info!(lobby = %lobby_id, "obs views pinned");
    state.flush(outbox).await;
    None
}

/// Re-deliver a lobby's state to the OBS views room.
pub async fn handle_play_obs(state: &AppState, lobby_id: LobbyId) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let lobbies = state.lobbies.read().await;
        let Some(lobby) = lobbies.get(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        for event in snapshot_events(lobby) {
            outbox.to_obs(event);
        }
    }
    state.flush(outbox).await;
    None
}

/// Clear the OBS pin and tell overlays to blank out.
pub async fn handle_clear_obs(state: &AppState, lobby_id: LobbyId) -> Option<ServerEvent> {
    {
        let mut pin = state.obs_lobby.write().await;
        if pin.as_deref() == Some(lobby_id.as_str()) {
            *pin = None;
        }
    }
    let mut outbox = state.outbox().await;
    outbox.to_obs(ServerEvent::BackendClearObs);
    state.flush(outbox).await;
    None
}
