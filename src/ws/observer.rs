//! Observer and OBS-overlay queries: read-only, addressed to the
//! requesting connection.

use crate::catalog;
use crate::protocol::ServerEvent;
use crate::state::{snapshot_events, AppState};
use crate::types::*;

/// Join the OBS views meta-room. If a lobby is already pinned, the new
/// overlay gets the pin and the full snapshot immediately.
pub async fn handle_join_obs_view(state: &AppState, conn_id: &str) -> Option<ServerEvent> {
    state.mark_obs_view(conn_id).await;

    let pinned = state.obs_lobby.read().await.clone();
    let Some(lobby_id) = pinned else {
        return None;
    };

    let mut outbox = state.outbox().await;
    {
        let lobbies = state.lobbies.read().await;
        let Some(lobby) = lobbies.get(&lobby_id) else {
            return None;
        };
        outbox.to_conn(conn_id, ServerEvent::ObsLobbyPinned { lobby_id });
        for event in snapshot_events(lobby) {
            outbox.to_conn(conn_id, event);
        }
    }
    state.flush(outbox).await;
    None
}

/// The veto pattern of the lobby, as lowercase tokens for overlay
/// rendering. For Splatoon this is the current round's mode pattern
/// followed by its map pattern.
pub async fn handle_get_pattern_list(state: &AppState, lobby_id: LobbyId) -> Option<ServerEvent> {
    let lobbies = state.lobbies.read().await;
    let Some(lobby) = lobbies.get(&lobby_id) else {
        return Some(ServerEvent::LobbyNotFound { lobby_id });
    };

    let pattern: Vec<String> = match (lobby.fps(), lobby.splatoon()) {
        (Some(fps), _) => fps.pattern.iter().map(|t| t.as_str().to_string()).collect(),
        (_, Some(splatoon)) => {
            let first = lobby.rules.round_number == 1;
            catalog::splatoon_mode_pattern(splatoon.modes_size, first)
                .iter()
                .chain(catalog::splatoon_map_pattern(splatoon.modes_size, first))
                .map(|t| t.as_str().to_string())
                .collect()
        }
        _ => Vec::new(),
    };
    Some(ServerEvent::PatternList { pattern })
}

pub async fn handle_get_current_picked_mode(
    state: &AppState,
    lobby_id: LobbyId,
) -> Option<ServerEvent> {
    let lobbies = state.lobbies.read().await;
    let Some(lobby) = lobbies.get(&lobby_id) else {
        return Some(ServerEvent::LobbyNotFound { lobby_id });
    };
    Some(ServerEvent::CurrentPickedMode {
        mode: lobby.splatoon().and_then(|s| s.picked_mode.clone()),
    })
}

pub async fn handle_get_lobby_game_category(
    state: &AppState,
    lobby_id: LobbyId,
) -> Option<ServerEvent> {
    let lobbies = state.lobbies.read().await;
    let Some(lobby) = lobbies.get(&lobby_id) else {
        return Some(ServerEvent::LobbyNotFound { lobby_id });
    };
    Some(ServerEvent::LobbyGameCategory {
        lobby_id,
        category: lobby.game_family(),
    })
}
