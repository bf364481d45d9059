//! Member-facing handlers: lobby creation, joining, team registration,
//! and the veto actions themselves.
//!
//! Authorization failures and out-of-turn actions are dropped silently
//! (logged at debug level); only routing and configuration problems
//! produce a reply event.

use std::collections::{HashMap, HashSet};

use crate::catalog::{self, FPS_PATTERN_LEN};
use crate::protocol::ServerEvent;
use crate::state::lobby::{FamilyState, FpsState, Lobby, Rules, SplatoonState};
use crate::state::{fps, snapshot_events, splatoon, AppState};
use crate::types::*;

/// Common preflight for every team action: the sender must be a member
/// whose registered team name matches the payload's claim.
fn preflight(lobby: &Lobby, conn: &str, team_name: &str) -> bool {
    lobby.is_member(conn) && lobby.team_of(conn).as_deref() == Some(team_name)
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_create_fps(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    game: String,
    game_type: FpsGameType,
    map_pool_size: Option<usize>,
    knife_decider: bool,
    coin_flip: Option<bool>,
    admin: bool,
) -> Option<ServerEvent> {
    let pool = match state.catalog.read().await.fps_map_pool(&game) {
        Some(pool) => pool,
        None => {
            return Some(ServerEvent::LobbyCreationError {
                message: format!("unknown game {}", game),
            })
        }
    };
    let pool_size = map_pool_size.unwrap_or(pool.len());
    if let Err(message) = catalog::validate_fps_rules(game_type, pool_size) {
        return Some(ServerEvent::LobbyCreationError { message });
    }
    if pool_size > pool.len() {
        return Some(ServerEvent::LobbyCreationError {
            message: format!(
                "map pool has {} maps, {} requested",
                pool.len(),
                pool_size
            ),
        });
    }

    let coin_flip = match coin_flip {
        Some(flag) => flag,
        None => *state.coin_flip_default.read().await,
    };
    let lobby = Lobby {
        id: lobby_id.clone(),
        members: HashSet::new(),
        observers: HashSet::new(),
        team_names: Vec::new(),
        caps: HashMap::new(),
        rules: Rules {
            admin,
            coin_flip,
            game_name: game,
            game_type: game_type.as_str().to_string(),
            map_names: pool[..pool_size].to_vec(),
            last_winner: None,
            round_number: 1,
        },
        family: FamilyState::Fps(FpsState {
            game_type,
            knife_decider,
            pattern: catalog::fps_pattern(game_type),
            map_pool_size: pool_size,
            decider_map: None,
            pending_pick: None,
        }),
        picked_maps: Vec::new(),
        banned_maps: Vec::new(),
        // undersized pools consume the leading pattern tokens implicitly
        game_step: FPS_PATTERN_LEN - pool_size,
        started: false,
        last_state_message: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    if !state.create_lobby(lobby).await {
        tracing::debug!(lobby = %lobby_id, conn = %conn_id, "fps lobby already exists");
        return Some(ServerEvent::LobbyExists { lobby_id });
    }
    state.broadcast_lobbies_updated().await;
    Some(ServerEvent::LobbyCreated { lobby_id })
}

pub async fn handle_create_splatoon(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    game_type: Option<String>,
    modes_size: u8,
    coin_flip: Option<bool>,
    admin: bool,
) -> Option<ServerEvent> {
    if let Err(message) = catalog::validate_modes_size(modes_size) {
        return Some(ServerEvent::LobbyCreationError { message });
    }

    let coin_flip = match coin_flip {
        Some(flag) => flag,
        None => *state.coin_flip_default.read().await,
    };
    let lobby = Lobby {
        id: lobby_id.clone(),
        members: HashSet::new(),
        observers: HashSet::new(),
        team_names: Vec::new(),
        caps: HashMap::new(),
        rules: Rules {
            admin,
            coin_flip,
            game_name: "splatoon".to_string(),
            game_type: game_type.unwrap_or_else(|| "splatoon".to_string()),
            map_names: Vec::new(),
            last_winner: None,
            round_number: 1,
        },
        family: FamilyState::Splatoon(SplatoonState {
            modes_size,
            active_modes: catalog::splatoon_modes(modes_size),
            banned_modes: Vec::new(),
            picked_mode: None,
            priority_team: None,
            round_history: Vec::new(),
            pending_winner: None,
        }),
        picked_maps: Vec::new(),
        banned_maps: Vec::new(),
        game_step: 0,
        started: false,
        last_state_message: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    if !state.create_lobby(lobby).await {
        tracing::debug!(lobby = %lobby_id, conn = %conn_id, "splatoon lobby already exists");
        return Some(ServerEvent::LobbyExists { lobby_id });
    }
    state.broadcast_lobbies_updated().await;
    Some(ServerEvent::LobbyCreated { lobby_id })
}

pub async fn handle_join(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    role: JoinRole,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    let tracked = {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        let tracked = match role {
            JoinRole::Member => {
                if lobby.members.len() < 2 {
                    lobby.members.insert(conn_id.to_string());
                } else {
                    // full lobby: late captains watch instead
                    lobby.observers.insert(conn_id.to_string());
                }
                true
            }
            JoinRole::Observer => {
                lobby.observers.insert(conn_id.to_string());
                true
            }
            JoinRole::Test => false,
        };
        for event in snapshot_events(lobby) {
            outbox.to_conn(conn_id, event);
        }
        tracked
    };

    if tracked {
        state.mark_joined(conn_id, &lobby_id).await;
        state.broadcast_lobbies_updated().await;
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_team_name(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    raw_name: String,
) -> Option<ServerEvent> {
    let Some(name) = sanitize_team_name(&raw_name) else {
        tracing::debug!(conn = %conn_id, "team name rejected by sanitizer");
        return None;
    };

    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !lobby.is_member(conn_id) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "teamName from non-member dropped");
            return None;
        }
        let taken_by_other = lobby
            .team_names
            .iter()
            .any(|(c, t)| c != conn_id && *t == name);
        if taken_by_other {
            tracing::debug!(lobby = %lobby_id, team = %name, "duplicate team name dropped");
            return None;
        }

        if let Some(entry) = lobby.team_names.iter_mut().find(|(c, _)| c == conn_id) {
            entry.1 = name;
        } else if lobby.team_names.len() < 2 {
            lobby.team_names.push((conn_id.to_string(), name));
        } else {
            tracing::debug!(lobby = %lobby_id, "team roster full, teamName dropped");
            return None;
        }

        outbox.to_room(
            lobby,
            ServerEvent::TeamNamesUpdated {
                team_names: lobby.team_name_list(),
            },
        );

        // both captains present: the ceremony begins on its own.
        // Admin-controlled lobbies wait for an explicit admin.start.
        if !lobby.started && !lobby.rules.admin && lobby.team_names.len() == 2 {
            let result = match lobby.game_family() {
                GameFamily::Fps => fps::start_fps(lobby, &mut outbox),
                GameFamily::Splatoon => splatoon::start_splatoon(lobby, &mut outbox),
            };
            if let Err(reason) = result {
                tracing::warn!(lobby = %lobby_id, %reason, "auto-start failed");
            }
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_ban(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    map: String,
    team_name: TeamName,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "ban preflight failed");
            return None;
        }
        let result = match lobby.game_family() {
            GameFamily::Fps => fps::apply_ban(lobby, &mut outbox, conn_id, &map),
            GameFamily::Splatoon => splatoon::apply_map_ban(lobby, &mut outbox, conn_id, &map),
        };
        if let Err(reason) = result {
            tracing::debug!(lobby = %lobby_id, %reason, "ban dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_start_pick(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    map: String,
    team_name: TeamName,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "startPick preflight failed");
            return None;
        }
        if let Err(reason) = fps::apply_start_pick(lobby, &mut outbox, conn_id, &map) {
            tracing::debug!(lobby = %lobby_id, %reason, "startPick dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_pick(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    map: String,
    team_name: TeamName,
    side: String,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "pick preflight failed");
            return None;
        }
        let result = match lobby.game_family() {
            GameFamily::Fps => fps::apply_pick(lobby, &mut outbox, conn_id, &map, &side),
            GameFamily::Splatoon => splatoon::apply_map_pick(lobby, &mut outbox, conn_id, &map),
        };
        if let Err(reason) = result {
            tracing::debug!(lobby = %lobby_id, %reason, "pick dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_decider(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    map: String,
    team_name: TeamName,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "decider preflight failed");
            return None;
        }
        if let Err(reason) = fps::apply_decider(lobby, &mut outbox, conn_id, &map) {
            tracing::debug!(lobby = %lobby_id, %reason, "decider dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_mode_ban(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    mode: ModeKey,
    team_name: TeamName,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "modeBan preflight failed");
            return None;
        }
        if let Err(reason) = splatoon::apply_mode_ban(lobby, &mut outbox, conn_id, &mode) {
            tracing::debug!(lobby = %lobby_id, %reason, "modeBan dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_mode_pick(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    mode: ModeKey,
    team_name: TeamName,
) -> Option<ServerEvent> {
    // resolved before the lobby lock; apply_mode_pick validates the mode
    let pool = state.catalog.read().await.splatoon_map_pool(&mode);

    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "modePick preflight failed");
            return None;
        }
        if let Err(reason) = splatoon::apply_mode_pick(lobby, &mut outbox, conn_id, &mode, pool) {
            tracing::debug!(lobby = %lobby_id, %reason, "modePick dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_propose_winner(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    winner_team: TeamName,
    team_name: TeamName,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "proposeWinner preflight failed");
            return None;
        }
        if let Err(reason) = splatoon::propose_winner(lobby, &mut outbox, conn_id, &winner_team) {
            tracing::debug!(lobby = %lobby_id, %reason, "proposeWinner dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}

pub async fn handle_confirm_winner(
    state: &AppState,
    conn_id: &str,
    lobby_id: LobbyId,
    confirmed: bool,
    team_name: TeamName,
) -> Option<ServerEvent> {
    let mut outbox = state.outbox().await;
    {
        let mut lobbies = state.lobbies.write().await;
        let Some(lobby) = lobbies.get_mut(&lobby_id) else {
            return Some(ServerEvent::LobbyUndefined { lobby_id });
        };
        if !preflight(lobby, conn_id, &team_name) {
            tracing::debug!(conn = %conn_id, lobby = %lobby_id, "confirmWinner preflight failed");
            return None;
        }
        if let Err(reason) = splatoon::confirm_winner(lobby, &mut outbox, conn_id, confirmed) {
            tracing::debug!(lobby = %lobby_id, %reason, "confirmWinner dropped");
            return None;
        }
    }
    state.flush(outbox).await;
    None
}
