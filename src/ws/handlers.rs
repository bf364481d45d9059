//! Event dispatch
//!
//! Single entry point mapping inbound events to handler calls.
//! Admin events from non-admin connections are dropped silently;
//! unauthorized actions never produce state changes or broadcasts.

use crate::protocol::{ClientEvent, ServerEvent};
use crate::state::AppState;
use crate::types::Role;

use super::{admin, observer, team};

macro_rules! check_admin {
    ($role:expr, $conn:expr, $action:expr) => {
        if $role != Role::Admin {
            tracing::warn!(conn = %$conn, action = $action, "admin event from non-admin dropped");
            return None;
        }
    };
}

/// Handle one inbound event and return an optional direct reply for the
/// sending connection. Broadcasts happen inside the handlers.
pub async fn handle_event(
    event: ClientEvent,
    conn_id: &str,
    role: Role,
    state: &AppState,
) -> Option<ServerEvent> {
    match event {
        ClientEvent::JoinLobby { lobby_id, role } => {
            team::handle_join(state, conn_id, lobby_id, role).await
        }

        ClientEvent::CreateFpsLobby {
            lobby_id,
            game,
            game_type,
            map_pool_size,
            knife_decider,
            coin_flip,
            admin,
        } => {
            team::handle_create_fps(
                state,
                conn_id,
                lobby_id,
                game,
                game_type,
                map_pool_size,
                knife_decider,
                coin_flip,
                admin,
            )
            .await
        }

        ClientEvent::CreateSplatoonLobby {
            lobby_id,
            game_type,
            modes_size,
            coin_flip,
            admin,
        } => {
            team::handle_create_splatoon(
                state, conn_id, lobby_id, game_type, modes_size, coin_flip, admin,
            )
            .await
        }

        ClientEvent::TeamName {
            lobby_id,
            team_name,
        } => team::handle_team_name(state, conn_id, lobby_id, team_name).await,

        ClientEvent::StartPick {
            lobby_id,
            map,
            team_name,
        } => team::handle_start_pick(state, conn_id, lobby_id, map, team_name).await,

        ClientEvent::Pick {
            lobby_id,
            map,
            team_name,
            side,
        } => team::handle_pick(state, conn_id, lobby_id, map, team_name, side).await,

        ClientEvent::Ban {
            lobby_id,
            map,
            team_name,
        } => team::handle_ban(state, conn_id, lobby_id, map, team_name).await,

        ClientEvent::Decider {
            lobby_id,
            map,
            team_name,
        } => team::handle_decider(state, conn_id, lobby_id, map, team_name).await,

        ClientEvent::ModeBan {
            lobby_id,
            mode,
            team_name,
        } => team::handle_mode_ban(state, conn_id, lobby_id, mode, team_name).await,

        ClientEvent::ModePick {
            lobby_id,
            mode,
            team_name,
        } => team::handle_mode_pick(state, conn_id, lobby_id, mode, team_name).await,

        // the legacy report event proposes like the two-phase flow
        ClientEvent::ReportWinner {
            lobby_id,
            winner_team,
            team_name,
        }
        | ClientEvent::ProposeWinner {
            lobby_id,
            winner_team,
            team_name,
        } => team::handle_propose_winner(state, conn_id, lobby_id, winner_team, team_name).await,

        ClientEvent::ConfirmWinner {
            lobby_id,
            confirmed,
            team_name,
        } => team::handle_confirm_winner(state, conn_id, lobby_id, confirmed, team_name).await,

        ClientEvent::AdminStart { lobby_id } => {
            check_admin!(role, conn_id, "admin.start");
            admin::handle_start(state, lobby_id).await
        }

        ClientEvent::AdminDelete { lobby_id } => {
            check_admin!(role, conn_id, "admin.delete");
            admin::handle_delete(state, lobby_id).await
        }

        ClientEvent::AdminCoinFlipUpdate { coin_flip } => {
            check_admin!(role, conn_id, "admin.coinFlipUpdate");
            admin::handle_coin_flip_update(state, coin_flip).await
        }

        ClientEvent::AdminEditFpsMapPool { map_pool } => {
            check_admin!(role, conn_id, "admin.editFPSMapPool");
            admin::handle_edit_fps_map_pool(state, map_pool).await
        }

        ClientEvent::AdminEditCardColors { card_colors } => {
            check_admin!(role, conn_id, "admin.editCardColors");
            admin::handle_edit_card_colors(state, card_colors).await
        }

        ClientEvent::AdminSetObsLobby { lobby_id } => {
            check_admin!(role, conn_id, "admin.setObsLobby");
            admin::handle_set_obs_lobby(state, lobby_id).await
        }

        ClientEvent::AdminPlayObs { lobby_id } => {
            check_admin!(role, conn_id, "admin.play_obs");
            admin::handle_play_obs(state, lobby_id).await
        }

        ClientEvent::AdminClearObs { lobby_id } => {
            check_admin!(role, conn_id, "admin.clear_obs");
            admin::handle_clear_obs(state, lobby_id).await
        }

        ClientEvent::JoinObsView => observer::handle_join_obs_view(state, conn_id).await,

        ClientEvent::GetPatternList { lobby_id } => {
            observer::handle_get_pattern_list(state, lobby_id).await
        }

        ClientEvent::GetCurrentPickedMode { lobby_id } => {
            observer::handle_get_current_picked_mode(state, lobby_id).await
        }

        ClientEvent::GetLobbyGameCategory { lobby_id } => {
            observer::handle_get_lobby_game_category(state, lobby_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_event_from_member_is_dropped() {
        let state = AppState::new();
        let (conn, _rx) = state.register_connection(Role::Member).await;

        let reply = handle_event(
            ClientEvent::AdminCoinFlipUpdate { coin_flip: false },
            &conn,
            Role::Member,
            &state,
        )
        .await;

        assert!(reply.is_none());
        assert!(*state.coin_flip_default.read().await);
    }

    #[tokio::test]
    async fn test_unknown_lobby_routes_to_undefined() {
        let state = AppState::new();
        let (conn, _rx) = state.register_connection(Role::Member).await;

        let reply = handle_event(
            ClientEvent::Ban {
                lobby_id: "missing".to_string(),
                map: "Nuke".to_string(),
                team_name: "A".to_string(),
            },
            &conn,
            Role::Member,
            &state,
        )
        .await;

        match reply {
            Some(ServerEvent::LobbyUndefined { lobby_id }) => assert_eq!(lobby_id, "missing"),
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
