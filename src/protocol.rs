//! The closed inbound/outbound event sets, as serde-tagged enums.
//!
//! Events are JSON objects with a `"t"` discriminator carrying the wire
//! name. The protocol is a closed set: unknown inbound names fail
//! deserialization and are ignored by the socket loop.

use serde::{Deserialize, Serialize};

use crate::types::*;

fn default_join_role() -> JoinRole {
    JoinRole::Member
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientEvent {
    #[serde(rename = "joinLobby", rename_all = "camelCase")]
    JoinLobby {
        lobby_id: LobbyId,
        #[serde(default = "default_join_role")]
        role: JoinRole,
    },

    #[serde(rename = "createFPSLobby", rename_all = "camelCase")]
    CreateFpsLobby {
        lobby_id: LobbyId,
        #[serde(default = "default_fps_game")]
        game: String,
        game_type: FpsGameType,
        #[serde(default)]
        map_pool_size: Option<usize>,
        #[serde(default)]
        knife_decider: bool,
        #[serde(default)]
        coin_flip: Option<bool>,
        #[serde(default)]
        admin: bool,
    },

    #[serde(rename = "createSplatoonLobby", rename_all = "camelCase")]
    CreateSplatoonLobby {
        lobby_id: LobbyId,
        #[serde(default)]
        game_type: Option<String>,
        modes_size: u8,
        #[serde(default)]
        coin_flip: Option<bool>,
        #[serde(default)]
        admin: bool,
    },

    #[serde(rename = "lobby.teamName", rename_all = "camelCase")]
    TeamName { lobby_id: LobbyId, team_name: String },

    #[serde(rename = "lobby.startPick", rename_all = "camelCase")]
    StartPick {
        lobby_id: LobbyId,
        map: MapName,
        team_name: TeamName,
    },

    #[serde(rename = "lobby.pick", rename_all = "camelCase")]
    Pick {
        lobby_id: LobbyId,
        map: MapName,
        team_name: TeamName,
        side: String,
    },

    #[serde(rename = "lobby.ban", rename_all = "camelCase")]
    Ban {
        lobby_id: LobbyId,
        map: MapName,
        team_name: TeamName,
    },

    #[serde(rename = "lobby.decider", rename_all = "camelCase")]
    Decider {
        lobby_id: LobbyId,
        map: MapName,
        team_name: TeamName,
    },

    #[serde(rename = "lobby.modeBan", rename_all = "camelCase")]
    ModeBan {
        lobby_id: LobbyId,
        mode: ModeKey,
        team_name: TeamName,
    },

    #[serde(rename = "lobby.modePick", rename_all = "camelCase")]
    ModePick {
        lobby_id: LobbyId,
        mode: ModeKey,
        team_name: TeamName,
    },

    /// Legacy single-phase winner report; handled as a proposal.
    #[serde(rename = "lobby.reportWinner", rename_all = "camelCase")]
    ReportWinner {
        lobby_id: LobbyId,
        winner_team: TeamName,
        team_name: TeamName,
    },

    #[serde(rename = "lobby.proposeWinner", rename_all = "camelCase")]
    ProposeWinner {
        lobby_id: LobbyId,
        winner_team: TeamName,
        team_name: TeamName,
    },

    #[serde(rename = "lobby.confirmWinner", rename_all = "camelCase")]
    ConfirmWinner {
        lobby_id: LobbyId,
        confirmed: bool,
        team_name: TeamName,
    },

    #[serde(rename = "admin.start", rename_all = "camelCase")]
    AdminStart { lobby_id: LobbyId },

    #[serde(rename = "admin.delete", rename_all = "camelCase")]
    AdminDelete { lobby_id: LobbyId },

    #[serde(rename = "admin.coinFlipUpdate", rename_all = "camelCase")]
    AdminCoinFlipUpdate { coin_flip: bool },

    #[serde(rename = "admin.editFPSMapPool", rename_all = "camelCase")]
    AdminEditFpsMapPool {
        #[serde(default)]
        map_pool: Option<Vec<MapName>>,
    },

    #[serde(rename = "admin.editCardColors", rename_all = "camelCase")]
    AdminEditCardColors {
        #[serde(default)]
        card_colors: Option<Vec<String>>,
    },

    #[serde(rename = "admin.setObsLobby", rename_all = "camelCase")]
    AdminSetObsLobby { lobby_id: LobbyId },

    #[serde(rename = "admin.play_obs", rename_all = "camelCase")]
    AdminPlayObs { lobby_id: LobbyId },

    #[serde(rename = "admin.clear_obs", rename_all = "camelCase")]
    AdminClearObs { lobby_id: LobbyId },

    #[serde(rename = "joinObsView")]
    JoinObsView,

    #[serde(rename = "obs.getPatternList", rename_all = "camelCase")]
    GetPatternList { lobby_id: LobbyId },

    #[serde(rename = "obs.getCurrentPickedMode", rename_all = "camelCase")]
    GetCurrentPickedMode { lobby_id: LobbyId },

    #[serde(rename = "getLobbyGameCategory", rename_all = "camelCase")]
    GetLobbyGameCategory { lobby_id: LobbyId },
}

fn default_fps_game() -> String {
    crate::catalog::FPS_DEFAULT_GAME.to_string()
}

/// A picked map. FPS entries carry sides; Splatoon entries carry the
/// round they were contested in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedEntry {
    pub map: MapName,
    pub team_name: TeamName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_team_name: Option<TeamName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannedEntry {
    pub map: MapName,
    pub team_name: TeamName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeInfo {
    pub mode: ModeKey,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FpsSettings {
    pub game_type: FpsGameType,
    pub knife_decider: bool,
    pub coin_flip: bool,
    pub map_pool_size: usize,
}

/// Lobby listing entry for `lobbiesUpdated` and `GET /api/lobbies`.
/// Sets and the ordered team map serialize as arrays; team order is
/// join order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: LobbyId,
    pub game_family: GameFamily,
    pub game_name: String,
    pub game_type: String,
    pub team_names: Vec<TeamName>,
    pub members: usize,
    pub observers: usize,
    pub admin: bool,
    pub started: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServerEvent {
    #[serde(rename = "lobbyExists", rename_all = "camelCase")]
    LobbyExists { lobby_id: LobbyId },

    #[serde(rename = "lobbyUndefined", rename_all = "camelCase")]
    LobbyUndefined { lobby_id: LobbyId },

    #[serde(rename = "lobbyCreated", rename_all = "camelCase")]
    LobbyCreated { lobby_id: LobbyId },

    #[serde(rename = "lobbyDeleted", rename_all = "camelCase")]
    LobbyDeleted { lobby_id: LobbyId },

    #[serde(rename = "lobbyCreationError", rename_all = "camelCase")]
    LobbyCreationError { message: String },

    #[serde(rename = "lobbiesUpdated", rename_all = "camelCase")]
    LobbiesUpdated { lobbies: Vec<LobbySummary> },

    #[serde(rename = "teamNamesUpdated", rename_all = "camelCase")]
    TeamNamesUpdated { team_names: Vec<TeamName> },

    #[serde(rename = "mapNames", rename_all = "camelCase")]
    MapNames { map_names: Vec<MapName> },

    #[serde(rename = "gameName", rename_all = "camelCase")]
    GameName { game_name: String },

    #[serde(rename = "modesSizeUpdated", rename_all = "camelCase")]
    ModesSizeUpdated { modes_size: u8 },

    #[serde(rename = "fpsLobbySettings", rename_all = "camelCase")]
    FpsLobbySettings { settings: FpsSettings },

    #[serde(rename = "pickedUpdated", rename_all = "camelCase")]
    PickedUpdated { picked_maps: Vec<PickedEntry> },

    #[serde(rename = "bannedUpdated", rename_all = "camelCase")]
    BannedUpdated { banned_maps: Vec<BannedEntry> },

    #[serde(rename = "deciderUpdated", rename_all = "camelCase")]
    DeciderUpdated { decider: PickedEntry },

    #[serde(rename = "modesUpdated", rename_all = "camelCase")]
    ModesUpdated { modes: Vec<ModeInfo> },

    #[serde(rename = "modePicked", rename_all = "camelCase")]
    ModePicked { mode: ModeKey, name: String },

    #[serde(rename = "currentPickedMode", rename_all = "camelCase")]
    CurrentPickedMode { mode: Option<ModeKey> },

    #[serde(rename = "canWorkUpdated", rename_all = "camelCase")]
    CanWorkUpdated { flag: bool },

    #[serde(rename = "canBan", rename_all = "camelCase")]
    CanBan { flag: bool },

    #[serde(rename = "canPick", rename_all = "camelCase")]
    CanPick { flag: bool },

    #[serde(rename = "canModeBan", rename_all = "camelCase")]
    CanModeBan { flag: bool },

    #[serde(rename = "canModePick", rename_all = "camelCase")]
    CanModePick { flag: bool },

    #[serde(rename = "canReportWinner", rename_all = "camelCase")]
    CanReportWinner { flag: bool },

    #[serde(rename = "backend.startPick", rename_all = "camelCase")]
    BackendStartPick { map: MapName, team_name: TeamName },

    #[serde(rename = "endPick")]
    EndPick,

    #[serde(rename = "gameStateUpdated", rename_all = "camelCase")]
    GameStateUpdated { message: String },

    #[serde(rename = "coinFlipUpdated", rename_all = "camelCase")]
    CoinFlipUpdated {
        coin_flip: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_team: Option<TeamName>,
    },

    #[serde(rename = "cardColorsUpdated", rename_all = "camelCase")]
    CardColorsUpdated { card_colors: Vec<String> },

    #[serde(rename = "startWithoutCoin", rename_all = "camelCase")]
    StartWithoutCoin { first_team: TeamName },

    #[serde(rename = "winnerProposed", rename_all = "camelCase")]
    WinnerProposed {
        winner_team: TeamName,
        reporting_team: TeamName,
    },

    #[serde(rename = "winnerConfirmed", rename_all = "camelCase")]
    WinnerConfirmed {
        winner_team: TeamName,
        round_number: u32,
    },

    #[serde(rename = "winnerRejected", rename_all = "camelCase")]
    WinnerRejected { rejecting_team: TeamName },

    #[serde(rename = "patternList", rename_all = "camelCase")]
    PatternList { pattern: Vec<String> },

    #[serde(rename = "availableMaps", rename_all = "camelCase")]
    AvailableMaps { maps: Vec<MapName> },

    #[serde(rename = "lobbyGameCategory", rename_all = "camelCase")]
    LobbyGameCategory {
        lobby_id: LobbyId,
        category: GameFamily,
    },

    #[serde(rename = "lobbyNotFound", rename_all = "camelCase")]
    LobbyNotFound { lobby_id: LobbyId },

    #[serde(rename = "backend.clear_obs")]
    BackendClearObs,

    #[serde(rename = "admin.setObsLobby", rename_all = "camelCase")]
    ObsLobbyPinned { lobby_id: LobbyId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_names() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"t":"lobby.ban","lobbyId":"L1","map":"Nuke","teamName":"A"}"#)
                .unwrap();
        match ev {
            ClientEvent::Ban { lobby_id, map, team_name } => {
                assert_eq!(lobby_id, "L1");
                assert_eq!(map, "Nuke");
                assert_eq!(team_name, "A");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let ev: ClientEvent =
            serde_json::from_str(r#"{"t":"admin.play_obs","lobbyId":"L1"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::AdminPlayObs { .. }));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let parsed = serde_json::from_str::<ClientEvent>(r#"{"t":"lobby.cheat","lobbyId":"L1"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_join_role_defaults_to_member() {
        let ev: ClientEvent = serde_json::from_str(r#"{"t":"joinLobby","lobbyId":"L1"}"#).unwrap();
        match ev {
            ClientEvent::JoinLobby { role, .. } => assert_eq!(role, JoinRole::Member),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_server_event_serialization() {
        let json = serde_json::to_string(&ServerEvent::BackendStartPick {
            map: "Mirage".to_string(),
            team_name: "A".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""t":"backend.startPick""#));
        assert!(json.contains(r#""teamName":"A""#));

        let json = serde_json::to_string(&ServerEvent::CanWorkUpdated { flag: true }).unwrap();
        assert!(json.contains(r#""t":"canWorkUpdated""#));
    }

    #[test]
    fn test_fps_entry_omits_splatoon_fields() {
        let entry = PickedEntry {
            map: "Nuke".to_string(),
            team_name: "A".to_string(),
            side: Some("t".to_string()),
            side_team_name: Some("B".to_string()),
            round: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("round"));
        assert!(json.contains(r#""sideTeamName":"B""#));
    }
}
