//! The Lobby entity and its family-specific sub-state.

use std::collections::{HashMap, HashSet};

use crate::protocol::{BannedEntry, FpsSettings, LobbySummary, PickedEntry};
use crate::types::*;

/// Rules common to both families. Sealed at creation except for the
/// fields the ceremony itself advances (`map_names`, `last_winner`,
/// `round_number`).
#[derive(Debug, Clone)]
pub struct Rules {
    pub admin: bool,
    pub coin_flip: bool,
    pub game_name: String,
    pub game_type: String,
    pub map_names: Vec<MapName>,
    pub last_winner: Option<TeamName>,
    pub round_number: u32,
}

#[derive(Debug, Clone)]
pub struct PendingPick {
    pub map: MapName,
    pub team_name: TeamName,
    /// Connection that nominated the map; turn alternation continues
    /// from it after the side is chosen.
    pub conn: ConnId,
}

#[derive(Debug, Clone)]
pub struct FpsState {
    pub game_type: FpsGameType,
    pub knife_decider: bool,
    pub pattern: [VetoAction; 7],
    pub map_pool_size: usize,
    pub decider_map: Option<PickedEntry>,
    pub pending_pick: Option<PendingPick>,
}

#[derive(Debug, Clone)]
pub struct PendingWinner {
    pub winner_team: TeamName,
    pub reporting_team: TeamName,
}

/// One finished Splatoon round.
#[derive(Debug, Clone)]
pub struct RoundRecord {
    pub round_number: u32,
    pub mode: Option<ModeKey>,
    pub map: Option<MapName>,
    pub banned_modes: Vec<ModeKey>,
    pub banned_maps: Vec<MapName>,
    pub winner: TeamName,
    pub finished_at: String,
}

#[derive(Debug, Clone)]
pub struct SplatoonState {
    pub modes_size: u8,
    pub active_modes: Vec<ModeKey>,
    pub banned_modes: Vec<ModeKey>,
    pub picked_mode: Option<ModeKey>,
    pub priority_team: Option<TeamName>,
    pub round_history: Vec<RoundRecord>,
    pub pending_winner: Option<PendingWinner>,
}

#[derive(Debug, Clone)]
pub enum FamilyState {
    Fps(FpsState),
    Splatoon(SplatoonState),
}

#[derive(Debug, Clone)]
pub struct Lobby {
    pub id: LobbyId,
    pub members: HashSet<ConnId>,
    pub observers: HashSet<ConnId>,
    /// Ordered: insertion order is join order and decides the default
    /// priority. Never more than two entries.
    pub team_names: Vec<(ConnId, TeamName)>,
    pub caps: HashMap<ConnId, Capabilities>,
    pub rules: Rules,
    pub family: FamilyState,
    pub picked_maps: Vec<PickedEntry>,
    pub banned_maps: Vec<BannedEntry>,
    pub game_step: usize,
    pub started: bool,
    /// Last `gameStateUpdated` text, replayed to late joiners and OBS.
    pub last_state_message: Option<String>,
    pub created_at: String,
}

impl Lobby {
    pub fn game_family(&self) -> GameFamily {
        match self.family {
            FamilyState::Fps(_) => GameFamily::Fps,
            FamilyState::Splatoon(_) => GameFamily::Splatoon,
        }
    }

    pub fn fps(&self) -> Option<&FpsState> {
        match &self.family {
            FamilyState::Fps(s) => Some(s),
            _ => None,
        }
    }

    pub fn fps_mut(&mut self) -> Option<&mut FpsState> {
        match &mut self.family {
            FamilyState::Fps(s) => Some(s),
            _ => None,
        }
    }

    pub fn splatoon(&self) -> Option<&SplatoonState> {
        match &self.family {
            FamilyState::Splatoon(s) => Some(s),
            _ => None,
        }
    }

    pub fn splatoon_mut(&mut self) -> Option<&mut SplatoonState> {
        match &mut self.family {
            FamilyState::Splatoon(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_member(&self, conn: &str) -> bool {
        self.members.contains(conn)
    }

    /// Team name bound to a connection, if any.
    pub fn team_of(&self, conn: &str) -> Option<TeamName> {
        self.team_names
            .iter()
            .find(|(c, _)| c == conn)
            .map(|(_, t)| t.clone())
    }

    pub fn conn_of_team(&self, team: &str) -> Option<ConnId> {
        self.team_names
            .iter()
            .find(|(_, t)| t == team)
            .map(|(c, _)| c.clone())
    }

    /// The other registered team's connection.
    pub fn other_member(&self, conn: &str) -> Option<ConnId> {
        self.team_names
            .iter()
            .find(|(c, _)| c != conn)
            .map(|(c, _)| c.clone())
    }

    /// Registered team connections, in join order.
    pub fn team_conns(&self) -> Vec<ConnId> {
        self.team_names.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn team_name_list(&self) -> Vec<TeamName> {
        self.team_names.iter().map(|(_, t)| t.clone()).collect()
    }

    /// Every connection in the lobby room (members plus observers).
    pub fn room_conns(&self) -> Vec<ConnId> {
        self.members
            .iter()
            .chain(self.observers.iter())
            .cloned()
            .collect()
    }

    pub fn caps_of(&self, conn: &str) -> Capabilities {
        self.caps.get(conn).copied().unwrap_or_default()
    }

    /// Maps still actionable at this point of the ceremony. For FPS the
    /// whole history counts; for Splatoon only the current round's
    /// entries block a map.
    pub fn available_maps(&self) -> Vec<MapName> {
        let round = match self.family {
            FamilyState::Fps(_) => None,
            FamilyState::Splatoon(_) => Some(self.rules.round_number),
        };
        self.rules
            .map_names
            .iter()
            .filter(|m| {
                let picked = self
                    .picked_maps
                    .iter()
                    .any(|e| &e.map == *m && (round.is_none() || e.round == round));
                let banned = self
                    .banned_maps
                    .iter()
                    .any(|e| &e.map == *m && (round.is_none() || e.round == round));
                !picked && !banned
            })
            .cloned()
            .collect()
    }

    /// The single FPS map not yet picked or banned, when exactly one
    /// remains.
    pub fn remaining_map(&self) -> Option<MapName> {
        let mut open = self.available_maps();
        if open.len() == 1 {
            open.pop()
        } else {
            None
        }
    }

    pub fn fps_settings(&self) -> Option<FpsSettings> {
        self.fps().map(|f| FpsSettings {
            game_type: f.game_type,
            knife_decider: f.knife_decider,
            coin_flip: self.rules.coin_flip,
            map_pool_size: f.map_pool_size,
        })
    }

    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            id: self.id.clone(),
            game_family: self.game_family(),
            game_name: self.rules.game_name.clone(),
            game_type: self.rules.game_type.clone(),
            team_names: self.team_name_list(),
            members: self.members.len(),
            observers: self.observers.len(),
            admin: self.rules.admin,
            started: self.started,
            created_at: self.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn fps_lobby() -> Lobby {
        let pattern = catalog::fps_pattern(FpsGameType::Bo3);
        Lobby {
            id: "L1".to_string(),
            members: HashSet::new(),
            observers: HashSet::new(),
            team_names: Vec::new(),
            caps: HashMap::new(),
            rules: Rules {
                admin: false,
                coin_flip: false,
                game_name: "cs2".to_string(),
                game_type: "bo3".to_string(),
                map_names: vec!["A".into(), "B".into(), "C".into()],
                last_winner: None,
                round_number: 1,
            },
            family: FamilyState::Fps(FpsState {
                game_type: FpsGameType::Bo3,
                knife_decider: true,
                pattern,
                map_pool_size: 7,
                decider_map: None,
                pending_pick: None,
            }),
            picked_maps: Vec::new(),
            banned_maps: Vec::new(),
            game_step: 0,
            started: false,
            last_state_message: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_team_order_is_join_order() {
        let mut lobby = fps_lobby();
        lobby.team_names.push(("c1".into(), "Alpha".into()));
        lobby.team_names.push(("c2".into(), "Beta".into()));

        assert_eq!(lobby.team_name_list(), vec!["Alpha", "Beta"]);
        assert_eq!(lobby.other_member("c1"), Some("c2".to_string()));
        assert_eq!(lobby.conn_of_team("Beta"), Some("c2".to_string()));
        assert_eq!(lobby.team_of("c3"), None);
    }

    #[test]
    fn test_available_maps_fps_counts_whole_history() {
        let mut lobby = fps_lobby();
        lobby.banned_maps.push(BannedEntry {
            map: "A".into(),
            team_name: "Alpha".into(),
            round: None,
        });
        lobby.picked_maps.push(PickedEntry {
            map: "B".into(),
            team_name: "Beta".into(),
            side: Some("t".into()),
            side_team_name: Some("Alpha".into()),
            round: None,
        });
        assert_eq!(lobby.available_maps(), vec!["C".to_string()]);
        assert_eq!(lobby.remaining_map(), Some("C".to_string()));
    }

    #[test]
    fn test_available_maps_splatoon_filters_by_round() {
        let mut lobby = fps_lobby();
        lobby.family = FamilyState::Splatoon(SplatoonState {
            modes_size: 2,
            active_modes: vec![],
            banned_modes: vec![],
            picked_mode: None,
            priority_team: None,
            round_history: vec![],
            pending_winner: None,
        });
        lobby.rules.round_number = 2;
        // banned during round 1: free again in round 2
        lobby.banned_maps.push(BannedEntry {
            map: "A".into(),
            team_name: "Alpha".into(),
            round: Some(1),
        });
        // banned during round 2: blocked
        lobby.banned_maps.push(BannedEntry {
            map: "B".into(),
            team_name: "Beta".into(),
            round: Some(2),
        });
        assert_eq!(lobby.available_maps(), vec!["A".to_string(), "C".to_string()]);
    }
}
