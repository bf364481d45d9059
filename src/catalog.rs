//! Static game definitions: map pools, veto patterns, mode translations.
//!
//! The catalog is process-wide and admin-editable. Lobbies take a JSON
//! deep copy of their pool at creation, so later edits never reach a
//! running ceremony.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{FpsGameType, MapName, ModeKey, VetoAction};

pub const FPS_DEFAULT_GAME: &str = "cs2";
pub const FPS_PATTERN_LEN: usize = 7;

pub const MODE_ZONES: &str = "zones";
pub const MODE_TOWER: &str = "tower";
pub const MODE_RAINMAKER: &str = "rainmaker";
pub const MODE_CLAMS: &str = "clams";

const CS2_POOL: [&str; 7] = [
    "Ancient", "Anubis", "Dust II", "Inferno", "Mirage", "Nuke", "Train",
];

const ZONES_POOL: [&str; 8] = [
    "Scorch Gorge",
    "Eeltail Alley",
    "Hagglefish Market",
    "Undertow Spillway",
    "Mincemeat Metalworks",
    "Hammerhead Bridge",
    "Museum d'Alfonsino",
    "Mahi-Mahi Resort",
];

const TOWER_POOL: [&str; 8] = [
    "Inkblot Art Academy",
    "Sturgeon Shipyard",
    "MakoMart",
    "Wahoo World",
    "Flounder Heights",
    "Brinewater Springs",
    "Um'ami Ruins",
    "Manta Maria",
];

const RAINMAKER_POOL: [&str; 8] = [
    "Barnacle & Dime",
    "Humpback Pump Track",
    "Crableg Capital",
    "Shipshape Cargo Co.",
    "Robo ROM-en",
    "Bluefin Depot",
    "Marlin Airport",
    "Lemuria Hub",
];

const CLAMS_POOL: [&str; 8] = [
    "Scorch Gorge",
    "Inkblot Art Academy",
    "Hagglefish Market",
    "MakoMart",
    "Wahoo World",
    "Hammerhead Bridge",
    "Flounder Heights",
    "Mahi-Mahi Resort",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    fps_pools: HashMap<String, Vec<MapName>>,
    splatoon_pools: HashMap<ModeKey, Vec<MapName>>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let mut fps_pools = HashMap::new();
        fps_pools.insert(FPS_DEFAULT_GAME.to_string(), to_pool(&CS2_POOL));

        let mut splatoon_pools = HashMap::new();
        splatoon_pools.insert(MODE_ZONES.to_string(), to_pool(&ZONES_POOL));
        splatoon_pools.insert(MODE_TOWER.to_string(), to_pool(&TOWER_POOL));
        splatoon_pools.insert(MODE_RAINMAKER.to_string(), to_pool(&RAINMAKER_POOL));
        splatoon_pools.insert(MODE_CLAMS.to_string(), to_pool(&CLAMS_POOL));

        Self {
            fps_pools,
            splatoon_pools,
        }
    }

    /// Deep-copied FPS pool for a game, or None for an unknown game.
    pub fn fps_map_pool(&self, game: &str) -> Option<Vec<MapName>> {
        self.fps_pools.get(game).map(|p| json_clone(p))
    }

    /// Deep-copied Splatoon pool for a mode, or None for an unknown mode.
    pub fn splatoon_map_pool(&self, mode: &str) -> Option<Vec<MapName>> {
        self.splatoon_pools.get(mode).map(|p| json_clone(p))
    }

    /// Replace the pool for an FPS game, or reset it to the builtin
    /// default when `pool` is None. Running lobbies keep their copies.
    pub fn set_fps_map_pool(&mut self, game: &str, pool: Option<Vec<MapName>>) {
        match pool {
            Some(maps) => {
                self.fps_pools.insert(game.to_string(), maps);
            }
            None => {
                if game == FPS_DEFAULT_GAME {
                    self.fps_pools
                        .insert(game.to_string(), to_pool(&CS2_POOL));
                } else {
                    self.fps_pools.remove(game);
                }
            }
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn to_pool(names: &[&str]) -> Vec<MapName> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Defensive copy through a JSON round trip, falling back to a plain
/// clone if serialization ever fails (it cannot for string vectors).
pub fn json_clone(pool: &[MapName]) -> Vec<MapName> {
    serde_json::to_string(pool)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| pool.to_vec())
}

/// Seven-token FPS veto pattern. The first `7 − pool_size` tokens are
/// consumed implicitly before any action (initial gameStep).
pub fn fps_pattern(game_type: FpsGameType) -> [VetoAction; FPS_PATTERN_LEN] {
    use VetoAction::*;
    match game_type {
        FpsGameType::Bo1 => [Ban, Ban, Ban, Ban, Ban, Ban, Pick],
        FpsGameType::Bo3 => [Ban, Ban, Pick, Pick, Ban, Ban, Decider],
        FpsGameType::Bo5 => [Ban, Ban, Pick, Pick, Pick, Pick, Decider],
    }
}

/// Mode-phase pattern for a Splatoon round. With two modes there is no
/// mode veto: the priority team picks directly.
pub fn splatoon_mode_pattern(modes_size: u8, first_round: bool) -> &'static [VetoAction] {
    use VetoAction::*;
    match (modes_size, first_round) {
        (4, true) => &[Ban, Ban, Pick],
        (4, false) => &[Ban, Pick],
        _ => &[Pick],
    }
}

/// Map-phase pattern for a Splatoon round.
pub fn splatoon_map_pattern(modes_size: u8, first_round: bool) -> &'static [VetoAction] {
    use VetoAction::*;
    if modes_size == 4 && !first_round {
        &[Ban, Ban, Ban, Pick]
    } else {
        &[Ban, Ban, Ban, Ban, Ban, Pick]
    }
}

/// Which team acts at a given step of the pattern: the priority team or
/// the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTeam {
    Priority,
    Other,
}

pub fn splatoon_mode_actor(modes_size: u8, first_round: bool, step: usize) -> PatternTeam {
    match (modes_size, first_round, step) {
        // four modes, round 1: priority bans, other bans, priority picks
        (4, true, 1) => PatternTeam::Other,
        // four modes, later rounds: priority bans once, other picks
        (4, false, 1) => PatternTeam::Other,
        _ => PatternTeam::Priority,
    }
}

pub fn splatoon_map_actor(modes_size: u8, first_round: bool, step: usize) -> PatternTeam {
    if modes_size == 4 && !first_round {
        // winner bans three, loser picks
        if step < 3 {
            PatternTeam::Priority
        } else {
            PatternTeam::Other
        }
    } else {
        // priority bans two, other bans three, priority picks
        match step {
            0 | 1 | 5 => PatternTeam::Priority,
            _ => PatternTeam::Other,
        }
    }
}

/// Mode set for a given pool size. Two-mode ceremonies are fixed to the
/// tower/zones subset.
pub fn splatoon_modes(modes_size: u8) -> Vec<ModeKey> {
    if modes_size == 2 {
        vec![MODE_TOWER.to_string(), MODE_ZONES.to_string()]
    } else {
        vec![
            MODE_ZONES.to_string(),
            MODE_TOWER.to_string(),
            MODE_RAINMAKER.to_string(),
            MODE_CLAMS.to_string(),
        ]
    }
}

/// Client-facing display name for a mode key.
pub fn mode_translation(mode: &str) -> &'static str {
    match mode {
        MODE_ZONES => "Бой за зоны",
        MODE_TOWER => "Бой за башню",
        MODE_RAINMAKER => "Мегакарп",
        MODE_CLAMS => "Устробол",
        _ => "",
    }
}

/// Create-time validation: BO3/BO5 need a pool of exactly seven maps,
/// BO1 takes four or seven.
pub fn validate_fps_rules(game_type: FpsGameType, pool_size: usize) -> Result<(), String> {
    match game_type {
        FpsGameType::Bo1 => {
            if pool_size == 4 || pool_size == 7 {
                Ok(())
            } else {
                Err(format!("bo1 requires a map pool of 4 or 7, got {}", pool_size))
            }
        }
        FpsGameType::Bo3 | FpsGameType::Bo5 => {
            if pool_size == 7 {
                Ok(())
            } else {
                Err(format!(
                    "{} requires a map pool of exactly 7, got {}",
                    game_type.as_str(),
                    pool_size
                ))
            }
        }
    }
}

pub fn validate_modes_size(modes_size: u8) -> Result<(), String> {
    if modes_size == 2 || modes_size == 4 {
        Ok(())
    } else {
        Err(format!("modesSize must be 2 or 4, got {}", modes_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VetoAction::*;

    #[test]
    fn test_builtin_pools() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.fps_map_pool(FPS_DEFAULT_GAME).unwrap().len(), 7);
        assert_eq!(catalog.splatoon_map_pool(MODE_ZONES).unwrap().len(), 8);
        assert!(catalog.fps_map_pool("quake").is_none());
        assert!(catalog.splatoon_map_pool("turf").is_none());
    }

    #[test]
    fn test_pool_copies_are_independent() {
        let mut catalog = Catalog::builtin();
        let copy = catalog.fps_map_pool(FPS_DEFAULT_GAME).unwrap();
        catalog.set_fps_map_pool(FPS_DEFAULT_GAME, Some(vec!["Cache".to_string()]));
        assert_eq!(copy.len(), 7);
        assert_eq!(catalog.fps_map_pool(FPS_DEFAULT_GAME).unwrap().len(), 1);

        catalog.set_fps_map_pool(FPS_DEFAULT_GAME, None);
        assert_eq!(catalog.fps_map_pool(FPS_DEFAULT_GAME).unwrap().len(), 7);
    }

    #[test]
    fn test_fps_patterns() {
        assert_eq!(
            fps_pattern(FpsGameType::Bo3),
            [Ban, Ban, Pick, Pick, Ban, Ban, Decider]
        );
        assert_eq!(fps_pattern(FpsGameType::Bo1)[6], Pick);
        assert_eq!(
            fps_pattern(FpsGameType::Bo5),
            [Ban, Ban, Pick, Pick, Pick, Pick, Decider]
        );
    }

    #[test]
    fn test_splatoon_first_round_map_schedule() {
        // priority bans two, other bans three, priority picks
        let pattern = splatoon_map_pattern(4, true);
        assert_eq!(pattern, &[Ban, Ban, Ban, Ban, Ban, Pick]);
        let actors: Vec<PatternTeam> = (0..6).map(|i| splatoon_map_actor(4, true, i)).collect();
        assert_eq!(
            actors,
            vec![
                PatternTeam::Priority,
                PatternTeam::Priority,
                PatternTeam::Other,
                PatternTeam::Other,
                PatternTeam::Other,
                PatternTeam::Priority,
            ]
        );
    }

    #[test]
    fn test_splatoon_later_round_four_modes() {
        // winner bans three, loser picks
        assert_eq!(splatoon_map_pattern(4, false), &[Ban, Ban, Ban, Pick]);
        assert_eq!(splatoon_map_actor(4, false, 2), PatternTeam::Priority);
        assert_eq!(splatoon_map_actor(4, false, 3), PatternTeam::Other);

        // mode phase: priority bans one, other picks
        assert_eq!(splatoon_mode_pattern(4, false), &[Ban, Pick]);
        assert_eq!(splatoon_mode_actor(4, false, 0), PatternTeam::Priority);
        assert_eq!(splatoon_mode_actor(4, false, 1), PatternTeam::Other);
    }

    #[test]
    fn test_two_mode_rules() {
        assert_eq!(splatoon_mode_pattern(2, true), &[Pick]);
        assert_eq!(splatoon_mode_pattern(2, false), &[Pick]);
        assert_eq!(splatoon_map_pattern(2, false), &[Ban, Ban, Ban, Ban, Ban, Pick]);
        assert_eq!(splatoon_modes(2), vec!["tower", "zones"]);
    }

    #[test]
    fn test_create_time_constraints() {
        assert!(validate_fps_rules(FpsGameType::Bo3, 7).is_ok());
        assert!(validate_fps_rules(FpsGameType::Bo3, 5).is_err());
        assert!(validate_fps_rules(FpsGameType::Bo1, 4).is_ok());
        assert!(validate_fps_rules(FpsGameType::Bo1, 5).is_err());
        assert!(validate_modes_size(2).is_ok());
        assert!(validate_modes_size(4).is_ok());
        assert!(validate_modes_size(3).is_err());
    }

    #[test]
    fn test_mode_translation() {
        assert_eq!(mode_translation(MODE_ZONES), "Бой за зоны");
        assert_eq!(mode_translation("unknown"), "");
    }
}
