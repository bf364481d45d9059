use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type ConnId = String;
pub type LobbyId = String;
pub type TeamName = String;
pub type MapName = String;
pub type ModeKey = String;

/// The two veto rule families a lobby can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameFamily {
    Fps,
    Splatoon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FpsGameType {
    Bo1,
    Bo3,
    Bo5,
}

impl FpsGameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FpsGameType::Bo1 => "bo1",
            FpsGameType::Bo3 => "bo3",
            FpsGameType::Bo5 => "bo5",
        }
    }
}

/// One token of a veto pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VetoAction {
    Ban,
    Pick,
    Decider,
}

impl VetoAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VetoAction::Ban => "ban",
            VetoAction::Pick => "pick",
            VetoAction::Decider => "decider",
        }
    }
}

/// Connection-level role, chosen at WebSocket upgrade time.
/// Admin connections may be gated by Basic Auth (see `auth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Observer,
    Admin,
}

/// Role requested in a `joinLobby` event. `Test` connections get the
/// state snapshot but are not tracked in the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRole {
    Member,
    Observer,
    Test,
}

/// Per-connection permission record. `work` marks the connection whose
/// turn it is; the remaining flags say which action kind is permitted.
/// `report_winner` is not tied to `work`: after a Splatoon map pick
/// both members hold it at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub work: bool,
    pub ban: bool,
    pub pick: bool,
    pub mode_ban: bool,
    pub mode_pick: bool,
    pub report_winner: bool,
}

impl Capabilities {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn ban_turn() -> Self {
        Self {
            work: true,
            ban: true,
            ..Self::default()
        }
    }

    pub fn pick_turn() -> Self {
        Self {
            work: true,
            pick: true,
            ..Self::default()
        }
    }

    pub fn mode_ban_turn() -> Self {
        Self {
            work: true,
            mode_ban: true,
            ..Self::default()
        }
    }

    pub fn mode_pick_turn() -> Self {
        Self {
            work: true,
            mode_pick: true,
            ..Self::default()
        }
    }

    pub fn report_winner_only() -> Self {
        Self {
            report_winner: true,
            ..Self::default()
        }
    }
}

/// Wire literals for a picked side.
pub const SIDE_T: &str = "t";
pub const SIDE_CT: &str = "ct";
pub const SIDE_KNIFE: &str = "knife";
pub const SIDE_DECIDER: &str = "DECIDER";

/// Normalize a client-sent side string to its canonical literal.
/// Uppercase variants are accepted; anything else is rejected.
pub fn normalize_side(raw: &str) -> Option<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "t" => Some(SIDE_T),
        "ct" => Some(SIDE_CT),
        "knife" => Some(SIDE_KNIFE),
        "decider" => Some(SIDE_DECIDER),
        _ => None,
    }
}

/// Human-readable side name used in state messages.
pub fn side_display(side: &str) -> &'static str {
    match side {
        SIDE_T => "атака",
        SIDE_CT => "защита",
        SIDE_KNIFE => "ножевой раунд",
        SIDE_DECIDER => "десайдер",
        _ => "",
    }
}

const MAX_TEAM_NAME_CHARS: usize = 32;

/// Ingress sanitization for team names: control characters stripped,
/// surrounding whitespace trimmed, length capped. Empty results are
/// rejected and the event carrying them is dropped.
pub fn sanitize_team_name(raw: &str) -> Option<TeamName> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TEAM_NAME_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_team_name() {
        assert_eq!(sanitize_team_name("  Navi  "), Some("Navi".to_string()));
        assert_eq!(
            sanitize_team_name("Te\x00am\x07 X"),
            Some("Team X".to_string())
        );
        assert_eq!(sanitize_team_name("   "), None);
        assert_eq!(sanitize_team_name("\x1b[31m"), Some("[31m".to_string()));

        let long = "x".repeat(100);
        assert_eq!(sanitize_team_name(&long).unwrap().chars().count(), 32);
    }

    #[test]
    fn test_normalize_side() {
        assert_eq!(normalize_side("t"), Some(SIDE_T));
        assert_eq!(normalize_side("CT"), Some(SIDE_CT));
        assert_eq!(normalize_side("Knife"), Some(SIDE_KNIFE));
        assert_eq!(normalize_side("DECIDER"), Some(SIDE_DECIDER));
        assert_eq!(normalize_side("mid"), None);
    }

    #[test]
    fn test_capability_presets_hold_work_flag() {
        assert!(Capabilities::ban_turn().work);
        assert!(Capabilities::pick_turn().work);
        assert!(Capabilities::mode_ban_turn().work);
        assert!(Capabilities::mode_pick_turn().work);
        // report_winner is deliberately outside the work regime
        assert!(!Capabilities::report_winner_only().work);
    }
}
