//! Splatoon turn controller: round lifecycle, mode veto, map veto with
//! priority-team schedules, and two-phase winner confirmation.

use rand::Rng;

use crate::catalog::{self, PatternTeam};
use crate::protocol::{BannedEntry, PickedEntry, ServerEvent};
use crate::state::lobby::{Lobby, PendingWinner, RoundRecord};
use crate::state::{mode_infos, set_caps, state_message, Outbox};
use crate::types::*;

/// Begin the ceremony: round 1 priority by coin flip or join order.
pub fn start_splatoon(lobby: &mut Lobby, outbox: &mut Outbox) -> Result<(), String> {
    if lobby.started {
        return Err("ceremony already started".to_string());
    }
    let conns = lobby.team_conns();
    if conns.is_empty() {
        return Err("no registered teams".to_string());
    }

    let first_idx = if lobby.rules.coin_flip && conns.len() == 2 {
        usize::from(rand::rng().random_bool(0.5))
    } else {
        0
    };
    let priority = lobby.team_of(&conns[first_idx]).unwrap_or_default();

    lobby.started = true;
    if let Some(splatoon) = lobby.splatoon_mut() {
        splatoon.priority_team = Some(priority.clone());
    }

    if lobby.rules.coin_flip {
        outbox.to_room(
            lobby,
            ServerEvent::CoinFlipUpdated {
                coin_flip: true,
                first_team: Some(priority),
            },
        );
    } else {
        outbox.to_room(lobby, ServerEvent::StartWithoutCoin { first_team: priority });
    }

    begin_round(lobby, outbox)
}

/// Reset the per-round fields and grant the first capability of the
/// round. On rounds after the first, priority moves to the last
/// confirmed winner.
fn begin_round(lobby: &mut Lobby, outbox: &mut Outbox) -> Result<(), String> {
    let last_winner = lobby.rules.last_winner.clone();
    let first = lobby.rules.round_number == 1;
    {
        let splatoon = lobby.splatoon_mut().ok_or("not a splatoon lobby")?;
        splatoon.active_modes = catalog::splatoon_modes(splatoon.modes_size);
        splatoon.banned_modes.clear();
        splatoon.picked_mode = None;
        splatoon.pending_winner = None;
        if !first {
            splatoon.priority_team = last_winner;
        }
    }
    lobby.game_step = 0;
    lobby.rules.map_names = Vec::new();

    let active = lobby
        .splatoon()
        .map(|s| s.active_modes.clone())
        .unwrap_or_default();
    outbox.to_room(
        lobby,
        ServerEvent::ModesUpdated {
            modes: mode_infos(&active),
        },
    );
    grant_turn(lobby, outbox)
}

/// Grant whatever the round position dictates: a mode capability while
/// the mode pattern is unconsumed, a map capability afterwards.
fn grant_turn(lobby: &mut Lobby, outbox: &mut Outbox) -> Result<(), String> {
    let splatoon = lobby.splatoon().ok_or("not a splatoon lobby")?;
    let first = lobby.rules.round_number == 1;
    let modes_size = splatoon.modes_size;
    let priority = splatoon
        .priority_team
        .clone()
        .ok_or("no priority team")?;

    let mode_pattern = catalog::splatoon_mode_pattern(modes_size, first);
    let step = lobby.game_step;
    let (token, pattern_team, mode_phase) = if step < mode_pattern.len() {
        (
            mode_pattern[step],
            catalog::splatoon_mode_actor(modes_size, first, step),
            true,
        )
    } else {
        let map_pattern = catalog::splatoon_map_pattern(modes_size, first);
        let map_idx = step - mode_pattern.len();
        if map_idx >= map_pattern.len() {
            return Err("round already complete".to_string());
        }
        (
            map_pattern[map_idx],
            catalog::splatoon_map_actor(modes_size, first, map_idx),
            false,
        )
    };

    let actor_team = match pattern_team {
        PatternTeam::Priority => priority,
        PatternTeam::Other => lobby
            .team_names
            .iter()
            .find(|(_, t)| *t != priority)
            .map(|(_, t)| t.clone())
            .ok_or("no opposing team")?,
    };
    let conn = lobby
        .conn_of_team(&actor_team)
        .ok_or("acting team is not connected")?;

    if let Some(other) = lobby.other_member(&conn) {
        set_caps(lobby, outbox, &other, Capabilities::off());
    }

    let round = lobby.rules.round_number;
    match (mode_phase, token) {
        (true, VetoAction::Ban) => {
            set_caps(lobby, outbox, &conn, Capabilities::mode_ban_turn());
            state_message(
                lobby,
                outbox,
                format!("Раунд {}. Команда «{}» банит режим", round, actor_team),
            );
        }
        (true, VetoAction::Pick) => {
            set_caps(lobby, outbox, &conn, Capabilities::mode_pick_turn());
            state_message(
                lobby,
                outbox,
                format!("Раунд {}. Команда «{}» выбирает режим", round, actor_team),
            );
        }
        (false, VetoAction::Ban) => {
            set_caps(lobby, outbox, &conn, Capabilities::ban_turn());
            outbox.to_conn(
                conn,
                ServerEvent::AvailableMaps {
                    maps: lobby.available_maps(),
                },
            );
            state_message(lobby, outbox, format!("Команда «{}» банит карту", actor_team));
        }
        (false, VetoAction::Pick) => {
            set_caps(lobby, outbox, &conn, Capabilities::pick_turn());
            outbox.to_conn(
                conn,
                ServerEvent::AvailableMaps {
                    maps: lobby.available_maps(),
                },
            );
            state_message(
                lobby,
                outbox,
                format!("Команда «{}» выбирает карту", actor_team),
            );
        }
        (_, VetoAction::Decider) => {
            return Err("splatoon patterns have no decider".to_string());
        }
    }
    Ok(())
}

pub fn apply_mode_ban(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    mode: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).mode_ban {
        return Err("connection cannot ban a mode now".to_string());
    }
    let first = lobby.rules.round_number == 1;
    let splatoon = lobby.splatoon().ok_or("not a splatoon lobby")?;
    let mode_pattern = catalog::splatoon_mode_pattern(splatoon.modes_size, first);
    let step = lobby.game_step;
    if step >= mode_pattern.len() || mode_pattern[step] != VetoAction::Ban {
        return Err("pattern does not expect a mode ban".to_string());
    }
    if !splatoon.active_modes.iter().any(|m| m == mode) {
        return Err(format!("mode {} is not active", mode));
    }

    if let Some(splatoon) = lobby.splatoon_mut() {
        splatoon.active_modes.retain(|m| m != mode);
        splatoon.banned_modes.push(mode.to_string());
    }
    lobby.game_step += 1;

    let active = lobby
        .splatoon()
        .map(|s| s.active_modes.clone())
        .unwrap_or_default();
    outbox.to_room(
        lobby,
        ServerEvent::ModesUpdated {
            modes: mode_infos(&active),
        },
    );
    grant_turn(lobby, outbox)
}

/// Pick the round's mode; `pool` is the catalog's map pool for it,
/// resolved by the dispatch layer.
pub fn apply_mode_pick(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    mode: &str,
    pool: Option<Vec<MapName>>,
) -> Result<(), String> {
    if !lobby.caps_of(conn).mode_pick {
        return Err("connection cannot pick a mode now".to_string());
    }
    let first = lobby.rules.round_number == 1;
    let splatoon = lobby.splatoon().ok_or("not a splatoon lobby")?;
    let mode_pattern = catalog::splatoon_mode_pattern(splatoon.modes_size, first);
    let step = lobby.game_step;
    if step >= mode_pattern.len() || mode_pattern[step] != VetoAction::Pick {
        return Err("pattern does not expect a mode pick".to_string());
    }
    if !splatoon.active_modes.iter().any(|m| m == mode) {
        return Err(format!("mode {} is not active", mode));
    }
    let pool = pool.ok_or_else(|| format!("no map pool for mode {}", mode))?;

    if let Some(splatoon) = lobby.splatoon_mut() {
        splatoon.picked_mode = Some(mode.to_string());
    }
    lobby.rules.map_names = pool;
    lobby.game_step += 1;

    outbox.to_room(
        lobby,
        ServerEvent::ModePicked {
            mode: mode.to_string(),
            name: catalog::mode_translation(mode).to_string(),
        },
    );
    outbox.to_room(
        lobby,
        ServerEvent::MapNames {
            map_names: lobby.rules.map_names.clone(),
        },
    );
    grant_turn(lobby, outbox)
}

pub fn apply_map_ban(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    map: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).ban {
        return Err("connection cannot ban now".to_string());
    }
    if !lobby.available_maps().iter().any(|m| m == map) {
        return Err(format!("map {} is not available", map));
    }

    let team = lobby.team_of(conn).ok_or("connection has no team")?;
    let round = lobby.rules.round_number;
    lobby.banned_maps.push(BannedEntry {
        map: map.to_string(),
        team_name: team,
        round: Some(round),
    });
    lobby.game_step += 1;

    outbox.to_room(
        lobby,
        ServerEvent::BannedUpdated {
            banned_maps: lobby.banned_maps.clone(),
        },
    );
    grant_turn(lobby, outbox)
}

/// The round's map pick: capabilities go dark and both members receive
/// the winner-report capability.
pub fn apply_map_pick(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    map: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).pick {
        return Err("connection cannot pick now".to_string());
    }
    if !lobby.available_maps().iter().any(|m| m == map) {
        return Err(format!("map {} is not available", map));
    }

    let team = lobby.team_of(conn).ok_or("connection has no team")?;
    let round = lobby.rules.round_number;
    let mode_name = lobby
        .splatoon()
        .and_then(|s| s.picked_mode.as_deref())
        .map(catalog::mode_translation)
        .unwrap_or("")
        .to_string();

    lobby.picked_maps.push(PickedEntry {
        map: map.to_string(),
        team_name: team,
        side: None,
        side_team_name: None,
        round: Some(round),
    });
    lobby.game_step += 1;

    outbox.to_room(
        lobby,
        ServerEvent::PickedUpdated {
            picked_maps: lobby.picked_maps.clone(),
        },
    );
    state_message(
        lobby,
        outbox,
        format!("Играем «{}» — {}. Сообщите победителя", mode_name, map),
    );

    for member in lobby.team_conns() {
        set_caps(lobby, outbox, &member, Capabilities::report_winner_only());
    }
    Ok(())
}

pub fn propose_winner(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    winner_team: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).report_winner {
        return Err("connection cannot report a winner now".to_string());
    }
    if lobby.conn_of_team(winner_team).is_none() {
        return Err(format!("unknown winner team {}", winner_team));
    }
    let reporting_team = lobby.team_of(conn).ok_or("connection has no team")?;
    let other = lobby
        .other_member(conn)
        .ok_or("no second member to confirm")?;

    if let Some(splatoon) = lobby.splatoon_mut() {
        splatoon.pending_winner = Some(PendingWinner {
            winner_team: winner_team.to_string(),
            reporting_team: reporting_team.clone(),
        });
    }

    outbox.to_conn(
        other,
        ServerEvent::WinnerProposed {
            winner_team: winner_team.to_string(),
            reporting_team: reporting_team.clone(),
        },
    );
    state_message(
        lobby,
        outbox,
        format!(
            "Команда «{}» сообщает победителя: «{}»",
            reporting_team, winner_team
        ),
    );
    Ok(())
}

pub fn confirm_winner(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    confirmed: bool,
) -> Result<(), String> {
    if !lobby.caps_of(conn).report_winner {
        return Err("connection cannot confirm a winner now".to_string());
    }
    let sender_team = lobby.team_of(conn).ok_or("connection has no team")?;
    let pending = lobby
        .splatoon()
        .and_then(|s| s.pending_winner.clone())
        .ok_or("no winner proposal pending")?;
    if pending.reporting_team == sender_team {
        return Err("reporter cannot confirm its own proposal".to_string());
    }

    if !confirmed {
        if let Some(splatoon) = lobby.splatoon_mut() {
            splatoon.pending_winner = None;
        }
        // only the rejecting team may report again
        for member in lobby.team_conns() {
            let caps = if member == conn {
                Capabilities::report_winner_only()
            } else {
                Capabilities::off()
            };
            set_caps(lobby, outbox, &member, caps);
        }
        outbox.to_room(
            lobby,
            ServerEvent::WinnerRejected {
                rejecting_team: sender_team.clone(),
            },
        );
        state_message(
            lobby,
            outbox,
            format!(
                "Результат отклонён — команда «{}» выбирает победителя заново",
                sender_team
            ),
        );
        return Ok(());
    }

    let round = lobby.rules.round_number;
    let record = {
        let splatoon = lobby.splatoon().ok_or("not a splatoon lobby")?;
        RoundRecord {
            round_number: round,
            mode: splatoon.picked_mode.clone(),
            map: lobby
                .picked_maps
                .iter()
                .rev()
                .find(|e| e.round == Some(round))
                .map(|e| e.map.clone()),
            banned_modes: splatoon.banned_modes.clone(),
            banned_maps: lobby
                .banned_maps
                .iter()
                .filter(|e| e.round == Some(round))
                .map(|e| e.map.clone())
                .collect(),
            winner: pending.winner_team.clone(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    };

    if let Some(splatoon) = lobby.splatoon_mut() {
        splatoon.round_history.push(record);
        splatoon.pending_winner = None;
    }
    lobby.rules.last_winner = Some(pending.winner_team.clone());
    lobby.rules.round_number = round + 1;

    outbox.to_room(
        lobby,
        ServerEvent::WinnerConfirmed {
            winner_team: pending.winner_team.clone(),
            round_number: round,
        },
    );
    state_message(
        lobby,
        outbox,
        format!("Победитель раунда {} — «{}»", round, pending.winner_team),
    );
    begin_round(lobby, outbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::{FamilyState, Rules, SplatoonState};
    use std::collections::{HashMap, HashSet};

    fn splatoon_lobby(modes_size: u8) -> Lobby {
        let mut lobby = Lobby {
            id: "S1".to_string(),
            members: HashSet::from(["c1".to_string(), "c2".to_string()]),
            observers: HashSet::new(),
            team_names: vec![
                ("c1".to_string(), "A".to_string()),
                ("c2".to_string(), "B".to_string()),
            ],
            caps: HashMap::new(),
            rules: Rules {
                admin: false,
                coin_flip: false,
                game_name: "splatoon3".to_string(),
                game_type: "bo5".to_string(),
                map_names: Vec::new(),
                last_winner: None,
                round_number: 1,
            },
            family: FamilyState::Splatoon(SplatoonState {
                modes_size,
                active_modes: Vec::new(),
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
            created_at: String::new(),
        };
        let mut outbox = Outbox::new(None);
        start_splatoon(&mut lobby, &mut outbox).unwrap();
        lobby
    }

    fn tower_pool() -> Option<Vec<MapName>> {
        crate::catalog::Catalog::builtin().splatoon_map_pool("tower")
    }

    fn play_round(
        lobby: &mut Lobby,
        priority_conn: &str,
        other_conn: &str,
        mode: &str,
    ) -> Vec<MapName> {
        let mut outbox = Outbox::new(None);
        let first = lobby.rules.round_number == 1;
        let modes_size = lobby.splatoon().unwrap().modes_size;

        if modes_size == 4 {
            if first {
                let victim_a = lobby.splatoon().unwrap().active_modes[0].clone();
                apply_mode_ban(lobby, &mut outbox, priority_conn, &victim_a).unwrap();
                let victim_b = lobby
                    .splatoon()
                    .unwrap()
                    .active_modes
                    .iter()
                    .find(|m| m.as_str() != mode)
                    .cloned()
                    .unwrap();
                apply_mode_ban(lobby, &mut outbox, other_conn, &victim_b).unwrap();
                apply_mode_pick(
                    lobby,
                    &mut outbox,
                    priority_conn,
                    mode,
                    crate::catalog::Catalog::builtin().splatoon_map_pool(mode),
                )
                .unwrap();
            } else {
                let victim = lobby
                    .splatoon()
                    .unwrap()
                    .active_modes
                    .iter()
                    .find(|m| m.as_str() != mode)
                    .cloned()
                    .unwrap();
                apply_mode_ban(lobby, &mut outbox, priority_conn, &victim).unwrap();
                apply_mode_pick(
                    lobby,
                    &mut outbox,
                    other_conn,
                    mode,
                    crate::catalog::Catalog::builtin().splatoon_map_pool(mode),
                )
                .unwrap();
            }
        } else {
            apply_mode_pick(
                lobby,
                &mut outbox,
                priority_conn,
                mode,
                crate::catalog::Catalog::builtin().splatoon_map_pool(mode),
            )
            .unwrap();
        }

        let pool = lobby.rules.map_names.clone();
        if modes_size == 4 && !first {
            // winner bans three, loser picks
            apply_map_ban(lobby, &mut outbox, priority_conn, &pool[0]).unwrap();
            apply_map_ban(lobby, &mut outbox, priority_conn, &pool[1]).unwrap();
            apply_map_ban(lobby, &mut outbox, priority_conn, &pool[2]).unwrap();
            apply_map_pick(lobby, &mut outbox, other_conn, &pool[3]).unwrap();
        } else {
            apply_map_ban(lobby, &mut outbox, priority_conn, &pool[0]).unwrap();
            apply_map_ban(lobby, &mut outbox, priority_conn, &pool[1]).unwrap();
            apply_map_ban(lobby, &mut outbox, other_conn, &pool[2]).unwrap();
            apply_map_ban(lobby, &mut outbox, other_conn, &pool[3]).unwrap();
            apply_map_ban(lobby, &mut outbox, other_conn, &pool[4]).unwrap();
            apply_map_pick(lobby, &mut outbox, priority_conn, &pool[5]).unwrap();
        }
        pool
    }

    #[test]
    fn test_four_mode_first_round() {
        let mut lobby = splatoon_lobby(4);
        assert_eq!(
            lobby.splatoon().unwrap().priority_team.as_deref(),
            Some("A")
        );
        assert!(lobby.caps_of("c1").mode_ban);

        play_round(&mut lobby, "c1", "c2", "tower");

        // both members hold the report capability, nobody holds work
        assert!(lobby.caps_of("c1").report_winner);
        assert!(lobby.caps_of("c2").report_winner);
        assert!(!lobby.caps_of("c1").work);
        assert!(!lobby.caps_of("c2").work);

        let round = lobby.rules.round_number;
        let bans: Vec<_> = lobby
            .banned_maps
            .iter()
            .filter(|e| e.round == Some(round))
            .collect();
        assert_eq!(bans.len(), 5);
        assert_eq!(bans[0].team_name, "A");
        assert_eq!(bans[2].team_name, "B");
        assert_eq!(lobby.picked_maps.last().unwrap().team_name, "A");
    }

    #[test]
    fn test_priority_transfers_to_winner() {
        let mut lobby = splatoon_lobby(2);
        play_round(&mut lobby, "c1", "c2", "tower");

        let mut outbox = Outbox::new(None);
        propose_winner(&mut lobby, &mut outbox, "c1", "B").unwrap();
        confirm_winner(&mut lobby, &mut outbox, "c2", true).unwrap();

        assert_eq!(lobby.rules.round_number, 2);
        assert_eq!(lobby.rules.last_winner.as_deref(), Some("B"));
        assert_eq!(
            lobby.splatoon().unwrap().priority_team.as_deref(),
            Some("B")
        );
        assert_eq!(lobby.splatoon().unwrap().round_history.len(), 1);
        // round 2, two modes: B picks the mode directly
        assert!(lobby.caps_of("c2").mode_pick);
        // both modes are active again
        assert_eq!(lobby.splatoon().unwrap().active_modes.len(), 2);
    }

    #[test]
    fn test_round_two_two_modes_schedule() {
        let mut lobby = splatoon_lobby(2);
        play_round(&mut lobby, "c1", "c2", "tower");
        let mut outbox = Outbox::new(None);
        propose_winner(&mut lobby, &mut outbox, "c2", "B").unwrap();
        confirm_winner(&mut lobby, &mut outbox, "c1", true).unwrap();

        // winner B bans two, loser A bans three, B picks
        apply_mode_pick(&mut lobby, &mut outbox, "c2", "zones", {
            crate::catalog::Catalog::builtin().splatoon_map_pool("zones")
        })
        .unwrap();
        let pool = lobby.rules.map_names.clone();
        apply_map_ban(&mut lobby, &mut outbox, "c2", &pool[0]).unwrap();
        apply_map_ban(&mut lobby, &mut outbox, "c2", &pool[1]).unwrap();
        assert!(apply_map_ban(&mut lobby, &mut outbox, "c2", &pool[2]).is_err());
        apply_map_ban(&mut lobby, &mut outbox, "c1", &pool[2]).unwrap();
        apply_map_ban(&mut lobby, &mut outbox, "c1", &pool[3]).unwrap();
        apply_map_ban(&mut lobby, &mut outbox, "c1", &pool[4]).unwrap();
        apply_map_pick(&mut lobby, &mut outbox, "c2", &pool[5]).unwrap();

        assert_eq!(lobby.picked_maps.last().unwrap().team_name, "B");
    }

    #[test]
    fn test_four_mode_later_round_winner_bans_three() {
        let mut lobby = splatoon_lobby(4);
        play_round(&mut lobby, "c1", "c2", "tower");
        let mut outbox = Outbox::new(None);
        propose_winner(&mut lobby, &mut outbox, "c1", "A").unwrap();
        confirm_winner(&mut lobby, &mut outbox, "c2", true).unwrap();

        // round 2: priority (winner A) bans one mode, B picks
        assert!(lobby.caps_of("c1").mode_ban);
        play_round(&mut lobby, "c1", "c2", "zones");
        let round = lobby.rules.round_number;
        let bans: Vec<_> = lobby
            .banned_maps
            .iter()
            .filter(|e| e.round == Some(round))
            .collect();
        assert_eq!(bans.len(), 3);
        assert!(bans.iter().all(|b| b.team_name == "A"));
        assert_eq!(lobby.picked_maps.last().unwrap().team_name, "B");
    }

    #[test]
    fn test_winner_rejection_regrants_rejector_only() {
        let mut lobby = splatoon_lobby(2);
        play_round(&mut lobby, "c1", "c2", "tower");

        let mut outbox = Outbox::new(None);
        // B proposes "A wins"; A rejects
        propose_winner(&mut lobby, &mut outbox, "c2", "A").unwrap();
        confirm_winner(&mut lobby, &mut outbox, "c1", false).unwrap();

        assert!(lobby.caps_of("c1").report_winner);
        assert!(!lobby.caps_of("c2").report_winner);
        assert_eq!(lobby.rules.round_number, 1);
        assert!(lobby.splatoon().unwrap().pending_winner.is_none());

        // the reporter cannot confirm its own proposal
        propose_winner(&mut lobby, &mut outbox, "c1", "A").unwrap();
        assert!(confirm_winner(&mut lobby, &mut outbox, "c1", true).is_err());
    }

    #[test]
    fn test_maps_banned_last_round_are_free_again() {
        let mut lobby = splatoon_lobby(2);
        let pool = play_round(&mut lobby, "c1", "c2", "tower");
        let mut outbox = Outbox::new(None);
        propose_winner(&mut lobby, &mut outbox, "c1", "A").unwrap();
        confirm_winner(&mut lobby, &mut outbox, "c2", true).unwrap();

        // same mode again: every map of the pool is available once more
        apply_mode_pick(&mut lobby, &mut outbox, "c1", "tower", tower_pool()).unwrap();
        assert_eq!(lobby.available_maps().len(), pool.len());
        apply_map_ban(&mut lobby, &mut outbox, "c1", &pool[0]).unwrap();
    }
}
