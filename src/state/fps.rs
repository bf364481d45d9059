//! FPS turn controller: bans, the startPick/pick side-selection pair,
//! and decider resolution.
//!
//! Every function validates before mutating and returns `Err` for
//! actions that must be dropped silently; the dispatch layer logs the
//! reason at debug level and emits nothing.

use rand::Rng;

use crate::catalog::FPS_PATTERN_LEN;
use crate::protocol::{BannedEntry, PickedEntry, ServerEvent};
use crate::state::lobby::{Lobby, PendingPick};
use crate::state::{clear_all_caps, set_caps, state_message, Outbox};
use crate::types::*;

/// Begin the ceremony: decide the first actor (coin flip or join
/// order), emit the start cue, grant the first capability.
pub fn start_fps(lobby: &mut Lobby, outbox: &mut Outbox) -> Result<(), String> {
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
    let first = conns[first_idx].clone();
    let first_team = lobby.team_of(&first).unwrap_or_default();

    lobby.started = true;
    if lobby.rules.coin_flip {
        outbox.to_room(
            lobby,
            ServerEvent::CoinFlipUpdated {
                coin_flip: true,
                first_team: Some(first_team),
            },
        );
    } else {
        outbox.to_room(lobby, ServerEvent::StartWithoutCoin { first_team });
    }

    grant_turn(lobby, outbox, first)
}

/// Give the pattern-dictated capability to `conn`, or resolve the knife
/// decider if that is what the pattern says next.
fn grant_turn(lobby: &mut Lobby, outbox: &mut Outbox, conn: ConnId) -> Result<(), String> {
    let fps = lobby.fps().ok_or("not an fps lobby")?;
    let token = fps.pattern[lobby.game_step];
    let knife = fps.knife_decider;
    let team = lobby.team_of(&conn).unwrap_or_default();

    // never two holders at once
    if let Some(other) = lobby.other_member(&conn) {
        set_caps(lobby, outbox, &other, Capabilities::off());
    }

    match token {
        VetoAction::Ban => {
            set_caps(lobby, outbox, &conn, Capabilities::ban_turn());
            outbox.to_conn(
                conn,
                ServerEvent::AvailableMaps {
                    maps: lobby.available_maps(),
                },
            );
            state_message(lobby, outbox, format!("Команда «{}» банит карту", team));
        }
        VetoAction::Pick => {
            set_caps(lobby, outbox, &conn, Capabilities::pick_turn());
            outbox.to_conn(
                conn,
                ServerEvent::AvailableMaps {
                    maps: lobby.available_maps(),
                },
            );
            state_message(lobby, outbox, format!("Команда «{}» выбирает карту", team));
        }
        VetoAction::Decider => {
            if knife {
                return resolve_knife_decider(lobby, outbox);
            }
            set_caps(lobby, outbox, &conn, Capabilities::pick_turn());
            outbox.to_conn(
                conn,
                ServerEvent::AvailableMaps {
                    maps: lobby.available_maps(),
                },
            );
            state_message(lobby, outbox, format!("Команда «{}» выбирает десайдер", team));
        }
    }
    Ok(())
}

/// Move the cursor onward after a consumed pattern entry. The next
/// actor alternates relative to whoever acted last.
fn advance(lobby: &mut Lobby, outbox: &mut Outbox, last_actor: ConnId) -> Result<(), String> {
    if lobby.game_step >= FPS_PATTERN_LEN {
        clear_all_caps(lobby, outbox);
        outbox.to_room(lobby, ServerEvent::EndPick);
        return Ok(());
    }
    let next = lobby.other_member(&last_actor).unwrap_or(last_actor);
    grant_turn(lobby, outbox, next)
}

pub fn apply_ban(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    map: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).ban {
        return Err("connection cannot ban now".to_string());
    }
    let fps = lobby.fps().ok_or("not an fps lobby")?;
    if fps.pattern[lobby.game_step] != VetoAction::Ban {
        return Err("pattern does not expect a ban".to_string());
    }
    if !lobby.available_maps().iter().any(|m| m == map) {
        return Err(format!("map {} is not available", map));
    }

    let team = lobby.team_of(conn).ok_or("connection has no team")?;
    lobby.banned_maps.push(BannedEntry {
        map: map.to_string(),
        team_name: team,
        round: None,
    });
    lobby.game_step += 1;
    outbox.to_room(
        lobby,
        ServerEvent::BannedUpdated {
            banned_maps: lobby.banned_maps.clone(),
        },
    );
    advance(lobby, outbox, conn.to_string())
}

/// BO3/BO5 map nomination: the picking team names the map, the side
/// choice moves to the opposite team.
pub fn apply_start_pick(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    map: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).pick {
        return Err("connection cannot pick now".to_string());
    }
    let fps = lobby.fps().ok_or("not an fps lobby")?;
    if fps.game_type == FpsGameType::Bo1 {
        return Err("bo1 picks the side directly".to_string());
    }
    if fps.pending_pick.is_some() {
        return Err("a pick is already pending".to_string());
    }
    if fps.pattern[lobby.game_step] != VetoAction::Pick {
        return Err("pattern does not expect a pick".to_string());
    }
    if !lobby.available_maps().iter().any(|m| m == map) {
        return Err(format!("map {} is not available", map));
    }

    let team = lobby.team_of(conn).ok_or("connection has no team")?;
    let other = lobby
        .other_member(conn)
        .ok_or("no opposing team for side selection")?;
    let other_team = lobby.team_of(&other).unwrap_or_default();

    if let Some(fps) = lobby.fps_mut() {
        fps.pending_pick = Some(PendingPick {
            map: map.to_string(),
            team_name: team.clone(),
            conn: conn.to_string(),
        });
    }

    set_caps(lobby, outbox, conn, Capabilities::off());
    set_caps(lobby, outbox, &other, Capabilities::pick_turn());
    outbox.to_room(
        lobby,
        ServerEvent::BackendStartPick {
            map: map.to_string(),
            team_name: team,
        },
    );
    state_message(
        lobby,
        outbox,
        format!("Команда «{}» выбирает сторону на карте {}", other_team, map),
    );
    Ok(())
}

pub fn apply_pick(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    map: &str,
    side_raw: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).pick {
        return Err("connection cannot pick now".to_string());
    }
    let side = normalize_side(side_raw).ok_or_else(|| format!("bad side {}", side_raw))?;
    let sender_team = lobby.team_of(conn).ok_or("connection has no team")?;

    let fps = lobby.fps().ok_or("not an fps lobby")?;
    let token = fps.pattern[lobby.game_step];
    let has_pending = fps.pending_pick.is_some();

    let (entry, last_actor, is_decider) = if has_pending {
        let pending = fps.pending_pick.clone().ok_or("no pending pick")?;
        if pending.map != map {
            return Err("side chosen for a different map".to_string());
        }
        (
            PickedEntry {
                map: map.to_string(),
                team_name: pending.team_name,
                side: Some(side.to_string()),
                side_team_name: Some(sender_team),
                round: None,
            },
            pending.conn,
            false,
        )
    } else {
        if token != VetoAction::Pick && token != VetoAction::Decider {
            return Err("pattern does not expect a pick".to_string());
        }
        if !lobby.available_maps().iter().any(|m| m == map) {
            return Err(format!("map {} is not available", map));
        }
        (
            PickedEntry {
                map: map.to_string(),
                team_name: sender_team.clone(),
                side: Some(side.to_string()),
                side_team_name: Some(sender_team),
                round: None,
            },
            conn.to_string(),
            token == VetoAction::Decider,
        )
    };

    if let Some(fps) = lobby.fps_mut() {
        fps.pending_pick = None;
        if is_decider {
            fps.decider_map = Some(entry.clone());
        }
    }
    lobby.picked_maps.push(entry.clone());
    lobby.game_step += 1;

    outbox.to_room(
        lobby,
        ServerEvent::PickedUpdated {
            picked_maps: lobby.picked_maps.clone(),
        },
    );
    if is_decider {
        outbox.to_room(lobby, ServerEvent::DeciderUpdated { decider: entry });
        state_message(lobby, outbox, format!("Десайдер — {}", map));
    } else {
        state_message(
            lobby,
            outbox,
            format!(
                "Команда «{}» выбрала карту {} ({})",
                entry.team_name,
                map,
                side_display(side)
            ),
        );
    }
    advance(lobby, outbox, last_actor)
}

/// Decider pick without an explicit side: the map is settled by an
/// in-game knife round.
pub fn apply_decider(
    lobby: &mut Lobby,
    outbox: &mut Outbox,
    conn: &str,
    map: &str,
) -> Result<(), String> {
    if !lobby.caps_of(conn).pick {
        return Err("connection cannot pick now".to_string());
    }
    let fps = lobby.fps().ok_or("not an fps lobby")?;
    if fps.pattern[lobby.game_step] != VetoAction::Decider {
        return Err("pattern does not expect a decider".to_string());
    }
    if fps.knife_decider {
        return Err("knife decider resolves automatically".to_string());
    }
    if !lobby.available_maps().iter().any(|m| m == map) {
        return Err(format!("map {} is not available", map));
    }

    let team = lobby.team_of(conn).ok_or("connection has no team")?;
    let entry = PickedEntry {
        map: map.to_string(),
        team_name: team,
        side: Some(SIDE_KNIFE.to_string()),
        side_team_name: None,
        round: None,
    };
    if let Some(fps) = lobby.fps_mut() {
        fps.decider_map = Some(entry.clone());
    }
    lobby.picked_maps.push(entry.clone());
    lobby.game_step += 1;

    outbox.to_room(
        lobby,
        ServerEvent::PickedUpdated {
            picked_maps: lobby.picked_maps.clone(),
        },
    );
    outbox.to_room(lobby, ServerEvent::DeciderUpdated { decider: entry });
    state_message(lobby, outbox, format!("Десайдер — {}", map));
    advance(lobby, outbox, conn.to_string())
}

/// With the knife decider enabled the last map is not picked by anyone:
/// the single map absent from picks and bans is appended with the
/// DECIDER side and empty team names.
fn resolve_knife_decider(lobby: &mut Lobby, outbox: &mut Outbox) -> Result<(), String> {
    let map = lobby
        .remaining_map()
        .ok_or("knife decider needs exactly one remaining map")?;
    let entry = PickedEntry {
        map: map.clone(),
        team_name: String::new(),
        side: Some(SIDE_DECIDER.to_string()),
        side_team_name: None,
        round: None,
    };
    if let Some(fps) = lobby.fps_mut() {
        fps.decider_map = Some(entry.clone());
    }
    lobby.picked_maps.push(entry.clone());
    lobby.game_step += 1;

    outbox.to_room(
        lobby,
        ServerEvent::PickedUpdated {
            picked_maps: lobby.picked_maps.clone(),
        },
    );
    outbox.to_room(lobby, ServerEvent::DeciderUpdated { decider: entry });
    state_message(lobby, outbox, format!("Десайдер — {}", map));

    clear_all_caps(lobby, outbox);
    if lobby.game_step >= FPS_PATTERN_LEN {
        outbox.to_room(lobby, ServerEvent::EndPick);
    }
    Ok(())
}
