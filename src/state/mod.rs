pub mod fps;
pub mod lobby;
pub mod splatoon;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::catalog::{self, Catalog};
use crate::protocol::{ModeInfo, LobbySummary, ServerEvent};
use crate::types::*;
use lobby::{FamilyState, Lobby};

const BROADCAST_CAPACITY: usize = 100;

pub const DEFAULT_CARD_COLORS: [&str; 4] = ["#1f2430", "#b63a3a", "#2b5fb0", "#2e7d5b"];

/// A registered WebSocket connection: its outbound FIFO queue, role,
/// and the lobbies it has joined (for the disconnect reaper).
pub struct ConnHandle {
    pub sender: mpsc::UnboundedSender<ServerEvent>,
    pub role: Role,
    pub joined: HashSet<LobbyId>,
    pub obs_view: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub lobbies: Arc<RwLock<HashMap<LobbyId, Lobby>>>,
    pub connections: Arc<RwLock<HashMap<ConnId, ConnHandle>>>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub card_colors: Arc<RwLock<Vec<String>>>,
    pub coin_flip_default: Arc<RwLock<bool>>,
    /// Lobby pinned to the OBS views room by the admin.
    pub obs_lobby: Arc<RwLock<Option<LobbyId>>>,
    /// Process-wide channel for events every client receives.
    pub broadcast: broadcast::Sender<ServerEvent>,
}

/// Delivery target for one outbound event.
enum Dest {
    Conn(ConnId),
    Conns(Vec<ConnId>),
    ObsRoom,
    All,
}

/// Events collected during a controller step and delivered after the
/// lobby lock is released. Per-destination order is preserved, which is
/// what guarantees `canWorkUpdated` lands before the capability events
/// that follow it.
pub struct Outbox {
    obs_pinned: Option<LobbyId>,
    items: Vec<(Dest, ServerEvent)>,
}

impl Outbox {
    pub fn new(obs_pinned: Option<LobbyId>) -> Self {
        Self {
            obs_pinned,
            items: Vec::new(),
        }
    }

    pub fn to_conn(&mut self, conn: impl Into<ConnId>, event: ServerEvent) {
        self.items.push((Dest::Conn(conn.into()), event));
    }

    pub fn to_conns(&mut self, conns: Vec<ConnId>, event: ServerEvent) {
        self.items.push((Dest::Conns(conns), event));
    }

    /// Broadcast to the lobby room (members and observers). Mirrored to
    /// the OBS room when this lobby is the pinned one.
    pub fn to_room(&mut self, lobby: &Lobby, event: ServerEvent) {
        if self.obs_pinned.as_deref() == Some(lobby.id.as_str()) {
            self.items.push((Dest::ObsRoom, event.clone()));
        }
        self.items.push((Dest::Conns(lobby.room_conns()), event));
    }

    pub fn to_obs(&mut self, event: ServerEvent) {
        self.items.push((Dest::ObsRoom, event));
    }

    pub fn to_all(&mut self, event: ServerEvent) {
        self.items.push((Dest::All, event));
    }
}

impl AppState {
    pub fn new() -> Self {
        let (broadcast_tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            lobbies: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            catalog: Arc::new(RwLock::new(Catalog::builtin())),
            card_colors: Arc::new(RwLock::new(
                DEFAULT_CARD_COLORS.iter().map(|s| s.to_string()).collect(),
            )),
            coin_flip_default: Arc::new(RwLock::new(
                std::env::var("COIN_FLIP_DEFAULT")
                    .map(|v| v != "0" && v != "false")
                    .unwrap_or(true),
            )),
            obs_lobby: Arc::new(RwLock::new(None)),
            broadcast: broadcast_tx,
        }
    }

    /// Register a connection and hand back its id and outbound queue.
    pub async fn register_connection(
        &self,
        role: Role,
    ) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = ulid::Ulid::new().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(
            conn_id.clone(),
            ConnHandle {
                sender: tx,
                role,
                joined: HashSet::new(),
                obs_view: false,
            },
        );
        (conn_id, rx)
    }

    pub async fn role_of(&self, conn_id: &str) -> Option<Role> {
        self.connections.read().await.get(conn_id).map(|h| h.role)
    }

    pub async fn mark_joined(&self, conn_id: &str, lobby_id: &str) {
        if let Some(handle) = self.connections.write().await.get_mut(conn_id) {
            handle.joined.insert(lobby_id.to_string());
        }
    }

    pub async fn mark_obs_view(&self, conn_id: &str) {
        if let Some(handle) = self.connections.write().await.get_mut(conn_id) {
            handle.obs_view = true;
        }
    }

    /// An outbox primed with the current OBS pin.
    pub async fn outbox(&self) -> Outbox {
        Outbox::new(self.obs_lobby.read().await.clone())
    }

    pub async fn send_to(&self, conn_id: &str, event: ServerEvent) {
        if let Some(handle) = self.connections.read().await.get(conn_id) {
            let _ = handle.sender.send(event);
        }
    }

    /// Deliver everything the controller step produced.
    pub async fn flush(&self, outbox: Outbox) {
        if outbox.items.is_empty() {
            return;
        }
        let connections = self.connections.read().await;
        for (dest, event) in outbox.items {
            match dest {
                Dest::Conn(conn) => {
                    if let Some(handle) = connections.get(&conn) {
                        let _ = handle.sender.send(event);
                    }
                }
                Dest::Conns(conns) => {
                    for conn in conns {
                        if let Some(handle) = connections.get(&conn) {
                            let _ = handle.sender.send(event.clone());
                        }
                    }
                }
                Dest::ObsRoom => {
                    for handle in connections.values().filter(|h| h.obs_view) {
                        let _ = handle.sender.send(event.clone());
                    }
                }
                Dest::All => {
                    let _ = self.broadcast.send(event);
                }
            }
        }
    }

    /// Idempotent insert: an existing lobby is returned untouched.
    /// Returns true when the lobby was actually created.
    pub async fn create_lobby(&self, lobby: Lobby) -> bool {
        let mut lobbies = self.lobbies.write().await;
        if lobbies.contains_key(&lobby.id) {
            return false;
        }
        tracing::info!(lobby = %lobby.id, family = ?lobby.game_family(), "lobby created");
        lobbies.insert(lobby.id.clone(), lobby);
        true
    }

    pub async fn delete_lobby(&self, lobby_id: &str) -> Option<Lobby> {
        self.lobbies.write().await.remove(lobby_id)
    }

    pub async fn lobby_summaries(&self) -> Vec<LobbySummary> {
        let lobbies = self.lobbies.read().await;
        let mut summaries: Vec<LobbySummary> = lobbies.values().map(|l| l.summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub async fn broadcast_lobbies_updated(&self) {
        let lobbies = self.lobby_summaries().await;
        let _ = self.broadcast.send(ServerEvent::LobbiesUpdated { lobbies });
    }

    /// Disconnect reaper: drop the connection from every lobby it
    /// joined, then garbage-collect empty non-admin lobbies.
    pub async fn disconnect(&self, conn_id: &str) {
        let handle = self.connections.write().await.remove(conn_id);
        let Some(handle) = handle else {
            return;
        };

        let mut outbox = self.outbox().await;
        let mut deleted = Vec::new();
        {
            let mut lobbies = self.lobbies.write().await;
            for lobby_id in &handle.joined {
                let Some(lobby) = lobbies.get_mut(lobby_id) else {
                    continue;
                };
                lobby.members.remove(conn_id);
                lobby.observers.remove(conn_id);
                lobby.team_names.retain(|(c, _)| c != conn_id);
                lobby.caps.remove(conn_id);

                if lobby.members.is_empty() && !lobby.rules.admin {
                    deleted.push(lobby_id.clone());
                } else {
                    outbox.to_room(
                        lobby,
                        ServerEvent::TeamNamesUpdated {
                            team_names: lobby.team_name_list(),
                        },
                    );
                }
            }
            for lobby_id in &deleted {
                if let Some(lobby) = lobbies.remove(lobby_id) {
                    tracing::info!(lobby = %lobby_id, "empty lobby reaped");
                    outbox.to_conns(
                        lobby.room_conns(),
                        ServerEvent::LobbyDeleted {
                            lobby_id: lobby_id.clone(),
                        },
                    );
                }
            }
        }

        if !deleted.is_empty() {
            let lobbies = self.lobby_summaries().await;
            outbox.to_all(ServerEvent::LobbiesUpdated { lobbies });
        }
        self.flush(outbox).await;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Update a connection's capability record and queue the wire events.
/// `canWorkUpdated` is always queued first so clients learn whose turn
/// it is before learning what the turn permits.
pub fn set_caps(lobby: &mut Lobby, outbox: &mut Outbox, conn: &str, caps: Capabilities) {
    let prev = lobby.caps_of(conn);
    if prev == caps {
        return;
    }
    lobby.caps.insert(conn.to_string(), caps);

    outbox.to_conn(conn, ServerEvent::CanWorkUpdated { flag: caps.work });
    if prev.ban != caps.ban {
        outbox.to_conn(conn, ServerEvent::CanBan { flag: caps.ban });
    }
    if prev.pick != caps.pick {
        outbox.to_conn(conn, ServerEvent::CanPick { flag: caps.pick });
    }
    if prev.mode_ban != caps.mode_ban {
        outbox.to_conn(conn, ServerEvent::CanModeBan { flag: caps.mode_ban });
    }
    if prev.mode_pick != caps.mode_pick {
        outbox.to_conn(conn, ServerEvent::CanModePick { flag: caps.mode_pick });
    }
    if prev.report_winner != caps.report_winner {
        outbox.to_conn(
            conn,
            ServerEvent::CanReportWinner {
                flag: caps.report_winner,
            },
        );
    }
}

/// Turn everything off for every registered team connection.
pub fn clear_all_caps(lobby: &mut Lobby, outbox: &mut Outbox) {
    for conn in lobby.team_conns() {
        set_caps(lobby, outbox, &conn, Capabilities::off());
    }
}

/// Record and broadcast a human-readable state message.
pub fn state_message(lobby: &mut Lobby, outbox: &mut Outbox, message: String) {
    lobby.last_state_message = Some(message.clone());
    outbox.to_room(lobby, ServerEvent::GameStateUpdated { message });
}

/// The full set of state-delta events describing a lobby, used for the
/// join replay, the OBS pin, and `play_obs`.
pub fn snapshot_events(lobby: &Lobby) -> Vec<ServerEvent> {
    let mut events = vec![ServerEvent::GameName {
        game_name: lobby.rules.game_name.clone(),
    }];

    match &lobby.family {
        FamilyState::Fps(fps) => {
            if let Some(settings) = lobby.fps_settings() {
                events.push(ServerEvent::FpsLobbySettings { settings });
            }
            events.push(ServerEvent::MapNames {
                map_names: lobby.rules.map_names.clone(),
            });
            if let Some(decider) = &fps.decider_map {
                events.push(ServerEvent::DeciderUpdated {
                    decider: decider.clone(),
                });
            }
        }
        FamilyState::Splatoon(splatoon) => {
            events.push(ServerEvent::ModesSizeUpdated {
                modes_size: splatoon.modes_size,
            });
            events.push(ServerEvent::ModesUpdated {
                modes: mode_infos(&splatoon.active_modes),
            });
            if let Some(mode) = &splatoon.picked_mode {
                events.push(ServerEvent::ModePicked {
                    mode: mode.clone(),
                    name: catalog::mode_translation(mode).to_string(),
                });
                events.push(ServerEvent::MapNames {
                    map_names: lobby.rules.map_names.clone(),
                });
            }
        }
    }

    events.push(ServerEvent::TeamNamesUpdated {
        team_names: lobby.team_name_list(),
    });
    events.push(ServerEvent::PickedUpdated {
        picked_maps: lobby.picked_maps.clone(),
    });
    events.push(ServerEvent::BannedUpdated {
        banned_maps: lobby.banned_maps.clone(),
    });
    if let Some(message) = &lobby.last_state_message {
        events.push(ServerEvent::GameStateUpdated {
            message: message.clone(),
        });
    }
    events
}

pub fn mode_infos(modes: &[ModeKey]) -> Vec<ModeInfo> {
    modes
        .iter()
        .map(|m| ModeInfo {
            mode: m.clone(),
            name: catalog::mode_translation(m).to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::{FpsState, Rules};

    fn make_lobby(id: &str, admin: bool) -> Lobby {
        Lobby {
            id: id.to_string(),
            members: HashSet::new(),
            observers: HashSet::new(),
            team_names: Vec::new(),
            caps: HashMap::new(),
            rules: Rules {
                admin,
                coin_flip: false,
                game_name: "cs2".to_string(),
                game_type: "bo3".to_string(),
                map_names: Vec::new(),
                last_winner: None,
                round_number: 1,
            },
            family: FamilyState::Fps(FpsState {
                game_type: FpsGameType::Bo3,
                knife_decider: false,
                pattern: catalog::fps_pattern(FpsGameType::Bo3),
                map_pool_size: 7,
                decider_map: None,
                pending_pick: None,
            }),
            picked_maps: Vec::new(),
            banned_maps: Vec::new(),
            game_step: 0,
            started: false,
            last_state_message: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_create_lobby_is_idempotent() {
        let state = AppState::new();
        assert!(state.create_lobby(make_lobby("L1", false)).await);

        let mut replay = make_lobby("L1", true);
        replay.rules.game_type = "bo5".to_string();
        assert!(!state.create_lobby(replay).await);

        // the original is untouched
        let lobbies = state.lobbies.read().await;
        assert_eq!(lobbies.get("L1").unwrap().rules.game_type, "bo3");
        assert!(!lobbies.get("L1").unwrap().rules.admin);
    }

    #[tokio::test]
    async fn test_reaper_deletes_empty_non_admin_lobby() {
        let state = AppState::new();
        let (conn, _rx) = state.register_connection(Role::Member).await;

        let mut lobby = make_lobby("L1", false);
        lobby.members.insert(conn.clone());
        lobby.team_names.push((conn.clone(), "Alpha".to_string()));
        state.create_lobby(lobby).await;
        state.mark_joined(&conn, "L1").await;

        state.disconnect(&conn).await;
        assert!(state.lobbies.read().await.get("L1").is_none());
    }

    #[tokio::test]
    async fn test_reaper_keeps_admin_lobby() {
        let state = AppState::new();
        let (conn, _rx) = state.register_connection(Role::Member).await;
        let (survivor, mut survivor_rx) = state.register_connection(Role::Member).await;

        let mut lobby = make_lobby("L1", true);
        lobby.members.insert(conn.clone());
        lobby.members.insert(survivor.clone());
        lobby.team_names.push((conn.clone(), "Alpha".to_string()));
        lobby
            .team_names
            .push((survivor.clone(), "Beta".to_string()));
        state.create_lobby(lobby).await;
        state.mark_joined(&conn, "L1").await;
        state.mark_joined(&survivor, "L1").await;

        state.disconnect(&conn).await;

        let lobbies = state.lobbies.read().await;
        let lobby = lobbies.get("L1").unwrap();
        assert_eq!(lobby.team_name_list(), vec!["Beta"]);

        // survivor saw the membership change
        let event = survivor_rx.recv().await.unwrap();
        match event {
            ServerEvent::TeamNamesUpdated { team_names } => {
                assert_eq!(team_names, vec!["Beta"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_caps_orders_work_before_specifics() {
        let state = AppState::new();
        let (conn, mut rx) = state.register_connection(Role::Member).await;
        let mut lobby = make_lobby("L1", false);
        lobby.members.insert(conn.clone());
        lobby.team_names.push((conn.clone(), "Alpha".to_string()));

        let mut outbox = Outbox::new(None);
        set_caps(&mut lobby, &mut outbox, &conn, Capabilities::ban_turn());
        state.flush(outbox).await;

        match rx.recv().await.unwrap() {
            ServerEvent::CanWorkUpdated { flag } => assert!(flag),
            other => panic!("expected canWorkUpdated first, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerEvent::CanBan { flag } => assert!(flag),
            other => panic!("expected canBan, got {:?}", other),
        }
    }
}
