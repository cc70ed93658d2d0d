//! Room lifecycle: membership, readiness, host election, and the coarse
//! `waiting -> countdown -> playing -> waiting` state machine.
//!
//! A [`RoomSession`] is one client's handle on one room. All coordination is
//! mediated by the replicated store: the session writes its own subtree and
//! derives every view of the room from subscription events consumed by a
//! single listener task, so store callbacks never interleave locally.

use indexmap::IndexMap;
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{SessionError, SessionResult};
use crate::game::GameSession;
use crate::model::{CurrentGame, Member, RoomMeta, RoomState, now_millis};
use crate::paths;
use crate::store::{PathEvent, SharedStore, Subscription};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 4;

/// Membership view ordered by join time.
pub type MemberMap = IndexMap<String, Member>;

/// One client's handle on one joined room.
pub struct RoomSession {
    store: SharedStore,
    config: SyncConfig,
    code: String,
    member_id: String,
    member_name: String,
    members: watch::Receiver<MemberMap>,
    state: watch::Receiver<RoomState>,
    countdown: watch::Receiver<u32>,
    current_game: watch::Receiver<CurrentGame>,
    is_host: watch::Receiver<bool>,
    listener: JoinHandle<()>,
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("code", &self.code)
            .field("member_id", &self.member_id)
            .field("member_name", &self.member_name)
            .finish_non_exhaustive()
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl RoomSession {
    /// Create a fresh room and join it as host.
    ///
    /// The generated code is not checked against existing rooms; the code
    /// space is large relative to the number of concurrent rooms.
    pub async fn create_room(
        store: SharedStore,
        config: SyncConfig,
        name: &str,
    ) -> SessionResult<Self> {
        let code = generate_room_code();
        Self::create_room_with_code(store, config, &code, name).await
    }

    /// Create a room under a caller-chosen code.
    pub async fn create_room_with_code(
        store: SharedStore,
        config: SyncConfig,
        code: &str,
        name: &str,
    ) -> SessionResult<Self> {
        let name = validate_name(name)?;
        let code = normalize_code(code)?;
        let member_id = Uuid::new_v4().to_string();
        let joined_at = now_millis();

        let meta = RoomMeta {
            code: code.clone(),
            host: member_id.clone(),
            created_at: joined_at,
            state: RoomState::Waiting,
        };
        store
            .write(
                &paths::room(&code),
                json!({
                    "meta": serde_json::to_value(&meta)?,
                    "currentGame": serde_json::to_value(CurrentGame::default())?,
                }),
            )
            .await?;

        let member = Member {
            name: name.clone(),
            is_ready: false,
            is_host: true,
            joined_at,
        };
        let member_path = paths::room_member(&code, &member_id);
        store
            .write(&member_path, serde_json::to_value(&member)?)
            .await?;
        store.on_disconnect_remove(&member_path).await?;

        info!(code = %code, member = %member_id, "room created");

        let mut seed = MemberMap::new();
        seed.insert(member_id.clone(), member);
        Self::attach(
            store,
            config,
            code,
            member_id,
            name,
            true,
            seed,
            RoomState::Waiting,
            CurrentGame::default(),
        )
        .await
    }

    /// Join an existing room as a regular member.
    pub async fn join_room(
        store: SharedStore,
        config: SyncConfig,
        code: &str,
        name: &str,
    ) -> SessionResult<Self> {
        let name = validate_name(name)?;
        let code = normalize_code(code)?;

        let snapshot = store
            .read(&paths::room(&code))
            .await?
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        let meta: RoomMeta =
            serde_json::from_value(snapshot.get("meta").cloned().unwrap_or(Value::Null))?;
        if meta.state == RoomState::Playing {
            return Err(SessionError::GameInProgress);
        }

        let member_id = Uuid::new_v4().to_string();
        let member = Member {
            name: name.clone(),
            is_ready: false,
            is_host: false,
            joined_at: now_millis(),
        };
        let member_path = paths::room_member(&code, &member_id);
        store
            .write(&member_path, serde_json::to_value(&member)?)
            .await?;
        store.on_disconnect_remove(&member_path).await?;

        info!(code = %code, member = %member_id, "joined room");

        let mut seed = parse_members(snapshot.get("players"));
        seed.insert(member_id.clone(), member);
        seed.sort_by(|ka, a, kb, b| (a.joined_at, ka).cmp(&(b.joined_at, kb)));
        let game = snapshot
            .get("currentGame")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Self::attach(
            store, config, code, member_id, name, false, seed, meta.state, game,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn attach(
        store: SharedStore,
        config: SyncConfig,
        code: String,
        member_id: String,
        member_name: String,
        is_host: bool,
        seed_members: MemberMap,
        seed_state: RoomState,
        seed_game: CurrentGame,
    ) -> SessionResult<Self> {
        let players_sub = store.subscribe(&paths::room_players(&code)).await?;
        let meta_sub = store.subscribe(&paths::room_meta(&code)).await?;
        let countdown_sub = store.subscribe(&paths::room_countdown(&code)).await?;
        let game_sub = store.subscribe(&paths::room_current_game(&code)).await?;

        let (members_tx, members_rx) = watch::channel(seed_members);
        let (state_tx, state_rx) = watch::channel(seed_state);
        let (countdown_tx, countdown_rx) = watch::channel(0);
        let (game_tx, game_rx) = watch::channel(seed_game);
        let (host_tx, host_rx) = watch::channel(is_host);

        let ctx = RoomListener {
            store: store.clone(),
            code: code.clone(),
            member_id: member_id.clone(),
            members: members_tx,
            state: state_tx,
            countdown: countdown_tx,
            current_game: game_tx,
            is_host: host_tx,
        };
        let listener = tokio::spawn(run_room_listener(
            ctx,
            players_sub,
            meta_sub,
            countdown_sub,
            game_sub,
        ));

        Ok(Self {
            store,
            config,
            code,
            member_id,
            member_name,
            members: members_rx,
            state: state_rx,
            countdown: countdown_rx,
            current_game: game_rx,
            is_host: host_rx,
            listener,
        })
    }

    /// Flip this member's readiness flag.
    pub async fn toggle_ready(&self) -> SessionResult<()> {
        let ready = self
            .members
            .borrow()
            .get(&self.member_id)
            .map(|m| m.is_ready)
            .unwrap_or(false);
        self.store
            .update(
                &paths::room_member(&self.code, &self.member_id),
                vec![("isReady".into(), Value::Bool(!ready))],
            )
            .await?;
        Ok(())
    }

    /// Host-only: run the room countdown and move the room into play.
    ///
    /// The countdown writes 5..=0 once per second; between decrements the live
    /// room state is re-checked and the sequence aborts early if the state
    /// changed out from under it (room abandoned, host replaced).
    pub async fn start_game(&self, game_type: &str) -> SessionResult<()> {
        if !*self.is_host.borrow() {
            return Err(SessionError::Unauthorized(
                "only the host may start the game".into(),
            ));
        }
        {
            let members = self.members.borrow();
            if members.len() > 1 && members.values().any(|m| !m.is_host && !m.is_ready) {
                return Err(SessionError::PlayersNotReady);
            }
        }

        self.store
            .update(
                &paths::room_meta(&self.code),
                vec![("state".into(), json!(RoomState::Countdown))],
            )
            .await?;
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == RoomState::Countdown)
            .await
            .map_err(|_| SessionError::InvalidState("room listener stopped".into()))?;

        for step in (0..=self.config.room_countdown_from).rev() {
            if *state.borrow() != RoomState::Countdown {
                info!(code = %self.code, step, "room countdown aborted; state changed");
                return Ok(());
            }
            self.store
                .write(&paths::room_countdown(&self.code), json!(step))
                .await?;
            if step > 0 {
                sleep(self.config.countdown_step).await;
            }
        }

        // Phase flip and game pointer land in one batch so no observer sees a
        // playing room without a game type.
        self.store
            .update(
                &paths::room(&self.code),
                vec![
                    ("meta/state".into(), json!(RoomState::Playing)),
                    ("currentGame/type".into(), json!(game_type)),
                    ("currentGame/state".into(), json!("starting")),
                    ("currentGame/data".into(), Value::Null),
                    ("countdown".into(), json!(0)),
                ],
            )
            .await?;
        info!(code = %self.code, game_type, "game started");
        Ok(())
    }

    /// Passthrough write into the active game's `state` (and `data` when
    /// given). Intended for the host; ownership is trust-based.
    pub async fn update_game_state(&self, state: &str, data: Option<Value>) -> SessionResult<()> {
        let mut entries = vec![("state".into(), json!(state))];
        if let Some(data) = data {
            entries.push(("data".into(), data));
        }
        self.store
            .update(&paths::room_current_game(&self.code), entries)
            .await?;
        Ok(())
    }

    /// Passthrough write into the active game's `data` slot.
    pub async fn update_game_data(&self, data: Value) -> SessionResult<()> {
        self.store
            .write(&paths::room_game_data(&self.code), data)
            .await?;
        Ok(())
    }

    /// Return the room to the waiting state and clear the active game.
    ///
    /// Every non-host member's readiness is reset; hosts count as always
    /// ready. The whole reset is one batched update.
    pub async fn end_game(&self) -> SessionResult<()> {
        let members = self.members.borrow().clone();
        let mut entries: Vec<(String, Value)> = members
            .iter()
            .map(|(id, m)| (format!("players/{id}/isReady"), Value::Bool(m.is_host)))
            .collect();
        entries.push(("meta/state".into(), json!(RoomState::Waiting)));
        entries.push(("currentGame/type".into(), Value::Null));
        entries.push(("currentGame/state".into(), Value::Null));
        entries.push(("currentGame/data".into(), Value::Null));
        self.store.update(&paths::room(&self.code), entries).await?;
        self.store.remove(&paths::game_doc(&self.code)).await?;
        info!(code = %self.code, "game ended; room back to waiting");
        Ok(())
    }

    /// Leave the room, deleting it when this was the last member.
    pub async fn leave_room(self) -> SessionResult<()> {
        self.listener.abort();
        let remaining = self.members.borrow().len();
        self.store
            .remove(&paths::room_member(&self.code, &self.member_id))
            .await?;
        if remaining <= 1 {
            self.store.remove(&paths::room(&self.code)).await?;
            info!(code = %self.code, "last member left; room deleted");
        } else {
            info!(code = %self.code, member = %self.member_id, "left room");
        }
        Ok(())
    }

    /// Open the game document for the room's active game.
    pub async fn init_game(&self) -> SessionResult<GameSession> {
        GameSession::init(
            self.store.clone(),
            self.config.clone(),
            self.code.clone(),
            self.member_id.clone(),
            self.member_name.clone(),
            self.is_host.clone(),
        )
        .await
    }

    /// The room's join code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// This client's session-scoped member id.
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// This client's display name.
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    /// Current membership ordered by join time.
    pub fn members(&self) -> MemberMap {
        self.members.borrow().clone()
    }

    /// Current coarse room state.
    pub fn room_state(&self) -> RoomState {
        *self.state.borrow()
    }

    /// Latest observed countdown value.
    pub fn countdown(&self) -> u32 {
        *self.countdown.borrow()
    }

    /// Whether this client currently holds the host role.
    pub fn is_host(&self) -> bool {
        *self.is_host.borrow()
    }

    /// The active game pointer.
    pub fn current_game(&self) -> CurrentGame {
        self.current_game.borrow().clone()
    }

    /// True when every member is ready (hosts count as ready).
    pub fn all_ready(&self) -> bool {
        let members = self.members.borrow();
        !members.is_empty() && members.values().all(|m| m.is_host || m.is_ready)
    }

    /// Watch the membership view.
    pub fn members_watch(&self) -> watch::Receiver<MemberMap> {
        self.members.clone()
    }

    /// Watch the coarse room state.
    pub fn state_watch(&self) -> watch::Receiver<RoomState> {
        self.state.clone()
    }

    /// Watch the countdown value.
    pub fn countdown_watch(&self) -> watch::Receiver<u32> {
        self.countdown.clone()
    }

    /// Watch the active game pointer.
    pub fn current_game_watch(&self) -> watch::Receiver<CurrentGame> {
        self.current_game.clone()
    }

    /// Watch the host flag.
    pub fn host_watch(&self) -> watch::Receiver<bool> {
        self.is_host.clone()
    }
}

struct RoomListener {
    store: SharedStore,
    code: String,
    member_id: String,
    members: watch::Sender<MemberMap>,
    state: watch::Sender<RoomState>,
    countdown: watch::Sender<u32>,
    current_game: watch::Sender<CurrentGame>,
    is_host: watch::Sender<bool>,
}

async fn run_room_listener(
    mut ctx: RoomListener,
    mut players_sub: Subscription,
    mut meta_sub: Subscription,
    mut countdown_sub: Subscription,
    mut game_sub: Subscription,
) {
    loop {
        tokio::select! {
            event = players_sub.next() => match event {
                Some(event) => ctx.on_players(event).await,
                None => break,
            },
            event = meta_sub.next() => match event {
                Some(event) => ctx.on_meta(event),
                None => break,
            },
            event = countdown_sub.next() => match event {
                Some(event) => ctx.on_countdown(event),
                None => break,
            },
            event = game_sub.next() => match event {
                Some(event) => ctx.on_game(event),
                None => break,
            },
        }
    }
    debug!(code = %ctx.code, "room listener stopped");
}

impl RoomListener {
    async fn on_players(&mut self, event: PathEvent) {
        let members = parse_members(event.value.as_ref());
        let _ = self.members.send(members.clone());

        // Host election: every client computes the same successor locally and
        // only the one whose own id wins performs the promotion write.
        if members.is_empty() || members.values().any(|m| m.is_host) {
            return;
        }
        let Some((winner, _)) = members.first() else {
            return;
        };
        if winner != &self.member_id {
            return;
        }

        info!(code = %self.code, member = %self.member_id, "no host left; promoting self");
        let entries = vec![
            (
                format!("players/{}/isHost", self.member_id),
                Value::Bool(true),
            ),
            (
                "meta/host".to_string(),
                Value::String(self.member_id.clone()),
            ),
        ];
        if let Err(err) = self.store.update(&paths::room(&self.code), entries).await {
            warn!(code = %self.code, error = %err, "host promotion write failed");
        }
        let _ = self.is_host.send(true);
    }

    fn on_meta(&mut self, event: PathEvent) {
        let Some(meta) = event
            .value
            .and_then(|v| serde_json::from_value::<RoomMeta>(v).ok())
        else {
            return;
        };
        let _ = self.state.send(meta.state);
        if meta.host == self.member_id {
            let _ = self.is_host.send(true);
        }
    }

    fn on_countdown(&mut self, event: PathEvent) {
        let value = event.value.and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let _ = self.countdown.send(value);
    }

    fn on_game(&mut self, event: PathEvent) {
        let game = event
            .value
            .and_then(|v| serde_json::from_value::<CurrentGame>(v).ok())
            .unwrap_or_default();
        let _ = self.current_game.send(game);
    }
}

/// Parse the players subtree into a membership map ordered by join time.
fn parse_members(value: Option<&Value>) -> MemberMap {
    let Some(Value::Object(map)) = value else {
        return MemberMap::new();
    };
    let mut entries: Vec<(String, Member)> = map
        .iter()
        .filter_map(|(id, raw)| {
            serde_json::from_value::<Member>(raw.clone())
                .ok()
                .map(|member| (id.clone(), member))
        })
        .collect();
    entries.sort_by(|a, b| (a.1.joined_at, &a.0).cmp(&(b.1.joined_at, &b.0)));
    entries.into_iter().collect()
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[index] as char
        })
        .collect()
}

fn validate_name(name: &str) -> SessionResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::Validation("name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn normalize_code(code: &str) -> SessionResult<String> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(SessionError::Validation(
            "room code must not be empty".into(),
        ));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SessionError::Validation(format!(
            "room code `{code}` contains invalid characters"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_codes_are_uppercase_alphanumeric() {
        for _ in 0..64 {
            let code = generate_room_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn code_normalization_uppercases_and_rejects_junk() {
        assert_eq!(normalize_code(" ab12 ").unwrap(), "AB12");
        assert!(matches!(
            normalize_code(""),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            normalize_code("a b"),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn members_are_ordered_by_join_time() {
        let value = json!({
            "zz": {"name": "late", "isReady": false, "isHost": false, "joinedAt": 30},
            "aa": {"name": "early", "isReady": false, "isHost": true, "joinedAt": 10},
            "mm": {"name": "middle", "isReady": true, "isHost": false, "joinedAt": 20},
        });
        let members = parse_members(Some(&value));
        let ids: Vec<&String> = members.keys().collect();
        assert_eq!(ids, ["aa", "mm", "zz"]);
    }

    #[test]
    fn unparseable_players_are_skipped() {
        let value = json!({
            "ok": {"name": "fine", "isReady": false, "isHost": true, "joinedAt": 1},
            "bad": "not a member",
        });
        let members = parse_members(Some(&value));
        assert_eq!(members.len(), 1);
        assert!(members.contains_key("ok"));
    }
}
