//! Replicated document model.
//!
//! Every struct here mirrors one subtree of the store path schema and is the
//! typed form of what loosely-typed clients read and write at that path. Wire
//! names are camelCase to match the path layout in [`crate::paths`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse room state stored at `rooms/{code}/meta/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    /// Lobby: members join and toggle readiness.
    #[default]
    Waiting,
    /// The host is running the pre-game countdown.
    Countdown,
    /// A game is active; joins are rejected.
    Playing,
}

/// Phase of the active game, stored at `game/{code}/phase`.
///
/// An absent game document reads as [`GamePhase::Lobby`]. The forward
/// transitions are owned by [`crate::game::GameSession`]; the only way back to
/// lobby is the room host ending the game, which deletes the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    /// No game document exists yet.
    #[default]
    Lobby,
    /// Members pick cars or register as spectators.
    CarSelect,
    /// Race countdown is running.
    Countdown,
    /// The race is live.
    Racing,
    /// Final standings are shown.
    Result,
}

/// Role a room member holds inside the game document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Drives a car and is simulated locally.
    Racer,
    /// Watches and may use the chat.
    #[default]
    Spectator,
}

/// Room metadata at `rooms/{code}/meta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    /// The short join code, stored redundantly for display.
    pub code: String,
    /// Member id of the current host.
    pub host: String,
    /// Unix millis at room creation.
    pub created_at: u64,
    /// Coarse room state.
    pub state: RoomState,
}

/// One member under `rooms/{code}/players/{memberId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Display name chosen at join time.
    pub name: String,
    /// Readiness flag; hosts count as always ready.
    pub is_ready: bool,
    /// Host flag; exactly one member should carry it once election converges.
    pub is_host: bool,
    /// Unix millis at join time; drives the deterministic host election order.
    pub joined_at: u64,
}

/// Pointer to the room's active game at `rooms/{code}/currentGame`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGame {
    /// Kind of game being played, `None` while waiting.
    #[serde(rename = "type")]
    pub game_type: Option<String>,
    /// Free-form game state label written by the host.
    pub state: Option<String>,
    /// Opaque game payload.
    pub data: Option<Value>,
}

/// A member's registration inside the game document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSlot {
    /// Chosen car id, `None` until one is picked.
    pub car: Option<String>,
    /// Racer or spectator.
    #[serde(default)]
    pub role: Role,
}

/// Spectator registration under `game/{code}/spectators/{memberId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectator {
    /// Display name.
    pub name: String,
    /// Optional team label echoed into chat entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

/// One racer's replicated position under `raceData/positions/{memberId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RacePosition {
    /// Horizontal position on the playfield.
    pub x: f64,
    /// Vertical position on the playfield.
    pub y: f64,
    /// Heading in degrees.
    pub angle: f64,
    /// Completed laps.
    #[serde(default)]
    pub lap: u32,
    /// Index of the next expected checkpoint.
    #[serde(default)]
    pub checkpoint: u32,
    /// Current scalar speed.
    #[serde(default)]
    pub speed: f64,
    /// Set once the racer crossed the final lap.
    #[serde(default)]
    pub finished: bool,
    /// Elapsed race millis at finish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<u64>,
    /// Attacker id of a pending, not yet absorbed hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_by: Option<String>,
}

/// A placed trap in the shared trap list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trap {
    /// Trap kind, currently always `banana`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Member id of the racer who dropped it.
    pub placed_by: String,
}

/// One chat entry keyed by its send timestamp under `game/{code}/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// Sender's member id.
    pub member_id: String,
    /// Sender's display name.
    pub name: String,
    /// Message body.
    pub message: String,
    /// Sender's team, when spectating for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Unix millis at send time.
    pub timestamp: u64,
}

/// Shared race state under `game/{code}/raceData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceData {
    /// Per-racer replicated positions.
    #[serde(default)]
    pub positions: IndexMap<String, RacePosition>,
    /// Reserved item list, kept for schema compatibility.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Traps placed on the track.
    #[serde(default)]
    pub traps: Vec<Trap>,
    /// Member ids in first-finish-first order, duplicate-free.
    #[serde(default)]
    pub finish_order: Vec<String>,
    /// Unix millis when the race went live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
}

/// The whole game document at `game/{code}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDoc {
    /// Current game phase.
    #[serde(default)]
    pub phase: GamePhase,
    /// Registered players keyed by member id.
    #[serde(default)]
    pub players: IndexMap<String, PlayerSlot>,
    /// Registered spectators keyed by member id.
    #[serde(default)]
    pub spectators: IndexMap<String, Spectator>,
    /// Live countdown value during the countdown phase.
    #[serde(default)]
    pub countdown: u32,
    /// Shared race state.
    #[serde(default)]
    pub race_data: RaceData,
    /// Chat entries keyed by send-time millis.
    #[serde(default)]
    pub chat: BTreeMap<String, ChatEntry>,
}

/// Current wall-clock time as unix millis, the timestamp unit of the tree.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enums_use_the_wire_strings() {
        assert_eq!(json!(RoomState::Waiting), json!("waiting"));
        assert_eq!(json!(GamePhase::CarSelect), json!("carSelect"));
        assert_eq!(json!(Role::Racer), json!("racer"));
    }

    #[test]
    fn member_round_trips_with_camel_case_fields() {
        let raw = json!({
            "name": "dana",
            "isReady": true,
            "isHost": false,
            "joinedAt": 1700000000000u64,
        });
        let member: Member = serde_json::from_value(raw.clone()).unwrap();
        assert!(member.is_ready);
        assert_eq!(json!(member), raw);
    }

    #[test]
    fn game_doc_tolerates_missing_sections() {
        let doc: GameDoc = serde_json::from_value(json!({"phase": "racing"})).unwrap();
        assert_eq!(doc.phase, GamePhase::Racing);
        assert!(doc.players.is_empty());
        assert!(doc.race_data.finish_order.is_empty());
    }

    #[test]
    fn absent_document_reads_as_lobby() {
        let doc = GameDoc::default();
        assert_eq!(doc.phase, GamePhase::Lobby);
    }
}
