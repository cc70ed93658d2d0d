//! The per-room game document: car selection, spectators, the race countdown,
//! and chat.
//!
//! A [`GameSession`] is one client's handle on the room's game document at
//! `game/{code}`. The document's phase moves strictly forward
//! (`carSelect -> countdown -> racing -> result`); returning to the lobby is
//! the room host ending the game, which deletes the document.

use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::content::{self, TRACK};
use crate::error::{SessionError, SessionResult};
use crate::model::{
    ChatEntry, GameDoc, GamePhase, PlayerSlot, RaceData, RacePosition, Role, Spectator, now_millis,
};
use crate::paths;
use crate::race::RaceSimulator;
use crate::store::{SharedStore, Subscription};

/// Validate a forward phase transition of the game document.
///
/// Only one edge leaves each phase; everything else is a protocol error. The
/// `result -> lobby` edge does not exist here: it is the room ending the game.
pub(crate) fn check_phase_transition(from: GamePhase, to: GamePhase) -> SessionResult<()> {
    let valid = matches!(
        (from, to),
        (GamePhase::Lobby, GamePhase::CarSelect)
            | (GamePhase::CarSelect, GamePhase::Countdown)
            | (GamePhase::Countdown, GamePhase::Racing)
            | (GamePhase::Racing, GamePhase::Result)
    );
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidState(format!(
            "phase cannot move from {from:?} to {to:?}"
        )))
    }
}

/// One client's handle on the room's game document.
pub struct GameSession {
    store: SharedStore,
    config: SyncConfig,
    code: String,
    member_id: String,
    member_name: String,
    is_host: watch::Receiver<bool>,
    doc: watch::Receiver<GameDoc>,
    listener: JoinHandle<()>,
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl GameSession {
    /// Open the game document for `code`.
    ///
    /// The host seeds the document in the car-select phase; everyone else only
    /// attaches a subscription, so the call is idempotent across members. Host
    /// status is a live view of the room's host flag, so a member promoted by
    /// a later election gains the phase authority with it.
    pub(crate) async fn init(
        store: SharedStore,
        config: SyncConfig,
        code: String,
        member_id: String,
        member_name: String,
        is_host: watch::Receiver<bool>,
    ) -> SessionResult<Self> {
        if *is_host.borrow() {
            let existing = store.read(&paths::game_phase(&code)).await?;
            if existing.is_none() {
                // Partial write: registrations made before the host opened
                // the document survive.
                store
                    .update(
                        &paths::game_doc(&code),
                        vec![("phase".into(), json!(GamePhase::CarSelect))],
                    )
                    .await?;
                info!(code = %code, "game document created");
            }
        }

        let sub = store.subscribe(&paths::game_doc(&code)).await?;
        let (doc_tx, doc_rx) = watch::channel(GameDoc::default());
        let listener = tokio::spawn(run_game_listener(doc_tx, sub));

        Ok(Self {
            store,
            config,
            code,
            member_id,
            member_name,
            is_host,
            doc: doc_rx,
            listener,
        })
    }

    /// Register this member as a racer with the given car.
    ///
    /// Duplicate picks across members are allowed; the car choice is stats,
    /// not an exclusive slot.
    pub async fn select_car(&self, car_id: &str) -> SessionResult<()> {
        if content::car(car_id).is_none() {
            return Err(SessionError::Validation(format!("unknown car `{car_id}`")));
        }
        let phase = self.doc.borrow().phase;
        if !matches!(phase, GamePhase::Lobby | GamePhase::CarSelect) {
            return Err(SessionError::InvalidState(
                "cars cannot be picked once the race is under way".into(),
            ));
        }
        let slot = PlayerSlot {
            car: Some(car_id.to_string()),
            role: Role::Racer,
        };
        self.store
            .write(
                &paths::game_player(&self.code, &self.member_id),
                serde_json::to_value(&slot)?,
            )
            .await?;
        debug!(code = %self.code, member = %self.member_id, car = car_id, "car selected");
        Ok(())
    }

    /// Register this member as a spectator, optionally cheering for a team.
    pub async fn join_as_spectator(&self, team: Option<&str>) -> SessionResult<()> {
        let spectator = Spectator {
            name: self.member_name.clone(),
            team: team.map(str::to_string),
        };
        self.store
            .update(
                &paths::game_doc(&self.code),
                vec![
                    (
                        format!("spectators/{}", self.member_id),
                        serde_json::to_value(&spectator)?,
                    ),
                    (
                        format!("players/{}", self.member_id),
                        serde_json::to_value(PlayerSlot {
                            car: None,
                            role: Role::Spectator,
                        })?,
                    ),
                ],
            )
            .await?;
        Ok(())
    }

    /// Host-only: run the race countdown and launch the race.
    ///
    /// Racers are placed on a two-column starting grid facing up; the phase
    /// flip to racing, the start timestamp, and every grid position land in
    /// one batch.
    pub async fn start_race(&self) -> SessionResult<()> {
        if !*self.is_host.borrow() {
            return Err(SessionError::Unauthorized(
                "only the host may start the race".into(),
            ));
        }
        check_phase_transition(self.doc.borrow().phase, GamePhase::Countdown)?;

        self.store
            .update(
                &paths::game_doc(&self.code),
                vec![("phase".into(), json!(GamePhase::Countdown))],
            )
            .await?;
        let mut doc = self.doc.clone();
        doc.wait_for(|d| d.phase == GamePhase::Countdown)
            .await
            .map_err(|_| SessionError::InvalidState("game listener stopped".into()))?;

        for step in (0..=self.config.race_countdown_from).rev() {
            if doc.borrow().phase != GamePhase::Countdown {
                info!(code = %self.code, step, "race countdown aborted; phase changed");
                return Ok(());
            }
            self.store
                .write(&paths::game_countdown(&self.code), json!(step))
                .await?;
            if step > 0 {
                sleep(self.config.countdown_step).await;
            }
        }

        let racers: Vec<String> = {
            let doc = self.doc.borrow();
            doc.players
                .iter()
                .filter(|(_, slot)| slot.role == Role::Racer)
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut entries: Vec<(String, Value)> = vec![
            ("phase".into(), json!(GamePhase::Racing)),
            ("countdown".into(), json!(0)),
            ("raceData/startTime".into(), json!(now_millis())),
        ];
        for (index, id) in racers.iter().enumerate() {
            entries.push((
                format!("raceData/positions/{id}"),
                serde_json::to_value(grid_position(index))?,
            ));
        }
        self.store
            .update(&paths::game_doc(&self.code), entries)
            .await?;
        info!(code = %self.code, racers = racers.len(), "race started");
        Ok(())
    }

    /// Post a chat message.
    ///
    /// Chat belongs to spectators; a registered racer calling this is a silent
    /// no-op rather than an error, so shared UI code does not need to branch.
    pub async fn send_chat(&self, message: &str) -> SessionResult<()> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::Validation("message must not be empty".into()));
        }
        let team = {
            let doc = self.doc.borrow();
            if doc
                .players
                .get(&self.member_id)
                .is_some_and(|slot| slot.role == Role::Racer)
            {
                debug!(code = %self.code, member = %self.member_id, "racer chat dropped");
                return Ok(());
            }
            doc.spectators
                .get(&self.member_id)
                .and_then(|s| s.team.clone())
        };
        let timestamp = now_millis();
        let entry = ChatEntry {
            member_id: self.member_id.clone(),
            name: self.member_name.clone(),
            message: message.to_string(),
            team,
            timestamp,
        };
        self.store
            .write(
                &paths::chat_entry(&self.code, timestamp),
                serde_json::to_value(&entry)?,
            )
            .await?;
        Ok(())
    }

    /// Host-only: move the finished race to the result phase.
    pub async fn show_results(&self) -> SessionResult<()> {
        if !*self.is_host.borrow() {
            return Err(SessionError::Unauthorized(
                "only the host may show results".into(),
            ));
        }
        check_phase_transition(self.doc.borrow().phase, GamePhase::Result)?;
        self.store
            .update(
                &paths::game_doc(&self.code),
                vec![("phase".into(), json!(GamePhase::Result))],
            )
            .await?;
        info!(code = %self.code, "results shown");
        Ok(())
    }

    /// Build the local simulator for this member's car.
    ///
    /// Requires the member to be a registered racer with a picked car.
    pub fn simulator(&self) -> SessionResult<RaceSimulator> {
        let car_id = {
            let doc = self.doc.borrow();
            let slot = doc.players.get(&self.member_id).ok_or_else(|| {
                SessionError::InvalidState("member is not registered in the game".into())
            })?;
            if slot.role != Role::Racer {
                return Err(SessionError::InvalidState(
                    "spectators do not drive".into(),
                ));
            }
            slot.car.clone().ok_or_else(|| {
                SessionError::InvalidState("no car picked".into())
            })?
        };
        let car = content::car(&car_id)
            .ok_or_else(|| SessionError::InvalidState(format!("unknown car `{car_id}`")))?;
        Ok(RaceSimulator::new(
            self.store.clone(),
            self.config.clone(),
            self.code.clone(),
            self.member_id.clone(),
            *car,
            self.doc.clone(),
        ))
    }

    /// Current phase of the game document.
    pub fn phase(&self) -> GamePhase {
        self.doc.borrow().phase
    }

    /// Latest observed race countdown value.
    pub fn countdown(&self) -> u32 {
        self.doc.borrow().countdown
    }

    /// Member ids registered as racers, in registration order.
    pub fn racers(&self) -> Vec<String> {
        self.doc
            .borrow()
            .players
            .iter()
            .filter(|(_, slot)| slot.role == Role::Racer)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Registered spectators in registration order.
    pub fn spectators(&self) -> Vec<(String, Spectator)> {
        self.doc
            .borrow()
            .spectators
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    /// This member's registration, when present.
    pub fn own_slot(&self) -> Option<PlayerSlot> {
        self.doc.borrow().players.get(&self.member_id).cloned()
    }

    /// The team this member spectates for, when any.
    pub fn own_team(&self) -> Option<String> {
        self.doc
            .borrow()
            .spectators
            .get(&self.member_id)
            .and_then(|s| s.team.clone())
    }

    /// Snapshot of the shared race state.
    pub fn race_data(&self) -> RaceData {
        self.doc.borrow().race_data.clone()
    }

    /// The most recent chat entries, oldest first, capped to the configured
    /// tail length.
    pub fn chat_tail(&self) -> Vec<ChatEntry> {
        let doc = self.doc.borrow();
        let skip = doc.chat.len().saturating_sub(self.config.chat_tail);
        doc.chat.values().skip(skip).cloned().collect()
    }

    /// Watch the whole game document.
    pub fn doc_watch(&self) -> watch::Receiver<GameDoc> {
        self.doc.clone()
    }
}

async fn run_game_listener(doc: watch::Sender<GameDoc>, mut sub: Subscription) {
    while let Some(event) = sub.next().await {
        let parsed = event
            .value
            .and_then(|v| serde_json::from_value::<GameDoc>(v).ok())
            .unwrap_or_default();
        if doc.send(parsed).is_err() {
            break;
        }
    }
    debug!("game listener stopped");
}

/// Starting grid slot for the racer at `index`: two columns 60 units apart,
/// rows 50 units apart, everyone facing up.
fn grid_position(index: usize) -> RacePosition {
    let column = (index % 2) as f64;
    let row = (index / 2) as f64;
    RacePosition {
        x: TRACK.start_line.x + column * 60.0 - 30.0,
        y: TRACK.start_line.y + 50.0 + row * 50.0,
        angle: -90.0,
        lap: 0,
        checkpoint: 0,
        speed: 0.0,
        finished: false,
        finish_time: None,
        hit_by: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_edges_are_valid() {
        assert!(check_phase_transition(GamePhase::Lobby, GamePhase::CarSelect).is_ok());
        assert!(check_phase_transition(GamePhase::CarSelect, GamePhase::Countdown).is_ok());
        assert!(check_phase_transition(GamePhase::Countdown, GamePhase::Racing).is_ok());
        assert!(check_phase_transition(GamePhase::Racing, GamePhase::Result).is_ok());
    }

    #[test]
    fn skipping_or_reversing_phases_is_rejected() {
        let invalid = [
            (GamePhase::Lobby, GamePhase::Racing),
            (GamePhase::CarSelect, GamePhase::Racing),
            (GamePhase::Racing, GamePhase::CarSelect),
            (GamePhase::Result, GamePhase::Lobby),
            (GamePhase::Result, GamePhase::Racing),
            (GamePhase::Countdown, GamePhase::CarSelect),
        ];
        for (from, to) in invalid {
            assert!(
                matches!(
                    check_phase_transition(from, to),
                    Err(SessionError::InvalidState(_))
                ),
                "{from:?} -> {to:?} should be rejected"
            );
        }
    }

    #[test]
    fn grid_alternates_columns_and_steps_rows() {
        let first = grid_position(0);
        let second = grid_position(1);
        let third = grid_position(2);
        assert_eq!(first.x, 370.0);
        assert_eq!(second.x, 430.0);
        assert_eq!(first.y, second.y);
        assert_eq!(third.x, first.x);
        assert_eq!(third.y, first.y + 50.0);
        for position in [&first, &second, &third] {
            assert_eq!(position.angle, -90.0);
            assert_eq!(position.speed, 0.0);
            assert!(!position.finished);
        }
    }
}
