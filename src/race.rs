//! Local race simulation.
//!
//! Each client simulates only its own car at a fixed logical tick rate and
//! publishes its position to the shared tree, throttled so replication traffic
//! stays bounded. Everyone else's cars are rendered straight from the
//! replicated positions; no client ever simulates another client's car.

use std::time::Duration;

use rand::seq::IndexedRandom;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::content::{CarSpec, ItemKind, ITEMS, TRACK};
use crate::error::SessionResult;
use crate::model::{GameDoc, GamePhase, RaceData, RacePosition, Trap, now_millis};
use crate::paths;
use crate::store::SharedStore;

/// Degrees of steering per tick per point of handling.
const STEER_FACTOR: f64 = 0.3;
/// Speed gained per tick per point of acceleration while accelerating.
const ACCEL_FACTOR: f64 = 0.1;
/// Effective speed cap per point of the speed stat.
const SPEED_CAP_FACTOR: f64 = 0.5;
/// Cap multiplier while a boost is active.
const BOOST_MULTIPLIER: f64 = 2.0;
/// Forced rotation per tick while spinning out.
const SPIN_STEP: f64 = 30.0;
/// How long a spin-out lasts.
const SPIN_DURATION: Duration = Duration::from_millis(1500);
/// Collision radius around a placed trap.
const TRAP_RADIUS: f64 = 30.0;

/// Input state applied on every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    /// Steer counter-clockwise.
    pub left: bool,
    /// Steer clockwise.
    pub right: bool,
    /// Accelerate toward the speed cap.
    pub accelerate: bool,
}

/// Simulates this client's own car and publishes its replicated position.
pub struct RaceSimulator {
    store: SharedStore,
    config: SyncConfig,
    code: String,
    member_id: String,
    car: CarSpec,
    doc: watch::Receiver<GameDoc>,
    position: RacePosition,
    controls: Controls,
    held_item: Option<ItemKind>,
    boost_until: Option<Instant>,
    shield_until: Option<Instant>,
    spin_until: Option<Instant>,
    last_publish: Option<Instant>,
}

impl RaceSimulator {
    pub(crate) fn new(
        store: SharedStore,
        config: SyncConfig,
        code: String,
        member_id: String,
        car: CarSpec,
        doc: watch::Receiver<GameDoc>,
    ) -> Self {
        let position = doc
            .borrow()
            .race_data
            .positions
            .get(&member_id)
            .cloned()
            .unwrap_or(RacePosition {
                x: TRACK.start_line.x,
                y: TRACK.start_line.y,
                angle: -90.0,
                lap: 0,
                checkpoint: 0,
                speed: 0.0,
                finished: false,
                finish_time: None,
                hit_by: None,
            });
        Self {
            store,
            config,
            code,
            member_id,
            car,
            doc,
            position,
            controls: Controls::default(),
            held_item: None,
            boost_until: None,
            shield_until: None,
            spin_until: None,
            last_publish: None,
        }
    }

    /// Replace the input state used by subsequent ticks.
    pub fn set_controls(&mut self, controls: Controls) {
        self.controls = controls;
    }

    /// Pick up a random item when empty-handed. Returns the acquired item,
    /// `None` when one is already held.
    pub fn pickup_item(&mut self) -> Option<ItemKind> {
        if self.held_item.is_some() {
            return None;
        }
        let item = ITEMS.choose(&mut rand::rng()).copied();
        self.held_item = item;
        if let Some(item) = item {
            debug!(code = %self.code, item = item.id(), "item picked up");
        }
        item
    }

    /// Use the held item. Returns the consumed item, `None` when empty-handed.
    pub async fn use_item(&mut self) -> SessionResult<Option<ItemKind>> {
        let Some(item) = self.held_item.take() else {
            return Ok(None);
        };
        match item {
            ItemKind::Boost => {
                self.boost_until = Some(Instant::now() + duration_of(item));
            }
            ItemKind::Shield => {
                self.shield_until = Some(Instant::now() + duration_of(item));
            }
            ItemKind::Banana => {
                let trap = Trap {
                    kind: "banana".into(),
                    x: self.position.x,
                    y: self.position.y,
                    placed_by: self.member_id.clone(),
                };
                let mut traps = self.doc.borrow().race_data.traps.clone();
                traps.push(trap);
                self.store
                    .write(&paths::race_traps(&self.code), serde_json::to_value(&traps)?)
                    .await?;
            }
            ItemKind::Missile => {
                let target = {
                    let doc = self.doc.borrow();
                    racer_ahead(&doc.race_data, &self.member_id)
                };
                match target {
                    Some(target) => {
                        self.store
                            .update(
                                &paths::race_position(&self.code, &target),
                                vec![("hitBy".into(), json!(self.member_id))],
                            )
                            .await?;
                        debug!(code = %self.code, target = %target, "missile fired");
                    }
                    // Leading the race: the missile fizzles but is spent.
                    None => debug!(code = %self.code, "missile fired with no target"),
                }
            }
        }
        Ok(Some(item))
    }

    /// Advance the simulation by one tick and publish when due.
    pub async fn tick(&mut self) -> SessionResult<()> {
        if self.position.finished {
            return Ok(());
        }
        let now = Instant::now();
        self.expire_effects(now);

        let (pending_hit, traps, start_time) = {
            let doc = self.doc.borrow();
            let data = &doc.race_data;
            (
                data.positions
                    .get(&self.member_id)
                    .and_then(|p| p.hit_by.clone()),
                data.traps.clone(),
                data.start_time,
            )
        };

        if let Some(attacker) = pending_hit {
            self.absorb_hit(&attacker, now).await?;
        }
        self.check_traps(&traps, now).await?;

        self.steer(now);
        self.throttle();
        self.integrate();
        let crossed_finish = self.advance_checkpoints();
        if crossed_finish {
            self.finish(start_time).await?;
        }
        self.publish(now, crossed_finish).await;
        Ok(())
    }

    /// Drive the simulation at the configured tick rate until the race leaves
    /// the racing phase or this car finishes.
    pub async fn run(&mut self) {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.doc.borrow().phase != GamePhase::Racing {
                debug!(code = %self.code, "race phase left racing; simulator stopping");
                break;
            }
            if let Err(err) = self.tick().await {
                warn!(code = %self.code, error = %err, "simulation tick failed");
            }
            if self.position.finished {
                break;
            }
        }
    }

    /// Snapshot of the locally simulated position.
    pub fn position(&self) -> &RacePosition {
        &self.position
    }

    /// The item currently held, if any.
    pub fn held_item(&self) -> Option<ItemKind> {
        self.held_item
    }

    /// Whether a boost is currently active.
    pub fn is_boosting(&self) -> bool {
        self.boost_until.is_some()
    }

    /// Whether a shield is currently active.
    pub fn is_shielded(&self) -> bool {
        self.shield_until.is_some()
    }

    /// Whether the car is spinning out.
    pub fn is_spinning(&self) -> bool {
        self.spin_until.is_some()
    }

    fn expire_effects(&mut self, now: Instant) {
        if self.boost_until.is_some_and(|until| now >= until) {
            self.boost_until = None;
        }
        if self.shield_until.is_some_and(|until| now >= until) {
            self.shield_until = None;
        }
        if self.spin_until.is_some_and(|until| now >= until) {
            self.spin_until = None;
        }
    }

    /// Resolve a replicated hit marker: a shield absorbs it, otherwise the car
    /// spins out. The marker is cleared either way; while already spinning,
    /// further hits are dropped without restarting the spin.
    async fn absorb_hit(&mut self, attacker: &str, now: Instant) -> SessionResult<()> {
        if self.spin_until.is_none() {
            if self.shield_until.is_some() {
                info!(code = %self.code, attacker, "hit absorbed by shield");
            } else {
                info!(code = %self.code, attacker, "hit; spinning out");
                self.spin_until = Some(now + SPIN_DURATION);
            }
        }
        self.store
            .update(
                &paths::race_position(&self.code, &self.member_id),
                vec![("hitBy".into(), Value::Null)],
            )
            .await?;
        Ok(())
    }

    /// Spin out on traps placed by other racers; a hit trap is removed from
    /// the shared list.
    async fn check_traps(&mut self, traps: &[Trap], now: Instant) -> SessionResult<()> {
        if self.spin_until.is_some() {
            return Ok(());
        }
        let hit = traps.iter().position(|trap| {
            trap.placed_by != self.member_id
                && distance(trap.x, trap.y, self.position.x, self.position.y) <= TRAP_RADIUS
        });
        let Some(index) = hit else {
            return Ok(());
        };
        if self.shield_until.is_some() {
            debug!(code = %self.code, "trap absorbed by shield");
        } else {
            info!(code = %self.code, "trap hit; spinning out");
            self.spin_until = Some(now + SPIN_DURATION);
        }
        let mut remaining = traps.to_vec();
        remaining.remove(index);
        self.store
            .write(
                &paths::race_traps(&self.code),
                serde_json::to_value(&remaining)?,
            )
            .await?;
        Ok(())
    }

    fn steer(&mut self, now: Instant) {
        if self.spin_until.is_some_and(|until| now < until) {
            self.position.angle += SPIN_STEP;
        } else {
            let step = self.car.handling * STEER_FACTOR;
            if self.controls.left {
                self.position.angle -= step;
            }
            if self.controls.right {
                self.position.angle += step;
            }
        }
        self.position.angle = self.position.angle.rem_euclid(360.0);
    }

    fn throttle(&mut self) {
        let mut cap = self.car.speed * SPEED_CAP_FACTOR;
        if self.boost_until.is_some() {
            cap *= BOOST_MULTIPLIER;
        }
        let spinning = self.spin_until.is_some();
        if self.controls.accelerate && !spinning {
            self.position.speed += self.car.acceleration * ACCEL_FACTOR;
        } else {
            self.position.speed -= self.car.acceleration * ACCEL_FACTOR / 2.0;
        }
        self.position.speed = self.position.speed.clamp(0.0, cap);
    }

    fn integrate(&mut self) {
        let radians = self.position.angle.to_radians();
        self.position.x += radians.cos() * self.position.speed;
        self.position.y += radians.sin() * self.position.speed;
        self.position.x = self
            .position
            .x
            .clamp(TRACK.margin, TRACK.width - TRACK.margin);
        self.position.y = self
            .position
            .y
            .clamp(TRACK.margin, TRACK.height - TRACK.margin);
    }

    /// Capture the next expected checkpoint when in range. Returns true when
    /// the wraparound completed the final lap.
    fn advance_checkpoints(&mut self) -> bool {
        let index = self.position.checkpoint as usize;
        let Some(next) = TRACK.checkpoints.get(index) else {
            return false;
        };
        if distance(next.x, next.y, self.position.x, self.position.y) > TRACK.capture_radius {
            return false;
        }
        self.position.checkpoint += 1;
        if self.position.checkpoint as usize == TRACK.checkpoints.len() {
            self.position.checkpoint = 0;
            self.position.lap += 1;
            debug!(code = %self.code, lap = self.position.lap, "lap completed");
            if self.position.lap >= TRACK.laps {
                return true;
            }
        }
        false
    }

    /// Mark the car finished and append to the shared finish order exactly
    /// once.
    async fn finish(&mut self, start_time: Option<u64>) -> SessionResult<()> {
        self.position.finished = true;
        self.position.speed = 0.0;
        let elapsed = start_time
            .map(|start| now_millis().saturating_sub(start))
            .unwrap_or(0);
        self.position.finish_time = Some(elapsed);
        info!(code = %self.code, member = %self.member_id, elapsed_ms = elapsed, "race finished");

        let path = paths::race_finish_order(&self.code);
        let mut order: Vec<String> = self
            .store
            .read(&path)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        if !order.iter().any(|id| id == &self.member_id) {
            order.push(self.member_id.clone());
            self.store.write(&path, serde_json::to_value(&order)?).await?;
        }
        Ok(())
    }

    /// Publish the local position, throttled. Publish failures are logged and
    /// dropped; the next publish carries the fresher state anyway.
    async fn publish(&mut self, now: Instant, force: bool) {
        let due = match self.last_publish {
            Some(last) => now.duration_since(last) >= self.config.publish_interval,
            None => true,
        };
        if !due && !force {
            return;
        }
        self.last_publish = Some(now);
        // Partial update, not a replacing write: a hit marker written by an
        // attacker between publishes must survive until this simulator has
        // absorbed it.
        let entries: Vec<(String, Value)> = match serde_json::to_value(&self.position) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            Ok(_) => return,
            Err(err) => {
                warn!(code = %self.code, error = %err, "position encode failed");
                return;
            }
        };
        if let Err(err) = self
            .store
            .update(&paths::race_position(&self.code, &self.member_id), entries)
            .await
        {
            warn!(code = %self.code, error = %err, "position publish failed");
        }
    }
}

fn duration_of(item: ItemKind) -> Duration {
    item.duration().unwrap_or(Duration::ZERO)
}

fn distance(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// Member ids from best to worst: finished racers first in finish order, then
/// the field by laps, then by captured checkpoints, ties kept stable in
/// registration order.
pub fn ranking(data: &RaceData) -> Vec<String> {
    let mut ids: Vec<&String> = data.positions.keys().collect();
    ids.sort_by(|a, b| {
        let pa = &data.positions[*a];
        let pb = &data.positions[*b];
        pb.finished
            .cmp(&pa.finished)
            .then_with(|| pa.finish_time.unwrap_or(u64::MAX).cmp(&pb.finish_time.unwrap_or(u64::MAX)))
            .then_with(|| pb.lap.cmp(&pa.lap))
            .then_with(|| pb.checkpoint.cmp(&pa.checkpoint))
    });
    ids.into_iter().cloned().collect()
}

/// The final standings: finish-order ids paired with their finish times.
pub fn finish_board(data: &RaceData) -> Vec<(String, Option<u64>)> {
    data.finish_order
        .iter()
        .map(|id| {
            let time = data.positions.get(id).and_then(|p| p.finish_time);
            (id.clone(), time)
        })
        .collect()
}

/// The unfinished racer ranked directly ahead of `member_id`, the missile's
/// target. `None` when leading.
fn racer_ahead(data: &RaceData, member_id: &str) -> Option<String> {
    let order = ranking(data);
    let own = order.iter().position(|id| id == member_id)?;
    order[..own]
        .iter()
        .rev()
        .find(|id| data.positions.get(*id).is_none_or(|p| !p.finished))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::content;
    use crate::store::{MemoryStore, ReplicatedStore};
    use serde_json::json;
    use std::sync::Arc;

    fn racer(lap: u32, checkpoint: u32, finished: bool, finish_time: Option<u64>) -> RacePosition {
        RacePosition {
            x: 400.0,
            y: 300.0,
            angle: 0.0,
            lap,
            checkpoint,
            speed: 0.0,
            finished,
            finish_time,
            hit_by: None,
        }
    }

    fn simulator_at(position: RacePosition) -> RaceSimulator {
        let store = Arc::new(MemoryStore::new().connect());
        let (_tx, doc) = watch::channel(GameDoc::default());
        let mut sim = RaceSimulator::new(
            store,
            SyncConfig::default(),
            "AB12".into(),
            "self".into(),
            *content::car("sports").unwrap(),
            doc,
        );
        sim.position = position;
        sim
    }

    #[test]
    fn ranking_puts_finished_before_the_field() {
        let mut data = RaceData::default();
        data.positions.insert("slow".into(), racer(1, 2, false, None));
        data.positions
            .insert("winner".into(), racer(3, 0, true, Some(40_000)));
        data.positions.insert("fast".into(), racer(2, 1, false, None));
        data.positions
            .insert("second".into(), racer(3, 0, true, Some(41_000)));
        assert_eq!(ranking(&data), ["winner", "second", "fast", "slow"]);
    }

    #[test]
    fn ranking_breaks_lap_ties_on_checkpoints_and_keeps_order_stable() {
        let mut data = RaceData::default();
        data.positions.insert("a".into(), racer(1, 1, false, None));
        data.positions.insert("b".into(), racer(1, 3, false, None));
        data.positions.insert("c".into(), racer(1, 1, false, None));
        assert_eq!(ranking(&data), ["b", "a", "c"]);
    }

    #[test]
    fn finish_board_pairs_ids_with_times() {
        let mut data = RaceData::default();
        data.positions
            .insert("w".into(), racer(3, 0, true, Some(30_500)));
        data.finish_order = vec!["w".into(), "ghost".into()];
        assert_eq!(
            finish_board(&data),
            vec![("w".into(), Some(30_500)), ("ghost".into(), None)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn speed_never_exceeds_the_cap() {
        let mut sim = simulator_at(racer(0, 0, false, None));
        sim.set_controls(Controls {
            accelerate: true,
            ..Controls::default()
        });
        let cap = sim.car.speed * SPEED_CAP_FACTOR;
        for _ in 0..1000 {
            sim.tick().await.unwrap();
            assert!(sim.position.speed <= cap + 1e-9);
        }
        assert!((sim.position.speed - cap).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_preserves_a_concurrent_hit_marker() {
        let mut sim = simulator_at(racer(0, 0, false, None));
        sim.store
            .update(
                &paths::race_position("AB12", "self"),
                vec![("hitBy".into(), json!("rival"))],
            )
            .await
            .unwrap();

        sim.set_controls(Controls {
            accelerate: true,
            ..Controls::default()
        });
        sim.tick().await.unwrap();

        let published = sim
            .store
            .read(&paths::race_position("AB12", "self"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published["hitBy"], json!("rival"));
        assert!(published["speed"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_car_decays_to_standstill() {
        let mut start = racer(0, 0, false, None);
        start.speed = 4.0;
        start.x = 200.0;
        start.y = 200.0;
        let mut sim = simulator_at(start);
        for _ in 0..100 {
            sim.tick().await.unwrap();
        }
        assert_eq!(sim.position.speed, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn position_stays_inside_the_playfield() {
        let mut start = racer(0, 0, false, None);
        start.x = 60.0;
        start.y = 60.0;
        start.angle = 225.0;
        start.speed = 5.0;
        let mut sim = simulator_at(start);
        sim.set_controls(Controls {
            accelerate: true,
            ..Controls::default()
        });
        for _ in 0..200 {
            sim.tick().await.unwrap();
            assert!(sim.position.x >= TRACK.margin && sim.position.x <= TRACK.width - TRACK.margin);
            assert!(
                sim.position.y >= TRACK.margin && sim.position.y <= TRACK.height - TRACK.margin
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn checkpoint_wraparound_increments_the_lap() {
        let last = TRACK.checkpoints[TRACK.checkpoints.len() - 1];
        let mut start = racer(0, (TRACK.checkpoints.len() - 1) as u32, false, None);
        start.x = last.x;
        start.y = last.y;
        let mut sim = simulator_at(start);
        sim.tick().await.unwrap();
        assert_eq!(sim.position.checkpoint, 0);
        assert_eq!(sim.position.lap, 1);
        assert!(!sim.position.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn final_lap_wraparound_finishes_and_records_order() {
        let last = TRACK.checkpoints[TRACK.checkpoints.len() - 1];
        let mut start = racer(TRACK.laps - 1, (TRACK.checkpoints.len() - 1) as u32, false, None);
        start.x = last.x;
        start.y = last.y;
        let mut sim = simulator_at(start);
        sim.tick().await.unwrap();
        assert!(sim.position.finished);
        assert!(sim.position.finish_time.is_some());

        let order: Vec<String> = serde_json::from_value(
            sim.store
                .read(&paths::race_finish_order("AB12"))
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(order, ["self"]);

        // Further ticks neither move the car nor duplicate the entry.
        sim.tick().await.unwrap();
        let order: Vec<String> = serde_json::from_value(
            sim.store
                .read(&paths::race_finish_order("AB12"))
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(order, ["self"]);
    }

    #[tokio::test(start_paused = true)]
    async fn boost_doubles_the_cap_and_expires() {
        let mut sim = simulator_at(racer(0, 0, false, None));
        sim.set_controls(Controls {
            accelerate: true,
            ..Controls::default()
        });
        sim.held_item = Some(ItemKind::Boost);
        sim.use_item().await.unwrap();
        assert!(sim.is_boosting());

        let cap = sim.car.speed * SPEED_CAP_FACTOR;
        for _ in 0..200 {
            sim.tick().await.unwrap();
        }
        assert!(sim.position.speed > cap);

        tokio::time::advance(Duration::from_millis(2100)).await;
        sim.tick().await.unwrap();
        assert!(!sim.is_boosting());
        // Back under the normal cap immediately once the boost lapses.
        assert!(sim.position.speed <= cap + 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn spin_ignores_steering_and_rotates_fixed_steps() {
        let mut sim = simulator_at(racer(0, 0, false, None));
        sim.spin_until = Some(Instant::now() + SPIN_DURATION);
        sim.set_controls(Controls {
            left: true,
            ..Controls::default()
        });
        let before = sim.position.angle;
        sim.tick().await.unwrap();
        assert_eq!(sim.position.angle, (before + SPIN_STEP).rem_euclid(360.0));

        tokio::time::advance(SPIN_DURATION + Duration::from_millis(10)).await;
        sim.tick().await.unwrap();
        assert!(!sim.is_spinning());
    }

    #[tokio::test(start_paused = true)]
    async fn shield_absorbs_a_trap_without_spinning() {
        let mut start = racer(0, 0, false, None);
        start.x = 200.0;
        start.y = 200.0;
        let mut sim = simulator_at(start);
        sim.shield_until = Some(Instant::now() + Duration::from_secs(5));
        let traps = vec![Trap {
            kind: "banana".into(),
            x: 200.0,
            y: 200.0,
            placed_by: "rival".into(),
        }];
        sim.check_traps(&traps, Instant::now()).await.unwrap();
        assert!(!sim.is_spinning());
    }

    #[tokio::test(start_paused = true)]
    async fn own_traps_are_inert() {
        let mut start = racer(0, 0, false, None);
        start.x = 200.0;
        start.y = 200.0;
        let mut sim = simulator_at(start);
        let traps = vec![Trap {
            kind: "banana".into(),
            x: 200.0,
            y: 200.0,
            placed_by: "self".into(),
        }];
        sim.check_traps(&traps, Instant::now()).await.unwrap();
        assert!(!sim.is_spinning());
    }

    #[tokio::test(start_paused = true)]
    async fn rival_trap_spins_the_car_out() {
        let mut start = racer(0, 0, false, None);
        start.x = 200.0;
        start.y = 200.0;
        let mut sim = simulator_at(start);
        let traps = vec![Trap {
            kind: "banana".into(),
            x: 210.0,
            y: 200.0,
            placed_by: "rival".into(),
        }];
        sim.check_traps(&traps, Instant::now()).await.unwrap();
        assert!(sim.is_spinning());
    }

    #[tokio::test(start_paused = true)]
    async fn banana_lands_at_the_current_position() {
        let mut start = racer(0, 0, false, None);
        start.x = 123.0;
        start.y = 456.0;
        let mut sim = simulator_at(start);
        sim.held_item = Some(ItemKind::Banana);
        sim.use_item().await.unwrap();

        let traps: Vec<Trap> = serde_json::from_value(
            sim.store
                .read(&paths::race_traps("AB12"))
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(traps.len(), 1);
        assert_eq!(traps[0].x, 123.0);
        assert_eq!(traps[0].placed_by, "self");
        assert!(sim.held_item().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missile_marks_the_racer_ahead() {
        let store = Arc::new(MemoryStore::new().connect());
        let mut doc = GameDoc::default();
        doc.race_data
            .positions
            .insert("leader".into(), racer(2, 1, false, None));
        doc.race_data
            .positions
            .insert("self".into(), racer(1, 0, false, None));
        let (_tx, doc_rx) = watch::channel(doc);
        let mut sim = RaceSimulator::new(
            store.clone(),
            SyncConfig::default(),
            "AB12".into(),
            "self".into(),
            *content::car("sports").unwrap(),
            doc_rx,
        );
        sim.held_item = Some(ItemKind::Missile);
        sim.use_item().await.unwrap();

        let marked = store
            .read(&paths::race_position("AB12", "leader"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marked["hitBy"], json!("self"));
    }

    #[test]
    fn pickup_only_works_empty_handed() {
        let mut sim = simulator_at(racer(0, 0, false, None));
        let first = sim.pickup_item();
        assert!(first.is_some());
        assert!(sim.pickup_item().is_none());
        assert_eq!(sim.held_item(), first);
    }

    #[test]
    fn racer_ahead_is_the_next_better_ranked() {
        let mut data = RaceData::default();
        data.positions.insert("first".into(), racer(2, 2, false, None));
        data.positions.insert("second".into(), racer(2, 0, false, None));
        data.positions.insert("third".into(), racer(1, 3, false, None));
        assert_eq!(racer_ahead(&data, "third"), Some("second".into()));
        assert_eq!(racer_ahead(&data, "second"), Some("first".into()));
        assert_eq!(racer_ahead(&data, "first"), None);
    }
}
