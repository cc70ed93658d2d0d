//! Static game content: car stats, the item table, and track geometry.
//!
//! Referenced as data only; nothing here is mutated at runtime.

use std::time::Duration;

/// Handling characteristics of one selectable car.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarSpec {
    /// Stable id written into player registrations.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Top-speed stat; the effective cap is `speed * 0.5`.
    pub speed: f64,
    /// Steering stat; degrees per tick scale with `handling * 0.3`.
    pub handling: f64,
    /// Acceleration stat; speed gain per tick scales with `acceleration * 0.1`.
    pub acceleration: f64,
}

/// The selectable car table. Duplicate picks are allowed; the choice is
/// cosmetic plus stats, never exclusive.
pub const CARS: [CarSpec; 6] = [
    CarSpec {
        id: "sports",
        name: "Sports Car",
        speed: 10.0,
        handling: 8.0,
        acceleration: 9.0,
    },
    CarSpec {
        id: "muscle",
        name: "Muscle Car",
        speed: 9.0,
        handling: 6.0,
        acceleration: 10.0,
    },
    CarSpec {
        id: "compact",
        name: "Compact",
        speed: 7.0,
        handling: 10.0,
        acceleration: 7.0,
    },
    CarSpec {
        id: "truck",
        name: "Pickup Truck",
        speed: 6.0,
        handling: 5.0,
        acceleration: 6.0,
    },
    CarSpec {
        id: "bike",
        name: "Bike",
        speed: 11.0,
        handling: 7.0,
        acceleration: 8.0,
    },
    CarSpec {
        id: "bus",
        name: "Bus",
        speed: 5.0,
        handling: 4.0,
        acceleration: 5.0,
    },
];

/// Look up a car by its stable id.
pub fn car(id: &str) -> Option<&'static CarSpec> {
    CARS.iter().find(|car| car.id == id)
}

/// The four acquirable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Doubles the speed cap for a short window.
    Boost,
    /// Drops a trap at the current position; driving over it spins.
    Banana,
    /// Attacks the racer directly ahead in the ranking.
    Missile,
    /// Absorbs incoming hits for a window.
    Shield,
}

/// Item table used for uniform random pickup.
pub const ITEMS: [ItemKind; 4] = [
    ItemKind::Boost,
    ItemKind::Banana,
    ItemKind::Missile,
    ItemKind::Shield,
];

impl ItemKind {
    /// Stable wire id.
    pub fn id(self) -> &'static str {
        match self {
            ItemKind::Boost => "boost",
            ItemKind::Banana => "banana",
            ItemKind::Missile => "missile",
            ItemKind::Shield => "shield",
        }
    }

    /// Wall-clock duration of the timed effects; `None` for one-shot items.
    pub fn duration(self) -> Option<Duration> {
        match self {
            ItemKind::Boost => Some(Duration::from_millis(2000)),
            ItemKind::Shield => Some(Duration::from_millis(5000)),
            ItemKind::Banana | ItemKind::Missile => None,
        }
    }
}

/// One track waypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

/// Static track geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    /// Playfield width.
    pub width: f64,
    /// Playfield height.
    pub height: f64,
    /// Laps required to finish.
    pub laps: u32,
    /// Hard-clamp margin inside the playfield rectangle.
    pub margin: f64,
    /// Capture radius around each checkpoint.
    pub capture_radius: f64,
    /// Cyclic waypoints, captured in order.
    pub checkpoints: &'static [Checkpoint],
    /// Start/finish line position.
    pub start_line: Checkpoint,
}

/// The built-in circuit: 800x600 playfield, four checkpoints, three laps.
pub static TRACK: Track = Track {
    width: 800.0,
    height: 600.0,
    laps: 3,
    margin: 50.0,
    capture_radius: 50.0,
    checkpoints: &[
        Checkpoint { x: 700.0, y: 300.0 },
        Checkpoint { x: 400.0, y: 500.0 },
        Checkpoint { x: 100.0, y: 300.0 },
        Checkpoint { x: 400.0, y: 100.0 },
    ],
    start_line: Checkpoint { x: 400.0, y: 300.0 },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn car_lookup_finds_every_table_entry() {
        for spec in &CARS {
            assert_eq!(car(spec.id).map(|c| c.id), Some(spec.id));
        }
        assert!(car("hovercraft").is_none());
    }

    #[test]
    fn only_timed_items_carry_durations() {
        assert!(ItemKind::Boost.duration().is_some());
        assert!(ItemKind::Shield.duration().is_some());
        assert!(ItemKind::Banana.duration().is_none());
        assert!(ItemKind::Missile.duration().is_none());
    }
}
