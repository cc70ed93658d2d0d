//! Store path layout.
//!
//! Rooms live under `rooms/{code}` and the active game document under
//! `game/{code}`. Path segments are case-sensitive; room codes are always
//! uppercased before they reach this module.

/// Root of one room.
pub fn room(code: &str) -> String {
    format!("rooms/{code}")
}

/// Room metadata subtree.
pub fn room_meta(code: &str) -> String {
    format!("rooms/{code}/meta")
}

/// Membership map of a room.
pub fn room_players(code: &str) -> String {
    format!("rooms/{code}/players")
}

/// One member's record.
pub fn room_member(code: &str, member_id: &str) -> String {
    format!("rooms/{code}/players/{member_id}")
}

/// The room-level countdown value.
pub fn room_countdown(code: &str) -> String {
    format!("rooms/{code}/countdown")
}

/// Pointer to the room's active game.
pub fn room_current_game(code: &str) -> String {
    format!("rooms/{code}/currentGame")
}

/// Opaque data slot of the active game pointer.
pub fn room_game_data(code: &str) -> String {
    format!("rooms/{code}/currentGame/data")
}

/// Root of one game document.
pub fn game_doc(code: &str) -> String {
    format!("game/{code}")
}

/// The game phase value.
pub fn game_phase(code: &str) -> String {
    format!("game/{code}/phase")
}

/// The game countdown value.
pub fn game_countdown(code: &str) -> String {
    format!("game/{code}/countdown")
}

/// One member's player registration.
pub fn game_player(code: &str, member_id: &str) -> String {
    format!("game/{code}/players/{member_id}")
}

/// One racer's replicated position.
pub fn race_position(code: &str, member_id: &str) -> String {
    format!("game/{code}/raceData/positions/{member_id}")
}

/// The shared trap list.
pub fn race_traps(code: &str) -> String {
    format!("game/{code}/raceData/traps")
}

/// The shared finish order.
pub fn race_finish_order(code: &str) -> String {
    format!("game/{code}/raceData/finishOrder")
}

/// One chat entry keyed by its send timestamp.
pub fn chat_entry(code: &str, timestamp: u64) -> String {
    format!("game/{code}/chat/{timestamp}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_paths_nest_under_the_room() {
        assert_eq!(room("AB12"), "rooms/AB12");
        assert_eq!(room_member("AB12", "m1"), "rooms/AB12/players/m1");
        assert_eq!(race_position("AB12", "m1"), "game/AB12/raceData/positions/m1");
        assert_eq!(chat_entry("AB12", 17), "game/AB12/chat/17");
    }
}
