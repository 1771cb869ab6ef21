//! The Guandan (掼蛋) game engine: card primitives, combinatorial pattern
//! detection with wildcards, legal-move search, and the four-seat round
//! state machine with team scoring and level-card progression.
//!
//! Everything here is pure in-memory state with no I/O; a round is meant
//! to be driven single-threaded by a session layer.

mod card;
mod pattern;
mod player;
mod round;
mod search;
mod team;
mod trick;

pub use card::{Card, CardsExt, Deck, Rank, Suit};
pub use pattern::{Pattern, PatternType};
pub use player::{PlayStatus, Player};
pub use round::{Round, RoundOptions, RoundStatus, WinningInfo, SEATS};
pub use search::SearchExt;
pub use team::{is_teammate, team_of, teammate, TeamRank};
pub use trick::{decode_tricks, encode_tricks, TrickRecord};
