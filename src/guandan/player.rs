//! Per-seat player state.

use serde::{Deserialize, Serialize};

use super::card::Card;
use super::pattern::Pattern;

/// Player lifecycle; transitions are monotonic within a round and reset by
/// the next round.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PlayStatus {
  Waiting,
  Ready,
  Playing,
  Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
  pub user_id: i64,
  pub status: PlayStatus,
  /// Current hand; a multiset, order is irrelevant.
  pub hand: Vec<Card>,
  /// Every pattern this player has put down, passes included.
  pub played: Vec<Pattern>,
  /// Finishing position 1..=4; 0 while still playing.
  pub rank: i8,
  pub is_winner: bool,
  pub point_change: i32,
  pub coin_change: i32,
}

impl Player {
  pub fn new(user_id: i64) -> Player {
    Player {
      user_id,
      status: PlayStatus::Waiting,
      hand: Vec::new(),
      played: Vec::new(),
      rank: 0,
      is_winner: false,
      point_change: 0,
      coin_change: 0,
    }
  }

  pub fn set_hand(&mut self, cards: Vec<Card>) {
    self.hand = cards;
  }

  pub fn hand_count(&self) -> usize {
    self.hand.len()
  }

  pub fn played_count(&self) -> usize {
    self.played.len()
  }

  /// All cards this player has put down across the round.
  pub fn played_cards(&self) -> Vec<Card> {
    self.played.iter().flat_map(|p| p.cards.iter().copied()).collect()
  }

  /// Record a play. A pass (type `None`) is recorded without touching the
  /// hand; a real pattern must be wholly removable from the hand or the
  /// play is rejected and nothing changes.
  pub fn play(&mut self, pattern: Pattern) -> bool {
    if pattern.is_pass() {
      self.played.push(pattern);
      return true;
    }
    if pattern.cards.is_empty() {
      return false;
    }

    let mut remaining = self.hand.clone();
    for card in &pattern.cards {
      match remaining.iter().position(|c| c == card) {
        Some(i) => {
          remaining.swap_remove(i);
        }
        None => return false,
      }
    }
    self.hand = remaining;
    self.played.push(pattern);
    true
  }

  /// Clear all per-round runtime state, back to a fresh waiting seat.
  pub(crate) fn reset(&mut self) {
    self.status = PlayStatus::Waiting;
    self.hand.clear();
    self.played.clear();
    self.rank = 0;
    self.is_winner = false;
    self.point_change = 0;
    self.coin_change = 0;
  }
}

impl Default for Player {
  fn default() -> Player {
    Player::new(0)
  }
}
