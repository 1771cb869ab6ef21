//! Team ranking and outcome tiers. Teams are fixed by seat parity:
//! seats {0, 2} against seats {1, 3}.

use serde::{Deserialize, Serialize};

/// Finishing ranks of one team's two seats.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TeamRank(pub i8, pub i8);

impl TeamRank {
  /// A team wins when either member finished first.
  pub fn is_winner(self) -> bool {
    self.0 == 1 || self.1 == 1
  }

  /// Outcome tier: 3 for a double-up (1,2), 2 for the middle win (1,3),
  /// 1 for a plain win (1,4), 0 otherwise.
  pub fn tier(self) -> u8 {
    if !self.is_winner() {
      return 0;
    }
    let teammate = if self.0 == 1 { self.1 } else { self.0 };
    match teammate {
      2 => 3,
      3 => 2,
      4 => 1,
      _ => 0,
    }
  }

  /// Base score for the tier: 12 / 6 / 3, or 0 for a losing team.
  pub fn score(self) -> i32 {
    match self.tier() {
      3 => 12,
      2 => 6,
      1 => 3,
      _ => 0,
    }
  }

  /// During a climb, a plain (1,4) win fails the climb.
  pub fn is_climb_failed(self) -> bool {
    self.is_winner() && self.tier() == 1
  }
}

/// Seat index of a seat's teammate.
pub fn teammate(seat: usize) -> usize {
  (seat + 2) % 4
}

/// Seats on the same team sit two apart.
pub fn is_teammate(a: usize, b: usize) -> bool {
  a != b && (a + b) % 2 == 0
}

/// The team (0 or 1) a seat belongs to.
pub fn team_of(seat: usize) -> usize {
  seat % 2
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn winner_needs_a_first_place() {
    assert!(TeamRank(1, 2).is_winner());
    assert!(TeamRank(4, 1).is_winner());
    assert!(!TeamRank(2, 3).is_winner());
    assert!(!TeamRank(3, 4).is_winner());
  }

  #[test]
  fn tiers_follow_the_teammate_rank() {
    assert_eq!(TeamRank(1, 2).tier(), 3);
    assert_eq!(TeamRank(2, 1).tier(), 3);
    assert_eq!(TeamRank(1, 3).tier(), 2);
    assert_eq!(TeamRank(3, 1).tier(), 2);
    assert_eq!(TeamRank(1, 4).tier(), 1);
    assert_eq!(TeamRank(4, 1).tier(), 1);
    assert_eq!(TeamRank(3, 4).tier(), 0);
  }

  #[test]
  fn scores_map_tiers() {
    assert_eq!(TeamRank(1, 2).score(), 12);
    assert_eq!(TeamRank(1, 3).score(), 6);
    assert_eq!(TeamRank(1, 4).score(), 3);
    assert_eq!(TeamRank(3, 4).score(), 0);
  }

  #[test]
  fn climb_fails_only_on_a_plain_win() {
    assert!(!TeamRank(1, 2).is_climb_failed());
    assert!(!TeamRank(1, 3).is_climb_failed());
    assert!(TeamRank(1, 4).is_climb_failed());
    assert!(TeamRank(4, 1).is_climb_failed());
    assert!(!TeamRank(3, 4).is_climb_failed());
  }

  #[test]
  fn seat_parity_teams() {
    assert_eq!(teammate(0), 2);
    assert_eq!(teammate(1), 3);
    assert_eq!(teammate(2), 0);
    assert_eq!(teammate(3), 1);
    assert!(is_teammate(0, 2));
    assert!(is_teammate(1, 3));
    assert!(!is_teammate(0, 1));
    assert!(!is_teammate(2, 2));
    assert_eq!(team_of(0), 0);
    assert_eq!(team_of(3), 1);
  }
}
