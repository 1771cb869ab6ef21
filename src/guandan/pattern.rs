//! Pattern detection and dominance comparison.
//!
//! A [`Pattern`] classifies an unordered group of cards against the current
//! trump. Wild cards (hearts of the trump rank) may stand in for any card,
//! with two restrictions: they cannot form a bomb on their own, and a lone
//! wild is worth the level rank.

use serde::{Deserialize, Serialize};

use super::card::{Card, CardsExt, Rank};

const RANK_SLOTS: usize = 17;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PatternType {
  /// A pass, or an unclassifiable group.
  None = 0,
  Single = 1,
  Pair = 2,
  Trips = 3,
  FullHouse = 4,
  /// Two consecutive triple-ranks (6 cards).
  TripsSeq = 5,
  /// Three consecutive pair-ranks (6 cards).
  PairSeq = 6,
  /// Five consecutive ranks.
  Straight = 7,
  StraightFlush = 8,
  /// Four or more of one rank.
  Bomb = 9,
  /// Both small and both big jokers; the absolute maximum.
  FourJokers = 10,
}

impl PatternType {
  pub(crate) fn from_u8(v: u8) -> Option<PatternType> {
    match v {
      0 => Some(PatternType::None),
      1 => Some(PatternType::Single),
      2 => Some(PatternType::Pair),
      3 => Some(PatternType::Trips),
      4 => Some(PatternType::FullHouse),
      5 => Some(PatternType::TripsSeq),
      6 => Some(PatternType::PairSeq),
      7 => Some(PatternType::Straight),
      8 => Some(PatternType::StraightFlush),
      9 => Some(PatternType::Bomb),
      10 => Some(PatternType::FourJokers),
      _ => None,
    }
  }
}

/// A classified group of cards. Immutable once constructed by
/// [`Pattern::detect`]; the round engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
  /// Seat index of the player who played this pattern; set by the round.
  pub player: i8,
  pub pattern_type: PatternType,
  pub trump: Rank,
  pub cards: Vec<Card>,
  /// Primary comparison point. For runs this is the rank of the top window
  /// card (`Five` for the ace-low window); for a full house, the triple.
  pub main_point: u8,
  /// Secondary point; only meaningful for a full house (the pair).
  pub sub_point: u8,
  pub length: usize,
  pub same_suit: bool,
}

impl Pattern {
  /// A pass: no cards, type [`PatternType::None`].
  pub fn pass(trump: Rank) -> Pattern {
    Pattern {
      player: 0,
      pattern_type: PatternType::None,
      trump,
      cards: Vec::new(),
      main_point: 0,
      sub_point: 0,
      length: 0,
      same_suit: false,
    }
  }

  pub fn is_pass(&self) -> bool {
    self.pattern_type == PatternType::None
  }

  /// Classify `cards` against `trump`.
  ///
  /// Returns a pattern of type [`PatternType::None`] when the group does
  /// not form any legal shape.
  pub fn detect(cards: &[Card], trump: Rank) -> Pattern {
    let mut p = Pattern {
      player: 0,
      pattern_type: PatternType::None,
      trump,
      cards: cards.to_vec(),
      main_point: 0,
      sub_point: 0,
      length: cards.len(),
      same_suit: false,
    };

    if p.length == 0 {
      return p;
    }

    if cards.has_four_jokers() {
      p.pattern_type = PatternType::FourJokers;
      return p;
    }

    // Separate wilds from ordinary cards and count ordinary ranks.
    let mut wild_count = 0usize;
    let mut normal: Vec<Card> = Vec::with_capacity(cards.len());
    let mut rank_counts = [0usize; RANK_SLOTS];
    for c in cards {
      if c.is_wild(trump) {
        wild_count += 1;
      } else {
        rank_counts[c.rank as usize] += 1;
        normal.push(*c);
      }
    }
    let distinct_ranks = rank_counts.iter().filter(|&&n| n > 0).count();

    // Monochromatic test over ordinary cards; wilds match any suit.
    p.same_suit = match normal.first() {
      Some(first) => normal.iter().all(|c| c.suit == first.suit),
      None => true,
    };

    // A bomb needs a single ordinary rank, so it always contains at least
    // one real card; the two wilds alone can never reach four.
    let bomb_rank = if distinct_ranks == 1 && p.length >= 4 {
      Rank::naturals()
        .chain([Rank::JokerSmall, Rank::JokerBig])
        .find(|r| rank_counts[*r as usize] > 0)
    } else {
      None
    };

    match p.length {
      1 => {
        p.pattern_type = PatternType::Single;
        p.main_point = single_point(&normal, trump);
      }
      2 => {
        if wild_count >= 1 || distinct_ranks == 1 {
          p.pattern_type = PatternType::Pair;
          p.main_point = single_point(&normal, trump);
        }
      }
      3 => {
        if wild_count >= 2 || distinct_ranks == 1 {
          p.pattern_type = PatternType::Trips;
          p.main_point = single_point(&normal, trump);
        }
      }
      4 => {
        if let Some(rank) = bomb_rank {
          p.pattern_type = PatternType::Bomb;
          p.main_point = rank.weight(trump);
        }
      }
      5 => {
        // Priority: straight flush > bomb > straight > full house.
        if p.same_suit {
          let mp = window_point(&rank_counts, wild_count, 5, 1);
          if mp > 0 {
            p.pattern_type = PatternType::StraightFlush;
            p.main_point = mp;
            return p;
          }
        }
        if let Some(rank) = bomb_rank {
          p.pattern_type = PatternType::Bomb;
          p.main_point = rank.weight(trump);
          return p;
        }
        let mp = window_point(&rank_counts, wild_count, 5, 1);
        if mp > 0 {
          p.pattern_type = PatternType::Straight;
          p.main_point = mp;
          return p;
        }
        let (mp, sp) = full_house_point(&rank_counts, wild_count, trump);
        if mp > 0 {
          p.pattern_type = PatternType::FullHouse;
          p.main_point = mp;
          p.sub_point = sp;
        }
      }
      6 => {
        // Priority: bomb > trips sequence > pair sequence.
        if let Some(rank) = bomb_rank {
          p.pattern_type = PatternType::Bomb;
          p.main_point = rank.weight(trump);
          return p;
        }
        let mp = window_point(&rank_counts, wild_count, 2, 3);
        if mp > 0 {
          p.pattern_type = PatternType::TripsSeq;
          p.main_point = mp;
          return p;
        }
        let mp = window_point(&rank_counts, wild_count, 3, 2);
        if mp > 0 {
          p.pattern_type = PatternType::PairSeq;
          p.main_point = mp;
        }
      }
      _ => {
        if let Some(rank) = bomb_rank {
          p.pattern_type = PatternType::Bomb;
          p.main_point = rank.weight(trump);
        }
      }
    }
    p
  }

  /// Dominance bracket of this pattern.
  ///
  /// 5: bomb longer than five. 4: straight flush. 3: five-card bomb.
  /// 2: four-card bomb. 1: everything else.
  pub fn level(&self) -> u8 {
    match self.pattern_type {
      PatternType::Bomb => {
        if self.length > 5 {
          5
        } else if self.length == 5 {
          3
        } else {
          2
        }
      }
      PatternType::StraightFlush => 4,
      _ => 1,
    }
  }

  /// Compare two patterns for dominance: `1` if `self` beats `other`,
  /// `-1` if it loses, `0` when equal or not comparable.
  pub fn compare(&self, other: &Pattern) -> i8 {
    if self.pattern_type == PatternType::FourJokers {
      if other.pattern_type == PatternType::FourJokers {
        return 0;
      }
      return 1;
    }
    if other.pattern_type == PatternType::FourJokers {
      return -1;
    }

    let l1 = self.level();
    let l2 = other.level();
    if l1 != l2 {
      return if l1 > l2 { 1 } else { -1 };
    }

    if l1 == 5 && self.length != other.length {
      return if self.length > other.length { 1 } else { -1 };
    }

    // Within bracket 1 only identical shapes are comparable.
    if l1 == 1 && self.pattern_type != other.pattern_type {
      return 0;
    }

    if self.main_point != other.main_point {
      return if self.main_point > other.main_point { 1 } else { -1 };
    }

    if self.pattern_type == PatternType::FullHouse && self.sub_point != other.sub_point {
      return if self.sub_point > other.sub_point { 1 } else { -1 };
    }

    0
  }
}

fn single_point(normal: &[Card], trump: Rank) -> u8 {
  match normal.first() {
    Some(c) => c.rank.weight(trump),
    // All wilds: worth the level rank.
    None => Rank::Level as u8,
  }
}

/// The rank occupying slot `i` of a window starting at `start`, where
/// `start == 0` is the ace-low window (A, 2, 3, ...).
fn window_rank(start: usize, i: usize) -> Rank {
  if start == 0 && i == 0 {
    Rank::Ace
  } else {
    Rank::from_u8((start + i) as u8).unwrap_or(Rank::None)
  }
}

/// Best main point of an exact run of `length` consecutive ranks with
/// `width` cards per rank, using wilds to fill deficits. Ordinary cards
/// must all sit inside the window with no slot over `width`; returns 0
/// when no window fits. The ace wraps only as the low end.
pub(crate) fn window_point(
  rank_counts: &[usize; RANK_SLOTS],
  wild_count: usize,
  length: usize,
  width: usize,
) -> u8 {
  let max_start = (Rank::Ace as usize).saturating_sub(length) + 1;
  let mut best = 0u8;

  for start in 0..=max_start {
    let mut wilds = wild_count;
    let mut possible = true;
    let mut top = 0u8;

    for i in 0..length {
      let r = window_rank(start, i);
      let count = rank_counts[r as usize];
      if count > width {
        possible = false;
        break;
      }
      let needed = width - count;
      if needed > wilds {
        possible = false;
        break;
      }
      wilds -= needed;
      if i == length - 1 {
        top = r as u8;
      }
    }

    if possible {
      // No ordinary cards may sit outside the window.
      for (rank, &count) in rank_counts.iter().enumerate() {
        if count == 0 {
          continue;
        }
        let in_window = (0..length).any(|i| window_rank(start, i) as usize == rank);
        if !in_window {
          possible = false;
          break;
        }
      }
    }

    if possible && top > best {
      best = top;
    }
  }
  best
}

/// Best `(triple weight, pair weight)` full house over the counted ranks,
/// lexicographically maximal; `(0, 0)` when none fits.
pub(crate) fn full_house_point(
  rank_counts: &[usize; RANK_SLOTS],
  wild_count: usize,
  trump: Rank,
) -> (u8, u8) {
  let mut best = (0u8, 0u8);

  for trips_rank in Rank::naturals() {
    for pair_rank in Rank::naturals() {
      if trips_rank == pair_rank {
        continue;
      }

      let count_t = rank_counts[trips_rank as usize];
      if count_t > 3 {
        continue;
      }
      let mut wilds = wild_count;
      let need_t = 3 - count_t;
      if need_t > wilds {
        continue;
      }
      wilds -= need_t;

      let count_p = rank_counts[pair_rank as usize];
      if count_p > 2 {
        continue;
      }
      if 2 - count_p > wilds {
        continue;
      }

      // Only the two chosen ranks may appear among the ordinary cards.
      let clean = rank_counts
        .iter()
        .enumerate()
        .all(|(rank, &count)| count == 0 || rank == trips_rank as usize || rank == pair_rank as usize);
      if !clean {
        continue;
      }

      let candidate = (trips_rank.weight(trump), pair_rank.weight(trump));
      if candidate > best {
        best = candidate;
      }
    }
  }
  best
}
