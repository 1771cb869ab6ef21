//! Legal-move search: find card sets in a hand that dominate a target
//! pattern.
//!
//! Candidates are produced in play-priority order: same-level dominators
//! first (cheapest escape), then higher-level bombs and straight flushes,
//! and four jokers last. Every returned set is materialized from actual
//! hand cards, with wilds filling deficits, so it is always a submultiset
//! of the hand.

use std::collections::HashMap;

use super::card::{Card, Rank, Suit};
use super::pattern::{Pattern, PatternType};

const RANK_SLOTS: usize = 17;
const MAX_BOMB_LEN: usize = 8;

/// Search methods on a hand of cards.
pub trait SearchExt {
  /// The first (minimal) dominating card set, or `None` when the hand
  /// cannot beat `target`.
  fn search(&self, target: &Pattern, trump: Rank) -> Option<Vec<Card>>;

  /// Every dominating card set, minimal first.
  fn search_all(&self, target: &Pattern, trump: Rank) -> Vec<Vec<Card>>;

  /// Whether any dominating set exists.
  fn can_beat(&self, target: &Pattern, trump: Rank) -> bool;
}

impl SearchExt for [Card] {
  fn search(&self, target: &Pattern, trump: Rank) -> Option<Vec<Card>> {
    Searcher::new(self, trump).run(target, true).into_iter().next()
  }

  fn search_all(&self, target: &Pattern, trump: Rank) -> Vec<Vec<Card>> {
    Searcher::new(self, trump).run(target, false)
  }

  fn can_beat(&self, target: &Pattern, trump: Rank) -> bool {
    self.search(target, trump).is_some()
  }
}

/// Hand indexed for candidate generation: ordinary cards bucketed by rank
/// and by suit, wilds pooled separately.
struct Searcher {
  trump: Rank,
  wilds: Vec<Card>,
  by_rank: Vec<Vec<Card>>,
  by_suit: HashMap<Suit, Vec<Card>>,
  four_jokers: Option<Vec<Card>>,
}

impl Searcher {
  fn new(hand: &[Card], trump: Rank) -> Searcher {
    let mut wilds = Vec::new();
    let mut by_rank: Vec<Vec<Card>> = vec![Vec::new(); RANK_SLOTS];
    let mut by_suit: HashMap<Suit, Vec<Card>> = HashMap::new();
    for c in hand {
      if c.is_wild(trump) {
        wilds.push(*c);
      } else {
        by_rank[c.rank as usize].push(*c);
        by_suit.entry(c.suit).or_default().push(*c);
      }
    }

    let mut small: Vec<Card> = by_rank[Rank::JokerSmall as usize].clone();
    let mut big: Vec<Card> = by_rank[Rank::JokerBig as usize].clone();
    let four_jokers = if small.len() >= 2 && big.len() >= 2 {
      small.truncate(2);
      big.truncate(2);
      small.extend(big);
      Some(small)
    } else {
      None
    };

    Searcher {
      trump,
      wilds,
      by_rank,
      by_suit,
      four_jokers,
    }
  }

  fn count(&self, rank: Rank) -> usize {
    self.by_rank[rank as usize].len()
  }

  /// `width` cards of `rank`, preferring reals and topping up with wilds.
  /// `None` when the hand cannot supply them.
  fn take_rank(&self, rank: Rank, width: usize) -> Option<Vec<Card>> {
    let real = self.count(rank).min(width);
    let deficit = width - real;
    if deficit > self.wilds.len() {
      return None;
    }
    let mut cards: Vec<Card> = self.by_rank[rank as usize][..real].to_vec();
    cards.extend_from_slice(&self.wilds[..deficit]);
    Some(cards)
  }

  fn run(&self, target: &Pattern, first_only: bool) -> Vec<Vec<Card>> {
    // Nothing dominates four jokers.
    if target.pattern_type == PatternType::FourJokers {
      return Vec::new();
    }

    let mut out: Vec<Vec<Card>> = Vec::new();
    let target_level = target.level();

    // Same-level dominators.
    match target_level {
      1 => self.same_shape(target, &mut out),
      2 => self.bombs(4, target.main_point, &mut out),
      3 => self.bombs(5, target.main_point, &mut out),
      4 => self.straight_flushes(target.main_point, &mut out),
      5 => {
        self.bombs(target.length, target.main_point, &mut out);
        if !(first_only && !out.is_empty()) {
          for len in target.length + 1..=MAX_BOMB_LEN {
            self.bombs(len, 0, &mut out);
            if first_only && !out.is_empty() {
              break;
            }
          }
        }
      }
      _ => {}
    }
    if first_only && !out.is_empty() {
      return out;
    }

    // Higher-level dominators: 4-bomb, 5-bomb, straight flush, big bombs.
    for level in target_level + 1..=5 {
      match level {
        2 => self.bombs(4, 0, &mut out),
        3 => self.bombs(5, 0, &mut out),
        4 => self.straight_flushes(0, &mut out),
        5 => {
          for len in 6..=MAX_BOMB_LEN {
            self.bombs(len, 0, &mut out);
            if first_only && !out.is_empty() {
              break;
            }
          }
        }
        _ => {}
      }
      if first_only && !out.is_empty() {
        return out;
      }
    }

    if let Some(jokers) = &self.four_jokers {
      out.push(jokers.clone());
    }
    if first_only {
      out.truncate(1);
    }
    out
  }

  /// Same-shape, same-level dominators for bracket-1 targets.
  fn same_shape(&self, target: &Pattern, out: &mut Vec<Vec<Card>>) {
    match target.pattern_type {
      PatternType::Single => self.singles(target.main_point, out),
      PatternType::Pair => self.tuples(2, target.main_point, out),
      PatternType::Trips => self.tuples(3, target.main_point, out),
      PatternType::FullHouse => {
        self.full_houses(target.main_point, target.sub_point, out);
      }
      PatternType::Straight => {
        self.sequences(target.length, 1, target.main_point, out);
      }
      PatternType::TripsSeq => {
        self.sequences(target.length / 3, 3, target.main_point, out);
      }
      PatternType::PairSeq => {
        self.sequences(target.length / 2, 2, target.main_point, out);
      }
      _ => {}
    }
  }

  fn singles(&self, min_point: u8, out: &mut Vec<Vec<Card>>) {
    let mut found: Vec<(u8, Vec<Card>)> = Vec::new();
    for rank in all_ranks() {
      let weight = rank.weight(self.trump);
      if weight > min_point && self.count(rank) > 0 {
        found.push((weight, vec![self.by_rank[rank as usize][0]]));
      }
    }
    // A lone wild plays as the level rank.
    if (Rank::Level as u8) > min_point && !self.wilds.is_empty() {
      found.push((Rank::Level as u8, vec![self.wilds[0]]));
    }
    push_sorted(found, out);
  }

  /// Pairs and trips; wilds may fill, but at least one real card anchors
  /// the rank (an all-wild tuple is generated separately at level weight).
  fn tuples(&self, width: usize, min_point: u8, out: &mut Vec<Vec<Card>>) {
    let mut found: Vec<(u8, Vec<Card>)> = Vec::new();
    for rank in all_ranks() {
      let weight = rank.weight(self.trump);
      if weight <= min_point || self.count(rank) == 0 {
        continue;
      }
      if let Some(cards) = self.take_rank(rank, width) {
        found.push((weight, cards));
      }
    }
    if (Rank::Level as u8) > min_point && self.wilds.len() >= width {
      found.push((Rank::Level as u8, self.wilds[..width].to_vec()));
    }
    push_sorted(found, out);
  }

  /// Bombs of exactly `length` cards with main point above `min_point`.
  /// A bomb must contain at least one real card.
  fn bombs(&self, length: usize, min_point: u8, out: &mut Vec<Vec<Card>>) {
    let mut found: Vec<(u8, Vec<Card>)> = Vec::new();
    for rank in all_ranks() {
      let weight = rank.weight(self.trump);
      if weight <= min_point || self.count(rank) == 0 {
        continue;
      }
      if self.count(rank) + self.wilds.len() < length {
        continue;
      }
      if let Some(cards) = self.take_rank(rank, length) {
        found.push((weight, cards));
      }
    }
    push_sorted(found, out);
  }

  /// Straight flushes with top rank above `min_point`, searched per suit.
  fn straight_flushes(&self, min_point: u8, out: &mut Vec<Vec<Card>>) {
    let mut found: Vec<(u8, Vec<Card>)> = Vec::new();
    for cards in self.by_suit.values() {
      let mut counts = [0usize; RANK_SLOTS];
      let mut pools: Vec<Vec<Card>> = vec![Vec::new(); RANK_SLOTS];
      for c in cards {
        counts[c.rank as usize] += 1;
        pools[c.rank as usize].push(*c);
      }
      self.windows(&counts, &pools, 5, 1, min_point, &mut found);
    }
    push_sorted(found, out);
  }

  /// Mixed-suit runs of `slots` consecutive ranks, `width` cards each.
  fn sequences(&self, slots: usize, width: usize, min_point: u8, out: &mut Vec<Vec<Card>>) {
    let mut counts = [0usize; RANK_SLOTS];
    for rank in Rank::naturals() {
      counts[rank as usize] = self.count(rank);
    }
    let mut found: Vec<(u8, Vec<Card>)> = Vec::new();
    self.windows(&counts, &self.by_rank, slots, width, min_point, &mut found);
    push_sorted(found, out);
  }

  /// Scan every window `[start, start+slots)` over the natural ranks
  /// (start 0 is the ace-low window) and materialize each fit.
  fn windows(
    &self,
    counts: &[usize; RANK_SLOTS],
    pools: &[Vec<Card>],
    slots: usize,
    width: usize,
    min_point: u8,
    found: &mut Vec<(u8, Vec<Card>)>,
  ) {
    let max_start = (Rank::Ace as usize).saturating_sub(slots) + 1;
    for start in 0..=max_start {
      let mut wilds_left = self.wilds.len();
      let mut cards: Vec<Card> = Vec::with_capacity(slots * width);
      let mut top = 0u8;
      let mut possible = true;

      for i in 0..slots {
        let rank = window_rank(start, i);
        let real = counts[rank as usize].min(width);
        let deficit = width - real;
        if deficit > wilds_left {
          possible = false;
          break;
        }
        wilds_left -= deficit;
        cards.extend_from_slice(&pools[rank as usize][..real]);
        if i == slots - 1 {
          top = rank as u8;
        }
      }

      if possible && top > min_point {
        let used = self.wilds.len() - wilds_left;
        cards.extend_from_slice(&self.wilds[..used]);
        found.push((top, cards));
      }
    }
  }

  /// Full houses dominating `(min_main, min_sub)` lexicographically. The
  /// pair rank needs a real anchor so the set cannot collapse into a bomb.
  fn full_houses(&self, min_main: u8, min_sub: u8, out: &mut Vec<Vec<Card>>) {
    let mut found: Vec<(u16, Vec<Card>)> = Vec::new();
    for trips_rank in Rank::naturals() {
      for pair_rank in Rank::naturals() {
        if trips_rank == pair_rank {
          continue;
        }
        let mp = trips_rank.weight(self.trump);
        let sp = pair_rank.weight(self.trump);
        if mp < min_main || (mp == min_main && sp <= min_sub) {
          continue;
        }
        if self.count(trips_rank) == 0 || self.count(pair_rank) == 0 {
          continue;
        }

        let trips_real = self.count(trips_rank).min(3);
        let pair_real = self.count(pair_rank).min(2);
        let deficit = (3 - trips_real) + (2 - pair_real);
        if deficit > self.wilds.len() {
          continue;
        }

        let mut cards: Vec<Card> = self.by_rank[trips_rank as usize][..trips_real].to_vec();
        cards.extend_from_slice(&self.by_rank[pair_rank as usize][..pair_real]);
        cards.extend_from_slice(&self.wilds[..deficit]);
        found.push(((mp as u16) << 8 | sp as u16, cards));
      }
    }
    push_sorted(found, out);
  }
}

fn all_ranks() -> impl Iterator<Item = Rank> {
  Rank::naturals().chain([Rank::JokerSmall, Rank::JokerBig])
}

fn window_rank(start: usize, i: usize) -> Rank {
  if start == 0 && i == 0 {
    Rank::Ace
  } else {
    Rank::from_u8((start + i) as u8).unwrap_or(Rank::None)
  }
}

fn push_sorted<K: Ord + Copy>(mut found: Vec<(K, Vec<Card>)>, out: &mut Vec<Vec<Card>>) {
  found.sort_by_key(|(key, _)| *key);
  out.extend(found.into_iter().map(|(_, cards)| cards));
}
