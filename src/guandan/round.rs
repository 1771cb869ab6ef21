//! The Guandan round state machine: turn order, trick lifecycle, ranking,
//! settlement, and level-card progression across rounds.
//!
//! The round is pure in-memory state. It never suspends and performs no
//! I/O; concurrent callers must serialize access externally.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::GameError;

use super::card::{Deck, Rank};
use super::pattern::{Pattern, PatternType};
use super::player::{PlayStatus, Player};
use super::team::{team_of, teammate, TeamRank};
use super::trick::TrickRecord;

pub const SEATS: usize = 4;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum RoundStatus {
  Waiting,
  Playing,
  Finished,
}

/// Tunables fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOptions {
  /// Rank a team must pass to win the match; reaching it starts a climb.
  pub max_trump: Rank,
  /// Rotate seats 0,1,2 between rounds to reshuffle partnerships.
  pub rotate_seats: bool,
  /// Pattern level at or above which a play doubles the round multiplier.
  pub scoring_floor: u8,
  pub climb_enabled: bool,
  /// Cap on retained round history.
  pub max_rounds: usize,
  /// Advisory per-play timeout for the session layer.
  pub play_timeout: Duration,
}

impl Default for RoundOptions {
  fn default() -> RoundOptions {
    RoundOptions {
      max_trump: Rank::Ace,
      rotate_seats: false,
      scoring_floor: 5,
      climb_enabled: true,
      max_rounds: 10,
      play_timeout: Duration::from_secs(30),
    }
  }
}

/// Settlement summary for a finished round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinningInfo {
  pub winning_team: usize,
  pub team_ranks: [TeamRank; 2],
  /// Outcome tier of the winning team (3 double-up, 2 middle, 1 plain).
  pub winning_level: u8,
  pub point_delta: i32,
  pub coin_delta: i32,
  pub is_climbing_win: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
  pub options: RoundOptions,
  pub status: RoundStatus,
  pub players: [Player; SEATS],
  /// Seat currently on turn.
  pub index: usize,
  pub trick_count: u32,
  /// Records of the trick currently on the table.
  pub tricks: Vec<TrickRecord>,
  /// Level card the round is played for.
  pub trump: Rank,
  /// Each team's own level card.
  pub trumps: [Rank; 2],
  /// Which team holds the current trump; `None` before the first result.
  pub trump_team: Option<usize>,
  /// Consecutive failed climbs per team.
  pub climb_counts: [u8; 2],
  /// Rounds each team has spent at the max trump.
  pub max_trump_counts: [u32; 2],
  pub started_at: i64,
  pub finished_at: i64,
  pub winning: Option<WinningInfo>,
  /// Prior rounds, most recent first; snapshots carry no nested history.
  pub history: Vec<Round>,
}

impl Round {
  pub fn new(options: RoundOptions) -> Round {
    Round {
      options,
      status: RoundStatus::Waiting,
      players: Default::default(),
      index: 0,
      trick_count: 0,
      tricks: Vec::new(),
      trump: Rank::Two,
      trumps: [Rank::Two, Rank::Two],
      trump_team: None,
      climb_counts: [0, 0],
      max_trump_counts: [0, 0],
      started_at: 0,
      finished_at: 0,
      winning: None,
      history: Vec::new(),
    }
  }

  /// Ready to start: still waiting, every seat claimed and ready.
  pub fn is_ready(&self) -> bool {
    self.status == RoundStatus::Waiting
      && self
        .players
        .iter()
        .all(|p| p.user_id != 0 && p.status == PlayStatus::Ready)
  }

  /// Atomically gate on [`Round::is_ready`] and move everyone into play.
  pub fn start(&mut self) -> bool {
    if !self.is_ready() {
      return false;
    }
    self.status = RoundStatus::Playing;
    self.started_at = now_millis();
    for p in &mut self.players {
      p.status = PlayStatus::Playing;
    }
    true
  }

  /// Deal a fresh shuffled double deck, 27 cards per seat.
  pub fn deal(&mut self) {
    let mut deck = Deck::double();
    deck.shuffle();
    for (seat, hand) in deck.deal(SEATS).into_iter().enumerate() {
      self.players[seat].set_hand(hand);
    }
  }

  pub fn seat_of(&self, user_id: i64) -> Option<usize> {
    self.players.iter().position(|p| p.user_id == user_id)
  }

  pub fn is_finished(&self) -> bool {
    self.status == RoundStatus::Finished
  }

  /// The round is a climb when the trump has reached the configured max.
  pub fn is_climbing(&self) -> bool {
    self.options.climb_enabled
      && self.options.max_trump != Rank::None
      && self.trump == self.options.max_trump
  }

  fn is_active(&self, seat: usize) -> bool {
    self.players[seat].status == PlayStatus::Playing && self.players[seat].hand_count() > 0
  }

  fn active_count(&self) -> usize {
    (0..SEATS).filter(|&s| self.is_active(s)).count()
  }

  /// Play a pattern (or a pass) for `user_id`.
  ///
  /// Rejections leave the round untouched: the caller's session layer is
  /// expected to surface them and retry with a corrected move.
  pub fn play(&mut self, user_id: i64, mut pattern: Pattern) -> Result<(), GameError> {
    if self.status != RoundStatus::Playing {
      return Err(GameError::NotPlaying);
    }
    let seat = self.seat_of(user_id).ok_or(GameError::PlayerNotFound)?;
    if seat != self.index {
      return Err(GameError::NotYourTurn);
    }

    if pattern.is_pass() {
      if !pattern.cards.is_empty() {
        return Err(GameError::InvalidPattern);
      }
      // A trick must open with a real play.
      if self.tricks.is_empty() {
        return Err(GameError::InvalidPattern);
      }
    } else if pattern.cards.is_empty() {
      return Err(GameError::InvalidPattern);
    }

    pattern.player = seat as i8;
    let pattern_type = pattern.pattern_type;
    let pattern_index = self.players[seat].played_count() as u8;
    if !self.players[seat].play(pattern) {
      return Err(GameError::PlayFailed);
    }

    self.tricks.push(TrickRecord {
      pattern_type,
      player_index: seat as u8,
      pattern_index,
    });

    self.check();
    self.advance();
    Ok(())
  }

  /// Assign finishing ranks to emptied hands and close the round when a
  /// whole team is done. Idempotent between plays.
  pub fn check(&mut self) -> bool {
    if self.status != RoundStatus::Playing {
      return false;
    }

    let mut changed = false;
    for seat in 0..SEATS {
      if self.players[seat].status == PlayStatus::Playing && self.players[seat].hand_count() == 0 {
        let rank = self.next_rank();
        let p = &mut self.players[seat];
        p.status = PlayStatus::Finished;
        p.rank = rank;
        changed = true;
      }
    }

    let team_done = |a: usize, b: usize| {
      self.players[a].status == PlayStatus::Finished
        && self.players[b].status == PlayStatus::Finished
    };
    if team_done(0, 2) || team_done(1, 3) {
      for p in &mut self.players {
        if p.status == PlayStatus::Playing {
          p.status = PlayStatus::Finished;
          p.rank = 4;
          changed = true;
        }
      }
      self.status = RoundStatus::Finished;
      self.finished_at = now_millis();
    }
    changed
  }

  fn next_rank(&self) -> i8 {
    self.players.iter().map(|p| p.rank).max().unwrap_or(0) + 1
  }

  /// Close the trick when enough consecutive passes follow the last real
  /// play, otherwise move the turn to the next active seat.
  fn advance(&mut self) {
    if self.status != RoundStatus::Playing {
      return;
    }

    let last_play = self.tricks.iter().rposition(|r| !r.is_pass());
    if let Some(pos) = last_play {
      let leader = self.tricks[pos].player_index as usize;
      let trailing_passes = self.tricks.len() - pos - 1;
      let active = self.active_count();
      let threshold = if self.is_active(leader) {
        active.saturating_sub(1)
      } else {
        active
      };

      if trailing_passes >= threshold {
        // Trick won: the last real player leads, or their teammate if
        // they have already gone out.
        let next = if self.is_active(leader) {
          leader
        } else if self.is_active(teammate(leader)) {
          teammate(leader)
        } else {
          self.next_active_after(self.index)
        };
        self.index = next;
        self.tricks.clear();
        self.trick_count += 1;
        return;
      }
    }

    self.index = self.next_active_after(self.index);
  }

  fn next_active_after(&self, seat: usize) -> usize {
    let mut next = (seat + 1) % SEATS;
    for _ in 0..SEATS {
      if self.is_active(next) {
        return next;
      }
      next = (next + 1) % SEATS;
    }
    seat
  }

  pub fn ranks(&self) -> [i8; SEATS] {
    [
      self.players[0].rank,
      self.players[1].rank,
      self.players[2].rank,
      self.players[3].rank,
    ]
  }

  /// Rank pairs per team: seats {0,2} and {1,3}.
  pub fn team_ranks(&self) -> [TeamRank; 2] {
    [
      TeamRank(self.players[0].rank, self.players[2].rank),
      TeamRank(self.players[1].rank, self.players[3].rank),
    ]
  }

  /// The team holding first place, once the round is finished.
  pub fn winning_team(&self) -> Option<usize> {
    if self.status != RoundStatus::Finished {
      return None;
    }
    self
      .players
      .iter()
      .position(|p| p.rank == 1)
      .map(team_of)
  }

  /// Count of plays at or above the scoring floor; four jokers always
  /// qualify.
  pub fn count_doubles(&self) -> u32 {
    self
      .players
      .iter()
      .flat_map(|p| p.played.iter())
      .filter(|pat| {
        pat.pattern_type == PatternType::FourJokers || pat.level() >= self.options.scoring_floor
      })
      .count() as u32
  }

  /// Round multiplier: 2^N over qualifying plays.
  pub fn multiplier(&self) -> i32 {
    1i32 << self.count_doubles().min(30)
  }

  /// Settle points and coins for a finished round.
  pub fn settle(&mut self, base_point: i32, base_coin: i32) -> Result<(), GameError> {
    if self.status != RoundStatus::Finished {
      return Err(GameError::NotFinished);
    }
    let winning_team = self.winning_team().ok_or(GameError::NoWinningTeam)?;
    let team_ranks = self.team_ranks();
    let tier = team_ranks[winning_team].tier();
    let multiplier = self.multiplier();

    let point_delta = base_point * team_ranks[winning_team].score() * multiplier;
    let coin_delta = base_coin * team_ranks[winning_team].score() * multiplier;

    let is_climbing_win =
      self.trump_team == Some(winning_team) && self.is_climbing() && tier != 1;

    for seat in 0..SEATS {
      let wins = team_of(seat) == winning_team;
      let p = &mut self.players[seat];
      p.is_winner = wins;
      p.point_change = if wins { point_delta } else { -point_delta };
      p.coin_change = if wins { coin_delta } else { -coin_delta };
    }

    if let Some(tt) = self.trump_team {
      if self.trumps[tt] == self.options.max_trump {
        self.max_trump_counts[tt] += 1;
      }
    }

    self.winning = Some(WinningInfo {
      winning_team,
      team_ranks,
      winning_level: tier,
      point_delta,
      coin_delta,
      is_climbing_win,
    });
    Ok(())
  }

  /// Archive this round and roll state forward: level-card progression,
  /// climb bookkeeping, seat reset, optional rotation.
  pub fn next_round(&mut self) -> Result<(), GameError> {
    if self.status != RoundStatus::Finished {
      return Err(GameError::NotFinished);
    }
    let winning_team = self.winning_team().ok_or(GameError::NoWinningTeam)?;
    let team_ranks = self.team_ranks();
    let tier = team_ranks[winning_team].tier();
    let was_climbing = self.is_climbing();
    let former_trump_team = self.trump_team;

    // First place leads the next round.
    if let Some(first) = self.players.iter().position(|p| p.rank == 1) {
      self.index = first;
    }

    // Snapshot with its own history dropped, most recent first.
    let mut snapshot = self.clone();
    snapshot.history = Vec::new();
    self.history.insert(0, snapshot);
    self.history.truncate(self.options.max_rounds);

    let climb_fail = (was_climbing && tier == 1)
      || former_trump_team.is_some_and(|tt| tt != winning_team);
    let mut climb_success = false;

    if climb_fail {
      // The burden of the failed climb falls on the former trump team.
      if let Some(tt) = former_trump_team {
        self.climb_counts[tt] += 1;
        if self.climb_counts[tt] >= 3 {
          self.trumps[tt] = Rank::Two;
          self.climb_counts[tt] = 0;
        }
      }
    } else if was_climbing {
      // Over the mountain: the match resets wholesale.
      climb_success = true;
      self.trumps = [Rank::Two, Rank::Two];
      self.climb_counts = [0, 0];
      self.trump = Rank::Two;
    } else {
      let upgraded = (self.trumps[winning_team] as u8).saturating_add(tier);
      self.trumps[winning_team] =
        Rank::from_u8(upgraded.min(self.options.max_trump as u8)).unwrap_or(self.options.max_trump);
    }

    if !climb_success {
      self.trump = self.trumps[winning_team];
    }
    self.trump_team = Some(winning_team);

    self.winning = None;
    self.status = RoundStatus::Waiting;
    self.started_at = 0;
    self.finished_at = 0;
    self.tricks.clear();
    self.trick_count = 0;
    for p in &mut self.players {
      p.reset();
    }
    if self.options.rotate_seats {
      self.rotate();
    }
    Ok(())
  }

  /// Three-way rotation of seats 0, 1, 2; guarantees new partnerships.
  fn rotate(&mut self) {
    self.players.swap(0, 1);
    self.players.swap(1, 2);
  }
}

fn now_millis() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::guandan::card::{Card, Suit};
  use crate::guandan::search::SearchExt;

  fn card(rank: Rank, suit: Suit) -> Card {
    Card::new(rank, suit)
  }

  fn seated_round() -> Round {
    let mut round = Round::new(RoundOptions::default());
    for (i, p) in round.players.iter_mut().enumerate() {
      p.user_id = (i + 1) as i64;
      p.status = PlayStatus::Ready;
    }
    round
  }

  fn finish_with_ranks(round: &mut Round, ranks: [i8; 4]) {
    round.status = RoundStatus::Finished;
    for (seat, rank) in ranks.into_iter().enumerate() {
      round.players[seat].rank = rank;
      round.players[seat].status = PlayStatus::Finished;
    }
  }

  #[test]
  fn ready_needs_all_seats_claimed_and_ready() {
    let mut round = Round::new(RoundOptions::default());
    assert!(!round.is_ready());

    for (i, p) in round.players.iter_mut().enumerate() {
      p.user_id = (i + 1) as i64;
    }
    assert!(!round.is_ready());

    for p in &mut round.players {
      p.status = PlayStatus::Ready;
    }
    assert!(round.is_ready());

    round.status = RoundStatus::Playing;
    assert!(!round.is_ready());
  }

  #[test]
  fn start_moves_everyone_into_play() {
    let mut round = Round::new(RoundOptions::default());
    assert!(!round.start());

    let mut round = seated_round();
    assert!(round.start());
    assert_eq!(round.status, RoundStatus::Playing);
    assert!(round.started_at > 0);
    for p in &round.players {
      assert_eq!(p.status, PlayStatus::Playing);
    }
  }

  #[test]
  fn deal_splits_the_double_deck_evenly() {
    let mut round = seated_round();
    round.start();
    round.deal();
    for p in &round.players {
      assert_eq!(p.hand_count(), 27);
    }
  }

  #[test]
  fn play_rejects_out_of_turn_and_unknown_players() {
    let mut round = seated_round();
    round.start();
    round.deal();

    let pattern = Pattern::detect(&[round.players[1].hand[0]], round.trump);
    assert_eq!(round.play(2, pattern.clone()), Err(GameError::NotYourTurn));
    assert_eq!(round.play(99, pattern), Err(GameError::PlayerNotFound));

    let mut waiting = seated_round();
    let pattern = Pattern::pass(Rank::Two);
    assert_eq!(waiting.play(1, pattern), Err(GameError::NotPlaying));
  }

  #[test]
  fn play_rejects_cards_not_held() {
    let mut round = seated_round();
    round.start();
    round.deal();
    round.players[0].hand = vec![card(Rank::Three, Suit::Spade)];

    let foreign = Pattern::detect(&[card(Rank::Four, Suit::Club)], round.trump);
    assert_eq!(round.play(1, foreign), Err(GameError::PlayFailed));
    // The failed play consumed nothing.
    assert_eq!(round.players[0].hand_count(), 1);
    assert_eq!(round.index, 0);
  }

  #[test]
  fn a_trick_must_open_with_a_real_play() {
    let mut round = seated_round();
    round.start();
    round.deal();
    assert_eq!(
      round.play(1, Pattern::pass(round.trump)),
      Err(GameError::InvalidPattern)
    );
  }

  #[test]
  fn three_passes_close_the_trick_and_return_the_lead() {
    let mut round = seated_round();
    round.start();
    round.deal();
    round.players[0].hand = vec![card(Rank::Nine, Suit::Spade), card(Rank::Three, Suit::Club)];

    let lead = Pattern::detect(&[card(Rank::Nine, Suit::Spade)], round.trump);
    round.play(1, lead).unwrap();
    assert_eq!(round.index, 1);

    round.play(2, Pattern::pass(round.trump)).unwrap();
    round.play(3, Pattern::pass(round.trump)).unwrap();
    assert_eq!(round.trick_count, 0);
    round.play(4, Pattern::pass(round.trump)).unwrap();

    // Trick closed, winner leads again.
    assert_eq!(round.trick_count, 1);
    assert!(round.tricks.is_empty());
    assert_eq!(round.index, 0);
  }

  #[test]
  fn trick_won_by_exited_player_passes_lead_to_teammate() {
    let mut round = seated_round();
    round.start();
    round.deal();
    // Seat 0 goes out on this play.
    round.players[0].hand = vec![card(Rank::Nine, Suit::Spade)];

    let lead = Pattern::detect(&[card(Rank::Nine, Suit::Spade)], round.trump);
    round.play(1, lead).unwrap();
    assert_eq!(round.players[0].status, PlayStatus::Finished);
    assert_eq!(round.players[0].rank, 1);

    // All three remaining actives must pass to close the trick.
    round.play(2, Pattern::pass(round.trump)).unwrap();
    round.play(3, Pattern::pass(round.trump)).unwrap();
    round.play(4, Pattern::pass(round.trump)).unwrap();

    // Seat 0 is out, so the lead falls to their teammate, seat 2.
    assert_eq!(round.index, 2);
    assert_eq!(round.trick_count, 1);
  }

  #[test]
  fn check_is_idempotent_between_plays() {
    let mut round = seated_round();
    round.start();
    round.deal();
    round.players[1].hand = Vec::new();

    assert!(round.check());
    let snapshot = round.ranks();
    assert!(!round.check());
    assert_eq!(round.ranks(), snapshot);
  }

  #[test]
  fn ranks_sum_to_ten_on_a_natural_finish() {
    let mut round = seated_round();
    round.start();
    round.deal();

    round.players[0].hand = Vec::new();
    round.check();
    round.players[1].hand = Vec::new();
    round.check();
    round.players[2].hand = Vec::new();
    round.check();

    assert!(round.is_finished());
    let total: i8 = round.ranks().iter().sum();
    assert_eq!(total, 10);
  }

  #[test]
  fn double_up_finish_ranks_remaining_last() {
    let mut round = seated_round();
    round.start();
    round.deal();

    round.players[0].hand = Vec::new();
    round.check();
    round.players[2].hand = Vec::new();
    round.check();

    assert!(round.is_finished());
    assert_eq!(round.ranks(), [1, 4, 2, 4]);
    assert_eq!(round.winning_team(), Some(0));
  }

  #[test]
  fn settle_reproduces_the_double_up_arithmetic() {
    // Base point 10, double-up (tier 3, score 12), no qualifying bombs.
    let mut round = seated_round();
    finish_with_ranks(&mut round, [1, 4, 2, 4]);

    round.settle(10, 100).unwrap();
    let winning = round.winning.as_ref().unwrap();
    assert_eq!(winning.winning_team, 0);
    assert_eq!(winning.winning_level, 3);
    assert_eq!(winning.point_delta, 120);

    assert_eq!(round.players[0].point_change, 120);
    assert_eq!(round.players[2].point_change, 120);
    assert_eq!(round.players[1].point_change, -120);
    assert_eq!(round.players[3].point_change, -120);
    assert!(round.players[0].is_winner && round.players[2].is_winner);
    assert!(!round.players[1].is_winner && !round.players[3].is_winner);

    let total: i32 = round.players.iter().map(|p| p.point_change).sum();
    assert_eq!(total, 0);
  }

  #[test]
  fn settle_requires_a_finished_round() {
    let mut round = seated_round();
    assert_eq!(round.settle(10, 100), Err(GameError::NotFinished));
  }

  #[test]
  fn qualifying_plays_double_the_multiplier() {
    let mut round = seated_round();
    assert_eq!(round.multiplier(), 1);

    // A six-card bomb qualifies (level 5).
    let bomb: Vec<Card> = std::iter::repeat(card(Rank::Five, Suit::Spade)).take(6).collect();
    round.players[0].played.push(Pattern::detect(&bomb, round.trump));
    assert_eq!(round.count_doubles(), 1);
    assert_eq!(round.multiplier(), 2);

    // Four jokers always qualify.
    let jokers = vec![
      card(Rank::JokerSmall, Suit::Joker),
      card(Rank::JokerSmall, Suit::Joker),
      card(Rank::JokerBig, Suit::Joker),
      card(Rank::JokerBig, Suit::Joker),
    ];
    round.players[1].played.push(Pattern::detect(&jokers, round.trump));
    assert_eq!(round.multiplier(), 4);

    // A four-card bomb (level 2) stays below the default floor.
    let small: Vec<Card> = std::iter::repeat(card(Rank::Nine, Suit::Club)).take(4).collect();
    round.players[2].played.push(Pattern::detect(&small, round.trump));
    assert_eq!(round.multiplier(), 4);
  }

  #[test]
  fn next_round_upgrades_the_winners_trump() {
    let mut round = seated_round();
    round.start();
    round.deal();
    finish_with_ranks(&mut round, [1, 4, 2, 4]);
    round.settle(10, 100).unwrap();

    round.next_round().unwrap();

    // Double-up climbs three levels: 2 + 3 = 5.
    assert_eq!(round.trumps[0], Rank::Five);
    assert_eq!(round.trump, Rank::Five);
    assert_eq!(round.trump_team, Some(0));
    assert_eq!(round.history.len(), 1);
    assert!(round.history[0].history.is_empty());
    assert_eq!(round.status, RoundStatus::Waiting);
    assert!(round.winning.is_none());

    for p in &round.players {
      assert_eq!(p.status, PlayStatus::Waiting);
      assert_eq!(p.hand_count(), 0);
      assert_eq!(p.played_count(), 0);
      assert_eq!(p.rank, 0);
      assert_eq!(p.point_change, 0);
      assert!(!p.is_winner);
    }
  }

  #[test]
  fn trump_is_capped_at_the_configured_max() {
    let mut round = seated_round();
    round.trumps[0] = Rank::King;
    round.trump = Rank::King;
    round.trump_team = Some(0);
    finish_with_ranks(&mut round, [1, 4, 2, 4]);
    round.settle(10, 100).unwrap();

    round.next_round().unwrap();
    assert_eq!(round.trumps[0], Rank::Ace);
    assert_eq!(round.trump, Rank::Ace);
  }

  #[test]
  fn climb_fail_three_times_resets_the_trump() {
    let mut round = seated_round();
    round.trumps[0] = Rank::Ace;
    round.trump = Rank::Ace;
    round.trump_team = Some(0);

    for attempt in 1..=3u8 {
      assert!(round.is_climbing());
      // Plain (1,4) win by the trump team fails the climb.
      finish_with_ranks(&mut round, [1, 2, 4, 3]);
      round.settle(10, 100).unwrap();
      round.next_round().unwrap();

      if attempt < 3 {
        assert_eq!(round.trumps[0], Rank::Ace);
        assert_eq!(round.climb_counts[0], attempt);
        round.trump = Rank::Ace;
      } else {
        assert_eq!(round.trumps[0], Rank::Two);
        assert_eq!(round.climb_counts[0], 0);
      }
      for p in &mut round.players {
        p.status = PlayStatus::Ready;
      }
    }
  }

  #[test]
  fn climb_success_resets_the_whole_match() {
    let mut round = seated_round();
    round.trumps[0] = Rank::Ace;
    round.trump = Rank::Ace;
    round.trump_team = Some(0);
    round.climb_counts[0] = 2;

    finish_with_ranks(&mut round, [1, 4, 2, 4]);
    round.settle(10, 100).unwrap();
    let winning = round.winning.clone().unwrap();
    assert!(winning.is_climbing_win);

    round.next_round().unwrap();
    assert_eq!(round.trumps, [Rank::Two, Rank::Two]);
    assert_eq!(round.climb_counts, [0, 0]);
    assert_eq!(round.trump, Rank::Two);
  }

  #[test]
  fn losing_the_round_as_trump_team_counts_as_a_climb_fail() {
    let mut round = seated_round();
    round.trumps[1] = Rank::Five;
    round.trump = Rank::Five;
    round.trump_team = Some(1);

    // Team 0 wins while team 1 held the trump.
    finish_with_ranks(&mut round, [1, 4, 3, 4]);
    round.settle(10, 100).unwrap();
    round.next_round().unwrap();

    assert_eq!(round.climb_counts[1], 1);
    // No upgrade on a defended loss; the lead merely changes hands.
    assert_eq!(round.trumps[0], Rank::Two);
    assert_eq!(round.trump, Rank::Two);
    assert_eq!(round.trump_team, Some(0));
  }

  #[test]
  fn settle_counts_rounds_spent_at_max_trump() {
    let mut round = seated_round();
    round.trumps[0] = Rank::Ace;
    round.trump = Rank::Ace;
    round.trump_team = Some(0);

    finish_with_ranks(&mut round, [1, 2, 4, 4]);
    round.settle(10, 100).unwrap();
    assert_eq!(round.max_trump_counts[0], 1);
  }

  #[test]
  fn history_is_bounded_and_most_recent_first() {
    let mut round = seated_round();
    round.options.max_rounds = 2;

    for i in 0..4 {
      finish_with_ranks(&mut round, [1, 4, 2, 4]);
      round.players[0].point_change = i;
      round.status = RoundStatus::Finished;
      round.next_round().unwrap();
      for p in &mut round.players {
        p.status = PlayStatus::Ready;
      }
    }

    assert_eq!(round.history.len(), 2);
    assert_eq!(round.history[0].players[0].point_change, 3);
    assert_eq!(round.history[1].players[0].point_change, 2);
  }

  #[test]
  fn rotation_reassigns_partnerships() {
    let mut round = seated_round();
    round.options.rotate_seats = true;
    finish_with_ranks(&mut round, [1, 4, 2, 4]);
    round.settle(10, 100).unwrap();
    round.next_round().unwrap();

    // (1, 2, 3, 4) -> (2, 3, 1, 4).
    let ids: Vec<i64> = round.players.iter().map(|p| p.user_id).collect();
    assert_eq!(ids, vec![2, 3, 1, 4]);
  }

  #[test]
  fn first_place_leads_the_next_round() {
    let mut round = seated_round();
    finish_with_ranks(&mut round, [4, 1, 4, 2]);
    round.settle(10, 100).unwrap();
    round.next_round().unwrap();
    assert_eq!(round.index, 1);
  }

  #[test]
  fn full_round_play_through_with_searched_moves() {
    let mut round = seated_round();
    round.start();
    round.deal();

    // Drive the round with searched moves until it finishes; the lead
    // always plays their lowest single.
    let mut guard = 0;
    while !round.is_finished() {
      guard += 1;
      assert!(guard < 1000, "round failed to converge");

      let seat = round.index;
      let user = round.players[seat].user_id;
      let trump = round.trump;
      if round.tricks.is_empty() {
        let lead = vec![round.players[seat].hand[0]];
        let pattern = Pattern::detect(&lead, trump);
        if pattern.pattern_type == PatternType::None {
          // An unclassifiable lead should not happen for one card.
          panic!("single card failed to classify");
        }
        round.play(user, pattern).unwrap();
        continue;
      }

      let last = round
        .tricks
        .iter()
        .rev()
        .find(|r| !r.is_pass())
        .expect("open trick has a lead");
      let leader = &round.players[last.player_index as usize];
      let target = leader.played[last.pattern_index as usize].clone();
      match round.players[seat].hand.search(&target, trump) {
        Some(cards) => {
          let pattern = Pattern::detect(&cards, trump);
          round.play(user, pattern).unwrap();
        }
        None => round.play(user, Pattern::pass(trump)).unwrap(),
      }
    }

    let total: i8 = round.ranks().iter().sum();
    assert!(total == 10 || total == 11, "ranks {:?}", round.ranks());
    assert!(round.winning_team().is_some());
    round.settle(10, 100).unwrap();
    let sum: i32 = round.players.iter().map(|p| p.point_change).sum();
    assert_eq!(sum, 0);
  }
}
