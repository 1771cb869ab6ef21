//! Card primitives: suits, ranks, trump weighting, and the double deck.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Suit of a card. `Joker` is reserved for the two joker ranks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Suit {
  None = 0,
  Spade = 1,
  Heart = 2,
  Club = 3,
  Diamond = 4,
  Joker = 5,
}

impl Suit {
  pub(crate) fn from_u8(v: u8) -> Option<Suit> {
    match v {
      0 => Some(Suit::None),
      1 => Some(Suit::Spade),
      2 => Some(Suit::Heart),
      3 => Some(Suit::Club),
      4 => Some(Suit::Diamond),
      5 => Some(Suit::Joker),
      _ => None,
    }
  }
}

/// Rank of a card.
///
/// `Level` is the abstract level-card weight: a card whose rank equals the
/// current trump weighs in as `Level`, above an ace and below the jokers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rank {
  None = 0,
  Two = 1,
  Three = 2,
  Four = 3,
  Five = 4,
  Six = 5,
  Seven = 6,
  Eight = 7,
  Nine = 8,
  Ten = 9,
  Jack = 10,
  Queen = 11,
  King = 12,
  Ace = 13,
  Level = 14,
  JokerSmall = 15,
  JokerBig = 16,
}

impl Rank {
  /// Weight of this rank under the given trump: the trump rank is promoted
  /// to `Level`, every other rank keeps its face value.
  pub fn weight(self, trump: Rank) -> u8 {
    if self == trump {
      Rank::Level as u8
    } else {
      self as u8
    }
  }

  pub(crate) fn from_u8(v: u8) -> Option<Rank> {
    match v {
      0 => Some(Rank::None),
      1 => Some(Rank::Two),
      2 => Some(Rank::Three),
      3 => Some(Rank::Four),
      4 => Some(Rank::Five),
      5 => Some(Rank::Six),
      6 => Some(Rank::Seven),
      7 => Some(Rank::Eight),
      8 => Some(Rank::Nine),
      9 => Some(Rank::Ten),
      10 => Some(Rank::Jack),
      11 => Some(Rank::Queen),
      12 => Some(Rank::King),
      13 => Some(Rank::Ace),
      14 => Some(Rank::Level),
      15 => Some(Rank::JokerSmall),
      16 => Some(Rank::JokerBig),
      _ => None,
    }
  }

  /// The thirteen natural ranks, `Two..=Ace`, in ascending order.
  pub fn naturals() -> impl Iterator<Item = Rank> {
    (Rank::Two as u8..=Rank::Ace as u8).filter_map(Rank::from_u8)
  }
}

/// A playing card. Equality is field-by-field; two physical copies of the
/// same card from the double deck compare equal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Card {
  pub rank: Rank,
  pub suit: Suit,
}

impl Card {
  pub fn new(rank: Rank, suit: Suit) -> Card {
    Card { rank, suit }
  }

  /// A wild card is the heart of the trump rank.
  pub fn is_wild(self, trump: Rank) -> bool {
    self.rank == trump && self.suit == Suit::Heart
  }

  /// Two-byte wire form: `(rank, suit)`.
  pub fn to_bytes(self) -> [u8; 2] {
    [self.rank as u8, self.suit as u8]
  }

  pub fn from_bytes(bytes: [u8; 2]) -> Option<Card> {
    Some(Card {
      rank: Rank::from_u8(bytes[0])?,
      suit: Suit::from_u8(bytes[1])?,
    })
  }
}

/// Convenience methods on card slices.
pub trait CardsExt {
  /// Exactly two small jokers and two big jokers, nothing else.
  fn has_four_jokers(&self) -> bool;

  /// At least `count` big jokers.
  fn has_big_jokers(&self, count: usize) -> bool;

  /// Count of wild cards under the given trump.
  fn wild_count(&self, trump: Rank) -> usize;
}

impl CardsExt for [Card] {
  fn has_four_jokers(&self) -> bool {
    if self.len() != 4 {
      return false;
    }
    let mut small = 0;
    let mut big = 0;
    for c in self {
      match c.rank {
        Rank::JokerSmall => small += 1,
        Rank::JokerBig => big += 1,
        _ => return false,
      }
    }
    small == 2 && big == 2
  }

  fn has_big_jokers(&self, count: usize) -> bool {
    self.iter().filter(|c| c.rank == Rank::JokerBig).count() >= count
  }

  fn wild_count(&self, trump: Rank) -> usize {
    self.iter().filter(|c| c.is_wild(trump)).count()
  }
}

/// A shoe of one or more 54-card decks. Guandan is played with two.
#[derive(Debug, Clone)]
pub struct Deck {
  cards: Vec<Card>,
}

impl Deck {
  /// Build `sets` concatenated 54-card decks, unshuffled.
  pub fn new(sets: usize) -> Deck {
    let mut cards = Vec::with_capacity(sets * 54);
    for _ in 0..sets {
      for rank in Rank::naturals() {
        for suit in [Suit::Spade, Suit::Heart, Suit::Club, Suit::Diamond] {
          cards.push(Card::new(rank, suit));
        }
      }
      cards.push(Card::new(Rank::JokerSmall, Suit::Joker));
      cards.push(Card::new(Rank::JokerBig, Suit::Joker));
    }
    Deck { cards }
  }

  /// The standard Guandan double deck (108 cards).
  pub fn double() -> Deck {
    Deck::new(2)
  }

  pub fn len(&self) -> usize {
    self.cards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cards.is_empty()
  }

  pub fn shuffle(&mut self) {
    self.cards.shuffle(&mut thread_rng());
  }

  /// Split the deck evenly into `players` hands, dealing round-robin.
  pub fn deal(self, players: usize) -> Vec<Vec<Card>> {
    let mut hands = vec![Vec::with_capacity(self.cards.len() / players); players];
    for (i, card) in self.cards.into_iter().enumerate() {
      hands[i % players].push(card);
    }
    hands
  }
}
