//! Compact per-play trick records.
//!
//! A record ties a seat to an entry in that player's played sequence, so a
//! whole trick fits in two bytes per play on the wire: seat and pattern
//! type share a byte (a nibble each), the played-sequence index takes the
//! second.

use serde::{Deserialize, Serialize};

use super::pattern::PatternType;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrickRecord {
  pub pattern_type: PatternType,
  /// Seat index 0..=3.
  pub player_index: u8,
  /// Index into that player's played sequence.
  pub pattern_index: u8,
}

impl TrickRecord {
  pub fn is_pass(self) -> bool {
    self.pattern_type == PatternType::None
  }
}

/// Pack records into the two-byte wire form.
pub fn encode_tricks(records: &[TrickRecord]) -> Vec<u8> {
  let mut data = Vec::with_capacity(records.len() * 2);
  for r in records {
    data.push((r.player_index & 0x0F) | ((r.pattern_type as u8 & 0x0F) << 4));
    data.push(r.pattern_index);
  }
  data
}

/// Decode the two-byte wire form; trailing odd bytes are ignored.
pub fn decode_tricks(data: &[u8]) -> Vec<TrickRecord> {
  data
    .chunks_exact(2)
    .filter_map(|pair| {
      Some(TrickRecord {
        player_index: pair[0] & 0x0F,
        pattern_type: PatternType::from_u8((pair[0] >> 4) & 0x0F)?,
        pattern_index: pair[1],
      })
    })
    .collect()
}
