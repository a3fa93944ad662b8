use serde::de;
use serde::{ser, Deserialize, Deserializer, Serialize, Serializer};

/// A type representing a card, defined as an alias of `u8`.
///
/// The correspondence between the card and its ID is defined as follows:
/// - `card_id = 4 * rank + suit` (where `0 <= card_id < 52`)
///   - `rank`: 2 => `0`, 3 => `1`, 4 => `2`, ..., A => `12`
///   - `suit`: club => `0`, diamond => `1`, heart => `2`, spade => `3`
///
/// An undealt card is represented by `NOT_DEALT`.
pub type Card = u8;

/// Constant representing that the card is not yet dealt.
pub const NOT_DEALT: Card = Card::MAX;

/// For serialization.
pub const NOT_DEALT_STR: &str = "NOT_DEALT";

/// Number of cards in a standard deck; the default deck size a [`GameParams`]
/// (see `crate::game_config`) specifies.
pub const DECK_SIZE: usize = 52;

#[inline]
fn check_card(card: Card) -> Result<(), String> {
    if card < 52 {
        Ok(())
    } else {
        Err(format!("Invalid card: {card}"))
    }
}

/// Attempts to convert a rank index to a rank character.
///
/// `12` => `'A'`, `11` => `'K'`, ..., `0` => `'2'`.
#[inline]
fn rank_to_char(rank: u8) -> Result<char, String> {
    match rank {
        12 => Ok('A'),
        11 => Ok('K'),
        10 => Ok('Q'),
        9 => Ok('J'),
        8 => Ok('T'),
        0..=7 => Ok((rank + b'2') as char),
        _ => Err(format!("Invalid input: {rank}")),
    }
}

/// Attempts to convert a rank character to a rank index. Inverse of
/// [`rank_to_char`].
#[inline]
fn char_to_rank(c: char) -> Result<u8, String> {
    match c.to_ascii_uppercase() {
        'A' => Ok(12),
        'K' => Ok(11),
        'Q' => Ok(10),
        'J' => Ok(9),
        'T' => Ok(8),
        '2'..='9' => Ok(c as u8 - b'2'),
        _ => Err(format!("Invalid rank character: {c}")),
    }
}

/// Attempts to convert a suit index to a suit character.
///
/// `0` => `'c'`, `1` => `'d'`, `2` => `'h'`, `3` => `'s'`.
#[inline]
fn suit_to_char(suit: u8) -> Result<char, String> {
    match suit {
        0 => Ok('c'),
        1 => Ok('d'),
        2 => Ok('h'),
        3 => Ok('s'),
        _ => Err(format!("Invalid input: {suit}")),
    }
}

/// Attempts to convert a suit character to a suit index. Inverse of
/// [`suit_to_char`].
#[inline]
fn char_to_suit(c: char) -> Result<u8, String> {
    match c.to_ascii_lowercase() {
        'c' => Ok(0),
        'd' => Ok(1),
        'h' => Ok(2),
        's' => Ok(3),
        _ => Err(format!("Invalid suit character: {c}")),
    }
}

/// Attempts to convert a card into a string.
///
/// # Examples
/// ```
/// use endgame_resolver::card_to_string;
///
/// assert_eq!(card_to_string(0), Ok("2c".to_string()));
/// assert_eq!(card_to_string(5), Ok("3d".to_string()));
/// assert_eq!(card_to_string(10), Ok("4h".to_string()));
/// assert_eq!(card_to_string(51), Ok("As".to_string()));
/// assert!(card_to_string(52).is_err());
/// ```
#[inline]
pub fn card_to_string(card: Card) -> Result<String, String> {
    check_card(card)?;
    let rank = card >> 2;
    let suit = card & 3;
    Ok(format!("{}{}", rank_to_char(rank)?, suit_to_char(suit)?))
}

/// Attempts to parse a two-character string (e.g. `"Ah"`) into a [`Card`].
///
/// # Examples
/// ```
/// use endgame_resolver::card_from_str;
///
/// assert_eq!(card_from_str("2c"), Ok(0));
/// assert_eq!(card_from_str("As"), Ok(51));
/// assert!(card_from_str("Zz").is_err());
/// ```
pub fn card_from_str(s: &str) -> Result<Card, String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() != 2 {
        return Err(format!("Invalid card string: {s}"));
    }
    let rank = char_to_rank(chars[0])?;
    let suit = char_to_suit(chars[1])?;
    Ok(rank * 4 + suit)
}

/// Parses a string of concatenated two-character cards (e.g. `"Td9d6h"`)
/// into a vector of [`Card`]s, validating that no card repeats.
///
/// # Examples
/// ```
/// use endgame_resolver::cards_from_str;
///
/// assert_eq!(cards_from_str("Td9d6h").unwrap().len(), 3);
/// assert!(cards_from_str("TdTd").is_err());
/// ```
pub fn cards_from_str(s: &str) -> Result<Vec<Card>, String> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if s.len() % 2 != 0 {
        return Err(format!("Invalid card sequence: {s}"));
    }

    let mut cards = Vec::with_capacity(s.len() / 2);
    for chunk in s.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).unwrap();
        let card = card_from_str(pair)?;
        if cards.contains(&card) {
            return Err(format!("Duplicate card: {pair}"));
        }
        cards.push(card);
    }
    Ok(cards)
}

/// Parses exactly three cards, for use as a flop.
pub fn flop_from_str(s: &str) -> Result<[Card; 3], String> {
    let cards = cards_from_str(s)?;
    if cards.len() != 3 {
        return Err(format!("Expected exactly 3 cards, got {}", cards.len()));
    }
    Ok([cards[0], cards[1], cards[2]])
}

/// Formats a hole-card pair as e.g. `"AhKs"`.
pub fn hole_to_string(hole: (Card, Card)) -> Result<String, String> {
    Ok(format!(
        "{}{}",
        card_to_string(hole.0)?,
        card_to_string(hole.1)?
    ))
}

/// for serde default
fn not_dealt() -> Card {
    NOT_DEALT
}

pub fn serialize_card<S>(c: &Card, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let card_string = if *c == NOT_DEALT {
        NOT_DEALT_STR.to_string()
    } else {
        card_to_string(*c).map_err(ser::Error::custom)?
    };
    s.serialize_str(&card_string)
}

pub fn deserialize_card<'de, D>(deserializer: D) -> Result<Card, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let card = if s == *NOT_DEALT_STR {
        Ok(NOT_DEALT)
    } else {
        card_from_str(&s)
    };
    card.map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_card_string() {
        for card in 0..52 {
            let s = card_to_string(card).unwrap();
            assert_eq!(card_from_str(&s).unwrap(), card);
        }
    }

    #[test]
    fn flop_from_str_rejects_wrong_length() {
        assert!(flop_from_str("Td9d").is_err());
        assert!(flop_from_str("Td9d6h2s").is_err());
    }
}
