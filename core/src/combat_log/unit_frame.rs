//! Variable-width "unit block" reader for combat events.
//!
//! The game appends a unit's state as a run of tokens whose width varies by
//! patch: four `cur/max` pools (health, magicka, stamina, ultimate), up to
//! two further pool-shaped tokens, an optional lone integer, then three
//! coordinates. The reader is greedy with bounded look-ahead; a strict
//! fixed-width parse regresses on older logs.

use serde::{Deserialize, Serialize};

/// A `cur/max` resource pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub cur: i64,
    pub max: i64,
}

impl Pool {
    pub fn parse(token: &str) -> Option<Pool> {
        let (cur, max) = token.trim().split_once('/')?;
        Some(Pool {
            cur: cur.parse().ok()?,
            max: max.parse().ok()?,
        })
    }
}

/// Snapshot of a unit's pools and position at one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitFrame {
    pub health: Pool,
    pub magicka: Pool,
    pub stamina: Pool,
    pub ultimate: Pool,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Cursor over tokenised fields. Reads never panic; running off the end
/// yields `None`/defaults, matching the "missing trailing fields" rule.
#[derive(Debug)]
pub struct Fields<'a> {
    tokens: &'a [String],
    pos: usize,
}

impl<'a> Fields<'a> {
    pub fn new(tokens: &'a [String]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|s| s.trim())
    }

    pub fn peek_at(&self, offset: usize) -> Option<&'a str> {
        self.tokens.get(self.pos + offset).map(|s| s.trim())
    }

    pub fn next(&mut self) -> Option<&'a str> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Next field as an integer, defaulting to 0 when missing or malformed.
    pub fn int(&mut self) -> i64 {
        self.next().and_then(|s| s.parse().ok()).unwrap_or(0)
    }

    pub fn opt_int(&mut self) -> Option<i64> {
        self.next().and_then(|s| s.parse().ok())
    }

    /// Next field as a `T`/`F` boolean; anything else is `false`.
    pub fn boolean(&mut self) -> bool {
        matches!(self.next(), Some("T"))
    }

    /// Next field as an owned string, empty when missing.
    pub fn string(&mut self) -> String {
        self.next().unwrap_or("").to_string()
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.pos)
    }
}

/// Greedily consume one unit block from the cursor.
///
/// Returns `None` (without a reliable cursor position) if the four leading
/// pools are absent; callers treat that as "no block here".
pub fn read_unit_frame(fields: &mut Fields<'_>) -> Option<UnitFrame> {
    let health = Pool::parse(fields.peek()?)?;
    fields.next();
    let magicka = Pool::parse(fields.peek()?)?;
    fields.next();
    let stamina = Pool::parse(fields.peek()?)?;
    fields.next();
    let ultimate = Pool::parse(fields.peek()?)?;
    fields.next();

    // Tolerate up to two trailing pool-shaped tokens (newer patches append
    // werewolf/shield pools); their values are not tracked.
    for _ in 0..2 {
        match fields.peek() {
            Some(tok) if Pool::parse(tok).is_some() => {
                fields.next();
            }
            _ => break,
        }
    }

    // Optional lone integer before the coordinates. Ambiguity with an
    // integer-valued X coordinate is resolved by look-ahead: consume it
    // only when three parseable coordinates follow and at least one of
    // them is decimal-pointed (a trailing unit id never is).
    if let Some(tok) = fields.peek() {
        if tok.parse::<i64>().is_ok() {
            let coords_follow = (1..=3).all(|i| {
                fields
                    .peek_at(i)
                    .map(|t| t.parse::<f64>().is_ok())
                    .unwrap_or(false)
            });
            let has_decimal = (1..=3).any(|i| {
                fields
                    .peek_at(i)
                    .map(|t| t.contains('.'))
                    .unwrap_or(false)
            });
            if coords_follow && has_decimal {
                fields.next();
            }
        }
    }

    let x = fields.next()?.parse::<f64>().ok()?;
    let y = fields.next()?.parse::<f64>().ok()?;
    let z = fields.next()?.parse::<f64>().ok()?;

    Some(UnitFrame {
        health,
        magicka,
        stamina,
        ultimate,
        x,
        y,
        z,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split(',').map(|p| p.to_string()).collect()
    }

    #[test]
    fn minimal_block() {
        let t = toks("100/200,50/60,70/80,10/500,1.5,2.5,3.5");
        let mut f = Fields::new(&t);
        let frame = read_unit_frame(&mut f).unwrap();
        assert_eq!(frame.health, Pool { cur: 100, max: 200 });
        assert_eq!(frame.ultimate, Pool { cur: 10, max: 500 });
        assert_eq!(frame.z, 3.5);
        assert_eq!(f.remaining(), 0);
    }

    #[test]
    fn extra_pools_and_lone_integer_are_consumed() {
        let t = toks("1/2,3/4,5/6,7/8,9/10,11/12,0,1.0,2.0,3.0,42");
        let mut f = Fields::new(&t);
        let frame = read_unit_frame(&mut f).unwrap();
        assert_eq!(frame.x, 1.0);
        // Trailing field after the block is left for the caller.
        assert_eq!(f.next(), Some("42"));
    }

    #[test]
    fn integer_coordinates_without_lone_integer() {
        let t = toks("1/2,3/4,5/6,7/8,0,0,0");
        let mut f = Fields::new(&t);
        let frame = read_unit_frame(&mut f).unwrap();
        assert_eq!((frame.x, frame.y, frame.z), (0.0, 0.0, 0.0));
        assert_eq!(f.remaining(), 0);
    }

    #[test]
    fn missing_pools_yield_none() {
        let t = toks("*,1/2");
        let mut f = Fields::new(&t);
        assert!(read_unit_frame(&mut f).is_none());
    }
}
