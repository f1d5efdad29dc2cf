//! Perceptual hash pairs and the distance used to order by visual similarity.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use serde::Serialize;

/// Horizontal and vertical gradient hashes of one image, 64 bits each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HashPair {
    pub h_hash: u64,
    pub v_hash: u64,
}

impl HashPair {
    pub fn new(h_hash: u64, v_hash: u64) -> Self {
        Self { h_hash, v_hash }
    }

    /// Sum of the hamming distances of both halves (0..=128).
    pub fn distance(&self, other: &HashPair) -> u32 {
        hamming_distance(self.h_hash, other.h_hash) + hamming_distance(self.v_hash, other.v_hash)
    }
}

/// Number of differing bits between two 64-bit hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// SQLite stores INTEGER as i64; hashes keep their bit pattern across the cast.
pub fn to_sql_bits(hash: u64) -> i64 {
    hash as i64
}

pub fn from_sql_bits(value: i64) -> u64 {
    value as u64
}

/// Register `hamming(a, b)` on a connection. NULL in, NULL out.
pub(crate) fn register_hamming(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "hamming",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = ctx.get::<Option<i64>>(0)?;
            let b = ctx.get::<Option<i64>>(1)?;
            Ok(match (a, b) {
                (Some(a), Some(b)) => Some(hamming_distance(from_sql_bits(a), from_sql_bits(b)) as i64),
                _ => None,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0b1011, 0b0001), 2);
        assert_eq!(hamming_distance(u64::MAX, 0), 64);
    }

    #[test]
    fn test_pair_distance_sums_both_halves() {
        let a = HashPair::new(0xFF, 0x0F);
        let b = HashPair::new(0x00, 0x00);
        assert_eq!(a.distance(&b), 12);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn test_sql_bits_preserve_high_bit() {
        let hash = 0x8000_0000_0000_0001u64;
        assert!(to_sql_bits(hash) < 0);
        assert_eq!(from_sql_bits(to_sql_bits(hash)), hash);
    }

    #[test]
    fn test_registered_hamming_function() {
        let conn = Connection::open_in_memory().unwrap();
        register_hamming(&conn).unwrap();
        let d: i64 = conn
            .query_row("SELECT hamming(?, ?)", rusqlite::params![-1i64, 0i64], |row| row.get(0))
            .unwrap();
        assert_eq!(d, 64);
        let null: Option<i64> = conn
            .query_row("SELECT hamming(NULL, 3)", [], |row| row.get(0))
            .unwrap();
        assert!(null.is_none());
    }
}
