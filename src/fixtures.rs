//! Random data generators for tests and demo seeding.
//!
//! The generator owns its RNG; pass a seed for reproducible data or use
//! [`RandomGen::from_entropy`] for unique values across runs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::ledger::Currency;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#~$%^&*()_+|<>?:{}";

pub struct RandomGen {
    rng: StdRng,
}

impl RandomGen {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Uniform integer in `[min, max]`
    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        self.rng.gen_range(min..=max)
    }

    /// Lower-case ASCII string of length `n`
    pub fn string(&mut self, n: usize) -> String {
        (0..n)
            .map(|_| *ALPHABET.choose(&mut self.rng).unwrap_or(&b'a') as char)
            .collect()
    }

    pub fn owner(&mut self) -> String {
        self.string(10)
    }

    pub fn money(&mut self) -> i64 {
        self.int(0, 1000)
    }

    pub fn currency(&mut self) -> Currency {
        Currency::ALL[self.rng.gen_range(0..Currency::ALL.len())]
    }

    pub fn email(&mut self) -> String {
        format!("{}@example.com", self.string(10))
    }

    /// Six characters with at least one upper, lower, digit and symbol
    pub fn password(&mut self) -> String {
        let all: Vec<u8> = [UPPER, ALPHABET, DIGITS, SPECIAL].concat();
        let mut password: Vec<u8> = [UPPER, ALPHABET, DIGITS, SPECIAL]
            .iter()
            .map(|set| set[self.rng.gen_range(0..set.len())])
            .collect();
        for _ in 0..2 {
            password.push(all[self.rng.gen_range(0..all.len())]);
        }
        password.shuffle(&mut self.rng);
        String::from_utf8(password).unwrap_or_default()
    }
}
