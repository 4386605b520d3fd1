//! Chronologically sortable child keys.
//!
//! A key is 20 characters: 8 encode the millisecond timestamp, 12 are random.
//! The alphabet is in ASCII order, so keys sort by creation time. Keys minted
//! within the same millisecond reuse the previous random tail plus one, which
//! keeps them strictly increasing within a process.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_LEN: usize = 8;
const RAND_LEN: usize = 12;

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last: Mutex<LastId>,
}

#[derive(Debug, Default)]
struct LastId {
    ms: u64,
    rand: [u8; RAND_LEN],
}

impl PushIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a key for the current wall-clock time.
    pub fn generate(&self) -> String {
        self.generate_at(now_ms())
    }

    /// Mint a key for an explicit timestamp.
    pub fn generate_at(&self, ms: u64) -> String {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut ms = ms.max(last.ms);
        if ms == last.ms && !increment(&mut last.rand) {
            // Tail exhausted within one millisecond; borrow the next one.
            ms += 1;
            reroll(&mut last.rand);
        } else if ms != last.ms {
            reroll(&mut last.rand);
        }
        last.ms = ms;

        encode(ms, &last.rand)
    }
}

fn now_ms() -> u64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
}

fn reroll(tail: &mut [u8; RAND_LEN]) {
    let mut rng = rand::rng();
    for slot in tail.iter_mut() {
        *slot = rng.random_range(0..64);
    }
}

/// Add one to the base-64 tail. Returns false on overflow.
fn increment(tail: &mut [u8; RAND_LEN]) -> bool {
    for slot in tail.iter_mut().rev() {
        if *slot < 63 {
            *slot += 1;
            return true;
        }
        *slot = 0;
    }
    false
}

#[allow(clippy::cast_possible_truncation)]
fn encode(mut ms: u64, tail: &[u8; RAND_LEN]) -> String {
    let mut out = [0u8; TIME_LEN + RAND_LEN];
    for slot in out[..TIME_LEN].iter_mut().rev() {
        *slot = PUSH_CHARS[(ms % 64) as usize];
        ms /= 64;
    }
    for (slot, digit) in out[TIME_LEN..].iter_mut().zip(tail) {
        *slot = PUSH_CHARS[*digit as usize];
    }
    out.iter().map(|b| char::from(*b)).collect()
}
