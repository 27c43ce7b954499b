//! Record identities.
//!
//! Identities are ULIDs produced by a process-global monotonic generator so
//! that insertion order is preserved even within one millisecond.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    sync::{LazyLock, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};
use ulid::Ulid;

///
/// RecordId
///
/// Opaque identity of a stored record (node or relationship). Ordering
/// follows ULID ordering, so ids sort by creation time.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RecordId(Ulid);

impl Default for RecordId {
    fn default() -> Self {
        Self(Ulid::nil())
    }
}

impl RecordId {
    /// Generate a fresh id from the global monotonic generator.
    #[must_use]
    pub fn generate() -> Self {
        let mut generator = GENERATOR.lock().expect("record id generator mutex poisoned");

        Self(generator.next_ulid())
    }

    /// Construct an id from raw ULID parts. Intended for fixtures and
    /// deterministic tests.
    #[must_use]
    pub const fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }

    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

///
/// GENERATOR is lazily initiated with a Mutex.
/// It keeps state so that id order is maintained within a millisecond.
///

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::default()));

///
/// Generator
///
/// Adapted from <https://github.com/dylanhart/ulid-rs/blob/master/src/generator.rs>
/// as the ulid crate's built-in generator requires the std/rand features.
///

struct Generator {
    previous: Ulid,
    seed: u64,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            previous: Ulid::nil(),
            seed: 0,
        }
    }
}

impl Generator {
    /// Monotonic ULID generation; increments within the same millisecond.
    fn next_ulid(&mut self) -> Ulid {
        let last_ts = self.previous.timestamp_ms();
        let ts = now_millis();

        // maybe time went backward, or it is the same ms.
        // increment instead of generating a new random so that it is monotonic
        if ts <= last_ts {
            if let Some(next) = self.previous.increment() {
                self.previous = next;

                return next;
            }
            // random part saturated within this millisecond; restart the
            // random tail in the next logical millisecond
            let ulid = Ulid::from_parts(last_ts + 1, self.next_entropy());
            self.previous = ulid;

            return ulid;
        }

        let ulid = Ulid::from_parts(ts, self.next_entropy());
        self.previous = ulid;

        ulid
    }

    // splitmix64 over a clock-derived seed; ids need uniqueness, not
    // cryptographic unpredictability
    fn next_entropy(&mut self) -> u128 {
        if self.seed == 0 {
            self.seed = now_nanos_seed();
        }

        let hi = splitmix64(&mut self.seed);
        let lo = splitmix64(&mut self.seed);

        (u128::from(hi) << 64) | u128::from(lo)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn now_nanos_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(1);

    nanos.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);

    z ^ (z >> 31)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_monotonic() {
        let a = RecordId::generate();
        let b = RecordId::generate();

        assert!(a < b);
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(RecordId::generate()));
        }
    }

    #[test]
    fn from_parts_is_deterministic() {
        let a = RecordId::from_parts(42, 7);
        let b = RecordId::from_parts(42, 7);

        assert_eq!(a, b);
    }
}
