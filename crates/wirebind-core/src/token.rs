//! Mutation tokens and the sources that mint them
//!
//! A token correlates one local write with its eventual confirmation. It is
//! never used for ordering: two tokens compare equal or they don't.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque 64-bit correlation identifier, carried as `"i"` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationToken(pub u64);

impl MutationToken {
    /// Raw value as sent on the wire
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for MutationToken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for MutationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Mints a fresh token for every local mutation
pub trait TokenSource: Send + Sync {
    /// Produce the next token
    fn next_token(&self) -> MutationToken;
}

/// Uniform random tokens from the thread-local generator
#[derive(Debug, Clone, Default)]
pub struct RandomTokenSource;

impl RandomTokenSource {
    /// Create a new random token source
    pub fn new() -> Self {
        Self
    }
}

impl TokenSource for RandomTokenSource {
    fn next_token(&self) -> MutationToken {
        MutationToken(rand::thread_rng().gen())
    }
}

/// Deterministic tokens from a seeded ChaCha stream
///
/// Same seed, same token sequence. Used by tests and simulations that need to
/// predict the tokens a replica will emit.
pub struct SeededTokenSource {
    rng: Mutex<ChaCha8Rng>,
}

impl SeededTokenSource {
    /// Create a token source seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl TokenSource for SeededTokenSource {
    fn next_token(&self) -> MutationToken {
        MutationToken(self.rng.lock().gen())
    }
}

impl fmt::Debug for SeededTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededTokenSource").finish_non_exhaustive()
    }
}

const COUNTER_BITS: u32 = 48;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Replica-prefixed counter tokens
///
/// Layout: `replica_id` in the high 16 bits, a wrapping 48-bit counter in the
/// low bits. Tokens from one replica are unique until the counter wraps;
/// tokens from distinct replicas never collide.
#[derive(Debug)]
pub struct SequentialTokenSource {
    replica_id: u16,
    counter: AtomicU64,
}

impl SequentialTokenSource {
    /// Create a counter source for the given replica
    pub fn new(replica_id: u16) -> Self {
        Self {
            replica_id,
            counter: AtomicU64::new(0),
        }
    }

    /// Create a counter source with a randomly chosen replica id
    pub fn with_random_replica() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    /// Replica id embedded in every token
    pub fn replica_id(&self) -> u16 {
        self.replica_id
    }
}

impl TokenSource for SequentialTokenSource {
    fn next_token(&self) -> MutationToken {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        MutationToken((u64::from(self.replica_id) << COUNTER_BITS) | n)
    }
}
