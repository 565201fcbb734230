use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

/// Spreads consecutive stream ids across the seed space (golden ratio).
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seed of the process-wide pool.
const GLOBAL_SEED: u64 = 0x5eed;

static GLOBAL_POOL: Lazy<RngStreamPool> = Lazy::new(|| RngStreamPool::new(GLOBAL_SEED));

/// Allocates and reclaims [RngStream]s.
///
/// A stream is seeded from the pool seed and its id only, so an agent's draws
/// do not depend on how many other agents exist.
#[derive(Debug)]
pub struct RngStreamPool {
    seed: u64,
    ids: Mutex<StreamIds>,
}

#[derive(Debug, Default)]
struct StreamIds {
    /// Released ids, reused lowest first.
    free: BTreeSet<u32>,
    /// The next never-used id.
    next: u32,
}

/// A random number stream owned by one agent.
#[derive(Debug)]
pub struct RngStream {
    id: u32,
    rng: StdRng,
}

impl RngStreamPool {
    /// Creates a pool whose streams derive from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ids: Mutex::new(StreamIds::default()),
        }
    }

    /// The process-wide pool, created on first use.
    pub fn global() -> &'static RngStreamPool {
        &GLOBAL_POOL
    }

    /// Hands out a stream, reusing the lowest released id if there is one.
    pub fn acquire(&self) -> RngStream {
        let id = {
            let mut ids = self.lock();
            match ids.free.pop_first() {
                Some(id) => id,
                None => {
                    let id = ids.next;
                    ids.next += 1;
                    id
                }
            }
        };
        let seed = self.seed ^ (id as u64 + 1).wrapping_mul(MIXING_CONSTANT);
        log::debug!("acquired rng stream {}", id);
        RngStream {
            id,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Takes a stream back so its id can be handed out again.
    pub fn release(&self, stream: RngStream) {
        log::debug!("released rng stream {}", stream.id);
        self.lock().free.insert(stream.id);
    }

    /// The number of streams currently handed out.
    pub fn in_use(&self) -> usize {
        let ids = self.lock();
        ids.next as usize - ids.free.len()
    }

    fn lock(&self) -> MutexGuard<'_, StreamIds> {
        // The id sets are always left consistent, so a poisoned lock is still usable.
        self.ids.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl RngStream {
    /// The stream's id within its pool.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The underlying generator, for use with `rand` distributions.
    pub fn inner(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
