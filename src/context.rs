//! Explicit, injectable router state: a dedicated rayon thread pool and
//! (optionally) a seeded RNG, replacing the implicit global thread-pool
//! and process-wide RNG state the original format's OpenMP-based
//! implementation relied on (spec.md Design Notes §9).

use crate::error::{Error, Result};

#[cfg(feature = "rand-congestion")]
use rand::{rngs::StdRng, SeedableRng};

/// Owns everything about *how* routing work is scheduled and (optionally)
/// randomized, so a caller can run several independent routings
/// concurrently without contending over global state.
pub struct RouterContext {
    pool: rayon::ThreadPool,
    #[cfg(feature = "rand-congestion")]
    rng: std::sync::Mutex<StdRng>,
}

impl RouterContext {
    /// Builds a dedicated thread pool with `num_threads` workers (0 defers
    /// to rayon's own default, usually the number of logical CPUs via
    /// `num_cpus`).
    pub fn new(num_threads: usize) -> Result<Self> {
        let threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build thread pool: {e}")))?;
        Ok(Self {
            pool,
            #[cfg(feature = "rand-congestion")]
            rng: std::sync::Mutex::new(StdRng::seed_from_u64(0)),
        })
    }

    #[cfg(feature = "rand-congestion")]
    pub fn with_seed(num_threads: usize, seed: u64) -> Result<Self> {
        let mut ctx = Self::new(num_threads)?;
        ctx.rng = std::sync::Mutex::new(StdRng::seed_from_u64(seed));
        Ok(ctx)
    }

    /// Runs `f` on this context's thread pool, returning its result. Every
    /// rayon-parallel call in `congestion`/`controller` should execute
    /// inside this scope so the whole iteration loop stays confined to one
    /// pool instead of rayon's implicit process-wide default.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// A uniform `[0, 1)` sample for randomized congestion G-cost (spec.md
    /// §4.8's randomize-congestion controller action), available only with
    /// the `rand-congestion` feature so the default build has no RNG
    /// dependency in its critical path.
    #[cfg(feature = "rand-congestion")]
    pub fn random_fraction(&self) -> f64 {
        use rand::Rng;
        let mut rng = self.rng.lock().expect("router RNG mutex poisoned");
        rng.gen_range(0.0..1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_pool_with_requested_thread_count() {
        let ctx = RouterContext::new(2).unwrap();
        assert_eq!(ctx.num_threads(), 2);
    }

    #[test]
    fn install_runs_closure_on_the_pool() {
        let ctx = RouterContext::new(1).unwrap();
        let result = ctx.install(|| 2 + 2);
        assert_eq!(result, 4);
    }
}
