//! Independent, reproducible random number streams for one trajectory.
//!
//! Every `Epidemic` owns a `RandomStreams`. Streams are keyed by types declared with
//! `define_rng!` and are created lazily, each seeded with the trajectory seed offset by a hash of
//! the stream's name. Drawing more numbers from one stream (say, because a parameter distribution
//! changed) therefore never perturbs another stream, and reseeding with the same seed reproduces
//! a trajectory exactly.
mod macros;

use std::any::{Any, TypeId};

use log::trace;
use rand_distr::{Binomial, Distribution, Poisson};

pub use macros::define_rng;

use crate::hashing::{hash_str, HashMap, HashMapExt};
use crate::rand::{Rng, RngCore, SeedableRng};

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng + RngCore + Send;
    fn get_name() -> &'static str;
}

// This is a wrapper that allows for future support for different types of
// random number generators (anything that implements SeedableRng is valid).
struct RngHolder {
    rng: Box<dyn Any + Send>,
}

/// Stores a base seed for all rngs and the rngs created from it so far, keyed by their `RngId`.
pub struct RandomStreams {
    base_seed: u64,
    rng_holders: HashMap<TypeId, RngHolder>,
}

impl RandomStreams {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        RandomStreams {
            base_seed,
            rng_holders: HashMap::new(),
        }
    }

    /// Sets a new base seed. Existing rngs are dropped so they get re-seeded when next used.
    pub fn init_random(&mut self, base_seed: u64) {
        trace!("initializing random streams with base seed {base_seed}");
        self.base_seed = base_seed;
        self.rng_holders.clear();
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Gets a mutable reference to the random number generator associated with the given
    /// [`RngId`]. If the rng has not been used since the last `init_random`, one is created from
    /// the base seed.
    pub fn get_rng<R: RngId + 'static>(&mut self, _rng_id: R) -> &mut R::RngType {
        let base_seed = self.base_seed;
        self.rng_holders
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!("creating new RNG (seed={}) for {}", base_seed, R::get_name());
                let seed_offset = hash_str(R::get_name());
                RngHolder {
                    rng: Box::new(R::RngType::seed_from_u64(base_seed.wrapping_add(seed_offset))),
                }
            })
            .rng
            .downcast_mut::<R::RngType>()
            .expect("rng holder keyed by a different RngId type")
    }

    /// Gets a random sample from the stream `rng_id` by applying the specified sampler function.
    pub fn sample<R: RngId + 'static, T>(
        &mut self,
        rng_id: R,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        sampler(self.get_rng(rng_id))
    }

    /// Gets a random sample from the specified distribution using the stream `rng_id`.
    pub fn sample_distr<R: RngId + 'static, T>(
        &mut self,
        rng_id: R,
        distribution: impl Distribution<T>,
    ) -> T {
        distribution.sample(self.get_rng(rng_id))
    }
}

/// Number of successes among `n` independent trials with success probability `p`. Probabilities
/// outside `[0, 1]` are clamped and NaN counts as zero.
pub fn sample_binomial<R: Rng + ?Sized>(rng: &mut R, n: u64, p: f64) -> u64 {
    if n == 0 || p.is_nan() || p <= 0.0 {
        return 0;
    }
    if p >= 1.0 {
        return n;
    }
    Binomial::new(n, p).map_or(0, |binomial| binomial.sample(rng))
}

/// A Poisson count with the given mean. Non-positive or non-finite means yield zero.
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> u64 {
    if !mean.is_finite() || mean <= 0.0 {
        return 0;
    }
    match Poisson::new(mean) {
        Ok(poisson) => {
            let draw: f64 = poisson.sample(rng);
            draw as u64
        }
        // Only reachable for means beyond what the sampler supports.
        Err(_) => mean.round() as u64,
    }
}
