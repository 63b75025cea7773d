//! Deterministic stream generator for solvers
//!
//! Mersenne Twister (MT19937) paired with a polar-method normal sampler
//! that keeps the second deviate of each generated pair. The complete
//! generator state, including the pending deviate, is snapshottable so
//! cache keys can bind to the exact stream position a solver saw.

const N: usize = 624;
const M: usize = 397;
const MATRIX_A: u32 = 0x9908_b0df;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;

/// Algorithm label fed into cache keys
pub const ALGORITHM: &str = "mt19937";

/// Seed used when a solver declares no other default
pub const DEFAULT_SEED: u32 = 5489;

/// Deterministic pseudo-random generator handed to solvers.
///
/// Cloning duplicates the full state; the clone and the original then
/// produce identical streams.
#[derive(Clone)]
pub struct SolverRng {
    mt: [u32; N],
    index: usize,
    has_gauss: bool,
    gauss: f64,
}

impl SolverRng {
    /// Create a generator from a seed
    pub fn from_seed(seed: u32) -> Self {
        let mut mt = [0u32; N];
        mt[0] = seed;
        for i in 1..N {
            mt[i] = 1_812_433_253u32
                .wrapping_mul(mt[i - 1] ^ (mt[i - 1] >> 30))
                .wrapping_add(i as u32);
        }
        SolverRng {
            mt,
            index: N,
            has_gauss: false,
            gauss: 0.0,
        }
    }

    /// Next raw 32-bit draw
    pub fn next_u32(&mut self) -> u32 {
        if self.index >= N {
            self.twist();
        }
        let mut y = self.mt[self.index];
        self.index += 1;
        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^ (y >> 18)
    }

    fn twist(&mut self) {
        for i in 0..N {
            let y = (self.mt[i] & UPPER_MASK) | (self.mt[(i + 1) % N] & LOWER_MASK);
            let mut next = self.mt[(i + M) % N] ^ (y >> 1);
            if y & 1 != 0 {
                next ^= MATRIX_A;
            }
            self.mt[i] = next;
        }
        self.index = 0;
    }

    /// Uniform draw in `[0, 1)` with 53-bit resolution
    pub fn uniform(&mut self) -> f64 {
        let a = (self.next_u32() >> 5) as f64;
        let b = (self.next_u32() >> 6) as f64;
        (a * 67_108_864.0 + b) / 9_007_199_254_740_992.0
    }

    /// Standard normal draw (polar method)
    ///
    /// The method produces deviates in pairs; the second one is held back
    /// and returned by the next call without consuming the stream.
    pub fn normal(&mut self) -> f64 {
        if self.has_gauss {
            self.has_gauss = false;
            let g = self.gauss;
            self.gauss = 0.0;
            return g;
        }
        loop {
            let x1 = 2.0 * self.uniform() - 1.0;
            let x2 = 2.0 * self.uniform() - 1.0;
            let r2 = x1 * x1 + x2 * x2;
            if r2 < 1.0 && r2 != 0.0 {
                let f = (-2.0 * r2.ln() / r2).sqrt();
                self.gauss = x1 * f;
                self.has_gauss = true;
                return x2 * f;
            }
        }
    }

    /// Snapshot the complete generator state
    pub fn state(&self) -> RngState {
        RngState {
            algorithm: ALGORITHM,
            key: self.mt.to_vec(),
            position: self.index,
            has_gauss: self.has_gauss,
            gauss: self.gauss,
        }
    }
}

impl Default for SolverRng {
    fn default() -> Self {
        Self::from_seed(DEFAULT_SEED)
    }
}

impl std::fmt::Debug for SolverRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverRng")
            .field("position", &self.index)
            .field("has_gauss", &self.has_gauss)
            .finish()
    }
}

/// Snapshot of a generator's internal state, the stream component of a
/// cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct RngState {
    /// Generator algorithm label
    pub algorithm: &'static str,
    /// Raw state vector
    pub key: Vec<u32>,
    /// Position within the current output block
    pub position: usize,
    /// Whether a second normal deviate is pending
    pub has_gauss: bool,
    /// The pending deviate (0.0 when none)
    pub gauss: f64,
}
