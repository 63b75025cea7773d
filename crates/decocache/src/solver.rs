//! The solver contract

use std::fmt;

use decostore::{Matrix, SolverInfo};

use crate::error::Result;
use crate::rng::SolverRng;

/// Fully-qualified identity of a solver, part of every cache key.
///
/// Two solvers with the same identity are assumed interchangeable: results
/// cached by one will be served to the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolverIdentity {
    /// Defining module, e.g. the value of [`module_path!`]
    pub module: String,
    /// Function or type name within the module
    pub name: String,
}

impl SolverIdentity {
    /// Identity from module path and name
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        SolverIdentity {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SolverIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Declared defaults for the optional solve arguments.
///
/// The caching adapter resolves an omitted generator or weight matrix from
/// this descriptor before deriving the cache key, so the key always reflects
/// the values the solver actually receives.
#[derive(Debug, Clone, Default)]
pub struct SolverDefaults {
    /// Generator used when the caller passes none
    pub rng: SolverRng,
    /// Weight matrix used when the caller passes none
    pub e: Option<Matrix>,
}

/// What a solver produces: the decoder matrix plus diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The computed decoder matrix
    pub decoders: Matrix,
    /// Diagnostic record stored alongside it
    pub info: SolverInfo,
}

/// A deterministic decoder solver.
///
/// Implementations must be a pure function of their arguments: the same
/// `(activities, targets, rng state, e)` always yields the same solution.
/// That determinism is what makes results safe to cache.
pub trait Solver: Send + Sync {
    /// Identity fed into every cache key
    fn identity(&self) -> SolverIdentity;

    /// Declared defaults for the optional arguments
    fn defaults(&self) -> SolverDefaults {
        SolverDefaults::default()
    }

    /// Compute decoders for targets given activities
    ///
    /// # Arguments
    /// * `activities` - Sampled activity matrix
    /// * `targets` - Target values to decode
    /// * `rng` - Generator, already resolved by the adapter
    /// * `e` - Optional weight matrix, already defaulted by the adapter
    ///
    /// # Returns
    /// * `Result<Solution>` - Decoder matrix and diagnostics
    fn solve(
        &self,
        activities: &Matrix,
        targets: &Matrix,
        rng: &mut SolverRng,
        e: Option<&Matrix>,
    ) -> Result<Solution>;
}
