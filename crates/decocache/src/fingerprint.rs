//! Cache key derivation
//!
//! The feed order below is part of the on-disk contract: changing it, or
//! what any component contributes, changes every key and orphans every
//! previously cached entry.

use sha2::{Digest, Sha256};

use decostore::{CacheKey, Matrix};

use crate::rng::RngState;
use crate::solver::SolverIdentity;

/// Derive the cache key for one solve invocation
///
/// Feeds, in order: solver identity, `activities`, `targets`, the full
/// generator state (algorithm label, state vector, position, pending
/// deviate flag and value), and `e` last when present. An absent `e`
/// contributes nothing.
///
/// # Arguments
/// * `identity` - Solver identity
/// * `activities` - Sampled activity matrix
/// * `targets` - Target values to decode
/// * `rng` - Generator state snapshot taken before solving
/// * `e` - Optional weight matrix
///
/// # Returns
/// * `CacheKey` - SHA-256 over the components, rendered as hex
pub fn fingerprint(
    identity: &SolverIdentity,
    activities: &Matrix,
    targets: &Matrix,
    rng: &RngState,
    e: Option<&Matrix>,
) -> CacheKey {
    let mut h = Sha256::new();

    h.update(identity.module.as_bytes());
    h.update(identity.name.as_bytes());

    h.update(activities.to_le_bytes());
    h.update(targets.to_le_bytes());

    h.update(rng.algorithm.as_bytes());
    for word in &rng.key {
        h.update(word.to_le_bytes());
    }
    h.update((rng.position as i64).to_le_bytes());
    h.update((rng.has_gauss as i64).to_le_bytes());
    h.update(rng.gauss.to_le_bytes());

    if let Some(e) = e {
        h.update(e.to_le_bytes());
    }

    CacheKey::from_digest(h.finalize().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SolverRng;

    fn identity() -> SolverIdentity {
        SolverIdentity::new("solvers", "lstsq")
    }

    fn inputs() -> (Matrix, Matrix) {
        let activities = Matrix::from_vec(2, 2, vec![0.1, 0.2, 0.3, 0.4]);
        let targets = Matrix::from_vec(2, 1, vec![1.0, -1.0]);
        (activities, targets)
    }

    #[test]
    fn test_equal_inputs_equal_keys() {
        let (activities, targets) = inputs();
        let state = SolverRng::from_seed(9).state();

        let a = fingerprint(&identity(), &activities, &targets, &state, None);
        let b = fingerprint(&identity(), &activities, &targets, &state, None);

        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_changes_key() {
        let (activities, targets) = inputs();
        let state = SolverRng::from_seed(9).state();

        let a = fingerprint(&identity(), &activities, &targets, &state, None);
        let b = fingerprint(
            &SolverIdentity::new("solvers", "lstsq_l2"),
            &activities,
            &targets,
            &state,
            None,
        );

        assert_ne!(a, b);
    }

    #[test]
    fn test_activities_change_key() {
        let (activities, targets) = inputs();
        let state = SolverRng::from_seed(9).state();
        let mut other = activities.clone();
        other.set(0, 0, 0.100000001);

        let a = fingerprint(&identity(), &activities, &targets, &state, None);
        let b = fingerprint(&identity(), &other, &targets, &state, None);

        assert_ne!(a, b);
    }

    #[test]
    fn test_targets_change_key() {
        let (activities, targets) = inputs();
        let state = SolverRng::from_seed(9).state();
        let other = Matrix::from_vec(2, 1, vec![1.0, -2.0]);

        let a = fingerprint(&identity(), &activities, &targets, &state, None);
        let b = fingerprint(&identity(), &activities, &other, &state, None);

        assert_ne!(a, b);
    }

    #[test]
    fn test_stream_position_changes_key() {
        let (activities, targets) = inputs();
        let mut rng = SolverRng::from_seed(9);
        let before = rng.state();
        rng.next_u32();
        let after = rng.state();

        let a = fingerprint(&identity(), &activities, &targets, &before, None);
        let b = fingerprint(&identity(), &activities, &targets, &after, None);

        assert_ne!(a, b);
    }

    #[test]
    fn test_pending_deviate_changes_key() {
        let (activities, targets) = inputs();
        let mut rng = SolverRng::from_seed(9);
        rng.normal();
        let pending = rng.state();
        assert!(pending.has_gauss);
        rng.normal();
        let drained = rng.state();

        let a = fingerprint(&identity(), &activities, &targets, &pending, None);
        let b = fingerprint(&identity(), &activities, &targets, &drained, None);

        assert_ne!(a, b);
    }

    #[test]
    fn test_weight_matrix_changes_key() {
        let (activities, targets) = inputs();
        let state = SolverRng::from_seed(9).state();
        let e = Matrix::from_vec(1, 2, vec![0.5, 0.5]);

        let without = fingerprint(&identity(), &activities, &targets, &state, None);
        let with = fingerprint(&identity(), &activities, &targets, &state, Some(&e));

        assert_ne!(without, with);
    }

    #[test]
    fn test_key_is_valid_hex() {
        let (activities, targets) = inputs();
        let state = SolverRng::default().state();

        let key = fingerprint(&identity(), &activities, &targets, &state, None);

        assert_eq!(CacheKey::parse(key.as_str()).unwrap(), key);
    }
}
