//! Convergence between replicas of the same log.
//!
//! Two replicas holding the same entry set produce the same state hash,
//! because iteration order depends only on the set.

use parlor_core::Blake3Hash;

use crate::error::Result;
use crate::traits::{Mergeable, MergeReport};

/// Copy missing entries in both directions.
///
/// Returns what `a` and `b` each gained.
pub async fn exchange<A, B>(a: &A, b: &B) -> Result<(MergeReport, MergeReport)>
where
    A: Mergeable + ?Sized,
    B: Mergeable + ?Sized,
{
    let from_a = a.export().await;
    let from_b = b.export().await;
    let gained_by_a = a.merge(from_b).await?;
    let gained_by_b = b.merge(from_a).await?;
    Ok((gained_by_a, gained_by_b))
}

/// Compare two replicas.
pub async fn verify_convergence<A, B>(a: &A, b: &B) -> ConvergenceResult
where
    A: Mergeable + ?Sized,
    B: Mergeable + ?Sized,
{
    if a.address() != b.address() {
        return ConvergenceResult::DifferentLogs;
    }

    let local = a.state_hash().await;
    let remote = b.state_hash().await;
    if local == remote {
        ConvergenceResult::Converged
    } else {
        ConvergenceResult::Diverged { local, remote }
    }
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both replicas have identical state.
    Converged,
    /// Replicas hold different entry sets (may need another exchange).
    Diverged {
        local: Blake3Hash,
        remote: Blake3Hash,
    },
    /// The replicas are not of the same log.
    DifferentLogs,
}

impl ConvergenceResult {
    /// Check if replicas have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::Replica;
    use crate::traits::Limit;
    use parlor_core::{Identity, LogKind};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_concurrent_appends_converge() {
        let alice = Replica::in_memory(Identity::from_seed(&[1; 32]));
        let bob = Replica::in_memory(Identity::from_seed(&[2; 32]));
        let a = alice.entry_log::<String>(LogKind::Channel, "general").await.unwrap();
        let b = bob.entry_log::<String>(LogKind::Channel, "general").await.unwrap();

        a.append("a1".to_string()).await.unwrap();
        b.append("b1".to_string()).await.unwrap();
        a.append("a2".to_string()).await.unwrap();

        assert!(!verify_convergence(a.as_ref(), b.as_ref()).await.is_converged());

        let (gained_a, gained_b) = exchange(a.as_ref(), b.as_ref()).await.unwrap();
        assert_eq!(gained_a.added, 1);
        assert_eq!(gained_b.added, 2);

        assert!(verify_convergence(a.as_ref(), b.as_ref()).await.is_converged());
        assert_eq!(a.all(Limit::All).await, b.all(Limit::All).await);

        // A second exchange has nothing left to move.
        let (again_a, again_b) = exchange(a.as_ref(), b.as_ref()).await.unwrap();
        assert!(!again_a.changed() && !again_b.changed());
    }

    #[tokio::test]
    async fn test_different_logs_detected() {
        let replica = Replica::in_memory(Identity::from_seed(&[1; 32]));
        let general = replica.entry_log::<String>(LogKind::Channel, "general").await.unwrap();
        let random = replica.entry_log::<String>(LogKind::Channel, "random").await.unwrap();
        assert_eq!(
            verify_convergence(general.as_ref(), random.as_ref()).await,
            ConvergenceResult::DifferentLogs
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_interleaved_appends_converge(script in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..16)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            rt.block_on(async {
                let alice = Replica::in_memory(Identity::from_seed(&[1; 32]));
                let bob = Replica::in_memory(Identity::from_seed(&[2; 32]));
                let a = alice.entry_log::<u32>(LogKind::Channel, "general").await.unwrap();
                let b = bob.entry_log::<u32>(LogKind::Channel, "general").await.unwrap();

                // Each step appends on one side and sometimes syncs.
                for (i, (on_alice, sync)) in script.iter().enumerate() {
                    let log = if *on_alice { &a } else { &b };
                    log.append(i as u32).await.unwrap();
                    if *sync {
                        exchange(a.as_ref(), b.as_ref()).await.unwrap();
                    }
                }
                exchange(a.as_ref(), b.as_ref()).await.unwrap();

                assert_eq!(a.len().await, script.len());
                assert_eq!(a.all(Limit::All).await, b.all(Limit::All).await);
                assert!(verify_convergence(a.as_ref(), b.as_ref()).await.is_converged());
            });
        }
    }
}
