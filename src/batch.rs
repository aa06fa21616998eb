//! Bounded-worker fan-out over multiple skills.
//!
//! Each skill scan is single-threaded CPU-plus-filesystem work, so scans
//! run on the blocking pool with a semaphore capping concurrency. Output
//! order is preserved by input index; a failed scan fills its slot with
//! an error string and never aborts the batch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audit::{self, AuditReport};
use crate::config::AuditConfig;
use crate::rules::RuleSet;

/// Outcome of scanning one skill within a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Position in the input slice; `outcomes[i]` always describes
    /// `targets[i]`.
    pub index: usize,
    pub target: PathBuf,
    pub report: Option<AuditReport>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Callback invoked after each skill completes, in completion order.
pub type CompletionHook = Arc<dyn Fn(&BatchOutcome) + Send + Sync>;

/// Concurrency ceiling: `min(max(CPU, 2), 32)`.
pub fn worker_ceiling() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.max(2).min(32)
}

/// Scan every target concurrently, preserving input order in the output.
///
/// The rule set is shared read-only across workers. `on_complete` (if
/// any) fires once per skill as it finishes.
pub async fn scan_batch(
    targets: &[PathBuf],
    rules: Arc<RuleSet>,
    config: AuditConfig,
    on_complete: Option<CompletionHook>,
) -> Vec<BatchOutcome> {
    let semaphore = Arc::new(Semaphore::new(worker_ceiling()));
    let mut join_set: JoinSet<BatchOutcome> = JoinSet::new();

    for (index, target) in targets.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let rules = Arc::clone(&rules);
        join_set.spawn(async move {
            // Closed only on runtime shutdown; treat as a worker error.
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    return BatchOutcome {
                        index,
                        target,
                        report: None,
                        error: Some(e.to_string()),
                        elapsed: Duration::ZERO,
                    };
                }
            };

            let start = std::time::Instant::now();
            let scan_target = target.clone();
            let result = tokio::task::spawn_blocking(move || {
                audit::scan_skill(&scan_target, &rules, &config)
            })
            .await;
            let elapsed = start.elapsed();

            let (report, error) = match result {
                Ok(Ok(report)) => (Some(report), None),
                Ok(Err(e)) => (None, Some(e.to_string())),
                Err(e) => (None, Some(format!("scan worker failed: {e}"))),
            };
            BatchOutcome {
                index,
                target,
                report,
                error,
                elapsed,
            }
        });
    }

    let mut slots: Vec<Option<BatchOutcome>> = (0..targets.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => {
                if let Some(hook) = &on_complete {
                    hook(&outcome);
                }
                let index = outcome.index;
                slots[index] = Some(outcome);
            }
            Err(e) => {
                // A panicked task loses its index; surface loudly rather
                // than guessing a slot.
                tracing::error!(error = %e, "Batch worker panicked");
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| BatchOutcome {
                index,
                target: targets[index].clone(),
                report: None,
                error: Some("scan worker panicked".to_string()),
                elapsed: Duration::ZERO,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn skill_dir(parent: &std::path::Path, name: &str, skill_md: &str) -> PathBuf {
        let dir = parent.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), skill_md).unwrap();
        dir
    }

    #[test]
    fn test_worker_ceiling_bounds() {
        let n = worker_ceiling();
        assert!((2..=32).contains(&n));
    }

    #[tokio::test]
    async fn test_batch_preserves_index_alignment() {
        let tmp = tempfile::tempdir().unwrap();
        let targets: Vec<PathBuf> = (0..12)
            .map(|i| skill_dir(tmp.path(), &format!("skill-{i}"), &format!("# Skill {i}")))
            .collect();

        let rules = Arc::new(RuleSet::builtin().unwrap());
        let outcomes = scan_batch(&targets, rules, AuditConfig::default(), None).await;

        assert_eq!(outcomes.len(), targets.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.target, targets[i]);
            let report = outcome.report.as_ref().expect("scan should succeed");
            assert_eq!(report.skill_name, format!("skill-{i}"));
        }
    }

    #[tokio::test]
    async fn test_batch_error_does_not_abort() {
        let tmp = tempfile::tempdir().unwrap();
        let good = skill_dir(tmp.path(), "good", "# ok");
        let targets = vec![good, tmp.path().join("does-not-exist")];

        let rules = Arc::new(RuleSet::builtin().unwrap());
        let outcomes = scan_batch(&targets, rules, AuditConfig::default(), None).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].report.is_some());
        assert!(outcomes[0].error.is_none());
        assert!(outcomes[1].report.is_none());
        assert!(outcomes[1].error.is_some());
    }

    #[tokio::test]
    async fn test_completion_hook_fires_per_skill() {
        let tmp = tempfile::tempdir().unwrap();
        let targets: Vec<PathBuf> = (0..5)
            .map(|i| skill_dir(tmp.path(), &format!("s{i}"), "# x"))
            .collect();

        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        let hook: CompletionHook = Arc::new(move |_| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });

        let rules = Arc::new(RuleSet::builtin().unwrap());
        scan_batch(&targets, rules, AuditConfig::default(), Some(hook)).await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let rules = Arc::new(RuleSet::builtin().unwrap());
        let outcomes = scan_batch(&[], rules, AuditConfig::default(), None).await;
        assert!(outcomes.is_empty());
    }
}
