//! Restoration of many targets against one reference.
//!
//! Targets run on a bounded rayon pool. Each target's failure is isolated and
//! attributed to its [`TargetId`]; a cancelled batch stops starting new
//! targets but leaves finished ones alone.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::error::Error;
use crate::package::Package;
use crate::restore::{Reference, RestoreOptions, Restored, restore};

/// Stable caller-chosen identity of a batch target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub String);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub enum TargetSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Package(Package),
}

impl TargetSource {
    fn load(&self) -> Result<Package, Error> {
        match self {
            TargetSource::Path(path) => Package::open(path),
            TargetSource::Bytes(bytes) => Package::from_bytes(bytes),
            TargetSource::Package(pkg) => Ok(pkg.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchTarget {
    pub id: TargetId,
    pub source: TargetSource,
}

impl BatchTarget {
    /// A file target identified by its path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: TargetId(path.display().to_string()),
            source: TargetSource::Path(path),
        }
    }
}

/// Shared flag that stops a batch from starting further targets.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Worker threads; at least one is used.
    pub concurrency: usize,
    pub restore: RestoreOptions,
    pub cancel: CancelToken,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism().map_or(1, |n| n.get()),
            restore: RestoreOptions::default(),
            cancel: CancelToken::default(),
        }
    }
}

/// Per-target results, each list in input order.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub succeeded: Vec<(TargetId, T)>,
    pub errors: Vec<(TargetId, Error)>,
    pub cancelled: Vec<TargetId>,
}

enum Outcome<T> {
    Done(T),
    Failed(Error),
    Cancelled,
}

/// Restore every target and hand each result to `finish` (typically writing
/// it somewhere). Errors from loading, restoring or `finish` land in
/// [`BatchReport::errors`] under the target's id.
pub fn restore_batch_with<T, F>(
    reference: &Reference,
    targets: &[BatchTarget],
    options: &BatchOptions,
    finish: F,
) -> BatchReport<T>
where
    T: Send,
    F: Fn(&BatchTarget, Restored) -> Result<T, Error> + Sync,
{
    let run = || -> Vec<(TargetId, Outcome<T>)> {
        targets
            .par_iter()
            .map(|target| {
                if options.cancel.is_cancelled() {
                    return (target.id.clone(), Outcome::Cancelled);
                }
                let result = target
                    .source
                    .load()
                    .and_then(|pkg| restore(reference, pkg, &options.restore))
                    .and_then(|restored| finish(target, restored));
                let outcome = match result {
                    Ok(value) => Outcome::Done(value),
                    Err(e) => {
                        log::warn!("{}: {e}", target.id);
                        Outcome::Failed(e)
                    }
                };
                (target.id.clone(), outcome)
            })
            .collect()
    };

    let outcomes = match rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.max(1))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            log::warn!("could not build a {}-thread pool ({e}); using the global pool", options.concurrency);
            run()
        }
    };

    let mut report = BatchReport {
        succeeded: Vec::new(),
        errors: Vec::new(),
        cancelled: Vec::new(),
    };
    for (id, outcome) in outcomes {
        match outcome {
            Outcome::Done(value) => report.succeeded.push((id, value)),
            Outcome::Failed(e) => report.errors.push((id, e)),
            Outcome::Cancelled => report.cancelled.push(id),
        }
    }
    log::info!(
        "Batch: {} restored, {} failed, {} cancelled",
        report.succeeded.len(),
        report.errors.len(),
        report.cancelled.len()
    );
    report
}

/// Restore every target, keeping the restored packages in memory.
pub fn restore_batch(
    reference: &Reference,
    targets: &[BatchTarget],
    options: &BatchOptions,
) -> BatchReport<Restored> {
    restore_batch_with(reference, targets, options, |_, restored| Ok(restored))
}
