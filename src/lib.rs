pub mod batch;
pub mod compare;
mod docx;
mod error;
mod model;
pub mod normalize;
pub mod package;
pub mod restore;
pub mod xml;

pub use batch::{BatchOptions, BatchReport, BatchTarget, CancelToken, TargetId, TargetSource};
pub use compare::{CompareMode, CompareOptions, ComparisonResult, Diff, DiffKind, PartComparison};
pub use docx::parse_content;
pub use error::{Error, Result};
pub use model::{ContentSummary, Document, StyleKind};
pub use package::Package;
pub use restore::{Reference, RestoreOptions, Restored, Warning, content_summary};

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Output of a single restoration.
#[derive(Debug)]
pub struct RestoreOutcome {
    pub output_path: PathBuf,
    pub warnings: Vec<Warning>,
}

/// Output of a batch restoration.
#[derive(Debug)]
pub struct BatchOutcome {
    pub outputs: Vec<(TargetId, PathBuf)>,
    pub errors: Vec<(TargetId, Error)>,
    pub cancelled: Vec<TargetId>,
}

/// `<dir>/<stem>_formatted.docx` for a target at `<dir>/<stem>.docx`.
pub fn default_output_path(target: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| target.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}_formatted.docx"))
}

pub fn restore_one(reference: &Path, target: &Path, output: Option<&Path>) -> Result<RestoreOutcome> {
    restore_one_with(reference, target, output, &RestoreOptions::default())
}

pub fn restore_one_with(
    reference: &Path,
    target: &Path,
    output: Option<&Path>,
    options: &RestoreOptions,
) -> Result<RestoreOutcome> {
    let t0 = Instant::now();

    let reference = Reference::open(reference)?;
    let package = Package::open(target)?;
    let t_load = t0.elapsed();

    let restored = restore::restore(&reference, package, options)?;
    let t_restore = t0.elapsed();

    let output_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(target, None));
    restored.package.write(&output_path)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: load={:.1}ms, restore={:.1}ms, write={:.1}ms, total={:.1}ms ({} paragraphs, {} warnings)",
        t_load.as_secs_f64() * 1000.0,
        (t_restore - t_load).as_secs_f64() * 1000.0,
        (t_total - t_restore).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        restored.summary.paragraphs,
        restored.warnings.len(),
    );

    Ok(RestoreOutcome {
        output_path,
        warnings: restored.warnings,
    })
}

/// Restore every target file, writing `<stem>_formatted.docx` into
/// `output_dir` (or beside each target). Per-target failures are reported in
/// the outcome; only a reference that cannot be loaded fails the call.
pub fn restore_batch(
    reference: &Path,
    targets: &[PathBuf],
    output_dir: Option<&Path>,
    options: &BatchOptions,
) -> Result<BatchOutcome> {
    let t0 = Instant::now();
    let reference = Reference::open(reference)?;
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let batch: Vec<BatchTarget> = targets.iter().map(BatchTarget::from_path).collect();
    let report = batch::restore_batch_with(&reference, &batch, options, |target, restored| {
        let TargetSource::Path(path) = &target.source else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file path to derive an output name from", target.id),
            )));
        };
        let output = default_output_path(path, output_dir);
        restored.package.write(&output)?;
        for w in &restored.warnings {
            log::info!("{}: {w}", target.id);
        }
        Ok(output)
    });

    log::info!(
        "Timing: batch of {} in {:.1}ms",
        targets.len(),
        t0.elapsed().as_secs_f64() * 1000.0
    );

    Ok(BatchOutcome {
        outputs: report.succeeded,
        errors: report.errors,
        cancelled: report.cancelled,
    })
}

pub fn compare(reference: &Path, candidate: &Path, options: &CompareOptions) -> Result<ComparisonResult> {
    let t0 = Instant::now();

    let a = Package::open(reference)?;
    let b = Package::open(candidate)?;
    let t_load = t0.elapsed();

    let result = compare::compare_packages(&a, &b, options)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: load={:.1}ms, compare={:.1}ms, total={:.1}ms (similarity {:.2}%, {} format diffs)",
        t_load.as_secs_f64() * 1000.0,
        (t_total - t_load).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        result.similarity,
        result.total_format_diffs,
    );

    Ok(result)
}
