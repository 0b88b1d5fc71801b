use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use docxide_restore::{BatchOptions, CompareMode, CompareOptions, ComparisonResult};

/// Below this similarity `compare` exits with status 1.
const PASS_SIMILARITY: f64 = 90.0;

#[derive(Parser)]
#[command(name = "docxide-restore")]
#[command(about = "Restore DOCX formatting from a reference document and compare document structure")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the reference's formatting to one document
    Restore {
        /// Document whose formatting is correct
        reference: PathBuf,
        /// Document whose content is kept
        target: PathBuf,
        /// Output path (default: <target>_formatted.docx beside the target)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply the reference's formatting to many documents
    Batch {
        reference: PathBuf,
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        /// Output directory (default: beside each target)
        #[arg(short, long = "output-dir")]
        output_dir: Option<PathBuf>,
        /// Worker threads (default: available cores)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Compare the markup structure of two documents
    Compare {
        reference: PathBuf,
        candidate: PathBuf,
        /// Compare formatting parts only, leaving out the main document
        #[arg(long)]
        no_full: bool,
        /// Compare a single part, e.g. styles.xml or word/document.xml
        #[arg(long, alias = "file")]
        part: Option<String>,
        #[arg(long, default_value_t = 100)]
        max_diffs: usize,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Restore {
            reference,
            target,
            output,
        } => run_restore(&reference, &target, output.as_deref()),
        Command::Batch {
            reference,
            targets,
            output_dir,
            jobs,
        } => run_batch(&reference, &targets, output_dir.as_deref(), jobs),
        Command::Compare {
            reference,
            candidate,
            no_full,
            part,
            max_diffs,
            json,
        } => {
            let options = CompareOptions {
                mode: if no_full { CompareMode::FormattingOnly } else { CompareMode::Full },
                max_diffs,
                part,
                ..CompareOptions::default()
            };
            run_compare(&reference, &candidate, &options, json)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_restore(
    reference: &Path,
    target: &Path,
    output: Option<&Path>,
) -> docxide_restore::Result<ExitCode> {
    let outcome = docxide_restore::restore_one(reference, target, output)?;
    for w in &outcome.warnings {
        eprintln!("warning: {w}");
    }
    println!("Restored -> {}", outcome.output_path.display());
    Ok(ExitCode::SUCCESS)
}

fn run_batch(
    reference: &Path,
    targets: &[PathBuf],
    output_dir: Option<&Path>,
    jobs: Option<usize>,
) -> docxide_restore::Result<ExitCode> {
    let mut options = BatchOptions::default();
    if let Some(jobs) = jobs {
        options.concurrency = jobs;
    }
    let outcome = docxide_restore::restore_batch(reference, targets, output_dir, &options)?;

    for (id, path) in &outcome.outputs {
        println!("OK    {id} -> {}", path.display());
    }
    for (id, e) in &outcome.errors {
        println!("FAIL  {id}: {e}");
    }
    for id in &outcome.cancelled {
        println!("SKIP  {id}");
    }
    println!(
        "{} restored, {} failed, {} cancelled",
        outcome.outputs.len(),
        outcome.errors.len(),
        outcome.cancelled.len()
    );
    Ok(if outcome.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_compare(
    reference: &Path,
    candidate: &Path,
    options: &CompareOptions,
    json: bool,
) -> docxide_restore::Result<ExitCode> {
    let result = docxide_restore::compare(reference, candidate, options)?;

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error: could not serialize result: {e}"),
        }
    } else {
        print_report(&result);
    }

    Ok(if result.similarity < PASS_SIMILARITY {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(result: &ComparisonResult) {
    for p in &result.parts {
        println!(
            "{:<32} {:>7.2}%  {} format diffs, {} content diffs skipped",
            p.part, p.similarity, p.total_format_diffs, p.skipped_content_diffs
        );
    }
    println!();
    println!(
        "Similarity: {:.2}%  ({} format diffs, {} content diffs skipped)",
        result.similarity, result.total_format_diffs, result.skipped_content_diffs
    );
    if result.is_identical() {
        println!("Documents are structurally identical.");
        return;
    }

    for (i, d) in result.diffs.iter().enumerate() {
        let show = |c: Option<char>| c.map_or_else(|| "<end>".to_string(), |c| format!("{c:?}"));
        println!();
        println!(
            "#{} {} [{}] at {}: {} vs {}",
            i + 1,
            d.part,
            d.kind,
            d.offset,
            show(d.reference_char),
            show(d.candidate_char)
        );
        println!("  reference: ...{}|{}...", d.context_before, d.context_after);
        println!("  candidate: ...{}|{}...", d.candidate_context_before, d.candidate_context_after);
    }
    if result.total_format_diffs > result.diffs.len() {
        println!();
        println!("({} more not shown)", result.total_format_diffs - result.diffs.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_accepts_file_as_the_part_flag() {
        for flag in ["--part", "--file"] {
            let cli = Cli::try_parse_from(["docxide-restore", "compare", "a.docx", "b.docx", flag, "styles.xml"])
                .unwrap();
            match cli.command {
                Command::Compare { part, .. } => assert_eq!(part.as_deref(), Some("styles.xml")),
                _ => panic!("expected compare"),
            }
        }
    }
}
