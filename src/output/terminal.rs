// Colored terminal output for analysis runs, stored comments and statistics.
//
// This module handles all terminal-specific formatting: colors and tables.
// The main.rs command handlers delegate here.

use colored::Colorize;

use crate::db::models::{LabelCount, LabelDistribution, StoredComment, TableSummary};
use crate::device::{ComputeCapability, DevicePolicy};
use crate::labels::{HateCategory, ToneLabel};
use crate::pipeline::{AnalysisOutcome, PersistReport};

use super::{single_line, truncate_chars};

/// Show what the device profiler found and the policy derived from it.
pub fn display_device(capability: &ComputeCapability, policy: &DevicePolicy) {
    println!("Device: {}", capability);
    println!(
        "  Batch size: {}  |  Precision: {}",
        policy.batch_size, policy.precision
    );
}

/// Summarize one `analyze` run.
pub fn display_summary(outcome: &AnalysisOutcome) {
    println!(
        "\n{}",
        format!(
            "=== Classified {} comments in {} batches ===",
            outcome.records.len(),
            outcome.batches
        )
        .bold()
    );
    println!();

    let tone_counts: Vec<LabelCount> = ToneLabel::ALL
        .iter()
        .map(|t| LabelCount {
            name: t.name().to_string(),
            count: outcome.records.iter().filter(|r| r.tone == *t).count() as i64,
        })
        .collect();
    let hate_counts: Vec<LabelCount> = HateCategory::ALL
        .iter()
        .map(|h| LabelCount {
            name: h.name().to_string(),
            count: outcome.records.iter().filter(|r| r.hate == *h).count() as i64,
        })
        .collect();

    let total = outcome.records.len() as i64;
    print_counts("Tone", &tone_counts, total);
    print_counts("Hate category", &hate_counts, total);

    let overridden = outcome.records.iter().filter(|r| r.overridden()).count();
    if overridden > 0 {
        println!(
            "  {} {} hate predictions adjusted to match tone",
            "~".yellow(),
            overridden
        );
    }

    if let Some(report) = &outcome.persistence {
        display_persistence(report);
    }
}

/// Report how many rows reached the database, and which didn't.
pub fn display_persistence(report: &PersistReport) {
    if report.is_complete() {
        println!(
            "  {} {} comments saved",
            "✓".green(),
            report.inserted.len()
        );
        return;
    }

    println!(
        "  {} {} of {} comments saved, {} failed:",
        "!".bright_red(),
        report.inserted.len(),
        report.attempted(),
        report.warnings.len()
    );
    for warning in &report.warnings {
        println!("    {}", warning.to_string().dimmed());
    }
}

/// Display one page of stored comments.
pub fn display_comments(comments: &[StoredComment], page: u32, page_size: u32, total: i64) {
    if comments.is_empty() {
        if total == 0 {
            println!("No comments stored yet. Run `tonescope analyze <file>` first.");
        } else {
            println!("Page {} is empty ({} comments in total).", page.max(1), total);
        }
        return;
    }

    let pages = (total.max(1) as u64).div_ceil(u64::from(page_size.max(1)));
    println!(
        "\n{}",
        format!("=== Comments (page {} of {}, {} total) ===", page.max(1), pages, total).bold()
    );
    println!();

    println!(
        "  {:>6}  {:<9} {:<11} {}",
        "Id".dimmed(),
        "Tone".dimmed(),
        "Hate".dimmed(),
        "Text".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());

    for comment in comments {
        let preview = truncate_chars(&single_line(&comment.text), 50);
        println!(
            "  {:>6}  {:<9} {:<11} {}",
            comment.id,
            colorize_tone(&comment.tone),
            colorize_hate(&comment.hate),
            preview
        );
    }
    println!();
}

/// Display tone and hate counts for everything stored.
pub fn display_distribution(dist: &LabelDistribution) {
    let total = dist.total();
    if total == 0 {
        println!("No comments stored yet. Run `tonescope analyze <file>` first.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Label distribution ({} comments) ===", total).bold()
    );
    println!();
    print_counts("Tone", &dist.tones, total);
    print_counts("Hate category", &dist.hates, total);
}

/// Display table names, row counts and columns.
pub fn display_tables(tables: &[TableSummary]) {
    for table in tables {
        println!("  {} ({} rows)", table.name.bold(), table.rows);
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.primary_key {
                flags.push("pk".to_string());
            }
            if column.not_null {
                flags.push("not null".to_string());
            }
            if let Some(fk) = table.foreign_keys.iter().find(|f| f.from == column.name) {
                flags.push(format!("→ {}.{}", fk.table, fk.to));
            }
            println!(
                "    {:<14} {:<8} {}",
                column.name,
                column.decl_type.to_lowercase(),
                flags.join(", ").dimmed()
            );
        }
    }
}

fn print_counts(title: &str, counts: &[LabelCount], total: i64) {
    println!("  {}", title.underline());
    for c in counts {
        let share = if total > 0 {
            c.count as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        println!("    {:<12} {:>6}  {:>5.1}%", c.name, c.count, share);
    }
    println!();
}

fn colorize_tone(name: &str) -> colored::ColoredString {
    match name {
        "Insult" => name.red(),
        "Positive" => name.green(),
        _ => name.normal(),
    }
}

fn colorize_hate(name: &str) -> colored::ColoredString {
    if name == HateCategory::NoAbuse.name() {
        name.dimmed()
    } else {
        name.bright_red()
    }
}
