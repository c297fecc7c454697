//! Card display for ChangeSets and apply results.
//!
//! A ChangeSet prints as a header, grouped key/value sections, then one
//! compact card per record with its citation, resolution and review needs.

use amendlaw_core::{
    ChangeRecord, ChangeSet, ConfidenceLevel, Manifest, Resolution, manifest_to_record_batch,
};
use arrow::util::pretty::pretty_format_batches;

const MAX_CITATION: usize = 100;

// ── Public API ──

/// Print a whole ChangeSet. `level` limits the record cards to one
/// confidence level.
pub fn print_changeset_card(changeset: &ChangeSet, level: Option<ConfidenceLevel>) {
    println!("=== {} ===", changeset.changeset_id);
    println!(
        "amendment {} against {} v{}",
        changeset.amendment_id, changeset.act_id, changeset.act_version
    );
    println!();

    let cov = &changeset.coverage;
    println!("Coverage");
    row("spans", cov.total_spans);
    row("covered", cov.covered_spans);
    row("fraction", format!("{:.2} (threshold {:.2})", cov.fraction, cov.threshold));
    if cov.incomplete {
        row("status", "INCOMPLETE");
        let uncovered: Vec<String> = cov.uncovered.iter().map(|i| format!("#{i}")).collect();
        row("uncovered spans", uncovered.join(", "));
    }
    println!();

    let s = changeset.summary();
    println!("Summary");
    row("records", s.total);
    for (name, count) in [
        ("substitutions", s.substitutions),
        ("insertions", s.insertions),
        ("deletions", s.deletions),
        ("renumberings", s.renumberings),
        ("global replacements", s.global_replacements),
        ("unclassified", s.unclassified),
        ("unresolved", s.unresolved),
    ] {
        if count > 0 {
            row(name, count);
        }
    }
    row("high confidence", s.high_confidence);
    row("requires review", s.requires_review);
    row("average confidence", format!("{:.1}", s.avg_confidence));
    println!();

    let shown: Vec<&ChangeRecord> = changeset
        .records
        .iter()
        .filter(|r| level.is_none_or(|l| r.confidence().level == l))
        .collect();
    println!("Records ({})", shown.len());
    for record in shown {
        print_record(record);
    }
}

/// Print the applied-changes manifest as a table.
pub fn print_manifest(manifest: &Manifest) -> anyhow::Result<()> {
    println!(
        "=== {} v{} -> v{} ({} changes) ===",
        manifest.act_id,
        manifest.base_version,
        manifest.new_version,
        manifest.len()
    );
    if manifest.is_empty() {
        return Ok(());
    }
    let batch = manifest_to_record_batch(manifest)?;
    println!("{}", pretty_format_batches(&[batch])?);
    Ok(())
}

// ── Record cards ──

fn print_record(record: &ChangeRecord) {
    let conf = record.confidence();
    let target = match record.resolution() {
        Resolution::Resolved { range, path, fuzzy } => {
            let fuzzy = if *fuzzy { " (fuzzy)" } else { "" };
            format!("{range} at {}{fuzzy}", display_path(&path.to_string()))
        }
        Resolution::Unresolved { failure } => format!("UNRESOLVED {failure}"),
    };
    println!(
        "  {:<26} {:<14} {:<6} {:>3}  {}",
        record.change_id().0,
        record.kind().as_str(),
        conf.level.as_str(),
        conf.score,
        target
    );

    let op = record.op();
    if let Some(orig) = op.original_text() {
        println!("      from: {}", truncate(orig, MAX_CITATION));
    }
    if let Some(new) = op.new_text() {
        println!("      to:   {}", truncate(new, MAX_CITATION));
    }
    println!("      cite: {}", truncate(record.citation().as_str(), MAX_CITATION));

    let v = record.validation();
    if let Some(d) = &v.discrepancy {
        println!("      discrepancy: {d}");
    }
    let ctx = record.context();
    if let Some(before) = &ctx.before {
        println!("      before: {}", truncate(before, MAX_CITATION));
    }
    if let Some(after) = &ctx.after {
        println!("      after:  {}", truncate(after, MAX_CITATION));
    }
    println!("      review: {}", record.requirement().as_str());
}

// ── Helpers ──

fn row(name: &str, value: impl std::fmt::Display) {
    println!("  {name:<26} {value}");
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "(preamble)" } else { path }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
