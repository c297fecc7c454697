mod display;
mod export;
mod input;

use std::path::{Path, PathBuf};

use amendlaw_core::{ConfidenceLevel, EngineConfig};
use amendlaw_extract::{ExtractionPass, PatternPass, run_dual_pass};
use amendlaw_remote::HttpExtractionPass;
use amendlaw_store::{AmendmentService, ReversePatch, apply_reverse};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

#[derive(Parser)]
#[command(name = "amendlaw", version, about = "Extract, review and apply statutory amendments")]
struct Cli {
    /// Engine configuration JSON.
    #[arg(long, global = true, env = "AMENDLAW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the coverage threshold (0.0 to 1.0).
    #[arg(long, global = true, env = "AMENDLAW_COVERAGE_THRESHOLD")]
    coverage_threshold: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a ChangeSet from an amendment against an Act.
    Extract {
        /// Act as text, a JSON list of lines, or a saved Act JSON.
        #[arg(long)]
        act: PathBuf,
        #[arg(long)]
        act_id: Option<String>,
        /// Amendment as text or JSON.
        #[arg(long)]
        amendment: PathBuf,
        #[arg(long)]
        amendment_id: Option<String>,
        /// Extraction service for the secondary pass. Defaults to a local
        /// pattern pass.
        #[arg(long, env = "AMENDLAW_SECONDARY_URL")]
        secondary_url: Option<String>,
        /// Write the ChangeSet here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print a ChangeSet as record cards.
    Show {
        #[arg(long)]
        changeset: PathBuf,
        /// Only show records at this confidence level.
        #[arg(long, value_enum)]
        level: Option<LevelArg>,
    },
    /// Apply the accepted records of a ChangeSet and write the new version.
    Apply {
        #[arg(long)]
        act: PathBuf,
        #[arg(long)]
        act_id: Option<String>,
        #[arg(long)]
        changeset: PathBuf,
        /// JSON list of reviewer decisions.
        #[arg(long)]
        decisions: Option<PathBuf>,
        /// Accept HIGH-confidence records that need no review first.
        #[arg(long)]
        auto_accept: bool,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Undo an apply with its reverse patch.
    Revert {
        /// The Act version the patch was produced for.
        #[arg(long)]
        act: PathBuf,
        #[arg(long)]
        patch: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    High,
    Medium,
    Low,
}

impl From<LevelArg> for ConfidenceLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::High => ConfidenceLevel::High,
            LevelArg::Medium => ConfidenceLevel::Medium,
            LevelArg::Low => ConfidenceLevel::Low,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("amendlaw v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = input::load_config(cli.config.as_deref(), cli.coverage_threshold)?;

    match cli.command {
        Command::Extract {
            act,
            act_id,
            amendment,
            amendment_id,
            secondary_url,
            out,
        } => {
            cmd_extract(
                &config,
                &act,
                act_id.as_deref(),
                &amendment,
                amendment_id.as_deref(),
                secondary_url.as_deref(),
                out.as_deref(),
            )
            .await
        }
        Command::Show { changeset, level } => {
            let cs = input::load_changeset(&changeset)?;
            display::print_changeset_card(&cs, level.map(Into::into));
            Ok(())
        }
        Command::Apply {
            act,
            act_id,
            changeset,
            decisions,
            auto_accept,
            out_dir,
        } => cmd_apply(
            config,
            &act,
            act_id.as_deref(),
            &changeset,
            decisions.as_deref(),
            auto_accept,
            &out_dir,
        ),
        Command::Revert { act, patch, out } => cmd_revert(&act, &patch, &out),
    }
}

// ── Commands ──

async fn cmd_extract(
    config: &EngineConfig,
    act_path: &Path,
    act_id: Option<&str>,
    amendment_path: &Path,
    amendment_id: Option<&str>,
    secondary_url: Option<&str>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let act = input::load_act(act_path, act_id)?;
    let amendment = input::load_amendment(amendment_path, amendment_id)?;
    eprintln!(
        "Extracting {} ({} spans) against {} v{} ({} lines)...",
        amendment.amendment_id,
        amendment.len(),
        act.act_id(),
        act.version(),
        act.len()
    );

    let primary = PatternPass::new("primary");
    let secondary: Box<dyn ExtractionPass> = match secondary_url {
        Some(url) => Box::new(HttpExtractionPass::new("secondary", url)),
        None => Box::new(PatternPass::new("secondary")),
    };
    let changeset = run_dual_pass(&primary, secondary.as_ref(), &amendment, &act, config).await?;

    let summary = changeset.summary();
    eprintln!(
        "  {} records, {} high confidence, {} need review, coverage {:.2}{}",
        summary.total,
        summary.high_confidence,
        summary.requires_review,
        changeset.coverage.fraction,
        if changeset.coverage.incomplete { " (INCOMPLETE)" } else { "" }
    );

    match out {
        Some(path) => {
            export::write_json(path, &changeset)?;
            eprintln!("  Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&changeset)?),
    }
    Ok(())
}

fn cmd_apply(
    config: EngineConfig,
    act_path: &Path,
    act_id: Option<&str>,
    changeset_path: &Path,
    decisions: Option<&Path>,
    auto_accept: bool,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let act = input::load_act(act_path, act_id)?;
    let changeset = input::load_changeset(changeset_path)?;
    let changeset_id = changeset.changeset_id.clone();

    let service = AmendmentService::new(config);
    service.import_act(act)?;
    service
        .register_changeset(changeset)
        .with_context(|| format!("registering {changeset_id}"))?;

    if auto_accept {
        let accepted = service.auto_accept_high(&changeset_id)?;
        eprintln!("Auto-accepted {} records", accepted.len());
    }
    if let Some(path) = decisions {
        let decisions = input::load_decisions(path)?;
        for d in &decisions {
            service
                .submit_decision(
                    &d.change_id,
                    d.decision,
                    &d.reviewer_id,
                    d.expected_state,
                    d.comment.clone(),
                )
                .with_context(|| format!("decision on {}", d.change_id))?;
        }
        eprintln!("Recorded {} decisions", decisions.len());
    }

    let applied = service.apply(&changeset_id)?;
    let version = applied.act.version();

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let act_out = out_dir.join(format!("act_v{version}.json"));
    export::write_json(&act_out, applied.act.as_ref())?;
    export::write_json(&out_dir.join("reverse_patch.json"), &applied.reverse_patch)?;
    export::write_json(&out_dir.join("manifest.json"), &applied.manifest)?;
    let rows = export::write_manifest_ipc(&out_dir.join("manifest.arrow"), &applied.manifest)?;
    eprintln!("Wrote {} and {rows} manifest rows to {}", act_out.display(), out_dir.display());

    display::print_manifest(&applied.manifest)
}

fn cmd_revert(act_path: &Path, patch_path: &Path, out: &Path) -> anyhow::Result<()> {
    let act = input::load_act(act_path, None)?;
    let text = std::fs::read_to_string(patch_path)
        .with_context(|| format!("reading patch {}", patch_path.display()))?;
    let patch: ReversePatch = serde_json::from_str(&text)
        .with_context(|| format!("parsing patch {}", patch_path.display()))?;

    let restored = apply_reverse(&act, &patch)?;
    export::write_json(out, &restored)?;
    eprintln!(
        "Reverted {} v{} to v{} ({} ops), wrote {}",
        act.act_id(),
        patch.applied_version,
        restored.version(),
        patch.len(),
        out.display()
    );
    Ok(())
}
