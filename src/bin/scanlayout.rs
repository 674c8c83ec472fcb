//! CLI binary for edgequake-scanlayout.
//!
//! A thin shim over the library crate: reads a `layout.json`, runs one engine
//! stage and writes the result. All file writes are atomic.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_scanlayout::layout::write_atomic;
use edgequake_scanlayout::pipeline::review::ReviewFile;
use edgequake_scanlayout::{
    apply_edits, calibrate, compute_margin, document_dpi, flatten_low_confidence, plan_exact,
    plan_flow, EngineConfig, FileBackup, LayoutTree,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # What did the OCR produce? DPI, paper, blocks, margin
  scanlayout inspect out/layout.json

  # Shrink overlapping line boxes, writing a new file
  scanlayout calibrate out/layout.json -o out/layout_calibrated.json

  # Same, in place, with a stricter overlap gate
  scanlayout calibrate --in-place --overlap-threshold -15 out/layout.json

  # Export spans scoring below 0.8 for review, edit `correction`, patch back
  scanlayout review --cutoff 0.8 out/layout.json -o corrections.json
  scanlayout patch out/layout.json corrections.json

  # Render plan for a PDF writer (reflowed onto A4)
  scanlayout plan --mode flow out/layout.json -o plan.json

  # Exact-position plan with custom engine settings
  scanlayout --config engine.json plan --mode exact out/layout.json

CORRECTIONS FILE:
  `review` writes {"quality_cutoff": .., "items": [..]}. Each item carries the
  span address, the OCR text (`content`) and a `correction` pre-filled with
  it. Edit `correction`; leave it blank to delete the span. `patch` rejects
  items whose span no longer holds `content` (stale file).

  Before the first change, `patch` saves the untouched layout as
  layout_uncorrected.json next to it. An existing backup is never replaced.

ENGINE CONFIG (--config):
  JSON with any subset of: font_buckets, title_font_pt, discarded_font_pt,
  footnote_font_pt, fallback_font_pt, calibration{target_line_height_px,
  overlap_threshold_px}, quality_cutoff, target_page_width_pt,
  target_page_height_pt, margin_bounds{min_pt,max_pt}, footnote_detection,
  gap_threshold_px. Missing fields take their defaults.

ENVIRONMENT VARIABLES:
  SCANLAYOUT_CONFIG   Engine config file (same as --config)
  RUST_LOG            Log filter, overrides -v / -q
"#;

#[derive(Parser, Debug)]
#[command(
    name = "scanlayout",
    version,
    about = "Calibrate, correct and plan page layouts from OCR layout.json output",
    long_about = "Rebuild correctly scaled and positioned page layouts from an OCR service's \
layout.json: infer the scan DPI, repair overlapping line boxes, review and patch low-confidence \
spans, and emit render plans (exact or reflowed) for a PDF writer.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Engine configuration (JSON). Defaults apply to missing fields.
    #[arg(long, global = true, env = "SCANLAYOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logs.
    #[arg(short, long, global = true, env = "SCANLAYOUT_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, env = "SCANLAYOUT_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarise a layout: DPI, paper size, blocks, review load and margin.
    Inspect {
        layout: PathBuf,
        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },
    /// Run the Line Calibrator.
    Calibrate(CalibrateArgs),
    /// Export low-confidence spans to a corrections file.
    Review {
        layout: PathBuf,
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Spans scoring strictly below this are exported. Overrides the config.
        #[arg(long)]
        cutoff: Option<f64>,
    },
    /// Apply a corrections file to a layout.
    Patch {
        layout: PathBuf,
        corrections: PathBuf,
        /// Write the patched layout here instead of in place.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Backup location. Default: layout_uncorrected.json next to the layout.
        #[arg(long)]
        backup: Option<PathBuf>,
    },
    /// Emit a render plan as JSON.
    Plan {
        layout: PathBuf,
        #[arg(long, value_enum, default_value = "flow")]
        mode: PlanMode,
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Calibrate the tree in memory before planning.
        #[arg(long)]
        calibrate: bool,
    },
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    layout: PathBuf,
    /// Write the calibrated layout here.
    #[arg(short, long, conflicts_with = "in_place")]
    output: Option<PathBuf>,
    /// Overwrite the input layout.
    #[arg(long)]
    in_place: bool,
    /// Median line height (px) above which a block is shrunk.
    #[arg(long)]
    target_line_height: Option<f64>,
    /// Overlap gate in px (≤ 0; 0 disables the gate).
    #[arg(long, allow_negative_numbers = true)]
    overlap_threshold: Option<f64>,
    /// Print the per-block report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PlanMode {
    Exact,
    Flow,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Inspect { layout, json } => run_inspect(&layout, &config, json),
        Command::Calibrate(args) => run_calibrate(args, config, cli.quiet),
        Command::Review {
            layout,
            output,
            cutoff,
        } => run_review(&layout, output.as_deref(), cutoff.unwrap_or(config.quality_cutoff), cli.quiet),
        Command::Patch {
            layout,
            corrections,
            output,
            backup,
        } => run_patch(&layout, &corrections, output.as_deref(), backup, cli.quiet),
        Command::Plan {
            layout,
            mode,
            output,
            calibrate,
        } => run_plan(&layout, mode, output.as_deref(), calibrate, &config),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config '{}'", path.display()))?;
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

fn load_layout(path: &Path) -> Result<LayoutTree> {
    LayoutTree::from_json_file(path).with_context(|| format!("Failed to load '{}'", path.display()))
}

/// Pretty JSON to `output` (atomically) or stdout.
fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    match output {
        Some(path) => write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write '{}'", path.display())),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .context("Failed to write to stdout")
        }
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InspectSummary {
    pages: usize,
    blocks: usize,
    dpi: f64,
    paper: &'static str,
    dpi_deviation: f64,
    low_confidence_spans: usize,
    quality_cutoff: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    margin: Option<edgequake_scanlayout::MarginReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    margin_error: Option<String>,
}

fn run_inspect(layout: &Path, config: &EngineConfig, json: bool) -> Result<()> {
    let tree = load_layout(layout)?;
    let estimate = document_dpi(&tree).context("Cannot infer DPI")?;
    let low = flatten_low_confidence(&tree, config.quality_cutoff)?;
    // A tree without content blocks still inspects; the margin is reported as unavailable.
    let (margin, margin_error) = match compute_margin(&tree, estimate.dpi, config) {
        Ok(m) => (Some(m), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let summary = InspectSummary {
        pages: tree.pages.len(),
        blocks: tree.block_count(),
        dpi: estimate.dpi,
        paper: estimate.paper.name,
        dpi_deviation: estimate.deviation,
        low_confidence_spans: low.len(),
        quality_cutoff: config.quality_cutoff,
        margin,
        margin_error,
    };
    if json {
        return emit_json(&summary, None);
    }

    println!("File:         {}", layout.display());
    println!("Pages:        {}", summary.pages);
    println!("Blocks:       {}", summary.blocks);
    println!(
        "DPI:          {:.1}  {}",
        summary.dpi,
        dim(&format!(
            "({}, deviation {:.4})",
            summary.paper, summary.dpi_deviation
        ))
    );
    println!(
        "Review:       {} spans below {}",
        summary.low_confidence_spans, summary.quality_cutoff
    );
    match (&summary.margin, &summary.margin_error) {
        (Some(m), _) => println!(
            "Flow margin:  {:.2}pt  {}",
            m.margin_pt,
            dim(&format!(
                "(content width {:.2}pt, unclamped {:.2}pt)",
                m.content_width_pt, m.unclamped_margin_pt
            ))
        ),
        (None, Some(e)) => println!("Flow margin:  {}", red(e)),
        (None, None) => {}
    }
    Ok(())
}

fn run_calibrate(args: CalibrateArgs, config: EngineConfig, quiet: bool) -> Result<()> {
    let mut settings = config.calibration;
    if let Some(v) = args.target_line_height {
        settings.target_line_height_px = v;
    }
    if let Some(v) = args.overlap_threshold {
        settings.overlap_threshold_px = v;
    }

    let mut tree = load_layout(&args.layout)?;
    let report = calibrate(&mut tree, &settings).context("Calibration failed")?;

    let destination = match (&args.output, args.in_place) {
        (Some(out), _) => Some(out.clone()),
        (None, true) => Some(args.layout.clone()),
        (None, false) => None,
    };
    if let Some(path) = &destination {
        tree.save_atomic(path)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
    }

    if args.json {
        emit_json(&report, None)?;
    } else if !quiet {
        eprintln!(
            "{} {}/{} blocks calibrated{}",
            green("✔"),
            bold(&report.fixed().to_string()),
            report.examined(),
            match &destination {
                Some(p) => format!("  →  {}", bold(&p.display().to_string())),
                None => dim("  (dry run: use -o or --in-place to save)"),
            }
        );
    }
    Ok(())
}

fn run_review(layout: &Path, output: Option<&Path>, cutoff: f64, quiet: bool) -> Result<()> {
    let tree = load_layout(layout)?;
    let items = flatten_low_confidence(&tree, cutoff)?;
    let count = items.len();
    emit_json(
        &ReviewFile {
            quality_cutoff: cutoff,
            items,
        },
        output,
    )?;
    if !quiet {
        if let Some(path) = output {
            eprintln!(
                "{} {} spans below {}  →  {}",
                cyan("◆"),
                bold(&count.to_string()),
                cutoff,
                bold(&path.display().to_string())
            );
        }
    }
    Ok(())
}

fn run_patch(
    layout: &Path,
    corrections: &Path,
    output: Option<&Path>,
    backup: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let mut tree = load_layout(layout)?;
    let text = std::fs::read_to_string(corrections)
        .with_context(|| format!("Failed to read '{}'", corrections.display()))?;
    let review: ReviewFile = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse corrections '{}'", corrections.display()))?;

    let mut sink = match backup {
        Some(path) => FileBackup::new(path),
        None => FileBackup::beside(layout),
    };
    let report = apply_edits(&mut tree, &review.edits(), &mut sink).context("Patch aborted")?;

    let destination = output.unwrap_or(layout);
    if report.changed() > 0 || output.is_some() {
        tree.save_atomic(destination)
            .with_context(|| format!("Failed to write '{}'", destination.display()))?;
    }

    if !quiet {
        for rejected in &report.rejected {
            eprintln!("  {} {}", red("✘"), rejected);
        }
        let mark = if report.rejected.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!("{} {}", mark, report.summary());
        if report.backed_up {
            eprintln!("   {}", dim(&format!("backup: {}", sink.path().display())));
        }
    }
    if !review.items.is_empty() && report.rejected.len() == review.items.len() {
        bail!("No correction could be applied; is the corrections file from another layout?");
    }
    Ok(())
}

fn run_plan(
    layout: &Path,
    mode: PlanMode,
    output: Option<&Path>,
    calibrate_first: bool,
    config: &EngineConfig,
) -> Result<()> {
    let mut tree = load_layout(layout)?;
    if calibrate_first {
        calibrate(&mut tree, &config.calibration).context("Calibration failed")?;
    }
    match mode {
        PlanMode::Exact => {
            let plan = plan_exact(&tree, config).context("Exact plan failed")?;
            emit_json(&plan, output)
        }
        PlanMode::Flow => {
            let plan = plan_flow(&tree, config).context("Flow plan failed")?;
            emit_json(&plan, output)
        }
    }
}
