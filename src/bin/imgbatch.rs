//! CLI binary for edgequake-imgbatch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig`, runs the batch and writes the archive.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_imgbatch::{
    from_paths_or_urls, load_table, process_batch, write_archive, write_individual,
    BatchConfig, BatchProgressCallback, BatchStats, DuplicateNames, NamedItem, ProgressCallback,
    SkippedItem,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar plus a log line per item. Items may
/// finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-item start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} images  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            skipped: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_items} images…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total_items: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, index: usize, total_items: usize, name: &str, bytes: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<24}  {}  {}",
            green("✓"),
            index + 1,
            total_items,
            name,
            dim(&format!("{:>8} bytes", bytes)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_skipped(&self, index: usize, total_items: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.skipped.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<24}  {}  {}",
            red("✗"),
            index + 1,
            total_items,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let skipped = self.skipped.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if skipped == 0 {
            eprintln!(
                "{} {} images processed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images processed  ({} skipped)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_items,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Resize local files and URLs to 1024x1024 JPEG, archived in all_images.zip
  imgbatch cat.jpg https://example.com/dog.png

  # Process every row of a links table (columns: name, links)
  imgbatch --table products.xlsx -o products.zip

  # Cut out the subject and place it on a background
  imgbatch --table links.csv --remove-background --background studio.png

  # Same, scaling each cut-out to a fixed area first
  imgbatch --table links.csv --remove-background --background studio.png --resize-foreground

  # Also write each image to a directory
  imgbatch --table links.csv --out-dir ./images

  # Machine-readable summary
  imgbatch --json --table links.csv > summary.json

OUTPUT:
  Each processed image is stored as "<name>.<ext>": .jpeg for plain resizes,
  .png when the background was removed or a background was composited.
  Images that cannot be fetched, decoded or segmented are skipped.

ENVIRONMENT VARIABLES:
  IMGBATCH_SEGMENTER_URL   HTTP endpoint that segments a PNG (body) into a
                           cut-out or mask; required for --remove-background
  IMGBATCH_MODEL_PATH      U2-Net .onnx model run in-process when no endpoint
                           is set (needs the `onnx` feature)
  IMGBATCH_OUTPUT          Default archive path
  IMGBATCH_CONCURRENCY     Items processed in parallel
  RUST_LOG                 Overrides the log filter
"#;

/// Normalise, cut out and composite batches of images into a zip archive.
#[derive(Parser, Debug)]
#[command(
    name = "imgbatch",
    version,
    about = "Normalise, cut out and composite batches of images into a zip archive",
    long_about = "Fetch images from URLs, local files or a links table (CSV/XLSX), resize each \
to 1024x1024, optionally remove the background and composite onto a shared backdrop, and \
package the results into one zip archive.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image files or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// CSV or XLSX table with `name` and `links` columns.
    #[arg(short, long, env = "IMGBATCH_TABLE")]
    table: Option<PathBuf>,

    /// Replace each image with its segmented cut-out (PNG).
    #[arg(short = 'r', long, env = "IMGBATCH_REMOVE_BACKGROUND")]
    remove_background: bool,

    /// Composite every result onto this background image.
    #[arg(short, long, env = "IMGBATCH_BACKGROUND")]
    background: Option<PathBuf>,

    /// Scale each foreground to 400,000 px² before compositing.
    #[arg(long, env = "IMGBATCH_RESIZE_FOREGROUND")]
    resize_foreground: bool,

    /// Archive path.
    #[arg(short, long, env = "IMGBATCH_OUTPUT", default_value = "all_images.zip")]
    output: PathBuf,

    /// Also write each image into this directory.
    #[arg(long, env = "IMGBATCH_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Segmentation endpoint (overrides IMGBATCH_SEGMENTER_URL).
    #[arg(long)]
    segmenter_url: Option<String>,

    /// Local U2-Net .onnx model (overrides IMGBATCH_MODEL_PATH; `onnx` feature).
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Number of items processed concurrently.
    #[arg(short, long, env = "IMGBATCH_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// HTTP timeout in seconds for downloads and segmentation calls.
    #[arg(long, env = "IMGBATCH_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// What to do when two results share "<name>.<ext>".
    #[arg(long, env = "IMGBATCH_DEDUPE_NAMES", value_enum, default_value = "overwrite")]
    dedupe_names: DedupeArg,

    /// Print a JSON summary (stats + skipped items) to stdout.
    #[arg(long, env = "IMGBATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMGBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMGBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMGBATCH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DedupeArg {
    /// Last item with a given name wins.
    Overwrite,
    /// Keep all, appending -1, -2, … to later names.
    Suffix,
}

impl From<DedupeArg> for DuplicateNames {
    fn from(v: DedupeArg) -> Self {
        match v {
            DedupeArg::Overwrite => DuplicateNames::Overwrite,
            DedupeArg::Suffix => DuplicateNames::Suffix,
        }
    }
}

/// `--json` payload.
#[derive(Serialize)]
struct Summary<'a> {
    archive: &'a PathBuf,
    stats: &'a BatchStats,
    skipped: &'a [SkippedItem],
    written: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    // ── Collect inputs ───────────────────────────────────────────────────
    let items = collect_items(&cli).await?;
    if items.is_empty() && cli.table.is_none() {
        anyhow::bail!("No inputs given: pass image paths/URLs or --table");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run batch ────────────────────────────────────────────────────────
    let output = process_batch(items, &config)
        .await
        .context("Batch processing failed")?;

    write_archive(&output.items, &cli.output, config.duplicate_names)
        .await
        .with_context(|| format!("Failed to write archive {}", cli.output.display()))?;

    let written = match cli.out_dir {
        Some(ref dir) => write_individual(&output.items, dir, config.duplicate_names)
            .await
            .with_context(|| format!("Failed to write images to {}", dir.display()))?,
        None => Vec::new(),
    };

    if cli.json {
        let summary = Summary {
            archive: &cli.output,
            stats: &output.stats,
            skipped: &output.skipped,
            written,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} images  {}ms  →  {}",
            if stats.skipped_items == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.processed_items,
            stats.total_items,
            stats.duration_ms,
            bold(&cli.output.display().to_string()),
        );
        if !show_progress {
            for skipped in &output.skipped {
                eprintln!("   {} {}: {}", red("✗"), skipped.name, dim(&skipped.error.to_string()));
            }
        }
    }

    Ok(())
}

/// Table rows first, then positional inputs.
async fn collect_items(cli: &Cli) -> Result<Vec<NamedItem>> {
    let mut items = Vec::new();
    if let Some(ref table) = cli.table {
        items.extend(
            load_table(table)
                .await
                .with_context(|| format!("Failed to load table {}", table.display()))?,
        );
    }
    items.extend(
        from_paths_or_urls(&cli.inputs)
            .await
            .context("Failed to read input images")?,
    );
    Ok(items)
}

/// Map CLI args to `BatchConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .remove_background(cli.remove_background)
        .resize_foreground(cli.resize_foreground)
        .concurrency(cli.concurrency)
        .duplicate_names(cli.dedupe_names.into());

    if let Some(ref path) = cli.background {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read background image {}", path.display()))?;
        builder = builder.background_image(bytes);
    }
    if let Some(ref url) = cli.segmenter_url {
        builder = builder.segmenter_url(url.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model_path(model.clone());
    }
    if let Some(secs) = cli.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
