// ============================================================================
// RGB Compositor CLI — headless channel compositing via command-line arguments
// ============================================================================
//
// Usage examples:
//   rgb-compositor -i base.png --red r.png --alpha mask.png --alpha-channel red -o out.png
//   rgb-compositor -i base.png --preset swizzle.cfg -o out.tga
//   rgb-compositor -i "frames/*.png" --green g.png --output-dir out/ --format png
//   rgb-compositor -i base.png --blue b.png --save-preset last.cfg -o out.png
//
// Each destination is loaded, the four slots are configured against its size,
// and the tiling scheduler renders it in parallel before it is encoded.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::compositor::{Compositor, SlotRole};
use crate::config::CompositorConfig;
use crate::io::{SaveFormat, encode_and_write, load_surface};
use crate::pixel::ChannelSelector;
use crate::render::{CancelToken, DEFAULT_TILE_SIZE, TileScheduler};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Build images whose red, green, blue and alpha channels are each taken from
/// a chosen channel of a separate source image.
#[derive(Parser, Debug)]
#[command(
    name = "rgb-compositor",
    version,
    about = "Compose an image's channels from up to four source images",
    long_about = "Replace the red, green, blue and/or alpha channel of each destination\n\
                  image with a selected channel of a source image. A source that is\n\
                  missing, unreadable or not exactly the destination's size is ignored\n\
                  and the destination keeps its own value for that channel.\n\n\
                  Example:\n  \
                  rgb-compositor -i base.png --alpha mask.png --alpha-channel red -o out.png"
)]
pub struct CliArgs {
    /// Destination image(s). Glob patterns accepted (e.g. "*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Source image for the red output channel.
    #[arg(long, value_name = "FILE")]
    pub red: Option<PathBuf>,

    /// Source image for the green output channel.
    #[arg(long, value_name = "FILE")]
    pub green: Option<PathBuf>,

    /// Source image for the blue output channel.
    #[arg(long, value_name = "FILE")]
    pub blue: Option<PathBuf>,

    /// Source image for the alpha output channel.
    #[arg(long, value_name = "FILE")]
    pub alpha: Option<PathBuf>,

    /// Channel sampled from the red source (blue, green, red, alpha).
    #[arg(long, value_name = "CHANNEL")]
    pub red_channel: Option<ChannelSelector>,

    /// Channel sampled from the green source.
    #[arg(long, value_name = "CHANNEL")]
    pub green_channel: Option<ChannelSelector>,

    /// Channel sampled from the blue source.
    #[arg(long, value_name = "CHANNEL")]
    pub blue_channel: Option<ChannelSelector>,

    /// Channel sampled from the alpha source.
    #[arg(long, value_name = "CHANNEL")]
    pub alpha_channel: Option<ChannelSelector>,

    /// Load slot settings from a key=value preset. Explicit flags win.
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Write the effective slot settings to a preset file.
    #[arg(long, value_name = "FILE")]
    pub save_preset: Option<PathBuf>,

    /// Start from the settings used by the previous run.
    #[arg(long)]
    pub last_used: bool,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, tiff.
    /// When omitted, inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Tile edge length used by the render scheduler.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, value_name = "PIXELS")]
    pub tile_size: u32,

    /// Render worker threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Write the session log to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Print slot status and per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Resolve the slot configuration: last-used token, then preset, then flags.
    pub fn slot_config(&self) -> Result<CompositorConfig, String> {
        let mut cfg = if self.last_used {
            CompositorConfig::last_used_path()
                .map(|p| CompositorConfig::load_last_used_from(&p))
                .unwrap_or_default()
        } else {
            CompositorConfig::default()
        };
        if let Some(preset) = &self.preset {
            cfg = CompositorConfig::load_preset(preset)?;
        }

        let overrides = [
            (SlotRole::Red, &self.red, self.red_channel),
            (SlotRole::Green, &self.green, self.green_channel),
            (SlotRole::Blue, &self.blue, self.blue_channel),
            (SlotRole::Alpha, &self.alpha, self.alpha_channel),
        ];
        for (role, path, channel) in overrides {
            let slot = cfg.slot_mut(role);
            if let Some(path) = path {
                slot.path = path.clone();
            }
            if let Some(channel) = channel {
                slot.channel = channel;
            }
        }
        Ok(cfg)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match args.slot_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &args.save_preset
        && let Err(e) = config.save_preset(path)
    {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    if let Some(path) = CompositorConfig::last_used_path()
        && let Err(e) = config.save_last_used_to(&path)
    {
        log_warn!("{}", e);
    }

    let scheduler = if args.threads == 0 {
        TileScheduler::new(args.tile_size)
    } else {
        match TileScheduler::with_threads(args.tile_size, args.threads) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;
    let mut compositor = Compositor::new();

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match run_one(
            &mut compositor,
            &scheduler,
            &config,
            input_path,
            &output_path,
            save_format,
            args.quality,
            args.verbose,
        ) {
            Ok(()) => {
                log_info!(
                    "{} → {} ({:.0}ms)",
                    input_path.display(),
                    output_path.display(),
                    file_start.elapsed().as_secs_f64() * 1000.0
                );
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    compositor.dispose();
    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn run_one(
    compositor: &mut Compositor,
    scheduler: &TileScheduler,
    config: &CompositorConfig,
    input: &Path,
    output: &Path,
    format: SaveFormat,
    quality: u8,
    verbose: bool,
) -> Result<(), String> {
    // -- Step 1: Load destination -----------------------------------------
    let mut dst = load_surface(input).map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Configure slots against its size -------------------------
    compositor.configure(config, dst.dimensions());
    if verbose {
        for role in SlotRole::ALL {
            let slot = compositor.slot(role);
            if !slot.path.as_os_str().is_empty() {
                println!(
                    "  {:<5} ← {} [{}]: {}",
                    role,
                    slot.path.display(),
                    slot.channel,
                    slot.status()
                );
            }
        }
    }

    // -- Step 3: Render --------------------------------------------------
    // Nothing interrupts a CLI pass, so the token is never set.
    scheduler.render(compositor, &mut dst, &CancelToken::new());

    // -- Step 4: Save ----------------------------------------------------
    encode_and_write(&dst, output, format, quality).map_err(|e| format!("save failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from `--format` or infer it from the output
/// extension. An unknown `--format` is an error; an unknown extension falls
/// back to PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<SaveFormat, String> {
    if let Some(f) = format_arg {
        return SaveFormat::from_name(f).ok_or_else(|| format!("unsupported output format '{}'", f));
    }
    Ok(output.and_then(SaveFormat::from_path).unwrap_or_default())
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem;
///    switches to `<stem>_composited.<ext>` if that would overwrite the input)
/// 3. Fallback: next to the input, `<stem>_composited.<ext>`
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        let candidate = dir.join(format!("{}.{}", stem, ext));
        if !is_same_file(&candidate, input) {
            return Some(candidate);
        }
        return Some(dir.join(format!("{}_composited.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_composited.{}", stem, ext)))
}

/// Whether two paths name the same file, resolving `..` and symlinks when
/// both exist.
fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
