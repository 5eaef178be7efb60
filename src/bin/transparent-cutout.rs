use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use transparent_cutout::sharpen::{DEFAULT_SIGMA, DEFAULT_STRENGTH};
use transparent_cutout::{
    BatchEvent, BorderKeySegmenter, CommandSegmenter, CutoutEngine, ProcessOptions, SegmentError,
    Segmenter, SharpenOptions,
};

#[derive(Parser)]
#[command(
    name = "transparent-cutout",
    about = "Batch-remove image backgrounds and sharpen the subject",
    version,
    after_help = "Every jpg/jpeg/png/webp/bmp/tiff file in the input folder becomes\n\
                  <name>_transparent.png in the output folder.\n\n\
                  Without --command a simple corner-color key is used for segmentation;\n\
                  point --command at a real model for photos with busy backgrounds, e.g.\n\
                  --command rembg --arg i --arg - --arg -"
)]
struct Cli {
    /// Input folder containing images (created if missing)
    #[arg(short, long, default_value = "input")]
    input: PathBuf,

    /// Output folder for transparent PNGs
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Center the detected object in the output frame
    #[arg(long)]
    center: bool,

    /// Unsharp-mask strength (weight of the original image)
    #[arg(long, default_value_t = DEFAULT_STRENGTH)]
    strength: f32,

    /// Gaussian blur sigma for the unsharp mask, in pixels
    #[arg(long, default_value_t = DEFAULT_SIGMA)]
    sigma: f32,

    /// External segmentation program: image on stdin, RGBA PNG on stdout
    #[arg(long, value_name = "PROGRAM")]
    command: Option<String>,

    /// Argument passed to --command (repeatable)
    #[arg(
        long = "arg",
        value_name = "ARG",
        requires = "command",
        allow_hyphen_values = true
    )]
    command_args: Vec<String>,

    /// Background tolerance of the built-in corner-color key (0-255)
    #[arg(long, default_value_t = 24)]
    tolerance: u8,

    /// Enable debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all non-warning output
    #[arg(short, long)]
    quiet: bool,
}

enum Backend {
    Command(CommandSegmenter),
    BorderKey(BorderKeySegmenter),
}

impl Segmenter for Backend {
    fn segment(&self, encoded: &[u8]) -> Result<Vec<u8>, SegmentError> {
        match self {
            Self::Command(s) => s.segment(encoded),
            Self::BorderKey(s) => s.segment(encoded),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let bar = if cli.quiet || cli.verbose {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };
    init_tracing(cli.verbose, cli.quiet, &bar);

    let backend = match &cli.command {
        Some(program) => Backend::Command(CommandSegmenter::new(program).args(&cli.command_args)),
        None => Backend::BorderKey(BorderKeySegmenter {
            tolerance: cli.tolerance,
        }),
    };

    let opts = ProcessOptions {
        center: cli.center,
        sharpen: SharpenOptions {
            strength: cli.strength,
            sigma: cli.sigma,
        },
    };

    let engine = match CutoutEngine::new(backend, opts) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let summary = engine.process_directory(&cli.input, &cli.output, |event| match event {
        BatchEvent::Started { total } => {
            bar.set_length(total as u64);
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        BatchEvent::Finished { result, .. } => {
            bar.set_message(result.file_name());
            bar.inc(1);
        }
    });
    bar.finish_and_clear();

    if let Err(e) = summary {
        tracing::error!("cannot scan {}: {e}", cli.input.display());
        process::exit(1);
    }
}

/// Writes log lines to stderr with the progress bar cleared, so they never
/// interleave with its redraws.
struct BarWriter(ProgressBar);

impl Write for BarWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn init_tracing(verbose: bool, quiet: bool, bar: &ProgressBar) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer({
            let bar = bar.clone();
            move || BarWriter(bar.clone())
        })
        .with_target(false)
        .compact()
        .init();
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"));
    bar.set_style(style);
    bar
}
