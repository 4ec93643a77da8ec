//! tbdgen - Derive text-based stub (.tbd) files from Mach-O libraries.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tbdgen::{
    map_file, write_tbd, write_tbd_to_path, ConflictPolicy, CreateInfo, IgnoreConflicts, ParseOptions,
    ParseSession, RejectConflicts, TbdVersion, WriteOptions,
};

/// Derive text-based stub (.tbd) files from Mach-O libraries.
#[derive(Parser, Debug)]
#[command(name = "tbdgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mach-O files to read (thin or universal)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path (file for a single input, directory for several).
    /// A single input without --output is written to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the input's directory structure under the output directory
    #[arg(long)]
    preserve_paths: bool,

    /// Stub dialect to write (v1, v2, v3 or v4)
    #[arg(short = 'V', long = "tbd-version", default_value = "v2")]
    tbd_version: TbdVersion,

    /// Keep the first value when architectures disagree instead of failing
    #[arg(long)]
    ignore_conflicts: bool,

    /// Stop the remaining inputs after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "1")]
    verbosity: u8,

    /// Number of parallel jobs (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    #[command(flatten)]
    parse: ParseFlags,

    #[command(flatten)]
    write: WriteFlags,
}

#[derive(Args, Debug)]
struct ParseFlags {
    /// Accept architectures without a UUID
    #[arg(long)]
    ignore_missing_uuids: bool,

    /// Accept architectures without a platform load command
    #[arg(long)]
    ignore_missing_platform: bool,

    /// Do not collect exported symbols
    #[arg(long)]
    ignore_exports: bool,

    /// Do not collect undefined symbols
    #[arg(long)]
    ignore_undefineds: bool,

    /// Do not record the objc-constraint
    #[arg(long)]
    ignore_objc_constraint: bool,

    /// Do not record the swift version
    #[arg(long)]
    ignore_swift_version: bool,

    /// List every symbol under every architecture
    #[arg(long)]
    ignore_targets: bool,

    /// Include private (non-external) symbols of every kind
    #[arg(long)]
    allow_private_symbols: bool,

    /// Include private Objective-C classes
    #[arg(long)]
    allow_private_objc_classes: bool,

    /// Include private Objective-C exception types
    #[arg(long)]
    allow_private_objc_ehtypes: bool,

    /// Include private Objective-C instance variables
    #[arg(long)]
    allow_private_objc_ivars: bool,

    /// Fail on libraries that export nothing
    #[arg(long)]
    enforce_has_exports: bool,

    /// Read the symbol table even when an export trie is present
    #[arg(long)]
    use_symbol_table: bool,

    /// Accept bundles and other images without a dylib identification
    #[arg(long)]
    allow_non_dylib: bool,
}

impl ParseFlags {
    fn to_options(&self) -> ParseOptions {
        let table = [
            (self.ignore_missing_uuids, ParseOptions::IGNORE_MISSING_UUIDS),
            (self.ignore_missing_platform, ParseOptions::IGNORE_MISSING_PLATFORM),
            (self.ignore_exports, ParseOptions::IGNORE_EXPORTS),
            (self.ignore_undefineds, ParseOptions::IGNORE_UNDEFINEDS),
            (self.ignore_objc_constraint, ParseOptions::IGNORE_OBJC_CONSTRAINT),
            (self.ignore_swift_version, ParseOptions::IGNORE_SWIFT_VERSION),
            (self.ignore_targets, ParseOptions::IGNORE_TARGETS),
            (self.allow_private_symbols, ParseOptions::ALLOW_ALL_PRIVATE_SYMBOLS),
            (self.allow_private_objc_classes, ParseOptions::ALLOW_PRIVATE_OBJC_CLASS_SYMBOLS),
            (self.allow_private_objc_ehtypes, ParseOptions::ALLOW_PRIVATE_OBJC_EHTYPE_SYMBOLS),
            (self.allow_private_objc_ivars, ParseOptions::ALLOW_PRIVATE_OBJC_IVAR_SYMBOLS),
            (self.enforce_has_exports, ParseOptions::ENFORCE_HAS_EXPORTS),
            (self.use_symbol_table, ParseOptions::USE_SYMBOL_TABLE),
            (self.allow_non_dylib, ParseOptions::ALLOW_NON_DYLIB),
        ];

        table
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(ParseOptions::empty(), |acc, (_, flag)| acc | flag)
    }
}

#[derive(Args, Debug)]
struct WriteFlags {
    /// List architectures in architecture-table order
    #[arg(long)]
    order_by_arch_table: bool,

    /// Omit uuids
    #[arg(long)]
    no_uuids: bool,

    /// Omit flags
    #[arg(long)]
    no_flags: bool,

    /// Omit the current version
    #[arg(long)]
    no_current_version: bool,

    /// Omit the compatibility version
    #[arg(long)]
    no_compatibility_version: bool,

    /// Omit the undefineds section
    #[arg(long)]
    no_undefineds: bool,

    /// Omit the parent umbrella
    #[arg(long)]
    no_parent_umbrella: bool,

    /// Omit allowable clients
    #[arg(long)]
    no_clients: bool,

    /// Omit re-exported libraries
    #[arg(long)]
    no_reexports: bool,

    /// Omit the `...` end-of-document marker
    #[arg(long)]
    no_footer: bool,
}

impl WriteFlags {
    fn to_options(&self) -> WriteOptions {
        let table = [
            (self.order_by_arch_table, WriteOptions::ORDER_BY_ARCHITECTURE_TABLE),
            (self.no_uuids, WriteOptions::IGNORE_UUIDS),
            (self.no_flags, WriteOptions::IGNORE_FLAGS),
            (self.no_current_version, WriteOptions::IGNORE_CURRENT_VERSION),
            (self.no_compatibility_version, WriteOptions::IGNORE_COMPATIBILITY_VERSION),
            (self.no_undefineds, WriteOptions::IGNORE_UNDEFINEDS),
            (self.no_parent_umbrella, WriteOptions::IGNORE_PARENT_UMBRELLA),
            (self.no_clients, WriteOptions::IGNORE_CLIENTS),
            (self.no_reexports, WriteOptions::IGNORE_REEXPORTS),
            (self.no_footer, WriteOptions::IGNORE_FOOTER),
        ];

        table
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(WriteOptions::empty(), |acc, (_, flag)| acc | flag)
    }
}

/// Settings shared by every input of one run.
struct Job<'a> {
    parse_options: ParseOptions,
    write_options: WriteOptions,
    version: TbdVersion,
    ignore_conflicts: bool,
    cancel: Option<&'a AtomicBool>,
}

impl Job<'_> {
    fn parse(&self, path: &Path) -> Result<CreateInfo> {
        let data = map_file(path).with_context(|| format!("Failed to open: {}", path.display()))?;

        let mut reject = RejectConflicts;
        let mut ignore = IgnoreConflicts;
        let policy: &mut dyn ConflictPolicy = if self.ignore_conflicts {
            &mut ignore
        } else {
            &mut reject
        };

        let info = ParseSession::new(policy)
            .with_options(self.parse_options)
            .with_version(self.version)
            .with_cancel(self.cancel)
            .parse(&data)
            .with_context(|| format!("Failed to parse: {}", path.display()))?;

        Ok(info)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);
    cmd_generate(cli)
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Converts an input path to a relative `.tbd` output path.
fn input_to_output_path(input: &Path, preserve_paths: bool) -> PathBuf {
    let relative = if preserve_paths {
        input
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect::<PathBuf>()
    } else {
        input.file_name().map(PathBuf::from).unwrap_or_default()
    };

    let mut name = relative.into_os_string();
    name.push(".tbd");
    PathBuf::from(name)
}

fn cmd_generate(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let cancel = AtomicBool::new(false);

    let job = Job {
        parse_options: cli.parse.to_options(),
        write_options: cli.write.to_options(),
        version: cli.tbd_version,
        ignore_conflicts: cli.ignore_conflicts,
        cancel: cli.fail_fast.then_some(&cancel),
    };

    // Single input
    if cli.inputs.len() == 1 {
        let input = &cli.inputs[0];
        let info = job.parse(input)?;

        match cli.output {
            Some(ref output_path) => {
                write_tbd_to_path(&info, job.write_options, output_path)
                    .with_context(|| format!("Failed to write: {}", output_path.display()))?;
                info!(
                    "Wrote {} in {:.2}s",
                    output_path.display(),
                    start.elapsed().as_secs_f64()
                );
            }
            None => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                write_tbd(&info, job.write_options, &mut lock)
                    .context("Failed to write to stdout")?;
                lock.flush()?;
            }
        }

        return Ok(());
    }

    // Multiple inputs
    let Some(output_dir) = cli.output else {
        bail!("--output <DIR> is required when more than one input is given");
    };

    if output_dir.is_file() {
        bail!("Output path is a file: {}", output_dir.display());
    }

    info!(
        "Generating {} stubs into {}",
        cli.inputs.len(),
        output_dir.display()
    );

    // Setup progress bar
    let progress = ProgressBar::new(cli.inputs.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap()
            .progress_chars("#>-"),
    );

    // Configure thread pool
    if let Some(n) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok();
    }

    let errors: Vec<_> = cli
        .inputs
        .par_iter()
        .filter_map(|input| {
            let output_path = output_dir.join(input_to_output_path(input, cli.preserve_paths));

            let result = job.parse(input).and_then(|info| {
                write_tbd_to_path(&info, job.write_options, &output_path)
                    .with_context(|| format!("Failed to write: {}", output_path.display()))
            });

            progress.inc(1);

            match result {
                Ok(()) => None,
                Err(e) => {
                    if cli.fail_fast {
                        cancel.store(true, Ordering::Relaxed);
                    }
                    Some((input.clone(), e))
                }
            }
        })
        .collect();

    progress.finish_with_message("Done");

    let elapsed = start.elapsed();
    let success = cli.inputs.len() - errors.len();

    if !errors.is_empty() {
        warn!("{} inputs failed:", errors.len());
        for (path, err) in &errors {
            error!("  {}: {:#}", path.display(), err);
        }
    }

    info!(
        "Generated {}/{} stubs in {:.2}s",
        success,
        cli.inputs.len(),
        elapsed.as_secs_f64()
    );

    if !errors.is_empty() {
        bail!("{} of {} inputs failed", errors.len(), cli.inputs.len());
    }

    Ok(())
}
