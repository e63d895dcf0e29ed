//! Hardware annotation lowering CLI.
//!
//! Provides the `hwanno` binary. `lower` runs the annotation lowering pass on
//! a design stored as JSON, and `paths` lists the absolute instance paths of
//! one module, which is handy when writing non-local targets by hand.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use bumpalo::Bump;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::Level;

use hwanno_core::path_cache::display_path;
use hwanno_core::{Annotation, Design, InstanceGraph, InstancePathCache};
use hwanno_lower::{LowerAnnotationsOptions, LowerAnnotationsPass, LowerReport};

/// Hardware annotation lowering tools.
#[derive(Parser)]
#[command(name = "hwanno", about = "Hardware annotation lowering tools")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Lower the raw annotations of a design onto its entities.
    Lower {
        /// Path to the design JSON file.
        #[arg(short, long)]
        design: PathBuf,

        /// JSON array of annotations appended to the design's raw list.
        #[arg(short, long)]
        annotations: Option<PathBuf>,

        /// JSON file with pass options.
        #[arg(long)]
        options: Option<PathBuf>,

        /// Lower unknown classes through the fallback handler.
        #[arg(long)]
        ignore_unhandled: bool,

        /// Lower annotations without a class through the fallback handler.
        #[arg(long)]
        ignore_classless: bool,

        /// Output file for the lowered design (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print every absolute instance path of a module.
    Paths {
        /// Path to the design JSON file.
        #[arg(short, long)]
        design: PathBuf,

        /// Module name.
        #[arg(short, long)]
        module: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Commands::Lower {
            design,
            annotations,
            options,
            ignore_unhandled,
            ignore_classless,
            output,
        } => run_lower(
            &design,
            annotations.as_deref(),
            options.as_deref(),
            ignore_unhandled,
            ignore_classless,
            output.as_deref(),
        ),
        Commands::Paths { design, module } => run_paths(&design, &module),
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {} '{}': {}", what, path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("failed to parse {} '{}': {}", what, path.display(), e))
}

/// Reads a design file and checks its structural invariants.
fn load_design(path: &Path) -> Result<Design, String> {
    let design: Design = read_json(path, "design")?;
    design
        .verify()
        .map_err(|e| format!("inconsistent design '{}': {}", path.display(), e))?;
    Ok(design)
}

/// Execute the lower subcommand.
///
/// Returns exit code: 0 = success, 1 = the pass recorded failures (the design
/// is still written), 3 = I/O, parse or inconsistent-design error.
fn run_lower(
    design_path: &Path,
    annotations_path: Option<&Path>,
    options_path: Option<&Path>,
    ignore_unhandled: bool,
    ignore_classless: bool,
    output: Option<&Path>,
) -> i32 {
    let mut design = match load_design(design_path) {
        Ok(design) => design,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };

    if let Some(path) = annotations_path {
        match read_json::<Vec<Annotation>>(path, "annotations") {
            Ok(annotations) => design.raw_annotations.extend(annotations),
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return 3;
            }
        }
    }

    let mut options = match options_path {
        Some(path) => match read_json::<LowerAnnotationsOptions>(path, "options") {
            Ok(options) => options,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return 3;
            }
        },
        None => LowerAnnotationsOptions::default(),
    };
    // Flags only ever widen the tolerance configured in the file.
    options.ignore_unhandled |= ignore_unhandled;
    options.ignore_classless |= ignore_classless;

    let (report, mut exit_code) = match LowerAnnotationsPass::new(options).run(&mut design) {
        Ok(report) => (report, 0),
        Err(failure) => (failure.report, 1),
    };
    print_report(&report);

    let json = match serde_json::to_string_pretty(&design) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize design: {}", e);
            return 3;
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                exit_code = 3;
            }
        }
        None => println!("{}", json),
    }
    exit_code
}

fn print_report(report: &LowerReport) {
    match serde_json::to_string_pretty(&report.statistics) {
        Ok(stats) => eprintln!("{}", stats),
        Err(e) => eprintln!("Error: failed to serialize statistics: {}", e),
    }
    if !report.diagnostics.is_empty() {
        eprintln!(
            "Annotation lowering failed with {} error(s):",
            report.diagnostics.len()
        );
        for diagnostic in &report.diagnostics {
            eprintln!("{}", diagnostic);
        }
    }
}

/// Execute the paths subcommand.
///
/// Returns exit code: 0 = success, 1 = unknown module or cyclic design,
/// 3 = I/O, parse or inconsistent-design error.
fn run_paths(design_path: &Path, module_name: &str) -> i32 {
    let design = match load_design(design_path) {
        Ok(design) => design,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };
    let Some(module) = design.module_by_name(module_name) else {
        eprintln!("Error: no module named '{}'", module_name);
        return 1;
    };
    let graph = match InstanceGraph::new(&design) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let arena = Bump::new();
    let mut cache = InstancePathCache::new(graph, &arena);
    let paths = match cache.absolute_paths(module) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    for &path in paths {
        match display_path(&design, path) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    0
}
