use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use hyper_core::{Coordinator, GeneratorOptions, TranspileOutput, VirtualProgram, transpile_with};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const TEMPLATE_EXTENSION: &str = "hyper";

/// Compile Hyper templates into Python.
#[derive(Parser, Debug)]
#[command(name = "hyper", version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the Python program for templates
    Generate(GenerateArgs),
    /// Print the host and markup placement lists as JSON
    Placements(PlacementsArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(
        value_name = "PATH",
        required_unless_present = "stdin",
        conflicts_with = "stdin",
        help = "Template files or directories (searched for .hyper files)"
    )]
    paths: Vec<PathBuf>,

    #[arg(long, help = "Read a single template from stdin and write to stdout")]
    stdin: bool,

    #[arg(long, help = "Print the JSON payload instead of Python")]
    json: bool,

    #[arg(
        long,
        visible_alias = "injection",
        requires = "json",
        help = "Include the generated piece list in the JSON payload"
    )]
    pieces: bool,

    #[arg(long, value_name = "NAME", help = "Name of the generated function")]
    function_name: Option<String>,
}

#[derive(Args, Debug)]
struct PlacementsArgs {
    #[arg(value_name = "PATH", required_unless_present = "stdin", conflicts_with = "stdin")]
    path: Option<PathBuf>,

    #[arg(long, help = "Read the template from stdin")]
    stdin: bool,

    #[arg(long, help = "Pretty-print the JSON")]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate(args) => generate(args),
        Commands::Placements(args) => placements(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let mut options = GeneratorOptions::default();
    if let Some(name) = &args.function_name {
        options.function_name = name.clone();
    }

    if args.stdin {
        let source = read_stdin()?;
        let program = transpile_with(&source, &options)?;
        return write_stdout(&render(&program, &args)?);
    }

    let mut attempted = 0usize;
    let mut failed = 0usize;
    for path in &args.paths {
        let templates = match expand_path(path) {
            Ok(templates) => templates,
            Err(err) => {
                eprintln!("{}: {err:#}", path.display());
                attempted += 1;
                failed += 1;
                continue;
            }
        };
        for template in &templates {
            attempted += 1;
            if let Err(err) = generate_file(template, &options, &args) {
                eprintln!("{}: {err:#}", template.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {attempted} templates failed to compile");
    }
    Ok(())
}

fn generate_file(path: &Path, options: &GeneratorOptions, args: &GenerateArgs) -> Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;
    let program = transpile_with(&source, options)?;
    let rendered = render(&program, args)?;

    if args.json {
        return write_stdout(&rendered);
    }

    let output = path.with_extension("py");
    fs::write(&output, rendered)
        .with_context(|| format!("failed to write {}", output.display()))?;
    debug!(template = %path.display(), output = %output.display(), "generated");
    Ok(())
}

/// Python source, or one line of JSON with `--json`.
fn render(program: &VirtualProgram, args: &GenerateArgs) -> Result<String> {
    if args.json {
        let mut json = TranspileOutput::from_program(program, args.pieces).to_json()?;
        json.push('\n');
        Ok(json)
    } else {
        Ok(program.code.clone())
    }
}

/// Templates named by one command-line path. An explicit file must carry
/// the template extension; a directory contributes every template below
/// it, sorted for stable output, and must contain at least one.
fn expand_path(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(path).with_context(|| format!("failed to read {}", path.display()))?;
    if !meta.is_dir() {
        if !is_template(path) {
            bail!("not a .{TEMPLATE_EXTENSION} template");
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let mut found: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|file| is_template(file))
        .collect();
    if found.is_empty() {
        bail!("no .{TEMPLATE_EXTENSION} templates found");
    }
    found.sort();
    debug!(dir = %path.display(), templates = found.len(), "collected templates");
    Ok(found)
}

fn is_template(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION)
}

fn placements(args: PlacementsArgs) -> Result<()> {
    let source = match &args.path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read template {}", path.display()))?,
        None => read_stdin()?,
    };

    let placements = Coordinator::default().place(&source)?;
    let mut json = if args.pretty {
        serde_json::to_string_pretty(&placements)?
    } else {
        serde_json::to_string(&placements)?
    };
    json.push('\n');
    write_stdout(&json)
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read template from stdin")?;
    Ok(buffer)
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
