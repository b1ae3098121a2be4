mod project;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use generator::render::output_summary;
use generator::{Configuration, DocumentError, MasterSpec, Study, StudyOptions};
use studygen::{Catalog, Template};

use crate::project::{Inputs, Overrides, ProjectFile};

#[derive(Parser)]
#[command(name = "studygen", version, about = "Generate study scripts from composable blocks")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log resolution steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate every artifact of a study
    Generate(GenerateArgs),

    /// Resolve and render every artifact without writing
    Check(CheckArgs),

    /// List the blocks of one or more catalogs
    Blocks(BlocksArgs),
}

#[derive(clap::Args)]
struct InputArgs {
    /// Project file with default inputs [default: studygen.toml, if present]
    #[arg(long)]
    project: Option<PathBuf>,

    /// Configuration document (parameter values)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master specification document
    #[arg(short, long)]
    master: Option<PathBuf>,

    /// Block catalog (Markdown). Repeatable.
    #[arg(short = 'b', long = "catalog")]
    catalogs: Vec<PathBuf>,

    /// Artifact template replacing the built-in one
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Output root directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Artifact file extension
    #[arg(long)]
    extension: Option<String>,

    /// Worker threads [default: one per core]
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(clap::Args)]
struct GenerateArgs {
    #[command(flatten)]
    inputs: InputArgs,
}

#[derive(clap::Args)]
struct CheckArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Print every rendered artifact
    #[arg(long)]
    print: bool,
}

#[derive(clap::Args)]
struct BlocksArgs {
    /// Catalog files
    #[arg(required = true)]
    catalogs: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_ansi(!cli.no_color)
                .with_writer(std::io::stderr),
        )
        .init();

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let mut reporter = Reporter::new(color_choice);

    let exit_code = match cli.command {
        Command::Generate(args) => do_study(args.inputs, true, false, &mut reporter),
        Command::Check(args) => do_study(args.inputs, false, args.print, &mut reporter),
        Command::Blocks(args) => do_blocks(&args.catalogs, &mut reporter),
    };
    process::exit(exit_code);
}

fn do_study(args: InputArgs, write: bool, print: bool, reporter: &mut Reporter) -> i32 {
    let inputs = match ProjectFile::discover(args.project.as_deref()).and_then(|project| {
        let overrides = Overrides {
            configuration: args.config,
            master: args.master,
            catalogs: args.catalogs,
            template: args.template,
            output: args.output,
            extension: args.extension,
        };
        Inputs::resolve(overrides, project)
    }) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if let Some(jobs) = args.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            warn!(error = %e, "cannot size the worker pool, using the default");
        }
    }

    let Some(catalog) = reporter.load_catalog(&inputs.catalogs) else {
        return 1;
    };
    let configuration = match Configuration::load(&inputs.configuration) {
        Ok(c) => c,
        Err(e) => {
            reporter.document_error(&e);
            return 1;
        }
    };
    let master = match MasterSpec::load(&inputs.master) {
        Ok(m) => m,
        Err(e) => {
            reporter.document_error(&e);
            return 1;
        }
    };

    let study = match Study::new(&catalog, &master, &configuration) {
        Ok(study) => study,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    let study = match &inputs.template {
        Some(path) => match load_template(path) {
            Ok(template) => study.with_template(template),
            Err(message) => {
                eprintln!("error: {}", message);
                return 1;
            }
        },
        None => study,
    };
    let study = study.with_options(StudyOptions {
        output_root: inputs.output,
        extension: inputs.extension,
        write,
    });

    let report = match study.run() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if print {
        for artifact in &report.artifacts {
            println!("# {}\n{}", artifact.path.display(), artifact.text);
        }
    }

    let total = report.artifacts.len() + report.failures.len();
    if report.is_success() {
        let verb = if write { "generated" } else { "checked" };
        eprintln!("ok: {} artifact(s) {}", total, verb);
        0
    } else {
        for failure in &report.failures {
            eprintln!(
                "error: {} in {} ({}): {}",
                failure.job.target,
                failure.job.branch.directory.display(),
                failure.job.branch.describe_values(),
                failure.error
            );
        }
        eprintln!("error: {} of {} artifact(s) failed", report.failures.len(), total);
        1
    }
}

fn do_blocks(paths: &[PathBuf], reporter: &mut Reporter) -> i32 {
    let Some(catalog) = reporter.load_catalog(paths) else {
        return 1;
    };
    for block in catalog.blocks.values() {
        let parameters: Vec<String> = block
            .parameters()
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        println!(
            "{}({}) -> {}",
            block.name,
            parameters.join(", "),
            output_summary(block.outputs())
        );
        if !block.dependencies.is_empty() {
            let deps: Vec<&str> = block.dependencies.iter().map(|s| s.as_str()).collect();
            println!("    depends: {}", deps.join(", "));
        }
    }
    0
}

fn load_template(path: &Path) -> Result<Template, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    Template::parse(&source).map_err(|e| format!("template '{}': {}", path.display(), e))
}

/// Source files seen so far and where diagnostics go.
struct Reporter {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: term::Config,
}

impl Reporter {
    fn new(color_choice: ColorChoice) -> Self {
        Reporter {
            files: SimpleFiles::new(),
            writer: StandardStream::stderr(color_choice),
            config: term::Config::default(),
        }
    }

    fn emit(&self, diagnostic: &Diagnostic<usize>) {
        let _ = term::emit_to_write_style(&mut self.writer.lock(), &self.config, &self.files, diagnostic);
    }

    /// Parse every catalog file, reporting all parse errors before giving up.
    fn load_catalog(&mut self, paths: &[PathBuf]) -> Option<Catalog> {
        let mut catalog = Catalog::new();
        let mut failed = false;

        for path in paths {
            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: cannot read '{}': {}", path.display(), e);
                    failed = true;
                    continue;
                }
            };
            let file_id = self.files.add(path.display().to_string(), source.clone());
            match studygen::parser::Parser::new(source, file_id).parse_with_warnings() {
                Ok((parsed, warnings)) => {
                    for warning in &warnings {
                        self.emit(&warning.to_diagnostic());
                    }
                    if let Err(e) = catalog.extend(parsed) {
                        eprintln!("error: {}: {}", path.display(), e);
                        failed = true;
                    }
                }
                Err(problems) => {
                    for problem in &problems {
                        self.emit(&problem.to_diagnostic());
                    }
                    failed = true;
                }
            }
        }

        (!failed).then_some(catalog)
    }

    /// YAML errors with a location are shown against the document source.
    fn document_error(&mut self, error: &DocumentError) {
        if let DocumentError::Yaml {
            path,
            message,
            location: Some(offset),
        } = error
        {
            if let Ok(source) = std::fs::read_to_string(path) {
                let end = (*offset + 1).min(source.len());
                let start = (*offset).min(end);
                let file_id = self.files.add(path.display().to_string(), source);
                let diagnostic = Diagnostic::error()
                    .with_message(message)
                    .with_labels(vec![Label::primary(file_id, start..end)]);
                self.emit(&diagnostic);
                return;
            }
        }
        eprintln!("error: {}", error);
    }
}
