//! fillpdf CLI - PDF form template filling tool

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use fillpdf::{
    export_all, ExportJob, ExportSettings, Field, FlattenOptions, FlattenPool, Flattener,
    FontSet, GhostscriptFlattener, NoopFlattener, Order, Saved, Template,
};

#[derive(Parser)]
#[command(name = "fillpdf")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Fill PDF form templates, flatten them and save the result", long_about = None)]
struct Cli {
    #[command(flatten)]
    flatten: FlattenArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FlattenArgs {
    /// Ghostscript executable
    #[arg(long, global = true, env = "FILLPDF_GS", default_value = "gs")]
    gs: PathBuf,

    /// Flatten timeout in seconds
    #[arg(long, global = true, env = "FILLPDF_FLATTEN_TIMEOUT", default_value = "60")]
    timeout: u64,

    /// Maximum concurrent Ghostscript processes
    #[arg(long, global = true, env = "FILLPDF_FLATTEN_WORKERS", default_value = "2")]
    workers: usize,

    /// Save filled documents without flattening
    #[arg(long, global = true)]
    no_flatten: bool,
}

#[derive(Args)]
struct FontArgs {
    /// Regular TrueType font for text appearances
    #[arg(long, value_name = "TTF", requires = "font_bold")]
    font_regular: Option<PathBuf>,

    /// Bold TrueType font for text appearances
    #[arg(long, value_name = "TTF", requires = "font_regular")]
    font_bold: Option<PathBuf>,
}

impl FontArgs {
    fn font_set(&self) -> Option<FontSet> {
        match (&self.font_regular, &self.font_bold) {
            (Some(regular), Some(bold)) => Some(FontSet::new(regular, bold)),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fill a template from command line values
    Fill {
        /// Form template
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// JSON file with an array of fields
        #[arg(long, value_name = "FILE")]
        fields: Option<PathBuf>,

        /// Text value (repeatable)
        #[arg(short, long, value_name = "NAME=VALUE")]
        field: Vec<String>,

        /// Text value in the bold font (repeatable)
        #[arg(long, value_name = "NAME=VALUE")]
        bold: Vec<String>,

        /// Checkbox state (repeatable)
        #[arg(long, value_name = "NAME=true|false")]
        checkbox: Vec<String>,

        /// Image from a file path or data URI (repeatable)
        #[arg(long, value_name = "NAME=SOURCE")]
        image: Vec<String>,

        /// Field to remove (repeatable)
        #[arg(short, long, value_name = "NAME")]
        delete: Vec<String>,

        #[command(flatten)]
        fonts: FontArgs,
    },

    /// Run export jobs from JSON files (a job object or an array of jobs)
    Job {
        /// Job files
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Export an order document from JSON
    Order {
        /// Order JSON file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Form template
        #[arg(short, long, value_name = "TEMPLATE")]
        template: PathBuf,

        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Offset from UTC for dates, in minutes
        #[arg(long, default_value = "-180", allow_hyphen_values = true)]
        utc_offset: i32,

        #[command(flatten)]
        fonts: FontArgs,
    },

    /// List the fields of a template
    Fields {
        /// Form template
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Flatten a PDF with Ghostscript
    Flatten {
        /// Input PDF
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output PDF
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fill {
            template,
            output,
            fields,
            field,
            bold,
            checkbox,
            image,
            delete,
            fonts,
        } => read_fields(fields.as_deref())
            .and_then(|mut all| {
                all.extend(parse_fill_fields(&field, &bold, &checkbox, &image)?);
                Ok(all)
            })
            .and_then(|fields| {
                cmd_fill(&cli.flatten, &template, &output, fields, delete, fonts.font_set())
            }),
        Commands::Job { files } => cmd_job(&cli.flatten, &files),
        Commands::Order {
            input,
            template,
            output,
            utc_offset,
            fonts,
        } => {
            let mut settings = ExportSettings::new(template, output).with_utc_offset(utc_offset);
            settings.font = fonts.font_set();
            cmd_order(&cli.flatten, &input, &settings)
        }
        Commands::Fields { template, json } => cmd_fields(&template, json),
        Commands::Flatten { input, output } => cmd_flatten(&cli.flatten, &input, &output),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn flattener(args: &FlattenArgs) -> CliResult<Arc<dyn Flattener>> {
    if args.no_flatten {
        return Ok(Arc::new(NoopFlattener));
    }
    let options = FlattenOptions::new()
        .with_binary(&args.gs)
        .with_timeout(Duration::from_secs(args.timeout.max(1)))
        .with_max_concurrent(args.workers);
    let gs: Arc<dyn Flattener> = Arc::new(GhostscriptFlattener::from_options(&options));
    Ok(Arc::new(FlattenPool::new(gs, &options)?))
}

fn split_assignment(raw: &str) -> CliResult<(&str, &str)> {
    raw.split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{}'", raw).into())
}

fn parse_fill_fields(
    text: &[String],
    bold: &[String],
    checkbox: &[String],
    image: &[String],
) -> CliResult<Vec<Field>> {
    let mut fields = Vec::new();
    for raw in text {
        let (name, value) = split_assignment(raw)?;
        fields.push(Field::text(name, value));
    }
    for raw in bold {
        let (name, value) = split_assignment(raw)?;
        fields.push(Field::text(name, value).with_bold(true));
    }
    for raw in checkbox {
        let (name, value) = split_assignment(raw)?;
        fields.push(Field::checkbox(name, !value.trim().eq_ignore_ascii_case("false")));
    }
    for raw in image {
        let (name, value) = split_assignment(raw)?;
        fields.push(Field::image(name, value));
    }
    Ok(fields)
}

fn read_fields(path: Option<&Path>) -> CliResult<Vec<Field>> {
    match path {
        Some(path) => {
            let data = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&data)?)
        }
        None => Ok(Vec::new()),
    }
}

fn cmd_fill(
    flatten: &FlattenArgs,
    template: &Path,
    output: &Path,
    fields: Vec<Field>,
    delete: Vec<String>,
    font: Option<FontSet>,
) -> CliResult<()> {
    let filename = output
        .file_name()
        .ok_or_else(|| format!("Output '{}' has no file name", output.display()))?
        .to_string_lossy()
        .into_owned();
    let output_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let job = ExportJob::new(template, output_dir, filename, fields)?
        .with_font(font)
        .with_fields_to_delete(delete);
    let saved = job.run(flattener(flatten)?.as_ref())?;
    print_saved(&saved);
    Ok(())
}

fn read_jobs(path: &Path) -> CliResult<Vec<ExportJob>> {
    let data = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&data)?;
    let jobs = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(jobs)
}

fn cmd_job(flatten: &FlattenArgs, files: &[PathBuf]) -> CliResult<()> {
    let mut jobs = Vec::new();
    for file in files {
        jobs.extend(
            read_jobs(file).map_err(|e| format!("{}: {}", file.display(), e))?,
        );
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Exporting {} documents...", jobs.len()));

    let results = export_all(&jobs, flattener(flatten)?.as_ref());
    pb.finish_and_clear();

    let mut failed = 0;
    for (job, result) in jobs.iter().zip(&results) {
        match result {
            Ok(saved) => print_saved(saved),
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", "Failed".red(), job.filename(), e);
            }
        }
    }

    println!(
        "\n{} {} exported, {} failed",
        "Done!".green().bold(),
        results.len() - failed,
        failed
    );
    if failed > 0 {
        return Err(format!("{} of {} jobs failed", failed, results.len()).into());
    }
    Ok(())
}

fn cmd_order(flatten: &FlattenArgs, input: &Path, settings: &ExportSettings) -> CliResult<()> {
    let data = fs::read_to_string(input)?;
    let order: Order = serde_json::from_str(&data)?;
    let path = order.export_pdf(settings, flattener(flatten)?.as_ref())?;
    println!("{} {}", "Saved to".green(), path.display());
    Ok(())
}

fn cmd_fields(template: &Path, json: bool) -> CliResult<()> {
    let template = Template::load(template)?;
    let fields = template.fields()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
        return Ok(());
    }

    println!("{}", "Form Fields".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for field in &fields {
        let value = field.value.as_deref().unwrap_or("");
        println!(
            "{} {} {}",
            field.name.bold(),
            format!("[{}]", field.field_type).dimmed(),
            value
        );
    }
    println!("\n{} fields", fields.len());
    Ok(())
}

fn cmd_flatten(flatten: &FlattenArgs, input: &Path, output: &Path) -> CliResult<()> {
    let flattener = flattener(flatten)?;
    if !fillpdf::flatten_file(flattener.as_ref(), input, output) {
        return Err(format!("Could not flatten {}", input.display()).into());
    }
    println!("{} {}", "Saved to".green(), output.display());
    Ok(())
}

fn print_saved(saved: &Saved) {
    let state = if saved.flattened {
        "flattened".green()
    } else {
        "not flattened".yellow()
    };
    println!("{} {} ({})", "Saved to".green(), saved.path.display(), state);
    for warning in &saved.report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn cmd_version() {
    println!("{} {}", "fillpdf".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("PDF form template filling tool");
    println!();
    println!("License: MIT");
}
