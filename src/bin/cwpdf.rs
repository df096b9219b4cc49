//! CLI binary for coursework-pdf.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! onto `PortalConfig`, keeps assignments, students and submissions in a
//! JSON store, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use coursework_pdf::{
    ArchiveProgress, ArchiveProgressCallback, Converter, JsonFileStore, OfficeCapability,
    PortalConfig, StaticCapabilities, StudentId, Submission, SubmissionCoordinator, SubmissionId,
    SubmissionStore, SystemCapabilities, Upload,
};
use coursework_pdf::{AssignmentId, Capabilities, CapabilityProvider, OfficeTool};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn bar_style(unit: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  ⏱ {{elapsed_precise}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

// ── Archive progress using indicatif ─────────────────────────────────────────

struct CliArchiveProgress {
    bar: ProgressBar,
}

impl CliArchiveProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style("files"));
        bar.set_prefix("Archiving");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ArchiveProgressCallback for CliArchiveProgress {
    fn on_archive_start(&self, total_entries: usize) {
        self.bar.set_length(total_entries as u64);
    }

    fn on_entry_added(&self, name: &str, _index: usize, _total: usize) {
        self.bar.println(format!("  {} {}", green("✓"), name));
        self.bar.inc(1);
    }

    fn on_entry_skipped(&self, name: &str, reason: &str) {
        self.bar
            .println(format!("  {} {}  {}", red("✗"), name, dim(reason)));
        self.bar.inc(1);
    }

    fn on_archive_complete(&self, _added: usize, _skipped: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert files to PDF (written to the PDF folder)
  cwpdf convert essay.docx scan.png notes.txt

  # Set up an assignment and a student, then submit
  cwpdf assignment add "Lab Report 1" --end 2025-05-01T23:59:00Z
  cwpdf student add "Ada Lovelace" --reg R42
  cwpdf submit --assignment 1 --student 1 report.docx

  # Review, grade, and download everything
  cwpdf list --assignment 1
  cwpdf grade 3 85 --remark "Clear method section"
  cwpdf archive 1

ENVIRONMENT VARIABLES:
  UPLOAD_FOLDER           Directory for original uploads (default: uploads)
  PDF_FOLDER              Directory for canonical PDFs (default: uploads/pdf)
  CWPDF_STORE             JSON store file (default: uploads/portal.json)
  OFFICE_CONVERTER_PATH   Explicit path to soffice; skips the search
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Normalise coursework uploads into canonical PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "cwpdf",
    version,
    about = "Normalise coursework uploads (Office, images, text, PDF) into canonical PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    portal: PortalArgs,

    /// Emit JSON instead of human-readable text.
    #[arg(long, global = true, env = "CWPDF_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CWPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CWPDF_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PortalArgs {
    /// Directory for original uploads.
    #[arg(long, global = true, env = "UPLOAD_FOLDER", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for canonical PDFs and archives.
    #[arg(long, global = true, env = "PDF_FOLDER", default_value = "uploads/pdf")]
    pdf_dir: PathBuf,

    /// JSON file holding assignments, students and submissions.
    #[arg(long, global = true, env = "CWPDF_STORE", default_value = "uploads/portal.json")]
    store: PathBuf,

    /// Seconds before an office conversion is killed.
    #[arg(long, global = true, env = "CWPDF_OFFICE_TIMEOUT", default_value_t = 120)]
    office_timeout: u64,

    /// Conversions allowed to run at once.
    #[arg(long, global = true, env = "CWPDF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Resolution assumed for image uploads (36–600).
    #[arg(long, global = true, env = "CWPDF_IMAGE_DPI", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    image_dpi: u32,

    /// Skip the file-signature check.
    #[arg(long, global = true, env = "CWPDF_NO_VERIFY")]
    no_verify: bool,

    /// Restrict accepted extensions (comma separated), e.g. "pdf,txt,png".
    #[arg(long, global = true, env = "CWPDF_ALLOWED", value_delimiter = ',')]
    allowed: Option<Vec<String>>,

    /// Office converter program; overrides the automatic search.
    #[arg(long, global = true, env = "CWPDF_OFFICE_PROGRAM")]
    office_program: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert files to PDF without recording a submission.
    Convert {
        /// Files to convert.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (default: the PDF folder).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Report which office conversions this host supports.
    Capabilities,

    /// Manage assignments.
    #[command(subcommand)]
    Assignment(AssignmentCommand),

    /// Manage students.
    #[command(subcommand)]
    Student(StudentCommand),

    /// Submit a file for an assignment on behalf of a student.
    Submit {
        #[arg(long)]
        assignment: u64,

        #[arg(long)]
        student: u64,

        /// File to submit.
        file: PathBuf,

        /// Filename to declare instead of the file's own name.
        #[arg(long)]
        name: Option<String>,
    },

    /// List submissions, newest first.
    #[command(group(clap::ArgGroup::new("owner").required(true).args(["assignment", "student"])))]
    List {
        #[arg(long)]
        assignment: Option<u64>,

        #[arg(long)]
        student: Option<u64>,
    },

    /// Grade a submission.
    Grade {
        submission: u64,
        marks: u32,

        #[arg(long)]
        remark: Option<String>,
    },

    /// Zip every canonical PDF of an assignment.
    Archive { assignment: u64 },
}

#[derive(Subcommand, Debug)]
enum AssignmentCommand {
    /// Create an assignment.
    Add {
        title: String,

        #[arg(long)]
        subject: Option<String>,

        /// Opening instant (RFC 3339), e.g. 2025-04-01T09:00:00Z.
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Deadline (RFC 3339). Later submissions are marked late.
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// List assignments.
    List,
}

#[derive(Subcommand, Debug)]
enum StudentCommand {
    /// Register a student.
    Add {
        name: String,

        /// Registration number used in PDF names.
        #[arg(long)]
        reg: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
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

    let config = build_config(&cli.portal)?;
    let capabilities = build_capabilities(&cli.portal);

    match &cli.command {
        Command::Convert { inputs, output_dir } => {
            let out_dir = output_dir.clone().unwrap_or_else(|| config.pdf_dir.clone());
            let converter = Converter::new(config, capabilities);
            run_convert(&cli, &converter, inputs, &out_dir).await
        }
        Command::Capabilities => run_capabilities(&cli, capabilities.as_ref()),
        Command::Assignment(cmd) => {
            let store = open_store(&cli.portal.store)?;
            run_assignment(&cli, &store, cmd)
        }
        Command::Student(StudentCommand::Add { name, reg }) => {
            let store = open_store(&cli.portal.store)?;
            let student = store
                .add_student(name.clone(), reg.clone())
                .context("Failed to save student")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&student)?);
            } else if !cli.quiet {
                println!("{} student {}  {}", green("✔"), student.id, bold(&student.name));
            }
            Ok(())
        }
        Command::Submit {
            assignment,
            student,
            file,
            name,
        } => {
            let store = Arc::new(open_store(&cli.portal.store)?);
            let assignment = store
                .assignment(AssignmentId(*assignment))?
                .with_context(|| format!("No assignment with id {assignment}"))?;
            let student = store
                .student(StudentId(*student))?
                .with_context(|| format!("No student with id {student}"))?;

            let mut upload = Upload::from_path(file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            if let Some(n) = name {
                upload.declared_name = Some(n.clone());
            }

            let coordinator =
                SubmissionCoordinator::new(Converter::new(config, capabilities), store);
            let sub = coordinator
                .submit(&assignment, &student, upload)
                .await
                .context("Submission failed")?;
            print_submission(&cli, &sub)
        }
        Command::List {
            assignment,
            student,
        } => {
            let store = open_store(&cli.portal.store)?;
            let subs = match (assignment, student) {
                (Some(a), _) => store.list_for_assignment(AssignmentId(*a))?,
                (None, Some(s)) => store.list_for_student(StudentId(*s))?,
                (None, None) => Vec::new(),
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&subs)?);
            } else {
                for s in &subs {
                    println!(
                        "{:>4}  {:<40}  {:<8}  {:<9}  {}  {}",
                        s.id,
                        s.canonical_pdf_name,
                        s.timeliness.to_string(),
                        s.grading.to_string(),
                        s.submitted_at.format("%Y-%m-%d %H:%M:%S"),
                        s.marks.map(|m| m.to_string()).unwrap_or_else(|| dim("-"))
                    );
                }
                if subs.is_empty() && !cli.quiet {
                    eprintln!("{}", dim("no submissions"));
                }
            }
            Ok(())
        }
        Command::Grade {
            submission,
            marks,
            remark,
        } => {
            let store = Arc::new(open_store(&cli.portal.store)?);
            let coordinator =
                SubmissionCoordinator::new(Converter::new(config, capabilities), store);
            let sub = coordinator
                .grade(SubmissionId(*submission), *marks, remark.clone())
                .context("Grading failed")?;
            print_submission(&cli, &sub)
        }
        Command::Archive { assignment } => {
            let store = Arc::new(open_store(&cli.portal.store)?);
            let coordinator =
                SubmissionCoordinator::new(Converter::new(config, capabilities), store);
            let show_progress = !cli.quiet && !cli.json;
            let progress: Option<ArchiveProgress> = if show_progress {
                Some(CliArchiveProgress::new() as ArchiveProgress)
            } else {
                None
            };
            let report = coordinator
                .archive(AssignmentId(*assignment), progress)
                .await
                .context("Archive failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !cli.quiet {
                eprintln!(
                    "{} {} entries, {} omitted  →  {}",
                    green("✔"),
                    report.entries.len(),
                    report.omitted.len(),
                    bold(&report.path.display().to_string())
                );
            }
            Ok(())
        }
    }
}

/// Map CLI args to `PortalConfig`.
fn build_config(args: &PortalArgs) -> Result<PortalConfig> {
    let mut builder = PortalConfig::builder()
        .upload_dir(&args.upload_dir)
        .pdf_dir(&args.pdf_dir)
        .office_timeout_secs(args.office_timeout)
        .max_concurrent_conversions(args.concurrency)
        .image_dpi(args.image_dpi)
        .verify_content(!args.no_verify);
    if let Some(ref allowed) = args.allowed {
        builder = builder.allowed_extensions(allowed);
    }
    builder.build().context("Invalid configuration")
}

fn build_capabilities(args: &PortalArgs) -> Capabilities {
    match args.office_program {
        Some(ref program) => Arc::new(StaticCapabilities::all(OfficeTool::new(program))),
        None => Arc::new(SystemCapabilities),
    }
}

fn open_store(path: &Path) -> Result<JsonFileStore> {
    JsonFileStore::open(path).with_context(|| format!("Failed to open store {}", path.display()))
}

async fn run_convert(cli: &Cli, converter: &Converter, inputs: &[PathBuf], out_dir: &Path) -> Result<()> {
    let show_progress = !cli.quiet && !cli.json && inputs.len() > 1;
    let bar = if show_progress {
        let bar = ProgressBar::new(inputs.len() as u64);
        bar.set_style(bar_style("files"));
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let limit = converter.config().max_concurrent_conversions;
    let results: Vec<_> = stream::iter(inputs.iter())
        .map(|input| {
            let bar = bar.clone();
            async move {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "output".into());
                let dest = out_dir.join(format!("{stem}.pdf"));
                let result = converter.convert_with_report(input, &dest).await;
                if let Some(bar) = &bar {
                    match &result {
                        Ok(r) => bar.println(format!(
                            "  {} {}  {}",
                            green("✓"),
                            input.display(),
                            dim(&format!("{} · {}ms", r.strategy, r.duration_ms))
                        )),
                        Err(e) => bar.println(format!("  {} {}  {}", red("✗"), input.display(), red(&e.to_string()))),
                    }
                    bar.inc(1);
                }
                (input, result)
            }
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut failed = 0;
    let mut json_rows = Vec::new();
    for (input, result) in &results {
        match result {
            Ok(report) => {
                if cli.json {
                    json_rows.push(serde_json::json!({
                        "input": input,
                        "ok": true,
                        "report": report,
                    }));
                } else if !cli.quiet && !show_progress {
                    eprintln!(
                        "{} {}  →  {}",
                        green("✔"),
                        input.display(),
                        bold(&report.destination.display().to_string())
                    );
                }
            }
            Err(e) => {
                failed += 1;
                if cli.json {
                    json_rows.push(serde_json::json!({
                        "input": input,
                        "ok": false,
                        "phase": e.phase(),
                        "error": e.to_string(),
                    }));
                } else if !show_progress {
                    eprintln!("{} {}: {}", red("✘"), input.display(), e);
                }
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&json_rows)?);
    } else if show_progress {
        eprintln!(
            "{} {}/{} files converted  →  {}",
            if failed == 0 { green("✔") } else { red("✘") },
            results.len() - failed,
            results.len(),
            bold(&out_dir.display().to_string())
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversions failed", results.len());
    }
    Ok(())
}

fn run_capabilities(cli: &Cli, caps: &dyn CapabilityProvider) -> Result<()> {
    let rows: Vec<_> = OfficeCapability::ALL
        .iter()
        .map(|&c| (c, caps.locate(c)))
        .collect();

    if cli.json {
        let json: Vec<_> = rows
            .iter()
            .map(|(c, r)| match r {
                Ok(tool) => serde_json::json!({ "capability": c, "available": true, "program": tool.program }),
                Err(e) => serde_json::json!({ "capability": c, "available": false, "hint": e.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    for (c, r) in rows {
        match r {
            Ok(tool) => println!("{} {:<26} {}", green("✓"), c.to_string(), tool.program.display()),
            Err(e) => println!("{} {:<26} {}", red("✗"), c.to_string(), dim(&e.to_string())),
        }
    }
    Ok(())
}

fn run_assignment(cli: &Cli, store: &JsonFileStore, cmd: &AssignmentCommand) -> Result<()> {
    match cmd {
        AssignmentCommand::Add {
            title,
            subject,
            start,
            end,
        } => {
            if let (Some(s), Some(e)) = (start, end) {
                if e < s {
                    anyhow::bail!("--end ({e}) is before --start ({s})");
                }
            }
            let a = store
                .add_assignment(title.clone(), subject.clone(), *start, *end)
                .context("Failed to save assignment")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&a)?);
            } else if !cli.quiet {
                println!("{} assignment {}  {}", green("✔"), a.id, bold(&a.title));
            }
        }
        AssignmentCommand::List => {
            let all = store.assignments()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                for a in all {
                    let due = a
                        .end
                        .map(|e| e.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "no deadline".into());
                    println!("{:>4}  {:<40}  {}", a.id, a.title, dim(&due));
                }
            }
        }
    }
    Ok(())
}

fn print_submission(cli: &Cli, sub: &Submission) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(sub)?);
    } else if !cli.quiet {
        let marks = sub
            .marks
            .map(|m| format!("  marks {m}"))
            .unwrap_or_default();
        println!(
            "{} submission {}  {}  {} / {}{}",
            green("✔"),
            sub.id,
            bold(&sub.canonical_pdf_name),
            sub.timeliness,
            sub.grading,
            marks
        );
    }
    Ok(())
}
