//! CLI binary for edgequake-pdfcite.
//!
//! A thin shim over the library crate: maps CLI flags to `WorkspaceConfig`,
//! keeps documents in an on-disk store, and prints answers with their
//! citations.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use edgequake_pdfcite::pipeline::citation::to_plain_text;
use edgequake_pdfcite::pipeline::input::expand_inputs;
use edgequake_pdfcite::{
    parse_page_number, resolve_upload, Answer, DocumentStatus, DocumentStore, FsStore,
    IngestProgressCallback, PdfBackend, PdfiumBackend, ProgressCallback, ProgressState,
    RenderError, Segment, SourceDocument, Workspace, WorkspaceConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one page bar, re-used for each file of the
/// batch, plus a log line per settled file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Page total the bar is currently sized for.
    sized_for: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            sized_for: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once the page count is known.
    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Ingesting {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, file_index: usize, total_files: usize, name: &str) {
        self.sized_for.store(0, Ordering::SeqCst);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("File {file_index}/{total_files}"));
        self.bar.set_message(name.to_string());
    }

    fn on_page_extracted(&self, _name: &str, progress: ProgressState) {
        if self.sized_for.swap(progress.pages_total, Ordering::SeqCst) != progress.pages_total {
            self.activate_bar(progress.pages_total);
        }
        self.bar.set_position(progress.pages_done as u64);
    }

    fn on_file_ready(&self, name: &str, page_count: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            name,
            dim(&format!("{page_count} pages"))
        ));
    }

    fn on_file_error(&self, name: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {:<40}  {}", red("✗"), name, red(&msg)));
    }

    fn on_batch_complete(&self, total_files: usize, ready_count: usize) {
        let failed = total_files.saturating_sub(ready_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!("{} {} file(s) ready", green("✔"), bold(&ready_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} file(s) ready  ({} failed)",
                if failed == total_files { red("✘") } else { cyan("⚠") },
                bold(&ready_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Add contracts to the workspace (files, directories or URLs)
  pdfcite ingest Master_Agreement.pdf annexes/ https://example.com/sow.pdf

  # List stored documents
  pdfcite list

  # Ask one question; write a PNG preview of every cited page
  pdfcite ask "What is the termination fee?" --previews ./previews

  # Interactive session
  pdfcite chat

  # Render a page of a stored document
  pdfcite render Master_Agreement.pdf 12 --scale 2 -o clause-14.png

CITATIONS:
  The model cites every fact as
    ⦗Clause: 14.2(a) | Page: 12 | File: "Master_Agreement.pdf"⦘
  Citations that match a stored document are numbered [n] and listed after
  the answer; others are shown as [file, p.N].

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDFCITE_STORE           Workspace directory (default: .pdfcite)
"#;

/// Ask questions about PDF contracts with page-accurate citations.
#[derive(Parser, Debug)]
#[command(
    name = "pdfcite",
    version,
    about = "Ask questions about PDF contracts with page-accurate citations",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Workspace directory holding ingested documents.
    #[arg(long, global = true, env = "PDFCITE_STORE", default_value = ".pdfcite")]
    store: PathBuf,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file replacing the built-in analyst rules.
    #[arg(long, global = true, env = "PDFCITE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per answer.
    #[arg(long, global = true, env = "PDFCITE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "PDFCITE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per question on LLM failure.
    #[arg(long, global = true, env = "PDFCITE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDFCITE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFCITE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFCITE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFCITE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and store PDFs (paths, directories or HTTP/HTTPS URLs).
    Ingest {
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// List stored documents.
    List {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Remove one stored document by id.
    Remove { id: String },
    /// Remove every stored document.
    Clear,
    /// Ask one question about all ready documents.
    Ask {
        question: String,
        /// Write a PNG of every resolved citation's page into this directory.
        #[arg(long)]
        previews: Option<PathBuf>,
    },
    /// Interactive question loop (/quit to exit).
    Chat,
    /// Render one page of a stored document to PNG.
    Render {
        /// Document id or exact file name.
        document: String,
        /// 1-based page number.
        page: String,
        /// Render scale (1.0 = one pixel per point). Default: preview scale.
        #[arg(long)]
        scale: Option<f32>,
        /// Output file. Default: <name>-p<page>.png in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print a data: URI to stdout instead of writing a file.
        #[arg(long)]
        data_uri: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress =
        !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Ingest { .. });
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    match &cli.command {
        Command::Ingest { inputs } => ingest(&cli, config, inputs).await,
        Command::List { json } => list(&cli, *json),
        Command::Remove { id } => remove(&cli, id),
        Command::Clear => clear(&cli),
        Command::Ask { question, previews } => {
            let mut ws = open_workspace(&cli, config)?;
            load_context(&cli, &mut ws)?;
            let answer = ws.ask(question).await.context("Question failed")?;
            print_answer(&ws, &answer, previews.as_deref()).await
        }
        Command::Chat => chat(&cli, config).await,
        Command::Render {
            document,
            page,
            scale,
            output,
            data_uri,
        } => {
            let ws = open_workspace(&cli, config)?;
            render(&ws, document, page, *scale, output.as_deref(), *data_uri).await
        }
    }
}

/// Map CLI args to `WorkspaceConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<WorkspaceConfig> {
    let mut builder = WorkspaceConfig::builder()
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn open_store(cli: &Cli) -> Result<FsStore> {
    FsStore::open(&cli.store)
        .with_context(|| format!("Failed to open workspace at {}", cli.store.display()))
}

fn open_workspace(cli: &Cli, config: WorkspaceConfig) -> Result<Workspace> {
    let backend: Arc<dyn PdfBackend> = Arc::new(PdfiumBackend::bind()?);
    Ok(Workspace::new(config, Box::new(open_store(cli)?), backend))
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn ingest(cli: &Cli, config: WorkspaceConfig, inputs: &[String]) -> Result<()> {
    let timeout = config.download_timeout_secs;
    let mut ws = open_workspace(cli, config)?;

    let mut uploads = Vec::new();
    for input in expand_inputs(inputs)? {
        let upload = resolve_upload(&input, timeout)
            .await
            .with_context(|| format!("Failed to read {input}"))?;
        uploads.push(upload);
    }

    let report = ws.ingest(uploads).await.context("Ingestion failed")?;

    if !cli.quiet && cli.no_progress {
        eprintln!("{}/{} file(s) ready", report.ready.len(), report.total());
        for (name, message) in &report.failed {
            eprintln!("  {} {}: {}", red("✗"), name, message);
        }
    }
    Ok(())
}

fn list(cli: &Cli, json: bool) -> Result<()> {
    let docs = open_store(cli)?.get_all()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&docs).context("Failed to serialise documents")?
        );
        return Ok(());
    }
    if docs.is_empty() {
        eprintln!("{}", dim("No documents. Add some with `pdfcite ingest <file.pdf>`."));
        return Ok(());
    }

    println!("{:<32} {:<8} {:>9} {:>6}  NAME", "ID", "STATUS", "SIZE", "PAGES");
    for doc in &docs {
        let status = match doc.status {
            DocumentStatus::Ready => green("ready   "),
            DocumentStatus::Error => red("error   "),
            other => format!("{:<8}", other.to_string()),
        };
        println!(
            "{:<32} {} {:>7.2}MB {:>6}  {}",
            doc.id,
            status,
            doc.size_mb(),
            doc.page_count,
            doc.name
        );
        if let Some(ref msg) = doc.error_message {
            println!("{:<32} {}", "", dim(msg));
        }
    }
    Ok(())
}

fn remove(cli: &Cli, id: &str) -> Result<()> {
    let mut store = open_store(cli)?;
    let existed = store.get(id)?.is_some();
    store.delete(id)?;
    if !cli.quiet {
        if existed {
            eprintln!("{} removed {}", green("✔"), id);
        } else {
            eprintln!("{} no document with id {}", cyan("⚠"), id);
        }
    }
    Ok(())
}

fn clear(cli: &Cli) -> Result<()> {
    open_store(cli)?.clear()?;
    if !cli.quiet {
        eprintln!("{} workspace cleared", green("✔"));
    }
    Ok(())
}

fn load_context(cli: &Cli, ws: &mut Workspace) -> Result<()> {
    let summary = ws.load_context().context("Failed to load document context")?;
    if !cli.quiet {
        eprintln!("{} {}", cyan("◆"), summary.greeting);
        if summary.over_limit {
            eprintln!(
                "{} Total content is very large (~{} tokens). Responses may be slower or hit limits.",
                cyan("⚠"),
                summary.estimated_tokens
            );
        }
    }
    Ok(())
}

async fn chat(cli: &Cli, config: WorkspaceConfig) -> Result<()> {
    let mut ws = open_workspace(cli, config)?;
    load_context(cli, &mut ws)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", bold(">"));
        io::stderr().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/quit" || question == "/exit" {
            break;
        }

        match ws.ask(question).await {
            Ok(answer) => print_answer(&ws, &answer, None).await?,
            Err(e) => eprintln!(
                "{} I encountered an error analyzing the document. The context may be too \
                 large for the model, or there was a network issue.\n  {}",
                red("✗"),
                dim(&e.to_string())
            ),
        }
    }
    Ok(())
}

/// Print the reply with numbered citations, then the citation legend.
async fn print_answer(ws: &Workspace, answer: &Answer, previews: Option<&Path>) -> Result<()> {
    let docs = ws.documents()?;
    let segments = answer.segments(&docs);

    let mut body = String::new();
    let mut legend = Vec::new();
    for segment in &segments {
        match segment {
            Segment::Text(t) => body.push_str(t),
            Segment::Citation(c) if c.is_interactive() => {
                legend.push(c);
                body.push_str(&cyan(&format!("[{}][{}]", c.citation.display_label(), legend.len())));
            }
            Segment::Citation(c) => body.push_str(&dim(&c.inert_text())),
        }
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", body.trim_end()).context("Failed to write to stdout")?;
    drop(handle);
    tracing::debug!("plain reply: {}", to_plain_text(&segments));

    if legend.is_empty() {
        return Ok(());
    }
    println!();
    for (n, c) in legend.iter().enumerate() {
        let name = c.citation.clean_file_name();
        println!("  [{}] {} p.{}", n + 1, name, c.citation.page_number);

        if let Some(dir) = previews {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            match ws.preview(c).await {
                Ok(page) => {
                    let path = dir.join(format!("{}-{}-p{}.png", n + 1, stem(name), page.page_number));
                    tokio::fs::write(&path, &page.png)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("      {} {}", dim("→"), path.display());
                }
                Err(e) => println!("      {} {}", red("✗"), e.user_message()),
            }
        }
    }
    Ok(())
}

async fn render(
    ws: &Workspace,
    document: &str,
    page: &str,
    scale: Option<f32>,
    output: Option<&Path>,
    data_uri: bool,
) -> Result<()> {
    let doc: SourceDocument = ws.find(document)?;
    let page_number = parse_page_number(page).map_err(render_failure)?;
    let scale = scale.unwrap_or(ws.config().preview_scale);

    let rendered = ws
        .render(&doc, page_number, scale)
        .await
        .map_err(render_failure)?;

    if data_uri {
        println!("{}", rendered.to_data_uri());
        return Ok(());
    }

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}-p{}.png", stem(&doc.name), rendered.page_number)));
    tokio::fs::write(&path, &rendered.png)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!(
        "{} page {} of {}  {}x{} px  →  {}",
        green("✔"),
        rendered.page_number,
        doc.name,
        rendered.width,
        rendered.height,
        bold(&path.display().to_string())
    );
    Ok(())
}

fn render_failure(e: RenderError) -> anyhow::Error {
    anyhow!("{}\n  ({})", e.user_message(), e)
}

/// File name without its extension, for output file names.
fn stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}
