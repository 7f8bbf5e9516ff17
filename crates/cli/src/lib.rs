use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{apply_session_action, Color, EditorSession, Preferences, SessionAction};
use pdf_engine::{default_engine, OpenSource, PdfEngine, RenderRequest};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::Storage;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pdf-annotator")]
#[command(about = "Place text annotations on a PDF and export the result")]
pub struct Cli {
    /// Log debug events to stderr (RUST_LOG takes precedence).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a page to PNG at the given zoom scale.
    RenderPage {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay an editing session from a JSON event script and export the PDF.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// JSON array of session actions.
        #[arg(long, value_name = "EVENTS")]
        script: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the planned draw calls instead of writing a file.
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        font_size: Option<f32>,
        #[arg(long)]
        color: Option<Color>,
        #[arg(long)]
        placeholder: Option<String>,
        /// Persist the effective annotation defaults.
        #[arg(long)]
        save_prefs: bool,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    page_sizes_pt: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

struct AnnotateArgs {
    file: PathBuf,
    script: PathBuf,
    output: Option<PathBuf>,
    dry_run: bool,
    font_size: Option<f32>,
    color: Option<Color>,
    placeholder: Option<String>,
    save_prefs: bool,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::RenderPage { file, page, scale, output } => {
            run_render_page(&file, page, scale, output.as_deref())
        }
        Commands::Annotate {
            file,
            script,
            output,
            dry_run,
            font_size,
            color,
            placeholder,
            save_prefs,
        } => run_annotate(AnnotateArgs {
            file,
            script,
            output,
            dry_run,
            font_size,
            color,
            placeholder,
            save_prefs,
        }),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let mut page_sizes_pt = Vec::with_capacity(page_count as usize);
    for page_index in 0..page_count {
        let size = engine.page_size(handle, page_index)?;
        page_sizes_pt.push(PageSizeOutput { width: size.width_pt, height: size.height_pt });
    }

    let payload = InfoOutput { path: file.display().to_string(), page_count, page_sizes_pt };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_render_page(file: &Path, page: u32, scale: f32, output: Option<&Path>) -> Result<()> {
    ensure_pdf_exists(file)?;

    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    if page > page_count {
        anyhow::bail!("page {page} does not exist (document has {page_count} pages)");
    }

    let zoom_percent = viewer_core::zoom_percent_for_scale(scale);
    let request = RenderRequest { page_index: page - 1, scale: f32::from(zoom_percent) / 100.0 };
    tracing::debug!(page, zoom_percent, "rendering page");

    let image = engine.render_page(handle, request).context("failed to render page")?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_page_output(file, page));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    engine.close(handle)?;

    Ok(())
}

fn run_annotate(args: AnnotateArgs) -> Result<()> {
    ensure_pdf_exists(&args.file)?;

    let source =
        fs::read(&args.file).with_context(|| format!("failed to read {}", args.file.display()))?;
    let script = load_script(&args.script)?;

    let storage = Storage::from_env().context("failed to resolve preferences directory")?;
    let mut preferences = storage.load_preferences().context("failed to load preferences")?;
    apply_overrides(&mut preferences, &args)?;

    let mut engine = default_engine();
    let handle =
        engine.open(OpenSource::Bytes(source.clone())).context("failed to open PDF")?;
    let page_count = engine.page_count(handle)?;
    let mut page_heights = Vec::with_capacity(page_count as usize);
    for page_index in 0..page_count {
        page_heights.push(engine.page_size(handle, page_index)?.height_pt);
    }
    engine.close(handle)?;

    let mut session = EditorSession::open(file_name(&args.file)?);
    apply_session_action(&mut session, SessionAction::DocumentLoaded { page_count }, &preferences);
    for action in script {
        apply_session_action(&mut session, action, &preferences);
    }

    let annotations = session.store().annotations();
    tracing::debug!(count = annotations.len(), "session replayed");

    if args.dry_run {
        let plan = annotation_export::plan_export(annotations, &page_heights);
        println!("{plan}");
    } else {
        let outcome = annotation_export::export_pdf(&source, annotations)
            .context("failed to export annotated PDF")?;

        let output = match args.output {
            Some(output) => output,
            None => default_export_output(&args.file)?,
        };
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output, &outcome.bytes)
            .with_context(|| format!("failed to write PDF to {}", output.display()))?;

        println!("{}", output.display());
    }

    if args.save_prefs {
        storage.save_preferences(&preferences).context("failed to save preferences")?;
    }

    Ok(())
}

fn load_script(path: &Path) -> Result<Vec<SessionAction>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid event script {}", path.display()))
}

fn apply_overrides(preferences: &mut Preferences, args: &AnnotateArgs) -> Result<()> {
    if let Some(font_size) = args.font_size {
        if !(font_size.is_finite() && font_size > 0.0) {
            anyhow::bail!("--font-size must be a positive number");
        }
        preferences.default_font_size = font_size;
    }
    if let Some(color) = args.color {
        preferences.default_color = color;
    }
    if let Some(placeholder) = &args.placeholder {
        preferences.placeholder_text.clone_from(placeholder);
    }

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn file_name(file: &Path) -> Result<&str> {
    file.file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no usable file name: {}", file.display()))
}

fn default_page_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}

fn default_export_output(file: &Path) -> Result<PathBuf> {
    let name = file_name(file)?;
    Ok(file.with_file_name(annotation_export::exported_file_name(name)))
}
