use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod domain;
mod encoding;
mod export;
mod inputter;
mod matcher;
mod model;
mod scan;
mod table;
mod ui;
mod worker;

use controller::Controller;
use domain::{CCConfig, CCError};
use export::ExportRequest;
use model::{Model, Status, expand_path};
use scan::{ScanResult, scan_columns};
use table::{LoadOptions, TableHandler};
use ui::TableUI;

/// Find separator characters inside csv columns, preview the affected rows and
/// export a copy with the characters swapped out.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// File to load at start up
    path: Option<String>,

    /// Characters to check for, separate multiple targets with a space
    #[arg(short, long, default_value = domain::DEFAULT_CHECK_INPUT)]
    check: String,

    /// Encoding of the input file, also used for the export
    #[arg(short, long, default_value = encoding::DEFAULT_ENCODING)]
    encoding: String,

    /// Column separator of the input file
    #[arg(short, long, default_value = ",")]
    separator: String,

    /// The first row is data, not a header
    #[arg(long)]
    no_header: bool,

    /// Keep columns without a header name
    #[arg(long)]
    keep_unnamed: bool,

    /// Keep line breaks inside cells
    #[arg(long)]
    keep_linebreaks: bool,

    /// Number of matching rows shown in the data preview
    #[arg(long, default_value_t = domain::DEFAULT_PREVIEW_ROWS)]
    preview_rows: usize,

    /// Rows per parse chunk
    #[arg(long, default_value_t = domain::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Print the analysis to stdout and exit instead of starting the UI
    #[arg(long)]
    report: bool,

    /// Directory to export the transformed file into (report mode)
    #[arg(long)]
    export_dir: Option<String>,

    /// String to swap out on export
    #[arg(long, default_value = domain::DEFAULT_CHECK_INPUT)]
    swap_out: String,

    /// String to swap in on export
    #[arg(long, default_value = domain::DEFAULT_SWAP_IN)]
    swap_in: String,

    /// Column separator of the exported file
    #[arg(long, default_value = ",")]
    export_separator: String,

    /// Write logs to this file
    #[arg(long)]
    log: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> CCConfig {
        CCConfig::default()
            .check_input(self.check.as_str())
            .encoding(self.encoding.as_str())
            .separator(self.separator.as_str())
            .has_header(!self.no_header)
            .suppress_unnamed(!self.keep_unnamed)
            .replace_linebreaks(!self.keep_linebreaks)
            .preview_rows(self.preview_rows)
            .chunk_size(self.chunk_size)
            .swap_out(self.swap_out.as_str())
            .swap_in(self.swap_in.as_str())
            .export_separator(self.export_separator.as_str())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_tracing(&args) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    let result = if args.report {
        report(&args)
    } else {
        run(&args)
    };
    match result {
        Err(e) => {
            error!("{e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_tracing(args: &Args) -> Result<(), CCError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    if let Some(path) = &args.log {
        let file = File::create(path)?;
        registry
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_line_number(true),
            )
            .init();
    } else if args.report {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        // The terminal belongs to the UI.
        registry.init();
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), CCError> {
    info!("Starting charcheck!");
    let cfg = args.config();
    let handler = TableHandler::new(LoadOptions::from_config(&cfg), &cfg.check_input)?;

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&cfg, handler, size.width as usize, size.height as usize);

    if let Some(path) = &args.path {
        model.open_path(path);
    }

    let mut ui = TableUI::new(&cfg);
    let controller = Controller::new(&cfg);

    let result = (|| -> Result<(), CCError> {
        while model.status != Status::QUITTING {
            terminal.draw(|f| ui.draw(&model, f))?;
            let message = controller.handle_event(&model)?;
            model.update(message)?;
            model.tick();
        }
        Ok(())
    })();

    // Let a running export finish writing its file.
    model.wait_for_job();
    ratatui::restore();
    info!("Bye!");
    result
}

fn report(args: &Args) -> Result<(), CCError> {
    let cfg = args.config();
    let path = args.path.as_deref().ok_or(CCError::NoFile)?;
    let mut handler = TableHandler::new(LoadOptions::from_config(&cfg), &cfg.check_input)?;
    let (rows, cols) = handler.load_from(expand_path(path)?)?;
    info!("Loaded {path}: {cols} cols, {rows} rows");

    let (df, set) = handler.scan_input()?;
    let result = scan_columns(&df, &set)?;
    let mut stdout = std::io::stdout().lock();
    write_report(&mut stdout, &result)?;

    if let Some(dir) = &args.export_dir {
        let request = ExportRequest {
            directory: expand_path(dir)?,
            separator: cfg.export_separator.clone(),
            swap_out: cfg.swap_out.clone(),
            swap_in: cfg.swap_in.clone(),
        };
        let report = handler.export_job(request)?.run()?;
        writeln!(
            stdout,
            "Exported {} rows to {} ({} cells changed)",
            report.rows,
            report.path.display(),
            report.changed_cells
        )?;
    }
    Ok(())
}

fn write_report(out: &mut impl Write, result: &ScanResult) -> Result<(), CCError> {
    if result.is_empty() {
        writeln!(out, "No column contains {}", result.pattern)?;
        return Ok(());
    }
    let width = result
        .columns
        .iter()
        .map(|h| h.column.chars().count())
        .max()
        .unwrap_or(0)
        .max("Column".len());
    writeln!(out, "{:<width$}  {:>10}  {:>10}", "Column", "Count", "Percentage")?;
    for hits in &result.columns {
        writeln!(
            out,
            "{:<width$}  {:>10}  {:>10}",
            hits.column, hits.count, hits.percentage
        )?;
    }
    Ok(())
}
