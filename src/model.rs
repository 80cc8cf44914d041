use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, trace};

use crate::domain::{CCConfig, CCError, CMDMode, HELP_TEXT, JobKind, Message};
use crate::export::ExportRequest;
use crate::inputter::{InputResult, Inputter};
use crate::scan::{ScanResult, scan_columns};
use crate::table::{TableHandler, column_names, parse_separator, text_rows};
use crate::worker::{JobOutcome, Worker};

const NO_FILE_LABEL: &str = "--no file chosen--";

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    EMPTY,
    READY,
    PROCESSING,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    MAIN,
    PREVIEW,
    EXPORT,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::MAIN, Tab::PREVIEW, Tab::EXPORT];

    pub fn title(&self) -> &'static str {
        match self {
            Tab::MAIN => "Main",
            Tab::PREVIEW => "Data Preview",
            Tab::EXPORT => "Export",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Tab::MAIN => 0,
            Tab::PREVIEW => 1,
            Tab::EXPORT => 2,
        }
    }

    fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Self {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    NORMAL,
    POPUP,
    CMDINPUT,
}

/// The first matching rows of one column.
#[derive(Debug, Clone, Default)]
pub struct PreviewView {
    pub column: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone)]
pub struct Setting {
    pub key: char,
    pub label: &'static str,
    pub value: String,
}

impl Setting {
    fn new(key: char, label: &'static str, value: impl Into<String>) -> Self {
        Setting {
            key,
            label,
            value: value.into(),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Everything the UI needs to draw a frame.
pub struct UIData {
    pub tab: Tab,
    pub file_label: String,
    pub file_info: String,
    pub settings: Vec<Setting>,
    pub results_title: String,
    pub results: Vec<[String; 3]>,
    pub selected_result: usize,
    pub preview: Option<PreviewView>,
    pub selected_preview_row: usize,
    pub export_settings: Vec<Setting>,
    pub busy: Option<JobKind>,
    pub show_popup: bool,
    pub popup_message: String,
    pub cmdinput: Option<InputResult>,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            tab: Tab::MAIN,
            file_label: NO_FILE_LABEL.to_string(),
            file_info: "File:".to_string(),
            settings: Vec::new(),
            results_title: String::new(),
            results: Vec::new(),
            selected_result: 0,
            preview: None,
            selected_preview_row: 0,
            export_settings: Vec::new(),
            busy: None,
            show_popup: false,
            popup_message: String::new(),
            cmdinput: None,
            status_message: String::new(),
        }
    }
}

pub struct Model {
    config: CCConfig,
    handler: TableHandler,
    worker: Worker,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    tab: Tab,
    results_cursor: usize,
    preview: Option<PreviewView>,
    preview_cursor: usize,
    swap_out: String,
    swap_in: String,
    export_separator: String,
    export_dir: Option<PathBuf>,
    input: Inputter,
    last_input: InputResult,
    clipboard: Option<Clipboard>,
    ui_width: usize,
    ui_height: usize,
    status_message: String,
    uidata: UIData,
}

impl Model {
    pub fn init(config: &CCConfig, handler: TableHandler, ui_width: usize, ui_height: usize) -> Self {
        let mut model = Self {
            config: config.clone(),
            handler,
            worker: Worker::new(),
            status: Status::EMPTY,
            modus: Modus::NORMAL,
            previous_modus: Modus::NORMAL,
            tab: Tab::MAIN,
            results_cursor: 0,
            preview: None,
            preview_cursor: 0,
            swap_out: config.swap_out.clone(),
            swap_in: config.swap_in.clone(),
            export_separator: config.export_separator.clone(),
            export_dir: None,
            input: Inputter::default(),
            last_input: InputResult::default(),
            clipboard: None,
            ui_width,
            ui_height,
            status_message: String::new(),
            uidata: UIData::empty(),
        };
        model.set_status_message("Started charcheck! Press ? for help.");
        model.update_uidata();
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        trace!("Status: {}", self.status_message);
    }

    /// Every user triggered action ends here. Failures become a notice and
    /// the UI stays usable.
    fn report(&mut self, action: &str, result: Result<(), CCError>) {
        if let Err(e) = result {
            error!("{action} failed: {e:?}");
            self.set_status_message(e.to_string());
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), CCError> {
        if let Some(msg) = message {
            match self.modus {
                Modus::NORMAL => self.update_normal(msg),
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help | Message::Enter => self.exit_popup(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }
        self.update_uidata();
        Ok(())
    }

    fn update_normal(&mut self, msg: Message) {
        match msg {
            Message::Quit => self.quit(),
            Message::Help => self.show_help(),
            Message::Exit => (),
            Message::NextTab => self.tab = self.tab.next(),
            Message::PrevTab => self.tab = self.tab.prev(),
            Message::MoveUp => self.move_selection(-1),
            Message::MoveDown => self.move_selection(1),
            Message::Enter => {
                if self.tab == Tab::MAIN {
                    let result = self.open_preview();
                    self.report("Preview", result);
                }
            }
            Message::ChooseFile => self.enter_cmd_mode(CMDMode::FilePath),
            Message::Reload => {
                let result = self.reload();
                self.report("Reload", result);
            }
            Message::Drop => {
                let result = self.drop_file();
                self.report("Drop", result);
            }
            Message::Analyze => {
                let result = self.analyze();
                self.report("Analyze", result);
            }
            Message::Export => {
                let result = self.export();
                self.report("Export", result);
            }
            Message::CopyRow => self.copy_preview_row(),
            Message::EditCheck => self.enter_cmd_mode(CMDMode::CheckChars),
            Message::EditEncoding => self.enter_cmd_mode(CMDMode::Encoding),
            Message::EditSeparator => self.enter_cmd_mode(CMDMode::Separator),
            Message::EditSwapOut => self.enter_cmd_mode(CMDMode::SwapOut),
            Message::EditSwapIn => self.enter_cmd_mode(CMDMode::SwapIn),
            Message::EditExportSeparator => self.enter_cmd_mode(CMDMode::ExportSeparator),
            Message::EditExportDir => self.enter_cmd_mode(CMDMode::ExportDir),
            Message::ToggleHeader => {
                let options = self.handler.options_mut();
                options.has_header = !options.has_header;
                let msg = format!("File has headers: {}", yes_no(options.has_header));
                self.note_option_change(msg);
            }
            Message::ToggleUnnamed => {
                let options = self.handler.options_mut();
                options.suppress_unnamed = !options.suppress_unnamed;
                let msg = format!("Suppress unnamed columns: {}", yes_no(options.suppress_unnamed));
                self.note_option_change(msg);
            }
            Message::ToggleLinebreaks => {
                let options = self.handler.options_mut();
                options.replace_linebreaks = !options.replace_linebreaks;
                let msg = format!("Replace line breaks: {}", yes_no(options.replace_linebreaks));
                self.note_option_change(msg);
            }
            Message::Resize(width, height) => self.ui_resize(width, height),
            Message::RawKey(_) => (),
        }
    }

    fn note_option_change(&mut self, msg: String) {
        if self.handler.table().is_some() {
            self.set_status_message(format!("{msg} (reload to apply)"));
        } else {
            self.set_status_message(msg);
        }
    }

    /// Picks up a finished background job, if there is one.
    pub fn tick(&mut self) {
        if let Some(outcome) = self.worker.poll() {
            self.apply_outcome(outcome);
            self.update_uidata();
        }
    }

    /// Blocks until the running job is done.
    pub fn wait_for_job(&mut self) {
        if let Some(outcome) = self.worker.wait() {
            self.apply_outcome(outcome);
            self.update_uidata();
        }
    }

    fn ensure_idle(&self) -> Result<(), CCError> {
        match self.worker.running() {
            Some(kind) => Err(CCError::Busy(kind)),
            None => Ok(()),
        }
    }

    fn idle_status(&self) -> Status {
        if self.handler.table().is_some() {
            Status::READY
        } else {
            Status::EMPTY
        }
    }

    // -------------------- File handling ---------------------- //

    pub fn open(&mut self, path: PathBuf) -> Result<(), CCError> {
        self.ensure_idle()?;
        let start_time = Instant::now();
        let (rows, cols) = self.handler.load_from(path)?;
        self.after_load(rows, cols, start_time);
        Ok(())
    }

    /// Opens a path given on the command line, failures end up as notice.
    pub fn open_path(&mut self, raw: &str) {
        let result = expand_path(raw).and_then(|path| self.open(path));
        self.report("Open", result);
        self.update_uidata();
    }

    fn reload(&mut self) -> Result<(), CCError> {
        self.ensure_idle()?;
        let start_time = Instant::now();
        let (rows, cols) = self.handler.reload()?;
        self.after_load(rows, cols, start_time);
        Ok(())
    }

    fn after_load(&mut self, rows: usize, cols: usize, start_time: Instant) {
        self.preview = None;
        self.preview_cursor = 0;
        self.results_cursor = 0;
        self.status = Status::READY;
        if self.export_dir.is_none() {
            self.export_dir = self
                .handler
                .path()
                .and_then(Path::parent)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf);
        }
        let name = self
            .handler
            .table()
            .map(|t| t.file_name())
            .unwrap_or_default();
        self.set_status_message(format!(
            "Loaded {name}: {cols} cols, {rows} rows in {}ms",
            start_time.elapsed().as_millis()
        ));
    }

    fn drop_file(&mut self) -> Result<(), CCError> {
        self.ensure_idle()?;
        self.handler.drop_table()?;
        self.swap_out = self.config.swap_out.clone();
        self.swap_in = self.config.swap_in.clone();
        self.export_separator = self.config.export_separator.clone();
        self.export_dir = None;
        self.preview = None;
        self.preview_cursor = 0;
        self.results_cursor = 0;
        self.status = Status::EMPTY;
        self.set_status_message("File dropped.");
        Ok(())
    }

    // -------------------- Analysis ---------------------- //

    pub fn analyze(&mut self) -> Result<(), CCError> {
        self.ensure_idle()?;
        if self.handler.table().is_none() {
            return Err(CCError::NoFile);
        }
        self.preview = None;
        if self.handler.match_set().is_empty() {
            let rows = self.handler.shape().map(|(rows, _)| rows).unwrap_or(0);
            self.handler.apply_scan(ScanResult {
                total_rows: rows,
                ..ScanResult::default()
            });
            self.set_status_message("Nothing to check for, enter characters with c.");
            return Ok(());
        }
        let (df, set) = self.handler.scan_input()?;
        self.worker
            .dispatch(JobKind::Scan, move || JobOutcome::Scanned(scan_columns(&df, &set)))?;
        self.status = Status::PROCESSING;
        self.set_status_message("Analyzing ...");
        Ok(())
    }

    fn apply_outcome(&mut self, outcome: JobOutcome) {
        self.status = self.idle_status();
        match outcome {
            JobOutcome::Scanned(Ok(result)) => {
                let cols = self.handler.shape().map(|(_, cols)| cols).unwrap_or(0);
                self.set_status_message(format!(
                    "Found \"{}\" in {} of {} columns.",
                    result.pattern,
                    result.len(),
                    cols
                ));
                self.results_cursor = 0;
                self.handler.apply_scan(result);
            }
            JobOutcome::Exported(Ok(report)) => {
                info!("Export done: {:?}", report);
                self.set_status_message(format!(
                    "File exported successfully: {} ({} cells changed)",
                    report.path.display(),
                    report.changed_cells
                ));
            }
            JobOutcome::Scanned(Err(e)) => self.report("Analyze", Err(e)),
            JobOutcome::Exported(Err(e)) => self.report("Export", Err(e)),
        }
    }

    fn selected_column(&self) -> Option<String> {
        self.handler
            .scan_result()
            .and_then(|r| r.columns.get(self.results_cursor))
            .map(|hits| hits.column.clone())
    }

    fn open_preview(&mut self) -> Result<(), CCError> {
        let Some(column) = self.selected_column() else {
            return Ok(());
        };
        let df = self.handler.preview(&column, self.config.preview_rows)?;
        debug!("Preview of \"{column}\" with {} rows", df.height());
        self.preview = Some(PreviewView {
            column,
            headers: column_names(&df),
            rows: text_rows(&df)?,
        });
        self.preview_cursor = 0;
        self.tab = Tab::PREVIEW;
        Ok(())
    }

    // -------------------- Export ---------------------- //

    pub fn export(&mut self) -> Result<(), CCError> {
        self.ensure_idle()?;
        let directory = match &self.export_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let request = ExportRequest {
            directory,
            separator: self.export_separator.clone(),
            swap_out: self.swap_out.clone(),
            swap_in: self.swap_in.clone(),
        };
        let job = self.handler.export_job(request)?;
        self.worker
            .dispatch(JobKind::Export, move || JobOutcome::Exported(job.run()))?;
        self.status = Status::PROCESSING;
        self.set_status_message("Exporting ...");
        Ok(())
    }

    // -------------------- Navigation ---------------------- //

    fn move_selection(&mut self, step: i32) {
        let (cursor, len) = match self.tab {
            Tab::MAIN => (
                &mut self.results_cursor,
                self.handler.scan_result().map(|r| r.len()).unwrap_or(0),
            ),
            Tab::PREVIEW => (
                &mut self.preview_cursor,
                self.preview.as_ref().map(|p| p.rows.len()).unwrap_or(0),
            ),
            Tab::EXPORT => return,
        };
        if len == 0 {
            *cursor = 0;
        } else if step < 0 {
            *cursor = cursor.saturating_sub(1);
        } else {
            *cursor = std::cmp::min(*cursor + 1, len - 1);
        }
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.ui_width, width, self.ui_height, height
        );
        self.ui_width = width;
        self.ui_height = height;
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
    }

    fn exit_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::POPUP;
    }

    // -------------------- Clipboard ---------------------- //

    fn wrap_cell_content(c: &str, separator: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping =
            needs_escaping || c.contains(separator) || c.contains(['\n', '\r']);
        let mut out = String::from(c);
        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn copy_preview_row(&mut self) {
        if self.tab != Tab::PREVIEW {
            return;
        }
        let Some(row) = self
            .preview
            .as_ref()
            .and_then(|p| p.rows.get(self.preview_cursor))
        else {
            return;
        };
        let separator = self.handler.options().separator.clone();
        let content = row
            .iter()
            .map(|c| Self::wrap_cell_content(c.as_deref().unwrap_or(""), &separator))
            .collect::<Vec<String>>()
            .join(&separator);

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    error!("Clipboard not available: {:?}", e);
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(content) {
                Ok(_) => {
                    trace!("Copied row to clipboard.");
                    self.set_status_message("Copied row to clipboard.");
                }
                Err(e) => error!("Error copying to clipboard: {:?}", e),
            }
        }
    }

    // -------------------- Command input ---------------------- //

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {:?} ...", mode);
        let value = match mode {
            CMDMode::FilePath => self
                .handler
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            CMDMode::CheckChars => self.handler.check_input().to_string(),
            CMDMode::Encoding => self.handler.options().encoding.name().to_string(),
            CMDMode::Separator => self.handler.options().separator.clone(),
            CMDMode::SwapOut => self.swap_out.clone(),
            CMDMode::SwapIn => self.swap_in.clone(),
            CMDMode::ExportSeparator => self.export_separator.clone(),
            CMDMode::ExportDir => self
                .export_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        };
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.last_input = self.input.start(mode, &value);
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.handle_cmd_input();
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {:?}", self.last_input);
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        let input = self.last_input.clone();
        self.input.clear();
        if input.canceled {
            return;
        }
        if let Some(mode) = input.mode {
            let result = self.commit_input(mode, &input.input);
            self.report(mode.label(), result);
        }
    }

    fn commit_input(&mut self, mode: CMDMode, value: &str) -> Result<(), CCError> {
        match mode {
            CMDMode::FilePath => {
                let path = expand_path(value)?;
                self.open(path)?;
            }
            CMDMode::CheckChars => {
                self.handler.set_check_input(value)?;
                let targets = self.handler.match_set().targets().len();
                self.set_status_message(format!("Checking for {targets} target(s)."));
            }
            CMDMode::Encoding => {
                let encoding = self.handler.set_encoding(value);
                if encoding.name() != value.trim().to_lowercase().replace('-', "_") {
                    self.set_status_message(format!(
                        "Unknown encoding \"{value}\", using {}.",
                        encoding.name()
                    ));
                } else {
                    self.note_option_change(format!("File encoding: {}", encoding.name()));
                }
            }
            CMDMode::Separator => {
                self.handler.set_separator(value)?;
                self.note_option_change(format!("csv separator: {value}"));
            }
            CMDMode::SwapOut => {
                if value.is_empty() {
                    return Err(CCError::EmptyReplaceTarget);
                }
                self.swap_out = value.to_string();
            }
            CMDMode::SwapIn => self.swap_in = value.to_string(),
            CMDMode::ExportSeparator => {
                parse_separator(value)?;
                self.export_separator = value.to_string();
            }
            CMDMode::ExportDir => self.export_dir = Some(expand_path(value)?),
        }
        Ok(())
    }

    // -------------------- UI data ---------------------- //

    fn update_uidata(&mut self) {
        let options = self.handler.options();
        let (file_label, file_info) = match (self.handler.path(), self.handler.shape()) {
            (Some(path), Some((rows, cols))) => (
                path.display().to_string(),
                format!("File: {cols} cols, {rows} rows"),
            ),
            _ => (NO_FILE_LABEL.to_string(), "File:".to_string()),
        };
        let settings = vec![
            Setting::new('e', "File encoding", options.encoding.name()),
            Setting::new('s', "csv separator", options.separator.clone()),
            Setting::new('h', "File has headers", yes_no(options.has_header)),
            Setting::new('u', "Suppress unnamed columns", yes_no(options.suppress_unnamed)),
            Setting::new('l', "Replace line breaks", yes_no(options.replace_linebreaks)),
            Setting::new('c', "Characters to check for", self.handler.check_input()),
        ];
        let (results_title, results) = match self.handler.scan_result() {
            Some(result) => (
                format!(" Columns containing {} ", result.pattern),
                result
                    .columns
                    .iter()
                    .map(|h| [h.column.clone(), h.count.to_string(), h.percentage.clone()])
                    .collect(),
            ),
            None => (" Results ".to_string(), Vec::new()),
        };
        let export_settings = vec![
            Setting::new('w', "String to swap out", self.swap_out.clone()),
            Setting::new('i', "String to swap in", self.swap_in.clone()),
            Setting::new('p', "Separator", self.export_separator.clone()),
            Setting::new(
                'g',
                "Export directory",
                self.export_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string()),
            ),
        ];

        self.uidata = UIData {
            tab: self.tab,
            file_label,
            file_info,
            settings,
            results_title,
            results,
            selected_result: self.results_cursor,
            preview: self.preview.clone(),
            selected_preview_row: self.preview_cursor,
            export_settings,
            busy: self.worker.running(),
            show_popup: self.modus == Modus::POPUP,
            popup_message: HELP_TEXT.to_string(),
            cmdinput: (self.modus == Modus::CMDINPUT).then(|| self.last_input.clone()),
            status_message: self.status_message.clone(),
        };
    }
}

/// Expands `~` and environment variables in a user supplied path.
pub fn expand_path(value: &str) -> Result<PathBuf, CCError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CCError::InvalidPath("empty path".to_string()));
    }
    shellexpand::full(value)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| CCError::InvalidPath(e.to_string()))
}
