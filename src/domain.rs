use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;

pub const DEFAULT_CHECK_INPUT: &str = ",";
pub const DEFAULT_SWAP_IN: &str = "@$@$@";
pub const DEFAULT_PREVIEW_ROWS: usize = 10;
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Background jobs that can occupy the worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobKind {
    Scan,
    Export,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Scan => write!(f, "analysis"),
            JobKind::Export => write!(f, "export"),
        }
    }
}

#[derive(Debug)]
pub enum CCError {
    // Path errors
    NoFile,
    InvalidPath(String),
    FileNotFound(PathBuf),
    PermissionDenied(PathBuf),
    NotAFile(PathBuf),
    IoError(Error),
    // Parse errors
    Decode { encoding: &'static str },
    InvalidSeparator(String),
    InvalidPattern(regex::Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    // Lookup errors
    UnknownColumn(String),
    // Export errors
    ExportCollision(PathBuf),
    NotADirectory(PathBuf),
    Encode { encoding: &'static str },
    EmptyReplaceTarget,
    // Scheduling
    Busy(JobKind),
    WorkerLost(JobKind),
}

impl fmt::Display for CCError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CCError::NoFile => write!(f, "No file loaded."),
            CCError::InvalidPath(e) => write!(f, "Path couldn't be set: {e}"),
            CCError::FileNotFound(p) => write!(f, "File not found: {}", p.display()),
            CCError::PermissionDenied(p) => write!(f, "Permission denied: {}", p.display()),
            CCError::NotAFile(p) => write!(f, "Not a file: {}", p.display()),
            CCError::IoError(e) => write!(f, "I/O error: {e}"),
            CCError::Decode { encoding } => {
                write!(f, "File can not be decoded as {encoding}, try another encoding.")
            }
            CCError::InvalidSeparator(s) => {
                write!(f, "Separator must be a single ASCII character, got \"{s}\".")
            }
            CCError::InvalidPattern(e) => write!(f, "Invalid check characters: {e}"),
            CCError::PolarsError(e) => write!(f, "Table couldn't be built: {e}"),
            CCError::LoadingFailed(s) => write!(f, "Loading failed: {s}"),
            CCError::UnknownColumn(c) => write!(f, "Unknown column \"{c}\"."),
            CCError::ExportCollision(p) => write!(f, "File already exists: {}", p.display()),
            CCError::NotADirectory(p) => write!(f, "Not a directory: {}", p.display()),
            CCError::Encode { encoding } => {
                write!(f, "Transformed data can not be encoded as {encoding}.")
            }
            CCError::EmptyReplaceTarget => write!(f, "String to swap out must not be empty."),
            CCError::Busy(job) => write!(f, "An {job} is still running, please wait."),
            CCError::WorkerLost(job) => write!(f, "The {job} stopped without a result."),
        }
    }
}

impl std::error::Error for CCError {}

impl From<Error> for CCError {
    fn from(err: Error) -> Self {
        CCError::IoError(err)
    }
}

impl From<PolarsError> for CCError {
    fn from(err: PolarsError) -> Self {
        CCError::PolarsError(err)
    }
}

impl From<regex::Error> for CCError {
    fn from(err: regex::Error) -> Self {
        CCError::InvalidPattern(err)
    }
}

/// In-memory defaults for a session. Nothing here is persisted.
#[derive(Debug, Clone, Setters)]
pub struct CCConfig {
    pub event_poll_time: u64,
    pub preview_rows: usize,
    pub chunk_size: usize,
    #[setters(into)]
    pub check_input: String,
    #[setters(into)]
    pub encoding: String,
    #[setters(into)]
    pub separator: String,
    pub has_header: bool,
    pub suppress_unnamed: bool,
    pub replace_linebreaks: bool,
    #[setters(into)]
    pub swap_out: String,
    #[setters(into)]
    pub swap_in: String,
    #[setters(into)]
    pub export_separator: String,
}

impl Default for CCConfig {
    fn default() -> Self {
        CCConfig {
            event_poll_time: 100,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            check_input: DEFAULT_CHECK_INPUT.to_string(),
            encoding: crate::encoding::DEFAULT_ENCODING.to_string(),
            separator: ",".to_string(),
            has_header: true,
            suppress_unnamed: true,
            replace_linebreaks: true,
            swap_out: DEFAULT_CHECK_INPUT.to_string(),
            swap_in: DEFAULT_SWAP_IN.to_string(),
            export_separator: ",".to_string(),
        }
    }
}

/// Text settings that are edited through the command line prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    FilePath,
    CheckChars,
    Encoding,
    Separator,
    SwapOut,
    SwapIn,
    ExportSeparator,
    ExportDir,
}

impl CMDMode {
    pub fn label(&self) -> &'static str {
        match self {
            CMDMode::FilePath => "File path",
            CMDMode::CheckChars => "Characters to check for",
            CMDMode::Encoding => "File encoding",
            CMDMode::Separator => "csv separator",
            CMDMode::SwapOut => "String to swap out",
            CMDMode::SwapIn => "String to swap in",
            CMDMode::ExportSeparator => "Export separator",
            CMDMode::ExportDir => "Export directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Help,
    Exit,
    NextTab,
    PrevTab,
    MoveUp,
    MoveDown,
    Enter,
    ChooseFile,
    Reload,
    Drop,
    Analyze,
    EditCheck,
    EditEncoding,
    EditSeparator,
    ToggleHeader,
    ToggleUnnamed,
    ToggleLinebreaks,
    EditSwapOut,
    EditSwapIn,
    EditExportSeparator,
    EditExportDir,
    Export,
    CopyRow,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
Tabs          <Tab> / <Shift-Tab>
Quit          q
Help          ?
Close popup   <Esc>

Main
  o  choose file        r  reload file       d  drop file
  e  file encoding      s  csv separator     h  toggle header row
  u  toggle suppress unnamed columns
  l  toggle replace line breaks
  c  characters to check for (separate multiple with a space)
  a  analyze file
  <Up>/<Down> select column, <Enter> preview matching rows

Data Preview
  <Up>/<Down> select row, y copy row to clipboard

Export
  w  string to swap out    i  string to swap in
  p  export separator      g  export directory
  x  swap string and save file
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_setters_chain() {
        let cfg = CCConfig::default()
            .preview_rows(3)
            .check_input("; |")
            .has_header(false);
        assert_eq!(cfg.preview_rows, 3);
        assert_eq!(cfg.check_input, "; |");
        assert!(!cfg.has_header);
        assert_eq!(cfg.swap_in, DEFAULT_SWAP_IN);
    }

    #[test]
    fn errors_render_underlying_text() {
        let e = CCError::from(Error::new(std::io::ErrorKind::Other, "disk on fire"));
        assert!(e.to_string().contains("disk on fire"));
        let e = CCError::Busy(JobKind::Scan);
        assert_eq!(e.to_string(), "An analysis is still running, please wait.");
    }
}
