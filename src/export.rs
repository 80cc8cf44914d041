use chrono::{Local, NaiveDateTime};
use polars::prelude::*;
use rayon::prelude::*;
use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::domain::CCError;
use crate::encoding::FileEncoding;
use crate::table::{LoadedTable, parse_separator};

const TIMESTAMP_FORMAT: &str = "%Y_%m_%d %H_%M_%S";

/// What the user asked for on the export tab.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub directory: PathBuf,
    pub separator: String,
    pub swap_out: String,
    pub swap_in: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub rows: usize,
    pub changed_cells: usize,
}

/// Replaces every literal occurrence of `swap_out` with `swap_in` in every
/// cell. `swap_in` is inserted as is, no capture group expansion.
///
/// Returns the new table and the number of cells that changed.
pub fn transform(
    df: &DataFrame,
    swap_out: &str,
    swap_in: &str,
) -> Result<(DataFrame, usize), CCError> {
    if swap_out.is_empty() {
        return Err(CCError::EmptyReplaceTarget);
    }
    let re = Regex::new(&regex::escape(swap_out))?;

    let replaced = df
        .get_columns()
        .par_iter()
        .map(|column| -> Result<(Column, usize), PolarsError> {
            let values = column.cast(&DataType::String)?;
            let mut changed = 0;
            let data = values
                .str()?
                .into_iter()
                .map(|value| {
                    value.map(|s| match re.replace_all(s, NoExpand(swap_in)) {
                        Cow::Borrowed(unchanged) => unchanged.to_string(),
                        Cow::Owned(swapped) => {
                            changed += 1;
                            swapped
                        }
                    })
                })
                .collect::<Vec<Option<String>>>();
            Ok((Column::new(column.name().clone(), data), changed))
        })
        .collect::<Result<Vec<_>, PolarsError>>()?;

    let changed_cells = replaced.iter().map(|(_, changed)| changed).sum();
    let columns = replaced.into_iter().map(|(column, _)| column).collect();
    Ok((DataFrame::new(columns)?, changed_cells))
}

/// `{stem}_{timestamp}{suffix}` of the source file.
pub fn export_file_name(source: &Path, at: &NaiveDateTime) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or(Cow::Borrowed("export"));
    let suffix = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("{stem}_{}{suffix}", at.format(TIMESTAMP_FORMAT))
}

/// Serialises with minimal quoting and writes to a file that must not exist yet.
pub fn write_table(
    df: &mut DataFrame,
    path: &Path,
    separator: u8,
    include_header: bool,
    encoding: FileEncoding,
) -> Result<(), CCError> {
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(include_header)
        .with_separator(separator)
        .with_quote_char(b'"')
        .with_quote_style(QuoteStyle::Necessary)
        .finish(df)?;
    let text = String::from_utf8_lossy(&buffer);
    let bytes = encoding.encode(&text)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => CCError::ExportCollision(path.to_path_buf()),
            ErrorKind::PermissionDenied => CCError::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => CCError::NotADirectory(path.to_path_buf()),
            _ => CCError::IoError(e),
        })?;
    file.write_all(&bytes)?;
    Ok(())
}

/// A self contained export that can be moved to the worker.
#[derive(Debug)]
pub struct ExportJob {
    table: Arc<DataFrame>,
    source: PathBuf,
    has_header: bool,
    encoding: FileEncoding,
    request: ExportRequest,
}

impl ExportJob {
    pub fn new(table: &LoadedTable, request: ExportRequest) -> Self {
        ExportJob {
            table: Arc::clone(&table.df),
            source: table.path.clone(),
            has_header: table.options.has_header,
            encoding: table.options.encoding,
            request,
        }
    }

    pub fn run(self) -> Result<ExportReport, CCError> {
        self.run_at(&Local::now().naive_local())
    }

    #[instrument(skip_all, fields(dir = %self.request.directory.display()))]
    pub fn run_at(self, at: &NaiveDateTime) -> Result<ExportReport, CCError> {
        let start_time = Instant::now();
        let separator = parse_separator(&self.request.separator)?;
        let directory = &self.request.directory;
        match fs::metadata(directory) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(CCError::NotADirectory(directory.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CCError::NotADirectory(directory.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let (mut transformed, changed_cells) =
            transform(&self.table, &self.request.swap_out, &self.request.swap_in)?;
        debug!("Swapped out {changed_cells} cells");

        let path = directory.join(export_file_name(&self.source, at));
        write_table(
            &mut transformed,
            &path,
            separator,
            self.has_header,
            self.encoding,
        )?;
        info!(
            "Exported {} in {}ms",
            path.display(),
            start_time.elapsed().as_millis()
        );
        Ok(ExportReport {
            path,
            rows: transformed.height(),
            changed_cells,
        })
    }
}
