use polars::prelude::*;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

use crate::domain::{CCConfig, CCError};
use crate::encoding::FileEncoding;
use crate::export::{ExportJob, ExportRequest};
use crate::matcher::MatchSet;
use crate::scan::{self, ScanResult};

const UNNAMED_PREFIX: &str = "Unnamed:";

/// Everything that decides how a file is turned into a table.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub separator: String,
    pub encoding: FileEncoding,
    pub has_header: bool,
    pub suppress_unnamed: bool,
    pub replace_linebreaks: bool,
    pub chunk_size: usize,
}

impl LoadOptions {
    pub fn from_config(cfg: &CCConfig) -> Self {
        LoadOptions {
            separator: cfg.separator.clone(),
            encoding: FileEncoding::resolve(&cfg.encoding),
            has_header: cfg.has_header,
            suppress_unnamed: cfg.suppress_unnamed,
            replace_linebreaks: cfg.replace_linebreaks,
            chunk_size: cfg.chunk_size,
        }
    }
}

/// The separator has to be exactly one single byte character.
pub fn parse_separator(separator: &str) -> Result<u8, CCError> {
    let mut chars = separator.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(CCError::InvalidSeparator(separator.to_string())),
    }
}

/// A table together with the options it was read with.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub df: Arc<DataFrame>,
    pub path: PathBuf,
    pub options: LoadOptions,
}

impl LoadedTable {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string()
    }
}

/// Owns the one loaded table and everything derived from it.
///
/// Created once at start up and handed to whoever needs it. There is no
/// implicit re-initialisation, `reset` restores the start up defaults.
pub struct TableHandler {
    defaults: LoadOptions,
    default_check_input: String,
    options: LoadOptions,
    path: Option<PathBuf>,
    table: Option<LoadedTable>,
    check_input: String,
    match_set: MatchSet,
    scan: Option<ScanResult>,
}

impl TableHandler {
    pub fn new(options: LoadOptions, check_input: &str) -> Result<Self, CCError> {
        let match_set = MatchSet::compile(check_input)?;
        Ok(TableHandler {
            defaults: options.clone(),
            default_check_input: check_input.to_string(),
            options,
            path: None,
            table: None,
            check_input: check_input.to_string(),
            match_set,
            scan: None,
        })
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut LoadOptions {
        &mut self.options
    }

    /// Returns the encoding that is actually used, which is latin_1 for
    /// unknown names.
    pub fn set_encoding(&mut self, name: &str) -> FileEncoding {
        self.options.encoding = FileEncoding::resolve(name);
        self.options.encoding
    }

    pub fn set_separator(&mut self, separator: &str) -> Result<(), CCError> {
        parse_separator(separator)?;
        self.options.separator = separator.to_string();
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn table(&self) -> Option<&LoadedTable> {
        self.table.as_ref()
    }

    /// (rows, columns) of the loaded table.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.table.as_ref().map(|t| t.df.shape())
    }

    pub fn check_input(&self) -> &str {
        &self.check_input
    }

    pub fn match_set(&self) -> &MatchSet {
        &self.match_set
    }

    /// Recompiles the match set. On error the previous set stays active.
    pub fn set_check_input(&mut self, raw: &str) -> Result<(), CCError> {
        self.match_set = MatchSet::compile(raw)?;
        self.check_input = raw.to_string();
        Ok(())
    }

    pub fn scan_result(&self) -> Option<&ScanResult> {
        self.scan.as_ref()
    }

    pub fn apply_scan(&mut self, result: ScanResult) {
        self.scan = Some(result);
    }

    /// Loads `path` and makes it the current file. A failed load leaves
    /// the previous path, table and scan result untouched.
    pub fn load_from(&mut self, path: PathBuf) -> Result<(usize, usize), CCError> {
        let df = read_table(&path, &self.options)?;
        let shape = df.shape();
        self.table = Some(LoadedTable {
            df: Arc::new(df),
            path: path.clone(),
            options: self.options.clone(),
        });
        self.path = Some(path);
        self.scan = None;
        Ok(shape)
    }

    pub fn reload(&mut self) -> Result<(usize, usize), CCError> {
        match self.path.clone() {
            Some(path) => self.load_from(path),
            None => Err(CCError::NoFile),
        }
    }

    pub fn drop_table(&mut self) -> Result<(), CCError> {
        if self.path.is_none() {
            return Err(CCError::NoFile);
        }
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        debug!("Resetting table handler");
        self.options = self.defaults.clone();
        self.path = None;
        self.table = None;
        self.scan = None;
        self.check_input = self.default_check_input.clone();
        self.match_set = MatchSet::compile(&self.default_check_input).unwrap_or_default();
    }

    /// Clones out what a background scan needs.
    pub fn scan_input(&self) -> Result<(Arc<DataFrame>, MatchSet), CCError> {
        let table = self.table.as_ref().ok_or(CCError::NoFile)?;
        Ok((Arc::clone(&table.df), self.match_set.clone()))
    }

    pub fn preview(&self, column: &str, rows: usize) -> Result<DataFrame, CCError> {
        let table = self.table.as_ref().ok_or(CCError::NoFile)?;
        scan::preview_rows(&table.df, &self.match_set, column, rows)
    }

    pub fn export_job(&self, request: ExportRequest) -> Result<ExportJob, CCError> {
        let table = self.table.as_ref().ok_or(CCError::NoFile)?;
        Ok(ExportJob::new(table, request))
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, CCError> {
    let map_err = |e: std::io::Error| match e.kind() {
        ErrorKind::NotFound => CCError::FileNotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => CCError::PermissionDenied(path.to_path_buf()),
        _ => CCError::IoError(e),
    };
    let metadata = fs::metadata(path).map_err(map_err)?;
    if !metadata.is_file() {
        return Err(CCError::NotAFile(path.to_path_buf()));
    }
    fs::read(path).map_err(map_err)
}

/// Reads a delimited file into a table where every column is text.
#[instrument(skip(options), fields(encoding = options.encoding.name()))]
pub fn read_table(path: &Path, options: &LoadOptions) -> Result<DataFrame, CCError> {
    let start_time = Instant::now();
    let separator = parse_separator(&options.separator)?;
    let bytes = read_bytes(path)?;
    if bytes.is_empty() {
        return Err(CCError::LoadingFailed("File is empty.".into()));
    }
    let text = options.encoding.decode(&bytes)?;

    // Header handling is done here instead of in polars, so blank and
    // duplicate names can be resolved.
    let parse_options = CsvParseOptions::default()
        .with_separator(separator)
        .with_missing_is_null(true);
    let read_options = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .with_chunk_size(options.chunk_size.max(1))
        .with_parse_options(parse_options);
    let raw = CsvReader::new(Cursor::new(text.into_owned().into_bytes()))
        .with_options(read_options)
        .finish()?;

    let mut values = raw
        .get_columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>, PolarsError>>()?;
    drop_empty_rows(&mut values);

    let names = if options.has_header {
        let header = values
            .iter_mut()
            .enumerate()
            .map(|(idx, column)| match column.first_mut().and_then(Option::take) {
                Some(name) if !name.is_empty() => name,
                _ => format!("{UNNAMED_PREFIX} {idx}"),
            })
            .collect::<Vec<String>>();
        for column in values.iter_mut() {
            if !column.is_empty() {
                column.remove(0);
            }
        }
        dedupe_names(header)
    } else {
        (0..values.len()).map(|idx| idx.to_string()).collect()
    };

    let columns = names
        .into_iter()
        .zip(values)
        .filter(|(name, _)| {
            let unnamed = options.has_header && name.starts_with(UNNAMED_PREFIX);
            if unnamed && options.suppress_unnamed {
                trace!("Suppressing column \"{name}\"");
                return false;
            }
            true
        })
        .map(|(name, mut data)| {
            if options.replace_linebreaks {
                for value in data.iter_mut().flatten() {
                    if value.contains(['\n', '\r']) {
                        *value = value.replace(['\n', '\r'], "");
                    }
                }
            }
            Column::new(name.into(), data)
        })
        .collect::<Vec<Column>>();

    let df = DataFrame::new(columns)?;
    info!(
        "Loading {} took {}ms, {:?}",
        path.display(),
        start_time.elapsed().as_millis(),
        df.shape()
    );
    Ok(df)
}

fn column_values(column: &Column) -> Result<Vec<Option<String>>, PolarsError> {
    let column = column.cast(&DataType::String)?;
    let series = column.str()?;
    Ok(series
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

// Blank lines come back from the parser as rows without any value.
fn drop_empty_rows(values: &mut [Vec<Option<String>>]) {
    let height = values.first().map(Vec::len).unwrap_or(0);
    let keep = (0..height)
        .map(|row| values.iter().any(|column| column[row].is_some()))
        .collect::<Vec<bool>>();
    if keep.iter().all(|k| *k) {
        return;
    }
    trace!("Dropping {} empty rows", keep.iter().filter(|k| !**k).count());
    for column in values.iter_mut() {
        let mut flags = keep.iter();
        column.retain(|_| flags.next().copied().unwrap_or(true));
    }
}

/// Repeated names get a `.1`, `.2`, ... suffix.
fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut counter = 1;
        while seen.contains(&candidate) {
            candidate = format!("{name}.{counter}");
            counter += 1;
        }
        seen.push(candidate);
    }
    seen
}

/// Renders a table as rows of optional cell text, nulls stay `None`.
pub fn text_rows(df: &DataFrame) -> Result<Vec<Vec<Option<String>>>, CCError> {
    let columns = df
        .get_columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>, PolarsError>>()?;
    Ok((0..df.height())
        .map(|row| columns.iter().map(|c| c[row].clone()).collect())
        .collect())
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    fn options() -> LoadOptions {
        LoadOptions::from_config(&CCConfig::default())
    }

    fn column(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        column_values(df.column(name).unwrap()).unwrap()
    }

    #[test]
    fn separator_must_be_single_ascii_char() {
        assert_eq!(parse_separator(";").unwrap(), b';');
        assert_eq!(parse_separator("\t").unwrap(), b'\t');
        assert!(parse_separator("").is_err());
        assert!(parse_separator(";;").is_err());
        assert!(parse_separator("\u{a7}").is_err());
    }

    #[test]
    fn loads_everything_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"A,B\n1,\"x,y\"\n2.5,\n");
        let df = read_table(&path, &options()).unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(column(&df, "A"), vec![Some("1".into()), Some("2.5".into())]);
        assert_eq!(column(&df, "B"), vec![Some("x,y".into()), None]);
        for c in df.get_columns() {
            assert_eq!(c.dtype(), &DataType::String);
        }
    }

    #[test]
    fn blank_lines_are_not_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"A,B\n\n1,2\n\n3,4\n\n");
        let df = read_table(&path, &options()).unwrap();
        assert_eq!(df.shape(), (2, 2));
        assert_eq!(column(&df, "A"), vec![Some("1".into()), Some("3".into())]);
        assert_eq!(column(&df, "B"), vec![Some("2".into()), Some("4".into())]);

        let path = write_file(dir.path(), "u.csv", b"A,B\nx,y\nz,w\n\n");
        let mut handler = TableHandler::new(options(), "x").unwrap();
        assert_eq!(handler.load_from(path).unwrap(), (2, 2));
        let (df, set) = handler.scan_input().unwrap();
        let result = scan::scan_columns(&df, &set).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("A").unwrap().percentage, "50.00%");
    }

    #[test]
    fn headerless_columns_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"a;b\nc;d\n");
        let mut opts = options();
        opts.has_header = false;
        opts.separator = ";".into();
        let df = read_table(&path, &opts).unwrap();
        assert_eq!(column_names(&df), vec!["0", "1"]);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn unnamed_and_duplicate_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"a,,a\n1,2,3\n");
        let mut opts = options();
        let df = read_table(&path, &opts).unwrap();
        assert_eq!(column_names(&df), vec!["a", "a.1"]);

        opts.suppress_unnamed = false;
        let df = read_table(&path, &opts).unwrap();
        assert_eq!(column_names(&df), vec!["a", "Unnamed: 1", "a.1"]);
    }

    #[test]
    fn linebreaks_are_stripped_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"A\n\"x\r\ny\"\n");
        let mut opts = options();
        let df = read_table(&path, &opts).unwrap();
        assert_eq!(column(&df, "A"), vec![Some("xy".into())]);

        opts.replace_linebreaks = false;
        let df = read_table(&path, &opts).unwrap();
        assert_eq!(column(&df, "A"), vec![Some("x\r\ny".into())]);
    }

    #[test]
    fn decodes_with_chosen_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"name\ncaf\xe9\n");
        let df = read_table(&path, &options()).unwrap();
        assert_eq!(column(&df, "name"), vec![Some("caf\u{e9}".into())]);

        let mut opts = options();
        opts.encoding = FileEncoding::resolve("utf-8");
        assert!(matches!(
            read_table(&path, &opts),
            Err(CCError::Decode { .. })
        ));
    }

    #[test]
    fn path_errors_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_table(&dir.path().join("missing.csv"), &options()),
            Err(CCError::FileNotFound(_))
        ));
        assert!(matches!(
            read_table(dir.path(), &options()),
            Err(CCError::NotAFile(_))
        ));
        let empty = write_file(dir.path(), "empty.csv", b"");
        assert!(matches!(
            read_table(&empty, &options()),
            Err(CCError::LoadingFailed(_))
        ));
    }

    #[test]
    fn failed_load_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(dir.path(), "good.csv", b"A\nx,y\n");
        let mut handler = TableHandler::new(options(), "x").unwrap();
        handler.options_mut().separator = ";".into();
        assert_eq!(handler.load_from(good.clone()).unwrap(), (1, 1));
        handler.apply_scan(ScanResult::default());

        let err = handler.load_from(dir.path().join("nope.csv"));
        assert!(err.is_err());
        assert_eq!(handler.path(), Some(good.as_path()));
        assert_eq!(handler.shape(), Some((1, 1)));
        assert!(handler.scan_result().is_some());
    }

    #[test]
    fn reload_picks_up_changes_and_clears_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"A\n1\n");
        let mut handler = TableHandler::new(options(), ",").unwrap();
        assert!(matches!(handler.reload(), Err(CCError::NoFile)));
        handler.load_from(path.clone()).unwrap();
        handler.apply_scan(ScanResult::default());

        write_file(dir.path(), "t.csv", b"A\n1\n2\n");
        assert_eq!(handler.reload().unwrap(), (2, 1));
        assert!(handler.scan_result().is_none());
    }

    #[test]
    fn drop_resets_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", b"A\n1\n");
        let mut handler = TableHandler::new(options(), ",").unwrap();
        assert!(matches!(handler.drop_table(), Err(CCError::NoFile)));

        handler.load_from(path).unwrap();
        handler.set_check_input("; |").unwrap();
        handler.set_encoding("utf_8");
        handler.drop_table().unwrap();
        assert!(handler.path().is_none());
        assert!(handler.table().is_none());
        assert_eq!(handler.check_input(), ",");
        assert_eq!(handler.options(), &options());
    }

    #[test]
    fn check_input_recompiles_match_set() {
        let mut handler = TableHandler::new(options(), ",").unwrap();
        handler.set_check_input("; ;").unwrap();
        assert_eq!(handler.match_set().targets(), &[";".to_string()]);
        handler.set_check_input("").unwrap();
        assert!(handler.match_set().is_empty());
    }
}
