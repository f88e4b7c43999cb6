use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use flate2::read::MultiGzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::{RecordIssue, RegistryError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where a logical field comes from: a 1-based column, or another field's
/// extracted value (the reserved sentinel, used for alias-defaults-to-symbol).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    Column(usize),
    SameAs(&'static str),
}

/// Parse a 1-based column index supplied by an operator. Zero, negative and
/// non-numeric values are configuration errors, caught before any read.
pub fn parse_column_index(field: &'static str, raw: &str) -> Result<usize, RegistryError> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 1 => Ok(value as usize),
        _ => Err(RegistryError::InvalidColumn {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Parse a column argument that accepts the sentinel: `-` or blank means
/// "reuse `fallback`'s value".
pub fn parse_column_source(
    field: &'static str,
    raw: &str,
    fallback: &'static str,
) -> Result<ColumnSource, RegistryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(ColumnSource::SameAs(fallback));
    }
    parse_column_index(field, trimmed).map(ColumnSource::Column)
}

/// Mapping from logical field name to column source. Field order is the
/// declaration order; `SameAs` targets must be declared fields.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    fields: Vec<(&'static str, ColumnSource)>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, field: &'static str, index: usize) -> Self {
        self.fields.push((field, ColumnSource::Column(index)));
        self
    }

    pub fn source(mut self, field: &'static str, source: ColumnSource) -> Self {
        self.fields.push((field, source));
        self
    }

    /// Configuration-time validation: indices are 1-based and sentinel
    /// targets resolve to a column-backed field.
    pub fn validated(self) -> Result<Self, RegistryError> {
        for (field, source) in &self.fields {
            match source {
                ColumnSource::Column(index) => {
                    if *index < 1 {
                        return Err(RegistryError::InvalidColumn {
                            field,
                            value: index.to_string(),
                        });
                    }
                }
                ColumnSource::SameAs(target) => {
                    let resolvable = self
                        .fields
                        .iter()
                        .any(|(name, src)| name == target && matches!(src, ColumnSource::Column(_)));
                    if !resolvable {
                        return Err(RegistryError::Configuration(format!(
                            "field {field:?} copies unknown field {target:?}"
                        )));
                    }
                }
            }
        }
        Ok(self)
    }

    fn extract(&self, line_no: u64, columns: &[&str]) -> Result<Record, RecordIssue> {
        let mut values: HashMap<&'static str, String> = HashMap::with_capacity(self.fields.len());
        for (field, source) in &self.fields {
            if let ColumnSource::Column(index) = source {
                let value = columns.get(index - 1).ok_or_else(|| RecordIssue::Malformed {
                    line: line_no,
                    reason: format!(
                        "field {field:?} needs column {index} but line has {} columns",
                        columns.len()
                    ),
                })?;
                values.insert(field, value.to_string());
            }
        }
        for (field, source) in &self.fields {
            if let ColumnSource::SameAs(target) = source {
                let value = values.get(target).cloned().unwrap_or_default();
                values.insert(field, value);
            }
        }
        Ok(Record { line: line_no, values })
    }
}

/// One parsed line: logical field name to raw string value.
#[derive(Debug, Clone)]
pub struct Record {
    line: u64,
    values: HashMap<&'static str, String>,
}

impl Record {
    /// 1-based line number in the source, counting skipped lines.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, field: &'static str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    /// Numeric field accessor; a non-numeric value is a malformed record,
    /// not a run failure.
    pub fn get_i64(&self, field: &'static str) -> Result<i64, RecordIssue> {
        let raw = self.get(field);
        raw.trim().parse::<i64>().map_err(|_| RecordIssue::Malformed {
            line: self.line,
            reason: format!("field {field:?} is not numeric: {raw:?}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Whitespace,
}

/// Line-level conventions of a source file.
#[derive(Debug, Clone, Copy)]
pub struct LineFormat {
    pub delimiter: Delimiter,
    pub comment: char,
}

impl Default for LineFormat {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Tab,
            comment: '#',
        }
    }
}

/// A text source: local path or remote URL, either optionally gzipped.
#[derive(Debug, Clone)]
pub enum InputSource {
    Path(Utf8PathBuf),
    Url(String),
}

impl InputSource {
    pub fn describe(&self) -> String {
        match self {
            InputSource::Path(path) => path.to_string(),
            InputSource::Url(url) => url.clone(),
        }
    }

    pub fn open(&self) -> Result<Box<dyn BufRead + Send>, RegistryError> {
        let raw: Box<dyn Read + Send> = match self {
            InputSource::Path(path) => {
                let file = File::open(path.as_std_path()).map_err(|err| {
                    RegistryError::SourceOpen {
                        source_name: path.to_string(),
                        message: err.to_string(),
                    }
                })?;
                Box::new(file)
            }
            InputSource::Url(url) => Box::new(fetch_url(url)?),
        };
        maybe_gunzip(raw).map_err(|err| RegistryError::SourceOpen {
            source_name: self.describe(),
            message: err.to_string(),
        })
    }
}

/// Sniff the gzip magic bytes and decode transparently when present. A
/// network stream may hand out fewer bytes per read than asked for, so keep
/// reading until the two-byte header is complete or the stream ends.
fn maybe_gunzip(mut reader: Box<dyn Read + Send>) -> io::Result<Box<dyn BufRead + Send>> {
    let mut head = [0u8; 2];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let rejoined = io::Cursor::new(head[..filled].to_vec()).chain(reader);
    if head[..filled] == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(rejoined))))
    } else {
        Ok(Box::new(BufReader::new(rejoined)))
    }
}

fn fetch_url(url: &str) -> Result<reqwest::blocking::Response, RegistryError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("gene-registry/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| RegistryError::Http(err.to_string()))?,
    );
    let client = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|err| RegistryError::Http(err.to_string()))?;

    let response = send_with_retries(|| client.get(url))?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        return Err(RegistryError::HttpStatus {
            status,
            message: format!("fetching {url}"),
        });
    }
    Ok(response)
}

fn send_with_retries<F>(mut make_req: F) -> Result<reqwest::blocking::Response, RegistryError>
where
    F: FnMut() -> reqwest::blocking::RequestBuilder,
{
    const MAX_RETRIES: usize = 3;
    const BASE_DELAY_MS: u64 = 200;
    let mut attempt = 0usize;
    loop {
        match make_req().send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if attempt < MAX_RETRIES && is_retryable_status(status) {
                    thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                    attempt += 1;
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if attempt < MAX_RETRIES && is_retryable_error(&err) {
                    thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                    attempt += 1;
                    continue;
                }
                return Err(RegistryError::Http(err.to_string()));
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// A successfully read line: either a structured record or a per-record
/// skip the caller tallies.
#[derive(Debug)]
pub enum Parsed {
    Record(Record),
    Skipped(RecordIssue),
}

/// Lazy record sequence over a delimited text source. Finite and not
/// restartable mid-stream; re-invoke from the start to retry a run.
pub struct Records {
    reader: Box<dyn BufRead + Send>,
    map: ColumnMap,
    format: LineFormat,
    line_no: u64,
    buffer: String,
}

impl Records {
    pub fn open(
        source: &InputSource,
        map: ColumnMap,
        format: LineFormat,
    ) -> Result<Self, RegistryError> {
        let map = map.validated()?;
        let reader = source.open()?;
        Ok(Self::from_reader(reader, map, format))
    }

    pub fn from_reader(
        reader: Box<dyn BufRead + Send>,
        map: ColumnMap,
        format: LineFormat,
    ) -> Self {
        Self {
            reader,
            map,
            format,
            line_no: 0,
            buffer: String::new(),
        }
    }
}

impl Iterator for Records {
    type Item = Result<Parsed, RegistryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    return Some(Err(RegistryError::SourceOpen {
                        source_name: format!("line {}", self.line_no + 1),
                        message: err.to_string(),
                    }));
                }
            }
            self.line_no += 1;

            let line = self.buffer.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with(self.format.comment) {
                continue;
            }

            let columns: Vec<&str> = match self.format.delimiter {
                Delimiter::Tab => line.split('\t').collect(),
                Delimiter::Whitespace => line.split_whitespace().collect(),
            };
            return Some(Ok(match self.map.extract(self.line_no, &columns) {
                Ok(record) => Parsed::Record(record),
                Err(issue) => Parsed::Skipped(issue),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn records_from(text: &str, map: ColumnMap, format: LineFormat) -> Records {
        let reader: Box<dyn BufRead + Send> = Box::new(io::Cursor::new(text.to_string()));
        Records::from_reader(reader, map.validated().unwrap(), format)
    }

    #[test]
    fn reject_zero_column_index() {
        let err = parse_column_index("symbol_col", "0").unwrap_err();
        assert_matches!(err, RegistryError::InvalidColumn { field: "symbol_col", .. });
    }

    #[test]
    fn reject_non_numeric_column_index() {
        let err = parse_column_index("symbol_col", "two").unwrap_err();
        assert_matches!(err, RegistryError::InvalidColumn { .. });
    }

    #[test]
    fn sentinel_selects_fallback_field() {
        let source = parse_column_source("alias_col", "-", "symbol").unwrap();
        assert_eq!(source, ColumnSource::SameAs("symbol"));
        let source = parse_column_source("alias_col", " ", "symbol").unwrap();
        assert_eq!(source, ColumnSource::SameAs("symbol"));
        let source = parse_column_source("alias_col", "4", "symbol").unwrap();
        assert_eq!(source, ColumnSource::Column(4));
    }

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let map = ColumnMap::new().column("symbol", 1);
        let mut records = records_from("#header\n\nABC1\n", map, LineFormat::default());
        let parsed = records.next().unwrap().unwrap();
        assert_matches!(parsed, Parsed::Record(record) if record.get("symbol") == "ABC1");
        assert!(records.next().is_none());
    }

    #[test]
    fn short_line_fails_only_that_record() {
        let map = ColumnMap::new().column("symbol", 2);
        let mut records = records_from("lonely\nok\tABC1\n", map, LineFormat::default());
        let first = records.next().unwrap().unwrap();
        assert_matches!(first, Parsed::Skipped(RecordIssue::Malformed { line: 1, .. }));
        let second = records.next().unwrap().unwrap();
        assert_matches!(second, Parsed::Record(record) if record.get("symbol") == "ABC1");
    }

    #[test]
    fn blank_trailing_columns_read_as_empty() {
        let map = ColumnMap::new().column("symbol", 2);
        let mut records = records_from("x\t\n", map, LineFormat::default());
        let parsed = records.next().unwrap().unwrap();
        assert_matches!(parsed, Parsed::Record(record) if record.get("symbol").is_empty());
    }

    #[test]
    fn same_as_copies_resolved_value() {
        let map = ColumnMap::new()
            .column("symbol", 1)
            .source("alias", ColumnSource::SameAs("symbol"));
        let mut records = records_from("ABC1\n", map, LineFormat::default());
        let parsed = records.next().unwrap().unwrap();
        assert_matches!(parsed, Parsed::Record(record) if record.get("alias") == "ABC1");
    }

    #[test]
    fn same_as_unknown_target_is_config_error() {
        let map = ColumnMap::new().source("alias", ColumnSource::SameAs("symbol"));
        let err = map.validated().unwrap_err();
        assert_matches!(err, RegistryError::Configuration(_));
    }

    #[test]
    fn gzip_is_sniffed_by_magic_bytes() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"9606\t100\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let reader: Box<dyn Read + Send> = Box::new(io::Cursor::new(compressed));
        let mut decoded = maybe_gunzip(reader).unwrap();
        let mut text = String::new();
        decoded.read_to_string(&mut text).unwrap();
        assert_eq!(text, "9606\t100\n");
    }

    /// Yields at most one byte per read call, like a slow network stream.
    struct OneByteReads(io::Cursor<Vec<u8>>);

    impl Read for OneByteReads {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn gzip_detection_survives_short_reads() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"9606\t100\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let reader: Box<dyn Read + Send> =
            Box::new(OneByteReads(io::Cursor::new(compressed)));
        let mut decoded = maybe_gunzip(reader).unwrap();
        let mut text = String::new();
        decoded.read_to_string(&mut text).unwrap();
        assert_eq!(text, "9606\t100\n");
    }
}
