// 🏗️ CSV Parser - bytes → rows
// Encoding sniffing, delimiter sniffing, header-keyed rows with source row numbers

use crate::error::{IngestError, Result};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Candidate delimiters, in tie-break order
pub const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Maximum bytes sampled for encoding detection
pub const ENCODING_SAMPLE_SIZE: usize = 10_000;

/// Maximum characters sampled for delimiter sniffing
pub const DELIMITER_SAMPLE_CHARS: usize = 8192;

/// File extensions accepted by `parse_file` / `iter_file`
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "txt", "tsv"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// CORE TYPES
// ============================================================================

/// ParsedRow - one data line keyed by header name
///
/// `row_number` is the 1-based line position in the source file counting the
/// header as row 1, so the first data row is row 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    pub row_number: usize,
    pub fields: Vec<(String, Option<String>)>,
}

impl ParsedRow {
    pub fn new(row_number: usize, fields: Vec<(String, Option<String>)>) -> Self {
        ParsedRow { row_number, fields }
    }

    /// Value of the first column with this exact header name
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    /// True when every field is null or empty
    pub fn is_blank(&self) -> bool {
        self.fields
            .iter()
            .all(|(_, value)| value.as_deref().map_or(true, str::is_empty))
    }
}

/// Parser configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Field delimiter (auto-detected if None)
    pub delimiter: Option<char>,
    /// Encoding label (auto-detected if None)
    pub encoding: Option<String>,
    pub skip_blank_rows: bool,
    pub strip_values: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            delimiter: None,
            encoding: None,
            skip_blank_rows: true,
            strip_values: true,
        }
    }
}

/// What the parser saw during its last run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub headers: Vec<String>,
    /// Data rows read, including skipped blank rows
    pub row_count: usize,
}

// ============================================================================
// CSV PARSER
// ============================================================================

pub struct CsvParser {
    options: ParserOptions,
    metadata: ParseMetadata,
}

impl CsvParser {
    pub fn new(options: ParserOptions) -> Self {
        CsvParser {
            options,
            metadata: ParseMetadata::default(),
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn metadata(&self) -> &ParseMetadata {
        &self.metadata
    }

    /// Parse a delimited text file from disk
    pub fn parse_file(&mut self, file_path: &Path) -> Result<Vec<ParsedRow>> {
        check_source_path(file_path)?;

        let data = std::fs::read(file_path).map_err(|e| {
            IngestError::parse(format!("Failed to read file {}: {}", file_path.display(), e))
        })?;

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.csv");

        self.parse_bytes(&data, filename)
    }

    /// Parse raw bytes, detecting the encoding unless one was configured
    pub fn parse_bytes(&mut self, data: &[u8], filename: &str) -> Result<Vec<ParsedRow>> {
        let (encoding, encoding_name) = self.resolve_encoding(data)?;
        self.metadata.encoding = Some(encoding_name.clone());

        let text = decode_all(data, encoding).ok_or_else(|| {
            IngestError::parse(format!(
                "Failed to decode {} with {}: invalid byte sequence",
                filename, encoding_name
            ))
        })?;

        self.parse_str(&text)
    }

    /// Parse already-decoded text
    pub fn parse_str(&mut self, text: &str) -> Result<Vec<ParsedRow>> {
        let delimiter = self.resolve_delimiter(text)?;
        self.metadata.delimiter = Some(delimiter as char);
        self.metadata.row_count = 0;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| IngestError::parse(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(clean_header)
            .collect::<Vec<_>>();
        self.metadata.headers = headers.clone();

        let mut rows = Vec::new();

        for (line_num, result) in reader.records().enumerate() {
            // +2 because: 1-indexed + header row
            let row_number = line_num + 2;
            let record = result.map_err(|e| {
                IngestError::parse(format!("Failed to parse CSV row {}: {}", row_number, e))
            })?;
            self.metadata.row_count += 1;

            let values = record.iter().map(Cow::Borrowed).collect::<Vec<_>>();
            let row = shape_row(&headers, &values, row_number, self.options.strip_values);

            if self.options.skip_blank_rows && row.is_blank() {
                continue;
            }

            rows.push(row);
        }

        tracing::debug!(
            rows = rows.len(),
            read = self.metadata.row_count,
            delimiter = ?(delimiter as char),
            "Parsed delimited text"
        );

        Ok(rows)
    }

    /// Stream a file as fixed-size chunks of rows
    ///
    /// Encoding and delimiter are detected once from the first
    /// `ENCODING_SAMPLE_SIZE` bytes. Fields are decoded one at a time, so the
    /// encoding has to be ASCII-compatible.
    pub fn iter_file(&mut self, file_path: &Path, chunk_size: usize) -> Result<RowChunks> {
        check_source_path(file_path)?;

        let mut file = File::open(file_path).map_err(|e| {
            IngestError::parse(format!("Failed to open file {}: {}", file_path.display(), e))
        })?;

        let mut sample = Vec::with_capacity(ENCODING_SAMPLE_SIZE);
        file.by_ref()
            .take(ENCODING_SAMPLE_SIZE as u64)
            .read_to_end(&mut sample)?;

        let (encoding, encoding_name) = self.resolve_encoding(&sample)?;
        if !encoding.is_ascii_compatible() {
            return Err(IngestError::parse(format!(
                "Streaming requires an ASCII-compatible encoding, got {}",
                encoding_name
            )));
        }
        self.metadata.encoding = Some(encoding_name.clone());

        let (sample_text, _) = encoding.decode_without_bom_handling(strip_bom(&sample));
        let delimiter = self.resolve_delimiter(&sample_text)?;
        self.metadata.delimiter = Some(delimiter as char);

        file.seek(SeekFrom::Start(0))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(BufReader::new(file));

        let header_record = reader
            .byte_headers()
            .map_err(|e| IngestError::parse(format!("Failed to read CSV headers: {}", e)))?
            .clone();
        let headers = decode_fields(&header_record, encoding, &encoding_name)?
            .iter()
            .map(|h| clean_header(h))
            .collect::<Vec<_>>();
        self.metadata.headers = headers.clone();
        self.metadata.row_count = 0;

        Ok(RowChunks {
            reader,
            encoding,
            encoding_name,
            headers,
            chunk_size: chunk_size.max(1),
            strip_values: self.options.strip_values,
            skip_blank_rows: self.options.skip_blank_rows,
            next_row_number: 2,
            rows_read: 0,
            done: false,
        })
    }

    fn resolve_encoding(&self, data: &[u8]) -> Result<(&'static Encoding, String)> {
        match &self.options.encoding {
            Some(label) => {
                let encoding = encoding_for_label(label).ok_or_else(|| {
                    IngestError::parse(format!("Unsupported encoding: {}", label))
                })?;
                Ok((encoding, canonical_codec_name(label)))
            }
            None => {
                let encoding = detect_encoding(data);
                tracing::debug!(encoding = encoding.name(), "Detected encoding");
                Ok((encoding, canonical_codec_name(encoding.name())))
            }
        }
    }

    fn resolve_delimiter(&self, text: &str) -> Result<u8> {
        match self.options.delimiter {
            Some(c) if c.is_ascii() => Ok(c as u8),
            Some(c) => Err(IngestError::parse(format!(
                "Delimiter must be a single ASCII character, got {:?}",
                c
            ))),
            None => Ok(detect_delimiter(text)),
        }
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

// ============================================================================
// CHUNKED ITERATION
// ============================================================================

/// Iterator over a file in chunks of `chunk_size` rows
pub struct RowChunks {
    reader: csv::Reader<BufReader<File>>,
    encoding: &'static Encoding,
    encoding_name: String,
    headers: Vec<String>,
    chunk_size: usize,
    strip_values: bool,
    skip_blank_rows: bool,
    next_row_number: usize,
    rows_read: usize,
    done: bool,
}

impl RowChunks {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows read so far, including skipped blank rows
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }
}

impl Iterator for RowChunks {
    type Item = Result<Vec<ParsedRow>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut record = csv::ByteRecord::new();

        while chunk.len() < self.chunk_size {
            match self.reader.read_byte_record(&mut record) {
                Ok(true) => {
                    let row_number = self.next_row_number;
                    self.next_row_number += 1;
                    self.rows_read += 1;

                    let values = match decode_fields(&record, self.encoding, &self.encoding_name) {
                        Ok(values) => values,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    };

                    let row = shape_row(&self.headers, &values, row_number, self.strip_values);
                    if self.skip_blank_rows && row.is_blank() {
                        continue;
                    }
                    chunk.push(row);
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(IngestError::parse(format!(
                        "Failed to parse CSV row {}: {}",
                        self.next_row_number, e
                    ))));
                }
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

// ============================================================================
// DETECTION
// ============================================================================

/// Guess the encoding of a byte stream from its first `ENCODING_SAMPLE_SIZE` bytes
///
/// Valid UTF-8 (including plain ASCII) wins outright; a multi-byte sequence
/// cut off by the sample boundary still counts as UTF-8.
pub fn detect_encoding(data: &[u8]) -> &'static Encoding {
    let end = data.len().min(ENCODING_SAMPLE_SIZE);
    let sample = strip_bom(&data[..end]);

    match std::str::from_utf8(sample) {
        Ok(_) => return UTF_8,
        Err(e) if e.error_len().is_none() => return UTF_8,
        Err(_) => {}
    }

    let mut detector = EncodingDetector::new();
    detector.feed(sample, end == data.len());
    detector.guess(None, true)
}

/// Pick the field delimiter for a block of text
///
/// 1. Sniff: the first candidate that splits the sample into rows of one
///    consistent width (at least two columns) wins.
/// 2. Otherwise count candidates in the first line; the most frequent wins,
///    ties going to the earlier candidate.
/// 3. Otherwise comma.
pub fn detect_delimiter(text: &str) -> u8 {
    let sample = match text.char_indices().nth(DELIMITER_SAMPLE_CHARS) {
        Some((cut, _)) => {
            // Drop the partial last line of a truncated sample
            let head = &text[..cut];
            head.rfind('\n').map_or(head, |pos| &head[..pos])
        }
        None => text,
    };

    if let Some(delimiter) = DELIMITERS
        .iter()
        .copied()
        .find(|&candidate| is_consistent(sample, candidate))
    {
        return delimiter;
    }

    let first_line = text.split('\n').next().unwrap_or("");
    let mut best = b',';
    let mut best_count = 0;
    for candidate in DELIMITERS {
        let count = first_line.bytes().filter(|&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }

    best
}

fn is_consistent(sample: &str, delimiter: u8) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(sample.as_bytes());

    let mut width = None;
    for record in reader.records() {
        let Ok(record) = record else {
            return false;
        };
        match width {
            None if record.len() < 2 => return false,
            None => width = Some(record.len()),
            Some(expected) if expected != record.len() => return false,
            Some(_) => {}
        }
    }

    width.is_some()
}

/// Resolve an encoding label, accepting the Python-style aliases callers send
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().to_ascii_lowercase();
    match label.as_str() {
        "ascii" | "us-ascii" | "utf8" | "utf-8" => Some(UTF_8),
        "latin-1" | "latin_1" | "latin1" | "iso-8859-1" | "cp1252" | "windows-1252" => {
            Some(WINDOWS_1252)
        }
        other => Encoding::for_label(other.as_bytes()),
    }
}

/// Canonical codec name reported in parse metadata
pub fn canonical_codec_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "ascii" | "us-ascii" | "utf8" | "utf-8" => "utf-8".to_string(),
        "iso-8859-1" | "latin1" | "latin_1" | "latin-1" => "latin-1".to_string(),
        "windows-1252" | "cp1252" => "cp1252".to_string(),
        _ => lower,
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn check_source_path(file_path: &Path) -> Result<()> {
    if !file_path.exists() {
        return Err(IngestError::parse(format!(
            "File not found: {}",
            file_path.display()
        )));
    }

    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(IngestError::parse(format!(
            "Unsupported file type: .{}",
            extension
        )));
    }

    Ok(())
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

fn decode_all(data: &[u8], encoding: &'static Encoding) -> Option<String> {
    let body = if encoding == UTF_8 { strip_bom(data) } else { data };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(Cow::into_owned)
}

fn decode_fields<'r>(
    record: &'r csv::ByteRecord,
    encoding: &'static Encoding,
    encoding_name: &str,
) -> Result<Vec<Cow<'r, str>>> {
    record
        .iter()
        .map(|field| {
            encoding
                .decode_without_bom_handling_and_without_replacement(field)
                .ok_or_else(|| {
                    IngestError::parse(format!(
                        "Failed to decode field with {}: invalid byte sequence",
                        encoding_name
                    ))
                })
        })
        .collect()
}

fn clean_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').to_string()
}

/// Pair values with headers; extra values without a header are dropped and
/// missing trailing values become null
fn shape_row<S: AsRef<str>>(
    headers: &[String],
    values: &[S],
    row_number: usize,
    strip_values: bool,
) -> ParsedRow {
    let fields = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let value = values.get(i).and_then(|raw| {
                let raw = raw.as_ref();
                let value = if strip_values { raw.trim() } else { raw };
                if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            });
            (header.clone(), value)
        })
        .collect();

    ParsedRow::new(row_number, fields)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> Vec<ParsedRow> {
        CsvParser::default().parse_str(text).unwrap()
    }

    #[test]
    fn test_parse_simple_csv() {
        let rows = parse("name,value,count\nalice,100,5\nbob,200,10\ncharlie,300,15\n");

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("name"), Some("alice"));
        assert_eq!(rows[0].get("value"), Some("100"));
        assert_eq!(rows[0].get("count"), Some("5"));
        assert_eq!(rows[2].get("name"), Some("charlie"));
    }

    #[test]
    fn test_row_numbers_start_after_header() {
        let rows = parse("name\na\nb\nc\n");
        let numbers: Vec<usize> = rows.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    #[test]
    fn test_blank_row_skipped_but_numbered() {
        let rows = parse("name,value\nalice,100\n,,\nbob,200");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some("alice"));
        assert_eq!(rows[1].get("name"), Some("bob"));
        assert_eq!(rows[1].row_number, 4);
    }

    #[test]
    fn test_blank_rows_kept_when_configured() {
        let mut parser = CsvParser::new(ParserOptions {
            skip_blank_rows: false,
            ..ParserOptions::default()
        });
        let rows = parser.parse_str("name,value\nalice,100\n,\nbob,200\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].is_blank());
    }

    #[test]
    fn test_values_trimmed_and_empty_to_null() {
        let rows = parse("name,value,extra\n  alice  , 100 ,\nbob,,note\n");

        assert_eq!(rows[0].get("name"), Some("alice"));
        assert_eq!(rows[0].get("value"), Some("100"));
        assert_eq!(rows[0].get("extra"), None);
        assert_eq!(rows[1].get("value"), None);
        assert_eq!(rows[1].get("extra"), Some("note"));
    }

    #[test]
    fn test_no_strip_when_disabled() {
        let mut parser = CsvParser::new(ParserOptions {
            strip_values: false,
            ..ParserOptions::default()
        });
        let rows = parser.parse_str("name,value\n  alice  ,  100  \n").unwrap();
        assert_eq!(rows[0].get("name"), Some("  alice  "));
    }

    #[test]
    fn test_ragged_rows() {
        let rows = parse("a,b\n1,2,3\n4\n");

        // Extra unnamed column dropped
        assert_eq!(rows[0].fields.len(), 2);
        assert_eq!(rows[0].get("b"), Some("2"));
        // Missing trailing value is null
        assert_eq!(rows[1].get("a"), Some("4"));
        assert_eq!(rows[1].get("b"), None);
    }

    #[test]
    fn test_detect_delimiters() {
        assert_eq!(detect_delimiter("name,value\nalice,100\n"), b',');
        assert_eq!(detect_delimiter("name;value\nalice;100\n"), b';');
        assert_eq!(detect_delimiter("name\tvalue\nalice\t100\n"), b'\t');
        assert_eq!(detect_delimiter("name|value\nalice|100\n"), b'|');
    }

    #[test]
    fn test_detect_delimiter_fallback_and_default() {
        // Inconsistent widths defeat sniffing; first-line count decides
        assert_eq!(detect_delimiter("a;b;c\n1;2\n"), b';');
        // Nothing to go on
        assert_eq!(detect_delimiter("single\nvalue\n"), b',');
    }

    #[test]
    fn test_explicit_delimiter_override() {
        let mut parser = CsvParser::new(ParserOptions {
            delimiter: Some(';'),
            ..ParserOptions::default()
        });
        let rows = parser.parse_str("name;value\nalice;100\n").unwrap();
        assert_eq!(parser.metadata().delimiter, Some(';'));
        assert_eq!(rows[0].get("name"), Some("alice"));
    }

    #[test]
    fn test_metadata() {
        let mut parser = CsvParser::default();
        parser.parse_bytes(b"name,value\nalice,1\n,\n", "m.csv").unwrap();

        let metadata = parser.metadata();
        assert_eq!(metadata.encoding.as_deref(), Some("utf-8"));
        assert_eq!(metadata.delimiter, Some(','));
        assert_eq!(metadata.headers, vec!["name", "value"]);
        assert_eq!(metadata.row_count, 2);
    }

    #[test]
    fn test_parse_bytes_unicode_and_bom() {
        let mut parser = CsvParser::default();
        let data = "\u{feff}name,city\nalice,Montréal\nbob,São Paulo\n".as_bytes();
        let rows = parser.parse_bytes(data, "cities.csv").unwrap();

        assert_eq!(parser.metadata().headers, vec!["name", "city"]);
        assert_eq!(rows[0].get("city"), Some("Montréal"));
        assert_eq!(rows[1].get("city"), Some("São Paulo"));
    }

    #[test]
    fn test_parse_bytes_explicit_latin1() {
        let mut parser = CsvParser::new(ParserOptions {
            encoding: Some("latin-1".to_string()),
            ..ParserOptions::default()
        });
        let data = b"name,city\nalice,Montr\xe9al\n";
        let rows = parser.parse_bytes(data, "latin.csv").unwrap();

        assert_eq!(parser.metadata().encoding.as_deref(), Some("latin-1"));
        assert_eq!(rows[0].get("city"), Some("Montréal"));
    }

    #[test]
    fn test_detect_non_utf8_encoding() {
        let text = "nom,ville,remarque\n\
                    Hélène,Montréal,Requête déposée à la réception\n\
                    Gérard,Québec,Dossier complété après délai prolongé\n\
                    Émilie,Trois-Rivières,Réponse envoyée par courriel\n";
        let (bytes, _, _) = WINDOWS_1252.encode(text);

        let encoding = detect_encoding(&bytes);
        assert_ne!(encoding, UTF_8);

        let mut parser = CsvParser::default();
        let rows = parser.parse_bytes(&bytes, "fr.csv").unwrap();
        assert_eq!(rows[0].get("ville"), Some("Montréal"));
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let mut parser = CsvParser::new(ParserOptions {
            encoding: Some("utf-8".to_string()),
            ..ParserOptions::default()
        });
        let err = parser
            .parse_bytes(b"name\n\xff\xfe\xfa\n", "bad.csv")
            .unwrap_err();

        assert!(err.is_parse());
        assert!(err.to_string().contains("decode"));
    }

    #[test]
    fn test_unknown_encoding_label() {
        let mut parser = CsvParser::new(ParserOptions {
            encoding: Some("klingon-8".to_string()),
            ..ParserOptions::default()
        });
        let err = parser.parse_bytes(b"a\n1\n", "x.csv").unwrap_err();
        assert!(err.to_string().contains("Unsupported encoding"));
    }

    #[test]
    fn test_quoted_and_multiline_values() {
        let rows = parse(
            "id,description\n1,\"Hello, World\"\n2,\"Value with \"\"quotes\"\"\"\n3,\"Line 1\nLine 2\"\n4,simple\n",
        );

        assert_eq!(rows[0].get("description"), Some("Hello, World"));
        assert_eq!(rows[1].get("description"), Some("Value with \"quotes\""));
        assert_eq!(rows[2].get("description"), Some("Line 1\nLine 2"));
        assert_eq!(rows[3].get("description"), Some("simple"));
        assert_eq!(rows[3].row_number, 5);
    }

    #[test]
    fn test_file_not_found() {
        let mut parser = CsvParser::default();
        let err = parser
            .parse_file(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("not found"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xlsx");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let err = CsvParser::default().parse_file(&path).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unsupported"));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.TSV");
        std::fs::write(&path, "name\tvalue\nalice\t1\nbob\t2\n").unwrap();

        let mut parser = CsvParser::default();
        let rows = parser.parse_file(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(parser.metadata().delimiter, Some('\t'));
    }

    #[test]
    fn test_iter_file_chunks() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "name,value").unwrap();
        for i in 0..7 {
            writeln!(file, "row{},{}", i, i).unwrap();
            if i == 3 {
                writeln!(file, ",").unwrap();
            }
        }
        file.flush().unwrap();

        let mut parser = CsvParser::default();
        let mut chunks = parser.iter_file(file.path(), 3).unwrap();
        let collected: Vec<Vec<ParsedRow>> = chunks.by_ref().map(|c| c.unwrap()).collect();

        let sizes: Vec<usize> = collected.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(chunks.rows_read(), 8);

        let numbers: Vec<usize> = collected.iter().flatten().map(|r| r.row_number).collect();
        // Blank row 6 skipped but numbered
        assert_eq!(numbers, vec![2, 3, 4, 5, 7, 8, 9]);
        assert_eq!(parser.metadata().delimiter, Some(','));
    }
}
