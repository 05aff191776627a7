//! Row source: a single-pass iterator over the data rows of a delimited file.
//!
//! [`RowSource::open`] reads and decodes the header eagerly; iteration then
//! yields one [`Row`] per record. Rows whose field count differs from the
//! header are handled per [`MalformedRowPolicy`]. The source owns its file
//! handle, which is released when the iterator is dropped. It cannot be
//! rewound; callers that need a second pass open the file again.

use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_8};
use log::{Level, log};
use serde::{Deserialize, Serialize};

use crate::{error::InputError, io_utils};

/// Raw field values of one data row, aligned with the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line number of the record in the file (the header is line 1).
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRowPolicy {
    /// Stop at the first row whose field count differs from the header
    #[default]
    Abort,
    /// Log a warning and continue with the next row
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct RowSourceOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub malformed: MalformedRowPolicy,
    /// Skipped rows are logged as warnings when set, otherwise at debug
    /// level. A second pass over an already analyzed file clears it.
    pub report_skips: bool,
}

impl Default for RowSourceOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
            malformed: MalformedRowPolicy::Abort,
            report_skips: true,
        }
    }
}

pub struct RowSource {
    path: PathBuf,
    reader: csv::Reader<BufReader<File>>,
    headers: Vec<String>,
    options: RowSourceOptions,
    record: csv::ByteRecord,
    records_read: u64,
    skipped: usize,
    finished: bool,
}

impl RowSource {
    pub fn open(path: &Path, options: RowSourceOptions) -> Result<Self, InputError> {
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => InputError::NotFound {
                path: path.to_path_buf(),
            },
            _ => InputError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let mut reader = io_utils::open_csv_reader(BufReader::new(file), options.delimiter);
        let header_record = reader
            .byte_headers()
            .map_err(|source| InputError::Csv { row: 1, source })?
            .clone();
        if header_record.is_empty() {
            return Err(InputError::MissingHeader {
                path: path.to_path_buf(),
            });
        }
        let headers = io_utils::decode_header(&header_record, options.encoding)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            options,
            record: csv::ByteRecord::new(),
            records_read: 1,
            skipped: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows dropped so far under [`MalformedRowPolicy::Skip`].
    pub fn skipped_rows(&self) -> usize {
        self.skipped
    }

    fn current_line(&self) -> u64 {
        self.record
            .position()
            .map(|position| position.line())
            .unwrap_or(self.records_read)
    }

    fn fail(&mut self, err: InputError) -> Option<Result<Row, InputError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl Iterator for RowSource {
    type Item = Result<Row, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Ok(true) => {}
                Err(source) => {
                    let row = self.records_read + 1;
                    return self.fail(InputError::Csv { row, source });
                }
            }
            self.records_read += 1;
            let line = self.current_line();

            if self.record.len() != self.headers.len() {
                let err = InputError::MalformedRow {
                    row: line,
                    expected: self.headers.len(),
                    found: self.record.len(),
                };
                match self.options.malformed {
                    MalformedRowPolicy::Abort => return self.fail(err),
                    MalformedRowPolicy::Skip => {
                        let level = if self.options.report_skips {
                            Level::Warn
                        } else {
                            Level::Debug
                        };
                        log!(level, "Skipping malformed row in {:?}: {err}", self.path);
                        self.skipped += 1;
                        continue;
                    }
                }
            }

            return match io_utils::decode_record(&self.record, self.options.encoding, line) {
                Ok(fields) => Some(Ok(Row::new(line, fields))),
                Err(err) => self.fail(err),
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write csv");
        file.flush().expect("flush csv");
        file
    }

    #[test]
    fn yields_rows_with_line_numbers() {
        let file = write_csv(b"id,name\n1,\"multi\nline\"\n2,b\n");
        let mut source = RowSource::open(file.path(), RowSourceOptions::default()).unwrap();
        assert_eq!(source.headers(), ["id", "name"]);

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.fields, vec!["1", "multi\nline"]);
        assert_eq!(first.line, 2);
        let second = source.next().unwrap().unwrap();
        assert_eq!(second.fields, vec!["2", "b"]);
        assert_eq!(second.line, 4);
        assert!(source.next().is_none());
        assert!(source.next().is_none());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = RowSource::open(Path::new("no/such/file.csv"), RowSourceOptions::default())
            .err()
            .expect("missing file");
        assert!(matches!(err, InputError::NotFound { .. }));
    }

    #[test]
    fn empty_file_has_no_header() {
        let file = write_csv(b"");
        let err = RowSource::open(file.path(), RowSourceOptions::default())
            .err()
            .expect("empty file");
        assert!(matches!(err, InputError::MissingHeader { .. }));
    }

    #[test]
    fn malformed_rows_abort_by_default() {
        let file = write_csv(b"a,b\n1,2\n3\n4,5\n");
        let rows: Vec<_> = RowSource::open(file.path(), RowSourceOptions::default())
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        match &rows[1] {
            Err(InputError::MalformedRow {
                row,
                expected,
                found,
            }) => {
                assert_eq!((*row, *expected, *found), (3, 2, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_rows_can_be_skipped() {
        let file = write_csv(b"a,b\n1,2\n3\n4,5,6\n7,8\n");
        let options = RowSourceOptions {
            malformed: MalformedRowPolicy::Skip,
            ..RowSourceOptions::default()
        };
        let mut source = RowSource::open(file.path(), options).unwrap();
        let rows: Vec<Row> = source.by_ref().map(|row| row.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec!["7", "8"]);
        assert_eq!(source.skipped_rows(), 2);
    }

    #[test]
    fn quiet_second_pass_skips_the_same_rows() {
        let file = write_csv(b"a,b\n1,2\n3\n7,8\n");
        let options = RowSourceOptions {
            malformed: MalformedRowPolicy::Skip,
            report_skips: false,
            ..RowSourceOptions::default()
        };
        let mut source = RowSource::open(file.path(), options).unwrap();
        let lines: Vec<u64> = source.by_ref().map(|row| row.unwrap().line).collect();
        assert_eq!(lines, vec![2, 4]);
        assert_eq!(source.skipped_rows(), 1);
    }

    #[test]
    fn undecodable_bytes_stop_iteration() {
        let file = write_csv(b"name\nok\n\xff\xfe\nlater\n");
        let rows: Vec<_> = RowSource::open(file.path(), RowSourceOptions::default())
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[1], Err(InputError::Encoding { row: 3, .. })));
    }

    #[test]
    fn leading_bom_is_dropped_from_the_header_only() {
        let file = write_csv(b"\xef\xbb\xbfid,name\n1,\xff\xfeA\n");
        let mut source = RowSource::open(file.path(), RowSourceOptions::default()).unwrap();
        assert_eq!(source.headers(), ["id", "name"]);
        assert!(matches!(
            source.next(),
            Some(Err(InputError::Encoding { row: 2, column: 2, .. }))
        ));
        assert!(source.next().is_none());
    }

    #[test]
    fn honours_configured_encoding() {
        let (encoded, _, _) = WINDOWS_1252.encode("name\nCaf\u{e9}\n");
        let file = write_csv(&encoded);
        let options = RowSourceOptions {
            encoding: WINDOWS_1252,
            ..RowSourceOptions::default()
        };
        let rows: Vec<Row> = RowSource::open(file.path(), options)
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        assert_eq!(rows[0].fields, vec!["Caf\u{e9}"]);
    }
}
