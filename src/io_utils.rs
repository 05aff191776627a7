//! I/O helpers for CSV reading: encoding and delimiter resolution, reader
//! construction and field decoding.
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Reader construction**: readers are flexible so that rows with the
//!   wrong field count reach the row source and its malformed-row policy.

use std::{io::Read, path::Path};

use encoding_rs::{Encoding, UTF_8};

use crate::error::InputError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, InputError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| InputError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Strict decode of one field. No BOM sniffing happens here; see
/// [`decode_header`].
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Decodes every field of `record`; `row` is only used for error context.
pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
    row: u64,
) -> Result<Vec<String>, InputError> {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| decode_field(field, encoding, row, idx))
        .collect()
}

/// Decodes the header record, dropping a byte order mark for `encoding` at
/// the start of the first field.
pub fn decode_header(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, InputError> {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let field = match Encoding::for_bom(field) {
                Some((bom_encoding, length)) if idx == 0 && bom_encoding == encoding => {
                    &field[length..]
                }
                _ => field,
            };
            decode_field(field, encoding, 1, idx)
        })
        .collect()
}

fn decode_field(
    field: &[u8],
    encoding: &'static Encoding,
    row: u64,
    idx: usize,
) -> Result<String, InputError> {
    decode_bytes(field, encoding).ok_or(InputError::Encoding {
        row,
        column: idx + 1,
        encoding: encoding.name(),
    })
}
