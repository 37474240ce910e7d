use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::READ_BUFFER_SIZE;
use crate::error::{EngineError, Result};
use crate::types::ByteEncodable;

/// Creates (or truncates) `path` behind a large write buffer.
pub fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    Ok(BufWriter::with_capacity(READ_BUFFER_SIZE, file))
}

/// Appends one encoded record to a buffered writer.
pub fn write_record<R: ByteEncodable, W: Write>(writer: &mut W, record: &R, path: &Path) -> Result<()> {
    writer.write_all(&record.to_bytes()).map_err(|e| EngineError::io(path, e))
}

/// Flushes a buffered writer, attributing failures to `path`.
pub fn finish_writer(mut writer: BufWriter<File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| EngineError::io(path, e))
}

/// Writes a whole slice of records to `path`.
pub fn write_records<R: ByteEncodable>(path: &Path, records: &[R]) -> Result<()> {
    let mut writer = create_writer(path)?;
    for record in records {
        write_record(&mut writer, record, path)?;
    }
    finish_writer(writer, path)
}

/// Deletes an intermediate file; a file that is already gone is fine.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(EngineError::io(path, e)),
        _ => Ok(()),
    }
}

/// Reads a whole file of records into memory.
///
/// Used for the small per-task tables (remaps, task outputs); graph-sized arrays are mapped
/// instead.
pub fn read_records<R: ByteEncodable>(path: &Path) -> Result<Vec<R>> {
    let bytes = fs::read(path).map_err(|e| EngineError::io(path, e))?;
    let size = R::byte_size();
    if bytes.len() % size != 0 {
        return Err(EngineError::format(
            path,
            format!("{} bytes is not a multiple of the {}-byte record", bytes.len(), size),
        ));
    }
    bytes
        .chunks_exact(size)
        .map(|chunk| R::from_bytes(chunk).ok_or_else(|| EngineError::format(path, "truncated record")))
        .collect()
}
