// Companion - core/export.rs
//
// CSV and JSON export of the retained tail window.
// Core layer: writes to any Write trait object.

use crate::core::model::TailRow;
use crate::util::error::ExportError;
use std::io::Write;
use std::path::Path;

/// Export rows to CSV format, newest first.
///
/// Writes: timestamp, source_id, sequence, subject, payload (compact JSON).
/// The timestamp column holds the raw text the node sent.
pub fn export_csv<W: Write>(
    rows: &[TailRow],
    writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let csv_err = |e| ExportError::Csv {
        path: export_path.to_path_buf(),
        source: e,
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(["timestamp", "source_id", "sequence", "subject", "payload"])
        .map_err(csv_err)?;

    let mut count = 0;
    for row in rows {
        let entry = &row.entry;
        let payload = if entry.payload.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&entry.payload).map_err(|e| ExportError::Json {
                path: export_path.to_path_buf(),
                source: e,
            })?
        };

        let sequence = entry.sequence.to_string();
        csv_writer
            .write_record([
                entry.timestamp.as_deref().unwrap_or(""),
                entry.source_id.as_str(),
                sequence.as_str(),
                entry.subject.as_deref().unwrap_or(""),
                payload.as_str(),
            ])
            .map_err(csv_err)?;
        count += 1;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(count)
}

/// Export rows as a pretty-printed JSON array of entries, newest first.
pub fn export_json<W: Write>(
    rows: &[TailRow],
    mut writer: W,
    export_path: &Path,
) -> Result<usize, ExportError> {
    let entries: Vec<_> = rows.iter().map(|r| &r.entry).collect();

    serde_json::to_writer_pretty(&mut writer, &entries).map_err(|e| ExportError::Json {
        path: export_path.to_path_buf(),
        source: e,
    })?;
    writer.flush().map_err(|e| ExportError::Io {
        path: export_path.to_path_buf(),
        source: e,
    })?;

    Ok(entries.len())
}
