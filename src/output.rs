//! CSV output

use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::models::{EventRow, MessageRow};

/// A row type with a fixed CSV header
pub trait CsvRow: Serialize {
    fn headers() -> &'static [&'static str];
}

impl CsvRow for EventRow {
    fn headers() -> &'static [&'static str] {
        &EventRow::HEADERS
    }
}

impl CsvRow for MessageRow {
    fn headers() -> &'static [&'static str] {
        &MessageRow::HEADERS
    }
}

/// Render rows as CSV, header line first even when there are no rows
pub fn render_csv<R: CsvRow>(rows: &[R]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(R::headers())?;
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::error::StatsError::OutputError(e.to_string()))
}

/// Write rows to `path`, replacing any existing file
pub async fn write_csv<R: CsvRow>(path: &Path, rows: &[R]) -> Result<()> {
    let bytes = render_csv(rows)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(path, bytes).await?;
    tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
