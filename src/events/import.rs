//! Newline-delimited JSON import, the format the upstream feed batches in.

use super::{Event, EventStore};
use anyhow::{Context, Result};
use std::io::BufRead;
use tracing::{info, warn};

const IMPORT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub rejected: usize,
}

/// Read one JSON event per line and append them to `store` in batches.
///
/// Lines that fail to parse (including unknown event types) are logged and
/// counted as rejected; blank lines are skipped. I/O and store errors abort
/// the import, but batches already appended stay in the log.
pub fn import_ndjson<R: BufRead>(reader: R, store: &dyn EventStore) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut batch: Vec<Event> = Vec::with_capacity(IMPORT_BATCH_SIZE);

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => batch.push(event),
            Err(e) => {
                warn!("Rejecting event on line {}: {}", line_idx + 1, e);
                summary.rejected += 1;
            }
        }

        if batch.len() >= IMPORT_BATCH_SIZE {
            summary.imported += store.append_events(&batch)?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        summary.imported += store.append_events(&batch)?;
    }

    info!(
        "Imported {} events ({} rejected)",
        summary.imported, summary.rejected
    );
    Ok(summary)
}
