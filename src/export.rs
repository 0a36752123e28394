// CSV export pipeline - serialize filtered entries to text or file
// Row order follows the ledger default: newest date first, then newest id

use std::path::Path;

use crate::db::Database;
use crate::error::CoinbookResult;
use crate::import::{CSV_COLUMNS, UTF8_BOM};
use crate::ledger::{EntryManager, DATE_FORMAT};
use crate::models::{Entry, EntryType, ExportSummary, QueryFilters};

pub struct DataExporter<'a> {
    db: &'a Database,
}

impl<'a> DataExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        DataExporter { db }
    }

    /// Render matching entries as CSV text. None when nothing matches or
    /// the query fails; query failures are logged before being collapsed.
    pub fn export_to_string(&self, profile_id: i64, filters: &QueryFilters) -> Option<String> {
        let entries = match EntryManager::new(self.db).get_entries(profile_id, filters) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!("export query failed: {err}");
                return None;
            }
        };
        if entries.is_empty() {
            return None;
        }

        match render_csv(&entries) {
            Ok(csv) => Some(csv),
            Err(err) => {
                tracing::error!("export rendering failed: {err}");
                None
            }
        }
    }

    /// Write matching entries to a BOM-prefixed file so spreadsheet tools
    /// decode non-ASCII text correctly. False when nothing matches or the
    /// write fails.
    pub fn export_to_file(
        &self,
        profile_id: i64,
        path: impl AsRef<Path>,
        filters: &QueryFilters,
    ) -> bool {
        let path = path.as_ref();
        let csv = match self.export_to_string(profile_id, filters) {
            Some(csv) => csv,
            None => {
                tracing::warn!("export to {} skipped: nothing to write", path.display());
                return false;
            }
        };

        let mut payload = String::from(UTF8_BOM);
        payload.push_str(&csv);

        match std::fs::write(path, payload) {
            Ok(()) => {
                tracing::info!("profile {profile_id} exported to {}", path.display());
                true
            }
            Err(err) => {
                tracing::error!("failed to write {}: {err}", path.display());
                false
            }
        }
    }

    /// Preview of a pending export over the same filters: row counts per
    /// type, totals and the covered date range.
    pub fn get_summary(
        &self,
        profile_id: i64,
        filters: &QueryFilters,
    ) -> CoinbookResult<ExportSummary> {
        let entries = EntryManager::new(self.db).get_entries(profile_id, filters)?;

        // Entries arrive date-descending, so the range ends are the list ends.
        let mut summary = ExportSummary {
            total_count: entries.len() as i64,
            income_count: 0,
            expense_count: 0,
            total_income: 0.0,
            total_expense: 0.0,
            earliest_date: entries.last().map(|entry| entry.date),
            latest_date: entries.first().map(|entry| entry.date),
        };

        for entry in &entries {
            match entry.entry_type {
                EntryType::Income => {
                    summary.income_count += 1;
                    summary.total_income += entry.amount;
                }
                EntryType::Expense => {
                    summary.expense_count += 1;
                    summary.total_expense += entry.amount;
                }
            }
        }

        Ok(summary)
    }
}

/// Serialize entries with the canonical header. Amounts carry exactly two
/// decimals; absent subcategory and note become empty fields.
fn render_csv(entries: &[Entry]) -> CoinbookResult<String> {
    let mut buffer = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(CSV_COLUMNS)?;
        for entry in entries {
            writer.write_record([
                entry.date.format(DATE_FORMAT).to_string(),
                entry.entry_type.to_string(),
                format!("{:.2}", entry.amount),
                entry.category.clone(),
                entry.subcategory.clone().unwrap_or_default(),
                entry.note.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// ============================================================================
// TESTS
// ============================================================================
