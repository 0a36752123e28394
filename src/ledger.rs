// Entry ledger - add, query, update and delete entries per profile
// Statistics run over the same filter clauses the queries use

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Row, ToSql};

use crate::db::Database;
use crate::error::{CoinbookError, CoinbookResult};
use crate::models::{Entry, EntryType, EntryUpdate, QueryFilters, Statistics};

/// Storage form of entry dates.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct EntryManager<'a> {
    db: &'a Database,
}

impl<'a> EntryManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        EntryManager { db }
    }

    /// Record one entry. Amount must be positive and the category non-empty;
    /// blank subcategory and note collapse to NULL.
    #[allow(clippy::too_many_arguments)]
    pub fn add_entry(
        &self,
        profile_id: i64,
        date: NaiveDate,
        entry_type: EntryType,
        amount: f64,
        category: &str,
        subcategory: Option<&str>,
        note: Option<&str>,
    ) -> CoinbookResult<Entry> {
        validate_amount(amount)?;
        let category = category.trim();
        if category.is_empty() {
            return Err(CoinbookError::validation("category cannot be empty"));
        }

        self.db.begin()?;
        let result =
            self.insert_entry(profile_id, date, entry_type, amount, category, subcategory, note);

        match result {
            Ok(id) => {
                self.db.commit()?;
                tracing::debug!("entry {id} added to profile {profile_id}");
                Ok(Entry {
                    id,
                    profile_id,
                    date,
                    entry_type,
                    amount,
                    category: category.to_string(),
                    subcategory: normalize(subcategory),
                    note: normalize(note),
                })
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("add entry", err))
            }
        }
    }

    /// Bare INSERT without transaction management. The import pipeline calls
    /// this inside its own batch transaction; `add_entry` wraps it in one.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_entry(
        &self,
        profile_id: i64,
        date: NaiveDate,
        entry_type: EntryType,
        amount: f64,
        category: &str,
        subcategory: Option<&str>,
        note: Option<&str>,
    ) -> CoinbookResult<i64> {
        self.db.execute(
            "INSERT INTO entries (profile_id, date, type, amount, category, subcategory, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                profile_id,
                date.format(DATE_FORMAT).to_string(),
                entry_type,
                amount,
                category,
                normalize(subcategory),
                normalize(note),
            ],
        )
    }

    /// Entries of a profile matching the filters, newest first. Same-day
    /// entries come back in reverse insertion order.
    pub fn get_entries(
        &self,
        profile_id: i64,
        filters: &QueryFilters,
    ) -> CoinbookResult<Vec<Entry>> {
        let (clauses, values) = filter_clauses(profile_id, filters);
        let sql = format!(
            "SELECT id, profile_id, date, type, amount, category, subcategory, note
             FROM entries WHERE {} ORDER BY date DESC, id DESC",
            clauses.join(" AND ")
        );
        self.db.fetch_all(&sql, params_from_iter(values), row_to_entry)
    }

    pub fn get_entry(&self, id: i64) -> CoinbookResult<Option<Entry>> {
        self.db.fetch_one(
            "SELECT id, profile_id, date, type, amount, category, subcategory, note
             FROM entries WHERE id = ?1",
            params![id],
            row_to_entry,
        )
    }

    /// Apply a partial update. `None` fields stay untouched; returns false
    /// when the id does not exist. An all-`None` update is a trivial success.
    pub fn update_entry(&self, id: i64, update: &EntryUpdate) -> CoinbookResult<bool> {
        if update.is_empty() {
            return Ok(true);
        }

        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(date) = update.date {
            assignments.push("date = ?");
            values.push(Box::new(date.format(DATE_FORMAT).to_string()));
        }
        if let Some(entry_type) = update.entry_type {
            assignments.push("type = ?");
            values.push(Box::new(entry_type.as_str().to_string()));
        }
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
            assignments.push("amount = ?");
            values.push(Box::new(amount));
        }
        if let Some(category) = &update.category {
            let category = category.trim();
            if category.is_empty() {
                return Err(CoinbookError::validation("category cannot be empty"));
            }
            assignments.push("category = ?");
            values.push(Box::new(category.to_string()));
        }
        if let Some(subcategory) = &update.subcategory {
            assignments.push("subcategory = ?");
            values.push(Box::new(normalize(Some(subcategory))));
        }
        if let Some(note) = &update.note {
            assignments.push("note = ?");
            values.push(Box::new(normalize(Some(note))));
        }

        values.push(Box::new(id));
        let sql = format!("UPDATE entries SET {} WHERE id = ?", assignments.join(", "));

        self.db.begin()?;
        match self.db.execute(&sql, params_from_iter(values)) {
            Ok(affected) => {
                self.db.commit()?;
                Ok(affected > 0)
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("update entry", err))
            }
        }
    }

    /// Delete one entry. Returns false when the id does not exist.
    pub fn delete_entry(&self, id: i64) -> CoinbookResult<bool> {
        self.db.begin()?;
        match self.db.execute("DELETE FROM entries WHERE id = ?1", params![id]) {
            Ok(affected) => {
                self.db.commit()?;
                Ok(affected > 0)
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("delete entry", err))
            }
        }
    }

    /// Income and expense totals, balance and row count over the same
    /// filtered set `get_entries` would return.
    pub fn get_statistics(
        &self,
        profile_id: i64,
        filters: &QueryFilters,
    ) -> CoinbookResult<Statistics> {
        let (clauses, values) = filter_clauses(profile_id, filters);
        let sql = format!(
            "SELECT
                COALESCE(SUM(CASE WHEN type = 'Income' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN type = 'Expense' THEN amount ELSE 0 END), 0),
                COUNT(*)
             FROM entries WHERE {}",
            clauses.join(" AND ")
        );

        let totals = self.db.fetch_one(&sql, params_from_iter(values), |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let (total_income, total_expense, count) = totals.unwrap_or((0.0, 0.0, 0));
        Ok(Statistics {
            total_income,
            total_expense,
            balance: total_income - total_expense,
            count,
        })
    }

    pub fn count(&self, profile_id: i64) -> CoinbookResult<i64> {
        let count = self.db.fetch_one(
            "SELECT COUNT(*) FROM entries WHERE profile_id = ?1",
            params![profile_id],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0))
    }
}

/// WHERE clauses plus bind values for a filtered profile query. The profile
/// scope is always the first clause.
fn filter_clauses(
    profile_id: i64,
    filters: &QueryFilters,
) -> (Vec<&'static str>, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<&'static str> = vec!["profile_id = ?"];
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(profile_id)];

    if let Some(start) = filters.start_date {
        clauses.push("date >= ?");
        values.push(Box::new(start.format(DATE_FORMAT).to_string()));
    }
    if let Some(end) = filters.end_date {
        clauses.push("date <= ?");
        values.push(Box::new(end.format(DATE_FORMAT).to_string()));
    }
    if let Some(entry_type) = filters.entry_type {
        clauses.push("type = ?");
        values.push(Box::new(entry_type.as_str().to_string()));
    }
    if let Some(category) = &filters.category {
        clauses.push("category = ?");
        values.push(Box::new(category.clone()));
    }

    (clauses, values)
}

fn validate_amount(amount: f64) -> CoinbookResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(CoinbookError::validation(format!(
            "amount must be a non-negative number, got {amount}"
        )));
    }
    Ok(())
}

/// Blank optional text collapses to NULL so filters and exports see one
/// consistent absent form.
fn normalize(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let date: String = row.get(2)?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;

    Ok(Entry {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        date,
        entry_type: row.get(3)?,
        amount: row.get(4)?,
        category: row.get(5)?,
        subcategory: row.get(6)?,
        note: row.get(7)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
