// Domain models - profiles, categories, entries
// Plus the value objects used for queries, partial updates and statistics

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::error::{CoinbookError, CoinbookResult};

// ============================================================================
// ENTRY TYPE
// ============================================================================

/// Direction of a ledger entry. Stored as its exact string form, which the
/// entries table also enforces with a CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Income,
    Expense,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Income => "Income",
            EntryType::Expense => "Expense",
        }
    }

    /// Parse the exact string form. Anything else is a validation error,
    /// which is how free-form inputs (CSV cells, UI text) get checked.
    pub fn parse(value: &str) -> CoinbookResult<Self> {
        match value {
            "Income" => Ok(EntryType::Income),
            "Expense" => Ok(EntryType::Expense),
            other => Err(CoinbookError::validation(format!(
                "entry type must be 'Income' or 'Expense', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for EntryType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for EntryType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        EntryType::parse(text)
            .map_err(|_| FromSqlError::Other(format!("unknown entry type: {text}").into()))
    }
}

// ============================================================================
// PERSISTED ENTITIES
// ============================================================================

/// A named account scoping a disjoint set of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: Option<NaiveDateTime>,
}

/// One node of the two-level category taxonomy. `parent` is a name-based
/// reference to a top-level category, not a foreign key, so renaming a
/// parent leaves existing children pointing at the old name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent: Option<String>,
}

impl Category {
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

/// One income or expense record. Category and subcategory are copied string
/// values, not references, so later taxonomy edits leave entries unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub profile_id: i64,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: f64,
    pub category: String,
    pub subcategory: Option<String>,
    pub note: Option<String>,
}

// ============================================================================
// QUERY VALUES
// ============================================================================

/// Optional filter clauses for entry queries. Set fields combine with AND;
/// an all-`None` value matches every entry of the profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub entry_type: Option<EntryType>,
    pub category: Option<String>,
}

impl QueryFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_date(mut self, start: NaiveDate) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn with_end_date(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn with_entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Field set for partial entry updates. `None` leaves a field unchanged;
/// an empty string for `subcategory`/`note` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryUpdate {
    pub date: Option<NaiveDate>,
    pub entry_type: Option<EntryType>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub note: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.entry_type.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.subcategory.is_none()
            && self.note.is_none()
    }
}

// ============================================================================
// DERIVED AGGREGATES
// ============================================================================

/// Totals over a filtered entry set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub count: i64,
}

/// Shape of a pending export: row counts per type, totals and date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub total_count: i64,
    pub income_count: i64,
    pub expense_count: i64,
    pub total_income: f64,
    pub total_expense: f64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_parse_valid() {
        assert_eq!(EntryType::parse("Income").unwrap(), EntryType::Income);
        assert_eq!(EntryType::parse("Expense").unwrap(), EntryType::Expense);
    }

    #[test]
    fn test_entry_type_parse_invalid() {
        for bad in ["income", "EXPENSE", "Transfer", ""] {
            let err = EntryType::parse(bad).unwrap_err();
            assert!(err.is_validation(), "expected validation error for {bad:?}");
        }
    }

    #[test]
    fn test_entry_type_round_trip_str() {
        assert_eq!(EntryType::parse(EntryType::Income.as_str()).unwrap(), EntryType::Income);
        assert_eq!(EntryType::Expense.to_string(), "Expense");
    }

    #[test]
    fn test_entry_serialized_shape() {
        let entry = Entry {
            id: 7,
            profile_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            entry_type: EntryType::Expense,
            amount: 35.5,
            category: "Dining".to_string(),
            subcategory: Some("Lunch".to_string()),
            note: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "Expense");
        assert_eq!(json["date"], "2025-01-15");
        assert_eq!(json["subcategory"], "Lunch");
        assert!(json["note"].is_null());
    }

    #[test]
    fn test_query_filters_builders() {
        let filters = QueryFilters::new()
            .with_start_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .with_entry_type(EntryType::Income)
            .with_category("Salary");

        assert_eq!(filters.start_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(filters.end_date, None);
        assert_eq!(filters.entry_type, Some(EntryType::Income));
        assert_eq!(filters.category.as_deref(), Some("Salary"));
        assert_eq!(QueryFilters::default(), QueryFilters::new());
    }

    #[test]
    fn test_entry_update_is_empty() {
        assert!(EntryUpdate::default().is_empty());
        let update = EntryUpdate {
            amount: Some(12.0),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
