// Coinbook - personal finance tracker core
// Profiles, category taxonomy, entry ledger and the CSV import/export pipelines

use std::sync::Once;

pub mod categories;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod ledger;
pub mod models;
pub mod profiles;

// Re-export commonly used types
pub use categories::{CategoryManager, DEFAULT_EXPENSE_CATEGORIES, DEFAULT_INCOME_CATEGORIES};
pub use db::{default_db_path, Database};
pub use error::{CoinbookError, CoinbookResult};
pub use export::DataExporter;
pub use import::DataImporter;
pub use ledger::EntryManager;
pub use models::{
    Category, Entry, EntryType, EntryUpdate, ExportSummary, Profile, QueryFilters, Statistics,
};
pub use profiles::ProfileManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static LOGGING_INIT: Once = Once::new();

/// Install the global tracing subscriber. Safe to call repeatedly; only the
/// first call does anything. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    LOGGING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coinbook=info"));
        fmt().with_env_filter(filter).init();
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_logging_is_idempotent() {
        super::init_logging();
        super::init_logging();
    }

    #[test]
    fn test_version_is_set() {
        assert!(!super::VERSION.is_empty());
    }
}
