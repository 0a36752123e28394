// Category catalog - two-level taxonomy shared by every profile
// Children reference their parent by name, not by id; renaming a parent
// therefore orphans its children (accepted, see DESIGN.md)

use rusqlite::{params, Row};

use crate::db::Database;
use crate::error::{CoinbookError, CoinbookResult};
use crate::models::{Category, EntryType};

/// Income top-level categories. None of them have children.
pub const DEFAULT_INCOME_CATEGORIES: [&str; 5] =
    ["Salary", "Bonus", "Gift", "Investment", "Other"];

/// Expense top-level categories with their fixed children. "Other" doubles
/// as the income catch-all, so the shared row is seeded only once.
pub const DEFAULT_EXPENSE_CATEGORIES: [(&str, &[&str]); 8] = [
    ("Dining", &["Breakfast", "Lunch", "Dinner", "Snacks"]),
    ("Transport", &["Bus", "Subway", "Taxi", "Fuel"]),
    ("Shopping", &["Clothing", "Household", "Electronics"]),
    ("Entertainment", &["Movies", "Games", "Travel"]),
    ("Healthcare", &["Medicine", "Clinic", "Checkup"]),
    ("Education", &["Books", "Courses", "Training"]),
    ("Housing", &["Rent", "Utilities", "Property"]),
    ("Other", &[]),
];

pub struct CategoryManager<'a> {
    db: &'a Database,
}

impl<'a> CategoryManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        CategoryManager { db }
    }

    /// Seed the default taxonomy. Idempotent: rows that already exist are
    /// left alone. A row that fails to insert is logged, skipped and
    /// reported in the returned list so partial failure stays visible; the
    /// whole seeding runs in one transaction committed at the end.
    pub fn init_defaults(&self) -> CoinbookResult<Vec<String>> {
        let mut seeds: Vec<(&str, Option<&str>)> = Vec::new();
        for name in DEFAULT_INCOME_CATEGORIES {
            seeds.push((name, None));
        }
        for (parent, children) in DEFAULT_EXPENSE_CATEGORIES {
            seeds.push((parent, None));
            for &child in children {
                seeds.push((child, Some(parent)));
            }
        }

        self.db.begin()?;
        let mut skipped = Vec::new();
        for (name, parent) in seeds {
            if let Err(err) = self.seed_row(name, parent) {
                tracing::warn!("failed to seed category '{name}': {err}");
                skipped.push(match parent {
                    Some(parent) => format!("{parent}/{name}"),
                    None => name.to_string(),
                });
            }
        }

        match self.db.commit() {
            Ok(()) => {
                tracing::debug!("default categories ready, {} rows skipped", skipped.len());
                Ok(skipped)
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("seed default categories", err))
            }
        }
    }

    /// Insert one taxonomy row unless it is already present. The existence
    /// check also covers top-level rows, where the UNIQUE constraint does
    /// not fire because their parent is NULL.
    fn seed_row(&self, name: &str, parent: Option<&str>) -> CoinbookResult<()> {
        if self.get_by_name(name, parent)?.is_some() {
            return Ok(());
        }
        self.db.execute(
            "INSERT OR IGNORE INTO categories (name, parent) VALUES (?1, ?2)",
            params![name, parent],
        )?;
        Ok(())
    }

    /// Children of the named parent, or the top-level rows for `None`,
    /// ordered by name.
    pub fn get_categories(&self, parent: Option<&str>) -> CoinbookResult<Vec<Category>> {
        match parent {
            Some(parent) => self.db.fetch_all(
                "SELECT id, name, parent FROM categories WHERE parent = ?1 ORDER BY name",
                params![parent],
                row_to_category,
            ),
            None => self.db.fetch_all(
                "SELECT id, name, parent FROM categories WHERE parent IS NULL ORDER BY name",
                [],
                row_to_category,
            ),
        }
    }

    /// Every category, top-level rows first.
    pub fn get_all(&self) -> CoinbookResult<Vec<Category>> {
        self.db.fetch_all(
            "SELECT id, name, parent FROM categories ORDER BY parent, name",
            [],
            row_to_category,
        )
    }

    /// The fixed top-level set for an entry type, each with its current
    /// child names, in seeding order. Drives type-dependent pickers.
    pub fn get_by_type_structure(
        &self,
        entry_type: EntryType,
    ) -> CoinbookResult<Vec<(String, Vec<String>)>> {
        let top_levels: Vec<&str> = match entry_type {
            EntryType::Income => DEFAULT_INCOME_CATEGORIES.to_vec(),
            EntryType::Expense => DEFAULT_EXPENSE_CATEGORIES
                .iter()
                .map(|(name, _)| *name)
                .collect(),
        };

        let mut structure = Vec::with_capacity(top_levels.len());
        for name in top_levels {
            let children = self
                .get_categories(Some(name))?
                .into_iter()
                .map(|category| category.name)
                .collect();
            structure.push((name.to_string(), children));
        }
        Ok(structure)
    }

    /// Add a category. The (name, parent) pair must not exist yet; the
    /// check runs before the insert so callers get a duplicate error with
    /// the offending pair named. An empty parent means top-level.
    pub fn add(&self, name: &str, parent: Option<&str>) -> CoinbookResult<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoinbookError::validation("category name cannot be empty"));
        }
        let parent = parent.map(str::trim).filter(|p| !p.is_empty());

        if self.get_by_name(name, parent)?.is_some() {
            let identifier = match parent {
                Some(parent) => format!("{name} (under {parent})"),
                None => name.to_string(),
            };
            return Err(CoinbookError::duplicate("Category", identifier));
        }

        self.db.begin()?;
        let result = self.db.execute(
            "INSERT INTO categories (name, parent) VALUES (?1, ?2)",
            params![name, parent],
        );

        match result {
            Ok(id) => {
                self.db.commit()?;
                tracing::info!("category added: {name} (id {id})");
                Ok(Category {
                    id,
                    name: name.to_string(),
                    parent: parent.map(str::to_string),
                })
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("add category", err))
            }
        }
    }

    /// Delete a category row. Children keep their parent string, so
    /// deleting a parent leaves them orphaned rather than removed.
    pub fn delete(&self, id: i64) -> CoinbookResult<bool> {
        self.db.begin()?;
        match self.db.execute("DELETE FROM categories WHERE id = ?1", params![id]) {
            Ok(affected) => {
                self.db.commit()?;
                Ok(affected > 0)
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("delete category", err))
            }
        }
    }

    pub fn get_by_name(&self, name: &str, parent: Option<&str>) -> CoinbookResult<Option<Category>> {
        match parent {
            Some(parent) => self.db.fetch_one(
                "SELECT id, name, parent FROM categories WHERE name = ?1 AND parent = ?2",
                params![name, parent],
                row_to_category,
            ),
            None => self.db.fetch_one(
                "SELECT id, name, parent FROM categories WHERE name = ?1 AND parent IS NULL",
                params![name],
                row_to_category,
            ),
        }
    }
}

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        parent: row.get(2)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
