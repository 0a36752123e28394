// Profile registry - named accounts, each scoping a disjoint set of entries

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, params_from_iter, Row, ToSql};

use crate::db::Database;
use crate::error::{CoinbookError, CoinbookResult};
use crate::models::Profile;

/// Storage format of the created_at column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ProfileManager<'a> {
    db: &'a Database,
}

impl<'a> ProfileManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        ProfileManager { db }
    }

    /// Create a profile. The name must be non-empty after trimming and
    /// unique; uniqueness is checked before the insert so callers get a
    /// precise duplicate error instead of a constraint violation.
    pub fn create(&self, name: &str, description: &str) -> CoinbookResult<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoinbookError::validation("profile name cannot be empty"));
        }
        if self.get_by_name(name)?.is_some() {
            return Err(CoinbookError::duplicate("Profile", name));
        }

        let created_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.db.begin()?;
        let result = self.db.execute(
            "INSERT INTO profiles (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, created_at],
        );

        match result {
            Ok(id) => {
                self.db.commit()?;
                tracing::info!("profile created: {name} (id {id})");
                self.get(id)?.ok_or(CoinbookError::Storage {
                    operation: "create profile",
                    message: format!("profile {id} not readable after insert"),
                })
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("create profile", err))
            }
        }
    }

    pub fn get(&self, id: i64) -> CoinbookResult<Option<Profile>> {
        self.db.fetch_one(
            "SELECT id, name, description, created_at FROM profiles WHERE id = ?1",
            params![id],
            row_to_profile,
        )
    }

    pub fn get_by_name(&self, name: &str) -> CoinbookResult<Option<Profile>> {
        self.db.fetch_one(
            "SELECT id, name, description, created_at FROM profiles WHERE name = ?1",
            params![name],
            row_to_profile,
        )
    }

    /// All profiles in creation order.
    pub fn list(&self) -> CoinbookResult<Vec<Profile>> {
        self.db.fetch_all(
            "SELECT id, name, description, created_at FROM profiles
             ORDER BY created_at ASC, id ASC",
            [],
            row_to_profile,
        )
    }

    /// Update name and/or description. Returns false when the id does not
    /// exist or the new name belongs to a different profile; zero supplied
    /// fields is a trivial success. An empty new name leaves the stored
    /// name unchanged.
    pub fn update(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> CoinbookResult<bool> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(new_name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            if let Some(existing) = self.get_by_name(new_name)? {
                if existing.id != id {
                    tracing::warn!("profile rename rejected: name '{new_name}' already taken");
                    return Ok(false);
                }
            }
            assignments.push("name = ?");
            values.push(Box::new(new_name.to_string()));
        }
        if let Some(desc) = description {
            assignments.push("description = ?");
            values.push(Box::new(desc.to_string()));
        }
        if assignments.is_empty() {
            return Ok(true);
        }

        values.push(Box::new(id));
        let sql = format!("UPDATE profiles SET {} WHERE id = ?", assignments.join(", "));

        self.db.begin()?;
        match self.db.execute(&sql, params_from_iter(values)) {
            Ok(affected) => {
                self.db.commit()?;
                Ok(affected > 0)
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("update profile", err))
            }
        }
    }

    /// Delete a profile and, through the cascade constraint, all of its
    /// entries. Returns false when the id does not exist.
    pub fn delete(&self, id: i64) -> CoinbookResult<bool> {
        self.db.begin()?;
        match self.db.execute("DELETE FROM profiles WHERE id = ?1", params![id]) {
            Ok(affected) => {
                self.db.commit()?;
                if affected > 0 {
                    tracing::info!("profile {id} deleted");
                }
                Ok(affected > 0)
            }
            Err(err) => {
                let _ = self.db.rollback();
                Err(CoinbookError::storage("delete profile", err))
            }
        }
    }

    pub fn count(&self) -> CoinbookResult<i64> {
        let count = self
            .db
            .fetch_one("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
        Ok(count.unwrap_or(0))
    }
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let created_at: Option<String> = row.get(3)?;
    Ok(Profile {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        created_at: created_at
            .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
    })
}

// ============================================================================
// TESTS
// ============================================================================
