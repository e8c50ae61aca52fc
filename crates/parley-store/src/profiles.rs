//! CRUD operations for [`Profile`] records.

use chrono::Utc;
use parley_shared::{Profile, ProfileId};
use rusqlite::params;

use crate::database::{encode_ts, not_found, Database};
use crate::error::{Result, StoreError};

impl Database {
    pub fn insert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profiles (id, username, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.id.as_str(),
                profile.username,
                profile.avatar_url,
                encode_ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, id: &ProfileId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT id, username, avatar_url FROM profiles WHERE id = ?1",
                params![id.as_str()],
                row_to_profile,
            )
            .map_err(not_found)
    }

    /// All profiles, ordered by username (case-insensitive).
    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, username, avatar_url
             FROM profiles
             ORDER BY username COLLATE NOCASE ASC, id ASC",
        )?;

        let rows = stmt.query_map([], row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Rename a profile and return the updated row.
    pub fn update_username(&self, id: &ProfileId, username: &str) -> Result<Profile> {
        if username.trim().is_empty() {
            return Err(StoreError::Invalid("username must not be empty".into()));
        }
        let affected = self.conn().execute(
            "UPDATE profiles SET username = ?1 WHERE id = ?2",
            params![username, id.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_profile(id)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: ProfileId(row.get(0)?),
        username: row.get(1)?,
        avatar_url: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn profile(id: &str, username: &str) -> Profile {
        Profile {
            id: id.into(),
            username: username.into(),
            avatar_url: None,
        }
    }

    #[test]
    fn insert_and_list() {
        let (db, _dir) = test_db();
        db.insert_profile(&profile("u2", "bob")).unwrap();
        db.insert_profile(&profile("u1", "Alice")).unwrap();

        let names: Vec<_> = db
            .list_profiles()
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, vec!["Alice", "bob"]);
    }

    #[test]
    fn rename_returns_updated_row() {
        let (db, _dir) = test_db();
        db.insert_profile(&profile("u1", "alice")).unwrap();

        let updated = db.update_username(&"u1".into(), "alicia").unwrap();
        assert_eq!(updated.username, "alicia");
        assert_eq!(db.get_profile(&"u1".into()).unwrap().username, "alicia");
    }

    #[test]
    fn rename_unknown_profile_is_not_found() {
        let (db, _dir) = test_db();
        assert!(matches!(
            db.update_username(&"ghost".into(), "x"),
            Err(StoreError::NotFound)
        ));
    }
}
