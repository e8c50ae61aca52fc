//! Persisted sign-in sessions for [`crate::LocalAuth`].

use chrono::Utc;
use parley_shared::{ProfileId, Session};
use rusqlite::params;

use crate::database::{encode_ts, not_found, Database};
use crate::error::Result;

impl Database {
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                session.access_token,
                session.user_id.as_str(),
                encode_ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, token: &str) -> Result<Session> {
        self.conn()
            .query_row(
                "SELECT token, user_id FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok(Session {
                        access_token: row.get(0)?,
                        user_id: ProfileId(row.get(1)?),
                    })
                },
            )
            .map_err(not_found)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(affected > 0)
    }
}
