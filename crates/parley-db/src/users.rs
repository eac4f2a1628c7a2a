use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Login, User, UserSummary};
use crate::{CoreError, Database, Result};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 16;
const DIRECTORY_LIMIT: u32 = 50;

impl Database {
    // -- Identity --

    /// Log in by username, registering the name on first use.
    pub fn login(&self, username: &str) -> Result<Login> {
        validate_username(username)?;

        let outcome = self.with_conn_mut(|conn| {
            if let Some(user) = query_user_by_username(conn, username)? {
                return Ok(Login::Existing(user));
            }

            let user = User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                photo_url: None,
                created_at: Utc::now(),
            };
            conn.execute(
                "INSERT INTO users (id, username, photo_url, created_at) VALUES (?1, ?2, NULL, ?3)",
                params![user.id, user.username, user.created_at],
            )?;
            Ok(Login::Created(user))
        });

        match outcome {
            // Someone registered the same name between our lookup and insert:
            // their row is the account.
            Err(CoreError::Conflict(_)) => self
                .user_by_username(username)?
                .map(Login::Existing)
                .ok_or_else(|| CoreError::NotFound(format!("user '{}'", username))),
            Ok(Login::Created(user)) => {
                info!("Registered user {} ({})", user.username, user.id);
                Ok(Login::Created(user))
            }
            other => other,
        }
    }

    pub fn user(&self, id: Uuid) -> Result<User> {
        self.with_conn(|conn| require_user(conn, id))
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn set_username(&self, id: Uuid, username: &str) -> Result<User> {
        validate_username(username)?;

        self.with_conn_mut(|conn| {
            let mut user = require_user(conn, id)?;
            if user.username == username {
                return Ok(user);
            }

            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            if taken {
                return Err(CoreError::Conflict(format!(
                    "username '{}' is already in use",
                    username
                )));
            }

            conn.execute(
                "UPDATE users SET username = ?1 WHERE id = ?2",
                params![username, id],
            )?;
            debug!("User {} renamed {} -> {}", id, user.username, username);
            user.username = username.to_string();
            Ok(user)
        })
    }

    /// Store a blob-storage reference as the user's photo.
    pub fn set_user_photo(&self, id: Uuid, photo_url: &str) -> Result<User> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET photo_url = ?1 WHERE id = ?2",
                params![photo_url, id],
            )?;
            if changed == 0 {
                return Err(CoreError::NotFound(format!("user {}", id)));
            }
            require_user(conn, id)
        })
    }

    /// Directory listing ordered by username, optionally filtered by a
    /// case-insensitive substring.
    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<UserSummary>> {
        let pattern = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => format!("%{}%", escape_like(s)),
            None => "%".to_string(),
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, photo_url FROM users
                 WHERE username LIKE ?1 ESCAPE '\\'
                 ORDER BY username
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![pattern, DIRECTORY_LIMIT], summary_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub fn validate_username(username: &str) -> Result<()> {
    let len = username.len();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(CoreError::Validation(format!(
            "username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation("username must be alphanumeric".into()));
    }
    Ok(())
}

pub(crate) fn require_user(conn: &Connection, id: Uuid) -> Result<User> {
    query_user_by_id(conn, id)?.ok_or_else(|| CoreError::NotFound(format!("user {}", id)))
}

/// Fails with `NotFound` naming the first id that is not a registered user.
pub(crate) fn require_users(conn: &Connection, ids: &[Uuid]) -> Result<()> {
    let mut stmt = conn.prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)")?;
    for id in ids {
        let exists: bool = stmt.query_row([id], |row| row.get(0))?;
        if !exists {
            return Err(CoreError::NotFound(format!("user {}", id)));
        }
    }
    Ok(())
}

pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(0)?,
        username: row.get(1)?,
        photo_url: row.get(2)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        photo_url: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, username, photo_url, created_at FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, username, photo_url, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn login_registers_once() {
        let db = testutil::db();

        let first = db.login("alice").unwrap();
        assert!(first.is_new());
        let second = db.login("alice").unwrap();
        assert!(!second.is_new());
        assert_eq!(first.into_user().id, second.into_user().id);
    }

    #[test]
    fn login_rejects_bad_usernames() {
        let db = testutil::db();
        for bad in ["al", "seventeen_chars_x", "bob smith", "bob!", "abcdefghijklmnopq"] {
            assert!(
                matches!(db.login(bad), Err(CoreError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn rename_conflicts_with_taken_name() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");
        testutil::user(&db, "bob");

        assert!(matches!(
            db.set_username(alice.id, "bob"),
            Err(CoreError::Conflict(_))
        ));
        let renamed = db.set_username(alice.id, "alicia").unwrap();
        assert_eq!(renamed.username, "alicia");
        assert!(db.user_by_username("alice").unwrap().is_none());

        // Renaming to your own name is a no-op.
        assert_eq!(db.set_username(alice.id, "alicia").unwrap().username, "alicia");
    }

    #[test]
    fn directory_search_is_case_insensitive() {
        let db = testutil::db();
        testutil::user(&db, "Alice");
        testutil::user(&db, "malik");
        testutil::user(&db, "bob");

        let hits: Vec<String> = db
            .list_users(Some("ali"))
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(hits, vec!["Alice".to_string(), "malik".to_string()]);
        assert_eq!(db.list_users(None).unwrap().len(), 3);
    }

    #[test]
    fn photo_update_requires_user() {
        let db = testutil::db();
        let alice = testutil::user(&db, "alice");

        let updated = db.set_user_photo(alice.id, "/photos/a.png").unwrap();
        assert_eq!(updated.photo_url.as_deref(), Some("/photos/a.png"));
        assert!(matches!(
            db.set_user_photo(Uuid::new_v4(), "/photos/x.png"),
            Err(CoreError::NotFound(_))
        ));
    }
}
