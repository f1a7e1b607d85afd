use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use nexus_types::models::{Role, UserId};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::Database;
use crate::models::{ContactRow, Presence, UserRow};
use crate::timestamp;

impl Database {
    // -- Users --

    /// Inserts a user. Returns `None` when the username is already taken.
    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<Option<UserId>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT (username) DO NOTHING",
                (username, password_hash, role.as_str()),
            )?;
            Ok((inserted == 1).then(|| conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password, role FROM users WHERE username = ?1",
                    [username],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Every user except `user_id`, ordered by username. This is the contact
    /// list: any registered user can be messaged.
    pub fn list_users_except(&self, user_id: UserId) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username FROM users WHERE id != ?1 ORDER BY username, id")?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ContactRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Presence --

    /// Upserts the user's status row and refreshes `last_seen`.
    pub fn set_presence(&self, user_id: UserId, is_online: bool, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_status (user_id, is_online, last_seen) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE
                 SET is_online = excluded.is_online, last_seen = excluded.last_seen",
                rusqlite::params![user_id, is_online, timestamp::to_sql(timestamp::truncate(now))],
            )?;
            Ok(())
        })
    }

    pub fn get_presence(&self, user_id: UserId) -> Result<Presence> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT is_online, last_seen FROM user_status WHERE user_id = ?1",
                    [user_id],
                    presence_from_row,
                )
                .optional()?;
            Ok(row.unwrap_or_default())
        })
    }

    /// Presence for every user that has a status row. Users missing from the
    /// map have never been seen.
    pub fn all_presence(&self) -> Result<HashMap<UserId, Presence>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id, is_online, last_seen FROM user_status")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, UserId>(0)?,
                        Presence {
                            is_online: row.get(1)?,
                            last_seen: Some(timestamp::column(row, 2)?),
                        },
                    ))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: UserId) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username, password, role FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let role: String = row.get(3)?;
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: role
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?,
    })
}

fn presence_from_row(row: &Row<'_>) -> rusqlite::Result<Presence> {
    Ok(Presence {
        is_online: row.get(0)?,
        last_seen: Some(timestamp::column(row, 1)?),
    })
}
