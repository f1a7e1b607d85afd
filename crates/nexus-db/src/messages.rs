use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use nexus_types::models::{ConversationId, MessageId, UserId};
use rusqlite::{Connection, Row};

use crate::Database;
use crate::models::{MessageRow, SentMessage};
use crate::timestamp;

/// Edit and unsend share one window, measured from `sent_at`. A message is
/// still mutable at exactly this many seconds.
pub const EDIT_WINDOW_SECS: i64 = 900;

const SELECT_MESSAGES: &str = "
    SELECT m.id, m.conversation_id, m.sender_id, u.username, m.content,
           m.sent_at, m.edited, m.edited_at, m.is_read
    FROM messages m
    JOIN users u ON u.id = m.sender_id
    WHERE m.conversation_id = ?1 AND m.id > ?2 AND m.is_unsent = 0
    ORDER BY m.sent_at ASC, m.id ASC";

impl Database {
    /// Appends a message. Returns `None` when the sender is not a participant
    /// of the conversation (or the conversation does not exist).
    pub fn insert_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SentMessage>> {
        let sent_at = timestamp::truncate(now);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, sent_at)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE EXISTS (
                     SELECT 1 FROM conversations
                     WHERE id = ?1 AND (user1_id = ?2 OR user2_id = ?2)
                 )",
                rusqlite::params![conversation_id, sender_id, content, timestamp::to_sql(sent_at)],
            )?;

            Ok((inserted == 1).then(|| SentMessage {
                id: conn.last_insert_rowid(),
                sent_at,
            }))
        })
    }

    /// Replaces the content of a message the caller sent within the edit
    /// window. Returns the new `edited_at`, or `None` if the message does not
    /// exist, belongs to someone else, was unsent, or is past the window. The
    /// cases are deliberately not told apart.
    pub fn edit_message(
        &self,
        message_id: MessageId,
        caller_id: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let edited_at = timestamp::truncate(now);
        self.with_conn(|conn| {
            // Ownership and window are checked by the UPDATE itself so nothing
            // can slip in between a read and the write.
            let updated = conn.execute(
                "UPDATE messages SET content = ?1, edited = 1, edited_at = ?2
                 WHERE id = ?3 AND sender_id = ?4 AND is_unsent = 0 AND sent_at >= ?5",
                rusqlite::params![
                    content,
                    timestamp::to_sql(edited_at),
                    message_id,
                    caller_id,
                    window_start(edited_at),
                ],
            )?;
            Ok((updated == 1).then_some(edited_at))
        })
    }

    /// Soft-deletes a message under the same rule as `edit_message`. The
    /// content is kept but the message disappears from every read.
    pub fn unsend_message(&self, message_id: MessageId, caller_id: UserId, now: DateTime<Utc>) -> Result<bool> {
        let now = timestamp::truncate(now);
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_unsent = 1
                 WHERE id = ?1 AND sender_id = ?2 AND is_unsent = 0 AND sent_at >= ?3",
                rusqlite::params![message_id, caller_id, window_start(now)],
            )?;
            Ok(updated == 1)
        })
    }

    /// Full visible history of a conversation, oldest first.
    pub fn get_messages(&self, conversation_id: ConversationId) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id, 0))
    }

    /// Visible messages with an id above the watermark, oldest first.
    pub fn get_messages_after(&self, conversation_id: ConversationId, after: MessageId) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id, after))
    }

    /// Per-peer unread counts for `user_id` across all their conversations.
    pub fn unread_counts(&self, user_id: UserId) -> Result<BTreeMap<UserId, i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.sender_id, COUNT(*)
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE (c.user1_id = ?1 OR c.user2_id = ?1)
                   AND m.sender_id != ?1
                   AND m.is_read = 0
                   AND m.is_unsent = 0
                 GROUP BY m.sender_id",
            )?;
            let counts = stmt
                .query_map([user_id], |row| Ok((row.get::<_, UserId>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
            Ok(counts)
        })
    }
}

fn window_start(now: DateTime<Utc>) -> String {
    timestamp::to_sql(now - Duration::seconds(EDIT_WINDOW_SECS))
}

pub(crate) fn query_messages(
    conn: &Connection,
    conversation_id: ConversationId,
    after: MessageId,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(SELECT_MESSAGES)?;
    let rows = stmt
        .query_map(rusqlite::params![conversation_id, after], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Flips every message the peer sent in this conversation to read.
pub(crate) fn mark_read_by(conn: &Connection, conversation_id: ConversationId, reader_id: UserId) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE messages SET is_read = 1
         WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
        rusqlite::params![conversation_id, reader_id],
    )?;
    Ok(changed)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        sent_at: timestamp::column(row, 5)?,
        edited: row.get(6)?,
        edited_at: timestamp::optional_column(row, 7)?,
        is_read: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db_with_users, t0};

    fn chat() -> (Database, UserId, UserId, ConversationId) {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let conv = db.resolve_conversation(ids[0], ids[1], t0()).unwrap();
        (db, ids[0], ids[1], conv)
    }

    fn send(db: &Database, conv: ConversationId, from: UserId, text: &str, at: DateTime<Utc>) -> MessageId {
        db.insert_message(conv, from, text, at).unwrap().unwrap().id
    }

    #[test]
    fn append_returns_id_and_timestamp() {
        let (db, alice, _, conv) = chat();
        let sent = db.insert_message(conv, alice, "hi", t0()).unwrap().unwrap();
        assert_eq!(sent.sent_at, t0());

        let msgs = db.get_messages(conv).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, sent.id);
        assert_eq!(msgs[0].sender_name, "alice");
        assert!(!msgs[0].edited);
        assert!(!msgs[0].is_read);
    }

    #[test]
    fn outsider_cannot_post_into_conversation() {
        let (db, ids) = db_with_users(&["alice", "bob", "mallory"]);
        let conv = db.resolve_conversation(ids[0], ids[1], t0()).unwrap();

        assert!(db.insert_message(conv, ids[2], "hey", t0()).unwrap().is_none());
        assert!(db.insert_message(conv + 42, ids[0], "hey", t0()).unwrap().is_none());
        assert!(db.get_messages(conv).unwrap().is_empty());
    }

    #[test]
    fn edit_window_boundary() {
        let (db, alice, _, conv) = chat();
        let id = send(&db, conv, alice, "v1", t0());

        assert!(db.edit_message(id, alice, "v2", t0() + Duration::seconds(899)).unwrap().is_some());
        assert!(db.edit_message(id, alice, "v3", t0() + Duration::seconds(900)).unwrap().is_some());
        assert!(db.edit_message(id, alice, "v4", t0() + Duration::seconds(901)).unwrap().is_none());

        let msg = &db.get_messages(conv).unwrap()[0];
        assert_eq!(msg.content, "v3");
        assert!(msg.edited);
        assert_eq!(msg.edited_at, Some(t0() + Duration::seconds(900)));
    }

    #[test]
    fn unsend_window_boundary() {
        let (db, alice, _, conv) = chat();
        let early = send(&db, conv, alice, "a", t0());
        let late = send(&db, conv, alice, "b", t0());

        assert!(db.unsend_message(early, alice, t0() + Duration::seconds(899)).unwrap());
        assert!(!db.unsend_message(late, alice, t0() + Duration::seconds(901)).unwrap());

        let remaining: Vec<_> = db.get_messages(conv).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(remaining, vec![late]);
    }

    #[test]
    fn non_sender_edit_looks_like_missing_message() {
        let (db, alice, bob, conv) = chat();
        let id = send(&db, conv, alice, "mine", t0());

        let by_other = db.edit_message(id, bob, "hijack", t0()).unwrap();
        let missing = db.edit_message(id + 1000, alice, "ghost", t0()).unwrap();
        assert_eq!(by_other, missing);
        assert!(by_other.is_none());
        assert!(!db.unsend_message(id, bob, t0()).unwrap());
        assert_eq!(db.get_messages(conv).unwrap()[0].content, "mine");
    }

    #[test]
    fn unsent_message_is_frozen_and_hidden() {
        let (db, alice, _, conv) = chat();
        let first = send(&db, conv, alice, "one", t0());
        let second = send(&db, conv, alice, "two", t0() + Duration::seconds(1));

        assert!(db.unsend_message(second, alice, t0() + Duration::seconds(2)).unwrap());
        assert!(!db.unsend_message(second, alice, t0() + Duration::seconds(3)).unwrap());
        assert!(db.edit_message(second, alice, "again", t0() + Duration::seconds(3)).unwrap().is_none());

        let all: Vec<_> = db.get_messages(conv).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(all, vec![first]);
        assert!(db.get_messages_after(conv, first).unwrap().is_empty());
        assert_eq!(db.get_messages_after(conv, 0).unwrap().len(), 1);
    }

    #[test]
    fn delta_fetch_respects_watermark_and_order() {
        let (db, alice, bob, conv) = chat();
        let a = send(&db, conv, alice, "a", t0());
        let b = send(&db, conv, bob, "b", t0() + Duration::seconds(5));
        let c = send(&db, conv, alice, "c", t0() + Duration::seconds(9));

        let full: Vec<_> = db.get_messages_after(conv, 0).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(full, vec![a, b, c]);

        let delta: Vec<_> = db.get_messages_after(conv, a).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(delta, vec![b, c]);

        assert!(db.get_messages_after(conv, c).unwrap().is_empty());
    }

    #[test]
    fn same_timestamp_orders_by_id() {
        let (db, alice, bob, conv) = chat();
        let first = send(&db, conv, bob, "x", t0());
        let second = send(&db, conv, alice, "y", t0());

        let ids: Vec<_> = db.get_messages(conv).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn unread_counts_are_per_peer() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);
        let (alice, bob, carol) = (ids[0], ids[1], ids[2]);
        let ab = db.resolve_conversation(alice, bob, t0()).unwrap();
        let ac = db.resolve_conversation(carol, alice, t0()).unwrap();

        send(&db, ab, bob, "1", t0());
        send(&db, ab, bob, "2", t0());
        send(&db, ab, alice, "mine", t0());
        send(&db, ac, carol, "3", t0());
        let gone = send(&db, ac, carol, "oops", t0());
        assert!(db.unsend_message(gone, carol, t0()).unwrap());

        let counts = db.unread_counts(alice).unwrap();
        assert_eq!(counts.get(&bob), Some(&2));
        assert_eq!(counts.get(&carol), Some(&1));
        assert_eq!(counts.len(), 2);

        let bob_counts = db.unread_counts(bob).unwrap();
        assert_eq!(bob_counts.get(&alice), Some(&1));
    }
}
