use anyhow::{Result, anyhow, ensure};
use chrono::{DateTime, Utc};
use nexus_types::models::{ConversationId, UserId};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::Database;
use crate::messages::{mark_read_by, query_messages};
use crate::models::OpenedConversation;
use crate::timestamp;

impl Database {
    /// Finds or creates the conversation for the unordered pair `{a, b}`.
    pub fn resolve_conversation(&self, a: UserId, b: UserId, now: DateTime<Utc>) -> Result<ConversationId> {
        self.with_tx(|tx| resolve(tx, a, b, now))
    }

    /// The other participant of `conversation_id`, or `None` if `user_id`
    /// is not part of it.
    pub fn conversation_peer(&self, conversation_id: ConversationId, user_id: UserId) -> Result<Option<UserId>> {
        self.with_conn(|conn| {
            let peer = conn
                .query_row(
                    "SELECT CASE WHEN user1_id = ?2 THEN user2_id ELSE user1_id END
                     FROM conversations
                     WHERE id = ?1 AND (user1_id = ?2 OR user2_id = ?2)",
                    rusqlite::params![conversation_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(peer)
        })
    }

    /// Opens `user_id`'s conversation with `peer_id`: resolves it, reads the
    /// visible history and marks everything the peer sent as read, all in one
    /// transaction. This read has a write side effect.
    pub fn open_conversation(&self, user_id: UserId, peer_id: UserId, now: DateTime<Utc>) -> Result<OpenedConversation> {
        self.with_tx(|tx| {
            let conversation_id = resolve(tx, user_id, peer_id, now)?;
            let messages = query_messages(tx, conversation_id, 0)?;
            let marked_read = mark_read_by(tx, conversation_id, user_id)?;

            Ok(OpenedConversation {
                conversation_id,
                messages,
                marked_read,
            })
        })
    }
}

fn resolve(conn: &Connection, a: UserId, b: UserId, now: DateTime<Utc>) -> Result<ConversationId> {
    ensure!(a != b, "A conversation needs two distinct users (got {} twice)", a);
    let (low, high) = if a < b { (a, b) } else { (b, a) };

    if let Some(id) = find(conn, low, high)? {
        return Ok(id);
    }

    let inserted = conn.execute(
        "INSERT INTO conversations (user1_id, user2_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user1_id, user2_id) DO NOTHING",
        rusqlite::params![low, high, timestamp::to_sql(timestamp::truncate(now))],
    )?;
    if inserted == 0 {
        debug!("Conversation ({}, {}) was created concurrently, re-reading", low, high);
    }

    find(conn, low, high)?.ok_or_else(|| anyhow!("Conversation ({}, {}) missing after insert", low, high))
}

// Pairs are stored low id first, so one lookup covers both orders.
fn find(conn: &Connection, low: UserId, high: UserId) -> Result<Option<ConversationId>> {
    let id = conn
        .query_row(
            "SELECT id FROM conversations WHERE user1_id = ?1 AND user2_id = ?2",
            [low, high],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db_with_users, t0};
    use chrono::Duration;
    use nexus_types::models::Role;
    use std::sync::Arc;

    #[test]
    fn pair_resolves_to_same_conversation_in_either_order() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let forward = db.resolve_conversation(ids[0], ids[1], t0()).unwrap();
        let backward = db.resolve_conversation(ids[1], ids[0], t0()).unwrap();
        let opened = db.open_conversation(ids[1], ids[0], t0()).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward, opened.conversation_id);

        let rows: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn stored_pair_is_canonically_ordered() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        db.resolve_conversation(ids[1], ids[0], t0()).unwrap();

        let (u1, u2): (UserId, UserId) = db
            .with_conn(|c| {
                Ok(c.query_row("SELECT user1_id, user2_id FROM conversations", [], |r| {
                    Ok((r.get(0)?, r.get(1)?))
                })?)
            })
            .unwrap();
        assert!(u1 < u2);
    }

    #[test]
    fn self_conversation_is_rejected() {
        let (db, ids) = db_with_users(&["alice"]);
        assert!(db.resolve_conversation(ids[0], ids[0], t0()).is_err());
    }

    #[test]
    fn unknown_peer_violates_foreign_key() {
        let (db, ids) = db_with_users(&["alice"]);
        assert!(db.resolve_conversation(ids[0], ids[0] + 99, t0()).is_err());
    }

    #[test]
    fn peer_lookup_requires_membership() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);
        let conv = db.resolve_conversation(ids[0], ids[1], t0()).unwrap();

        assert_eq!(db.conversation_peer(conv, ids[0]).unwrap(), Some(ids[1]));
        assert_eq!(db.conversation_peer(conv, ids[1]).unwrap(), Some(ids[0]));
        assert_eq!(db.conversation_peer(conv, ids[2]).unwrap(), None);
    }

    #[test]
    fn opening_clears_unread_until_peer_writes_again() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let (alice, bob) = (ids[0], ids[1]);
        let conv = db.resolve_conversation(alice, bob, t0()).unwrap();
        db.insert_message(conv, bob, "ping", t0()).unwrap().unwrap();
        db.insert_message(conv, alice, "mine", t0()).unwrap().unwrap();
        assert_eq!(db.unread_counts(alice).unwrap().get(&bob), Some(&1));

        let opened = db.open_conversation(alice, bob, t0() + Duration::seconds(1)).unwrap();
        assert_eq!(opened.marked_read, 1);
        assert_eq!(opened.messages.len(), 2);
        // Returned rows show read-state from before the open.
        assert!(!opened.messages[0].is_read);
        assert_eq!(db.unread_counts(alice).unwrap().get(&bob), None);
        // Alice's own message is untouched: Bob has not read it yet.
        assert_eq!(db.unread_counts(bob).unwrap().get(&alice), Some(&1));

        db.insert_message(conv, bob, "pong", t0() + Duration::seconds(2)).unwrap().unwrap();
        assert_eq!(db.unread_counts(alice).unwrap().get(&bob), Some(&1));
    }

    #[test]
    fn concurrent_first_contact_creates_one_row() {
        let path = std::env::temp_dir().join(format!("nexus-race-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let setup = Database::open(&path).unwrap();
        let alice = setup.create_user("alice", "hash", Role::Member).unwrap().unwrap();
        let bob = setup.create_user("bob", "hash", Role::Member).unwrap().unwrap();
        drop(setup);

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = [(alice, bob), (bob, alice)]
            .into_iter()
            .map(|(me, peer)| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    barrier.wait();
                    db.resolve_conversation(me, peer, t0()).unwrap()
                })
            })
            .collect();

        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids[0], ids[1]);

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
