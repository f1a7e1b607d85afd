use std::collections::{BTreeMap, HashMap};

use axum::{Extension, Json, extract::State, response::IntoResponse};

use nexus_db::Database;
use nexus_types::Outcome;
use nexus_types::api::{ContactListResponse, ContactResponse, UnreadCountsResponse};
use nexus_types::models::{Identity, UserId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::presence::mark_active;
use crate::{degrade, with_db};

/// GET /contacts: every other user, annotated with presence and unread count.
/// Counts as activity for the caller.
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    mark_active(&state, user_id).await;
    let contacts = with_db(&state, move |db| load_contacts(db, user_id)).await?;
    Ok(Json(contacts))
}

/// GET /unread: per-peer unread counts for polling clients.
pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let lookup = with_db(&state, move |db| Ok(load_unread(db, user_id))).await;

    // Even a failed blocking task is a degraded read here, not an error.
    let (counts, degraded) = match lookup {
        Ok(outcome) => outcome.into_parts(),
        Err(e) => degrade("unread", Err(e.into()), BTreeMap::new).into_parts(),
    };
    Ok(Json(UnreadCountsResponse { counts, degraded }))
}

/// Builds the contact list. Only the user listing itself is critical;
/// presence and unread annotations fall back to offline and zero.
pub fn load_contacts(db: &Database, user_id: UserId) -> anyhow::Result<ContactListResponse> {
    let users = db.list_users_except(user_id)?;
    let presence = degrade("status", db.all_presence(), HashMap::new);
    let unread = load_unread(db, user_id);

    let contacts = users
        .into_iter()
        .map(|user| {
            let p = presence.value().get(&user.id).cloned().unwrap_or_default();
            let unread_count = unread.value().get(&user.id).copied().unwrap_or(0);
            ContactResponse {
                user_id: user.id,
                username: user.username,
                is_online: p.is_online,
                last_seen: p.last_seen,
                unread_count,
            }
        })
        .collect();

    Ok(ContactListResponse {
        contacts,
        status_degraded: presence.is_degraded(),
        unread_degraded: unread.is_degraded(),
    })
}

pub fn load_unread(db: &Database, user_id: UserId) -> Outcome<BTreeMap<UserId, i64>> {
    degrade("unread", db.unread_counts(user_id), BTreeMap::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_types::models::Role;

    fn seeded() -> (Database, UserId, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice", "h", Role::Member).unwrap().unwrap();
        let bob = db.create_user("bob", "h", Role::Member).unwrap().unwrap();
        let carol = db.create_user("carol", "h", Role::Member).unwrap().unwrap();

        let conv = db.resolve_conversation(alice, bob, Utc::now()).unwrap();
        db.insert_message(conv, bob, "hello", Utc::now()).unwrap().unwrap();
        db.set_presence(bob, true, Utc::now()).unwrap();
        (db, alice, bob, carol)
    }

    fn drop_table(db: &Database, table: &str) {
        db.with_conn(|c| Ok(c.execute_batch(&format!("DROP TABLE {}", table))?))
            .unwrap();
    }

    #[test]
    fn contacts_carry_presence_and_unread() {
        let (db, alice, bob, carol) = seeded();
        let list = load_contacts(&db, alice).unwrap();

        assert!(!list.status_degraded);
        assert!(!list.unread_degraded);
        assert_eq!(list.contacts.len(), 2);

        let b = list.contacts.iter().find(|c| c.user_id == bob).unwrap();
        assert!(b.is_online);
        assert_eq!(b.unread_count, 1);

        let c = list.contacts.iter().find(|c| c.user_id == carol).unwrap();
        assert!(!c.is_online);
        assert!(c.last_seen.is_none());
        assert_eq!(c.unread_count, 0);
    }

    #[test]
    fn broken_status_table_degrades_to_offline() {
        let (db, alice, _, _) = seeded();
        drop_table(&db, "user_status");

        let list = load_contacts(&db, alice).unwrap();
        assert!(list.status_degraded);
        assert!(!list.unread_degraded);
        assert!(list.contacts.iter().all(|c| !c.is_online && c.last_seen.is_none()));
    }

    #[test]
    fn broken_message_table_degrades_to_zero_unread() {
        let (db, alice, _, _) = seeded();
        drop_table(&db, "messages");

        let unread = load_unread(&db, alice);
        assert_eq!(unread, Outcome::Degraded(BTreeMap::new()));

        let list = load_contacts(&db, alice).unwrap();
        assert!(list.unread_degraded);
        assert!(list.contacts.iter().all(|c| c.unread_count == 0));
    }

    #[test]
    fn broken_user_table_is_a_hard_failure() {
        let (db, alice, _, _) = seeded();
        db.with_conn(|c| Ok(c.execute_batch("PRAGMA foreign_keys = OFF; DROP TABLE users;")?))
            .unwrap();
        assert!(load_contacts(&db, alice).is_err());
    }
}
