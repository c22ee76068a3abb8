//! Identity directory: external identity -> local user.
//!
//! Lookup by external id scans every `user:` record, so logins cost
//! O(total users). That is a known scaling limit of the key/value layout.

use tracing::info;
use uuid::Uuid;

use parley_types::models::User;

use crate::Result;
use crate::store::{self, Store, user_key};

/// Profile fields reported by the identity provider. Absent or blank
/// fields never overwrite stored values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Field-by-field merge: incoming wins only when non-empty. The credential
/// is always replaced.
pub fn merge(mut existing: User, incoming: &Profile, credential: &str) -> User {
    if let Some(name) = non_blank(&incoming.name) {
        existing.name = name;
    }
    if let Some(email) = non_blank(&incoming.email) {
        existing.email = Some(email);
    }
    if let Some(avatar_url) = non_blank(&incoming.avatar_url) {
        existing.avatar_url = Some(avatar_url);
    }
    existing.credential = credential.to_string();
    existing
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn get<S: Store + ?Sized>(store: &S, id: Uuid) -> Result<Option<User>> {
    store::load(store, &user_key(id))
}

pub fn save<S: Store + ?Sized>(store: &S, user: &User) -> Result<()> {
    store::save(store, &user_key(user.id), user)
}

pub fn find_by_external_id<S: Store + ?Sized>(store: &S, external_id: &str) -> Result<Option<User>> {
    for key in store.scan_keys("user:")? {
        if let Some(user) = store::load::<User, _>(store, &key)? {
            if user.external_id == external_id {
                return Ok(Some(user));
            }
        }
    }
    Ok(None)
}

/// Returns the user bound to `external_id`, creating it on first login.
/// Not safe against concurrent first logins for the same id; callers
/// serialize logins.
pub fn find_or_create<S: Store + ?Sized>(
    store: &S,
    external_id: &str,
    profile: &Profile,
    credential: &str,
) -> Result<User> {
    let user = match find_by_external_id(store, external_id)? {
        Some(existing) => merge(existing, profile, credential),
        None => {
            let user = User {
                id: Uuid::new_v4(),
                external_id: external_id.to_string(),
                name: non_blank(&profile.name).unwrap_or_default(),
                email: non_blank(&profile.email),
                avatar_url: non_blank(&profile.avatar_url),
                credential: credential.to_string(),
                conversation_ids: vec![],
            };
            info!("Created user {} for external id {}", user.id, external_id);
            user
        }
    };

    save(store, &user)?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, Error};

    fn profile(name: &str, email: Option<&str>) -> Profile {
        Profile {
            name: Some(name.to_string()),
            email: email.map(str::to_string),
            avatar_url: None,
        }
    }

    #[test]
    fn find_or_create_is_stable_per_external_id() {
        let db = Database::open_in_memory().unwrap();

        let first = find_or_create(&db, "li-42", &profile("Ada", None), "tok-1").unwrap();
        let second = find_or_create(&db, "li-42", &profile("Ada L", None), "tok-2").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.scan_keys("user:").unwrap().len(), 1);

        let stored = get(&db, first.id).unwrap().unwrap();
        assert_eq!(stored.name, "Ada L");
        assert_eq!(stored.credential, "tok-2");
    }

    #[test]
    fn new_user_has_empty_index_and_default_name() {
        let db = Database::open_in_memory().unwrap();
        let user = find_or_create(&db, "li-1", &Profile::default(), "tok").unwrap();

        assert_eq!(user.name, "");
        assert_eq!(user.email, None);
        assert!(user.conversation_ids.is_empty());
    }

    #[test]
    fn distinct_external_ids_get_distinct_users() {
        let db = Database::open_in_memory().unwrap();
        let a = find_or_create(&db, "li-a", &profile("A", None), "t").unwrap();
        let b = find_or_create(&db, "li-b", &profile("B", None), "t").unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(find_by_external_id(&db, "li-b").unwrap().unwrap().id, b.id);
        assert!(find_by_external_id(&db, "li-c").unwrap().is_none());
    }

    #[test]
    fn merge_keeps_existing_when_incoming_blank() {
        let db = Database::open_in_memory().unwrap();
        let user = find_or_create(&db, "li-1", &profile("Ada", Some("ada@x.io")), "t1").unwrap();

        let merged = merge(
            user.clone(),
            &Profile {
                name: Some("   ".into()),
                email: None,
                avatar_url: Some("https://img/ada.png".into()),
            },
            "t2",
        );

        assert_eq!(merged.name, "Ada");
        assert_eq!(merged.email.as_deref(), Some("ada@x.io"));
        assert_eq!(merged.avatar_url.as_deref(), Some("https://img/ada.png"));
        assert_eq!(merged.credential, "t2");
        assert_eq!(merged.conversation_ids, user.conversation_ids);
    }

    #[test]
    fn get_unknown_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(get(&db, Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn corrupt_user_record_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        db.set("user:broken", b"{oops").unwrap();

        let err = find_by_external_id(&db, "li-1").unwrap_err();
        assert!(matches!(err, Error::CorruptData { .. }));
    }
}
