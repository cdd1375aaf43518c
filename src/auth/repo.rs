use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{ProfileMetadata, Role, User};

/// Fields needed to create a user; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub mobile: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub profile: ProfileMetadata,
}

/// User-record persistence keyed by mobile number.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>>;

    /// Inserts atomically with respect to the uniqueness check.
    /// Returns `None` when the mobile number is already taken; the existing record is untouched.
    async fn insert_if_absent(&self, user: NewUser) -> anyhow::Result<Option<User>>;
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(mobile).cloned())
    }

    async fn insert_if_absent(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        use std::collections::hash_map::Entry;

        let mut users = self.users.write().await;
        match users.entry(user.mobile.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let record = User {
                    id: Uuid::new_v4(),
                    mobile: user.mobile,
                    full_name: user.full_name,
                    password_hash: user.password_hash,
                    role: user.role,
                    profile: user.profile,
                    created_at: OffsetDateTime::now_utc(),
                };
                Ok(Some(slot.insert(record).clone()))
            }
        }
    }
}

/// Postgres-backed store; uniqueness comes from the `users.mobile` constraint.
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_mobile(&self, mobile: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, mobile, full_name, password_hash, role,
                   email, province, district, referral_code, profile_image, created_at
            FROM users
            WHERE mobile = $1
            "#,
        )
        .bind(mobile)
        .fetch_optional(&self.db)
        .await
        .context("find user by mobile")?;
        Ok(user)
    }

    async fn insert_if_absent(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, mobile, full_name, password_hash, role,
                               email, province, district, referral_code, profile_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (mobile) DO NOTHING
            RETURNING id, mobile, full_name, password_hash, role,
                      email, province, district, referral_code, profile_image, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.mobile)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(&user.profile.email)
        .bind(&user.profile.province)
        .bind(&user.profile.district)
        .bind(&user.profile.referral_code)
        .bind(&user.profile.profile_image)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user(mobile: &str, name: &str) -> NewUser {
        NewUser {
            mobile: mobile.into(),
            full_name: name.into(),
            password_hash: "hash".into(),
            role: Role::new("farmer"),
            profile: ProfileMetadata::default(),
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = InMemoryCredentialStore::new();
        let created = store
            .insert_if_absent(new_user("+260961234567", "Mwila Banda"))
            .await
            .unwrap()
            .expect("inserted");
        let found = store.find_by_mobile("+260961234567").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.full_name, "Mwila Banda");
        assert!(store.find_by_mobile("+260970000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_keeps_first_record() {
        let store = InMemoryCredentialStore::new();
        store
            .insert_if_absent(new_user("+260961234567", "First"))
            .await
            .unwrap();
        let second = store
            .insert_if_absent(new_user("+260961234567", "Second"))
            .await
            .unwrap();
        assert!(second.is_none());
        let kept = store.find_by_mobile("+260961234567").await.unwrap().unwrap();
        assert_eq!(kept.full_name, "First");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_admit_exactly_one() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_if_absent(new_user("+260961234567", &format!("user {i}")))
                    .await
                    .unwrap()
                    .is_some()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.len().await, 1);
    }
}
