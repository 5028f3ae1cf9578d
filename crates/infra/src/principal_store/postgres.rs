//! Postgres-backed principal store.
//!
//! Expected schema (owned by the user-management service):
//!
//! | Table | Columns used |
//! |-------|--------------|
//! | `users` | `id uuid`, `email text unique`, `name text`, `password_hash text null`, `active bool`, `created_at`, `updated_at`, `last_login_at null` |
//! | `roles` | `id uuid`, `name text unique` |
//! | `user_roles` | `user_id`, `role_id`, `assigned_at` |
//! | `user_groups` / `group_roles` | group membership and group role grants |
//!
//! A principal's roles are the union of its direct grants and the grants of
//! every group it belongs to.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | everything else | any | `Backend` |

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use algoshield_auth::memory::DEFAULT_ROLE;
use algoshield_auth::{
    NewPrincipal, PasswordVerifier, Principal, PrincipalId, PrincipalStore, PrincipalWithVerifier, Role, RoleId,
    RoleSet, StoreError,
};

const USER_COLUMNS: &str = "id, email, name, password_hash, active, created_at, updated_at, last_login_at";

#[derive(Debug, Clone)]
pub struct PostgresPrincipalStore {
    pool: PgPool,
}

impl PostgresPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`. `acquire_timeout` bounds the wait
    /// for a free connection.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(&self, value: UserKey<'_>) -> Result<Option<UserRow>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {}", value.predicate());
        let query = sqlx::query(&sql);
        let query = match value {
            UserKey::Email(email) => query.bind(email.to_lowercase()),
            UserKey::Id(id) => query.bind(id),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_user", e))?;
        row.as_ref()
            .map(UserRow::from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("decode_user", e))
    }

    async fn load_roles(&self, user_id: Uuid) -> Result<RoleSet, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name
            FROM roles r
            INNER JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = $1
            UNION
            SELECT r.id, r.name
            FROM roles r
            INNER JOIN group_roles gr ON r.id = gr.role_id
            INNER JOIN user_groups ug ON gr.group_id = ug.group_id
            WHERE ug.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_roles", e))?;

        rows.iter()
            .map(|row| -> Result<Role, sqlx::Error> {
                let id: Uuid = row.try_get("id")?;
                let name: String = row.try_get("name")?;
                Ok(Role::new(RoleId::from_uuid(id), name))
            })
            .collect::<Result<RoleSet, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_roles", e))
    }

    async fn hydrate(&self, row: UserRow) -> Result<(Principal, Option<String>), StoreError> {
        let roles = self.load_roles(row.id).await?;
        Ok(row.into_principal(roles))
    }

    async fn find(&self, key: UserKey<'_>) -> Result<Option<(Principal, Option<String>)>, StoreError> {
        match self.fetch_user(key).await? {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Copy)]
enum UserKey<'a> {
    Email(&'a str),
    Id(Uuid),
}

impl UserKey<'_> {
    /// Emails compare case-insensitively, also against rows stored before
    /// normalisation was enforced.
    fn predicate(&self) -> &'static str {
        match self {
            UserKey::Email(_) => "lower(email) = $1",
            UserKey::Id(_) => "id = $1",
        }
    }
}

struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            password_hash: row.try_get("password_hash")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_login_at: row.try_get("last_login_at")?,
        })
    }

    fn into_principal(self, roles: RoleSet) -> (Principal, Option<String>) {
        let principal = Principal {
            id: PrincipalId::from_uuid(self.id),
            email: self.email,
            name: self.name,
            active: self.active,
            roles,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        (principal, self.password_hash.filter(|h| !h.is_empty()))
    }
}

fn with_verifier(found: Option<(Principal, Option<String>)>) -> Option<PrincipalWithVerifier> {
    let (principal, hash) = found?;
    Some(PrincipalWithVerifier {
        principal,
        verifier: PasswordVerifier::new(hash?),
    })
}

async fn assign_default_role(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<(), StoreError> {
    let role_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1 LIMIT 1")
        .bind(DEFAULT_ROLE)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("find_default_role", e))?;

    let Some(role_id) = role_id else {
        tracing::warn!(%user_id, "default role '{DEFAULT_ROLE}' not found; principal created without roles");
        return Ok(());
    };

    sqlx::query("INSERT INTO user_roles (user_id, role_id, assigned_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(role_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("assign_default_role", e))?;
    Ok(())
}

#[async_trait::async_trait]
impl PrincipalStore for PostgresPrincipalStore {
    #[instrument(skip(self, email), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.find(UserKey::Email(email)).await?.map(|(p, _)| p))
    }

    #[instrument(skip(self, email), err)]
    async fn find_by_email_with_verifier(&self, email: &str) -> Result<Option<PrincipalWithVerifier>, StoreError> {
        Ok(with_verifier(self.find(UserKey::Email(email)).await?))
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.find(UserKey::Id(*id.as_uuid())).await?.map(|(p, _)| p))
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn find_by_id_with_verifier(&self, id: PrincipalId) -> Result<Option<PrincipalWithVerifier>, StoreError> {
        Ok(with_verifier(self.find(UserKey::Id(*id.as_uuid())).await?))
    }

    #[instrument(skip(self, new), err)]
    async fn create(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let id = PrincipalId::new();
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, auth_type, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'local', TRUE, $5, $5)
            "#,
        )
        .bind(*id.as_uuid())
        .bind(new.email.to_lowercase())
        .bind(&new.name)
        .bind(new.verifier.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        assign_default_role(&mut tx, *id.as_uuid()).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let roles = self.load_roles(*id.as_uuid()).await?;
        Ok(Principal {
            id,
            email: new.email.to_lowercase(),
            name: new.name,
            active: true,
            roles,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self), fields(principal_id = %id), err)]
    async fn update_last_login(&self, id: PrincipalId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET last_login_at = $1, updated_at = $2 WHERE id = $3")
            .bind(at)
            .bind(Utc::now())
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_last_login", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, verifier), fields(principal_id = %id), err)]
    async fn update_password_verifier(&self, id: PrincipalId, verifier: PasswordVerifier) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(verifier.as_str())
            .bind(Utc::now())
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_password_verifier", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => StoreError::Conflict,
        sqlx::Error::Database(db_err) => {
            StoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => StoreError::Backend(format!("connection pool timed out in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_lookup_ignores_stored_case() {
        assert_eq!(UserKey::Email("a@x.io").predicate(), "lower(email) = $1");
        assert_eq!(UserKey::Id(Uuid::nil()).predicate(), "id = $1");
    }

    #[test]
    fn pool_timeout_is_a_backend_error() {
        let err = map_sqlx_error("create", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("create")));
    }
}
