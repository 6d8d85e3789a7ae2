use crate::error::{AuthError, Result};
use crate::provider::Provider;
use crate::store::{
    CredentialStore, NewUser, Role, SessionRecord, User, VerificationTokenRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    u.id, u.email, u.name, u.password_hash, u.email_verified,
    u.google_id, u.google_email, u.facebook_id, u.facebook_email,
    u.created_at, u.updated_at,
    r.name AS role_name, r.permissions AS role_permissions
"#;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    password_hash: Option<String>,
    email_verified: bool,
    google_id: Option<String>,
    google_email: Option<String>,
    facebook_id: Option<String>,
    facebook_email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    role_name: String,
    role_permissions: Vec<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            email_verified: row.email_verified,
            google_id: row.google_id,
            google_email: row.google_email,
            facebook_id: row.facebook_id,
            facebook_email: row.facebook_email,
            role: Role {
                name: row.role_name,
                permissions: row.role_permissions.into_iter().collect(),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Maps Postgres unique-violation constraint names onto the business-level
/// conflict errors. The unique indexes are the authoritative race guard for
/// concurrent registrations and provider links.
fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some("users_email_key") => AuthError::DuplicateAccount,
                Some("users_google_id_key") | Some("users_facebook_id_key") => {
                    AuthError::ProviderAlreadyLinked
                }
                _ => AuthError::Database(err.to_string()),
            };
        }
    }
    AuthError::Database(err.to_string())
}

pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, where_clause: &str, bind: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT {} FROM users u JOIN roles r ON r.id = u.role_id WHERE {}",
            USER_COLUMNS, where_clause
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_user("u.email = $1", email).await
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!(
            "SELECT {} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>> {
        let clause = match provider {
            Provider::Google => "u.google_id = $1",
            Provider::Facebook => "u.facebook_id = $1",
        };
        self.fetch_user(clause, provider_id).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (
                email, name, password_hash, email_verified,
                google_id, google_email, facebook_id, facebook_email, role_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    (SELECT id FROM roles WHERE name = $9))
            RETURNING id
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.password_hash)
        .bind(new_user.email_verified)
        .bind(&new_user.google_id)
        .bind(&new_user.google_email)
        .bind(&new_user.facebook_id)
        .bind(&new_user.facebook_email)
        .bind(&new_user.role_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        self.find_user_by_id(id)
            .await?
            .ok_or_else(|| AuthError::Internal("Created user not found".to_string()))
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $1, name = $2, password_hash = $3, email_verified = $4,
                google_id = $5, google_email = $6,
                facebook_id = $7, facebook_email = $8,
                updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(&user.google_id)
        .bind(&user.google_email)
        .bind(&user.facebook_id)
        .bind(&user.facebook_email)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }

        self.find_user_by_id(user.id)
            .await?
            .ok_or_else(|| AuthError::Internal("Updated user not found".to_string()))
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<SessionRecord>> {
        let session = sqlx::query_as::<_, (String, Uuid, DateTime<Utc>)>(
            r#"
            SELECT token, user_id, expires_at
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session.map(|(token, user_id, expires_at)| SessionRecord {
            token,
            user_id,
            expires_at,
        }))
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_verification_token(&self, token: &VerificationTokenRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (id, user_id, email, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.email)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_verification_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<VerificationTokenRecord>> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, String, DateTime<Utc>)>(
            r#"
            SELECT id, user_id, email, token_hash, expires_at
            FROM verification_tokens
            WHERE email = $1 AND token_hash = $2
            "#,
        )
        .bind(email)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(
            row.map(|(id, user_id, email, token_hash, expires_at)| VerificationTokenRecord {
                id,
                user_id,
                email,
                token_hash,
                expires_at,
            }),
        )
    }

    async fn delete_verification_token(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_expired_verification_tokens(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM verification_tokens WHERE user_id = $1 AND expires_at < NOW()",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let row = sqlx::query_as::<_, (String, Vec<String>)>(
            "SELECT name, permissions FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(name, permissions)| Role {
            name,
            permissions: permissions.into_iter().collect(),
        }))
    }
}
