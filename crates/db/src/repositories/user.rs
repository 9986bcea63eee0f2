use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use permitdesk_core::domain::role::RoleName;
use permitdesk_core::domain::user::{RoleCount, User, UserFilter, UserId, UserStats};

use super::{
    like_pattern, parse_optional_timestamp, parse_timestamp, PageRequest, Paged, RepositoryError,
    UserRepository,
};
use crate::DbPool;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, department, phone,
    role, requested_role, is_active, is_approved, approved_by, approved_at, rejection_reason,
    created_at, updated_at";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn require(&self, id: &UserId) -> Result<User, RepositoryError> {
        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::NotFound("User".to_string()))
    }
}

fn parse_role(raw: &str) -> Result<RoleName, RepositoryError> {
    RoleName::parse(raw).ok_or_else(|| RepositoryError::Decode(format!("unknown role `{raw}`")))
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = row.try_get("role")?;
    let requested_role: Option<String> = row.try_get("requested_role")?;
    let approved_by: Option<String> = row.try_get("approved_by")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        department: row.try_get("department")?,
        phone: row.try_get("phone")?,
        role: parse_role(&role)?,
        requested_role: requested_role.as_deref().and_then(RoleName::parse),
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        is_approved: row.try_get::<i64, _>("is_approved")? != 0,
        approved_by: approved_by.map(UserId),
        approved_at: parse_optional_timestamp(row.try_get("approved_at")?),
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn push_user_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &UserFilter) {
    builder.push(" WHERE 1=1");
    if let Some(role) = filter.role {
        builder.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(is_active) = filter.is_active {
        builder.push(" AND is_active = ").push_bind(i64::from(is_active));
    }
    if let Some(is_approved) = filter.is_approved {
        builder.push(" AND is_approved = ").push_bind(i64::from(is_approved));
    }
    if let Some(search) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(search);
        builder
            .push(" AND (LOWER(email) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(first_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(last_name) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email.trim().to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert(&self, user: &User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, department, phone,
                                role, requested_role, is_active, is_approved, approved_by,
                                approved_at, rejection_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id.0)
        .bind(user.email.trim().to_ascii_lowercase())
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.department)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.requested_role.map(|role| role.as_str()))
        .bind(i64::from(user.is_active))
        .bind(i64::from(user.is_approved))
        .bind(user.approved_by.as_ref().map(|id| id.0.as_str()))
        .bind(user.approved_at.map(|at| at.to_rfc3339()))
        .bind(&user.rejection_reason)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) => {
                let error = RepositoryError::from(error);
                if error.is_unique_violation() {
                    Err(RepositoryError::Conflict(
                        "User with this email already exists".to_string(),
                    ))
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET
                 email = ?, password_hash = ?, first_name = ?, last_name = ?, department = ?,
                 phone = ?, role = ?, requested_role = ?, is_active = ?, is_approved = ?,
                 approved_by = ?, approved_at = ?, rejection_reason = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(user.email.trim().to_ascii_lowercase())
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.department)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.requested_role.map(|role| role.as_str()))
        .bind(i64::from(user.is_active))
        .bind(i64::from(user.is_approved))
        .bind(user.approved_by.as_ref().map(|id| id.0.as_str()))
        .bind(user.approved_at.map(|at| at.to_rfc3339()))
        .bind(&user.rejection_reason)
        .bind(user.updated_at.to_rfc3339())
        .bind(&user.id.0)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(RepositoryError::NotFound("User".to_string()))
            }
            Ok(_) => Ok(()),
            Err(error) => {
                let error = RepositoryError::from(error);
                if error.is_unique_violation() {
                    Err(RepositoryError::Conflict("Email is already in use".to_string()))
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Paged<User>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let items = rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()?;
        Ok(Paged { items, total, page })
    }

    async fn approve(
        &self,
        id: &UserId,
        approved_by: &UserId,
        at: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let current = self.require(id).await?;
        if current.is_approved || !current.is_active {
            return Err(RepositoryError::Conflict("User has already been processed".to_string()));
        }
        let granted = current.requested_role.unwrap_or(current.role);

        let result = sqlx::query(
            "UPDATE users SET
                 is_approved = 1, role = ?, requested_role = NULL, approved_by = ?,
                 approved_at = ?, rejection_reason = NULL, updated_at = ?
             WHERE id = ? AND is_approved = 0 AND is_active = 1",
        )
        .bind(granted.as_str())
        .bind(&approved_by.0)
        .bind(at.to_rfc3339())
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict("User has already been processed".to_string()));
        }
        self.require(id).await
    }

    async fn reject(
        &self,
        id: &UserId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let current = self.require(id).await?;
        if current.is_approved || !current.is_active {
            return Err(RepositoryError::Conflict("User has already been processed".to_string()));
        }

        let result = sqlx::query(
            "UPDATE users SET is_approved = 0, is_active = 0, rejection_reason = ?, updated_at = ?
             WHERE id = ? AND is_approved = 0 AND is_active = 1",
        )
        .bind(reason)
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict("User has already been processed".to_string()));
        }
        self.require(id).await
    }

    async fn deactivate(&self, id: &UserId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<UserStats, RepositoryError> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0) AS active,
                    COALESCE(SUM(CASE WHEN is_active = 1 AND is_approved = 0 THEN 1 ELSE 0 END), 0)
                        AS pending
             FROM users",
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = totals.try_get("total")?;
        let active: i64 = totals.try_get("active")?;
        let pending_approval: i64 = totals.try_get("pending")?;

        let rows =
            sqlx::query("SELECT role, COUNT(*) AS count FROM users GROUP BY role ORDER BY role")
                .fetch_all(&self.pool)
                .await?;
        let mut by_role = Vec::with_capacity(rows.len());
        for row in &rows {
            let role: String = row.try_get("role")?;
            by_role.push(RoleCount { role: parse_role(&role)?, count: row.try_get("count")? });
        }

        Ok(UserStats { total, active, inactive: total - active, pending_approval, by_role })
    }
}
