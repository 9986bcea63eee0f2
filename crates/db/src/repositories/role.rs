use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use permitdesk_core::domain::role::{Role, RoleId, RoleName};
use permitdesk_core::encoding::{decode_list, encode_list};

use super::{parse_timestamp, RepositoryError, RoleRepository};
use crate::DbPool;

pub struct SqlRoleRepository {
    pool: DbPool,
}

impl SqlRoleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_role(row: &SqliteRow) -> Result<Role, RepositoryError> {
    let name: String = row.try_get("name")?;
    let permissions: Option<String> = row.try_get("permissions")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Role {
        id: RoleId(row.try_get("id")?),
        name: RoleName::parse(&name)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{name}`")))?,
        description: row.try_get("description")?,
        permissions: decode_list(permissions.as_deref()),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

#[async_trait::async_trait]
impl RoleRepository for SqlRoleRepository {
    async fn list(&self) -> Result<Vec<Role>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, description, permissions, created_at, updated_at
             FROM roles ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_role).collect()
    }

    async fn find_by_id(&self, id: &RoleId) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, permissions, created_at, updated_at
             FROM roles WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_role).transpose()
    }

    /// Only the description and permission set are editable; the name is fixed by migration.
    async fn update(&self, role: &Role) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE roles SET description = ?, permissions = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&role.description)
        .bind(encode_list(&role.permissions))
        .bind(role.updated_at.to_rfc3339())
        .bind(&role.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Role".to_string()));
        }
        Ok(())
    }
}
