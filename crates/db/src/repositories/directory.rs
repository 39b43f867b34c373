use sqlx::sqlite::SqliteRow;

use claimdesk_core::domain::booking::{ConferenceRoom, RoomId};
use claimdesk_core::domain::category::{Category, CategoryId};
use claimdesk_core::domain::role::PortalRole;
use claimdesk_core::domain::user::User;

use super::codec::{bool_column, enum_column, get, optional_decimal_column, u32_column};
use super::{DirectoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        email: get(row, "email")?,
        full_name: get(row, "full_name")?,
        department: get(row, "department")?,
        designation: get(row, "designation")?,
        portal_role: enum_column(row, "portal_role", PortalRole::parse)?,
        is_active: bool_column(row, "is_active")?,
    })
}

fn row_to_category(row: &SqliteRow) -> Result<Category, RepositoryError> {
    Ok(Category {
        id: CategoryId(get(row, "id")?),
        category_name: get(row, "category_name")?,
        title: get(row, "title")?,
        bill_required: bool_column(row, "bill_required")?,
        policy_limit: optional_decimal_column(row, "policy_limit")?,
        is_sales_promotion: bool_column(row, "is_sales_promotion")?,
        is_torch_bearer: bool_column(row, "is_torch_bearer")?,
        is_active: bool_column(row, "is_active")?,
    })
}

fn row_to_room(row: &SqliteRow) -> Result<ConferenceRoom, RepositoryError> {
    Ok(ConferenceRoom {
        id: RoomId(get(row, "id")?),
        name: get(row, "name")?,
        location: get(row, "location")?,
        capacity: u32_column(row, "capacity")?,
        is_active: bool_column(row, "is_active")?,
    })
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn find_user(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT email, full_name, department, designation, portal_role, is_active
             FROM portal_user WHERE email = ?",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT email, full_name, department, designation, portal_role, is_active
             FROM portal_user ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO portal_user (email, full_name, department, designation, portal_role,
                                      is_active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET
                 full_name = excluded.full_name,
                 department = excluded.department,
                 designation = excluded.designation,
                 portal_role = excluded.portal_role,
                 is_active = excluded.is_active",
        )
        .bind(user.email.trim())
        .bind(&user.full_name)
        .bind(&user.department)
        .bind(&user.designation)
        .bind(user.portal_role.as_str())
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, category_name, title, bill_required, policy_limit, is_sales_promotion,
                    is_torch_bearer, is_active
             FROM category WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_category).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, category_name, title, bill_required, policy_limit, is_sales_promotion,
                    is_torch_bearer, is_active
             FROM category ORDER BY category_name, title",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_category).collect()
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO category (id, category_name, title, bill_required, policy_limit,
                                   is_sales_promotion, is_torch_bearer, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 category_name = excluded.category_name,
                 title = excluded.title,
                 bill_required = excluded.bill_required,
                 policy_limit = excluded.policy_limit,
                 is_sales_promotion = excluded.is_sales_promotion,
                 is_torch_bearer = excluded.is_torch_bearer,
                 is_active = excluded.is_active",
        )
        .bind(&category.id.0)
        .bind(&category.category_name)
        .bind(&category.title)
        .bind(category.bill_required)
        .bind(category.policy_limit.map(|limit| limit.to_string()))
        .bind(category.is_sales_promotion)
        .bind(category.is_torch_bearer)
        .bind(category.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_room(&self, id: &RoomId) -> Result<Option<ConferenceRoom>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, location, capacity, is_active FROM conference_room WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_room).transpose()
    }

    async fn list_rooms(&self) -> Result<Vec<ConferenceRoom>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, location, capacity, is_active FROM conference_room ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_room).collect()
    }

    async fn save_room(&self, room: ConferenceRoom) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conference_room (id, name, location, capacity, is_active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 location = excluded.location,
                 capacity = excluded.capacity,
                 is_active = excluded.is_active",
        )
        .bind(&room.id.0)
        .bind(&room.name)
        .bind(&room.location)
        .bind(i64::from(room.capacity))
        .bind(room.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
