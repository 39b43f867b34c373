use sqlx::sqlite::SqliteRow;

use claimdesk_core::domain::claim::{ClaimStatus, ClaimType};
use claimdesk_core::domain::role::PortalRole;
use claimdesk_core::domain::workflow_config::{WorkflowStageConfig, WorkflowStageId};

use super::codec::{bool_column, enum_column, get, u32_column};
use super::{RepositoryError, WorkflowConfigRepository};
use crate::DbPool;

pub struct SqlWorkflowConfigRepository {
    pool: DbPool,
}

impl SqlWorkflowConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_stage(row: &SqliteRow) -> Result<WorkflowStageConfig, RepositoryError> {
    Ok(WorkflowStageConfig {
        id: WorkflowStageId(get(row, "id")?),
        workflow_type: enum_column(row, "workflow_type", ClaimType::parse)?,
        stage_order: u32_column(row, "stage_order")?,
        stage_name: get(row, "stage_name")?,
        approver_role: enum_column(row, "approver_role", PortalRole::parse)?,
        status_on_approve: enum_column(row, "status_on_approve", ClaimStatus::parse)?,
        is_active: bool_column(row, "is_active")?,
        can_skip_for_torch_bearer: bool_column(row, "can_skip_for_torch_bearer")?,
    })
}

#[async_trait::async_trait]
impl WorkflowConfigRepository for SqlWorkflowConfigRepository {
    async fn list_stages(&self) -> Result<Vec<WorkflowStageConfig>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, workflow_type, stage_order, stage_name, approver_role,
                    status_on_approve, is_active, can_skip_for_torch_bearer
             FROM workflow_stage ORDER BY workflow_type, stage_order",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stage).collect()
    }

    async fn save_stage(&self, stage: WorkflowStageConfig) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_stage (id, workflow_type, stage_order, stage_name,
                                         approver_role, status_on_approve, is_active,
                                         can_skip_for_torch_bearer)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 workflow_type = excluded.workflow_type,
                 stage_order = excluded.stage_order,
                 stage_name = excluded.stage_name,
                 approver_role = excluded.approver_role,
                 status_on_approve = excluded.status_on_approve,
                 is_active = excluded.is_active,
                 can_skip_for_torch_bearer = excluded.can_skip_for_torch_bearer",
        )
        .bind(&stage.id.0)
        .bind(stage.workflow_type.as_str())
        .bind(i64::from(stage.stage_order))
        .bind(&stage.stage_name)
        .bind(stage.approver_role.as_str())
        .bind(stage.status_on_approve.as_str())
        .bind(stage.is_active)
        .bind(stage.can_skip_for_torch_bearer)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use claimdesk_core::domain::claim::{ClaimStatus, ClaimType};
    use claimdesk_core::domain::role::PortalRole;
    use claimdesk_core::domain::workflow_config::{WorkflowStageConfig, WorkflowStageId};
    use claimdesk_core::workflow::WorkflowTable;

    use super::SqlWorkflowConfigRepository;
    use crate::repositories::WorkflowConfigRepository;
    use crate::{connect_with_settings, migrations};

    fn stage(order: u32, role: PortalRole, status: ClaimStatus) -> WorkflowStageConfig {
        WorkflowStageConfig {
            id: WorkflowStageId(format!("normal-{order}")),
            workflow_type: ClaimType::Normal,
            stage_order: order,
            stage_name: format!("Stage {order}"),
            approver_role: role,
            status_on_approve: status,
            is_active: true,
            can_skip_for_torch_bearer: order == 2,
        }
    }

    #[tokio::test]
    async fn stored_stages_come_back_in_order_and_build_a_table() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlWorkflowConfigRepository::new(pool);

        repo.save_stage(stage(3, PortalRole::AdminHead, ClaimStatus::AdminApproved))
            .await
            .expect("save");
        repo.save_stage(stage(2, PortalRole::Manager, ClaimStatus::ManagerApproved))
            .await
            .expect("save");
        repo.save_stage(stage(1, PortalRole::JuniorAdmin, ClaimStatus::Verified))
            .await
            .expect("save");

        let stages = repo.list_stages().await.expect("list");
        let orders: Vec<_> = stages.iter().map(|stage| stage.stage_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);

        let table = WorkflowTable::from_stages(&stages).expect("table");
        assert_eq!(table.first_approver(ClaimType::Normal, false), Some(PortalRole::JuniorAdmin));
        assert_eq!(table.rules(ClaimType::Normal, false).len(), 3);
        assert_eq!(table.rules(ClaimType::Normal, true).len(), 2);
    }
}
