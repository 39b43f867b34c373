use serde::{Deserialize, Serialize};

use crate::domain::claim::{ClaimStatus, ClaimType};
use crate::domain::role::PortalRole;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowStageId(pub String);

/// One configured approval stage of a claim workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStageConfig {
    pub id: WorkflowStageId,
    pub workflow_type: ClaimType,
    pub stage_order: u32,
    pub stage_name: String,
    pub approver_role: PortalRole,
    pub status_on_approve: ClaimStatus,
    pub is_active: bool,
    pub can_skip_for_torch_bearer: bool,
}
