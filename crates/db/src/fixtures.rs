use rust_decimal::Decimal;

use claimdesk_core::domain::booking::{ConferenceRoom, RoomId};
use claimdesk_core::domain::category::{Category, CategoryId};
use claimdesk_core::domain::claim::{ClaimStatus, ClaimType};
use claimdesk_core::domain::role::PortalRole;
use claimdesk_core::domain::user::User;
use claimdesk_core::domain::workflow_config::{WorkflowStageConfig, WorkflowStageId};
use claimdesk_core::workflow::WorkflowTable;

use crate::connection::DbPool;
use crate::repositories::{
    DirectoryRepository, RepositoryError, SqlDirectoryRepository, SqlWorkflowConfigRepository,
    WorkflowConfigRepository,
};

/// One demo account per portal role.
const SEED_USERS: &[(&str, &str, &str, &str, PortalRole)] = &[
    ("asha@claimdesk.local", "Asha Rao", "Sales", "Account Executive", PortalRole::Employee),
    ("jai@claimdesk.local", "Jai Kulkarni", "Administration", "Junior Admin", PortalRole::JuniorAdmin),
    ("meera@claimdesk.local", "Meera Shah", "Sales", "Regional Manager", PortalRole::Manager),
    ("vikram@claimdesk.local", "Vikram Iyer", "Administration", "Admin Head", PortalRole::AdminHead),
    ("neha@claimdesk.local", "Neha Menon", "Revenue", "Chief Revenue Officer", PortalRole::Cro),
    ("arjun@claimdesk.local", "Arjun Bose", "Finance", "Chief Financial Officer", PortalRole::Cfo),
    ("farah@claimdesk.local", "Farah Khan", "Finance", "Accounts Officer", PortalRole::Finance),
    ("root@claimdesk.local", "Portal Admin", "IT", "Administrator", PortalRole::Admin),
];

struct SeedCategory {
    id: &'static str,
    group: &'static str,
    title: &'static str,
    bill_required: bool,
    policy_limit: Option<i64>,
    sales_promotion: bool,
    torch_bearer: bool,
}

const SEED_CATEGORIES: &[SeedCategory] = &[
    SeedCategory {
        id: "cat-travel-local",
        group: "Travel",
        title: "Local conveyance",
        bill_required: true,
        policy_limit: Some(5_000),
        sales_promotion: false,
        torch_bearer: false,
    },
    SeedCategory {
        id: "cat-meals",
        group: "Meals",
        title: "Client meals",
        bill_required: true,
        policy_limit: Some(2_500),
        sales_promotion: false,
        torch_bearer: false,
    },
    SeedCategory {
        id: "cat-sales-event",
        group: "Sales Promotion",
        title: "Dealer event",
        bill_required: true,
        policy_limit: None,
        sales_promotion: true,
        torch_bearer: false,
    },
    SeedCategory {
        id: "cat-torch-bearer",
        group: "Torch Bearer",
        title: "Field expenses",
        bill_required: false,
        policy_limit: Some(10_000),
        sales_promotion: false,
        torch_bearer: true,
    },
];

const SEED_ROOMS: &[(&str, &str, &str, u32)] = &[
    ("room-boardroom", "Boardroom", "HQ, 4th floor", 12),
    ("room-huddle", "Huddle Room", "HQ, 2nd floor", 4),
];

/// Stored stages mirror the built-in chains; the normal manager stage is
/// skipped for torch-bearer claims.
const SEED_STAGES: &[(&str, ClaimType, u32, &str, PortalRole, ClaimStatus, bool)] = &[
    ("stage-normal-1", ClaimType::Normal, 1, "Verification", PortalRole::JuniorAdmin, ClaimStatus::Verified, false),
    ("stage-normal-2", ClaimType::Normal, 2, "Manager Approval", PortalRole::Manager, ClaimStatus::ManagerApproved, true),
    ("stage-normal-3", ClaimType::Normal, 3, "Admin Head Approval", PortalRole::AdminHead, ClaimStatus::AdminApproved, false),
    ("stage-sales-1", ClaimType::SalesPromotion, 1, "Manager Approval", PortalRole::Manager, ClaimStatus::ManagerApproved, false),
    ("stage-sales-2", ClaimType::SalesPromotion, 2, "CRO Approval", PortalRole::Cro, ClaimStatus::CroApproved, false),
    ("stage-sales-3", ClaimType::SalesPromotion, 3, "CFO Approval", PortalRole::Cfo, ClaimStatus::CfoApproved, false),
];

/// Demo directory, categories, rooms and workflow stages for local runs.
///
/// Loading is idempotent: every row is upserted by its fixed id.
pub struct DemoDataset;

impl DemoDataset {
    pub fn users() -> Vec<User> {
        SEED_USERS
            .iter()
            .map(|(email, name, department, designation, role)| User {
                email: (*email).to_string(),
                full_name: (*name).to_string(),
                department: (*department).to_string(),
                designation: (*designation).to_string(),
                portal_role: *role,
                is_active: true,
            })
            .collect()
    }

    pub fn categories() -> Vec<Category> {
        SEED_CATEGORIES
            .iter()
            .map(|seed| Category {
                id: CategoryId(seed.id.to_string()),
                category_name: seed.group.to_string(),
                title: seed.title.to_string(),
                bill_required: seed.bill_required,
                policy_limit: seed.policy_limit.map(Decimal::from),
                is_sales_promotion: seed.sales_promotion,
                is_torch_bearer: seed.torch_bearer,
                is_active: true,
            })
            .collect()
    }

    pub fn rooms() -> Vec<ConferenceRoom> {
        SEED_ROOMS
            .iter()
            .map(|(id, name, location, capacity)| ConferenceRoom {
                id: RoomId((*id).to_string()),
                name: (*name).to_string(),
                location: (*location).to_string(),
                capacity: *capacity,
                is_active: true,
            })
            .collect()
    }

    pub fn stages() -> Vec<WorkflowStageConfig> {
        SEED_STAGES
            .iter()
            .map(|(id, workflow_type, order, name, role, status, skippable)| WorkflowStageConfig {
                id: WorkflowStageId((*id).to_string()),
                workflow_type: *workflow_type,
                stage_order: *order,
                stage_name: (*name).to_string(),
                approver_role: *role,
                status_on_approve: *status,
                is_active: true,
                can_skip_for_torch_bearer: *skippable,
            })
            .collect()
    }

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlDirectoryRepository::new(pool.clone());
        let workflow = SqlWorkflowConfigRepository::new(pool.clone());

        let users = Self::users();
        let categories = Self::categories();
        let rooms = Self::rooms();
        let stages = Self::stages();
        let result = SeedResult {
            users: users.len(),
            categories: categories.len(),
            rooms: rooms.len(),
            stages: stages.len(),
        };

        for user in users {
            directory.save_user(user).await?;
        }
        for category in categories {
            directory.save_category(category).await?;
        }
        for room in rooms {
            directory.save_room(room).await?;
        }
        for stage in stages {
            workflow.save_stage(stage).await?;
        }

        tracing::info!(
            event_name = "seed.loaded",
            users = result.users,
            categories = result.categories,
            rooms = result.rooms,
            stages = result.stages,
            "demo dataset loaded"
        );
        Ok(result)
    }

    /// Checks every seeded row is present and the stored stages still build a
    /// valid workflow table.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let directory = SqlDirectoryRepository::new(pool.clone());
        let workflow = SqlWorkflowConfigRepository::new(pool.clone());
        let mut checks = Vec::new();

        let mut users_present = true;
        for user in Self::users() {
            users_present &= directory.find_user(&user.email).await?.is_some();
        }
        checks.push(("directory-users", users_present));

        let mut categories_present = true;
        for category in Self::categories() {
            categories_present &= directory.find_category(&category.id).await?.is_some();
        }
        checks.push(("directory-categories", categories_present));

        let mut rooms_present = true;
        for room in Self::rooms() {
            rooms_present &= directory.find_room(&room.id).await?.is_some();
        }
        checks.push(("directory-rooms", rooms_present));

        let stored = workflow.list_stages().await?;
        let stages_present = Self::stages().iter().all(|seed| stored.iter().any(|s| s.id == seed.id));
        checks.push(("workflow-stages", stages_present));
        checks.push(("workflow-table", WorkflowTable::from_stages(&stored).is_ok()));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub users: usize,
    pub categories: usize,
    pub rooms: usize,
    pub stages: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
    }
}
