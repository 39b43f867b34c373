use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use claimdesk_core::domain::approval::{ApprovalAction, ApprovalLogEntry, ApprovalLogId};
use claimdesk_core::domain::category::CategoryId;
use claimdesk_core::domain::claim::{Claim, ClaimId, ClaimStatus, ClaimType};
use claimdesk_core::domain::role::PortalRole;

use super::codec::{
    bool_column, date_column, decimal_column, encode_date, encode_json, enum_column, get,
    json_column, optional_date_column, optional_enum_column, timestamp_column, u32_column,
};
use super::notification::insert_deliveries;
use super::{ClaimCommit, ClaimRepository, RepositoryError};
use crate::DbPool;

const CLAIM_COLUMNS: &str = "id, claim_number, claim_type, status, current_approver_role,
     employee_name, employee_email, department, designation, category_id, category_name,
     is_torch_bearer, expense_date, purpose, bill_number, bill_date, amount, payment_mode,
     description, document_urls, rejection_reason, send_back_reason, payment_date,
     payment_reference, sla_date, version, created_at, updated_at";

const LOG_COLUMNS: &str = "id, claim_id, claim_number, approver_email, approver_name,
     approver_role, stage, action, remarks, previous_status, new_status, created_at";

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_claim(row: &SqliteRow) -> Result<Claim, RepositoryError> {
    Ok(Claim {
        id: ClaimId(get(row, "id")?),
        claim_number: get(row, "claim_number")?,
        claim_type: enum_column(row, "claim_type", ClaimType::parse)?,
        status: enum_column(row, "status", ClaimStatus::parse)?,
        current_approver_role: optional_enum_column(
            row,
            "current_approver_role",
            PortalRole::parse,
        )?,
        employee_name: get(row, "employee_name")?,
        employee_email: get(row, "employee_email")?,
        department: get(row, "department")?,
        designation: get(row, "designation")?,
        category_id: CategoryId(get(row, "category_id")?),
        category_name: get(row, "category_name")?,
        is_torch_bearer: bool_column(row, "is_torch_bearer")?,
        expense_date: date_column(row, "expense_date")?,
        purpose: get(row, "purpose")?,
        bill_number: get(row, "bill_number")?,
        bill_date: optional_date_column(row, "bill_date")?,
        amount: decimal_column(row, "amount")?,
        payment_mode: get(row, "payment_mode")?,
        description: get(row, "description")?,
        document_urls: json_column(row, "document_urls")?,
        rejection_reason: get(row, "rejection_reason")?,
        send_back_reason: get(row, "send_back_reason")?,
        payment_date: optional_date_column(row, "payment_date")?,
        payment_reference: get(row, "payment_reference")?,
        sla_date: date_column(row, "sla_date")?,
        version: u32_column(row, "version")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

fn row_to_log(row: &SqliteRow) -> Result<ApprovalLogEntry, RepositoryError> {
    Ok(ApprovalLogEntry {
        id: ApprovalLogId(get(row, "id")?),
        claim_id: ClaimId(get(row, "claim_id")?),
        claim_number: get(row, "claim_number")?,
        approver_email: get(row, "approver_email")?,
        approver_name: get(row, "approver_name")?,
        approver_role: enum_column(row, "approver_role", PortalRole::parse)?,
        stage: get(row, "stage")?,
        action: enum_column(row, "action", ApprovalAction::parse)?,
        remarks: get(row, "remarks")?,
        previous_status: enum_column(row, "previous_status", ClaimStatus::parse)?,
        new_status: enum_column(row, "new_status", ClaimStatus::parse)?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

async fn insert_log(
    conn: &mut SqliteConnection,
    entry: &ApprovalLogEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_log (id, claim_id, claim_number, approver_email, approver_name,
                                   approver_role, stage, action, remarks, previous_status,
                                   new_status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.claim_id.0)
    .bind(&entry.claim_number)
    .bind(&entry.approver_email)
    .bind(&entry.approver_name)
    .bind(entry.approver_role.as_str())
    .bind(&entry.stage)
    .bind(entry.action.as_str())
    .bind(&entry.remarks)
    .bind(entry.previous_status.as_str())
    .bind(entry.new_status.as_str())
    .bind(entry.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn duplicate_or(error: sqlx::Error, entity: &'static str, id: &str) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Duplicate { entity, id: id.to_string() }
        }
        _ => RepositoryError::Database(error),
    }
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CLAIM_COLUMNS} FROM claim WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_claim).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Claim>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claim ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn list_by_employee(&self, email: &str) -> Result<Vec<Claim>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claim WHERE employee_email = ?
             ORDER BY created_at DESC, id"
        ))
        .bind(email.trim())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn list_by_statuses(
        &self,
        statuses: &[ClaimStatus],
    ) -> Result<Vec<Claim>, RepositoryError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM claim WHERE status IN ({placeholders})
             ORDER BY sla_date ASC, created_at ASC"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(row_to_claim).collect()
    }

    async fn logs_for_claim(&self, id: &ClaimId) -> Result<Vec<ApprovalLogEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM approval_log WHERE claim_id = ?
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log).collect()
    }

    async fn create(&self, commit: ClaimCommit) -> Result<(), RepositoryError> {
        let claim = &commit.claim;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO claim ({CLAIM_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&claim.id.0)
        .bind(&claim.claim_number)
        .bind(claim.claim_type.as_str())
        .bind(claim.status.as_str())
        .bind(claim.current_approver_role.map(|role| role.as_str()))
        .bind(&claim.employee_name)
        .bind(&claim.employee_email)
        .bind(&claim.department)
        .bind(&claim.designation)
        .bind(&claim.category_id.0)
        .bind(&claim.category_name)
        .bind(claim.is_torch_bearer)
        .bind(encode_date(claim.expense_date))
        .bind(&claim.purpose)
        .bind(&claim.bill_number)
        .bind(claim.bill_date.map(encode_date))
        .bind(claim.amount.to_string())
        .bind(&claim.payment_mode)
        .bind(&claim.description)
        .bind(encode_json(&claim.document_urls)?)
        .bind(&claim.rejection_reason)
        .bind(&claim.send_back_reason)
        .bind(claim.payment_date.map(encode_date))
        .bind(&claim.payment_reference)
        .bind(encode_date(claim.sla_date))
        .bind(i64::from(claim.version))
        .bind(claim.created_at.to_rfc3339())
        .bind(claim.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| duplicate_or(error, "claim", &claim.id.0))?;

        if let Some(entry) = &commit.log {
            insert_log(&mut tx, entry).await?;
        }
        insert_deliveries(&mut tx, &commit.deliveries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<(), RepositoryError> {
        let claim = &commit.claim;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE claim SET
                 status = ?, current_approver_role = ?, category_id = ?, category_name = ?,
                 is_torch_bearer = ?, claim_type = ?, expense_date = ?, purpose = ?,
                 bill_number = ?, bill_date = ?, amount = ?, payment_mode = ?, description = ?,
                 document_urls = ?, rejection_reason = ?, send_back_reason = ?,
                 payment_date = ?, payment_reference = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(claim.status.as_str())
        .bind(claim.current_approver_role.map(|role| role.as_str()))
        .bind(&claim.category_id.0)
        .bind(&claim.category_name)
        .bind(claim.is_torch_bearer)
        .bind(claim.claim_type.as_str())
        .bind(encode_date(claim.expense_date))
        .bind(&claim.purpose)
        .bind(&claim.bill_number)
        .bind(claim.bill_date.map(encode_date))
        .bind(claim.amount.to_string())
        .bind(&claim.payment_mode)
        .bind(&claim.description)
        .bind(encode_json(&claim.document_urls)?)
        .bind(&claim.rejection_reason)
        .bind(&claim.send_back_reason)
        .bind(claim.payment_date.map(encode_date))
        .bind(&claim.payment_reference)
        .bind(i64::from(claim.version))
        .bind(claim.updated_at.to_rfc3339())
        .bind(&claim.id.0)
        .bind(i64::from(commit.expected_version))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claim WHERE id = ?")
                .bind(&claim.id.0)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists == 0 {
                RepositoryError::NotFound { entity: "claim", id: claim.id.0.clone() }
            } else {
                RepositoryError::VersionConflict {
                    entity: "claim",
                    id: claim.id.0.clone(),
                    expected: commit.expected_version,
                }
            });
        }

        if let Some(entry) = &commit.log {
            insert_log(&mut tx, entry).await?;
        }
        insert_deliveries(&mut tx, &commit.deliveries).await?;
        tx.commit().await?;

        tracing::debug!(
            event_name = "claim.committed",
            claim_id = %claim.id.0,
            status = claim.status.as_str(),
            version = claim.version,
            deliveries = commit.deliveries.len(),
            "claim change committed"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use claimdesk_core::domain::approval::{ApprovalAction, ApprovalLogEntry, ApprovalLogId};
    use claimdesk_core::domain::category::CategoryId;
    use claimdesk_core::domain::claim::{Claim, ClaimId, ClaimStatus, ClaimType};
    use claimdesk_core::domain::role::PortalRole;

    use super::SqlClaimRepository;
    use crate::repositories::{ClaimCommit, ClaimRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    pub(crate) fn sample_claim(id: &str, status: ClaimStatus) -> Claim {
        let created = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        Claim {
            id: ClaimId(id.to_string()),
            claim_number: format!("CLM-{}", id.to_ascii_uppercase()),
            claim_type: ClaimType::Normal,
            status,
            current_approver_role: Some(PortalRole::JuniorAdmin),
            employee_name: "Asha Rao".to_string(),
            employee_email: "asha@example.com".to_string(),
            department: "Sales".to_string(),
            designation: "Executive".to_string(),
            category_id: CategoryId("cat-travel".to_string()),
            category_name: "Travel - Local conveyance".to_string(),
            is_torch_bearer: false,
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
            purpose: "Client visit".to_string(),
            bill_number: Some("B-77".to_string()),
            bill_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            amount: Decimal::new(500050, 2),
            payment_mode: "cash".to_string(),
            description: None,
            document_urls: vec!["https://files.example.com/b-77.pdf".to_string()],
            rejection_reason: None,
            send_back_reason: None,
            payment_date: None,
            payment_reference: None,
            sla_date: NaiveDate::from_ymd_opt(2026, 4, 16).expect("date"),
            version: 1,
            created_at: created,
            updated_at: created,
        }
    }

    pub(crate) fn log_for(claim: &Claim, from: ClaimStatus, action: ApprovalAction) -> ApprovalLogEntry {
        ApprovalLogEntry {
            id: ApprovalLogId(format!("log-{}-{}", claim.id.0, claim.version)),
            claim_id: claim.id.clone(),
            claim_number: claim.claim_number.clone(),
            approver_email: "jadmin@example.com".to_string(),
            approver_name: "Jai Admin".to_string(),
            approver_role: PortalRole::JuniorAdmin,
            stage: "Verification".to_string(),
            action,
            remarks: None,
            previous_status: from,
            new_status: claim.status,
            created_at: claim.updated_at,
        }
    }

    async fn repo() -> SqlClaimRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlClaimRepository::new(pool)
    }

    fn creation(claim: Claim) -> ClaimCommit {
        ClaimCommit { claim, expected_version: 0, log: None, deliveries: Vec::new() }
    }

    #[tokio::test]
    async fn created_claim_reads_back_field_for_field() {
        let repo = repo().await;
        let claim = sample_claim("c1", ClaimStatus::Submitted);
        repo.create(creation(claim.clone())).await.expect("create");

        let loaded = repo.find_by_id(&claim.id).await.expect("find").expect("present");
        assert_eq!(loaded, claim);
        assert!(repo.find_by_id(&ClaimId("nope".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_reported() {
        let repo = repo().await;
        let claim = sample_claim("c1", ClaimStatus::Draft);
        repo.create(creation(claim.clone())).await.expect("create");

        let error = repo.create(creation(claim)).await.expect_err("duplicate");
        assert!(matches!(error, RepositoryError::Duplicate { entity: "claim", .. }));
    }

    #[tokio::test]
    async fn claim_numbers_are_unique() {
        let repo = repo().await;
        let first = sample_claim("c1", ClaimStatus::Draft);
        repo.create(creation(first.clone())).await.expect("create");

        let mut second = sample_claim("c2", ClaimStatus::Draft);
        second.claim_number = first.claim_number;
        let error = repo.create(creation(second)).await.expect_err("same number");
        assert!(matches!(error, RepositoryError::Duplicate { entity: "claim", .. }));
    }

    #[tokio::test]
    async fn commit_appends_log_and_bumps_version() {
        let repo = repo().await;
        let claim = sample_claim("c1", ClaimStatus::Submitted);
        repo.create(creation(claim.clone())).await.expect("create");

        let mut verified = claim.clone();
        verified.status = ClaimStatus::Verified;
        verified.current_approver_role = Some(PortalRole::Manager);
        verified.version = 2;
        let log = log_for(&verified, ClaimStatus::Submitted, ApprovalAction::Approved);
        repo.commit(ClaimCommit {
            claim: verified.clone(),
            expected_version: 1,
            log: Some(log.clone()),
            deliveries: Vec::new(),
        })
        .await
        .expect("commit");

        let loaded = repo.find_by_id(&claim.id).await.expect("find").expect("present");
        assert_eq!(loaded.status, ClaimStatus::Verified);
        assert_eq!(loaded.version, 2);
        assert_eq!(repo.logs_for_claim(&claim.id).await.expect("logs"), vec![log]);
    }

    #[tokio::test]
    async fn stale_commit_is_refused_without_side_effects() {
        let repo = repo().await;
        let claim = sample_claim("c1", ClaimStatus::Submitted);
        repo.create(creation(claim.clone())).await.expect("create");

        let mut first = claim.clone();
        first.status = ClaimStatus::Verified;
        first.version = 2;
        repo.commit(ClaimCommit {
            log: Some(log_for(&first, ClaimStatus::Submitted, ApprovalAction::Approved)),
            claim: first,
            expected_version: 1,
            deliveries: Vec::new(),
        })
        .await
        .expect("first commit");

        let mut stale = claim.clone();
        stale.status = ClaimStatus::Rejected;
        stale.version = 2;
        let error = repo
            .commit(ClaimCommit {
                log: Some(log_for(&stale, ClaimStatus::Submitted, ApprovalAction::Rejected)),
                claim: stale,
                expected_version: 1,
                deliveries: Vec::new(),
            })
            .await
            .expect_err("stale");

        assert!(matches!(error, RepositoryError::VersionConflict { expected: 1, .. }));
        assert_eq!(repo.logs_for_claim(&claim.id).await.expect("logs").len(), 1);
        let loaded = repo.find_by_id(&claim.id).await.expect("find").expect("present");
        assert_eq!(loaded.status, ClaimStatus::Verified);
    }

    #[tokio::test]
    async fn commit_of_unknown_claim_is_not_found() {
        let repo = repo().await;
        let error = repo
            .commit(ClaimCommit {
                claim: sample_claim("ghost", ClaimStatus::Verified),
                expected_version: 1,
                log: None,
                deliveries: Vec::new(),
            })
            .await
            .expect_err("missing");
        assert!(matches!(error, RepositoryError::NotFound { entity: "claim", .. }));
    }

    #[tokio::test]
    async fn status_listing_filters_and_orders_by_sla() {
        let repo = repo().await;
        let mut late = sample_claim("c-late", ClaimStatus::Verified);
        late.sla_date = NaiveDate::from_ymd_opt(2026, 5, 1).expect("date");
        let early = sample_claim("c-early", ClaimStatus::Submitted);
        let paid = sample_claim("c-paid", ClaimStatus::Paid);
        for claim in [late, early, paid] {
            repo.create(creation(claim)).await.expect("create");
        }

        let open = repo
            .list_by_statuses(&[ClaimStatus::Submitted, ClaimStatus::Verified])
            .await
            .expect("list");
        let ids: Vec<_> = open.iter().map(|claim| claim.id.0.as_str()).collect();
        assert_eq!(ids, vec!["c-early", "c-late"]);
        assert!(repo.list_by_statuses(&[]).await.expect("empty").is_empty());
        assert_eq!(repo.list_by_employee("ASHA@example.com").await.expect("mine").len(), 3);
    }
}
