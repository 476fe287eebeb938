//! PostgreSQL store
//!
//! Units of work run inside a transaction that row-locks the aggregate with
//! `SELECT ... FOR UPDATE`; the closure's result is diffed against what was
//! loaded and only the changed rows are written back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use uuid::Uuid;

use super::{
    contract_not_found, request_not_found, ContractMutation, ContractOpening, LendingStore,
    RequestMutation,
};
use crate::config::Config;
use crate::contract::{Contract, ContractLedger, ContractStatus, EmiInstallment};
use crate::error::{LendingError, LendingResult};
use crate::loan_request::{GuarantorRequest, LoanRequest, RequestRecord};
use crate::models::{LoanBrochure, User};
use crate::payment::Transaction;
use crate::services::{TrustIndexUpdater, TrustReason};

/// Database connection error
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("Failed to run migrations: {0}")]
    MigrationError(String),
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.name, u.trust_index, u.payout_handle, u.created_at,
           ARRAY(SELECT e.endorser_id FROM endorsements e WHERE e.user_id = u.id) AS endorsed_by
    FROM users u
    WHERE u.id = $1
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the connection pool
    pub async fn connect(config: &Config) -> Result<Self, DbError> {
        tracing::info!("Connecting to database at {}", config.database_url_masked());

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.database_url)
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        tracing::info!("Database connection pool created successfully");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), DbError> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::MigrationError(e.to_string()))?;

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row helpers
// ============================================================================

async fn load_ledger(
    conn: &mut PgConnection,
    contract_id: Uuid,
    for_update: bool,
) -> LendingResult<Option<ContractLedger>> {
    let sql = if for_update {
        "SELECT * FROM contracts WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM contracts WHERE id = $1"
    };
    let Some(contract) = sqlx::query_as::<_, Contract>(sql)
        .bind(contract_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let installments = sqlx::query_as::<_, EmiInstallment>(
        "SELECT * FROM emi_installments WHERE contract_id = $1 ORDER BY emi_number",
    )
    .bind(contract_id)
    .fetch_all(&mut *conn)
    .await?;

    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE contract_id = $1 ORDER BY created_at, id",
    )
    .bind(contract_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(ContractLedger {
        contract,
        installments,
        transactions,
    }))
}

async fn insert_contract_row(conn: &mut PgConnection, c: &Contract) -> LendingResult<()> {
    sqlx::query(
        r#"
        INSERT INTO contracts (
            id, loan_request_id, brochure_id, receiver_id, lender_id, guarantor_id,
            principal, interest_rate_bps, tenor_days, installment_count, total_repayable,
            start_date, end_date, status, receiver_signed, lender_signed, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(c.id)
    .bind(c.loan_request_id)
    .bind(c.brochure_id)
    .bind(c.receiver_id)
    .bind(c.lender_id)
    .bind(c.guarantor_id)
    .bind(c.principal)
    .bind(c.interest_rate_bps)
    .bind(c.tenor_days)
    .bind(c.installment_count)
    .bind(c.total_repayable)
    .bind(c.start_date)
    .bind(c.end_date)
    .bind(c.status)
    .bind(c.receiver_signed)
    .bind(c.lender_signed)
    .bind(c.created_at)
    .bind(c.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write back every row that differs between `before` and `after`
async fn write_ledger(
    conn: &mut PgConnection,
    before: &ContractLedger,
    after: &ContractLedger,
) -> LendingResult<()> {
    if before.contract != after.contract {
        let c = &after.contract;
        sqlx::query(
            r#"
            UPDATE contracts
            SET status = $2, receiver_signed = $3, lender_signed = $4,
                start_date = $5, end_date = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(c.id)
        .bind(c.status)
        .bind(c.receiver_signed)
        .bind(c.lender_signed)
        .bind(c.start_date)
        .bind(c.end_date)
        .bind(c.updated_at)
        .execute(&mut *conn)
        .await?;
    }

    for emi in &after.installments {
        let unchanged = before
            .installments
            .iter()
            .any(|old| old.emi_number == emi.emi_number && old == emi);
        if unchanged {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO emi_installments (
                contract_id, emi_number, due_date, principal_component,
                interest_component, status, paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (contract_id, emi_number)
            DO UPDATE SET due_date = EXCLUDED.due_date, status = EXCLUDED.status,
                          paid_at = EXCLUDED.paid_at
            "#,
        )
        .bind(emi.contract_id)
        .bind(emi.emi_number)
        .bind(emi.due_date)
        .bind(emi.principal_component)
        .bind(emi.interest_component)
        .bind(emi.status)
        .bind(emi.paid_at)
        .execute(&mut *conn)
        .await?;
    }

    for tx in &after.transactions {
        match before.transactions.iter().find(|old| old.id == tx.id) {
            Some(old) if old == tx => {}
            Some(_) => {
                sqlx::query("UPDATE transactions SET status = $2 WHERE id = $1")
                    .bind(tx.id)
                    .bind(tx.status)
                    .execute(&mut *conn)
                    .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO transactions (
                        id, contract_id, from_user_id, to_user_id, amount, status,
                        payment_type, gateway_ref, emi_number, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(tx.id)
                .bind(tx.contract_id)
                .bind(tx.from_user_id)
                .bind(tx.to_user_id)
                .bind(tx.amount)
                .bind(tx.status)
                .bind(tx.payment_type)
                .bind(&tx.gateway_ref)
                .bind(tx.emi_number)
                .bind(tx.created_at)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    Ok(())
}

async fn load_request(
    conn: &mut PgConnection,
    loan_request_id: Uuid,
    for_update: bool,
) -> LendingResult<Option<RequestRecord>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let Some(loan_request) = sqlx::query_as::<_, LoanRequest>(&format!(
        "SELECT * FROM loan_requests WHERE id = $1{}",
        lock
    ))
    .bind(loan_request_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let guarantor_request = sqlx::query_as::<_, GuarantorRequest>(&format!(
        "SELECT * FROM guarantor_requests WHERE loan_request_id = $1{}",
        lock
    ))
    .bind(loan_request_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some(RequestRecord {
        loan_request,
        guarantor_request,
    }))
}

async fn write_request(conn: &mut PgConnection, record: &RequestRecord) -> LendingResult<()> {
    sqlx::query("UPDATE loan_requests SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(record.loan_request.id)
        .bind(record.loan_request.status)
        .bind(record.loan_request.updated_at)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE guarantor_requests SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(record.guarantor_request.id)
        .bind(record.guarantor_request.status)
        .bind(record.guarantor_request.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl TrustIndexUpdater for PgStore {
    async fn apply_delta(&self, user_id: Uuid, delta: i32, reason: TrustReason) -> LendingResult<()> {
        let mut tx = self.pool.begin().await?;

        let new_trust_index: Option<i32> = sqlx::query_scalar(
            "UPDATE users SET trust_index = trust_index + $2 WHERE id = $1 RETURNING trust_index",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        let new_trust_index = new_trust_index
            .ok_or_else(|| LendingError::not_found(format!("User {} not found", user_id)))?;

        sqlx::query(
            r#"
            INSERT INTO trust_index_history (id, user_id, delta, new_trust_index, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(delta)
        .bind(new_trust_index)
        .bind(reason.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LendingStore for PgStore {
    async fn health_check(&self) -> LendingResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> LendingResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(USER_SELECT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_brochures(&self, ids: &[Uuid]) -> LendingResult<Vec<LoanBrochure>> {
        let brochures =
            sqlx::query_as::<_, LoanBrochure>("SELECT * FROM loan_brochures WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(brochures)
    }

    async fn has_active_request(&self, receiver_id: Uuid) -> LendingResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loan_requests
                WHERE receiver_id = $1
                  AND status IN ('PENDING', 'GUARANTOR_ACCEPTED', 'CONTRACTING')
            )
            "#,
        )
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_request(&self, record: &RequestRecord) -> LendingResult<()> {
        let lr = &record.loan_request;
        let gr = &record.guarantor_request;
        let mut tx = self.pool.begin().await?;

        // The partial unique index on active requests turns a concurrent
        // second insert into a unique violation.
        let inserted = sqlx::query(
            r#"
            INSERT INTO loan_requests (id, receiver_id, brochure_ids, guarantor_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(lr.id)
        .bind(lr.receiver_id)
        .bind(&lr.brochure_ids)
        .bind(lr.guarantor_id)
        .bind(lr.status)
        .bind(lr.created_at)
        .bind(lr.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match LendingError::from(e) {
                LendingError::Conflict(_) => {
                    LendingError::conflict("You already have an active loan request.")
                }
                other => other,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO guarantor_requests (id, receiver_id, guarantor_id, loan_request_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(gr.id)
        .bind(gr.receiver_id)
        .bind(gr.guarantor_id)
        .bind(gr.loan_request_id)
        .bind(gr.status)
        .bind(gr.created_at)
        .bind(gr.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_request(&self, loan_request_id: Uuid) -> LendingResult<Option<RequestRecord>> {
        let mut conn = self.pool.acquire().await?;
        load_request(&mut conn, loan_request_id, false).await
    }

    async fn find_request_by_guarantor_request(
        &self,
        guarantor_request_id: Uuid,
    ) -> LendingResult<Option<RequestRecord>> {
        let loan_request_id: Option<Uuid> =
            sqlx::query_scalar("SELECT loan_request_id FROM guarantor_requests WHERE id = $1")
                .bind(guarantor_request_id)
                .fetch_optional(&self.pool)
                .await?;

        match loan_request_id {
            Some(id) => self.get_request(id).await,
            None => Ok(None),
        }
    }

    async fn list_requests_for_receiver(
        &self,
        receiver_id: Uuid,
    ) -> LendingResult<Vec<LoanRequest>> {
        let requests = sqlx::query_as::<_, LoanRequest>(
            "SELECT * FROM loan_requests WHERE receiver_id = $1 ORDER BY created_at DESC",
        )
        .bind(receiver_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn list_requests_for_lender(&self, lender_id: Uuid) -> LendingResult<Vec<LoanRequest>> {
        let requests = sqlx::query_as::<_, LoanRequest>(
            r#"
            SELECT lr.* FROM loan_requests lr
            WHERE lr.status = 'GUARANTOR_ACCEPTED'
              AND EXISTS (
                  SELECT 1 FROM loan_brochures b
                  WHERE b.lender_id = $1 AND b.id = ANY(lr.brochure_ids)
              )
            ORDER BY lr.created_at DESC
            "#,
        )
        .bind(lender_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn list_pending_guarantor_requests(
        &self,
        guarantor_id: Uuid,
    ) -> LendingResult<Vec<GuarantorRequest>> {
        let requests = sqlx::query_as::<_, GuarantorRequest>(
            r#"
            SELECT * FROM guarantor_requests
            WHERE guarantor_id = $1 AND status = 'PENDING'
            ORDER BY created_at DESC
            "#,
        )
        .bind(guarantor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn mutate_request<'a>(
        &self,
        loan_request_id: Uuid,
        mutation: RequestMutation<'a>,
    ) -> LendingResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut record = load_request(&mut tx, loan_request_id, true)
            .await?
            .ok_or_else(|| request_not_found(loan_request_id))?;

        mutation(&mut record)?;

        write_request(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn open_contract<'a>(
        &self,
        loan_request_id: Uuid,
        opening: ContractOpening<'a>,
    ) -> LendingResult<ContractLedger> {
        let mut tx = self.pool.begin().await?;
        let mut record = load_request(&mut tx, loan_request_id, true)
            .await?
            .ok_or_else(|| request_not_found(loan_request_id))?;

        let ledger = opening(&mut record)?;

        write_request(&mut tx, &record).await?;
        insert_contract_row(&mut tx, &ledger.contract).await?;
        write_ledger(&mut tx, &ContractLedger::new(ledger.contract.clone()), &ledger).await?;
        tx.commit().await?;
        Ok(ledger)
    }

    async fn get_contract(&self, contract_id: Uuid) -> LendingResult<Option<ContractLedger>> {
        let mut conn = self.pool.acquire().await?;
        load_ledger(&mut conn, contract_id, false).await
    }

    async fn mutate_contract<'a>(
        &self,
        contract_id: Uuid,
        mutation: ContractMutation<'a>,
    ) -> LendingResult<()> {
        let mut tx = self.pool.begin().await?;
        let before = load_ledger(&mut tx, contract_id, true)
            .await?
            .ok_or_else(|| contract_not_found(contract_id))?;

        let mut working = before.clone();
        mutation(&mut working)?;

        write_ledger(&mut tx, &before, &working).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_contract_ids_by_status(
        &self,
        status: ContractStatus,
    ) -> LendingResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM contracts WHERE status = $1")
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
