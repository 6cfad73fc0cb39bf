// src/db/request_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::requests::{
        ApprovalStep, ApprovalStepRow, ItemTotals, NewItemInput, PurchaseRequest, Reception,
        RequestDetail, RequestItem, RequestRow, RequestStatus, StepStatus,
    },
};

// Uma linha da política de aprovação de uma dependência.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct ApprovalRule {
    pub approver_id: Uuid,
    pub level: i32,
}

// O repositório das solicitações e de tudo que pertence a elas (itens,
// passos de aprovação, recepções). Métodos de escrita recebem o executor
// para rodarem dentro da transação do chamador; leituras de consulta
// usam a pool diretamente.
#[derive(Clone)]
pub struct RequestRepository {
    pool: PgPool,
}

impl RequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  SOLICITAÇÕES
    // =========================================================================

    pub async fn create_request<'e, E>(
        &self,
        executor: E,
        requester_id: Uuid,
        dependency_id: Uuid,
        provider_id: Option<Uuid>,
        urgent: bool,
        notes: Option<&str>,
    ) -> Result<PurchaseRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            INSERT INTO requests (requester_id, dependency_id, provider_id, urgent, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(requester_id)
        .bind(dependency_id)
        .bind(provider_id)
        .bind(urgent)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        PurchaseRequest::try_from(row)
    }

    /// Carrega a solicitação travando a linha (`FOR UPDATE`). É o ponto de
    /// serialização de decisões e recepções concorrentes sobre a mesma
    /// solicitação: quem chegar depois espera o commit de quem chegou antes.
    pub async fn get_request_for_update<'e, E>(
        &self,
        executor: E,
        request_id: i64,
    ) -> Result<Option<PurchaseRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, RequestRow>("SELECT * FROM requests WHERE id = $1 FOR UPDATE")
            .bind(request_id)
            .fetch_optional(executor)
            .await?;

        row.map(PurchaseRequest::try_from).transpose()
    }

    pub async fn update_request_status<'e, E>(
        &self,
        executor: E,
        request_id: i64,
        status: RequestStatus,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE requests SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(request_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn set_rejection_comment<'e, E>(
        &self,
        executor: E,
        request_id: i64,
        comment: Option<&str>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE requests SET rejection_comment = $1, updated_at = NOW() WHERE id = $2")
            .bind(comment)
            .bind(request_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    // Recalcula e atualiza o total em UMA única query (itens sem preço
    // ficam de fora da soma até serem precificados).
    pub async fn recompute_total_value<'e, E>(
        &self,
        executor: E,
        request_id: i64,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE requests
            SET total_value = (
                SELECT COALESCE(SUM(quantity * unit_price), 0)
                FROM request_items
                WHERE request_items.request_id = requests.id
            )
            WHERE id = $1
            RETURNING total_value
            "#,
        )
        .bind(request_id)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }

    // =========================================================================
    //  ITENS
    // =========================================================================

    pub async fn insert_item<'e, E>(
        &self,
        executor: E,
        request_id: i64,
        item: &NewItemInput,
    ) -> Result<RequestItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, RequestItem>(
            r#"
            INSERT INTO request_items (
                request_id, description, technical_spec, quantity,
                unit_price, necessity, observations
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(&item.description)
        .bind(&item.technical_spec)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(&item.necessity)
        .bind(&item.observations)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    pub async fn get_item_for_update<'e, E>(
        &self,
        executor: E,
        item_id: i64,
    ) -> Result<Option<RequestItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item =
            sqlx::query_as::<_, RequestItem>("SELECT * FROM request_items WHERE id = $1 FOR UPDATE")
                .bind(item_id)
                .fetch_optional(executor)
                .await?;

        Ok(item)
    }

    /// Preenche o preço unitário do item apenas se ele ainda não tiver um
    /// (convenção de precificação na primeira recepção).
    pub async fn backfill_item_price<'e, E>(
        &self,
        executor: E,
        item_id: i64,
        unit_price: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE request_items SET unit_price = $1 WHERE id = $2 AND unit_price IS NULL")
            .bind(unit_price)
            .bind(item_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Totais solicitado/recebido de cada item da solicitação.
    pub async fn item_totals_for_request<'e, E>(
        &self,
        executor: E,
        request_id: i64,
    ) -> Result<Vec<ItemTotals>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let totals = sqlx::query_as::<_, ItemTotals>(
            r#"
            SELECT
                i.id AS item_id,
                i.quantity::BIGINT AS requested,
                COALESCE(SUM(r.quantity), 0)::BIGINT AS received
            FROM request_items i
            LEFT JOIN receptions r ON r.item_id = i.id
            WHERE i.request_id = $1
            GROUP BY i.id, i.quantity
            ORDER BY i.id
            "#,
        )
        .bind(request_id)
        .fetch_all(executor)
        .await?;

        Ok(totals)
    }

    // =========================================================================
    //  PASSOS DE APROVAÇÃO
    // =========================================================================

    pub async fn approval_rules_for_dependency<'e, E>(
        &self,
        executor: E,
        dependency_id: Uuid,
    ) -> Result<Vec<ApprovalRule>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rules = sqlx::query_as::<_, ApprovalRule>(
            r#"
            SELECT approver_id, level
            FROM approval_rules
            WHERE dependency_id = $1
            ORDER BY level, approver_id
            "#,
        )
        .bind(dependency_id)
        .fetch_all(executor)
        .await?;

        Ok(rules)
    }

    pub async fn insert_step<'e, E>(
        &self,
        executor: E,
        request_id: i64,
        approver_id: Uuid,
        level: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("INSERT INTO approval_steps (request_id, approver_id, level) VALUES ($1, $2, $3)")
            .bind(request_id)
            .bind(approver_id)
            .bind(level)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Carrega todos os passos da solicitação travados (`FOR UPDATE`), em
    /// ordem de nível. A verificação de ordem sequencial é sempre refeita
    /// sobre esta leitura, nunca sobre um estado em cache.
    pub async fn list_steps_for_update<'e, E>(
        &self,
        executor: E,
        request_id: i64,
    ) -> Result<Vec<ApprovalStep>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, ApprovalStepRow>(
            r#"
            SELECT id, request_id, approver_id, level, status, terminal_reason, comment, decided_at
            FROM approval_steps
            WHERE request_id = $1
            ORDER BY level, id
            FOR UPDATE
            "#,
        )
        .bind(request_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(ApprovalStep::try_from).collect()
    }

    pub async fn apply_step_change<'e, E>(
        &self,
        executor: E,
        step_id: i64,
        status: &StepStatus,
        note: Option<&str>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE approval_steps
            SET status = $1,
                terminal_reason = $2,
                comment = COALESCE($3, comment),
                decided_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(status.db_status())
        .bind(status.db_reason())
        .bind(note)
        .bind(step_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    // =========================================================================
    //  RECEPÇÕES
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_reception<'e, E>(
        &self,
        executor: E,
        item_id: i64,
        user_id: Uuid,
        quantity: i32,
        received_on: Option<NaiveDate>,
        invoice_prefix: Option<&str>,
        invoice_number: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Reception, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let reception = sqlx::query_as::<_, Reception>(
            r#"
            INSERT INTO receptions (
                item_id, user_id, quantity, received_on,
                invoice_prefix, invoice_number, comment
            )
            VALUES ($1, $2, $3, COALESCE($4, CURRENT_DATE), $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(item_id)
        .bind(user_id)
        .bind(quantity)
        .bind(received_on)
        .bind(invoice_prefix)
        .bind(invoice_number)
        .bind(comment)
        .fetch_one(executor)
        .await?;

        Ok(reception)
    }

    // =========================================================================
    //  CONSULTAS (fora de transação)
    // =========================================================================

    pub async fn get_request(&self, request_id: i64) -> Result<Option<PurchaseRequest>, AppError> {
        let row = sqlx::query_as::<_, RequestRow>("SELECT * FROM requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PurchaseRequest::try_from).transpose()
    }

    /// Fotografia completa: cabeçalho + itens + passos + recepções.
    pub async fn get_detail(&self, request_id: i64) -> Result<Option<RequestDetail>, AppError> {
        let Some(header) = self.get_request(request_id).await? else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, RequestItem>(
            "SELECT * FROM request_items WHERE request_id = $1 ORDER BY id",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        let step_rows = sqlx::query_as::<_, ApprovalStepRow>(
            r#"
            SELECT id, request_id, approver_id, level, status, terminal_reason, comment, decided_at
            FROM approval_steps
            WHERE request_id = $1
            ORDER BY level, id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        let approval_steps = step_rows
            .into_iter()
            .map(ApprovalStep::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let receptions = sqlx::query_as::<_, Reception>(
            r#"
            SELECT r.*
            FROM receptions r
            JOIN request_items i ON i.id = r.item_id
            WHERE i.request_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(RequestDetail {
            header,
            items,
            approval_steps,
            receptions,
        }))
    }

    pub async fn list_for_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<PurchaseRequest>, AppError> {
        let rows = sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM requests WHERE requester_id = $1 ORDER BY id DESC",
        )
        .bind(requester_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseRequest::try_from).collect()
    }

    pub async fn list_for_dependencies(
        &self,
        dependency_ids: &[Uuid],
    ) -> Result<Vec<PurchaseRequest>, AppError> {
        let rows = sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM requests WHERE dependency_id = ANY($1) ORDER BY id DESC",
        )
        .bind(dependency_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseRequest::try_from).collect()
    }

    pub async fn list_all(&self) -> Result<Vec<PurchaseRequest>, AppError> {
        let rows = sqlx::query_as::<_, RequestRow>("SELECT * FROM requests ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PurchaseRequest::try_from).collect()
    }
}
