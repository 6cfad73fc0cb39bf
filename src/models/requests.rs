// src/models/requests.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::AppError;

// Prefixo do código público das solicitações (ex.: "SC-000042").
pub const REQUEST_CODE_PREFIX: &str = "SC";

/// Formata o código público de uma solicitação: prefixo + contador com
/// zeros à esquerda (largura fixa de 6 dígitos; ids maiores só alargam).
pub fn format_public_code(id: i64) -> String {
    format!("{}-{:06}", REQUEST_CODE_PREFIX, id)
}

/// Converte um código público de volta para o id interno.
/// Aceita apenas `SC-` seguido de dígitos.
pub fn parse_public_code(code: &str) -> Option<i64> {
    let digits = code.strip_prefix(REQUEST_CODE_PREFIX)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok()
}

// --- Enums de estado ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    PendingApproval,
    Approved,
    InProgress,
    Rejected,
    Closed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::PendingApproval => "pending_approval",
            RequestStatus::Approved => "approved",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "draft" => Ok(RequestStatus::Draft),
            "pending_approval" => Ok(RequestStatus::PendingApproval),
            "approved" => Ok(RequestStatus::Approved),
            "in_progress" => Ok(RequestStatus::InProgress),
            "rejected" => Ok(RequestStatus::Rejected),
            "closed" => Ok(RequestStatus::Closed),
            other => Err(AppError::InternalServerError(anyhow::anyhow!(
                "status de solicitação desconhecido no banco: {other}"
            ))),
        }
    }

    /// Recepções só são aceitas nestes estados.
    pub fn accepts_receptions(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::InProgress)
    }
}

// Motivo pelo qual um passo foi encerrado sem decisão própria.
// "omitido" (par aprovou no mesmo nível) e "cancelado" (cascata de
// rejeição / override do admin) são a mesma coisa semanticamente; aqui
// viram uma variante única com o motivo na etiqueta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    PeerApproved,
    RejectionCascade,
    AdminOverride,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::PeerApproved => "peer_approved",
            TerminalReason::RejectionCascade => "rejection_cascade",
            TerminalReason::AdminOverride => "admin_override",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "peer_approved" => Ok(TerminalReason::PeerApproved),
            "rejection_cascade" => Ok(TerminalReason::RejectionCascade),
            "admin_override" => Ok(TerminalReason::AdminOverride),
            other => Err(AppError::InternalServerError(anyhow::anyhow!(
                "motivo terminal desconhecido no banco: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Terminalized(TerminalReason),
}

impl StepStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, StepStatus::Pending)
    }

    /// Valor da coluna `status`.
    pub fn db_status(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
            StepStatus::Terminalized(_) => "terminalized",
        }
    }

    /// Valor da coluna `terminal_reason` (NULL fora do estado terminalizado).
    pub fn db_reason(&self) -> Option<&'static str> {
        match self {
            StepStatus::Terminalized(reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn from_db(status: &str, reason: Option<&str>) -> Result<Self, AppError> {
        match status {
            "pending" => Ok(StepStatus::Pending),
            "approved" => Ok(StepStatus::Approved),
            "rejected" => Ok(StepStatus::Rejected),
            "terminalized" => {
                let reason = reason.ok_or_else(|| {
                    AppError::InternalServerError(anyhow::anyhow!(
                        "passo terminalizado sem motivo no banco"
                    ))
                })?;
                Ok(StepStatus::Terminalized(TerminalReason::parse(reason)?))
            }
            other => Err(AppError::InternalServerError(anyhow::anyhow!(
                "status de passo desconhecido no banco: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
}

// --- Entidades ---

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub id: i64,
    #[schema(example = "SC-000042")]
    pub code: String,
    pub requester_id: Uuid,
    pub provider_id: Option<Uuid>,
    #[schema(ignore)]
    pub dependency_id: Uuid,
    pub status: RequestStatus,
    pub urgent: bool,
    pub notes: Option<String>,
    pub admin_comment: Option<String>,
    pub rejection_comment: Option<String>,
    #[schema(example = "1520.50")]
    pub total_value: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct RequestRow {
    pub id: i64,
    pub requester_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub dependency_id: Uuid,
    pub status: String,
    pub urgent: bool,
    pub notes: Option<String>,
    pub admin_comment: Option<String>,
    pub rejection_comment: Option<String>,
    pub total_value: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for PurchaseRequest {
    type Error = AppError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(PurchaseRequest {
            id: row.id,
            code: format_public_code(row.id),
            requester_id: row.requester_id,
            provider_id: row.provider_id,
            dependency_id: row.dependency_id,
            status: RequestStatus::parse(&row.status)?,
            urgent: row.urgent,
            notes: row.notes,
            admin_comment: row.admin_comment,
            rejection_comment: row.rejection_comment,
            total_value: row.total_value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestItem {
    pub id: i64,
    pub request_id: i64,
    #[schema(example = "Resma de papel A4")]
    pub description: String,
    pub technical_spec: Option<String>,
    #[schema(example = 10)]
    pub quantity: i32,
    #[schema(example = "25.90")]
    pub unit_price: Option<Decimal>,
    pub necessity: Option<String>,
    pub observations: Option<String>,
    pub admin_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Item de uma nova solicitação, como chega do chamador. `Serialize` é
// exigido pelo `validator` para itens de lista validados com `nested`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewItemInput {
    #[validate(length(min = 1, message = "A descrição do item é obrigatória."))]
    #[schema(example = "Resma de papel A4")]
    pub description: String,
    pub technical_spec: Option<String>,
    #[validate(range(min = 1, message = "A quantidade deve ser positiva."))]
    #[schema(example = 10)]
    pub quantity: i32,
    #[schema(example = "25.90")]
    pub unit_price: Option<Decimal>,
    pub necessity: Option<String>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub id: i64,
    pub request_id: i64,
    pub approver_id: Uuid,
    #[schema(example = 1)]
    pub level: i32,
    #[serde(flatten)]
    pub status: StepStatus,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub struct ApprovalStepRow {
    pub id: i64,
    pub request_id: i64,
    pub approver_id: Uuid,
    pub level: i32,
    pub status: String,
    pub terminal_reason: Option<String>,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApprovalStepRow> for ApprovalStep {
    type Error = AppError;

    fn try_from(row: ApprovalStepRow) -> Result<Self, Self::Error> {
        Ok(ApprovalStep {
            id: row.id,
            request_id: row.request_id,
            approver_id: row.approver_id,
            level: row.level,
            status: StepStatus::from_db(&row.status, row.terminal_reason.as_deref())?,
            comment: row.comment,
            decided_at: row.decided_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reception {
    pub id: i64,
    pub item_id: i64,
    pub user_id: Uuid,
    #[schema(example = 4)]
    pub quantity: i32,
    pub received_on: NaiveDate,
    #[schema(example = "FC")]
    pub invoice_prefix: Option<String>,
    #[schema(example = "001234")]
    pub invoice_number: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Totais por item usados pelo rastreador de recepções.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ItemTotals {
    pub item_id: i64,
    pub requested: i64,
    pub received: i64,
}

// Situação de um item após uma recepção, devolvida ao chamador.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemState {
    pub item_id: i64,
    pub requested: i64,
    pub received: i64,
    pub outstanding: i64,
}

// Fotografia completa de uma solicitação: cabeçalho + itens + passos de
// aprovação + recepções. É o que as camadas de leitura consomem.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    #[serde(flatten)]
    pub header: PurchaseRequest,
    pub items: Vec<RequestItem>,
    pub approval_steps: Vec<ApprovalStep>,
    pub receptions: Vec<Reception>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formata_codigo_com_seis_digitos() {
        assert_eq!(format_public_code(42), "SC-000042");
        assert_eq!(format_public_code(1), "SC-000001");
    }

    #[test]
    fn codigo_maior_que_seis_digitos_nao_e_truncado() {
        // A regra legada de "tirar o zero final" não foi replicada:
        // contadores acima de 999999 só ficam mais largos.
        assert_eq!(format_public_code(1_234_567), "SC-1234567");
        assert_eq!(parse_public_code("SC-1234567"), Some(1_234_567));
    }

    #[test]
    fn parse_aceita_apenas_o_formato_esperado() {
        assert_eq!(parse_public_code("SC-000042"), Some(42));
        assert_eq!(parse_public_code("SC-"), None);
        assert_eq!(parse_public_code("XX-000042"), None);
        assert_eq!(parse_public_code("SC-12a4"), None);
        assert_eq!(parse_public_code("000042"), None);
    }

    #[test]
    fn step_status_ida_e_volta_do_banco() {
        let status = StepStatus::Terminalized(TerminalReason::PeerApproved);
        assert_eq!(status.db_status(), "terminalized");
        assert_eq!(status.db_reason(), Some("peer_approved"));
        let back = StepStatus::from_db("terminalized", Some("peer_approved")).unwrap();
        assert_eq!(back, status);
        assert!(StepStatus::from_db("terminalized", None).is_err());
    }
}
