// src/handlers/requests.rs
//
// Camada fina sobre a fachada do fluxo: valida a forma do payload e
// repassa. Nenhuma regra de negócio mora aqui.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::requests::{
        DecisionAction, ItemState, NewItemInput, PurchaseRequest, Reception, RequestDetail,
        RequestStatus,
    },
    services::fulfillment_service::ReceiveInput,
};

// =============================================================================
//  1. SUBMISSÃO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequestPayload {
    pub provider_id: Option<Uuid>,

    #[serde(default)]
    #[schema(example = false)]
    pub urgent: bool,

    #[schema(example = "Reposição de material de escritório")]
    pub notes: Option<String>,

    #[validate(
        length(min = 1, message = "A solicitação precisa de pelo menos um item."),
        nested
    )]
    pub items: Vec<NewItemInput>,
}

// POST /api/requests
#[utoipa::path(
    post,
    path = "/api/requests",
    tag = "Requests",
    request_body = SubmitRequestPayload,
    responses(
        (status = 201, description = "Solicitação criada e submetida à aprovação", body = PurchaseRequest),
        (status = 422, description = "Payload inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn submit_request(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<SubmitRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let request = app_state
        .workflow_service
        .submit(
            &user,
            payload.provider_id,
            payload.urgent,
            payload.notes.as_deref(),
            &payload.items,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

// =============================================================================
//  2. CONSULTA
// =============================================================================

// GET /api/requests/{code}
#[utoipa::path(
    get,
    path = "/api/requests/{code}",
    tag = "Requests",
    responses(
        (status = 200, description = "Fotografia completa da solicitação", body = RequestDetail),
        (status = 404, description = "Solicitação não encontrada")
    ),
    params(("code" = String, Path, description = "Código público (ex.: SC-000042)")),
    security(("api_jwt" = []))
)]
pub async fn get_request(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<Json<RequestDetail>, AppError> {
    let detail = app_state.workflow_service.query(&user, &code).await?;
    Ok(Json(detail))
}

// GET /api/requests
#[utoipa::path(
    get,
    path = "/api/requests",
    tag = "Requests",
    responses(
        (status = 200, description = "Solicitações visíveis para o usuário", body = [PurchaseRequest])
    ),
    security(("api_jwt" = []))
)]
pub async fn list_requests(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<PurchaseRequest>>, AppError> {
    let requests = app_state.workflow_service.list(&user).await?;
    Ok(Json(requests))
}

// =============================================================================
//  3. DECISÃO (APROVAR / REJEITAR)
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPayload {
    #[schema(example = "approve")]
    pub action: DecisionAction,

    #[schema(example = "Dentro do orçamento do trimestre")]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub code: String,
    pub status: RequestStatus,
}

// POST /api/requests/{code}/decision
#[utoipa::path(
    post,
    path = "/api/requests/{code}/decision",
    tag = "Requests",
    request_body = DecisionPayload,
    responses(
        (status = 200, description = "Decisão aplicada", body = DecisionResponse),
        (status = 409, description = "Sem aprovação pendente ou fora de ordem")
    ),
    params(("code" = String, Path, description = "Código público da solicitação")),
    security(("api_jwt" = []))
)]
pub async fn decide_request(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(code): Path<String>,
    Json(payload): Json<DecisionPayload>,
) -> Result<Json<DecisionResponse>, AppError> {
    let status = app_state
        .workflow_service
        .decide(&user, &code, payload.action, payload.comment.as_deref())
        .await?;

    Ok(Json(DecisionResponse { code, status }))
}

// =============================================================================
//  4. RECEPÇÃO
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceivePayload {
    #[validate(range(min = 1, message = "A quantidade recebida deve ser positiva."))]
    #[schema(example = 4)]
    pub quantity: i32,

    pub received_on: Option<NaiveDate>,

    #[schema(example = "FC")]
    pub invoice_prefix: Option<String>,

    #[schema(example = "001234")]
    pub invoice_number: Option<String>,

    pub comment: Option<String>,

    // Preenche o preço do item na primeira recepção, se ainda não houver.
    #[schema(example = "25.90")]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveResponse {
    pub reception: Reception,
    pub item_state: ItemState,
    pub request_status: RequestStatus,
}

// POST /api/requests/items/{item_id}/receptions
#[utoipa::path(
    post,
    path = "/api/requests/items/{item_id}/receptions",
    tag = "Requests",
    request_body = ReceivePayload,
    responses(
        (status = 201, description = "Recepção registrada", body = ReceiveResponse),
        (status = 409, description = "Estado inválido ou quantidade acima do pendente")
    ),
    params(("item_id" = i64, Path, description = "ID do item da solicitação")),
    security(("api_jwt" = []))
)]
pub async fn receive_item(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(item_id): Path<i64>,
    Json(payload): Json<ReceivePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let input = ReceiveInput {
        quantity: payload.quantity,
        received_on: payload.received_on,
        invoice_prefix: payload.invoice_prefix,
        invoice_number: payload.invoice_number,
        comment: payload.comment,
        unit_price: payload.unit_price,
    };

    let outcome = app_state
        .workflow_service
        .receive(&user, item_id, &input)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReceiveResponse {
            reception: outcome.reception,
            item_state: outcome.item_state,
            request_status: outcome.request_status,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_sem_itens_falha_na_validacao() {
        let payload = SubmitRequestPayload {
            provider_id: None,
            urgent: false,
            notes: None,
            items: vec![],
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn item_aninhado_invalido_falha_na_validacao() {
        // A validação `nested` precisa percorrer a lista de itens e
        // apontar o campo inválido dentro do item.
        let payload = SubmitRequestPayload {
            provider_id: None,
            urgent: false,
            notes: None,
            items: vec![NewItemInput {
                description: String::new(),
                technical_spec: None,
                quantity: 0,
                unit_price: None,
                necessity: None,
                observations: None,
            }],
        };
        assert!(payload.validate().is_err());
    }
}
