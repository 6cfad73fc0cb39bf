// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,

        // --- Users ---
        handlers::auth::get_me,

        // --- Requests ---
        handlers::requests::submit_request,
        handlers::requests::get_request,
        handlers::requests::list_requests,
        handlers::requests::decide_request,
        handlers::requests::receive_item,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::Role,
            models::auth::User,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::AuthResponse,

            // --- Requests ---
            models::requests::RequestStatus,
            models::requests::StepStatus,
            models::requests::TerminalReason,
            models::requests::DecisionAction,
            models::requests::PurchaseRequest,
            models::requests::RequestItem,
            models::requests::NewItemInput,
            models::requests::ApprovalStep,
            models::requests::Reception,
            models::requests::ItemState,
            models::requests::RequestDetail,

            // --- Payloads ---
            handlers::requests::SubmitRequestPayload,
            handlers::requests::DecisionPayload,
            handlers::requests::DecisionResponse,
            handlers::requests::ReceivePayload,
            handlers::requests::ReceiveResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação e Registro"),
        (name = "Users", description = "Dados do Usuário e Perfil"),
        (name = "Requests", description = "Ciclo de vida das Solicitações de Compra")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}
