use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Cada regra de negócio violada tem a sua variante própria: o handler
// devolve uma mensagem distinta em vez de um "erro genérico".
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // Entrada malformada detectada fora do `validator` (ex.: lista de
    // itens vazia, quantidade não positiva).
    #[error("{0}")]
    InvalidPayload(String),

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Você não tem permissão para realizar esta ação")]
    Forbidden,

    #[error("{0} não encontrado(a)")]
    ResourceNotFound(String),

    // --- Erros do ciclo de aprovação ---
    #[error("Não há aprovação pendente para este usuário nesta solicitação")]
    NoPendingApproval,

    #[error("Ainda não é a sua vez de aprovar: existem níveis anteriores pendentes")]
    OutOfOrderDecision,

    // --- Erros de recepção ---
    #[error("A quantidade recebida excede a quantidade pendente do item")]
    OverReceipt,

    #[error("A solicitação não está em um estado que permita esta operação")]
    InvalidState,

    // A transação foi abortada pelo banco por conflito com outro escritor.
    // O chamador pode repetir a operação inteira com segurança.
    #[error("Conflito de concorrência, tente novamente")]
    ConcurrencyConflict,

    // Variante para erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

// Conversão manual (em vez de `#[from]`) para classificar os erros do
// banco: RowNotFound vira 404 e falhas de serialização viram
// ConcurrencyConflict, em vez de caírem todas em 500.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return AppError::ResourceNotFound("Registro".into());
        }
        if let sqlx::Error::Database(db_err) = &err {
            // 40001 = serialization_failure, 40P01 = deadlock_detected
            if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
                return AppError::ConcurrencyConflict;
            }
        }
        AppError::DatabaseError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::InvalidPayload(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::ResourceNotFound(what) => {
                let body = Json(json!({ "error": format!("{} não encontrado(a).", what) }));
                return (StatusCode::NOT_FOUND, body).into_response();
            }

            AppError::EmailAlreadyExists => (StatusCode::CONFLICT, "Este e-mail já está em uso."),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "E-mail ou senha inválidos.")
            }
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.",
            ),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "Usuário não encontrado."),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Você não tem permissão para realizar esta ação.",
            ),

            AppError::NoPendingApproval => (
                StatusCode::CONFLICT,
                "Não há aprovação pendente para você nesta solicitação.",
            ),
            AppError::OutOfOrderDecision => (
                StatusCode::CONFLICT,
                "Ainda não é a sua vez de aprovar: existem níveis anteriores pendentes.",
            ),
            AppError::OverReceipt => (
                StatusCode::CONFLICT,
                "A quantidade recebida excede a quantidade pendente do item.",
            ),
            AppError::InvalidState => (
                StatusCode::CONFLICT,
                "A solicitação não está em um estado que permita esta operação.",
            ),
            AppError::ConcurrencyConflict => (
                StatusCode::CONFLICT,
                "Operação em conflito com outra em andamento. Tente novamente.",
            ),

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` vai logar a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.",
                )
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
