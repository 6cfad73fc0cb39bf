// src/config.rs

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{env, time::Duration};

use crate::{
    db::{RequestRepository, UserRepository},
    services::{
        ApprovalService, AuditService, FulfillmentService, WorkflowService, auth::AuthService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService,
    pub workflow_service: WorkflowService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET deve ser definido");

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let user_repo = UserRepository::new(db_pool.clone());
        let request_repo = RequestRepository::new(db_pool.clone());

        let auth_service = AuthService::new(user_repo.clone(), jwt_secret);
        let approval_service = ApprovalService::new(request_repo.clone());
        let fulfillment_service = FulfillmentService::new(request_repo.clone());
        let audit_service = AuditService::new(db_pool.clone());

        let workflow_service = WorkflowService::new(
            db_pool.clone(),
            request_repo,
            user_repo,
            approval_service,
            fulfillment_service,
            audit_service,
        );

        Ok(Self {
            db_pool,
            auth_service,
            workflow_service,
        })
    }
}
