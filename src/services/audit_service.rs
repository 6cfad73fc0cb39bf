// src/services/audit_service.rs

use sqlx::PgPool;
use uuid::Uuid;

// Trilha de auditoria das transições de estado. "Fire-and-forget": a
// gravação roda em uma task separada e uma falha aqui nunca derruba a
// operação que a originou (o evento também sai pelo tracing).
#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn log(&self, actor_id: Option<Uuid>, action: &str, entity: &str, entity_id: String) {
        tracing::info!(
            actor = ?actor_id,
            action = action,
            entity = entity,
            entity_id = %entity_id,
            "evento de auditoria"
        );

        let pool = self.pool.clone();
        let action = action.to_owned();
        let entity = entity.to_owned();
        tokio::spawn(async move {
            let result = sqlx::query(
                "INSERT INTO audit_events (actor_id, action, entity, entity_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(actor_id)
            .bind(&action)
            .bind(&entity)
            .bind(&entity_id)
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::warn!("Falha ao gravar evento de auditoria ({action}): {e}");
            }
        });
    }
}
