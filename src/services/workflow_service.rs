// src/services/workflow_service.rs
//
// A fachada do fluxo de compras: o ÚNICO ponto de entrada que os
// handlers usam. Valida a forma da entrada, aplica as regras de
// autorização (papel + escopo do aprovador) e delega para os dois
// motores. Não carrega estado próprio nem lógica de negócio além disso.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{RequestRepository, UserRepository},
    models::{
        auth::{Role, User},
        requests::{
            DecisionAction, NewItemInput, PurchaseRequest, RequestDetail, RequestStatus,
            parse_public_code,
        },
    },
    services::{
        ApprovalService, AuditService, FulfillmentService,
        fulfillment_service::{ReceiveInput, ReceiveOutcome},
    },
};

#[derive(Clone)]
pub struct WorkflowService {
    pool: PgPool,
    repo: RequestRepository,
    user_repo: UserRepository,
    approval: ApprovalService,
    fulfillment: FulfillmentService,
    audit: AuditService,
}

impl WorkflowService {
    pub fn new(
        pool: PgPool,
        repo: RequestRepository,
        user_repo: UserRepository,
        approval: ApprovalService,
        fulfillment: FulfillmentService,
        audit: AuditService,
    ) -> Self {
        Self {
            pool,
            repo,
            user_repo,
            approval,
            fulfillment,
            audit,
        }
    }

    /// Cria e submete uma solicitação de compra.
    pub async fn submit(
        &self,
        user: &User,
        provider_id: Option<Uuid>,
        urgent: bool,
        notes: Option<&str>,
        items: &[NewItemInput],
    ) -> Result<PurchaseRequest, AppError> {
        if !user.role.can_submit() {
            return Err(AppError::Forbidden);
        }
        let dependency_id = user.dependency_id.ok_or_else(|| {
            AppError::InvalidPayload("O usuário não está vinculado a nenhuma dependência.".into())
        })?;

        // Validações de forma, antes de abrir qualquer transação.
        if items.is_empty() {
            return Err(AppError::InvalidPayload(
                "A solicitação precisa de pelo menos um item.".into(),
            ));
        }
        for item in items {
            if item.description.trim().is_empty() {
                return Err(AppError::InvalidPayload(
                    "A descrição do item é obrigatória.".into(),
                ));
            }
            if item.quantity <= 0 {
                return Err(AppError::InvalidPayload(
                    "A quantidade solicitada deve ser positiva.".into(),
                ));
            }
        }

        let request = self
            .approval
            .submit(&self.pool, user, dependency_id, provider_id, urgent, notes, items)
            .await?;

        self.audit.log(
            Some(user.id),
            "request.submitted",
            "request",
            request.code.clone(),
        );

        Ok(request)
    }

    /// Decide (aprova/rejeita) uma solicitação pendente.
    pub async fn decide(
        &self,
        user: &User,
        code: &str,
        action: DecisionAction,
        comment: Option<&str>,
    ) -> Result<RequestStatus, AppError> {
        if !user.role.can_decide() {
            return Err(AppError::Forbidden);
        }
        let request_id = parse_public_code(code)
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação".into()))?;

        // Aprovadores só atuam dentro do próprio escopo de dependências;
        // o admin atua em qualquer uma (com semântica de override).
        if !user.role.is_admin() {
            let request = self
                .repo
                .get_request(request_id)
                .await?
                .ok_or_else(|| AppError::ResourceNotFound("Solicitação".into()))?;
            let scopes = self.user_repo.approver_scopes(&self.pool, user.id).await?;
            if !scopes.contains(&request.dependency_id) {
                return Err(AppError::Forbidden);
            }
        }

        let new_status = self
            .approval
            .decide(&self.pool, user, request_id, action, comment)
            .await?;

        let action_name = match action {
            DecisionAction::Approve => "request.approval",
            DecisionAction::Reject => "request.rejection",
        };
        self.audit
            .log(Some(user.id), action_name, "request", code.to_owned());

        Ok(new_status)
    }

    /// Registra a recepção de mercadoria contra um item.
    pub async fn receive(
        &self,
        user: &User,
        item_id: i64,
        input: &ReceiveInput,
    ) -> Result<ReceiveOutcome, AppError> {
        if !user.role.can_receive() {
            return Err(AppError::Forbidden);
        }
        if input.quantity <= 0 {
            return Err(AppError::InvalidPayload(
                "A quantidade recebida deve ser positiva.".into(),
            ));
        }

        // Solicitantes só recebem as próprias solicitações.
        let enforce_owner = (user.role == Role::Requester).then_some(user.id);

        let outcome = self
            .fulfillment
            .receive(&self.pool, user.id, enforce_owner, item_id, input)
            .await?;

        self.audit.log(
            Some(user.id),
            "reception.recorded",
            "request_item",
            item_id.to_string(),
        );
        if outcome.request_status == RequestStatus::Closed {
            self.audit.log(
                Some(user.id),
                "request.closed",
                "request",
                outcome.request_code.clone(),
            );
        }

        Ok(outcome)
    }

    /// Fotografia completa de uma solicitação.
    pub async fn query(&self, user: &User, code: &str) -> Result<RequestDetail, AppError> {
        let request_id = parse_public_code(code)
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação".into()))?;

        let detail = self
            .repo
            .get_detail(request_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação".into()))?;

        self.ensure_can_view(user, &detail.header).await?;
        Ok(detail)
    }

    /// Solicitações visíveis para o usuário, conforme o papel.
    pub async fn list(&self, user: &User) -> Result<Vec<PurchaseRequest>, AppError> {
        match user.role {
            Role::Admin | Role::Warehouse => self.repo.list_all().await,
            Role::Requester => self.repo.list_for_requester(user.id).await,
            Role::Approver => {
                let scopes = self.user_repo.approver_scopes(&self.pool, user.id).await?;
                if scopes.is_empty() {
                    return Ok(Vec::new());
                }
                self.repo.list_for_dependencies(&scopes).await
            }
        }
    }

    async fn ensure_can_view(&self, user: &User, request: &PurchaseRequest) -> Result<(), AppError> {
        match user.role {
            Role::Admin | Role::Warehouse => Ok(()),
            Role::Requester if request.requester_id == user.id => Ok(()),
            Role::Approver => {
                let scopes = self.user_repo.approver_scopes(&self.pool, user.id).await?;
                if scopes.contains(&request.dependency_id) {
                    Ok(())
                } else {
                    Err(AppError::Forbidden)
                }
            }
            _ => Err(AppError::Forbidden),
        }
    }
}
