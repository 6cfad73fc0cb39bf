// src/services/approval_service.rs
//
// O motor da cascata de aprovação: criação dos passos na submissão e a
// operação `decide` (aprovar/rejeitar) com corrida de pares, cascata de
// rejeição e override administrativo.
//
// A decisão em si é planejada por uma função pura (`plan_decision`) sobre
// os passos carregados com `FOR UPDATE`; o serviço só aplica o plano
// dentro da mesma transação.

use sqlx::{Acquire, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::RequestRepository,
    models::{
        auth::User,
        requests::{
            ApprovalStep, DecisionAction, NewItemInput, PurchaseRequest, RequestStatus, StepStatus,
            TerminalReason,
        },
    },
};

// Uma mudança de estado a aplicar em um passo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepChange {
    pub step_id: i64,
    pub status: StepStatus,
    pub note: Option<String>,
}

// O plano completo de uma decisão: mudanças de passos + novo status da
// solicitação (None = continua pendente de aprovação).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPlan {
    pub changes: Vec<StepChange>,
    pub new_request_status: Option<RequestStatus>,
}

/// Planeja uma decisão sobre os passos de uma solicitação.
///
/// Regras:
/// 1. o aprovador precisa ter um passo `pending` próprio (senão
///    `NoPendingApproval`);
/// 2. nenhum nível estritamente menor pode ter passo `pending` (senão
///    `OutOfOrderDecision`);
/// 3. rejeição encerra todos os outros passos pendentes e rejeita a
///    solicitação;
/// 4. aprovação encerra os pares pendentes do mesmo nível ("primeiro a
///    decidir vence") e aprova a solicitação quando não sobra nenhum
///    passo pendente;
/// 5. o override administrativo ignora as regras 1–2 e encerra todos os
///    outros passos pendentes.
pub fn plan_decision(
    steps: &[ApprovalStep],
    approver_id: Uuid,
    action: DecisionAction,
    admin_override: bool,
    comment: Option<&str>,
) -> Result<DecisionPlan, AppError> {
    if admin_override {
        return plan_admin_override(steps, approver_id, action, comment);
    }

    let own = steps
        .iter()
        .find(|s| s.approver_id == approver_id && s.status.is_pending())
        .ok_or(AppError::NoPendingApproval)?;

    // Verificação de ordem sequencial, sempre sobre a leitura travada
    // desta transação.
    if steps
        .iter()
        .any(|s| s.level < own.level && s.status.is_pending())
    {
        return Err(AppError::OutOfOrderDecision);
    }

    let mut changes = Vec::new();

    match action {
        DecisionAction::Reject => {
            changes.push(StepChange {
                step_id: own.id,
                status: StepStatus::Rejected,
                note: comment.map(str::to_owned),
            });
            for other in steps.iter().filter(|s| s.id != own.id && s.status.is_pending()) {
                changes.push(StepChange {
                    step_id: other.id,
                    status: StepStatus::Terminalized(TerminalReason::RejectionCascade),
                    note: Some("Encerrado: solicitação rejeitada em nível anterior.".into()),
                });
            }
            Ok(DecisionPlan {
                changes,
                new_request_status: Some(RequestStatus::Rejected),
            })
        }
        DecisionAction::Approve => {
            changes.push(StepChange {
                step_id: own.id,
                status: StepStatus::Approved,
                note: comment.map(str::to_owned),
            });
            // Pares do mesmo nível perdem a corrida e são encerrados.
            for peer in steps
                .iter()
                .filter(|s| s.id != own.id && s.level == own.level && s.status.is_pending())
            {
                changes.push(StepChange {
                    step_id: peer.id,
                    status: StepStatus::Terminalized(TerminalReason::PeerApproved),
                    note: Some("Encerrado: aprovado por um par do mesmo nível.".into()),
                });
            }

            let still_pending = steps.iter().any(|s| {
                s.status.is_pending() && s.id != own.id && s.level != own.level
            });
            Ok(DecisionPlan {
                changes,
                new_request_status: if still_pending {
                    None
                } else {
                    Some(RequestStatus::Approved)
                },
            })
        }
    }
}

// Override administrativo: decide independente de nível/ordem e encerra
// todos os outros passos pendentes com a anotação de override.
fn plan_admin_override(
    steps: &[ApprovalStep],
    admin_id: Uuid,
    action: DecisionAction,
    comment: Option<&str>,
) -> Result<DecisionPlan, AppError> {
    if !steps.iter().any(|s| s.status.is_pending()) {
        return Err(AppError::NoPendingApproval);
    }

    let own_status = match action {
        DecisionAction::Approve => StepStatus::Approved,
        DecisionAction::Reject => StepStatus::Rejected,
    };

    let mut changes = Vec::new();
    for step in steps.iter().filter(|s| s.status.is_pending()) {
        if step.approver_id == admin_id {
            changes.push(StepChange {
                step_id: step.id,
                status: own_status,
                note: comment.map(str::to_owned),
            });
        } else {
            changes.push(StepChange {
                step_id: step.id,
                status: StepStatus::Terminalized(TerminalReason::AdminOverride),
                note: Some("Encerrado por decisão administrativa.".into()),
            });
        }
    }

    Ok(DecisionPlan {
        changes,
        new_request_status: Some(match action {
            DecisionAction::Approve => RequestStatus::Approved,
            DecisionAction::Reject => RequestStatus::Rejected,
        }),
    })
}

#[derive(Clone)]
pub struct ApprovalService {
    repo: RequestRepository,
}

impl ApprovalService {
    pub fn new(repo: RequestRepository) -> Self {
        Self { repo }
    }

    /// Cria a solicitação com seus itens e um passo por aprovador da
    /// política da dependência, tudo em UMA transação, e a coloca em
    /// `pending_approval`.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit<'e, A>(
        &self,
        conn: A,
        requester: &User,
        dependency_id: Uuid,
        provider_id: Option<Uuid>,
        urgent: bool,
        notes: Option<&str>,
        items: &[NewItemInput],
    ) -> Result<PurchaseRequest, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = conn.begin().await?;

        let mut request = self
            .repo
            .create_request(&mut *tx, requester.id, dependency_id, provider_id, urgent, notes)
            .await?;

        for item in items {
            self.repo.insert_item(&mut *tx, request.id, item).await?;
        }
        let total = self.repo.recompute_total_value(&mut *tx, request.id).await?;

        let rules = self
            .repo
            .approval_rules_for_dependency(&mut *tx, dependency_id)
            .await?;
        if rules.is_empty() {
            return Err(AppError::InvalidPayload(
                "Não há política de aprovação configurada para esta dependência.".into(),
            ));
        }
        if rules.len() == 1 && rules[0].approver_id == requester.id {
            return Err(AppError::InvalidPayload(
                "O solicitante não pode ser o único aprovador da própria solicitação.".into(),
            ));
        }

        for rule in &rules {
            self.repo
                .insert_step(&mut *tx, request.id, rule.approver_id, rule.level)
                .await?;
        }

        self.repo
            .update_request_status(&mut *tx, request.id, RequestStatus::PendingApproval)
            .await?;

        tx.commit().await?;

        request.status = RequestStatus::PendingApproval;
        request.total_value = total;
        Ok(request)
    }

    /// Aplica uma decisão (aprovar/rejeitar) em UMA transação: carrega a
    /// solicitação e os passos com `FOR UPDATE`, planeja e aplica. O lock
    /// de linha do banco é o único controle de admissão entre pares
    /// concorrentes.
    pub async fn decide<'e, A>(
        &self,
        conn: A,
        approver: &User,
        request_id: i64,
        action: DecisionAction,
        comment: Option<&str>,
    ) -> Result<RequestStatus, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .repo
            .get_request_for_update(&mut *tx, request_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação".into()))?;

        if request.status != RequestStatus::PendingApproval {
            // Já aprovada/rejeitada/encerrada: não existe aprovação
            // pendente para ninguém.
            return Err(AppError::NoPendingApproval);
        }

        let steps = self.repo.list_steps_for_update(&mut *tx, request_id).await?;
        let plan = plan_decision(&steps, approver.id, action, approver.role.is_admin(), comment)?;

        for change in &plan.changes {
            self.repo
                .apply_step_change(&mut *tx, change.step_id, &change.status, change.note.as_deref())
                .await?;
        }

        if let Some(new_status) = plan.new_request_status {
            self.repo
                .update_request_status(&mut *tx, request_id, new_status)
                .await?;
            if new_status == RequestStatus::Rejected {
                self.repo
                    .set_rejection_comment(&mut *tx, request_id, comment)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(plan
            .new_request_status
            .unwrap_or(RequestStatus::PendingApproval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approver(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn step(id: i64, approver_id: Uuid, level: i32, status: StepStatus) -> ApprovalStep {
        ApprovalStep {
            id,
            request_id: 1,
            approver_id,
            level,
            status,
            comment: None,
            decided_at: None,
        }
    }

    fn apply(steps: &mut [ApprovalStep], plan: &DecisionPlan) {
        for change in &plan.changes {
            let s = steps.iter_mut().find(|s| s.id == change.step_id).unwrap();
            s.status = change.status;
        }
    }

    #[test]
    fn nivel_superior_nao_pode_agir_antes_dos_inferiores() {
        // Níveis [1, 1, 2]: o nível 2 não pode decidir enquanto o 1 tem
        // passos pendentes.
        let steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 1, StepStatus::Pending),
            step(3, approver(3), 2, StepStatus::Pending),
        ];
        let err =
            plan_decision(&steps, approver(3), DecisionAction::Approve, false, None).unwrap_err();
        assert!(matches!(err, AppError::OutOfOrderDecision));
    }

    #[test]
    fn aprovacao_de_par_encerra_o_outro_par_e_libera_o_proximo_nivel() {
        let mut steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 1, StepStatus::Pending),
            step(3, approver(3), 2, StepStatus::Pending),
        ];
        let plan =
            plan_decision(&steps, approver(1), DecisionAction::Approve, false, None).unwrap();

        // O par perde a corrida; a solicitação continua pendente (nível 2).
        assert_eq!(plan.new_request_status, None);
        apply(&mut steps, &plan);
        assert_eq!(steps[0].status, StepStatus::Approved);
        assert_eq!(
            steps[1].status,
            StepStatus::Terminalized(TerminalReason::PeerApproved)
        );
        assert_eq!(steps[2].status, StepStatus::Pending);

        // Agora o nível 2 pode agir, e a aprovação dele fecha a cascata.
        let plan =
            plan_decision(&steps, approver(3), DecisionAction::Approve, false, None).unwrap();
        assert_eq!(plan.new_request_status, Some(RequestStatus::Approved));
        apply(&mut steps, &plan);
        assert!(steps.iter().all(|s| !s.status.is_pending()));
    }

    #[test]
    fn corrida_de_pares_e_deterministica_o_segundo_falha() {
        let mut steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 1, StepStatus::Pending),
        ];
        let plan =
            plan_decision(&steps, approver(1), DecisionAction::Approve, false, None).unwrap();
        apply(&mut steps, &plan);

        // O segundo par agora não tem mais passo pendente: nunca fica
        // `approved` nem volta a `pending`.
        let err =
            plan_decision(&steps, approver(2), DecisionAction::Approve, false, None).unwrap_err();
        assert!(matches!(err, AppError::NoPendingApproval));
        assert_eq!(
            steps[1].status,
            StepStatus::Terminalized(TerminalReason::PeerApproved)
        );
    }

    #[test]
    fn rejeicao_encerra_os_niveis_seguintes() {
        // Níveis [1, 2]: rejeitar no 1 cancela o passo do 2.
        let mut steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 2, StepStatus::Pending),
        ];
        let plan = plan_decision(
            &steps,
            approver(1),
            DecisionAction::Reject,
            false,
            Some("fora do orçamento"),
        )
        .unwrap();
        assert_eq!(plan.new_request_status, Some(RequestStatus::Rejected));
        apply(&mut steps, &plan);
        assert_eq!(steps[0].status, StepStatus::Rejected);
        assert_eq!(
            steps[1].status,
            StepStatus::Terminalized(TerminalReason::RejectionCascade)
        );

        // Tentar decidir o passo encerrado falha e nada muda.
        let before = steps.clone();
        let err =
            plan_decision(&steps, approver(2), DecisionAction::Approve, false, None).unwrap_err();
        assert!(matches!(err, AppError::NoPendingApproval));
        assert_eq!(
            steps.iter().map(|s| s.status).collect::<Vec<_>>(),
            before.iter().map(|s| s.status).collect::<Vec<_>>()
        );
    }

    #[test]
    fn decisao_repetida_apos_rejeicao_falha_para_todos() {
        let mut steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 2, StepStatus::Pending),
        ];
        let plan =
            plan_decision(&steps, approver(1), DecisionAction::Reject, false, None).unwrap();
        apply(&mut steps, &plan);

        for n in 1..=2 {
            let err = plan_decision(&steps, approver(n), DecisionAction::Approve, false, None)
                .unwrap_err();
            assert!(matches!(err, AppError::NoPendingApproval));
        }
    }

    #[test]
    fn override_administrativo_ignora_a_ordem() {
        let mut steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 2, StepStatus::Pending),
        ];
        // O admin não tem passo próprio e decide mesmo assim.
        let plan = plan_decision(&steps, approver(99), DecisionAction::Approve, true, None).unwrap();
        assert_eq!(plan.new_request_status, Some(RequestStatus::Approved));
        apply(&mut steps, &plan);
        assert!(steps.iter().all(|s| s.status
            == StepStatus::Terminalized(TerminalReason::AdminOverride)));
    }

    #[test]
    fn override_administrativo_sem_pendencias_falha() {
        let steps = vec![step(1, approver(1), 1, StepStatus::Approved)];
        let err =
            plan_decision(&steps, approver(99), DecisionAction::Reject, true, None).unwrap_err();
        assert!(matches!(err, AppError::NoPendingApproval));
    }

    #[test]
    fn aprovador_errado_nao_tem_pendencia() {
        let steps = vec![step(1, approver(1), 1, StepStatus::Pending)];
        let err =
            plan_decision(&steps, approver(7), DecisionAction::Approve, false, None).unwrap_err();
        assert!(matches!(err, AppError::NoPendingApproval));
    }

    #[test]
    fn apos_resolver_um_nivel_nao_sobra_pendencia_abaixo_dele() {
        // Invariante: com status aprovado, nenhum passo pendente pode
        // existir em nível menor ou igual ao último nível resolvido.
        let mut steps = vec![
            step(1, approver(1), 1, StepStatus::Pending),
            step(2, approver(2), 1, StepStatus::Pending),
            step(3, approver(3), 2, StepStatus::Pending),
        ];
        let plan =
            plan_decision(&steps, approver(2), DecisionAction::Approve, false, None).unwrap();
        apply(&mut steps, &plan);
        let plan =
            plan_decision(&steps, approver(3), DecisionAction::Approve, false, None).unwrap();
        apply(&mut steps, &plan);
        assert_eq!(plan.new_request_status, Some(RequestStatus::Approved));
        assert!(!steps.iter().any(|s| s.status.is_pending()));
    }
}
