// Propriedades do ciclo de vida, exercitadas sobre os planejadores puros
// dos dois motores (a mesma lógica que roda dentro das transações).

use proptest::prelude::*;
use uuid::Uuid;

use compras_backend::common::error::AppError;
use compras_backend::models::requests::{
    ApprovalStep, DecisionAction, ItemTotals, RequestStatus, StepStatus,
};
use compras_backend::services::approval_service::{DecisionPlan, plan_decision};
use compras_backend::services::fulfillment_service::plan_reception;

fn approver(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn pending_step(id: i64, approver_id: Uuid, level: i32) -> ApprovalStep {
    ApprovalStep {
        id,
        request_id: 1,
        approver_id,
        level,
        status: StepStatus::Pending,
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

// Simula uma solicitação inteira no nível dos planejadores: decide até
// terminar e depois recebe até fechar (quando aprovada).
proptest! {
    // A soma recebida por item nunca excede o solicitado, e a solicitação
    // fecha exatamente quando todos os itens estão completos.
    #[test]
    fn recepcoes_nunca_excedem_o_solicitado(
        requested in proptest::collection::vec(1i64..20, 1..5),
        deliveries in proptest::collection::vec((0usize..5, 1i64..25), 0..40),
    ) {
        let mut totals: Vec<ItemTotals> = requested
            .iter()
            .enumerate()
            .map(|(i, &q)| ItemTotals { item_id: i as i64, requested: q, received: 0 })
            .collect();
        let mut status = RequestStatus::Approved;

        for (idx, qty) in deliveries {
            let item_id = (idx % totals.len()) as i64;
            match plan_reception(status, &totals, item_id, qty) {
                Ok(plan) => {
                    let t = totals.iter_mut().find(|t| t.item_id == item_id).unwrap();
                    t.received += qty;
                    if let Some(new_status) = plan.new_request_status {
                        status = new_status;
                    }
                }
                Err(AppError::OverReceipt) | Err(AppError::InvalidState) => {}
                Err(e) => prop_assert!(false, "erro inesperado: {}", e),
            }

            // Invariante central do rastreador.
            for t in &totals {
                prop_assert!(t.received <= t.requested);
            }

            let all_complete = totals.iter().all(|t| t.received >= t.requested);
            prop_assert_eq!(status == RequestStatus::Closed, all_complete);
        }
    }

    // Qualquer que seja a ordem em que os aprovadores tentem agir, a
    // cascata respeita os níveis, termina em um estado terminal coerente
    // e nunca deixa passo pendente depois de resolver.
    #[test]
    fn cascata_respeita_niveis_em_qualquer_ordem(
        levels in proptest::collection::vec(1i32..4, 1..6),
        order in proptest::collection::vec(0usize..6, 1..30),
        reject_at in proptest::option::of(0usize..6),
    ) {
        let mut steps: Vec<ApprovalStep> = levels
            .iter()
            .enumerate()
            .map(|(i, &lvl)| pending_step(i as i64, approver(i as u128 + 1), lvl))
            .collect();
        let mut status = RequestStatus::PendingApproval;

        for &pick in &order {
            if status != RequestStatus::PendingApproval {
                break;
            }
            let idx = pick % steps.len();
            let who = steps[idx].approver_id;
            let action = if reject_at == Some(idx) {
                DecisionAction::Reject
            } else {
                DecisionAction::Approve
            };

            match plan_decision(&steps, who, action, false, None) {
                Ok(plan) => {
                    apply(&mut steps, &plan);
                    if let Some(new_status) = plan.new_request_status {
                        status = new_status;
                    }
                }
                Err(AppError::NoPendingApproval) | Err(AppError::OutOfOrderDecision) => {}
                Err(e) => prop_assert!(false, "erro inesperado: {}", e),
            }

            // Ninguém de nível superior decide enquanto há pendência abaixo.
            for s in &steps {
                if s.status == StepStatus::Approved || s.status == StepStatus::Rejected {
                    prop_assert!(
                        !steps.iter().any(|o| o.level < s.level && o.status.is_pending())
                    );
                }
            }
        }

        if status != RequestStatus::PendingApproval {
            // Estado terminal: nenhum passo pendente sobra.
            prop_assert!(!steps.iter().any(|s| s.status.is_pending()));
        }

        // No máximo um aprovado por nível (primeiro a decidir vence).
        for lvl in 1..4 {
            let approved = steps
                .iter()
                .filter(|s| s.level == lvl && s.status == StepStatus::Approved)
                .count();
            prop_assert!(approved <= 1);
        }
    }
}

#[test]
fn ciclo_completo_aprovacao_e_recepcao() {
    // Níveis [1, 1, 2] e itens {A: 10, B: 5}, do começo ao fim.
    let mut steps = vec![
        pending_step(1, approver(1), 1),
        pending_step(2, approver(2), 1),
        pending_step(3, approver(3), 2),
    ];

    let plan = plan_decision(&steps, approver(2), DecisionAction::Approve, false, None).unwrap();
    assert_eq!(plan.new_request_status, None);
    apply(&mut steps, &plan);

    let plan = plan_decision(&steps, approver(3), DecisionAction::Approve, false, None).unwrap();
    assert_eq!(plan.new_request_status, Some(RequestStatus::Approved));
    apply(&mut steps, &plan);

    let mut totals = vec![
        ItemTotals { item_id: 1, requested: 10, received: 0 },
        ItemTotals { item_id: 2, requested: 5, received: 0 },
    ];
    let mut status = RequestStatus::Approved;

    let plan = plan_reception(status, &totals, 1, 10).unwrap();
    assert_eq!(plan.new_request_status, Some(RequestStatus::InProgress));
    totals[0].received += 10;
    status = RequestStatus::InProgress;

    let plan = plan_reception(status, &totals, 2, 4).unwrap();
    assert_eq!(plan.new_request_status, None);
    totals[1].received += 4;

    let plan = plan_reception(status, &totals, 2, 1).unwrap();
    assert_eq!(plan.new_request_status, Some(RequestStatus::Closed));
    totals[1].received += 1;
    status = RequestStatus::Closed;

    // Depois de fechada, nenhuma recepção é aceita.
    let err = plan_reception(status, &totals, 1, 1).unwrap_err();
    assert!(matches!(err, AppError::InvalidState));
}
