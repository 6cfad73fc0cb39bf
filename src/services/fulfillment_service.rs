// src/services/fulfillment_service.rs
//
// O rastreador de recepções: registra entregas parciais contra os itens
// de uma solicitação aprovada e deriva as transições
// APPROVED -> IN_PROGRESS -> CLOSED a partir das quantidades.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Acquire, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::RequestRepository,
    models::requests::{ItemState, ItemTotals, Reception, RequestStatus},
};

// Dados de uma recepção, como chegam do chamador.
#[derive(Debug, Clone)]
pub struct ReceiveInput {
    pub quantity: i32,
    pub received_on: Option<NaiveDate>,
    pub invoice_prefix: Option<String>,
    pub invoice_number: Option<String>,
    pub comment: Option<String>,
    pub unit_price: Option<Decimal>,
}

// Resultado planejado de uma recepção.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceptionPlan {
    pub item_state: ItemState,
    pub new_request_status: Option<RequestStatus>,
}

// Resultado efetivado de uma recepção.
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub reception: Reception,
    pub item_state: ItemState,
    pub request_code: String,
    pub request_status: RequestStatus,
}

/// Planeja uma recepção sobre os totais por item da solicitação.
///
/// Regras:
/// 1. a solicitação precisa estar em `approved` ou `in_progress`;
/// 2. recebido acumulado + quantidade não pode passar do solicitado
///    (`OverReceipt`);
/// 3. a primeira recepção move `approved` -> `in_progress`;
/// 4. quando o total recebido de TODOS os itens alcança o total
///    solicitado, a solicitação fecha (`closed`).
pub fn plan_reception(
    request_status: RequestStatus,
    totals: &[ItemTotals],
    item_id: i64,
    quantity: i64,
) -> Result<ReceptionPlan, AppError> {
    if !request_status.accepts_receptions() {
        return Err(AppError::InvalidState);
    }
    if quantity <= 0 {
        return Err(AppError::InvalidPayload(
            "A quantidade recebida deve ser positiva.".into(),
        ));
    }

    let item = totals
        .iter()
        .find(|t| t.item_id == item_id)
        .ok_or_else(|| AppError::ResourceNotFound("Item".into()))?;

    if item.received + quantity > item.requested {
        return Err(AppError::OverReceipt);
    }

    let total_requested: i64 = totals.iter().map(|t| t.requested).sum();
    let total_received: i64 = totals.iter().map(|t| t.received).sum::<i64>() + quantity;

    let new_request_status = if total_received >= total_requested {
        Some(RequestStatus::Closed)
    } else if request_status == RequestStatus::Approved {
        Some(RequestStatus::InProgress)
    } else {
        None
    };

    Ok(ReceptionPlan {
        item_state: ItemState {
            item_id,
            requested: item.requested,
            received: item.received + quantity,
            outstanding: item.requested - item.received - quantity,
        },
        new_request_status,
    })
}

#[derive(Clone)]
pub struct FulfillmentService {
    repo: RequestRepository,
}

impl FulfillmentService {
    pub fn new(repo: RequestRepository) -> Self {
        Self { repo }
    }

    /// Registra uma recepção em UMA transação: trava o item e a
    /// solicitação, planeja, insere o registro, preenche o preço do item
    /// na primeira recepção (se vier um preço positivo) e aplica a
    /// transição de status derivada.
    ///
    /// `enforce_owner`: quando presente, a solicitação precisa pertencer
    /// a esse usuário (solicitantes só recebem as próprias solicitações).
    pub async fn receive<'e, A>(
        &self,
        conn: A,
        user_id: Uuid,
        enforce_owner: Option<Uuid>,
        item_id: i64,
        input: &ReceiveInput,
    ) -> Result<ReceiveOutcome, AppError>
    where
        A: Acquire<'e, Database = Postgres>,
    {
        let mut tx = conn.begin().await?;

        let item = self
            .repo
            .get_item_for_update(&mut *tx, item_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Item".into()))?;

        let request = self
            .repo
            .get_request_for_update(&mut *tx, item.request_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Solicitação".into()))?;

        if let Some(owner) = enforce_owner {
            if request.requester_id != owner {
                return Err(AppError::Forbidden);
            }
        }

        let totals = self.repo.item_totals_for_request(&mut *tx, request.id).await?;
        let plan = plan_reception(request.status, &totals, item_id, i64::from(input.quantity))?;

        let reception = self
            .repo
            .insert_reception(
                &mut *tx,
                item_id,
                user_id,
                input.quantity,
                input.received_on,
                input.invoice_prefix.as_deref(),
                input.invoice_number.as_deref(),
                input.comment.as_deref(),
            )
            .await?;

        // Precificação na primeira recepção: só se o item ainda não tem
        // preço e veio um preço positivo.
        if item.unit_price.is_none() {
            if let Some(price) = input.unit_price {
                if price > Decimal::ZERO {
                    self.repo.backfill_item_price(&mut *tx, item_id, price).await?;
                    self.repo.recompute_total_value(&mut *tx, request.id).await?;
                }
            }
        }

        if let Some(new_status) = plan.new_request_status {
            self.repo
                .update_request_status(&mut *tx, request.id, new_status)
                .await?;
        }

        tx.commit().await?;

        Ok(ReceiveOutcome {
            reception,
            item_state: plan.item_state,
            request_code: request.code,
            request_status: plan.new_request_status.unwrap_or(request.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(t: &[(i64, i64, i64)]) -> Vec<ItemTotals> {
        t.iter()
            .map(|&(item_id, requested, received)| ItemTotals {
                item_id,
                requested,
                received,
            })
            .collect()
    }

    #[test]
    fn recusa_recepcao_fora_de_estado_aprovado() {
        let t = totals(&[(1, 10, 0)]);
        for status in [
            RequestStatus::Draft,
            RequestStatus::PendingApproval,
            RequestStatus::Rejected,
            RequestStatus::Closed,
        ] {
            let err = plan_reception(status, &t, 1, 5).unwrap_err();
            assert!(matches!(err, AppError::InvalidState));
        }
    }

    #[test]
    fn recusa_quantidade_nao_positiva() {
        let t = totals(&[(1, 10, 0)]);
        for qty in [0, -3] {
            let err = plan_reception(RequestStatus::Approved, &t, 1, qty).unwrap_err();
            assert!(matches!(err, AppError::InvalidPayload(_)));
        }
    }

    #[test]
    fn recusa_recebimento_acima_do_pendente() {
        // Solicitado 10, já recebido 8: receber 3 excede e não insere nada.
        let t = totals(&[(1, 10, 8)]);
        let err = plan_reception(RequestStatus::InProgress, &t, 1, 3).unwrap_err();
        assert!(matches!(err, AppError::OverReceipt));

        // Receber exatamente o que falta é permitido.
        let plan = plan_reception(RequestStatus::InProgress, &t, 1, 2).unwrap();
        assert_eq!(plan.item_state.outstanding, 0);
    }

    #[test]
    fn primeira_recepcao_move_para_in_progress() {
        let t = totals(&[(1, 10, 0), (2, 5, 0)]);
        let plan = plan_reception(RequestStatus::Approved, &t, 1, 4).unwrap();
        assert_eq!(plan.new_request_status, Some(RequestStatus::InProgress));
        assert_eq!(plan.item_state.received, 4);
        assert_eq!(plan.item_state.outstanding, 6);
    }

    #[test]
    fn fronteira_de_fechamento_exige_todos_os_itens_completos() {
        // Itens {A: 10, B: 5}: depois de A:10 e B:4 a solicitação segue
        // em andamento; B:1 a mais fecha.
        let t = totals(&[(1, 10, 10), (2, 5, 0)]);
        let plan = plan_reception(RequestStatus::InProgress, &t, 2, 4).unwrap();
        assert_eq!(plan.new_request_status, None);

        let t = totals(&[(1, 10, 10), (2, 5, 4)]);
        let plan = plan_reception(RequestStatus::InProgress, &t, 2, 1).unwrap();
        assert_eq!(plan.new_request_status, Some(RequestStatus::Closed));
    }

    #[test]
    fn item_unico_recebido_integral_fecha_direto_de_approved() {
        let t = totals(&[(1, 3, 0)]);
        let plan = plan_reception(RequestStatus::Approved, &t, 1, 3).unwrap();
        assert_eq!(plan.new_request_status, Some(RequestStatus::Closed));
    }

    #[test]
    fn plano_de_recepcao_e_comparavel_por_valor() {
        let t = totals(&[(1, 10, 2)]);
        let plan = plan_reception(RequestStatus::InProgress, &t, 1, 3).unwrap();
        assert_eq!(
            plan,
            ReceptionPlan {
                item_state: ItemState {
                    item_id: 1,
                    requested: 10,
                    received: 5,
                    outstanding: 5,
                },
                new_request_status: None,
            }
        );
    }

    #[test]
    fn item_inexistente_e_not_found() {
        let t = totals(&[(1, 10, 0)]);
        let err = plan_reception(RequestStatus::Approved, &t, 99, 1).unwrap_err();
        assert!(matches!(err, AppError::ResourceNotFound(_)));
    }
}
