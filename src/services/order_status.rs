use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// The single authoritative transition table. Every writer of `Order.status`
/// (order mutations and webhook reconciliation alike) goes through here, so
/// the two paths cannot disagree about legality.
pub fn is_legal_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (PendingPayment, Paid)
            | (PendingPayment, Cancelled)
            | (PendingPayment, Failed)
            | (Paid, Accepted)
            | (Paid, Cancelled)
            | (Paid, Failed)
            | (Accepted, Shipped)
            | (Accepted, Cancelled)
            | (Accepted, Failed)
            // Once shipped, cancellation is no longer legal.
            | (Shipped, Completed)
            | (Shipped, Failed)
    )
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
    )
}

/// Validates a requested transition against the table. Same-state requests
/// are rejected like any other absent pair.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if is_terminal(from) {
        return Err(ServiceError::TerminalStatus(from));
    }
    if !is_legal_transition(from, to) {
        return Err(ServiceError::InvalidStatusTransition { from, to });
    }
    Ok(())
}

/// Applies validated status transitions with compare-and-swap semantics.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Transitions an order to `new_status`.
    ///
    /// The current status is re-read inside the transaction immediately
    /// before writing, and the write is conditional on it
    /// (`... WHERE id = ? AND status = ?`). Zero rows affected means a
    /// concurrent writer got there first and is a failure, never a silent
    /// success.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let current = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        let old_status = current.status;
        check_transition(old_status, new_status)?;

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(old_status))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::Conflict(format!(
                "order {order_id} status changed concurrently"
            )));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "order status transitioned");
        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    const ALL: [OrderStatus; 7] = [
        PendingPayment,
        Paid,
        Accepted,
        Shipped,
        Completed,
        Cancelled,
        Failed,
    ];

    #[test]
    fn legal_transitions_are_exactly_the_table() {
        let legal = [
            (PendingPayment, Paid),
            (PendingPayment, Cancelled),
            (PendingPayment, Failed),
            (Paid, Accepted),
            (Paid, Cancelled),
            (Paid, Failed),
            (Accepted, Shipped),
            (Accepted, Cancelled),
            (Accepted, Failed),
            (Shipped, Completed),
            (Shipped, Failed),
        ];
        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    is_legal_transition(from, to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_report_terminal_status() {
        for from in [Completed, Cancelled, Failed] {
            for to in ALL {
                match check_transition(from, to) {
                    Err(ServiceError::TerminalStatus(s)) => assert_eq!(s, from),
                    other => panic!("expected TerminalStatus for {from} -> {to}, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn same_state_requests_are_rejected() {
        for status in [PendingPayment, Paid, Accepted, Shipped] {
            assert!(matches!(
                check_transition(status, status),
                Err(ServiceError::InvalidStatusTransition { .. })
            ));
        }
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert!(matches!(
            check_transition(Paid, PendingPayment),
            Err(ServiceError::InvalidStatusTransition { .. })
        ));
        assert!(matches!(
            check_transition(Shipped, Accepted),
            Err(ServiceError::InvalidStatusTransition { .. })
        ));
    }

    #[test]
    fn cancellation_is_illegal_once_shipped() {
        assert!(matches!(
            check_transition(Shipped, Cancelled),
            Err(ServiceError::InvalidStatusTransition { .. })
        ));
    }

    #[test]
    fn payment_failure_cannot_regress_a_paid_order() {
        assert!(matches!(
            check_transition(Paid, Failed),
            Ok(())
        ));
        // Paid -> Failed is an operator decision; what must never happen is
        // Failed -> Paid or any move out of a terminal state.
        assert!(matches!(
            check_transition(Failed, Paid),
            Err(ServiceError::TerminalStatus(Failed))
        ));
    }
}
