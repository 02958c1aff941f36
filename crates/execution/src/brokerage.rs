//! Live execution through a brokerage gateway.
//!
//! The gateway (authentication, transport, venue symbology) lives outside
//! this crate. [`BrokerageExecutor`] drives the order flow on top of it:
//! place, poll until terminal or out of budget, cancel the remainder, and
//! report whatever filled. Every gateway call is time-boxed so `submit`
//! returns within [`BrokerageConfig::budget`].

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use delta_neutral_core::{Fill, OrderExecutor, OrderIntent, SessionConfig, TradingError};

use crate::types::{BrokerOrder, OrderState, OrderStatus};

/// Transport to a real broker.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Places an order and returns the broker's order id.
    async fn place_order(&self, order: &BrokerOrder) -> Result<String, TradingError>;

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, TradingError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError>;
}

/// Time budget for live orders.
#[derive(Debug, Clone)]
pub struct BrokerageConfig {
    pub poll_interval: Duration,
    /// How long an order may stay working, placement included.
    pub working_budget: Duration,
    /// Bound on each of the cancel and post-cancel status calls.
    pub settle_timeout: Duration,
}

impl Default for BrokerageConfig {
    fn default() -> Self {
        Self::for_session(&SessionConfig::default())
    }
}

impl BrokerageConfig {
    /// Splits the session's adapter timeout: three fifths working, one
    /// tenth for each settle call. `submit` then always returns before the
    /// session gives up on it.
    #[must_use]
    pub fn for_session(session: &SessionConfig) -> Self {
        let total = Duration::from_millis(session.adapter_timeout_ms);
        let working_budget = total * 3 / 5;
        let poll_interval = (working_budget / 4)
            .min(Duration::from_millis(250))
            .max(Duration::from_millis(1));
        Self {
            poll_interval,
            working_budget,
            settle_timeout: total / 10,
        }
    }

    /// Longest time `submit` can take.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.working_budget + self.settle_timeout * 2
    }
}

pub struct BrokerageExecutor<G: BrokerGateway> {
    gateway: G,
    config: BrokerageConfig,
}

impl<G: BrokerGateway> BrokerageExecutor<G> {
    pub fn new(gateway: G, config: BrokerageConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn to_fill(intent: &OrderIntent, status: &OrderStatus) -> Fill {
        let lots = i64::try_from(status.filled_quantity).unwrap_or(i64::MAX);
        Fill {
            intent_id: intent.id,
            instrument: intent.instrument.clone(),
            quantity: lots.min(intent.quantity.abs()) * intent.quantity.signum(),
            price: status.avg_fill_price,
            commission: status.commission,
            filled_at: Utc::now(),
        }
    }

    /// Polls until the order is terminal or the working deadline passes.
    /// A failed or late status call ends polling with the last known status.
    async fn poll_until(&self, order_id: &str, deadline: Instant) -> OrderStatus {
        let mut status = OrderStatus::pending();
        loop {
            let next = Instant::now() + self.config.poll_interval;
            if next >= deadline {
                return status;
            }
            sleep_until(next).await;
            match timeout_at(deadline, self.gateway.order_status(order_id)).await {
                Ok(Ok(latest)) => status = latest,
                Ok(Err(e)) => {
                    warn!(order_id, error = %e, "Status poll failed");
                    return status;
                }
                Err(_) => return status,
            }
            debug!(order_id, state = ?status.state, filled = status.filled_quantity, "Order status");
            if status.state.is_terminal() {
                return status;
            }
        }
    }

    /// Cancels a working order and returns the broker's final view of it.
    async fn cancel_and_settle(&self, order_id: &str, last: OrderStatus) -> OrderStatus {
        if let Err(e) = self.settle(self.gateway.cancel_order(order_id)).await {
            warn!(order_id, error = %e, "Cancel failed; using last known status");
            return last;
        }
        match self.settle(self.gateway.order_status(order_id)).await {
            Ok(status) => status,
            Err(e) => {
                warn!(order_id, error = %e, "Status after cancel unavailable");
                last
            }
        }
    }

    async fn settle<T>(
        &self,
        call: impl Future<Output = Result<T, TradingError>>,
    ) -> Result<T, TradingError> {
        timeout(self.config.settle_timeout, call)
            .await
            .unwrap_or_else(|_| Err(TradingError::timeout("settle", self.config.settle_timeout)))
    }
}

#[async_trait]
impl<G: BrokerGateway> OrderExecutor for BrokerageExecutor<G> {
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, TradingError> {
        let deadline = Instant::now() + self.config.working_budget;
        let order = BrokerOrder {
            client_order_id: intent.id.to_string(),
            instrument: intent.instrument.clone(),
            side: intent.side(),
            quantity: intent.quantity.unsigned_abs(),
            order_type: intent.order_type.clone(),
        };

        info!(
            intent_id = %intent.id,
            instrument = %order.instrument,
            side = ?order.side,
            quantity = order.quantity,
            "Placing order"
        );
        let order_id = match timeout_at(deadline, self.gateway.place_order(&order)).await {
            Ok(placed) => placed?,
            Err(_) => {
                return Err(TradingError::timeout("place_order", self.config.working_budget))
            }
        };

        let mut status = self.poll_until(&order_id, deadline).await;
        if !status.state.is_terminal() {
            status = self.cancel_and_settle(&order_id, status).await;
        }

        if let OrderState::Rejected { reason } = &status.state {
            if status.filled_quantity == 0 {
                return Err(TradingError::Rejected(reason.clone()));
            }
        }

        if status.filled_quantity == 0 {
            return match status.state {
                OrderState::Cancelled => Err(TradingError::Rejected(format!(
                    "order {order_id} cancelled without fills"
                ))),
                _ => Err(TradingError::timeout("submit", self.config.budget())),
            };
        }

        let fill = Self::to_fill(intent, &status);
        if fill.quantity.abs() < intent.quantity.abs() {
            warn!(
                order_id,
                requested = intent.quantity,
                filled = fill.quantity,
                "Partial fill"
            );
        }
        if fill.price <= Decimal::ZERO {
            warn!(order_id, price = %fill.price, "Broker reported non-positive fill price");
        }
        Ok(fill)
    }

    fn name(&self) -> &str {
        "brokerage"
    }
}
