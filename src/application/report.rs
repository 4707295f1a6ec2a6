use super::orders::OrderService;
use crate::domain::order::{Order, OrderStatus};
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Paid-order totals for the administrator dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub paid_orders: usize,
    pub total_revenue: Decimal,
    /// Revenue from paid orders created on the report date (UTC).
    pub revenue_today: Decimal,
    /// Paid orders still waiting for their role.
    pub undelivered: usize,
}

impl SalesReport {
    pub fn compute(orders: &[Order], today: NaiveDate) -> Self {
        let paid = orders
            .iter()
            .filter(|order| order.status == OrderStatus::Paid);

        let mut report = Self {
            paid_orders: 0,
            total_revenue: Decimal::ZERO,
            revenue_today: Decimal::ZERO,
            undelivered: 0,
        };
        for order in paid {
            report.paid_orders += 1;
            report.total_revenue += order.amount.value();
            if order.created_at.date_naive() == today {
                report.revenue_today += order.amount.value();
            }
            if !order.entitlement_delivered {
                report.undelivered += 1;
            }
        }
        report
    }
}

impl OrderService {
    pub async fn sales_report(&self, today: NaiveDate) -> Result<SalesReport> {
        let orders = self.all_orders().await?;
        Ok(SalesReport::compute(&orders, today))
    }
}
