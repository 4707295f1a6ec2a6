use crate::domain::order::{Order, OrderStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    id: u64,
    purchaser: u64,
    product: u64,
    variation: Option<u64>,
    amount: Decimal,
    status: OrderStatus,
    txid: &'a str,
    delivered: bool,
}

impl<'a> From<&'a Order> for OrderRow<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            id: order.id.0,
            purchaser: order.purchaser.0,
            product: order.product.0,
            variation: order.variation.map(|v| v.0),
            amount: order.amount.value(),
            status: order.status,
            txid: &order.txid,
            delivered: order.entitlement_delivered,
        }
    }
}

/// Writes the order table as CSV, one row per order, header first.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> Result<()> {
        for order in orders {
            self.writer.serialize(OrderRow::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
