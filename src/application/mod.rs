//! Application layer containing the order lifecycle orchestration.
//!
//! `OrderService` is the state machine every transition goes through.
//! `ReviewSession` is the administrator's paginated view over pending orders,
//! and `SalesReport` summarizes paid orders.

pub mod orders;
pub mod report;
pub mod review;
