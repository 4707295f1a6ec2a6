//! Entities and the contracts the core needs from the outside world.

pub mod catalog;
pub mod ids;
pub mod order;
pub mod ports;
