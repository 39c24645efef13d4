//! Partner sharing engine
//!
//! Entity mutations schedule durable sync intents through
//! [`service::SharingService`]; the time-boxed
//! [`worker::SharingBackgroundService`] drains them under a cluster-wide
//! lock and dispatches to the partner clients.

pub mod alignment;
pub mod partners;
pub mod ports;
pub mod service;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
