//! Core services: catalog resolution, order lifecycle, payment gateway,
//! ticket provisioning and delivery.

pub mod delivery;
pub mod orders;
pub mod payment_gateway;
pub mod provisioner;
pub mod variants;
