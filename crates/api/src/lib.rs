//! HTTP API: router, handlers and request/response mapping over
//! [`tilestock_infra::InventoryService`].

pub mod app;
