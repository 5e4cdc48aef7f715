//! Election Module
//!
//! The pure decision core of host selection. Given a snapshot of live peers
//! it returns a deterministic ranked winner; it never touches the registry,
//! timers, or the bus. The `RoleController` owns when elections run and what
//! their outcome does.

pub mod engine;
