//! Session Module
//!
//! The composition root for one quiz session: a `SessionCoordinator` owns a
//! peer registry, a bus client, a role controller, and a failure detector,
//! all scoped to a single session id. Coordinators are fully independent;
//! no mutable state crosses session boundaries.

pub mod coordinator;

#[cfg(test)]
mod tests;
