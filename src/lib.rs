//! # Quilt Aggregation Server for Federated Learning
//!
//! Quilt coordinates federated learning with pairwise-masked secure
//! aggregation. Every participant trains a logistic regression model on
//! private local data and submits a masked weight delta; the server collects
//! one delta per configured participant and averages them. The pairwise
//! masks cancel in the sum, so the average equals the average of the
//! unmasked deltas while no single update is ever visible in the clear.
//!
//! The crate ships three binaries built on this library: the aggregation
//! server (`quilt-server`), a training participant (`quilt-client`) and the
//! round coordinator (`quilt-coordinator`).
pub mod coordinator;
pub mod core;
pub mod engine;
pub mod mask;
pub mod participant;
pub mod rest;
pub mod service;
pub mod settings;
