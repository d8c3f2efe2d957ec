//! Storefront - order and payment reconciliation backend
//!
//! This library provides the core purchase pipeline for the storefront:
//! authoritative server-side pricing, ephemeral checkout sessions opened at
//! external payment providers, idempotent conversion of payment events into
//! durable orders, and cleanup of stale provider-side artifacts.

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod payments;
pub mod pricing;
pub mod reconcile;
