//! Infrastructure layer: job queue, document store, object store, workers.
//!
//! Control flow across the storefront core: request-path components
//! ([`checkout`], [`admin`]) run document-store transactions and write
//! outbox records; the [`outbox`] dispatcher turns committed records into
//! queue jobs; [`workers`] drain the queues independently. Components only
//! communicate through the store and the queue — no direct calls between
//! workers.

pub mod admin;
pub mod checkout;
pub mod docstore;
pub mod jobs;
pub mod objstore;
pub mod outbox;
pub mod workers;

#[cfg(test)]
mod integration_tests;
