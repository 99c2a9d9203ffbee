pub mod audit;
pub mod classify;
pub mod fingerprint;
pub mod ignore;
pub mod orchestrator;
pub mod paths;
pub mod reconcile;
pub mod retry;
pub mod scanner;
pub mod store;

#[cfg(test)]
pub(crate) mod memory_store;
