//! Integration tests: peers replicating one log over a shared store.

mod convergence;
mod integrity;
mod persistence;
