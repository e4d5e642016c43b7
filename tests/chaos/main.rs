//! Chaos tests: partitions, store latency and store outages.

mod flaky_store;
mod network_partition;
