//! Adapter contracts (C7): inbound queue, outbound queue, RPC sink. Each
//! trait is the boundary spec.md §4.C7 describes; concrete implementations
//! live in `bus.rs` (Kafka, via `rdkafka`) and `rpc.rs` (gRPC, via `tonic`).

pub mod bus;
pub mod rpc;
