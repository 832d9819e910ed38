//! # scopewatch - Live Inspector for Structured-Concurrency Schedulers
//!
//! scopewatch mirrors a cooperative scheduler's task/scope hierarchy in
//! memory and answers three questions about it while it runs: what tasks
//! exist and how they nest, where each parked task is suspended, and how
//! busy the scheduler is.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Cooperative Scheduler                       │
//! │   spawn / step / exit / scope open+close / I/O wait callbacks   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ Instrument hooks (never block)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 scopewatch (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ HookAdapter  │──▶│  Inspector   │──▶│   TaskTree   │         │
//! │  │ (instrument) │   │ (channel +   │   │   (tree)     │         │
//! │  └──────────────┘   │  try_lock)   │   └──────┬───────┘         │
//! │                     └──────────────┘          │ snapshot        │
//! │                                               ▼                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Statistics  │──▶│ QueryService │◀──│    Stack     │         │
//! │  │   (stats)    │   │   (query)    │   │  Extractor   │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │                                    │
//! │                            ▼                                    │
//! │                     ┌──────────────┐                            │
//! │                     │ HTTP (axum)  │                            │
//! │                     │  (server)    │                            │
//! │                     └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`instrument`]: the scheduler callback contract and the adapter that
//!   turns callbacks into tree events
//! - [`inspector`]: owner of the live tree; hand-off between the hook thread
//!   and readers
//! - [`tree`]: task/scope model, root-first lookups, and immutable snapshots
//! - [`stack`]: suspension chains and the stack extractor
//! - [`stats`]: scheduler counters and their reporting projection
//! - [`query`]: the read operations, independent of any transport
//! - [`server`]: axum routes for the query surface
//! - [`sim`]: virtual-clock scheduler and demo workload
//! - [`cli`]: command-line arguments
//! - [`domain`]: ids and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Run the demo workload and serve the query surface
//! RUST_LOG=scopewatch=debug ./scopewatch --port 5000
//!
//! # Inspect it
//! curl http://127.0.0.1:5000/tasks.json
//! curl http://127.0.0.1:5000/task/3/stacktrace.json
//! curl http://127.0.0.1:5000/stats.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Task**: a schedulable unit of work; every task but the root was
//!   spawned into exactly one scope
//! - **Scope** (nursery): a group that owns child tasks and waits for all of
//!   them before its owning task can continue
//! - **Suspension chain**: what a parked task is waiting on, and what that is
//!   waiting on, down to the primitive the scheduler parked it in

pub mod cli;
pub mod domain;
pub mod inspector;
pub mod instrument;
pub mod query;
pub mod server;
pub mod sim;
pub mod stack;
pub mod stats;
pub mod tree;
