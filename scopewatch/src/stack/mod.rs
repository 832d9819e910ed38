//! Logical call stacks of suspended tasks
//!
//! - `chain`: the suspended-computation abstraction and its two shapes
//! - `extractor`: walks a chain into `StackFrame`s
//! - `source_lines`: cached source text for each frame

pub mod chain;
pub mod extractor;
pub mod source_lines;

pub use chain::{
    coroutine_chain, CodeLocation, CoroutineFrame, DelegatingFrame, Suspended, SuspensionHandle,
};
pub use extractor::{walk_chain, StackExtractor, StackFrame, MAX_CHAIN_DEPTH};
pub use source_lines::SourceLines;
