//! Suspended-computation chains
//!
//! A suspended task is described by a chain of computations, each paused
//! while waiting on the next one. Two shapes occur in practice:
//!
//! - [`CoroutineFrame`]: an async function body parked at one of its own
//!   await points.
//! - [`DelegatingFrame`]: an adapter (timeout, select arm, instrumentation
//!   wrapper) that does no waiting of its own and forwards to one inner
//!   computation.
//!
//! Both implement [`Suspended`], so walkers only ever ask "where are you"
//! and "what are you waiting on". Chain nodes are immutable and shared via
//! `Arc`; the scheduler publishes a fresh chain after every step instead of
//! editing an old one, which is what makes walking them side-effect free.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Shared handle to the head of a suspension chain
pub type SuspensionHandle = Arc<dyn Suspended>;

/// Source position of a suspension point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl CodeLocation {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line, function: function.into() }
    }

    /// Location of the code calling this constructor
    #[track_caller]
    pub fn caller(function: impl Into<String>) -> Self {
        let here = Location::caller();
        Self::new(function, here.file(), here.line())
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.function, self.file, self.line)
    }
}

/// One paused computation in a chain
pub trait Suspended: Send + Sync + fmt::Debug {
    /// Where this computation is currently paused
    fn location(&self) -> &CodeLocation;

    /// The computation this one is waiting on, if any
    fn awaiting(&self) -> Option<&SuspensionHandle>;
}

/// Async function body parked at an await point
#[derive(Debug)]
pub struct CoroutineFrame {
    at: CodeLocation,
    awaiting: Option<SuspensionHandle>,
}

impl CoroutineFrame {
    #[must_use]
    pub fn new(at: CodeLocation, awaiting: Option<SuspensionHandle>) -> Self {
        Self { at, awaiting }
    }

    /// Handle for `function` parked at the caller's line
    #[track_caller]
    pub fn parked(
        function: impl Into<String>,
        awaiting: Option<SuspensionHandle>,
    ) -> SuspensionHandle {
        Arc::new(Self::new(CodeLocation::caller(function), awaiting))
    }
}

impl Suspended for CoroutineFrame {
    fn location(&self) -> &CodeLocation {
        &self.at
    }

    fn awaiting(&self) -> Option<&SuspensionHandle> {
        self.awaiting.as_ref()
    }
}

/// Adapter forwarding to a single inner computation
///
/// The location is where the adapter was entered; `delegate` is the wrapped
/// computation. A delegate of `None` means the adapter itself is the leaf
/// (e.g. a raw wait primitive).
#[derive(Debug)]
pub struct DelegatingFrame {
    entered_at: CodeLocation,
    delegate: Option<SuspensionHandle>,
}

impl DelegatingFrame {
    #[must_use]
    pub fn new(entered_at: CodeLocation, delegate: Option<SuspensionHandle>) -> Self {
        Self { entered_at, delegate }
    }

    #[track_caller]
    pub fn wrapping(
        adapter: impl Into<String>,
        delegate: Option<SuspensionHandle>,
    ) -> SuspensionHandle {
        Arc::new(Self::new(CodeLocation::caller(adapter), delegate))
    }

    pub fn delegate(&self) -> Option<&SuspensionHandle> {
        self.delegate.as_ref()
    }
}

impl Suspended for DelegatingFrame {
    fn location(&self) -> &CodeLocation {
        &self.entered_at
    }

    fn awaiting(&self) -> Option<&SuspensionHandle> {
        self.delegate()
    }
}

/// Build a chain of coroutine frames from outermost to innermost location
///
/// Returns `None` for an empty list.
pub fn coroutine_chain<I>(outermost_first: I) -> Option<SuspensionHandle>
where
    I: IntoIterator<Item = CodeLocation>,
    I::IntoIter: DoubleEndedIterator,
{
    outermost_first.into_iter().rev().fold(None, |inner, at| {
        Some(Arc::new(CoroutineFrame::new(at, inner)) as SuspensionHandle)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_location_points_here() {
        let loc = CodeLocation::caller("here");
        assert!(loc.file.ends_with("chain.rs"));
        assert_eq!(loc.line, line!() - 2);
        assert_eq!(loc.function, "here");
    }

    #[test]
    fn test_coroutine_chain_order() {
        let head = coroutine_chain(vec![
            CodeLocation::new("outer", "a.rs", 1),
            CodeLocation::new("middle", "a.rs", 2),
            CodeLocation::new("inner", "a.rs", 3),
        ])
        .unwrap();

        assert_eq!(head.location().function, "outer");
        let middle = head.awaiting().unwrap();
        assert_eq!(middle.location().function, "middle");
        let inner = middle.awaiting().unwrap();
        assert_eq!(inner.location().function, "inner");
        assert!(inner.awaiting().is_none());
    }

    #[test]
    fn test_empty_chain() {
        assert!(coroutine_chain(Vec::new()).is_none());
    }

    #[test]
    fn test_delegating_frame_forwards() {
        let leaf = CoroutineFrame::parked("wait", None);
        let wrapper = DelegatingFrame::wrapping("timeout", Some(leaf));
        assert_eq!(wrapper.location().function, "timeout");
        assert_eq!(wrapper.awaiting().unwrap().location().function, "wait");
    }
}
