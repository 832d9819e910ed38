//! Stack chain extraction
//!
//! Renders a suspended task's logical call stack by following the
//! "waiting on" links of its suspension chain. Extraction only reads the
//! chain: nothing is polled, resumed or modified.

use log::warn;
use scopewatch_common::FrameView;

use super::chain::{Suspended, SuspensionHandle};
use super::source_lines::SourceLines;
use crate::domain::{QueryError, TaskId};

/// Upper bound on frames rendered for one task
///
/// Chains are built from immutable `Arc`s and cannot loop, so this only
/// stops a scheduler publishing an absurdly deep chain.
pub const MAX_CHAIN_DEPTH: usize = 1024;

/// One rendered frame (derived, never stored)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub file: String,
    pub line_number: u32,
    pub source_line_text: Option<String>,
    pub function_name: String,
}

impl From<StackFrame> for FrameView {
    fn from(frame: StackFrame) -> Self {
        FrameView {
            lineno: frame.line_number,
            line: frame.source_line_text,
            filename: frame.file,
            name: frame.function_name,
        }
    }
}

/// Iterator over the nodes of a suspension chain, outermost first
pub struct ChainWalk<'a> {
    next: Option<&'a SuspensionHandle>,
}

impl<'a> Iterator for ChainWalk<'a> {
    type Item = &'a dyn Suspended;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.awaiting();
        Some(current.as_ref())
    }
}

/// Walk a chain starting at its head
#[must_use]
pub fn walk_chain(head: &SuspensionHandle) -> ChainWalk<'_> {
    ChainWalk { next: Some(head) }
}

/// Stack extractor - turns suspension chains into frames
///
/// Owns the source-line cache so repeated requests for the same task do
/// not re-read source files.
#[derive(Debug, Default)]
pub struct StackExtractor {
    sources: SourceLines,
}

impl StackExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the stack of `task` from its current suspension handle
    ///
    /// Frames run from the task's entry point (index 0) down to the
    /// innermost suspension point, one frame per chain node.
    ///
    /// # Errors
    /// Returns `NoStackAvailable` if the task holds no suspension handle
    /// (it is running, finished, or never suspended).
    pub fn extract(
        &self,
        task: TaskId,
        suspension: Option<&SuspensionHandle>,
    ) -> Result<Vec<StackFrame>, QueryError> {
        let head = suspension.ok_or(QueryError::NoStackAvailable(task))?;

        let mut frames = Vec::new();
        for node in walk_chain(head) {
            if frames.len() == MAX_CHAIN_DEPTH {
                warn!("{task}: suspension chain deeper than {MAX_CHAIN_DEPTH}, truncated");
                break;
            }
            frames.push(self.render(node));
        }

        Ok(frames)
    }

    fn render(&self, node: &dyn Suspended) -> StackFrame {
        let at = node.location();
        StackFrame {
            file: at.file.clone(),
            line_number: at.line,
            source_line_text: self.sources.line(&at.file, at.line),
            function_name: at.function.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::chain::{coroutine_chain, CodeLocation, CoroutineFrame, DelegatingFrame};

    fn names(frames: &[StackFrame]) -> Vec<&str> {
        frames.iter().map(|f| f.function_name.as_str()).collect()
    }

    #[test]
    fn test_no_suspension_is_no_stack() {
        let extractor = StackExtractor::new();
        let err = extractor.extract(TaskId(4), None).unwrap_err();
        assert_eq!(err, QueryError::NoStackAvailable(TaskId(4)));
    }

    #[test]
    fn test_frames_outermost_first() {
        let head = coroutine_chain(vec![
            CodeLocation::new("sleep_seconds", "demo.rs", 10),
            CodeLocation::new("level2", "demo.rs", 20),
            CodeLocation::new("level3", "demo.rs", 30),
            CodeLocation::new("wait_task_rescheduled", "demo.rs", 40),
        ]);

        let frames = StackExtractor::new().extract(TaskId(1), head.as_ref()).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(names(&frames), ["sleep_seconds", "level2", "level3", "wait_task_rescheduled"]);
        assert_eq!(frames[1].line_number, 20);
    }

    #[test]
    fn test_mixed_shapes_walk_uniformly() {
        let leaf = CoroutineFrame::parked("sleep_forever", None);
        let wrapped = DelegatingFrame::wrapping("timeout", Some(leaf));
        let head = CoroutineFrame::parked("worker", Some(wrapped));

        let frames = StackExtractor::new().extract(TaskId(2), Some(&head)).unwrap();
        assert_eq!(names(&frames), ["worker", "timeout", "sleep_forever"]);
    }

    #[test]
    fn test_source_text_is_attached() {
        let here = CodeLocation::caller("parked_here");
        // Caller paths are workspace-relative; tests run from the package dir
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(&here.file);
        let at = CodeLocation::new("parked_here", path.to_string_lossy(), here.line);
        let head: SuspensionHandle = std::sync::Arc::new(CoroutineFrame::new(at, None));

        let frames = StackExtractor::new().extract(TaskId(3), Some(&head)).unwrap();
        assert_eq!(
            frames[0].source_line_text.as_deref(),
            Some("let here = CodeLocation::caller(\"parked_here\");")
        );
    }

    #[test]
    fn test_extraction_leaves_chain_intact() {
        let head = coroutine_chain(vec![
            CodeLocation::new("a", "x.rs", 1),
            CodeLocation::new("b", "x.rs", 2),
        ])
        .unwrap();

        let extractor = StackExtractor::new();
        let first = extractor.extract(TaskId(1), Some(&head)).unwrap();
        let second = extractor.extract(TaskId(1), Some(&head)).unwrap();
        assert_eq!(first, second);
        assert_eq!(std::sync::Arc::strong_count(&head), 1);
    }

    #[test]
    fn test_deep_chain_is_truncated() {
        let locations: Vec<_> = (0..MAX_CHAIN_DEPTH + 10)
            .map(|i| CodeLocation::new(format!("f{i}"), "deep.rs", 1))
            .collect();
        let head = coroutine_chain(locations);

        let frames = StackExtractor::new().extract(TaskId(1), head.as_ref()).unwrap();
        assert_eq!(frames.len(), MAX_CHAIN_DEPTH);
        assert_eq!(frames[0].function_name, "f0");
    }

    #[test]
    fn test_frame_view_conversion() {
        let frame = StackFrame {
            file: "src/main.rs".to_string(),
            line_number: 7,
            source_line_text: Some("x.await".to_string()),
            function_name: "main".to_string(),
        };
        let view = FrameView::from(frame);
        assert_eq!(view.lineno, 7);
        assert_eq!(view.filename, "src/main.rs");
        assert_eq!(view.line.as_deref(), Some("x.await"));
    }
}
