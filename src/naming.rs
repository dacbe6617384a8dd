//! Metric naming
//!
//! Two helpers live here:
//!
//! - [`build_name`] substitutes ordered `{}` placeholders into a template.
//! - [`NameStack`] composes dotted names for nested operations. Each thread
//!   has its own stack behind [`enter`]; the returned [`NameScope`] restores
//!   the previous name when dropped and cannot leave its thread.
//! - [`NameContext`] is a shareable stack for tasks that do not own a thread,
//!   such as futures interleaved on one executor thread.
//!
//! ```rust
//! use metrics_crawler::naming;
//!
//! let outer = naming::enter("request");
//! {
//!     let inner = naming::enter("db");
//!     assert_eq!(inner.name(), "request.db");
//! }
//! assert_eq!(naming::current().as_deref(), Some("request"));
//! drop(outer);
//! assert_eq!(naming::current(), None);
//! ```

use crate::error::{CrawlerError, Result};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt::{self, Write};
use std::marker::PhantomData;
use std::sync::Arc;

const PLACEHOLDER: &str = "{}";
const SEPARATOR: char = '.';

/// Replace each `{}` in `template` with the next placeholder
///
/// Extra placeholders are ignored and unmatched `{}` tokens are kept as-is.
pub fn build_name(template: &str, placeholders: &[&dyn fmt::Display]) -> Result<String> {
    if template.is_empty() {
        return Err(CrawlerError::InvalidName(
            "can not build a metric name from an empty template".to_string(),
        ));
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut values = placeholders.iter();
    while let Some(pos) = rest.find(PLACEHOLDER) {
        out.push_str(&rest[..pos]);
        match values.next() {
            Some(value) => {
                // writing to a String never fails
                let _ = write!(out, "{}", value);
            }
            None => out.push_str(PLACEHOLDER),
        }
        rest = &rest[pos + PLACEHOLDER.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Handle on one open frame of a [`NameStack`]
///
/// Frames carry a generation unique within their stack, so a handle whose
/// frame was already closed never matches a frame opened later at the same
/// depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId {
    depth: usize,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    name: String,
    generation: u64,
}

/// LIFO stack of effective dotted names for one execution context
///
/// A plain value: async tasks or schedulers without a thread of their own
/// can keep one in their task state, or share one through [`NameContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameStack {
    frames: Vec<Frame>,
    next_generation: u64,
}

impl NameStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name currently in effect, `None` when nothing is open
    pub fn current(&self) -> Option<&str> {
        self.frames
            .last()
            .map(|frame| frame.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Number of open segments
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Open `segment` under the current name and return the effective name
    pub fn enter(&mut self, segment: &str) -> String {
        self.open(segment).1
    }

    /// Open `segment` and return a handle to close it with [`close`](Self::close)
    pub fn open(&mut self, segment: &str) -> (FrameId, String) {
        let name = match self.current() {
            Some(parent) => {
                let mut name = String::with_capacity(parent.len() + 1 + segment.len());
                name.push_str(parent);
                name.push(SEPARATOR);
                name.push_str(segment);
                name
            }
            None => segment.to_string(),
        };
        let id = FrameId {
            depth: self.frames.len(),
            generation: self.next_generation,
        };
        self.next_generation = self.next_generation.wrapping_add(1);
        self.frames.push(Frame {
            name: name.clone(),
            generation: id.generation,
        });
        (id, name)
    }

    /// Close the most recent open segment, returning its effective name
    pub fn leave(&mut self) -> Option<String> {
        self.frames.pop().map(|frame| frame.name)
    }

    /// Close `frame` together with every segment opened after it
    ///
    /// Returns `false` and leaves the stack untouched when `frame` is no
    /// longer open.
    pub fn close(&mut self, frame: FrameId) -> bool {
        match self.frames.get(frame.depth) {
            Some(open) if open.generation == frame.generation => {
                self.frames.truncate(frame.depth);
                true
            }
            _ => false,
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<NameStack> = RefCell::new(NameStack::new());
}

/// Open segment of the current thread's name stack
///
/// Dropping the scope closes the segment together with any segment opened
/// after it that is still open. A scope whose segment was already closed
/// that way does nothing when dropped.
#[derive(Debug)]
#[must_use = "the segment is closed as soon as the scope is dropped"]
pub struct NameScope {
    name: String,
    frame: FrameId,
    _not_send: PhantomData<*const ()>,
}

impl NameScope {
    /// Effective dotted name of this segment
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameScope {
    fn drop(&mut self) {
        // the thread-local may already be gone during thread teardown
        let _ = CONTEXT.try_with(|context| context.borrow_mut().close(self.frame));
    }
}

/// Open `segment` on the current thread's name stack
pub fn enter(segment: &str) -> NameScope {
    CONTEXT.with(|context| {
        let (frame, name) = context.borrow_mut().open(segment);
        NameScope {
            name,
            frame,
            _not_send: PhantomData,
        }
    })
}

/// Name currently in effect on this thread
pub fn current() -> Option<String> {
    CONTEXT.with(|context| context.borrow().current().map(str::to_string))
}

/// Shared name stack owned by an execution context rather than a thread
///
/// Clones share the same stack. Give each task its own context to keep the
/// names of tasks interleaved on one thread apart.
#[derive(Debug, Clone, Default)]
pub struct NameContext {
    stack: Arc<Mutex<NameStack>>,
}

impl NameContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `segment` on this context
    pub fn enter(&self, segment: &str) -> ContextScope {
        let (frame, name) = self.stack.lock().open(segment);
        ContextScope {
            context: self.clone(),
            name,
            frame,
        }
    }

    /// Name currently in effect on this context
    pub fn current(&self) -> Option<String> {
        self.stack.lock().current().map(str::to_string)
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().depth()
    }
}

/// Open segment of a [`NameContext`], closed on drop
#[derive(Debug)]
#[must_use = "the segment is closed as soon as the scope is dropped"]
pub struct ContextScope {
    context: NameContext,
    name: String,
    frame: FrameId,
}

impl ContextScope {
    /// Effective dotted name of this segment
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.context.stack.lock().close(self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_build_name() {
        let name = build_name("db.{}.query.{}", &[&"users", &42]).unwrap();
        assert_eq!(name, "db.users.query.42");
    }

    #[test]
    fn test_build_name_without_placeholders() {
        assert_eq!(build_name("plain", &[]).unwrap(), "plain");
        assert_eq!(build_name("plain", &[&1]).unwrap(), "plain");
    }

    #[test]
    fn test_build_name_missing_placeholder() {
        assert_eq!(build_name("a.{}.{}", &[&"x"]).unwrap(), "a.x.{}");
    }

    #[test]
    fn test_build_name_empty_template() {
        assert!(matches!(
            build_name("", &[]),
            Err(CrawlerError::InvalidName(_))
        ));
    }

    #[test]
    fn test_stack_nested_sequence() {
        let mut stack = NameStack::new();
        assert_eq!(stack.enter("a"), "a");
        assert_eq!(stack.enter("b"), "a.b");
        assert_eq!(stack.leave().as_deref(), Some("a.b"));
        assert_eq!(stack.enter("c"), "a.c");
        assert_eq!(stack.leave().as_deref(), Some("a.c"));
        assert_eq!(stack.current(), Some("a"));
        assert_eq!(stack.leave().as_deref(), Some("a"));
        assert!(stack.is_empty());
        assert_eq!(stack.current(), None);
    }

    #[test]
    fn test_stack_empty_parent_is_ignored() {
        let mut stack = NameStack::new();
        stack.enter("");
        assert_eq!(stack.enter("child"), "child");
    }

    #[test]
    fn test_scope_nested_sequence() {
        let mut used = Vec::new();
        {
            let a = enter("a");
            used.push(a.name().to_string());
            {
                let b = enter("b");
                used.push(b.name().to_string());
            }
            {
                let c = enter("c");
                used.push(c.name().to_string());
            }
            assert_eq!(current().as_deref(), Some("a"));
        }
        assert_eq!(used, vec!["a", "a.b", "a.c"]);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_scope_out_of_order_drop_unwinds() {
        let outer = enter("outer");
        let inner = enter("inner");
        drop(outer);
        assert_eq!(current(), None);
        drop(inner);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_stack_close_stale_frame_is_ignored() {
        let mut stack = NameStack::new();
        let (a, _) = stack.open("a");
        let (b, _) = stack.open("b");
        assert!(stack.close(a));
        let (c, _) = stack.open("c");
        assert_eq!(c.depth, b.depth - 1);
        stack.open("d");
        assert!(!stack.close(b));
        assert_eq!(stack.current(), Some("c.d"));
    }

    #[test]
    fn test_scope_stale_drop_keeps_live_segments() {
        let a = enter("a");
        let b = enter("b");
        drop(a);
        let c = enter("c");
        let d = enter("d");
        assert_eq!(d.name(), "c.d");
        drop(b);
        assert_eq!(current().as_deref(), Some("c.d"));
        let e = enter("e");
        assert_eq!(e.name(), "c.d.e");
        drop(e);
        drop(d);
        drop(c);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_context_nested_sequence() {
        let context = NameContext::new();
        {
            let a = context.enter("a");
            assert_eq!(a.name(), "a");
            {
                let b = context.enter("b");
                assert_eq!(b.name(), "a.b");
            }
            let c = context.enter("c");
            assert_eq!(c.name(), "a.c");
            assert_eq!(context.depth(), 2);
        }
        assert_eq!(context.current(), None);
        // the thread stack is not involved
        assert_eq!(current(), None);
    }

    #[test]
    fn test_contexts_interleaved_on_one_thread() {
        let first = NameContext::new();
        let second = NameContext::new();
        let _a = first.enter("first");
        let _b = second.enter("second");
        let inner = first.enter("inner");
        assert_eq!(inner.name(), "first.inner");
        assert_eq!(second.current().as_deref(), Some("second"));
    }

    #[test]
    fn test_context_scope_moves_across_threads() {
        let context = NameContext::new();
        let scope = context.enter("job");
        let name = thread::spawn(move || {
            let name = scope.name().to_string();
            drop(scope);
            name
        })
        .join()
        .unwrap();
        assert_eq!(name, "job");
        assert_eq!(context.current(), None);
    }

    #[test]
    fn test_scope_isolated_per_thread() {
        let _main = enter("main");
        let other = thread::spawn(|| {
            assert_eq!(current(), None);
            let worker = enter("worker");
            worker.name().to_string()
        })
        .join()
        .unwrap();
        assert_eq!(other, "worker");
        assert_eq!(current().as_deref(), Some("main"));
    }
}
