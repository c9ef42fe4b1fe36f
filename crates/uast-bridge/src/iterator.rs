//! Host-facing iterators over traversals and query results.

use std::fmt;
use std::iter::FusedIterator;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::vec;

use uast_engine::{EngineError, HandleNode, TreeIter};

use crate::context::ContextInner;
use crate::error::{Error, Result};
use crate::external::{ExternalInner, ExternalNode};
use crate::host::HostValue;
use crate::node::Node;
use crate::tracker::ScopeId;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// How an iterator holds the context it reads from.
pub(crate) enum Ownership<I> {
    /// Someone else owns the context; it may disappear first.
    Borrowed(Weak<I>),
    /// The iterator is the context's owner and destroys it when dropped.
    Owned(Rc<I>),
}

impl<I> Ownership<I> {
    fn get(&self) -> Option<Rc<I>> {
        match self {
            Ownership::Borrowed(weak) => weak.upgrade(),
            Ownership::Owned(rc) => Some(Rc::clone(rc)),
        }
    }

    fn is_owned(&self) -> bool {
        matches!(self, Ownership::Owned(_))
    }
}

/// Engine-side position of an iterator.
pub(crate) enum Cursor<N: uast_engine::Node> {
    Walk(TreeIter<N>),
    Matches(vec::IntoIter<N>),
}

impl<N: uast_engine::Node> Iterator for Cursor<N> {
    type Item = std::result::Result<N, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Cursor::Walk(nodes) => nodes.next(),
            Cursor::Matches(nodes) => nodes.next().map(Ok),
        }
    }
}

enum Source {
    Live { cursor: Cursor<Node>, ctx: Ownership<ContextInner> },
    External { cursor: Cursor<HandleNode>, ctx: Ownership<ExternalInner> },
    Empty,
}

/// Iterator handed to the host by `iterate`/`filter` calls.
///
/// Live iterators yield the visited host values themselves; external ones
/// yield [`ExternalNode`] capsules. The first error ends the sequence.
/// Transient references produced while stepping are held until the end of
/// the sequence or until the iterator is dropped.
pub struct NodeIterator {
    scope: ScopeId,
    source: Source,
    done: bool,
}

impl NodeIterator {
    fn with_source(source: Source) -> Self {
        let scope = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
        let iter = NodeIterator { scope, source, done: false };
        tracing::debug!(scope, owns_context = iter.owns_context(), "new iterator");
        iter
    }

    pub(crate) fn live(cursor: Cursor<Node>, ctx: Ownership<ContextInner>) -> Self {
        Self::with_source(Source::Live { cursor, ctx })
    }

    pub(crate) fn external(cursor: Cursor<HandleNode>, ctx: Ownership<ExternalInner>) -> Self {
        Self::with_source(Source::External { cursor, ctx })
    }

    pub(crate) fn empty() -> Self {
        NodeIterator { scope: 0, source: Source::Empty, done: true }
    }

    /// Whether dropping this iterator also destroys its context.
    pub fn owns_context(&self) -> bool {
        match &self.source {
            Source::Live { ctx, .. } => ctx.is_owned(),
            Source::External { ctx, .. } => ctx.is_owned(),
            Source::Empty => false,
        }
    }

    /// Id of the tracker scope this iterator fills.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    fn step(&mut self) -> Option<Result<HostValue>> {
        match &mut self.source {
            Source::Empty => None,
            Source::Live { cursor, ctx } => {
                let Some(inner) = ctx.get() else {
                    tracing::warn!(scope = self.scope, "context dropped under a live iterator");
                    return Some(Err(Error::context_gone()));
                };
                let previous = inner.iface.tracker_mut().set_current(Some(self.scope));
                let step = cursor.next();
                inner.iface.tracker_mut().set_current(previous);
                Some(step?.map(|node| node.value().clone()).map_err(Error::from))
            }
            Source::External { cursor, ctx } => {
                let Some(inner) = ctx.get() else {
                    tracing::warn!(scope = self.scope, "external context dropped under an iterator");
                    return Some(Err(Error::context_gone()));
                };
                let step = cursor.next()?;
                Some(
                    step.map(|node| HostValue::capsule(ExternalNode::new(Rc::downgrade(&inner), node.handle())))
                        .map_err(Error::from),
                )
            }
        }
    }

    /// Drops everything tracked for this iterator.
    fn release(&mut self) {
        if let Source::Live { ctx, .. } = &self.source {
            if let Some(inner) = ctx.get() {
                let released = inner.iface.tracker_mut().dispose(self.scope);
                tracing::debug!(scope = self.scope, released, "iterator scope closed");
            }
        }
    }
}

impl Iterator for NodeIterator {
    type Item = Result<HostValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
            self.release();
        }
        item
    }
}

impl FusedIterator for NodeIterator {}

impl Drop for NodeIterator {
    fn drop(&mut self) {
        if !self.done {
            self.release();
        }
        if self.owns_context() {
            tracing::debug!(scope = self.scope, "iterator releasing its context");
        }
    }
}

impl fmt::Debug for NodeIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Live { .. } => "live",
            Source::External { .. } => "external",
            Source::Empty => "empty",
        };
        f.debug_struct("NodeIterator")
            .field("scope", &self.scope)
            .field("source", &source)
            .field("owns_context", &self.owns_context())
            .field("done", &self.done)
            .finish()
    }
}
