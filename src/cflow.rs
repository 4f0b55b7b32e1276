//! Control-flow tracking for `cflow` and `cflowbelow`.
//!
//! A [`CflowStack`] is scoped to a class loader but its frames live in thread
//! local storage, so two threads sharing a stack never see each other's
//! frames. Frames are whole [`ExpressionContext`] values and are removed by
//! structural equality, most recent first.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::error::Result;
use crate::expression::{Expression, ExpressionContext, MatchEnv, PointcutType, ReflectInfo};

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static FRAMES: RefCell<HashMap<u64, Vec<Frame>>> = RefCell::new(HashMap::new());
}

/// Identity of one entry into a control flow region. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

type ExitHook = Box<dyn FnOnce()>;

struct Frame {
    id: FrameId,
    ctx: ExpressionContext,
    on_exit: Vec<(String, ExitHook)>,
}

impl Frame {
    fn close(self) {
        for (_, hook) in self.on_exit {
            hook();
        }
    }
}

/// Per-thread view of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CflowState {
    /// This thread never entered a flow on this stack.
    Untouched,
    /// Flows were entered and all of them exited.
    Empty,
    Active(usize),
}

pub struct CflowStack {
    id: u64,
    /// Threads that entered a flow at least once.
    touched: Mutex<HashSet<ThreadId>>,
}

impl Default for CflowStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CflowStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CflowStack").field("id", &self.id).field("threads", &self.touched.lock().len()).finish()
    }
}

impl CflowStack {
    pub fn new() -> Self {
        Self { id: NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed), touched: Mutex::new(HashSet::new()) }
    }

    pub fn entering_control_flow(
        &self,
        kind: PointcutType,
        reflect: ReflectInfo,
        within: Option<ReflectInfo>,
    ) -> Result<FrameId> {
        Ok(self.enter(ExpressionContext::new(kind, reflect, within)?))
    }

    /// Returns whether a matching frame was active.
    pub fn exiting_control_flow(
        &self,
        kind: PointcutType,
        reflect: ReflectInfo,
        within: Option<ReflectInfo>,
    ) -> Result<bool> {
        Ok(self.exit(&ExpressionContext::new(kind, reflect, within)?))
    }

    pub fn enter(&self, ctx: ExpressionContext) -> FrameId {
        let id = FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(stack = self.id, %id, join_point = %ctx, "entering control flow");
        let first = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            let stack = frames.entry(self.id).or_default();
            stack.push(Frame { id, ctx, on_exit: Vec::new() });
            stack.len() == 1
        });
        if first {
            self.touched.lock().insert(thread::current().id());
        }
        id
    }

    /// Exit the most recent frame equal to `ctx`.
    pub fn exit(&self, ctx: &ExpressionContext) -> bool {
        let removed = self.remove_where(|frame| frame.ctx == *ctx);
        if !removed {
            tracing::debug!(stack = self.id, join_point = %ctx, "exit without matching control flow entry");
        }
        removed
    }

    /// Exit the frame `id` opened, wherever it sits on this thread's stack.
    pub fn exit_frame(&self, id: FrameId) -> bool {
        let removed = self.remove_where(|frame| frame.id == id);
        if !removed {
            tracing::debug!(stack = self.id, %id, "exit of unknown control flow frame");
        }
        removed
    }

    fn remove_where(&self, is_frame: impl Fn(&Frame) -> bool) -> bool {
        let frame = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            let stack = frames.get_mut(&self.id)?;
            let index = stack.iter().rposition(&is_frame)?;
            let frame = stack.remove(index);
            if stack.is_empty() {
                frames.remove(&self.id);
            }
            Some(frame)
        });
        match frame {
            Some(frame) => {
                tracing::trace!(stack = self.id, id = %frame.id, join_point = %frame.ctx, "exiting control flow");
                // hooks run after the borrow ends; they may consult the stack
                frame.close();
                true
            }
            None => false,
        }
    }

    /// Enter now, exit when the guard drops.
    pub fn guard(&self, ctx: ExpressionContext) -> CflowGuard<'_> {
        let id = self.enter(ctx.clone());
        CflowGuard { stack: self, id, ctx: Some(ctx) }
    }

    /// Run `hook` when frame `id` exits on this thread. A second hook under
    /// the same `key` is ignored. Returns whether the hook was attached.
    pub fn on_exit(&self, id: FrameId, key: &str, hook: impl FnOnce() + 'static) -> bool {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            let Some(frame) = frames.get_mut(&self.id).and_then(|stack| stack.iter_mut().find(|f| f.id == id)) else {
                return false;
            };
            if frame.on_exit.iter().any(|(existing, _)| existing == key) {
                return false;
            }
            frame.on_exit.push((key.to_string(), Box::new(hook)));
            true
        })
    }

    /// Whether any active frame on this thread satisfies `expr`.
    pub fn is_in_control_flow_of(&self, expr: &Expression) -> Result<bool> {
        self.any_frame(None, |frame| expr.matches(frame, &MatchEnv::new(None, Some(self))))
    }

    /// Like [`is_in_control_flow_of`](Self::is_in_control_flow_of), ignoring the frame of `current`.
    pub fn is_in_control_flow_below(&self, expr: &Expression, current: &ExpressionContext) -> Result<bool> {
        self.any_frame(Some(current), |frame| expr.matches(frame, &MatchEnv::new(None, Some(self))))
    }

    /// Evaluates over a snapshot, so `predicate` may itself consult the stack.
    pub(crate) fn any_frame(
        &self,
        exclude: Option<&ExpressionContext>,
        mut predicate: impl FnMut(&ExpressionContext) -> Result<bool>,
    ) -> Result<bool> {
        let mut frames = self.frames();
        if let Some(current) = exclude {
            if let Some(index) = frames.iter().rposition(|frame| frame == current) {
                frames.remove(index);
            }
        }
        for frame in &frames {
            if predicate(frame)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Oldest active frame on this thread satisfying `predicate`.
    pub fn outermost_frame(
        &self,
        mut predicate: impl FnMut(&ExpressionContext) -> Result<bool>,
    ) -> Result<Option<FrameId>> {
        for (id, ctx) in self.entries() {
            if predicate(&ctx)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Most recent active frame on this thread.
    pub fn innermost_frame(&self) -> Option<FrameId> {
        FRAMES.with(|frames| frames.borrow().get(&self.id).and_then(|stack| stack.last()).map(|frame| frame.id))
    }

    fn entries(&self) -> Vec<(FrameId, ExpressionContext)> {
        FRAMES.with(|frames| {
            frames
                .borrow()
                .get(&self.id)
                .map(|stack| stack.iter().map(|frame| (frame.id, frame.ctx.clone())).collect())
                .unwrap_or_default()
        })
    }

    /// Snapshot of this thread's frames, oldest first.
    pub fn frames(&self) -> Vec<ExpressionContext> {
        self.entries().into_iter().map(|(_, ctx)| ctx).collect()
    }

    pub fn state(&self) -> CflowState {
        match self.depth() {
            0 if self.touched.lock().contains(&thread::current().id()) => CflowState::Empty,
            0 => CflowState::Untouched,
            depth => CflowState::Active(depth),
        }
    }

    /// Number of stacks holding frames on the calling thread.
    pub fn active_stacks() -> usize {
        FRAMES.with(|frames| frames.borrow().len())
    }

    pub fn depth(&self) -> usize {
        FRAMES.with(|frames| frames.borrow().get(&self.id).map_or(0, Vec::len))
    }
}

impl Drop for CflowStack {
    fn drop(&mut self) {
        // Other threads only keep entries for frames they never exited.
        let _ = FRAMES.try_with(|frames| frames.borrow_mut().remove(&self.id));
    }
}

/// Exits its frame on drop, including during unwinding.
pub struct CflowGuard<'a> {
    stack: &'a CflowStack,
    id: FrameId,
    ctx: Option<ExpressionContext>,
}

impl CflowGuard<'_> {
    pub fn context(&self) -> Option<&ExpressionContext> {
        self.ctx.as_ref()
    }

    pub fn frame(&self) -> FrameId {
        self.id
    }
}

impl Drop for CflowGuard<'_> {
    fn drop(&mut self) {
        if self.ctx.take().is_some() {
            self.stack.exit_frame(self.id);
        }
    }
}
