use bumpalo::collections::Vec as BumpVec;
use smallvec::SmallVec;

use super::Stack;
use crate::{Vec, compiler::CompiledFunction, values::Value};

/// Activation record of one compiled body.
#[derive(Clone, Copy)]
pub(crate) struct Frame<'p> {
    pub function: &'p CompiledFunction,
    /// Stack index of the frame's first slot.
    pub base: usize,
    /// Next instruction to execute.
    pub ip: usize,
}

/// An array literal between `ARRAY` and its closing `APPEND`.
///
/// The stack keeps an empty placeholder at `slot`; the elements collect here,
/// in the VM arena, and become the array value when the literal closes.
pub(crate) struct ArrayBuilder<'a> {
    pub slot: usize,
    pub elements: BumpVec<'a, Value<'a>>,
}

/// Per-call-chain state: shared value stack, suspended callers, open array
/// literals and the multi-switch match buffer. The executing frame itself
/// lives in the interpreter loop.
pub(crate) struct ExecutionContext<'p, 'a> {
    pub stack: Stack<Value<'a>>,
    pub frames: Vec<Frame<'p>>,
    pub arrays: Vec<ArrayBuilder<'a>>,
    pub matcher: SmallVec<[Option<u8>; 8]>,
}

impl<'p, 'a> ExecutionContext<'p, 'a> {
    fn new(initial_stack: usize) -> Self {
        Self {
            stack: Stack::with_capacity(initial_stack),
            frames: Vec::new(),
            arrays: Vec::new(),
            matcher: SmallVec::new(),
        }
    }

    fn clear(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.arrays.clear();
        self.matcher.clear();
    }
}

/// Free list of execution contexts.
///
/// Every top-level call takes one and hands it back, cleared, whether it
/// returned or failed. Nested calls made by natives take their own.
pub(crate) struct ContextPool<'p, 'a> {
    free: Vec<ExecutionContext<'p, 'a>>,
    retain: usize,
    initial_stack: usize,
}

impl<'p, 'a> ContextPool<'p, 'a> {
    pub fn new(retain: usize, initial_stack: usize) -> Self {
        let free = (0..retain)
            .map(|_| ExecutionContext::new(initial_stack))
            .collect();
        Self {
            free,
            retain,
            initial_stack,
        }
    }

    pub fn acquire(&mut self) -> ExecutionContext<'p, 'a> {
        self.free
            .pop()
            .unwrap_or_else(|| ExecutionContext::new(self.initial_stack))
    }

    pub fn release(&mut self, mut context: ExecutionContext<'p, 'a>) {
        context.clear();
        if self.free.len() < self.retain {
            self.free.push(context);
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<'a> ExecutionContext<'_, 'a> {
    /// Starts a literal whose placeholder goes at `slot`, the current top.
    pub fn open_array(&mut self, slot: usize, capacity: usize, arena: &'a bumpalo::Bump) {
        self.drop_arrays_from(slot);
        self.arrays.push(ArrayBuilder {
            slot,
            elements: BumpVec::with_capacity_in(capacity, arena),
        });
    }

    /// The literal whose placeholder sits at `slot`, if one is open.
    ///
    /// Builders above `slot` belong to placeholders already consumed (an
    /// empty literal has no closing `APPEND`) and are dropped.
    pub fn array_at(&mut self, slot: usize) -> Option<&mut ArrayBuilder<'a>> {
        self.drop_arrays_from(slot + 1);
        self.arrays.last_mut().filter(|builder| builder.slot == slot)
    }

    fn drop_arrays_from(&mut self, slot: usize) {
        while self.arrays.last().is_some_and(|builder| builder.slot >= slot) {
            self.arrays.pop();
        }
    }
}
