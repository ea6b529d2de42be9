//! Local-slot bookkeeping for one compiled body.
//!
//! A [`Scope`] is a list of bindings whose positions are their slot offsets.
//! Shadowing appends a new binding, so an older binding of the same name
//! keeps its slot. Leaving a block truncates the list, letting later
//! bindings reuse those slots; the highest length ever reached is the
//! number of slots the frame needs.
//!
//! Two kinds of child scopes exist:
//! - **Branch scopes** (one per match arm) copy the binding list but share
//!   the parent's [`SlotCounter`], so sibling arms cannot see each other's
//!   names while all of them contribute to one slot maximum.
//! - **Closure scopes** copy the binding list with usage cleared and get a
//!   fresh counter. Whatever the lambda body marks used in its copy is
//!   exactly what it must capture.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::cell::Cell;

use crate::{
    Vec,
    ast::{IGNORE, Span},
    vm::{Limit, LimitExceeded},
};

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    next_id: usize,
    high_water: usize,
    clock: u64,
}

/// Slot accounting shared between a scope and its branch scopes.
#[derive(Debug, Clone, Default)]
pub struct SlotCounter(Rc<Cell<Counts>>);

impl SlotCounter {
    /// A fresh counter for a nested body. Ids continue from this one so
    /// inherited bindings never collide with the body's own.
    fn nested(&self, high_water: usize) -> Self {
        Self(Rc::new(Cell::new(Counts {
            next_id: self.0.get().next_id,
            high_water,
            clock: 0,
        })))
    }

    fn update<T>(&self, f: impl FnOnce(&mut Counts) -> T) -> T {
        let mut counts = self.0.get();
        let result = f(&mut counts);
        self.0.set(counts);
        result
    }

    fn next_id(&self) -> usize {
        self.update(|counts| {
            counts.next_id += 1;
            counts.next_id - 1
        })
    }

    fn tick(&self) -> u64 {
        self.update(|counts| {
            counts.clock += 1;
            counts.clock
        })
    }

    fn raise(&self, len: usize) {
        self.update(|counts| counts.high_water = counts.high_water.max(len));
    }

    /// Most slots any scope sharing this counter has needed at once.
    pub fn high_water(&self) -> usize {
        self.0.get().high_water
    }
}

#[derive(Debug, Clone)]
pub struct Binding<'a> {
    pub name: &'a str,
    pub span: Span,
    /// Stable identity across branch copies.
    pub id: usize,
    pub used: bool,
    /// Copied into a closure scope from the enclosing body.
    pub inherited: bool,
    /// Clock value of the first use, for capture ordering.
    first_use: Option<u64>,
}

impl Binding<'_> {
    fn mark_used(&mut self, counter: &SlotCounter) {
        self.used = true;
        if self.first_use.is_none() {
            self.first_use = Some(counter.tick());
        }
    }

    fn merge(&mut self, other: &Binding<'_>) {
        self.used |= other.used;
        self.first_use = match (self.first_use, other.first_use) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

#[derive(Debug)]
pub struct Scope<'a> {
    bindings: Vec<Binding<'a>>,
    /// Bindings of blocks that already ended.
    retired: Vec<Binding<'a>>,
    /// Adopted match-arm scopes.
    branches: Vec<Scope<'a>>,
    counter: SlotCounter,
    /// Number of bindings copied from an enclosing body.
    seeded: usize,
}

impl Default for Scope<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            retired: Vec::new(),
            branches: Vec::new(),
            counter: SlotCounter::default(),
            seeded: 0,
        }
    }

    pub fn seeded(&self) -> usize {
        self.seeded
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn high_water(&self) -> usize {
        self.counter.high_water()
    }

    pub fn binding(&self, offset: usize) -> Option<&Binding<'a>> {
        self.bindings.get(offset)
    }

    /// Declares `name` and returns its slot offset.
    pub fn add_binding(&mut self, name: &'a str, span: &Span) -> Result<usize, LimitExceeded> {
        let offset = Limit::Locals.check(self.bindings.len())? as usize;
        self.bindings.push(Binding {
            name,
            span: span.clone(),
            id: self.counter.next_id(),
            used: false,
            inherited: false,
            first_use: None,
        });
        self.counter.raise(self.bindings.len());
        Ok(offset)
    }

    /// Resolves `name` to the innermost binding's offset and marks it used.
    pub fn lookup(&mut self, name: &str) -> Option<usize> {
        let offset = self.bindings.iter().rposition(|b| b.name == name)?;
        self.bindings[offset].mark_used(&self.counter);
        Some(offset)
    }

    /// Marks the binding at `offset` used without a name lookup.
    pub fn touch(&mut self, offset: usize) {
        if let Some(binding) = self.bindings.get_mut(offset) {
            binding.mark_used(&self.counter);
        }
    }

    /// Scope for a lambda body nested in this one.
    pub fn closure(&self) -> Scope<'a> {
        let bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|b| Binding {
                used: false,
                inherited: true,
                first_use: None,
                ..b.clone()
            })
            .collect();
        let seeded = bindings.len();
        Scope {
            bindings,
            retired: Vec::new(),
            branches: Vec::new(),
            counter: self.counter.nested(seeded),
            seeded,
        }
    }

    /// Scope for one match arm. Hand it back with [`adopt`](Self::adopt).
    pub fn branch(&self) -> Scope<'a> {
        Scope {
            bindings: self.bindings.clone(),
            retired: Vec::new(),
            branches: Vec::new(),
            counter: self.counter.clone(),
            seeded: self.seeded,
        }
    }

    /// Folds an arm's usage back into the bindings both scopes share and
    /// keeps the arm for unused-binding reporting.
    pub fn adopt(&mut self, branch: Scope<'a>) {
        for (mine, theirs) in self.bindings.iter_mut().zip(&branch.bindings) {
            if mine.id == theirs.id {
                mine.merge(theirs);
            }
        }
        self.branches.push(branch);
    }

    pub fn mark(&self) -> usize {
        self.bindings.len()
    }

    /// Ends a block: bindings declared since `mark` go out of scope.
    pub fn release(&mut self, mark: usize) {
        if mark < self.bindings.len() {
            let ended = self.bindings.split_off(mark);
            self.retired.extend(ended);
        }
    }

    /// Offsets of used seeded bindings in first-use order, and whether the
    /// binding at `self_offset` (a `let rec` being defined) was used.
    pub fn captures(&self, self_offset: Option<usize>) -> (Vec<usize>, bool) {
        let seeded = &self.bindings[..self.seeded.min(self.bindings.len())];
        let mut captured: Vec<(u64, usize)> = seeded
            .iter()
            .enumerate()
            .filter(|&(offset, b)| b.used && Some(offset) != self_offset)
            .map(|(offset, b)| (b.first_use.unwrap_or(u64::MAX), offset))
            .collect();
        captured.sort_unstable();
        let recursive = self_offset
            .and_then(|offset| seeded.get(offset))
            .is_some_and(|b| b.used);
        (
            captured.into_iter().map(|(_, offset)| offset).collect(),
            recursive,
        )
    }

    fn collect_into(&self, all: &mut BTreeMap<usize, Binding<'a>>) {
        let own = self.bindings.iter().chain(&self.retired);
        for binding in own {
            all.entry(binding.id)
                .and_modify(|seen| seen.merge(binding))
                .or_insert_with(|| binding.clone());
        }
        for branch in &self.branches {
            branch.collect_into(all);
        }
    }

    /// Bindings declared in this body that nothing ever read, in
    /// declaration order. A binding used in any arm counts as used.
    pub fn collect_unused(&self) -> Vec<Binding<'a>> {
        let mut all = BTreeMap::new();
        self.collect_into(&mut all);
        all.into_values()
            .filter(|b| !b.used && !b.inherited && b.name != IGNORE)
            .collect()
    }
}
