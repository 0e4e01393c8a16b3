//! Immutable-binding frames and reactive thunks.
//!
//! A [`Frame`] is a single `:=` binding plus a link to its parent; the chain
//! as a whole is the stack of immutable `:=` frames. Frames are persistent
//! (never mutated after creation) rather than a growable `Vec` the VM
//! pushes/pops in place, because a reactive thunk captures *the chain as it
//! stood at assignment time* by cloning the `Rc` at its head; later `:=`
//! bindings in the same lexical position must not retroactively become
//! visible to an already-captured thunk — a `:=` introduces a new binding
//! whose scope begins at its own declaration. A single linked list gives
//! that for free — appending a binding produces a new head without
//! touching nodes any existing `Rc` still points at.
//!
//! Frames are freshly cleared per loop iteration and per function call:
//! the VM remembers the chain head from *before* the loop/call began and
//! resets to it at the start of each iteration, or roots the call's frame
//! at `None` rather than the caller's chain.

use std::rc::Rc;

use crate::{intern::StringId, value::Value};

#[derive(Debug)]
pub struct Frame {
    pub name: StringId,
    pub value: Value,
    pub parent: Scope,
}

/// A possibly-empty immutable-frame chain. `None` is the root scope (no
/// `:=` bindings visible), e.g. at module top level or inside a freshly
/// called function before any of its own `:=` statements run.
pub type Scope = Option<Rc<Frame>>;

impl Frame {
    /// Walks outward from `scope` looking for `name`.
    #[must_use]
    pub fn lookup(scope: &Scope, name: StringId) -> Option<Value> {
        let mut cur = scope;
        while let Some(frame) = cur {
            if frame.name == name {
                return Some(frame.value);
            }
            cur = &frame.parent;
        }
        None
    }

    /// Produces a new chain head binding `name` on top of `scope`, leaving
    /// any existing `Rc` clones of `scope` untouched.
    #[must_use]
    pub fn push(scope: Scope, name: StringId, value: Value) -> Scope {
        Some(Rc::new(Frame { name, value, parent: scope }))
    }
}

/// Identifies a precompiled reactive-expression chunk in the program's
/// thunk table. The bytecode for `E` in `L ::= E` is shared across every
/// read; only the captured [`Scope`] differs per assignment occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThunkTemplateId(u32);

impl ThunkTemplateId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("too many reactive expressions"))
    }
}

/// An unevaluated expression stored at a [`crate::location::Location`] by a
/// `::=` assignment. Evaluated fresh on every read; never cached.
#[derive(Debug, Clone)]
pub struct Thunk {
    pub template: ThunkTemplateId,
    pub scope: Scope,
}
