//! [`Location`]: the single storage abstraction shared by globals, struct
//! fields, and array cells.

use crate::{heap::HeapId, intern::StringId, reactive::Thunk, value::Value};

/// A storage slot that holds either a concrete value or an unevaluated
/// reactive expression.
///
/// Assigning `=` always produces [`Location::Concrete`]; assigning `::=`
/// always produces [`Location::Reactive`].
#[derive(Debug, Clone)]
pub enum Location {
    Concrete(Value),
    Reactive(Thunk),
}

impl Location {
    #[must_use]
    pub fn concrete(value: Value) -> Self {
        Self::Concrete(value)
    }

    #[must_use]
    pub fn zero() -> Self {
        Self::Concrete(Value::Int(0))
    }
}

/// Identifies a specific [`Location`] for reactive-cycle detection.
///
/// This is not a handle used for storage; it is only ever inserted into the
/// re-entry set during a reactive read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationRef {
    Global(StringId),
    Field(HeapId, StringId),
    Cell(HeapId, usize),
}
