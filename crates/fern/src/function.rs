//! Compiled function definitions.
//!
//! Functions are first-class `Value`s but, unlike arrays and structs, are
//! never allocated on the heap: a function's code is fixed at compile time,
//! so a plain index into the program's function table is enough to identify
//! it.

use crate::{bytecode::Chunk, intern::StringId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

impl FunctionId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("too many functions"))
    }
}

/// A function's parameter names, compiled body, and declaring module.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: StringId,
    pub params: Vec<StringId>,
    pub body: Chunk,
    pub source_module: String,
}
