//! Heap arena for arrays, structs, and strings.
//!
//! An index-addressed arena returning small `Copy` handles ([`HeapId`])
//! rather than Rust references, so aliasing and per-instance field
//! ownership fall out of plain `Vec` indexing instead of reference-counted
//! smart pointers.
//!
//! A reactive cell can capture a struct or array by way of a thunk's scope
//! long after the statement that created it returns, and two thunks may
//! disagree about whether an object is still reachable until they're
//! actually read. Getting that precise would need a real tracing collector,
//! so the heap simply never reclaims a slot during a run. Fern programs are
//! one-shot scripts with no long-running process and no concurrency, so
//! unbounded growth within a single run trades a bookkeeping cost for zero
//! externally observable benefit.

use indexmap::IndexMap;

use crate::{intern::StringId, location::Location, value::Value};

/// Handle into the heap arena. Cheap to copy and compare; aliasing two
/// `Value`s that carry the same `HeapId` means they observe the same
/// underlying object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(u32);

impl HeapId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A fixed-size array: a length plus a cell per index. Cells are
/// `Location`s, not bare `Value`s, so an array cell can hold either a
/// concrete value or a reactive cell, exactly like a global or a struct
/// field.
#[derive(Debug)]
pub struct ArrayObject {
    pub cells: Vec<Location>,
}

impl ArrayObject {
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| Location::zero()).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> i32 {
        i32::try_from(self.cells.len()).unwrap_or(i32::MAX)
    }
}

/// A string is an array of `Char`, specialized only for print, so it
/// shares `ArrayObject`'s cell shape rather than being a bare `String`.
/// This is what lets `text[i] + 1` fall through the same index-get/put
/// path as arrays.
#[derive(Debug)]
pub struct StrObject {
    pub cells: Vec<Location>,
}

impl StrObject {
    #[must_use]
    pub fn from_chars(chars: impl Iterator<Item = char>) -> Self {
        Self {
            cells: chars.map(|c| Location::concrete(Value::Char(c as i32))).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> i32 {
        i32::try_from(self.cells.len()).unwrap_or(i32::MAX)
    }

    /// Renders the character cells as text for `print`/`println`.
    /// A cell holding a reactive thunk is read with no cycle tracking here;
    /// callers needing correctness under cycles should read through
    /// [`crate::vm::Vm::read_cell`] first. In practice string cells are
    /// populated from literals and are always concrete.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.cells
            .iter()
            .map(|loc| match loc {
                Location::Concrete(Value::Char(c) | Value::Int(c)) => char::from_u32(*c as u32).unwrap_or('\u{fffd}'),
                _ => '\u{fffd}',
            })
            .collect()
    }
}

/// An ordered mapping from field name to `Location`. Open: new names may
/// be inserted after instantiation, and a missing read yields `Int(0)`.
#[derive(Debug)]
pub struct StructObject {
    pub fields: IndexMap<StringId, Location>,
}

impl StructObject {
    #[must_use]
    pub fn new() -> Self {
        Self { fields: IndexMap::new() }
    }
}

impl Default for StructObject {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum HeapData {
    Array(ArrayObject),
    Str(StrObject),
    Struct(StructObject),
}

/// The shared heap arena. Indices are stable for the lifetime of a run.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapData>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.objects.len()).expect("heap arena overflow"));
        self.objects.push(data);
        id
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.objects[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.objects[id.index()]
    }

    #[must_use]
    pub fn array(&self, id: HeapId) -> Option<&ArrayObject> {
        match self.get(id) {
            HeapData::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn str_obj(&self, id: HeapId) -> Option<&StrObject> {
        match self.get(id) {
            HeapData::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn struct_obj(&self, id: HeapId) -> Option<&StructObject> {
        match self.get(id) {
            HeapData::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn struct_obj_mut(&mut self, id: HeapId) -> Option<&mut StructObject> {
        match self.get_mut(id) {
            HeapData::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows the cell vector of an array or string uniformly, since
    /// index-get/put applies to both.
    #[must_use]
    pub fn cells(&self, id: HeapId) -> Option<&[Location]> {
        match self.get(id) {
            HeapData::Array(a) => Some(&a.cells),
            HeapData::Str(s) => Some(&s.cells),
            HeapData::Struct(_) => None,
        }
    }

    pub fn cells_mut(&mut self, id: HeapId) -> Option<&mut Vec<Location>> {
        match self.get_mut(id) {
            HeapData::Array(a) => Some(&mut a.cells),
            HeapData::Str(s) => Some(&mut s.cells),
            HeapData::Struct(_) => None,
        }
    }

    /// Integer-context coercion for a heap handle: arrays/strings coerce
    /// to their length. Structs have no defined coercion; `0` is an
    /// arbitrary but harmless default since callers only reach this arm via
    /// `Value::as_int_with`, which never calls it for `Value::Struct`.
    #[must_use]
    pub fn length_of(&self, id: HeapId) -> i32 {
        match self.get(id) {
            HeapData::Array(a) => a.len(),
            HeapData::Str(s) => s.len(),
            HeapData::Struct(_) => 0,
        }
    }
}
