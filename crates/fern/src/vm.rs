//! The bytecode interpreter.
//!
//! One interpreter loop (`exec`) runs a module's top level, a function body,
//! and a reactive thunk alike — they are all just a [`Chunk`] plus a
//! [`Scope`] to evaluate it against. Every recoverable fault (type mismatch,
//! out-of-bounds index, reactive cycle, division by zero) is reported
//! through [`DiagnosticSink`] and recovered with a sentinel value rather
//! than unwinding; only [`RunError::StackOverflow`] propagates out of `exec`
//! as an `Err`.

use std::collections::HashSet;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    bytecode::{Chunk, Instr, Program, TemplateInit},
    config::ModuleConfig,
    diagnostics::{Diagnostic, DiagnosticSink},
    error::{RunError, RunResult},
    function::FunctionId,
    heap::{ArrayObject, Heap, HeapData, HeapId, StrObject, StructObject},
    intern::{Interner, StringId},
    location::{Location, LocationRef},
    print::PrintSink,
    reactive::{Frame, Scope, Thunk},
    value::Value,
};

/// Executes one compiled [`Program`] against a heap, a global environment,
/// and a pair of ambient sinks for diagnostics and output.
pub struct Vm<'p, D, P> {
    program: &'p Program,
    interner: &'p Interner,
    heap: Heap,
    globals: AHashMap<StringId, Location>,
    diagnostics: D,
    print: P,
    config: &'p ModuleConfig,
    call_depth: usize,
    /// Locations currently mid-evaluation, for reactive-cycle detection.
    reading: HashSet<LocationRef>,
    /// Mirrors `RegisterTemplate` execution: a struct becomes instantiable
    /// only once its own definition statement has run.
    active_templates: Vec<bool>,
}

impl<'p, D: DiagnosticSink, P: PrintSink> Vm<'p, D, P> {
    #[must_use]
    pub fn new(program: &'p Program, interner: &'p Interner, config: &'p ModuleConfig, diagnostics: D, print: P) -> Self {
        Self {
            program,
            interner,
            heap: Heap::new(),
            globals: AHashMap::new(),
            diagnostics,
            print,
            config,
            call_depth: 0,
            reading: HashSet::new(),
            active_templates: vec![false; program.templates.len()],
        }
    }

    /// Runs the program's top level to completion.
    pub fn run(&mut self) -> RunResult<()> {
        let program = self.program;
        self.exec(&program.top_level, None, None)?;
        Ok(())
    }

    #[must_use]
    pub fn into_diagnostics(self) -> D {
        self.diagnostics
    }

    #[must_use]
    pub fn into_print(self) -> P {
        self.print
    }

    /// Runs one chunk: a module top level, a function body, or a reactive
    /// thunk. `field_scope` is `Some` only while evaluating a struct's own
    /// reactive field expression, enabling the sibling-field lookup rule.
    fn exec(&mut self, chunk: &'p Chunk, mut scope: Scope, field_scope: Option<HeapId>) -> RunResult<Value> {
        let mut stack: Vec<Value> = Vec::new();
        let mut loop_bases: Vec<Scope> = Vec::new();
        let mut pc = 0usize;

        while pc < chunk.code.len() {
            match &chunk.code[pc] {
                Instr::PushInt(n) => stack.push(Value::Int(*n)),
                Instr::PushChar(c) => stack.push(Value::Char(*c)),
                Instr::PushStr(sid) => {
                    let id = self.heap.alloc(HeapData::Str(StrObject::from_chars(self.interner.get(*sid).chars())));
                    stack.push(Value::Str(id));
                }
                Instr::PushFunction(fid) => stack.push(Value::Function(*fid)),

                Instr::LoadIdent(name) => {
                    let value = self.resolve_ident(*name, &scope, field_scope)?;
                    stack.push(value);
                }
                Instr::FieldGet(name) => {
                    let target = pop(&mut stack);
                    let value = match target {
                        Value::Struct(id) => self.read_field(id, *name)?,
                        other => {
                            self.type_mismatch(format!("cannot read a field of a {}", other.type_name()));
                            Value::Int(0)
                        }
                    };
                    stack.push(value);
                }
                Instr::IndexGet => {
                    let index = pop(&mut stack);
                    let target = pop(&mut stack);
                    let value = match target {
                        Value::Array(id) | Value::Str(id) => {
                            let idx = self.coerce_int(index);
                            self.read_cell(id, idx)?
                        }
                        other => {
                            self.type_mismatch(format!("cannot index a {}", other.type_name()));
                            Value::Int(0)
                        }
                    };
                    stack.push(value);
                }

                Instr::Neg => {
                    let v = pop(&mut stack);
                    let n = self.coerce_int(v);
                    stack.push(Value::Int(n.wrapping_neg()));
                }
                Instr::Add => self.binary_arith(&mut stack, i32::wrapping_add),
                Instr::Sub => self.binary_arith(&mut stack, i32::wrapping_sub),
                Instr::Mul => self.binary_arith(&mut stack, i32::wrapping_mul),
                Instr::Div => self.binary_div(&mut stack, false),
                Instr::Mod => self.binary_div(&mut stack, true),

                Instr::CmpEq => {
                    let rhs = pop(&mut stack);
                    let lhs = pop(&mut stack);
                    stack.push(Value::Int(i32::from(self.values_equal(lhs, rhs))));
                }
                Instr::CmpNe => {
                    let rhs = pop(&mut stack);
                    let lhs = pop(&mut stack);
                    stack.push(Value::Int(i32::from(!self.values_equal(lhs, rhs))));
                }
                Instr::CmpLt => self.compare(&mut stack, std::cmp::Ordering::is_lt),
                Instr::CmpLtEq => self.compare(&mut stack, std::cmp::Ordering::is_le),
                Instr::CmpGt => self.compare(&mut stack, std::cmp::Ordering::is_gt),
                Instr::CmpGtEq => self.compare(&mut stack, std::cmp::Ordering::is_ge),

                Instr::JumpIfFalse(target) => {
                    let v = pop(&mut stack);
                    if !self.truthy(v) {
                        pc = *target;
                        continue;
                    }
                }
                Instr::Jump(target) => {
                    pc = *target;
                    continue;
                }
                Instr::Pop => {
                    pop(&mut stack);
                }
                Instr::JumpIfFalseKeep(target) => {
                    let v = *stack.last().expect("compiler balances the stack");
                    if !self.truthy(v) {
                        pc = *target;
                        continue;
                    }
                    pop(&mut stack);
                }
                Instr::JumpIfTrueKeep(target) => {
                    let v = *stack.last().expect("compiler balances the stack");
                    if self.truthy(v) {
                        pc = *target;
                        continue;
                    }
                    pop(&mut stack);
                }

                Instr::EnterLoop => loop_bases.push(scope.clone()),
                Instr::IterStart => {
                    scope = loop_bases.last().cloned().expect("EnterLoop always precedes IterStart");
                }
                Instr::ExitLoop => {
                    scope = loop_bases.pop().expect("ExitLoop is paired with EnterLoop");
                }

                Instr::ArrayAlloc => {
                    let size = pop(&mut stack);
                    let n = self.coerce_int(size).max(0);
                    let id = self.heap.alloc(HeapData::Array(ArrayObject::zeroed(n as usize)));
                    stack.push(Value::Array(id));
                }
                Instr::StructAlloc(tid) => {
                    let value = if self.active_templates[tid.index()] {
                        self.instantiate_struct(*tid, &scope)?
                    } else {
                        Value::Int(0)
                    };
                    stack.push(value);
                }
                Instr::RegisterTemplate(tid) => {
                    self.active_templates[tid.index()] = true;
                }

                Instr::Call(argc) => {
                    let argc = usize::from(*argc);
                    // Most Fern calls pass a handful of arguments; `SmallVec`
                    // avoids a heap allocation for the common case.
                    let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(pop(&mut stack));
                    }
                    args.reverse();
                    let callee = pop(&mut stack);
                    let result = self.call(callee, args)?;
                    stack.push(result);
                }
                Instr::Return => return Ok(pop(&mut stack)),

                Instr::Print => {
                    let v = pop(&mut stack);
                    let text = self.render(v);
                    self.print.write(&text);
                }
                Instr::Println => {
                    let v = pop(&mut stack);
                    let text = self.render(v);
                    self.print.write_line(&text);
                }

                Instr::AssignGlobal(name) => {
                    let v = pop(&mut stack);
                    self.globals.insert(*name, Location::Concrete(v));
                }
                Instr::AssignField(name) => {
                    let v = pop(&mut stack);
                    let target = pop(&mut stack);
                    self.assign_field(target, *name, Location::Concrete(v));
                }
                Instr::AssignIndex => {
                    let v = pop(&mut stack);
                    let index = pop(&mut stack);
                    let target = pop(&mut stack);
                    self.assign_index(target, index, Location::Concrete(v));
                }
                Instr::BindLocal(name) => {
                    let v = pop(&mut stack);
                    scope = Frame::push(scope, *name, v);
                }

                Instr::ReactiveAssignGlobal(name, ttid) => {
                    let thunk = Thunk { template: *ttid, scope: scope.clone() };
                    self.globals.insert(*name, Location::Reactive(thunk));
                }
                Instr::ReactiveAssignField(name, ttid) => {
                    let target = pop(&mut stack);
                    let thunk = Thunk { template: *ttid, scope: scope.clone() };
                    self.assign_field(target, *name, Location::Reactive(thunk));
                }
                Instr::ReactiveAssignIndex(ttid) => {
                    let index = pop(&mut stack);
                    let target = pop(&mut stack);
                    let thunk = Thunk { template: *ttid, scope: scope.clone() };
                    self.assign_index(target, index, Location::Reactive(thunk));
                }
            }
            pc += 1;
        }

        Ok(stack.pop().unwrap_or(Value::Unit))
    }

    fn resolve_ident(&mut self, name: StringId, scope: &Scope, field_scope: Option<HeapId>) -> RunResult<Value> {
        if let Some(heap_id) = field_scope {
            let has_sibling = self
                .heap
                .struct_obj(heap_id)
                .is_some_and(|s| s.fields.contains_key(&name));
            if has_sibling {
                return self.read_field(heap_id, name);
            }
        }
        if let Some(value) = Frame::lookup(scope, name) {
            return Ok(value);
        }
        Ok(self.read_global(name)?)
    }

    fn read_global(&mut self, name: StringId) -> RunResult<Value> {
        match self.globals.get(&name).cloned() {
            None => Ok(Value::Int(0)),
            Some(Location::Concrete(v)) => Ok(v),
            Some(Location::Reactive(thunk)) => self.read_reactive(LocationRef::Global(name), thunk, None),
        }
    }

    fn read_field(&mut self, heap_id: HeapId, name: StringId) -> RunResult<Value> {
        let loc = self.heap.struct_obj(heap_id).and_then(|s| s.fields.get(&name).cloned());
        match loc {
            None => Ok(Value::Int(0)),
            Some(Location::Concrete(v)) => Ok(v),
            Some(Location::Reactive(thunk)) => {
                self.read_reactive(LocationRef::Field(heap_id, name), thunk, Some(heap_id))
            }
        }
    }

    fn read_cell(&mut self, heap_id: HeapId, index: i32) -> RunResult<Value> {
        let length = self.heap.length_of(heap_id);
        if index < 0 || index >= length {
            self.diagnostics.report(Diagnostic {
                error: RunError::IndexOutOfBounds { index, length },
            });
            return Ok(Value::Int(0));
        }
        let idx = index as usize;
        let loc = self.heap.cells(heap_id).and_then(|cells| cells.get(idx)).cloned();
        match loc {
            None => Ok(Value::Int(0)),
            Some(Location::Concrete(v)) => Ok(v),
            Some(Location::Reactive(thunk)) => self.read_reactive(LocationRef::Cell(heap_id, idx), thunk, None),
        }
    }

    fn read_reactive(&mut self, loc_ref: LocationRef, thunk: Thunk, field_scope: Option<HeapId>) -> RunResult<Value> {
        if !self.reading.insert(loc_ref.clone()) {
            self.diagnostics.report(Diagnostic { error: RunError::ReactiveCycle });
            return Ok(Value::Int(0));
        }
        let program = self.program;
        let chunk = &program.thunks[thunk.template.index()];
        let result = self.exec(chunk, thunk.scope.clone(), field_scope);
        self.reading.remove(&loc_ref);
        result
    }

    fn instantiate_struct(&mut self, tid: crate::bytecode::TemplateId, scope: &Scope) -> RunResult<Value> {
        let program = self.program;
        let template = &program.templates[tid.index()];
        let heap_id = self.heap.alloc(HeapData::Struct(StructObject::new()));
        for field in &template.fields {
            let loc = match &field.init {
                None => Location::zero(),
                Some(TemplateInit::Eager(chunk)) => {
                    let value = self.exec(chunk, scope.clone(), Some(heap_id))?;
                    Location::Concrete(value)
                }
                Some(TemplateInit::Reactive(ttid)) => {
                    Location::Reactive(Thunk { template: *ttid, scope: scope.clone() })
                }
            };
            if let Some(obj) = self.heap.struct_obj_mut(heap_id) {
                obj.fields.insert(field.name, loc);
            }
        }
        Ok(Value::Struct(heap_id))
    }

    fn call(&mut self, callee: Value, args: SmallVec<[Value; 4]>) -> RunResult<Value> {
        let Value::Function(fid) = callee else {
            self.type_mismatch(format!("cannot call a {}", callee.type_name()));
            return Ok(Value::Int(0));
        };
        if self.call_depth >= self.config.max_call_depth {
            return Err(RunError::StackOverflow);
        }
        let program = self.program;
        let func = &program.functions[fid.index()];
        let mut scope: Scope = None;
        for (param, arg) in func.params.iter().zip(args) {
            scope = Frame::push(scope, *param, arg);
        }
        self.call_depth += 1;
        let result = self.exec(&func.body, scope, None);
        self.call_depth -= 1;
        result
    }

    fn assign_field(&mut self, target: Value, name: StringId, loc: Location) {
        match target {
            Value::Struct(id) => {
                if let Some(obj) = self.heap.struct_obj_mut(id) {
                    obj.fields.insert(name, loc);
                }
            }
            other => self.type_mismatch(format!("cannot assign a field on a {}", other.type_name())),
        }
    }

    fn assign_index(&mut self, target: Value, index: Value, loc: Location) {
        match target {
            Value::Array(id) | Value::Str(id) => {
                let idx = self.coerce_int(index);
                let length = self.heap.length_of(id);
                if idx < 0 || idx >= length {
                    self.diagnostics.report(Diagnostic {
                        error: RunError::IndexOutOfBounds { index: idx, length },
                    });
                    return;
                }
                if let Some(cells) = self.heap.cells_mut(id) {
                    cells[idx as usize] = loc;
                }
            }
            other => self.type_mismatch(format!("cannot index-assign a {}", other.type_name())),
        }
    }

    fn coerce_int(&mut self, value: Value) -> i32 {
        match value.as_int_with(|id| self.heap.length_of(id)) {
            Some(n) => n,
            None => {
                self.type_mismatch(format!("expected an integer, found {}", value.type_name()));
                0
            }
        }
    }

    fn truthy(&self, value: Value) -> bool {
        value.is_truthy_with(|id| self.heap.length_of(id))
    }

    fn values_equal(&self, lhs: Value, rhs: Value) -> bool {
        let li = lhs.as_int_with(|id| self.heap.length_of(id));
        let ri = rhs.as_int_with(|id| self.heap.length_of(id));
        match (li, ri) {
            (Some(a), Some(b)) => a == b,
            _ => lhs == rhs,
        }
    }

    fn compare(&mut self, stack: &mut Vec<Value>, f: impl FnOnce(std::cmp::Ordering) -> bool) {
        let rhs = pop(stack);
        let lhs = pop(stack);
        let a = lhs.as_int_with(|id| self.heap.length_of(id));
        let b = rhs.as_int_with(|id| self.heap.length_of(id));
        let result = match (a, b) {
            (Some(a), Some(b)) => f(a.cmp(&b)),
            _ => {
                self.type_mismatch("cannot order values that are not integer-coercible".to_owned());
                false
            }
        };
        stack.push(Value::Int(i32::from(result)));
    }

    fn binary_arith(&mut self, stack: &mut Vec<Value>, f: impl FnOnce(i32, i32) -> i32) {
        let rhs = pop(stack);
        let lhs = pop(stack);
        let is_char = matches!(lhs, Value::Char(_)) || matches!(rhs, Value::Char(_));
        let a = self.coerce_int(lhs);
        let b = self.coerce_int(rhs);
        let result = f(a, b);
        stack.push(if is_char { Value::Char(result) } else { Value::Int(result) });
    }

    fn binary_div(&mut self, stack: &mut Vec<Value>, modulo: bool) {
        let rhs = pop(stack);
        let lhs = pop(stack);
        let is_char = matches!(lhs, Value::Char(_)) || matches!(rhs, Value::Char(_));
        let a = self.coerce_int(lhs);
        let b = self.coerce_int(rhs);
        if b == 0 {
            self.diagnostics.report(Diagnostic { error: RunError::DivisionByZero });
            stack.push(Value::Int(0));
            return;
        }
        let result = if modulo { a.wrapping_rem(b) } else { a.wrapping_div(b) };
        stack.push(if is_char { Value::Char(result) } else { Value::Int(result) });
    }

    fn render(&self, value: Value) -> String {
        match value {
            Value::Str(id) => self.heap.str_obj(id).map(StrObject::to_text).unwrap_or_default(),
            Value::Array(id) => self.heap.length_of(id).to_string(),
            Value::Int(n) => n.to_string(),
            Value::Char(c) => char::from_u32(c as u32).unwrap_or('\u{fffd}').to_string(),
            Value::Struct(_) | Value::Function(_) | Value::Unit => value.to_string(),
        }
    }

    fn type_mismatch(&mut self, message: String) {
        self.diagnostics.report(Diagnostic { error: RunError::TypeMismatch(message) });
    }
}

fn pop(stack: &mut Vec<Value>) -> Value {
    stack.pop().expect("compiler balances the stack")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{compiler::Compiler, intern::Interner, lexer::Lexer, parser::Parser, print::CollectPrint};

    fn run_source(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().expect("lex");
        let stmts = Parser::new(tokens).parse_module().expect("parse");
        let mut interner = Interner::new();
        let program = Compiler::compile(&mut interner, &stmts).expect("compile");
        let config = ModuleConfig::new(".");
        let mut vm: Vm<'_, crate::diagnostics::NoopDiagnostics, CollectPrint> = Vm::new(
            &program,
            &interner,
            &config,
            crate::diagnostics::NoopDiagnostics,
            CollectPrint::default(),
        );
        vm.run().expect("run");
        vm.into_print().buffer
    }

    #[test]
    fn reactive_scalar_reflects_dependency() {
        let out = run_source("a = 1; b ::= a + 1; println b; a = 10; println b;");
        assert_eq!(out, "2\n11\n");
    }

    #[test]
    fn loop_binding_is_fresh_each_iteration() {
        let out = run_source(
            "i = 0; loop { if i >= 3 { break; } j := i; println j; i = i + 1; }",
        );
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn struct_reactive_field_sees_live_sibling() {
        let out = run_source(
            "struct C { x = 1; next ::= x + 1; } c = struct C; c.x = 10; println c.next;",
        );
        assert_eq!(out, "11\n");
    }

    #[test]
    fn division_by_zero_recovers_with_sentinel() {
        let out = run_source("x = 5 / 0; println x;");
        assert_eq!(out, "0\n");
    }

    #[test]
    fn array_length_coercion_drives_loop_guard() {
        let out = run_source("arr = [3]; i = 0; loop { if i >= arr { break; } println i; i = i + 1; }");
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn short_circuit_and_or_return_deciding_operand() {
        let out = run_source("println 0 && 5; println 3 && 5; println 0 || 7; println 3 || 7;");
        assert_eq!(out, "0\n5\n7\n3\n");
    }

    #[test]
    fn struct_returned_from_function_aliases_the_same_heap_object() {
        let out = run_source(
            "struct P { x = 0; } func mk() { s := struct P; return s; } a = mk(); b = a; a.x = 7; println b.x;",
        );
        assert_eq!(out, "7\n");
    }

    #[test]
    fn reactive_dependency_chains_through_indexed_cells() {
        let out = run_source(
            "base = 1; arr = [5]; arr[0] ::= base; arr[1] ::= arr[0] + 1; arr[2] ::= arr[1] + 1; \
             arr[3] ::= arr[2] + 1; arr[4] ::= arr[3] + 1; println arr[4]; base = 10; println arr[4];",
        );
        assert_eq!(out, "5\n14\n");
    }
}
