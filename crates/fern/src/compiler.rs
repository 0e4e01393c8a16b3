//! AST-to-bytecode lowering.
//!
//! A single pass over the already-import-expanded statement list: imports
//! are merged before compilation, so functions/structs/globals come out
//! visible in declaration order for free — see [`crate::module`]. Struct
//! names are pre-scanned first so that a `struct Ident` expression anywhere
//! in the program can resolve to a [`TemplateId`] regardless of textual
//! order; the `RegisterTemplate` instruction emitted at the definition's
//! own position is what still gates *instantiation* to declaration order
//! at runtime.

use std::collections::HashMap;

use crate::{
    ast::{Access, BinOp, CmpOp, Expr, FieldKind, LValue, Stmt, StructDef, UnaryOp},
    bytecode::{Chunk, Instr, Program, StructTemplate, TemplateField, TemplateId, TemplateInit},
    error::{CompileError, CompileResult},
    function::{FunctionDef, FunctionId},
    intern::{Interner, StringId},
    reactive::ThunkTemplateId,
};

struct LoopCtx {
    break_fixups: Vec<usize>,
}

pub struct Compiler<'a> {
    interner: &'a mut Interner,
    program: Program,
    templates_by_name: HashMap<StringId, TemplateId>,
    loop_stack: Vec<LoopCtx>,
}

impl<'a> Compiler<'a> {
    pub fn compile(interner: &'a mut Interner, stmts: &[Stmt]) -> CompileResult<Program> {
        let mut compiler = Self {
            interner,
            program: Program::new(),
            templates_by_name: HashMap::new(),
            loop_stack: Vec::new(),
        };
        compiler.prescan_structs(stmts);
        let mut top = Vec::new();
        compiler.compile_block(stmts, &mut top)?;
        compiler.program.top_level = Chunk { code: top };
        Ok(compiler.program)
    }

    fn prescan_structs(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::StructDef(def) => {
                    let name = self.interner.intern(&def.name);
                    let id = TemplateId::new(self.program.templates.len());
                    self.program.templates.push(StructTemplate { name, fields: Vec::new() });
                    self.templates_by_name.insert(name, id);
                }
                Stmt::If { then, els, .. } => {
                    self.prescan_structs(then);
                    self.prescan_structs(els);
                }
                Stmt::Loop(body) => self.prescan_structs(body),
                Stmt::FuncDef(def) => self.prescan_structs(&def.body),
                _ => {}
            }
        }
    }

    fn compile_block(&mut self, stmts: &[Stmt], code: &mut Vec<Instr>) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_stmt(stmt, code)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, code: &mut Vec<Instr>) -> CompileResult<()> {
        match stmt {
            // The module loader expands every `import` before the compiler
            // ever sees the statement list; none should reach here, but a
            // stray one is harmless to skip.
            Stmt::Import(_) => {}
            Stmt::StructDef(def) => self.compile_struct_def(def, code)?,
            Stmt::FuncDef(def) => {
                let mut body = Vec::new();
                let outer_loops = std::mem::take(&mut self.loop_stack);
                self.compile_block(&def.body, &mut body)?;
                self.loop_stack = outer_loops;
                body.push(Instr::PushInt(0));
                body.push(Instr::Return);
                let params = def.params.iter().map(|p| self.interner.intern(p)).collect();
                let name = self.interner.intern(&def.name);
                let fid = FunctionId::new(self.program.functions.len());
                self.program.functions.push(FunctionDef {
                    name,
                    params,
                    body: Chunk { code: body },
                    source_module: String::new(),
                });
                code.push(Instr::PushFunction(fid));
                code.push(Instr::AssignGlobal(name));
            }
            Stmt::If { cond, then, els } => {
                self.compile_expr(cond, code)?;
                let jf = code.len();
                code.push(Instr::JumpIfFalse(0));
                self.compile_block(then, code)?;
                if els.is_empty() {
                    let after = code.len();
                    code[jf] = Instr::JumpIfFalse(after);
                } else {
                    let jmp = code.len();
                    code.push(Instr::Jump(0));
                    let else_start = code.len();
                    code[jf] = Instr::JumpIfFalse(else_start);
                    self.compile_block(els, code)?;
                    let after = code.len();
                    code[jmp] = Instr::Jump(after);
                }
            }
            Stmt::Loop(body) => {
                code.push(Instr::EnterLoop);
                let top = code.len();
                code.push(Instr::IterStart);
                self.loop_stack.push(LoopCtx { break_fixups: Vec::new() });
                self.compile_block(body, code)?;
                code.push(Instr::Jump(top));
                let exit = code.len();
                code.push(Instr::ExitLoop);
                let ctx = self.loop_stack.pop().expect("loop context pushed above");
                for fixup in ctx.break_fixups {
                    code[fixup] = Instr::Jump(exit);
                }
            }
            Stmt::Break => {
                let idx = code.len();
                code.push(Instr::Jump(0));
                self.loop_stack
                    .last_mut()
                    .expect("parser rejects `break` outside a loop")
                    .break_fixups
                    .push(idx);
            }
            Stmt::Return(expr) => {
                match expr {
                    Some(e) => self.compile_expr(e, code)?,
                    None => code.push(Instr::PushInt(0)),
                }
                code.push(Instr::Return);
            }
            Stmt::Print(expr) => {
                self.compile_expr(expr, code)?;
                code.push(Instr::Print);
            }
            Stmt::Println(expr) => {
                self.compile_expr(expr, code)?;
                code.push(Instr::Println);
            }
            Stmt::Bind(name, expr) => {
                self.compile_expr(expr, code)?;
                let sid = self.interner.intern(name);
                code.push(Instr::BindLocal(sid));
            }
            Stmt::Assign(lvalue, expr) => {
                self.compile_assign(lvalue, expr, code)?;
            }
            Stmt::ReactiveAssign(lvalue, expr) => {
                self.compile_reactive_assign(lvalue, expr, code)?;
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr, code)?;
                code.push(Instr::Pop);
            }
        }
        Ok(())
    }

    fn compile_struct_def(&mut self, def: &StructDef, code: &mut Vec<Instr>) -> CompileResult<()> {
        let name = self.interner.intern(&def.name);
        let tid = *self.templates_by_name.get(&name).expect("prescanned above");
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let fname = self.interner.intern(&field.name);
            let init = match field.kind {
                FieldKind::Reactive => {
                    let expr = field.init.as_ref().expect("grammar requires `::=` to have an expression");
                    let chunk = self.compile_thunk(expr)?;
                    let ttid = ThunkTemplateId::new(self.program.thunks.len());
                    self.program.thunks.push(chunk);
                    Some(TemplateInit::Reactive(ttid))
                }
                FieldKind::Mutable | FieldKind::Bind => match &field.init {
                    Some(expr) => {
                        let mut sub = Vec::new();
                        self.compile_expr(expr, &mut sub)?;
                        Some(TemplateInit::Eager(Chunk { code: sub }))
                    }
                    None => None,
                },
            };
            fields.push(TemplateField { name: fname, kind: field.kind, init });
        }
        self.program.templates[tid.index()] = StructTemplate { name, fields };
        code.push(Instr::RegisterTemplate(tid));
        Ok(())
    }

    /// Compiles a bare expression into its own chunk, for reactive thunks.
    fn compile_thunk(&mut self, expr: &Expr) -> CompileResult<Chunk> {
        let mut code = Vec::new();
        self.compile_expr(expr, &mut code)?;
        Ok(Chunk { code })
    }

    /// Compiles the common prefix of an l-value (every access but the
    /// last) onto the stack, leaving either nothing (bare identifier root)
    /// or the immediate container the final step applies to.
    fn compile_lvalue_prefix(&mut self, lvalue: &LValue, code: &mut Vec<Instr>) -> CompileResult<Access> {
        if lvalue.chain.is_empty() {
            return Ok(Access::Field(lvalue.root.clone()));
        }
        let root_id = self.interner.intern(&lvalue.root);
        code.push(Instr::LoadIdent(root_id));
        for access in &lvalue.chain[..lvalue.chain.len() - 1] {
            match access {
                Access::Field(name) => {
                    let fid = self.interner.intern(name);
                    code.push(Instr::FieldGet(fid));
                }
                Access::Index(index_expr) => {
                    self.compile_expr(index_expr, code)?;
                    code.push(Instr::IndexGet);
                }
            }
        }
        Ok(lvalue.chain.last().expect("non-empty chain checked above").clone())
    }

    fn compile_assign(&mut self, lvalue: &LValue, rhs: &Expr, code: &mut Vec<Instr>) -> CompileResult<()> {
        if lvalue.chain.is_empty() {
            self.compile_expr(rhs, code)?;
            let name = self.interner.intern(&lvalue.root);
            code.push(Instr::AssignGlobal(name));
            return Ok(());
        }
        let last = self.compile_lvalue_prefix(lvalue, code)?;
        match last {
            Access::Field(name) => {
                self.compile_expr(rhs, code)?;
                let fid = self.interner.intern(&name);
                code.push(Instr::AssignField(fid));
            }
            Access::Index(index_expr) => {
                self.compile_expr(&index_expr, code)?;
                self.compile_expr(rhs, code)?;
                code.push(Instr::AssignIndex);
            }
        }
        Ok(())
    }

    fn compile_reactive_assign(&mut self, lvalue: &LValue, rhs: &Expr, code: &mut Vec<Instr>) -> CompileResult<()> {
        let chunk = self.compile_thunk(rhs)?;
        let ttid = ThunkTemplateId::new(self.program.thunks.len());
        self.program.thunks.push(chunk);

        if lvalue.chain.is_empty() {
            let name = self.interner.intern(&lvalue.root);
            code.push(Instr::ReactiveAssignGlobal(name, ttid));
            return Ok(());
        }
        let last = self.compile_lvalue_prefix(lvalue, code)?;
        match last {
            Access::Field(name) => {
                let fid = self.interner.intern(&name);
                code.push(Instr::ReactiveAssignField(fid, ttid));
            }
            Access::Index(index_expr) => {
                self.compile_expr(&index_expr, code)?;
                code.push(Instr::ReactiveAssignIndex(ttid));
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr, code: &mut Vec<Instr>) -> CompileResult<()> {
        match expr {
            Expr::Int(n) => code.push(Instr::PushInt(*n)),
            Expr::Char(c) => code.push(Instr::PushChar(*c)),
            Expr::Str(s) => {
                let sid = self.interner.intern(s);
                code.push(Instr::PushStr(sid));
            }
            Expr::Ident(name, _) => {
                let sid = self.interner.intern(name);
                code.push(Instr::LoadIdent(sid));
            }
            Expr::ArrayAlloc(size) => {
                self.compile_expr(size, code)?;
                code.push(Instr::ArrayAlloc);
            }
            Expr::StructAlloc(name, range) => {
                let sid = self.interner.intern(name);
                let Some(&tid) = self.templates_by_name.get(&sid) else {
                    return Err(CompileError::Parse {
                        message: format!("undefined struct `{name}`"),
                        at: *range,
                    });
                };
                code.push(Instr::StructAlloc(tid));
            }
            Expr::Unary { op, expr } => {
                self.compile_expr(expr, code)?;
                match op {
                    UnaryOp::Neg => code.push(Instr::Neg),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs, code)?;
                self.compile_expr(rhs, code)?;
                code.push(match op {
                    BinOp::Add => Instr::Add,
                    BinOp::Sub => Instr::Sub,
                    BinOp::Mul => Instr::Mul,
                    BinOp::Div => Instr::Div,
                    BinOp::Mod => Instr::Mod,
                });
            }
            Expr::Compare { op, lhs, rhs } => {
                self.compile_expr(lhs, code)?;
                self.compile_expr(rhs, code)?;
                code.push(match op {
                    CmpOp::Eq => Instr::CmpEq,
                    CmpOp::NotEq => Instr::CmpNe,
                    CmpOp::Lt => Instr::CmpLt,
                    CmpOp::LtEq => Instr::CmpLtEq,
                    CmpOp::Gt => Instr::CmpGt,
                    CmpOp::GtEq => Instr::CmpGtEq,
                });
            }
            Expr::And(lhs, rhs) => {
                // Short-circuit: if `lhs` is falsy, its value is the
                // result and `rhs` never runs.
                self.compile_expr(lhs, code)?;
                let skip = code.len();
                code.push(Instr::JumpIfFalseKeep(0));
                self.compile_expr(rhs, code)?;
                let after = code.len();
                code[skip] = Instr::JumpIfFalseKeep(after);
            }
            Expr::Or(lhs, rhs) => {
                // Short-circuit: if `lhs` is truthy, its value is the
                // result and `rhs` never runs.
                self.compile_expr(lhs, code)?;
                let skip = code.len();
                code.push(Instr::JumpIfTrueKeep(0));
                self.compile_expr(rhs, code)?;
                let after = code.len();
                code[skip] = Instr::JumpIfTrueKeep(after);
            }
            Expr::Ternary { cond, then, els } => {
                self.compile_expr(cond, code)?;
                let jf = code.len();
                code.push(Instr::JumpIfFalse(0));
                self.compile_expr(then, code)?;
                let jmp = code.len();
                code.push(Instr::Jump(0));
                let else_start = code.len();
                code[jf] = Instr::JumpIfFalse(else_start);
                self.compile_expr(els, code)?;
                let after = code.len();
                code[jmp] = Instr::Jump(after);
            }
            Expr::Field { target, name, .. } => {
                self.compile_expr(target, code)?;
                let fid = self.interner.intern(name);
                code.push(Instr::FieldGet(fid));
            }
            Expr::Index { target, index, .. } => {
                self.compile_expr(target, code)?;
                self.compile_expr(index, code)?;
                code.push(Instr::IndexGet);
            }
            Expr::Call { callee, args, .. } => {
                self.compile_expr(callee, code)?;
                for arg in args {
                    self.compile_expr(arg, code)?;
                }
                let argc = u8::try_from(args.len()).expect("no more than 255 call arguments");
                code.push(Instr::Call(argc));
            }
        }
        Ok(())
    }
}
