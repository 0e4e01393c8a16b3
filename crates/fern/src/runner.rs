//! Orchestrates load → compile → run behind one entry point the CLI
//! barely has to think about.

use std::path::Path;

use crate::{
    bytecode::{Chunk, Instr, Program, TemplateInit},
    compiler::Compiler,
    config::ModuleConfig,
    diagnostics::DiagnosticSink,
    error::{CompileResult, RunError},
    intern::Interner,
    module::ModuleLoader,
    print::PrintSink,
    vm::Vm,
};

/// How a run ended: exit code 0 for a clean run, 1 for a fatal runtime
/// fault, 2 for a compile error — the compile-error case is instead
/// surfaced as `Err(CompileError)` from [`Runner::run_file`], since it
/// never reaches the VM at all.
#[derive(Debug, Clone)]
pub enum ExitStatus {
    Success,
    RuntimeFault(RunError),
}

impl ExitStatus {
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::RuntimeFault(_) => 1,
        }
    }
}

/// The result of a completed run: the exit status plus the sinks, handed
/// back so callers (tests, primarily) can inspect what was printed or
/// diagnosed.
pub struct RunOutcome<D, P> {
    pub status: ExitStatus,
    pub diagnostics: D,
    pub print: P,
}

pub struct Runner {
    config: ModuleConfig,
}

impl Runner {
    #[must_use]
    pub fn new(config: ModuleConfig) -> Self {
        Self { config }
    }

    /// Loads, compiles, and runs `entry`. A [`CompileError`](crate::CompileError)
    /// means the program never started (exit code 2); otherwise the
    /// returned [`ExitStatus`] distinguishes a clean run from one halted by a
    /// fatal runtime fault (exit code 1).
    pub fn run_file<D: DiagnosticSink, P: PrintSink>(
        &self,
        entry: &Path,
        diagnostics: D,
        print: P,
    ) -> CompileResult<RunOutcome<D, P>> {
        let program_and_interner = self.compile_file(entry)?;
        let (program, interner) = program_and_interner;
        let mut vm = Vm::new(&program, &interner, &self.config, diagnostics, print);
        let status = match vm.run() {
            Ok(()) => ExitStatus::Success,
            Err(err) => {
                debug_assert!(err.is_fatal(), "recoverable faults never escape `Vm::run`");
                ExitStatus::RuntimeFault(err)
            }
        };
        Ok(RunOutcome { status, diagnostics: vm.into_diagnostics(), print: vm.into_print() })
    }

    /// Produces the `--dump-bytecode` instruction listing for `entry`
    /// without executing it.
    pub fn dump_bytecode(&self, entry: &Path) -> CompileResult<String> {
        let (program, interner) = self.compile_file(entry)?;
        Ok(render_program(&program, &interner))
    }

    fn compile_file(&self, entry: &Path) -> CompileResult<(Program, Interner)> {
        let mut loader = ModuleLoader::new(&self.config);
        let stmts = loader.load_entry(entry)?;
        let mut interner = Interner::new();
        let program = Compiler::compile(&mut interner, &stmts)?;
        Ok((program, interner))
    }
}

fn render_program(program: &Program, interner: &Interner) -> String {
    let mut out = String::new();
    disassemble_chunk(&mut out, &program.top_level, interner);

    for (i, func) in program.functions.iter().enumerate() {
        out.push_str(&format!("\nfunction {i} ({}):\n", interner.get(func.name)));
        disassemble_chunk(&mut out, &func.body, interner);
    }

    for (i, template) in program.templates.iter().enumerate() {
        out.push_str(&format!("\nstruct template {i} ({}):\n", interner.get(template.name)));
        for field in &template.fields {
            let field_name = interner.get(field.name);
            match &field.init {
                None => out.push_str(&format!("  field {field_name} (default 0)\n")),
                Some(TemplateInit::Eager(chunk)) => {
                    out.push_str(&format!("  field {field_name} (eager):\n"));
                    disassemble_chunk_indented(&mut out, chunk, interner);
                }
                Some(TemplateInit::Reactive(ttid)) => {
                    out.push_str(&format!("  field {field_name} -> thunk {}\n", ttid.index()));
                }
            }
        }
    }

    for (i, chunk) in program.thunks.iter().enumerate() {
        out.push_str(&format!("\nthunk {i}:\n"));
        disassemble_chunk(&mut out, chunk, interner);
    }

    out
}

fn disassemble_chunk(out: &mut String, chunk: &Chunk, interner: &Interner) {
    for (offset, instr) in chunk.code.iter().enumerate() {
        out.push_str(&format!("{offset}: {}\n", mnemonic(instr, interner)));
    }
}

fn disassemble_chunk_indented(out: &mut String, chunk: &Chunk, interner: &Interner) {
    for (offset, instr) in chunk.code.iter().enumerate() {
        out.push_str(&format!("    {offset}: {}\n", mnemonic(instr, interner)));
    }
}

fn mnemonic(instr: &Instr, interner: &Interner) -> String {
    match instr {
        Instr::PushInt(n) => format!("push_int {n}"),
        Instr::PushChar(c) => format!("push_char {c}"),
        Instr::PushStr(sid) => format!("push_str {:?}", interner.get(*sid)),
        Instr::PushFunction(fid) => format!("push_function {}", fid.index()),
        Instr::LoadIdent(sid) => format!("load_ident {}", interner.get(*sid)),
        Instr::FieldGet(sid) => format!("field_get {}", interner.get(*sid)),
        Instr::IndexGet => "index_get".to_owned(),
        Instr::Neg => "neg".to_owned(),
        Instr::Add => "add".to_owned(),
        Instr::Sub => "sub".to_owned(),
        Instr::Mul => "mul".to_owned(),
        Instr::Div => "div".to_owned(),
        Instr::Mod => "mod".to_owned(),
        Instr::CmpEq => "cmp_eq".to_owned(),
        Instr::CmpNe => "cmp_ne".to_owned(),
        Instr::CmpLt => "cmp_lt".to_owned(),
        Instr::CmpLtEq => "cmp_lteq".to_owned(),
        Instr::CmpGt => "cmp_gt".to_owned(),
        Instr::CmpGtEq => "cmp_gteq".to_owned(),
        Instr::JumpIfFalse(t) => format!("jump_if_false {t}"),
        Instr::Jump(t) => format!("jump {t}"),
        Instr::Pop => "pop".to_owned(),
        Instr::JumpIfFalseKeep(t) => format!("jump_if_false_keep {t}"),
        Instr::JumpIfTrueKeep(t) => format!("jump_if_true_keep {t}"),
        Instr::EnterLoop => "enter_loop".to_owned(),
        Instr::IterStart => "iter_start".to_owned(),
        Instr::ExitLoop => "exit_loop".to_owned(),
        Instr::ArrayAlloc => "array_alloc".to_owned(),
        Instr::StructAlloc(tid) => format!("struct_alloc {}", tid.index()),
        Instr::RegisterTemplate(tid) => format!("register_template {}", tid.index()),
        Instr::Call(argc) => format!("call {argc}"),
        Instr::Return => "return".to_owned(),
        Instr::Print => "print".to_owned(),
        Instr::Println => "println".to_owned(),
        Instr::AssignGlobal(sid) => format!("assign_global {}", interner.get(*sid)),
        Instr::AssignField(sid) => format!("assign_field {}", interner.get(*sid)),
        Instr::AssignIndex => "assign_index".to_owned(),
        Instr::BindLocal(sid) => format!("bind_local {}", interner.get(*sid)),
        Instr::ReactiveAssignGlobal(sid, ttid) => {
            format!("reactive_assign_global {} -> thunk {}", interner.get(*sid), ttid.index())
        }
        Instr::ReactiveAssignField(sid, ttid) => {
            format!("reactive_assign_field {} -> thunk {}", interner.get(*sid), ttid.index())
        }
        Instr::ReactiveAssignIndex(ttid) => format!("reactive_assign_index -> thunk {}", ttid.index()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{diagnostics::NoopDiagnostics, print::CollectPrint};

    fn write_entry(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("main.fn");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn clean_run_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_entry(dir.path(), "x = 1; println x;");
        let runner = Runner::new(ModuleConfig::new(dir.path()));
        let outcome = runner.run_file(&entry, NoopDiagnostics, CollectPrint::default()).unwrap();
        assert!(matches!(outcome.status, ExitStatus::Success));
        assert_eq!(outcome.print.buffer, "1\n");
    }

    #[test]
    fn stack_overflow_is_a_runtime_fault() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_entry(dir.path(), "func f() { return f(); } f();");
        let config = ModuleConfig::new(dir.path()).with_max_call_depth(8);
        let runner = Runner::new(config);
        let outcome = runner.run_file(&entry, NoopDiagnostics, CollectPrint::default()).unwrap();
        assert!(matches!(outcome.status, ExitStatus::RuntimeFault(RunError::StackOverflow)));
    }

    #[test]
    fn missing_entry_file_is_a_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new(ModuleConfig::new(dir.path()));
        let result = runner.run_file(&dir.path().join("missing.fn"), NoopDiagnostics, CollectPrint::default());
        assert!(result.is_err());
    }

    #[test]
    fn dump_bytecode_lists_top_level_instructions() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_entry(dir.path(), "x = 1;");
        let runner = Runner::new(ModuleConfig::new(dir.path()));
        let dump = runner.dump_bytecode(&entry).unwrap();
        assert!(dump.contains("push_int 1"));
        assert!(dump.contains("assign_global x"));
    }
}
