//! Module loader.
//!
//! File-path resolution from dotted import names, plus load-once semantics,
//! is the whole contract. Fern resolves imports eagerly and splices each
//! imported module's statements in place of its `import` statement, so that
//! by the time the compiler runs it sees one flat, declaration-ordered
//! program: globals/functions/structs become visible in declaration order,
//! and imports execute in the importing module's top-level scope with no
//! namespacing.
//!
//! A module already marked loaded before its statements are spliced in
//! (rather than after) is what breaks import cycles: a module that
//! (transitively) imports itself sees nothing further from the in-progress
//! import, i.e. "sees what has executed so far" degenerates to "sees
//! nothing more", a defensible simplification for a collaborator this thin.

use std::{collections::HashSet, fs, path::{Path, PathBuf}};

use crate::{ast::Stmt, config::ModuleConfig, error::CompileError, lexer::Lexer, parser::Parser};

pub struct ModuleLoader<'a> {
    config: &'a ModuleConfig,
    loaded: HashSet<PathBuf>,
}

type LoadResult<T> = Result<T, CompileError>;

impl<'a> ModuleLoader<'a> {
    #[must_use]
    pub fn new(config: &'a ModuleConfig) -> Self {
        Self { config, loaded: HashSet::new() }
    }

    /// Loads and fully expands the entry source file named on the CLI.
    pub fn load_entry(&mut self, entry_path: &Path) -> LoadResult<Vec<Stmt>> {
        let normalized = normalize(entry_path);
        self.loaded.insert(normalized);
        let stmts = parse_file(entry_path)?;
        self.expand(stmts)
    }

    /// Walks a statement list, replacing each `import` with the expansion
    /// of the module it names.
    fn expand(&mut self, stmts: Vec<Stmt>) -> LoadResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Import(path) => out.extend(self.load_import(&path)?),
                Stmt::If { cond, then, els } => out.push(Stmt::If {
                    cond,
                    then: self.expand(then)?,
                    els: self.expand(els)?,
                }),
                Stmt::Loop(body) => out.push(Stmt::Loop(self.expand(body)?)),
                other => out.push(other),
            }
        }
        Ok(out)
    }

    /// Resolves `a.b.c` to `<root>/a/b/c.<ext>` and loads it, or returns no
    /// statements if it is already loaded (load-once).
    fn load_import(&mut self, dotted: &[String]) -> LoadResult<Vec<Stmt>> {
        let mut path = self.config.root_dir.clone();
        for segment in dotted {
            path.push(segment);
        }
        path.set_extension(&self.config.extension);

        let normalized = normalize(&path);
        if !self.loaded.insert(normalized) {
            return Ok(Vec::new());
        }
        let stmts = parse_file(&path).map_err(|err| match err {
            CompileError::Load { message, .. } => CompileError::Load {
                message,
                module: dotted.join("."),
            },
            other => other,
        })?;
        self.expand(stmts)
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn parse_file(path: &Path) -> LoadResult<Vec<Stmt>> {
    let source = fs::read_to_string(path).map_err(|err| CompileError::Load {
        message: err.to_string(),
        module: path.display().to_string(),
    })?;
    let tokens = Lexer::new(&source).tokenize()?;
    Parser::new(tokens).parse_module()
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn write_module(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn resolves_dotted_import_to_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "util/math.fn", "func square(x) { return x * x; }");
        write_module(dir.path(), "main.fn", "import util.math; y = square(3);");

        let config = ModuleConfig::new(dir.path());
        let mut loader = ModuleLoader::new(&config);
        let stmts = loader.load_entry(&dir.path().join("main.fn")).unwrap();
        assert!(matches!(stmts[0], Stmt::FuncDef(_)));
        assert!(matches!(stmts[1], Stmt::Assign(..)));
    }

    #[test]
    fn repeated_import_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "a.fn", "x = 1;");
        write_module(
            dir.path(),
            "main.fn",
            "import a; import a; y = 2;",
        );

        let config = ModuleConfig::new(dir.path());
        let mut loader = ModuleLoader::new(&config);
        let stmts = loader.load_entry(&dir.path().join("main.fn")).unwrap();
        // `x = 1;` once, then `y = 2;` — the second `import a` contributes nothing.
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn missing_module_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "main.fn", "import missing;");
        let config = ModuleConfig::new(dir.path());
        let mut loader = ModuleLoader::new(&config);
        assert!(loader.load_entry(&dir.path().join("main.fn")).is_err());
    }
}
