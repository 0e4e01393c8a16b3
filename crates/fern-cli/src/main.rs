use std::{env, path::Path, process::ExitCode};

use fern::{ModuleConfig, Runner, StdPrint, StderrDiagnostics};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut dump_bytecode = false;
    let mut entry = None;
    for arg in &args[1..] {
        if arg == "--dump-bytecode" {
            dump_bytecode = true;
        } else if entry.is_none() {
            entry = Some(arg.as_str());
        } else {
            eprintln!("error: unexpected argument `{arg}`");
            return ExitCode::from(2);
        }
    }
    let Some(entry) = entry else {
        eprintln!("usage: fern [--dump-bytecode] <entry-source-file>");
        return ExitCode::from(2);
    };

    let entry_path = Path::new(entry);
    let root_dir = entry_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let runner = Runner::new(ModuleConfig::new(root_dir));

    if dump_bytecode {
        return match runner.dump_bytecode(entry_path) {
            Ok(listing) => {
                print!("{listing}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::from(2)
            }
        };
    }

    match runner.run_file(entry_path, StderrDiagnostics, StdPrint) {
        Ok(outcome) => ExitCode::from(outcome.status.code()),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
