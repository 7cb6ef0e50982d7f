//! Command-line runner: loads a JSON-serialized stack module, binds the
//! standard host functions, and runs one export.

use clap::Parser;
use log::debug;
use sbc_codegen::module::StackModule;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use svm::{Vm, VmValue};

#[derive(Parser)]
#[command(name = "svm", version, about = "Run a compiled stack module")]
struct Args {
    /// Module file, JSON as emitted by the compiler
    module: PathBuf,

    /// Export to run
    #[arg(short, long, default_value = "main")]
    entry: String,

    /// Integer arguments for the entry point
    args: Vec<i32>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("svm: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let text = fs::read_to_string(&args.module)
        .map_err(|e| format!("{}: {e}", args.module.display()))?;
    let module: StackModule =
        serde_json::from_str(&text).map_err(|e| format!("invalid module: {e}"))?;
    debug!(
        "loaded module: {} functions, {} imports",
        module.functions.len(),
        module.imports.len()
    );

    let mut vm = Vm::new(&module).map_err(|e| e.to_string())?;
    vm.bind_host("print", |values| {
        if let Some(VmValue::I32(v)) = values.first() {
            println!("{v}");
        }
        None
    });

    let call_args = args.args.iter().map(|v| VmValue::I32(*v)).collect();
    let results = vm
        .run_export(&args.entry, call_args)
        .map_err(|e| e.to_string())?;
    for value in results {
        match value {
            VmValue::I32(v) => println!("{v}"),
            VmValue::I64(v) => println!("{v}"),
            VmValue::F32(v) => println!("{v}"),
            VmValue::F64(v) => println!("{v}"),
        }
    }
    Ok(())
}
