use std::{
    error::Error,
    io::{self, Write},
    process::ExitCode,
};

use tracing::info;
use xdrgen::{
    codegen::rust::Generator,
    parser::parse_specification,
    util::fmt::{Context, Show},
};

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: xdrgen <file.x>...");
        return ExitCode::FAILURE;
    }

    let mut code = ExitCode::SUCCESS;
    for path in &paths {
        if let Err(error) = run(path) {
            eprintln!("{error}");
            code = ExitCode::FAILURE;
        }
    }
    code
}

fn run(path: &str) -> Result<(), Box<dyn Error>> {
    let src = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    let ctx = Context {
        filename: path,
        src: &src,
    };
    let spec = parse_specification(&src).map_err(|e| format!("{:#}", e.display(&ctx)))?;
    info!(path, definitions = spec.definitions.len(), "parsed");

    let code = Generator::new(&spec)
        .generate_string()
        .map_err(|e| format!("{path}: {e}"))?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(code.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
