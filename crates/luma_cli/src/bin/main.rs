// luma command line runner
//   luma script.lua       run a file
//   luma -e 'return 1+1'  evaluate a chunk
//   luma -                read a chunk from stdin

use luma::{LuaVM, LuaValue};
use std::io::Read;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let (source, name) = match args.first().map(|s| s.as_str()) {
        Some("-e") => match args.get(1) {
            Some(code) => (code.clone(), "=(command line)".to_string()),
            None => {
                eprintln!("luma: '-e' needs an argument");
                return ExitCode::from(2);
            }
        },
        Some("-") => {
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                eprintln!("luma: cannot read stdin: {}", e);
                return ExitCode::from(2);
            }
            (buffer, "=stdin".to_string())
        }
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => (text, path.to_string()),
            Err(e) => {
                eprintln!("luma: cannot open {}: {}", path, e);
                return ExitCode::from(2);
            }
        },
        None => {
            eprintln!("usage: luma <script.lua> | luma -e <chunk> | luma -");
            return ExitCode::from(2);
        }
    };

    let mut vm = LuaVM::new();
    vm.open_libs();

    let chunk = match vm.compile(&source, &name) {
        Ok(chunk) => chunk,
        Err(e) => {
            eprintln!("luma: {}", e);
            return ExitCode::from(1);
        }
    };

    match vm.execute(std::rc::Rc::new(chunk)) {
        Ok(results) => {
            for value in &results {
                match value {
                    LuaValue::Nil => {}
                    other => println!("{}", other.to_display_string()),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("luma: {}", e);
            ExitCode::from(1)
        }
    }
}
