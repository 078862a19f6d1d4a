// IO library (minimal surface)
// write and read cover the common embedding cases; the whole table is
// sandboxed away by default.

use crate::lib_registry::{LibraryModule, get_arg, get_args};
use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaVM};
use std::io::{BufRead, Write};

pub fn create_io_lib() -> LibraryModule {
    crate::lib_module!("io", {
        "write" => io_write,
        "read" => io_read,
    })
}

fn io_write(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let args = get_args(vm);
    let mut stdout = std::io::stdout().lock();
    for (i, value) in args.iter().enumerate() {
        match value {
            LuaValue::String(s) => {
                stdout
                    .write_all(s.as_str().as_bytes())
                    .map_err(|e| vm.error(format!("io error: {}", e)))?;
            }
            LuaValue::Integer(_) | LuaValue::Float(_) => {
                stdout
                    .write_all(value.to_display_string().as_bytes())
                    .map_err(|e| vm.error(format!("io error: {}", e)))?;
            }
            other => {
                return Err(vm.error(format!(
                    "bad argument #{} to 'write' (string expected, got {})",
                    i + 1,
                    other.type_name()
                )));
            }
        }
    }
    stdout
        .flush()
        .map_err(|e| vm.error(format!("io error: {}", e)))?;
    Ok(MultiValue::empty())
}

fn io_read(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let format = get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "l".to_string());

    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| vm.error(format!("io error: {}", e)))?;
    if read == 0 {
        return Ok(MultiValue::single(LuaValue::Nil));
    }

    let result = match format.trim_start_matches('*') {
        "n" => crate::lua_vm::arith::str_to_number(line.trim()).unwrap_or(LuaValue::Nil),
        "L" => vm.create_string_value(line),
        _ => {
            let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
            vm.create_string_value(trimmed)
        }
    };
    Ok(MultiValue::single(result))
}
