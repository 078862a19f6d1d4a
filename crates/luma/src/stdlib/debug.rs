// Debug library (intentionally small): getinfo and traceback.

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaVM};

pub fn create_debug_lib() -> LibraryModule {
    crate::lib_module!("debug", {
        "getinfo" => debug_getinfo,
        "traceback" => debug_traceback,
    })
}

fn debug_getinfo(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = vm.create_table();
    {
        let source = vm.current_source();
        let line = vm.current_line();
        let mut t = table.borrow_mut();
        t.raw_set_str("source", LuaValue::str(&format!("@{}", source)));
        t.raw_set_str("short_src", LuaValue::str(&source));
        t.raw_set_str("currentline", LuaValue::Integer(line as i64));
        t.raw_set_str("what", LuaValue::str("Lua"));
    }
    Ok(MultiValue::single(LuaValue::Table(table)))
}

fn debug_traceback(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let message = crate::lib_registry::get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()));

    let mut out = String::new();
    if let Some(msg) = message {
        out.push_str(&msg);
        out.push('\n');
    }
    out.push_str("stack traceback:");
    for frame in vm.build_traceback() {
        let name = frame.name.as_deref().unwrap_or("?");
        if frame.line > 0 {
            out.push_str(&format!("\n\t{}:{}: in {}", frame.source, frame.line, name));
        } else {
            out.push_str(&format!("\n\t{}: in {}", frame.source, name));
        }
    }
    let result = vm.create_string_value(out);
    Ok(MultiValue::single(result))
}
