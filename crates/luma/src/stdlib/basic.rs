// Basic library (_G global functions)
// print, type, assert, error, tonumber, tostring, select, ipairs, pairs,
// next, pcall, xpcall, rawget, rawset, rawequal, rawlen, setmetatable,
// getmetatable, load, collectgarbage

use crate::lib_registry::{LibraryModule, get_arg, get_args, require_arg};
use crate::lua_value::{LuaFunction, LuaValue, MultiValue};
use crate::lua_vm::{LuaErrorKind, LuaResult, LuaVM};
use crate::lua_vm::arith::str_to_number;
use std::rc::Rc;

pub fn create_basic_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "print" => lua_print,
        "type" => lua_type,
        "assert" => lua_assert,
        "error" => lua_error,
        "tonumber" => lua_tonumber,
        "tostring" => lua_tostring,
        "select" => lua_select,
        "ipairs" => lua_ipairs,
        "pairs" => lua_pairs,
        "next" => lua_next,
        "pcall" => lua_pcall,
        "xpcall" => lua_xpcall,
        "rawget" => lua_rawget,
        "rawset" => lua_rawset,
        "rawequal" => lua_rawequal,
        "rawlen" => lua_rawlen,
        "setmetatable" => lua_setmetatable,
        "getmetatable" => lua_getmetatable,
        "load" => lua_load,
        "collectgarbage" => lua_collectgarbage,
    })
}

fn lua_print(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let args = get_args(vm);
    let mut parts = Vec::with_capacity(args.len());
    for value in &args {
        parts.push(vm.tostring_value(value)?);
    }
    println!("{}", parts.join("\t"));
    Ok(MultiValue::empty())
}

fn lua_type(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "type")?;
    Ok(MultiValue::single(LuaValue::str(value.type_name())))
}

fn lua_assert(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let condition = get_arg(vm, 0).unwrap_or(LuaValue::Nil);
    if condition.is_truthy() {
        return Ok(MultiValue::multiple(get_args(vm)));
    }
    match get_arg(vm, 1) {
        Some(message) => {
            // The message value passes through untouched, like error(v).
            let text = vm.tostring_value(&message)?;
            let mut err = crate::lua_vm::LuaError::runtime(text);
            err.traceback = vm.build_traceback();
            Err(err.with_value(message))
        }
        None => {
            let mut err = crate::lua_vm::LuaError::runtime("assertion failed!");
            err.traceback = vm.build_traceback();
            Err(err.with_value(LuaValue::str("assertion failed!")))
        }
    }
}

/// error(v [, level]) - raise with `v` as the error value. String values get
/// a source:line prefix unless level is 0.
fn lua_error(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = get_arg(vm, 0).unwrap_or(LuaValue::Nil);
    let level = get_arg(vm, 1).and_then(|v| v.as_integer()).unwrap_or(1);

    if let LuaValue::String(s) = &value {
        if level > 0 {
            let err = vm.error(s.as_str());
            let prefixed = LuaValue::str(err.message());
            return Err(err.with_value(prefixed));
        }
        let mut err = crate::lua_vm::LuaError::runtime(s.as_str().to_string());
        err.traceback = vm.build_traceback();
        return Err(err.with_value(value));
    }

    let message = value.to_display_string();
    Err(vm.error(message).with_value(value))
}

fn lua_tonumber(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = get_arg(vm, 0).unwrap_or(LuaValue::Nil);

    let result = match get_arg(vm, 1) {
        None | Some(LuaValue::Nil) => match &value {
            LuaValue::Integer(_) | LuaValue::Float(_) => value.clone(),
            LuaValue::String(s) => str_to_number(s.as_str()).unwrap_or(LuaValue::Nil),
            _ => LuaValue::Nil,
        },
        Some(base_value) => {
            let base = base_value
                .as_integer()
                .ok_or_else(|| vm.error("bad argument #2 to 'tonumber' (number expected)"))?;
            if !(2..=36).contains(&base) {
                return Err(vm.error("bad argument #2 to 'tonumber' (base out of range)"));
            }
            match value.as_str() {
                Some(s) => i64::from_str_radix(s.trim(), base as u32)
                    .map(LuaValue::Integer)
                    .unwrap_or(LuaValue::Nil),
                None => {
                    return Err(vm.error("bad argument #1 to 'tonumber' (string expected)"));
                }
            }
        }
    };
    Ok(MultiValue::single(result))
}

fn lua_tostring(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "tostring")?;
    let text = vm.tostring_value(&value)?;
    let result = vm.create_string_value(text);
    Ok(MultiValue::single(result))
}

/// select('#', ...) and select(n, ...); negative n counts from the end.
fn lua_select(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let selector = require_arg(vm, 0, "select")?;
    let rest = {
        let args = get_args(vm);
        args[1..].to_vec()
    };

    if selector.as_str() == Some("#") {
        return Ok(MultiValue::single(LuaValue::Integer(rest.len() as i64)));
    }

    let n = selector
        .as_integer()
        .ok_or_else(|| vm.error("bad argument #1 to 'select' (number expected)"))?;
    let start = if n > 0 {
        (n - 1) as usize
    } else if n < 0 {
        let back = (-n) as usize;
        if back > rest.len() {
            return Err(vm.error("bad argument #1 to 'select' (index out of range)"));
        }
        rest.len() - back
    } else {
        return Err(vm.error("bad argument #1 to 'select' (index out of range)"));
    };

    Ok(MultiValue::multiple(
        rest.into_iter().skip(start).collect(),
    ))
}

fn ipairs_next(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = require_arg(vm, 0, "ipairs")?;
    let index = get_arg(vm, 1).and_then(|v| v.as_integer()).unwrap_or(0) + 1;
    let value = vm.index_value(&table, &LuaValue::Integer(index))?;
    if value.is_nil() {
        Ok(MultiValue::single(LuaValue::Nil))
    } else {
        Ok(MultiValue::multiple(vec![LuaValue::Integer(index), value]))
    }
}

fn lua_ipairs(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = require_arg(vm, 0, "ipairs")?;
    Ok(MultiValue::multiple(vec![
        LuaValue::CFunction(ipairs_next),
        table,
        LuaValue::Integer(0),
    ]))
}

fn lua_next(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = require_arg(vm, 0, "next")?;
    let key = get_arg(vm, 1).unwrap_or(LuaValue::Nil);
    match vm.next_value(&table, &key)? {
        Some((k, v)) => Ok(MultiValue::multiple(vec![k, v])),
        None => Ok(MultiValue::single(LuaValue::Nil)),
    }
}

fn lua_pairs(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = require_arg(vm, 0, "pairs")?;
    Ok(MultiValue::multiple(vec![
        LuaValue::CFunction(lua_next),
        table,
        LuaValue::Nil,
    ]))
}

/// pcall(f, ...) -> true, results... | false, error value. Only runtime
/// errors are catchable.
fn lua_pcall(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let func = require_arg(vm, 0, "pcall")?;
    let args = get_args(vm)[1..].to_vec();
    match vm.call_value(func, args) {
        Ok(mut results) => {
            let mut values = vec![LuaValue::Boolean(true)];
            values.append(&mut results);
            Ok(MultiValue::multiple(values))
        }
        Err(err) if err.kind() == LuaErrorKind::RuntimeError => Ok(MultiValue::multiple(vec![
            LuaValue::Boolean(false),
            err.error_value(),
        ])),
        Err(err) => Err(err),
    }
}

fn lua_xpcall(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let func = require_arg(vm, 0, "xpcall")?;
    let handler = require_arg(vm, 1, "xpcall")?;
    let args = {
        let all = get_args(vm);
        if all.len() > 2 { all[2..].to_vec() } else { Vec::new() }
    };
    match vm.call_value(func, args) {
        Ok(mut results) => {
            let mut values = vec![LuaValue::Boolean(true)];
            values.append(&mut results);
            Ok(MultiValue::multiple(values))
        }
        Err(err) if err.kind() == LuaErrorKind::RuntimeError => {
            let mut handled = vm.call_value(handler, vec![err.error_value()])?;
            let mut values = vec![LuaValue::Boolean(false)];
            values.append(&mut handled);
            Ok(MultiValue::multiple(values))
        }
        Err(err) => Err(err),
    }
}

fn lua_rawget(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = require_arg(vm, 0, "rawget")?
        .as_table()
        .ok_or_else(|| vm.error("bad argument #1 to 'rawget' (table expected)"))?;
    let key = require_arg(vm, 1, "rawget")?;
    let value = table.borrow().raw_get(&key);
    Ok(MultiValue::single(value))
}

fn lua_rawset(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table_value = require_arg(vm, 0, "rawset")?;
    let table = table_value
        .as_table()
        .ok_or_else(|| vm.error("bad argument #1 to 'rawset' (table expected)"))?;
    let key = require_arg(vm, 1, "rawset")?;
    let value = get_arg(vm, 2).unwrap_or(LuaValue::Nil);
    vm.check_table_key(&key)?;
    table.borrow_mut().raw_set(key, value);
    Ok(MultiValue::single(table_value))
}

fn lua_rawequal(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let a = get_arg(vm, 0).unwrap_or(LuaValue::Nil);
    let b = get_arg(vm, 1).unwrap_or(LuaValue::Nil);
    Ok(MultiValue::single(LuaValue::Boolean(a == b)))
}

fn lua_rawlen(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "rawlen")?;
    let len = match &value {
        LuaValue::Table(t) => t.borrow().border(),
        LuaValue::String(s) => s.as_str().len() as i64,
        _ => {
            return Err(vm.error("table or string expected"));
        }
    };
    Ok(MultiValue::single(LuaValue::Integer(len)))
}

fn lua_setmetatable(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = require_arg(vm, 0, "setmetatable")?;
    let meta = get_arg(vm, 1).unwrap_or(LuaValue::Nil);
    let new_meta = match meta {
        LuaValue::Nil => None,
        LuaValue::Table(m) => Some(m),
        _ => {
            return Err(vm.error("bad argument #2 to 'setmetatable' (nil or table expected)"));
        }
    };
    vm.set_metatable_checked(&table, new_meta)?;
    Ok(MultiValue::single(table))
}

fn lua_getmetatable(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "getmetatable")?;
    Ok(MultiValue::single(vm.get_metatable_checked(&value)))
}

/// load(chunk [, chunkname]) -> function | nil, message. The returned
/// closure runs against the shared globals; it captures nothing from the
/// caller.
fn lua_load(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let chunk = require_arg(vm, 0, "load")?;
    let name = get_arg(vm, 1)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "=(load)".to_string());

    let Some(source) = chunk.as_str().map(|s| s.to_string()) else {
        return Err(vm.error("bad argument #1 to 'load' (string expected)"));
    };

    match vm.compile(&source, &name) {
        Ok(compiled) => {
            let func = LuaValue::Function(Rc::new(LuaFunction {
                chunk: Rc::new(compiled),
                upvalues: Vec::new(),
            }));
            Ok(MultiValue::single(func))
        }
        Err(err) => {
            let message = vm.create_string_value(err.message().to_string());
            Ok(MultiValue::multiple(vec![LuaValue::Nil, message]))
        }
    }
}

fn lua_collectgarbage(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let opt = get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "collect".to_string());
    match opt.as_str() {
        "collect" | "step" => {
            vm.collect_garbage();
            Ok(MultiValue::single(LuaValue::Integer(0)))
        }
        "count" => {
            let stats = vm.gc_stats();
            Ok(MultiValue::single(LuaValue::Float(
                stats.bytes_allocated as f64 / 1024.0,
            )))
        }
        _ => Ok(MultiValue::single(LuaValue::Integer(0))),
    }
}

