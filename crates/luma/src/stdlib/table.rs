// Table library
// insert, remove, concat, pack, unpack, sort, move

use crate::lib_registry::{LibraryModule, arg_count, get_arg, require_arg};
use crate::lua_value::{LuaTable, LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaVM};
use std::cell::RefCell;
use std::rc::Rc;

pub fn create_table_lib() -> LibraryModule {
    crate::lib_module!("table", {
        "insert" => table_insert,
        "remove" => table_remove,
        "concat" => table_concat,
        "pack" => table_pack,
        "unpack" => table_unpack,
        "sort" => table_sort,
        "move" => table_move,
    })
}

fn check_table(vm: &LuaVM, index: usize, func: &str) -> LuaResult<Rc<RefCell<LuaTable>>> {
    require_arg(vm, index, func)?.as_table().ok_or_else(|| {
        vm.error(format!(
            "bad argument #{} to '{}' (table expected)",
            index + 1,
            func
        ))
    })
}

fn table_insert(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = check_table(vm, 0, "insert")?;
    match arg_count(vm) {
        2 => {
            let value = require_arg(vm, 1, "insert")?;
            let len = table.borrow().border();
            table.borrow_mut().raw_set_int(len + 1, value);
        }
        3 => {
            let pos = require_arg(vm, 1, "insert")?
                .as_integer()
                .ok_or_else(|| vm.error("bad argument #2 to 'insert' (number expected)"))?;
            let value = require_arg(vm, 2, "insert")?;
            let len = table.borrow().border();
            if pos < 1 || pos > len + 1 {
                return Err(vm.error("bad argument #2 to 'insert' (position out of bounds)"));
            }
            table.borrow_mut().sequence_insert(pos, value);
        }
        _ => {
            return Err(vm.error("wrong number of arguments to 'insert'"));
        }
    }
    Ok(MultiValue::empty())
}

fn table_remove(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = check_table(vm, 0, "remove")?;
    let len = table.borrow().border();
    let pos = get_arg(vm, 1)
        .and_then(|v| v.as_integer())
        .unwrap_or(len);
    if len == 0 && get_arg(vm, 1).is_none() {
        return Ok(MultiValue::single(LuaValue::Nil));
    }
    if len > 0 && (pos < 1 || pos > len + 1) {
        return Err(vm.error("bad argument #2 to 'remove' (position out of bounds)"));
    }
    let removed = table.borrow_mut().sequence_remove(pos);
    Ok(MultiValue::single(removed))
}

fn table_concat(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = check_table(vm, 0, "concat")?;
    let sep = get_arg(vm, 1)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default();
    let len = table.borrow().border();
    let i = get_arg(vm, 2).and_then(|v| v.as_integer()).unwrap_or(1);
    let j = get_arg(vm, 3).and_then(|v| v.as_integer()).unwrap_or(len);

    let mut out = String::new();
    let mut k = i;
    while k <= j {
        let value = table.borrow().raw_get_int(k);
        match &value {
            LuaValue::String(s) => out.push_str(s.as_str()),
            LuaValue::Integer(_) | LuaValue::Float(_) => {
                out.push_str(&value.to_display_string())
            }
            _ => {
                return Err(vm.error(format!(
                    "invalid value (at index {}) in table for 'concat'",
                    k
                )));
            }
        }
        if k < j {
            out.push_str(&sep);
        }
        k += 1;
    }
    let result = vm.create_string_value(out);
    Ok(MultiValue::single(result))
}

/// table.pack(...) -> {..., n = count}
fn table_pack(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let args = crate::lib_registry::get_args(vm);
    let table = vm.create_table();
    {
        let mut t = table.borrow_mut();
        for (i, value) in args.iter().enumerate() {
            t.raw_set_int(i as i64 + 1, value.clone());
        }
        t.raw_set_str("n", LuaValue::Integer(args.len() as i64));
    }
    Ok(MultiValue::single(LuaValue::Table(table)))
}

fn table_unpack(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = check_table(vm, 0, "unpack")?;
    let i = get_arg(vm, 1).and_then(|v| v.as_integer()).unwrap_or(1);
    let j = get_arg(vm, 2)
        .and_then(|v| v.as_integer())
        .unwrap_or_else(|| table.borrow().border());

    if j - i >= 1_000_000 {
        return Err(vm.error("too many results to unpack"));
    }

    let mut out = Vec::new();
    let mut k = i;
    while k <= j {
        out.push(table.borrow().raw_get_int(k));
        k += 1;
    }
    Ok(MultiValue::multiple(out))
}

/// In-place merge sort over the sequence part; the comparator (default `<`)
/// runs through the VM so metamethods apply.
fn table_sort(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let table = check_table(vm, 0, "sort")?;
    let comparator = get_arg(vm, 1);
    let len = table.borrow().border();

    let mut items: Vec<LuaValue> = (1..=len).map(|i| table.borrow().raw_get_int(i)).collect();
    let mut sorted = merge_sort(vm, &mut items, &comparator)?;

    let mut t = table.borrow_mut();
    for (i, value) in sorted.drain(..).enumerate() {
        t.raw_set_int(i as i64 + 1, value);
    }
    Ok(MultiValue::empty())
}

fn sort_less(
    vm: &mut LuaVM,
    a: &LuaValue,
    b: &LuaValue,
    comparator: &Option<LuaValue>,
) -> LuaResult<bool> {
    match comparator {
        Some(f) if !f.is_nil() => {
            let result = vm.call_value_single(f.clone(), vec![a.clone(), b.clone()])?;
            Ok(result.is_truthy())
        }
        _ => {
            // Default order is '<' with its usual error on mixed types.
            match (a, b) {
                (LuaValue::Integer(x), LuaValue::Integer(y)) => Ok(x < y),
                (x, y) if x.is_number() && y.is_number() => {
                    Ok(x.as_float().unwrap_or(f64::NAN) < y.as_float().unwrap_or(f64::NAN))
                }
                (LuaValue::String(x), LuaValue::String(y)) => Ok(x.as_str() < y.as_str()),
                _ => Err(vm.error(format!(
                    "attempt to compare {} with {}",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    }
}

fn merge_sort(
    vm: &mut LuaVM,
    items: &mut Vec<LuaValue>,
    comparator: &Option<LuaValue>,
) -> LuaResult<Vec<LuaValue>> {
    if items.len() <= 1 {
        return Ok(std::mem::take(items));
    }
    let mid = items.len() / 2;
    let mut right = items.split_off(mid);
    let left = merge_sort(vm, items, comparator)?;
    let right = merge_sort(vm, &mut right, comparator)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut li = 0;
    let mut ri = 0;
    while li < left.len() && ri < right.len() {
        if sort_less(vm, &right[ri], &left[li], comparator)? {
            out.push(right[ri].clone());
            ri += 1;
        } else {
            out.push(left[li].clone());
            li += 1;
        }
    }
    out.extend_from_slice(&left[li..]);
    out.extend_from_slice(&right[ri..]);
    Ok(out)
}

/// table.move(a1, f, e, t [, a2])
fn table_move(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let source = check_table(vm, 0, "move")?;
    let f = require_arg(vm, 1, "move")?
        .as_integer()
        .ok_or_else(|| vm.error("bad argument #2 to 'move' (number expected)"))?;
    let e = require_arg(vm, 2, "move")?
        .as_integer()
        .ok_or_else(|| vm.error("bad argument #3 to 'move' (number expected)"))?;
    let t = require_arg(vm, 3, "move")?
        .as_integer()
        .ok_or_else(|| vm.error("bad argument #4 to 'move' (number expected)"))?;
    let dest = match get_arg(vm, 4) {
        Some(v) => v
            .as_table()
            .ok_or_else(|| vm.error("bad argument #5 to 'move' (table expected)"))?,
        None => source.clone(),
    };

    if e >= f {
        if t > f && Rc::ptr_eq(&source, &dest) {
            // Overlapping move: copy backwards.
            let mut i = e;
            while i >= f {
                let value = source.borrow().raw_get_int(i);
                dest.borrow_mut().raw_set_int(t + (i - f), value);
                i -= 1;
            }
        } else {
            for i in f..=e {
                let value = source.borrow().raw_get_int(i);
                dest.borrow_mut().raw_set_int(t + (i - f), value);
            }
        }
    }
    Ok(MultiValue::single(LuaValue::Table(dest)))
}
