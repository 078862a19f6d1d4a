use super::{assert_int, assert_str, assert_true, run, run_one};
use crate::lua_value::LuaValue;

#[test]
fn empty_chunk_returns_nothing() {
    assert!(run("local x = 1").is_empty());
    assert!(run("").is_empty());
}

#[test]
fn literals_round_trip() {
    assert_int("return 42", 42);
    assert_eq!(run_one("return 3.5"), LuaValue::Float(3.5));
    assert_eq!(run_one("return nil"), LuaValue::Nil);
    assert_eq!(run_one("return true"), LuaValue::Boolean(true));
    assert_str("return 'hi'", "hi");
    assert_int("return 0xFF", 255);
}

#[test]
fn locals_and_globals() {
    assert_int("local a = 10 local b = a + 5 return b", 15);
    assert_int("x = 7 return x", 7);
    assert_eq!(run_one("return undefined_global"), LuaValue::Nil);
}

#[test]
fn multiple_assignment() {
    assert_true("local a, b = 1, 2 a, b = b, a return a == 2 and b == 1");
    assert_true("local a, b, c = 1 return a == 1 and b == nil and c == nil");
    assert_true("local a, b = 1, 2, 3 return a == 1 and b == 2");
}

#[test]
fn globals_table_is_self_referential() {
    assert_true("return _G._G == _G");
    assert_true("return _G._G._G.math == math");
}

#[test]
fn type_function() {
    assert_str("return type(nil)", "nil");
    assert_str("return type(true)", "boolean");
    assert_str("return type(1)", "number");
    assert_str("return type(1.5)", "number");
    assert_str("return type('s')", "string");
    assert_str("return type({})", "table");
    assert_str("return type(print)", "function");
}

#[test]
fn tostring_basics() {
    assert_str("return tostring(nil)", "nil");
    assert_str("return tostring(true)", "true");
    assert_str("return tostring(12)", "12");
    assert_str("return tostring(1.0)", "1.0");
    assert_str("return tostring(0.5)", "0.5");
    assert_str("return tostring('already')", "already");
}

#[test]
fn tonumber_basics() {
    assert_int("return tonumber('42')", 42);
    assert_int("return tonumber('  -8  ')", -8);
    assert_eq!(run_one("return tonumber('0x10')"), LuaValue::Integer(16));
    assert_eq!(run_one("return tonumber('1.5')"), LuaValue::Float(1.5));
    assert_eq!(run_one("return tonumber('zzz')"), LuaValue::Nil);
    assert_int("return tonumber('ff', 16)", 255);
    assert_int("return tonumber('101', 2)", 5);
}

#[test]
fn tostring_tonumber_round_trip() {
    assert_true("return tostring(tonumber('7')) == '7'");
    assert_true("return tostring(tonumber('1.5')) == '1.5'");
    assert_true("return tostring(tonumber('-3')) == '-3'");
}

#[test]
fn print_does_not_crash() {
    run("print('hello', 1, nil, true, {})");
}

#[test]
fn comments_are_ignored_by_execution() {
    assert_int(
        "-- leading comment\nlocal a = 1 -- trailing\n--[[ block\ncomment ]]return a",
        1,
    );
}

#[test]
fn chunk_returns_multiple_values() {
    let values = run("return 1, 'two', 3.0");
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], LuaValue::Integer(1));
    assert_eq!(values[1].as_str(), Some("two"));
    assert_eq!(values[2], LuaValue::Float(3.0));
}

#[test]
fn shebang_line_is_skipped() {
    assert_int("#!/usr/bin/env lua\nreturn 9", 9);
}
