use super::{assert_int, assert_true, run_one};
use crate::lua_vm::{LuaErrorKind, LuaVM};

fn run_err(source: &str) -> crate::lua_vm::LuaError {
    let mut vm = LuaVM::new();
    vm.open_libs();
    match vm.execute_string(source) {
        Ok(v) => panic!("expected an error, got {:?} for:\n{}", v, source),
        Err(e) => e,
    }
}

#[test]
fn syntax_errors_are_compile_errors() {
    let err = run_err("local = 1");
    assert_eq!(err.kind(), LuaErrorKind::CompileError);
    let err = run_err("return 1 +");
    assert_eq!(err.kind(), LuaErrorKind::CompileError);
    let err = run_err("if x then");
    assert_eq!(err.kind(), LuaErrorKind::CompileError);
}

#[test]
fn compile_errors_carry_positions() {
    let err = run_err("local a = 1\nlocal = 2");
    assert_eq!(err.kind(), LuaErrorKind::CompileError);
    assert!(err.message().contains("2:"), "message: {}", err.message());
}

#[test]
fn multiple_parse_errors_reported_together() {
    let err = run_err("local = 1\nlocal = 2");
    let lines: Vec<&str> = err.message().lines().collect();
    assert!(lines.len() >= 2, "expected two errors: {}", err.message());
}

#[test]
fn break_outside_loop_is_a_compile_error() {
    let err = run_err("break");
    assert_eq!(err.kind(), LuaErrorKind::CompileError);
}

#[test]
fn goto_is_rejected() {
    let err = run_err("goto done\n::done::");
    assert_eq!(err.kind(), LuaErrorKind::CompileError);
    assert!(err.message().contains("goto"));
}

#[test]
fn runtime_errors_name_the_offending_type() {
    let err = run_err("return 1 | nil");
    assert_eq!(err.kind(), LuaErrorKind::RuntimeError);
    assert!(err.message().contains("nil"), "message: {}", err.message());

    let err = run_err("local x = nil return x.field");
    assert!(err.message().contains("index a nil value"));

    let err = run_err("local x = 5 x()");
    assert!(err.message().contains("call a number value"));

    let err = run_err("return {} + 1");
    assert!(err.message().contains("arithmetic on a table value"));

    let err = run_err("return 'a' < 1");
    assert!(err.message().contains("compare"));
}

#[test]
fn runtime_errors_carry_line_numbers() {
    let err = run_err("local a = 1\nlocal b = 2\nreturn nil .. a");
    assert!(err.message().contains(":3:"), "message: {}", err.message());
}

#[test]
fn runtime_errors_carry_tracebacks() {
    let err = run_err(
        "local function inner() error('deep') end
         local function outer() inner() end
         outer()",
    );
    assert!(!err.traceback.is_empty());
}

#[test]
fn pcall_catches_runtime_errors() {
    assert_true("return pcall(error, 'x') == false");
    assert_true(
        "local ok, err = pcall(function() error('boom') end)
         return ok == false and err:find('boom') ~= nil",
    );
    assert_true("local ok = pcall(function() return 1 end) return ok");
    assert_int(
        "local ok, v = pcall(function() return 42 end)
         return v",
        42,
    );
}

#[test]
fn pcall_returns_non_string_error_values() {
    assert_int(
        "local ok, err = pcall(function() error({code = 7}) end)
         assert(ok == false)
         return err.code",
        7,
    );
}

#[test]
fn error_with_level_zero_has_no_prefix() {
    assert_true(
        "local _, err = pcall(function() error('raw', 0) end)
         return err == 'raw'",
    );
}

#[test]
fn error_prefixes_position_by_default() {
    assert_true(
        "local _, err = pcall(function() error('tagged') end)
         return err ~= 'tagged' and err:find('tagged') ~= nil",
    );
}

#[test]
fn nested_pcall() {
    assert_true(
        "local ok1 = pcall(function()
             local ok2, err2 = pcall(function() error('inner') end)
             assert(ok2 == false and err2:find('inner'))
             error('outer')
         end)
         return ok1 == false",
    );
}

#[test]
fn xpcall_invokes_the_handler() {
    assert_true(
        "local seen
         local ok = xpcall(function() error('oops') end, function(e)
             seen = e
             return 'handled'
         end)
         return ok == false and seen:find('oops') ~= nil",
    );
    assert_int(
        "local _, v = xpcall(function() return 5 end, function() return -1 end)
         return v",
        5,
    );
}

#[test]
fn assert_semantics() {
    assert_true("return pcall(assert, false) == false");
    assert_true("return pcall(assert, nil) == false");
    assert_true(
        "local ok, err = pcall(assert, false)
         return err == 'assertion failed!'",
    );
    assert_true(
        "local ok, err = pcall(assert, nil, 'custom')
         return err == 'custom'",
    );
    assert_int("return assert(42)", 42);
    // assert passes every argument through on success.
    assert_true("local a, b = assert(1, 2) return a == 1 and b == 2");
}

#[test]
fn errors_unwind_through_generic_for() {
    assert_true(
        "local ok = pcall(function()
             for _ in function() error('iter') end do end
         end)
         return ok == false",
    );
}

#[test]
fn uncaught_errors_reach_the_host_as_runtime_errors() {
    let err = run_err("error('to the host')");
    assert_eq!(err.kind(), LuaErrorKind::RuntimeError);
    assert!(err.message().contains("to the host"));
}

#[test]
fn stack_overflow_is_caught() {
    let err = run_err("local function f() return 1 + f() end f()");
    assert_eq!(err.kind(), LuaErrorKind::RuntimeError);
    assert!(err.message().contains("stack overflow"));
}

#[test]
fn deep_tail_recursion_does_not_overflow() {
    assert_eq!(
        run_one(
            "local function f(n) if n == 0 then return 'done' end return f(n - 1) end
             return f(100000)"
        )
        .as_str(),
        Some("done")
    );
}
