use super::{assert_int, assert_str, assert_true, run};
use crate::lua_value::LuaValue;

#[test]
fn basic_calls_and_returns() {
    assert_int("local function add(a, b) return a + b end return add(2, 3)", 5);
    assert_int("local f = function(x) return x * 2 end return f(21)", 42);
    assert_true("local function nothing() end return nothing() == nil");
}

#[test]
fn missing_arguments_are_nil() {
    assert_true("local function f(a, b) return b == nil end return f(1)");
    assert_int("local function f(a) return a end return f(1, 2, 3)", 1);
}

#[test]
fn multiple_returns() {
    let values = run("local function mr() return 1, 2, 3 end return mr()");
    assert_eq!(
        values,
        vec![
            LuaValue::Integer(1),
            LuaValue::Integer(2),
            LuaValue::Integer(3)
        ]
    );
}

#[test]
fn multi_value_truncation_in_middle_position() {
    let values = run("local function mr() return 1, 2, 3 end return mr(), 10");
    assert_eq!(values, vec![LuaValue::Integer(1), LuaValue::Integer(10)]);
}

#[test]
fn multi_value_expansion_in_last_position() {
    let values = run("local function mr() return 1, 2 end return 10, mr()");
    assert_eq!(
        values,
        vec![
            LuaValue::Integer(10),
            LuaValue::Integer(1),
            LuaValue::Integer(2)
        ]
    );
}

#[test]
fn parentheses_truncate_to_one_value() {
    let values = run("local function mr() return 1, 2, 3 end return (mr())");
    assert_eq!(values, vec![LuaValue::Integer(1)]);
}

#[test]
fn constructor_expansion_rules() {
    // Trailing call expands, non-trailing truncates.
    assert_true(
        "local function multi() return 10, 20, 30 end
         local t = {multi()}
         return t[1] == 10 and t[2] == 20 and t[3] == 30",
    );
    assert_true(
        "local function multi() return 10, 20, 30 end
         local t = {multi(), 99}
         return t[1] == 10 and t[2] == 99 and t[3] == nil",
    );
}

#[test]
fn varargs_and_select() {
    assert_int("local function count(...) return select('#', ...) end return count(1, nil, 3)", 3);
    assert_int("local function first(...) return (select(1, ...)) end return first(7, 8)", 7);
    assert_int("local function last(...) return (select(-1, ...)) end return last(7, 8, 9)", 9);
    assert_int("local function f(...) local a, b = ... return a + b end return f(4, 5)", 9);
}

#[test]
fn vararg_table_packing() {
    assert_true(
        "function f(a, ...)
             local arg = {n = select('#', ...), ...}
             for i = 1, arg.n do assert(a[i] == arg[i]) end
             return arg.n
         end
         return f({1, 2, 3}, 1, 2, 3) == 3",
    );
}

#[test]
fn local_function_recursion() {
    assert_int(
        "local function fact(n)
             if n <= 1 then return 1 end
             return n * fact(n - 1)
         end
         return fact(6)",
        720,
    );
}

#[test]
fn local_function_shadowing() {
    assert_true(
        "local function f(x) return x + 1 end
         assert(f(10) == 11)
         local function f(x) return x + 2 end
         assert(f(10) == 12)
         return true",
    );
}

#[test]
fn global_function_declaration() {
    assert_int("function gf(x) return x * 3 end return gf(5)", 15);
}

#[test]
fn dotted_function_declaration() {
    assert_int(
        "t = {}
         t.inner = {}
         function t.inner.f(x) return x + 100 end
         return t.inner.f(1)",
        101,
    );
}

#[test]
fn method_declaration_and_call() {
    assert_int(
        "local obj = {value = 10}
         function obj:get() return self.value end
         function obj:add(n) self.value = self.value + n return self.value end
         obj:add(5)
         return obj:get()",
        15,
    );
}

#[test]
fn bare_function_name_prefers_existing_local() {
    assert_int(
        "local f = function() return 1 end
         local function wrap()
             function f() return 2 end
         end
         wrap()
         return f()",
        2,
    );
}

#[test]
fn string_and_table_call_sugar() {
    assert_int("local function len(s) return #s end return len 'hello'", 5);
    assert_int("local function count(t) return #t end return count {1, 2}", 2);
}

#[test]
fn tail_call_does_not_grow_the_stack() {
    assert_int(
        "local function loop(n)
             if n == 0 then return 0 end
             return loop(n - 1)
         end
         return loop(10000)",
        0,
    );
}

#[test]
fn functions_are_first_class() {
    assert_int(
        "local function apply(f, x) return f(x) end
         return apply(function(v) return v + 1 end, 41)",
        42,
    );
    assert_str(
        "local ops = {double = function(x) return x * 2 end}
         return tostring(ops.double(4))",
        "8",
    );
}
