use super::{assert_int, assert_true, run};
use crate::lua_value::LuaValue;

#[test]
fn simple_counter_closure() {
    assert_true(
        "local function make_counter()
             local count = 0
             return function()
                 count = count + 1
                 return count
             end
         end
         local counter = make_counter()
         assert(counter() == 1)
         assert(counter() == 2)
         assert(counter() == 3)
         return true",
    );
}

#[test]
fn upvalue_visible_before_closing() {
    // Writes to a still-open local are seen through the closure.
    assert_true(
        "local A = 0
         local dummy = function() return A end
         A = 1
         assert(dummy() == 1)
         A = 0
         return true",
    );
}

#[test]
fn siblings_share_one_cell() {
    assert_true(
        "local function make_getset()
             local value = 10
             local function get() return value end
             local function set(v) value = v end
             return get, set
         end
         local get, set = make_getset()
         assert(get() == 10)
         set(20)
         assert(get() == 20)
         set(30)
         return get() == 30",
    );
}

#[test]
fn cells_survive_frame_exit() {
    assert_int(
        "local function make()
             local hidden = 41
             return function() hidden = hidden + 1 return hidden end
         end
         local f = make()
         return f()",
        42,
    );
}

#[test]
fn per_iteration_capture_in_numeric_for() {
    // Each iteration's closure sees that iteration's value.
    let values = run(
        "function f(x)
             local a = {}
             for i = 1, 3 do a[i] = function() return i end end
             return a[1](), a[2](), a[3]()
         end
         return f(10)",
    );
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
fn per_iteration_capture_in_while_loop() {
    assert_true(
        "local fns = {}
         local i = 1
         while i <= 3 do
             local j = i
             fns[i] = function() return j end
             i = i + 1
         end
         return fns[1]() == 1 and fns[2]() == 2 and fns[3]() == 3",
    );
}

#[test]
fn shared_accumulator_across_loop_closures() {
    assert_true(
        "local sum = 0
         local adders = {}
         for i = 1, 3 do
             adders[i] = function(x) sum = sum + x return sum end
         end
         assert(adders[1](10) == 10)
         assert(adders[2](5) == 15)
         assert(adders[3](3) == 18)
         return true",
    );
}

#[test]
fn nested_closures_capture_through_levels() {
    assert_int(
        "local function outer(x)
             return function(y)
                 return function(z)
                     return x + y + z
                 end
             end
         end
         return outer(1)(2)(3)",
        6,
    );
}

#[test]
fn closure_factories_are_independent() {
    assert_true(
        "local function make_adder(n)
             return function(x) return x + n end
         end
         local add5 = make_adder(5)
         local add10 = make_adder(10)
         return add5(3) == 8 and add10(3) == 13 and add5(7) == 12",
    );
}

#[test]
fn closures_survive_error_unwind() {
    // The frame is unwound by error, but the captured local must have been
    // closed into its cell.
    assert_int(
        "local leaked
         local ok = pcall(function()
             local secret = 99
             leaked = function() return secret end
             error('boom')
         end)
         assert(ok == false)
         return leaked()",
        99,
    );
}

#[test]
fn break_closes_captured_locals() {
    assert_int(
        "local f
         for i = 1, 10 do
             local v = i * 11
             f = function() return v end
             if i == 2 then break end
         end
         return f()",
        22,
    );
}
