use super::{assert_int, assert_str, assert_true, run_one};
use crate::lua_value::LuaValue;

#[test]
fn if_elseif_else() {
    assert_str(
        "local x = 2
         if x == 1 then return 'one'
         elseif x == 2 then return 'two'
         else return 'many' end",
        "two",
    );
    assert_str(
        "local x = 9
         if x == 1 then return 'one'
         elseif x == 2 then return 'two'
         else return 'many' end",
        "many",
    );
    assert_int("if nil then return 1 end return 2", 2);
}

#[test]
fn while_loop() {
    assert_int(
        "local sum = 0 local i = 1
         while i <= 10 do sum = sum + i i = i + 1 end
         return sum",
        55,
    );
    assert_int("while false do end return 1", 1);
}

#[test]
fn repeat_until() {
    assert_int(
        "local n = 0
         repeat n = n + 1 until n >= 5
         return n",
        5,
    );
    // Body runs at least once.
    assert_int("local n = 0 repeat n = n + 1 until true return n", 1);
    // The condition sees body locals.
    assert_int(
        "local n = 0
         repeat local done = n > 2 n = n + 1 until done
         return n",
        4,
    );
}

#[test]
fn numeric_for() {
    assert_int("local s = 0 for i = 1, 5 do s = s + i end return s", 15);
    assert_int("local s = 0 for i = 10, 1, -2 do s = s + i end return s", 30);
    assert_int("local n = 0 for _ = 5, 1 do n = n + 1 end return n", 0);
    // Float step promotes the whole loop.
    assert_true(
        "local last for i = 1, 2, 0.5 do last = i end return last == 2.0 and math.type(last) == 'float'",
    );
}

#[test]
fn numeric_for_edge_cases() {
    // Loop variable is private to each iteration's view.
    assert_int(
        "local total = 0
         for i = 1, 3 do
             i = i * 10
             total = total + i
         end
         return total",
        60,
    );
    // The induction state is untouched by body writes to the variable.
    assert_int("local n = 0 for i = 1, 3 do i = 100 n = n + 1 end return n", 3);
}

#[test]
fn generic_for_with_ipairs() {
    assert_int(
        "local t = {10, 20, 30}
         local sum = 0
         for i, v in ipairs(t) do sum = sum + i * v end
         return sum",
        140,
    );
}

#[test]
fn generic_for_with_pairs() {
    assert_int(
        "local t = {a = 1, b = 2, c = 3}
         local sum = 0
         for _, v in pairs(t) do sum = sum + v end
         return sum",
        6,
    );
    assert_int(
        "local t = {5, 6, x = 7}
         local count = 0
         for _ in pairs(t) do count = count + 1 end
         return count",
        3,
    );
}

#[test]
fn break_statement() {
    assert_int(
        "local i = 0
         while true do
             i = i + 1
             if i == 7 then break end
         end
         return i",
        7,
    );
    assert_int(
        "local s = 0
         for i = 1, 100 do
             if i > 4 then break end
             s = s + i
         end
         return s",
        10,
    );
}

#[test]
fn nested_loops_and_breaks() {
    assert_int(
        "local count = 0
         for i = 1, 3 do
             for j = 1, 3 do
                 if j == 2 then break end
                 count = count + 1
             end
         end
         return count",
        3,
    );
}

#[test]
fn do_block_scoping() {
    assert_int(
        "local x = 1
         do local x = 2 end
         return x",
        1,
    );
    assert_eq!(
        run_one("do local hidden = 5 end return hidden"),
        LuaValue::Nil
    );
}

#[test]
fn while_condition_with_complex_expression() {
    assert_int(
        "local t = {1, 2, 3, 4}
         local i, sum = 1, 0
         while t[i] and t[i] < 4 do sum = sum + t[i] i = i + 1 end
         return sum",
        6,
    );
}
