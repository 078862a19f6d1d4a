use super::{assert_int, assert_str, assert_true, run, run_one};
use crate::lua_value::LuaValue;

#[test]
fn constructor_forms() {
    assert_int("local t = {1, 2, 3} return t[2]", 2);
    assert_int("local t = {x = 5} return t.x", 5);
    assert_int("local t = {[2 + 2] = 'four'} return #('four') + (t[4] and 0 or 1)", 4);
    assert_int("local t = {1, 2; 3, x = 9} return t[3] + t.x", 12);
}

#[test]
fn large_constructor_batches() {
    // More array items than one SetList batch holds.
    assert_true(
        "local t = {}
         local src = 'local t = {'
         for i = 1, 120 do src = src .. i .. ',' end
         src = src .. '} return t'
         local f = assert(load(src))
         t = f()
         return #t == 120 and t[1] == 1 and t[60] == 60 and t[120] == 120",
    );
}

#[test]
fn nil_assignment_removes_keys() {
    assert_true(
        "local t = {a = 1, b = 2}
         t.a = nil
         local count = 0
         for _ in pairs(t) do count = count + 1 end
         return t.a == nil and count == 1",
    );
    assert_true("local t = {1, 2, 3} t[3] = nil return #t == 2 and t[3] == nil");
}

#[test]
fn border_property() {
    // #t is a border: t[#t] ~= nil (or #t == 0) and t[#t + 1] == nil.
    for source in [
        "local t = {} return #t, t",
        "local t = {1, 2, 3} return #t, t",
        "local t = {1, 2, 3, nil} return #t, t",
        "local t = {} t[1] = 'a' t[2] = 'b' return #t, t",
    ] {
        let values = run(source);
        let n = values[0].as_integer().expect("border is an integer");
        let table = values[1].as_table().expect("second result is the table");
        if n == 0 {
            assert!(table.borrow().raw_get_int(1).is_nil());
        } else {
            assert!(!table.borrow().raw_get_int(n).is_nil());
            assert!(table.borrow().raw_get_int(n + 1).is_nil());
        }
    }
}

#[test]
fn tables_compare_by_reference() {
    assert_true("local a = {} local b = {} return a ~= b");
    assert_true("local a = {} local b = a return a == b");
}

#[test]
fn next_walks_all_pairs() {
    assert_int(
        "local t = {10, 20, x = 30, y = 40}
         local sum = 0
         local k, v = next(t)
         while k do sum = sum + v k, v = next(t, k) end
         return sum",
        100,
    );
    assert_true("return next({}) == nil");
}

#[test]
fn table_insert_and_remove() {
    assert_true(
        "local t = {1, 2, 3}
         table.insert(t, 4)
         assert(#t == 4 and t[4] == 4)
         table.insert(t, 1, 0)
         assert(t[1] == 0 and t[5] == 4)
         local removed = table.remove(t, 1)
         assert(removed == 0 and t[1] == 1)
         local last = table.remove(t)
         return last == 4 and #t == 3",
    );
}

#[test]
fn table_concat() {
    assert_str("return table.concat({1, 2, 3})", "123");
    assert_str("return table.concat({'a', 'b', 'c'}, '-')", "a-b-c");
    assert_str("return table.concat({'a', 'b', 'c'}, ',', 2, 3)", "b,c");
    assert_str("return table.concat({})", "");
}

#[test]
fn table_pack_and_unpack() {
    assert_true(
        "local t = table.pack(1, 2, 3)
         return t.n == 3 and t[1] == 1 and t[3] == 3",
    );
    let values = run("return table.unpack({4, 5, 6})");
    assert_eq!(
        values,
        vec![
            LuaValue::Integer(4),
            LuaValue::Integer(5),
            LuaValue::Integer(6)
        ]
    );
    assert_int("return (table.unpack({4, 5, 6}, 2, 2))", 5);
}

#[test]
fn table_sort_default_and_custom() {
    assert_str(
        "local t = {3, 1, 2}
         table.sort(t)
         return table.concat(t)",
        "123",
    );
    assert_str(
        "local t = {1, 3, 2}
         table.sort(t, function(a, b) return a > b end)
         return table.concat(t)",
        "321",
    );
    assert_str(
        "local t = {'banana', 'apple', 'cherry'}
         table.sort(t)
         return t[1]",
        "apple",
    );
}

#[test]
fn table_move() {
    assert_str(
        "local t = {1, 2, 3, 4, 5}
         table.move(t, 1, 3, 3)
         return table.concat(t)",
        "12123",
    );
    assert_str(
        "local a = {1, 2, 3}
         local b = {0, 0, 0, 0}
         table.move(a, 1, 3, 2, b)
         return table.concat(b)",
        "0123",
    );
}

#[test]
fn float_keys_alias_integer_keys() {
    assert_int("local t = {} t[2.0] = 7 return t[2]", 7);
    assert_true("local t = {} t[1] = 'x' return t[1.0] == 'x'");
}

#[test]
fn nan_and_nil_keys_are_rejected() {
    assert_true(
        "local t = {}
         local ok = pcall(function() t[0/0] = 1 end)
         return ok == false",
    );
    assert_true(
        "local t = {}
         local ok, err = pcall(function() t[nil] = 1 end)
         return ok == false and err:find('nil') ~= nil",
    );
}

#[test]
fn sparse_tables_use_hash_part() {
    assert_int("local t = {} t[1000000] = 42 return t[1000000]", 42);
    assert_true("local t = {} t[1000000] = 42 return #t == 0");
}

#[test]
fn nested_tables() {
    assert_int(
        "local t = {a = {b = {c = 42}}}
         return t.a.b.c",
        42,
    );
    assert_eq!(
        run_one("local t = {a = {}} return t.a.missing"),
        LuaValue::Nil
    );
}
