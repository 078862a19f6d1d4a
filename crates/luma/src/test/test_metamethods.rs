use super::{assert_int, assert_str, assert_true, run};

#[test]
fn index_function_receives_table_and_key() {
    let values = run(
        "local t = {}
         setmetatable(t, {__index = function(_, k) return k .. '!' end})
         return t.hello, t.world",
    );
    assert_eq!(values[0].as_str(), Some("hello!"));
    assert_eq!(values[1].as_str(), Some("world!"));
}

#[test]
fn index_table_chain() {
    assert_int(
        "local base = {x = 10}
         local mid = setmetatable({}, {__index = base})
         local leaf = setmetatable({}, {__index = mid})
         return leaf.x",
        10,
    );
}

#[test]
fn index_only_fires_on_missing_keys() {
    assert_int(
        "local t = setmetatable({present = 1}, {__index = function() return 99 end})
         return t.present",
        1,
    );
}

#[test]
fn newindex_function_intercepts_fresh_keys() {
    assert_true(
        "local log = {}
         local t = setmetatable({}, {
             __newindex = function(t, k, v) rawset(t, k, v * 2) log[#log + 1] = k end,
         })
         t.a = 21
         assert(t.a == 42)
         t.a = 10  -- key now present: raw assignment, no metamethod
         assert(t.a == 10)
         return #log == 1",
    );
}

#[test]
fn newindex_table_redirects() {
    assert_true(
        "local store = {}
         local t = setmetatable({}, {__newindex = store})
         t.x = 5
         return rawget(t, 'x') == nil and store.x == 5",
    );
}

#[test]
fn call_metamethod() {
    assert_int(
        "local callable = setmetatable({}, {
             __call = function(self, a, b) return a + b end,
         })
         return callable(19, 23)",
        42,
    );
}

#[test]
fn tostring_metamethod() {
    assert_str(
        "local t = setmetatable({}, {__tostring = function() return 'custom!' end})
         return tostring(t)",
        "custom!",
    );
}

#[test]
fn default_tostring_names_the_type() {
    assert_true("return tostring({}):find('table') == 1");
    assert_true("return tostring(print):find('function') == 1");
}

#[test]
fn metatable_protection() {
    // __metatable hides the real metatable and blocks replacement.
    assert_str(
        "local t = setmetatable({}, {__metatable = 'locked'})
         return getmetatable(t)",
        "locked",
    );
    assert_true(
        "local t = setmetatable({}, {__metatable = 'locked'})
         local ok, err = pcall(setmetatable, t, {})
         return ok == false and err:find('protected') ~= nil",
    );
}

#[test]
fn getmetatable_returns_the_table_when_unprotected() {
    assert_true(
        "local mt = {}
         local t = setmetatable({}, mt)
         return getmetatable(t) == mt",
    );
}

#[test]
fn len_metamethod() {
    assert_int(
        "local t = setmetatable({}, {__len = function() return 77 end})
         return #t",
        77,
    );
}

#[test]
fn eq_metamethod() {
    assert_true(
        "local mt = {__eq = function(a, b) return a.id == b.id end}
         local a = setmetatable({id = 1}, mt)
         local b = setmetatable({id = 1}, mt)
         local c = setmetatable({id = 2}, mt)
         return a == b and a ~= c",
    );
}

#[test]
fn comparison_metamethods() {
    assert_true(
        "local mt = {__lt = function(a, b) return a.v < b.v end,
                     __le = function(a, b) return a.v <= b.v end}
         local a = setmetatable({v = 1}, mt)
         local b = setmetatable({v = 2}, mt)
         return a < b and a <= b and b > a and not (b <= a)",
    );
}

#[test]
fn arithmetic_metamethods() {
    assert_int(
        "local mt = {__add = function(a, b) return a.v + b.v end,
                     __mul = function(a, b) return a.v * b.v end}
         local a = setmetatable({v = 6}, mt)
         local b = setmetatable({v = 7}, mt)
         return a + b + (a * b)",
        55,
    );
    assert_int(
        "local mt = {__unm = function(a) return -a.v end}
         local a = setmetatable({v = 5}, mt)
         return -a",
        -5,
    );
}

#[test]
fn concat_metamethod() {
    assert_str(
        "local mt = {__concat = function(a, b)
             local av = type(a) == 'table' and a.v or a
             local bv = type(b) == 'table' and b.v or b
             return av .. bv
         end}
         local t = setmetatable({v = 'mid'}, mt)
         return 'pre-' .. t .. '-post'",
        "pre-mid-post",
    );
}

#[test]
fn string_indexing_through_string_metatable() {
    assert_str("return ('hello'):upper()", "HELLO");
    assert_int("local s = 'abc' return s:len()", 3);
    assert_str("return (('a,b'):gsub(',', ';'))", "a;b");
}

#[test]
fn rawget_rawset_bypass_metamethods() {
    assert_true(
        "local t = setmetatable({}, {
             __index = function() return 'virtual' end,
             __newindex = function() error('blocked') end,
         })
         rawset(t, 'k', 1)
         return rawget(t, 'k') == 1 and rawget(t, 'missing') == nil and t.missing == 'virtual'",
    );
}
