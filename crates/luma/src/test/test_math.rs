use super::{assert_int, assert_str, assert_true, run_one};
use crate::lua_value::LuaValue;

#[test]
fn constants() {
    assert_true("return math.pi > 3.14 and math.pi < 3.15");
    assert_true("return math.huge > 1e308");
    assert_true("return math.maxinteger + 1 == math.mininteger");
    assert_true("return math.mininteger < 0 and math.maxinteger > 0");
}

#[test]
fn math_type_distinguishes_tags() {
    assert_str("return math.type(1)", "integer");
    assert_str("return math.type(1.0)", "float");
    assert_true("return math.type('1') == nil");
    assert_true("return math.type(nil) == nil");
}

#[test]
fn abs_floor_ceil() {
    assert_int("return math.abs(-5)", 5);
    assert_int("return math.abs(5)", 5);
    assert_true("return math.abs(-2.5) == 2.5");
    assert_int("return math.floor(3.7)", 3);
    assert_int("return math.floor(-3.2)", -4);
    assert_int("return math.ceil(3.2)", 4);
    assert_int("return math.ceil(-3.7)", -3);
    // Integer input passes through with its tag.
    assert_str("return math.type(math.floor(3))", "integer");
    assert_str("return math.type(math.floor(3.5))", "integer");
}

#[test]
fn roots_and_trig() {
    assert_true("return math.sqrt(9) == 3.0");
    assert_true("return math.sin(0) == 0.0");
    assert_true("return math.cos(0) == 1.0");
    assert_true("return math.abs(math.tan(0)) < 1e-15");
    assert_true("return math.exp(0) == 1.0");
    assert_true("return math.abs(math.log(math.exp(1)) - 1) < 1e-12");
    assert_true("return math.abs(math.log(8, 2) - 3) < 1e-12");
    assert_true("return math.pow(2, 10) == 1024.0");
}

#[test]
fn min_max() {
    assert_int("return math.min(3, 1, 2)", 1);
    assert_int("return math.max(3, 1, 2)", 3);
    assert_int("return math.min(5)", 5);
    assert_true("return math.max(1, 2.5) == 2.5");
}

#[test]
fn fmod_and_modf() {
    assert_int("return math.fmod(7, 3)", 1);
    assert_int("return math.fmod(-7, 3)", -1);
    let values = super::run("return math.modf(3.7)");
    assert_eq!(values[0], LuaValue::Float(3.0));
    assert!((values[1].as_float().unwrap() - 0.7).abs() < 1e-12);
    assert_true("local i, f = math.modf(-3.25) return i == -3.0 and f == -0.25");
}

#[test]
fn tointeger() {
    assert_int("return math.tointeger(3.0)", 3);
    assert_true("return math.tointeger(3.5) == nil");
    assert_true("return math.tointeger('x') == nil");
    assert_int("return math.tointeger(7)", 7);
}

#[test]
fn random_respects_ranges() {
    assert_true(
        "for _ = 1, 100 do
             local r = math.random(10)
             if r < 1 or r > 10 then return false end
             if math.type(r) ~= 'integer' then return false end
         end
         return true",
    );
    assert_true(
        "for _ = 1, 100 do
             local r = math.random(5, 7)
             if r < 5 or r > 7 then return false end
         end
         return true",
    );
    assert_true(
        "for _ = 1, 100 do
             local r = math.random()
             if r < 0 or r >= 1 then return false end
         end
         return true",
    );
}

#[test]
fn randomseed_makes_sequences_reproducible() {
    assert_true(
        "math.randomseed(42)
         local a = {math.random(1000), math.random(1000), math.random(1000)}
         math.randomseed(42)
         local b = {math.random(1000), math.random(1000), math.random(1000)}
         return a[1] == b[1] and a[2] == b[2] and a[3] == b[3]",
    );
}

#[test]
fn integer_division_by_zero_fails() {
    assert_true("return pcall(function() return 1 // 0 end) == false");
    assert_true("return pcall(function() return 1 % 0 end) == false");
    // Float division by zero is inf/nan, not an error.
    assert_true("return 1 / 0 == math.huge");
    assert_true("return -1 / 0 == -math.huge");
    assert_true("local n = 0 / 0 return n ~= n");
}

#[test]
fn float_formatting_matches_lua() {
    assert_eq!(run_one("return 1e15"), LuaValue::Float(1e15));
    assert_str("return tostring(2.5)", "2.5");
    assert_str("return tostring(1/0)", "inf");
    assert_str("return tostring(-1/0)", "-inf");
}
