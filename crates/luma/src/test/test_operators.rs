use super::{assert_int, assert_str, assert_true, run_one};
use crate::lua_value::LuaValue;

#[test]
fn integer_arithmetic_stays_integer() {
    assert_int("return 2 + 3", 5);
    assert_int("return 2 * 3 - 1", 5);
    assert_int("return 7 // 2", 3);
    assert_int("return -7 // 2", -4);
    assert_int("return 7 % 3", 1);
    assert_int("return -7 % 3", 2);
    assert_int("return 7 % -3", -2);
}

#[test]
fn division_and_power_are_float() {
    assert_eq!(run_one("return 4 / 2"), LuaValue::Float(2.0));
    assert_eq!(run_one("return 2 ^ 3"), LuaValue::Float(8.0));
    assert_true("return math.type(4 / 2) == 'float'");
    assert_true("return math.type(2 ^ 2) == 'float'");
}

#[test]
fn mixed_arithmetic_promotes() {
    assert_eq!(run_one("return 1 + 0.5"), LuaValue::Float(1.5));
    assert_true("return math.type(1 + 1.0) == 'float'");
    assert_true("return 1 == 1.0");
}

#[test]
fn integer_overflow_wraps() {
    assert_true("return math.maxinteger + 1 == math.mininteger");
    assert_true("return math.mininteger - 1 == math.maxinteger");
    assert_true("return math.maxinteger * 2 == -2");
}

#[test]
fn string_coercion_in_arithmetic() {
    assert_int("return '10' + 5", 15);
    assert_int("return '3' * '4'", 12);
    assert_eq!(run_one("return '1.5' + 0.5"), LuaValue::Float(2.0));
}

#[test]
fn power_associativity() {
    // 2^3^2 == 2^(3^2)
    assert_eq!(run_one("return 2^3^2"), LuaValue::Float(512.0));
    assert_eq!(run_one("return 2^3*4"), LuaValue::Float(32.0));
    assert_true("return 2.0^-2 == 1/4");
}

#[test]
fn unary_minus_precedence() {
    assert_eq!(run_one("return -2^2"), LuaValue::Float(-4.0));
    assert_eq!(run_one("return (-2)^2"), LuaValue::Float(4.0));
    assert_int("return -2 * 3", -6);
}

#[test]
fn concat_precedence_against_shift() {
    assert_int(r#"return "7" .. 3 << 1"#, 146);
}

#[test]
fn concat_builds_strings() {
    assert_str("return 'a' .. 'b' .. 'c'", "abc");
    assert_str("return 'n=' .. 42", "n=42");
    assert_str("return 1 .. 2", "12");
    assert_str("return 'pi=' .. 0.5", "pi=0.5");
}

#[test]
fn comparison_operators() {
    assert_true("return 1 < 2");
    assert_true("return 2 <= 2");
    assert_true("return 3 > 2");
    assert_true("return 'a' < 'b'");
    assert_true("return 'abc' < 'abd'");
    assert_true("return 1 ~= 2");
    assert_true("return not (1 == 2)");
    assert_true("return 1 < 1.5");
}

#[test]
fn logical_short_circuit() {
    assert_int("return false or 5", 5);
    assert_int("return nil and error('never') or 3", 3);
    assert_true("return (1 and 2) == 2");
    assert_true("return (nil and 2) == nil");
    assert_true("return (false or nil) == nil");
    // rhs must not evaluate when short-circuited
    assert_true("local n = 0 local f = function() n = n + 1 return true end local _ = true or f() return n == 0");
}

#[test]
fn bitwise_operators() {
    assert_int("return 0xF0 | 0x0F", 255);
    assert_int("return 0xFF & 0x0F", 15);
    assert_int("return 0xFF ~ 0x0F", 0xF0);
    assert_int("return 1 << 4", 16);
    assert_int("return 256 >> 4", 16);
    assert_int("return ~0", -1);
    assert_int("return 1 << 64", 0);
    assert_int("return -1 >> 1", i64::MAX);
}

#[test]
fn length_operator() {
    assert_int("return #'hello'", 5);
    assert_int("return #''", 0);
    assert_int("return #{1, 2, 3}", 3);
    assert_int("return #{}", 0);
}

#[test]
fn truthiness_rules() {
    assert_true("return not nil");
    assert_true("return not false");
    assert_true("return not not 0");
    assert_true("return not not ''");
}
