use super::{assert_int, assert_str, assert_true, run};
use crate::lua_value::LuaValue;

#[test]
fn case_len_reverse_rep() {
    assert_str("return string.upper('mixed Case')", "MIXED CASE");
    assert_str("return string.lower('MIXED Case')", "mixed case");
    assert_int("return string.len('hello')", 5);
    assert_str("return string.reverse('abc')", "cba");
    assert_str("return string.rep('ab', 3)", "ababab");
    assert_str("return string.rep('a', 3, '-')", "a-a-a");
    assert_str("return string.rep('x', 0)", "");
}

#[test]
fn sub_with_negative_indices() {
    assert_str("return string.sub('hello', 2)", "ello");
    assert_str("return string.sub('hello', 2, 4)", "ell");
    assert_str("return string.sub('hello', -3)", "llo");
    assert_str("return string.sub('hello', -3, -2)", "ll");
    assert_str("return string.sub('hello', 4, 2)", "");
    assert_str("return string.sub('hello', 1, 100)", "hello");
}

#[test]
fn byte_and_char() {
    assert_int("return string.byte('A')", 65);
    let values = run("return string.byte('ABC', 1, 3)");
    assert_eq!(
        values,
        vec![
            LuaValue::Integer(65),
            LuaValue::Integer(66),
            LuaValue::Integer(67)
        ]
    );
    assert_str("return string.char(104, 105)", "hi");
}

#[test]
fn find_plain_and_patterns() {
    let values = run("return string.find('hello world', 'world')");
    assert_eq!(values[0], LuaValue::Integer(7));
    assert_eq!(values[1], LuaValue::Integer(11));

    assert_true("return string.find('abc', 'z') == nil");
    assert_int("return (string.find('abc.def', '.', 1, true))", 4);
    assert_int("return (string.find('x123y', '%d+'))", 2);
    assert_int("return (string.find('aXa', '%u', 2))", 2);
}

#[test]
fn match_returns_captures() {
    assert_str("return string.match('key=value', '(%w+)=')", "key");
    let values = run("return string.match('2026-08-01', '(%d+)-(%d+)-(%d+)')");
    assert_eq!(values[0].as_str(), Some("2026"));
    assert_eq!(values[1].as_str(), Some("08"));
    assert_eq!(values[2].as_str(), Some("01"));
    assert_str("return string.match('hello', 'h.l') or 'no'", "hel");
    assert_true("return string.match('abc', '%d') == nil");
}

#[test]
fn gmatch_iterates() {
    assert_str(
        "local out = {}
         for word in string.gmatch('one two three', '%a+') do
             out[#out + 1] = word
         end
         return table.concat(out, ',')",
        "one,two,three",
    );
    assert_int(
        "local sum = 0
         for d in ('1 22 333'):gmatch('%d+') do sum = sum + tonumber(d) end
         return sum",
        356,
    );
    assert_str(
        "local pairs_found = {}
         for k, v in string.gmatch('a=1, b=2', '(%w+)=(%w+)') do
             pairs_found[#pairs_found + 1] = k .. v
         end
         return table.concat(pairs_found, ';')",
        "a1;b2",
    );
}

#[test]
fn gsub_with_string_replacement() {
    let values = run("return string.gsub('hello world', 'o', '0')");
    assert_eq!(values[0].as_str(), Some("hell0 w0rld"));
    assert_eq!(values[1], LuaValue::Integer(2));

    assert_str("return (string.gsub('abc', 'b', '[%0]'))", "a[b]c");
    assert_str("return (string.gsub('key=val', '(%w+)=(%w+)', '%2=%1'))", "val=key");
    assert_str("return (string.gsub('aaa', 'a', 'b', 2))", "bba");
}

#[test]
fn gsub_with_table_and_function() {
    assert_str(
        "return (string.gsub('$name is $age', '%$(%w+)', {name = 'lua', age = '30'}))",
        "lua is 30",
    );
    assert_str(
        "return (string.gsub('abc', '%a', function(c) return c:upper() end))",
        "ABC",
    );
    // A false/nil replacement keeps the original text.
    assert_str(
        "return (string.gsub('ab', '%a', function(c)
             if c == 'a' then return 'A' end
         end))",
        "Ab",
    );
}

#[test]
fn format_directives() {
    assert_str("return string.format('%d items', 3)", "3 items");
    assert_str("return string.format('%5d', 42)", "   42");
    assert_str("return string.format('%-5d|', 42)", "42   |");
    assert_str("return string.format('%05d', 42)", "00042");
    assert_str("return string.format('%x', 255)", "ff");
    assert_str("return string.format('%X', 255)", "FF");
    assert_str("return string.format('%o', 8)", "10");
    assert_str("return string.format('%.2f', 3.14159)", "3.14");
    assert_str("return string.format('%s=%s', 'k', 'v')", "k=v");
    assert_str("return string.format('100%%', 1)", "100%");
    assert_str("return string.format('%c', 65)", "A");
    assert_str("return string.format('%.3s', 'abcdef')", "abc");
}

#[test]
fn format_q_is_readable_back() {
    assert_true(
        "local quoted = string.format('%q', 'he said \"hi\"\\n')
         local f = assert(load('return ' .. quoted))
         return f() == 'he said \"hi\"\\n'",
    );
}

#[test]
fn string_methods_via_colon_syntax() {
    assert_str("return ('hi'):rep(2)", "hihi");
    assert_int("return (('hello'):find('ll'))", 3);
    assert_str("local s = 'a,b,c' return (s:gsub(',', ' '))", "a b c");
}

#[test]
fn anchored_patterns() {
    assert_str("return string.match('hello', '^h%a+$')", "hello");
    assert_true("return string.match('say hello', '^hello') == nil");
}
