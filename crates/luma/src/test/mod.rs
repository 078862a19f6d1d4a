// Test module organization
pub mod test_basic;
pub mod test_closures;
pub mod test_control_flow;
pub mod test_errors;
pub mod test_functions;
pub mod test_host_api;
pub mod test_math;
pub mod test_metamethods;
pub mod test_operators;
pub mod test_strings;
pub mod test_tables;

use crate::lua_value::LuaValue;

/// Run a chunk on a fresh unsandboxed VM and return its results.
pub fn run(source: &str) -> Vec<LuaValue> {
    match crate::execute(source) {
        Ok(values) => values,
        Err(e) => panic!("execution failed: {}\nsource:\n{}", e, source),
    }
}

/// Run a chunk expected to return exactly one value.
pub fn run_one(source: &str) -> LuaValue {
    let mut values = run(source);
    assert!(
        values.len() == 1,
        "expected one result, got {:?} for:\n{}",
        values,
        source
    );
    values.remove(0)
}

pub fn assert_true(source: &str) {
    assert_eq!(run_one(source), LuaValue::Boolean(true), "for:\n{}", source);
}

pub fn assert_int(source: &str, expected: i64) {
    assert_eq!(
        run_one(source),
        LuaValue::Integer(expected),
        "for:\n{}",
        source
    );
}

pub fn assert_str(source: &str, expected: &str) {
    let value = run_one(source);
    assert_eq!(value.as_str(), Some(expected), "for:\n{}", source);
}
