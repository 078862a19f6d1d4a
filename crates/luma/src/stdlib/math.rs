// Math library
// pi, huge, maxinteger, mininteger, abs, ceil, floor, sqrt, sin, cos, tan,
// exp, log, pow, min, max, fmod, modf, tointeger, type, random, randomseed

use crate::lib_registry::{LibraryModule, arg_count, get_arg, get_args, require_arg};
use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaVM};
use rand::{Rng, RngCore, SeedableRng};

pub fn create_math_lib() -> LibraryModule {
    crate::lib_module!("math", {
        "abs" => math_abs,
        "ceil" => math_ceil,
        "floor" => math_floor,
        "sqrt" => math_sqrt,
        "sin" => math_sin,
        "cos" => math_cos,
        "tan" => math_tan,
        "exp" => math_exp,
        "log" => math_log,
        "pow" => math_pow,
        "min" => math_min,
        "max" => math_max,
        "fmod" => math_fmod,
        "modf" => math_modf,
        "tointeger" => math_tointeger,
        "type" => math_type,
        "random" => math_random,
        "randomseed" => math_randomseed,
    })
}

/// Constants are plain table fields; installed after the functions.
pub fn install_constants(vm: &mut LuaVM) {
    if let Some(math) = vm.get_global("math").as_table() {
        let mut t = math.borrow_mut();
        t.raw_set_str("pi", LuaValue::Float(std::f64::consts::PI));
        t.raw_set_str("huge", LuaValue::Float(f64::INFINITY));
        t.raw_set_str("maxinteger", LuaValue::Integer(i64::MAX));
        t.raw_set_str("mininteger", LuaValue::Integer(i64::MIN));
    }
}

fn checknumber(vm: &mut LuaVM, n: usize, fname: &str) -> LuaResult<f64> {
    let Some(v) = get_arg(vm, n) else {
        return Err(vm.error(format!(
            "bad argument #{} to '{}' (number expected, got no value)",
            n + 1,
            fname
        )));
    };
    if let Some(f) = v.as_float() {
        return Ok(f);
    }
    if let Some(s) = v.as_str() {
        if let Some(num) = crate::lua_vm::arith::str_to_number(s) {
            if let Some(f) = num.as_float() {
                return Ok(f);
            }
        }
    }
    Err(vm.error(format!(
        "bad argument #{} to '{}' (number expected, got {})",
        n + 1,
        fname,
        v.type_name()
    )))
}

fn math_abs(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "abs")?;
    let result = match value {
        LuaValue::Integer(i) => LuaValue::Integer(i.wrapping_abs()),
        _ => LuaValue::Float(checknumber(vm, 0, "abs")?.abs()),
    };
    Ok(MultiValue::single(result))
}

/// ceil/floor return integers when the result fits, as in Lua 5.3.
fn math_ceil(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "ceil")?;
    if let LuaValue::Integer(i) = value {
        return Ok(MultiValue::single(LuaValue::Integer(i)));
    }
    let f = checknumber(vm, 0, "ceil")?.ceil();
    Ok(MultiValue::single(float_result_to_integer(f)))
}

fn math_floor(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = require_arg(vm, 0, "floor")?;
    if let LuaValue::Integer(i) = value {
        return Ok(MultiValue::single(LuaValue::Integer(i)));
    }
    let f = checknumber(vm, 0, "floor")?.floor();
    Ok(MultiValue::single(float_result_to_integer(f)))
}

fn float_result_to_integer(f: f64) -> LuaValue {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        LuaValue::Integer(f as i64)
    } else {
        LuaValue::Float(f)
    }
}

macro_rules! float_fn {
    ($name:ident, $fname:literal, $op:expr) => {
        fn $name(vm: &mut LuaVM) -> LuaResult<MultiValue> {
            let x = checknumber(vm, 0, $fname)?;
            Ok(MultiValue::single(LuaValue::Float(($op)(x))))
        }
    };
}

float_fn!(math_sqrt, "sqrt", |x: f64| x.sqrt());
float_fn!(math_sin, "sin", |x: f64| x.sin());
float_fn!(math_cos, "cos", |x: f64| x.cos());
float_fn!(math_tan, "tan", |x: f64| x.tan());
float_fn!(math_exp, "exp", |x: f64| x.exp());

fn math_log(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let x = checknumber(vm, 0, "log")?;
    let result = match get_arg(vm, 1) {
        None => x.ln(),
        Some(_) => {
            let base = checknumber(vm, 1, "log")?;
            if base == 2.0 {
                x.log2()
            } else if base == 10.0 {
                x.log10()
            } else {
                x.ln() / base.ln()
            }
        }
    };
    Ok(MultiValue::single(LuaValue::Float(result)))
}

fn math_pow(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let x = checknumber(vm, 0, "pow")?;
    let y = checknumber(vm, 1, "pow")?;
    Ok(MultiValue::single(LuaValue::Float(x.powf(y))))
}

fn math_min(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    min_max(vm, "min", true)
}

fn math_max(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    min_max(vm, "max", false)
}

fn min_max(vm: &mut LuaVM, fname: &str, want_min: bool) -> LuaResult<MultiValue> {
    if arg_count(vm) == 0 {
        return Err(vm.error(format!(
            "bad argument #1 to '{}' (number expected, got no value)",
            fname
        )));
    }
    let args = get_args(vm);
    let mut best = args[0].clone();
    for (i, candidate) in args.iter().enumerate().skip(1) {
        if !candidate.is_number() {
            return Err(vm.error(format!(
                "bad argument #{} to '{}' (number expected, got {})",
                i + 1,
                fname,
                candidate.type_name()
            )));
        }
        let a = candidate.as_float().unwrap_or(f64::NAN);
        let b = best.as_float().unwrap_or(f64::NAN);
        if (want_min && a < b) || (!want_min && a > b) {
            best = candidate.clone();
        }
    }
    if !best.is_number() {
        return Err(vm.error(format!(
            "bad argument #1 to '{}' (number expected, got {})",
            fname,
            best.type_name()
        )));
    }
    Ok(MultiValue::single(best))
}

fn math_fmod(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let a = require_arg(vm, 0, "fmod")?;
    let b = require_arg(vm, 1, "fmod")?;
    if let (LuaValue::Integer(x), LuaValue::Integer(y)) = (&a, &b) {
        if *y == 0 {
            return Err(vm.error("bad argument #2 to 'fmod' (zero)"));
        }
        return Ok(MultiValue::single(LuaValue::Integer(x.wrapping_rem(*y))));
    }
    let x = checknumber(vm, 0, "fmod")?;
    let y = checknumber(vm, 1, "fmod")?;
    Ok(MultiValue::single(LuaValue::Float(x % y)))
}

/// modf -> integral part (float), fractional part.
fn math_modf(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let x = checknumber(vm, 0, "modf")?;
    let int_part = x.trunc();
    let frac = if x.is_infinite() { 0.0 } else { x - int_part };
    Ok(MultiValue::multiple(vec![
        LuaValue::Float(int_part),
        LuaValue::Float(frac),
    ]))
}

fn math_tointeger(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = get_arg(vm, 0).unwrap_or(LuaValue::Nil);
    let result = match &value {
        LuaValue::Integer(i) => LuaValue::Integer(*i),
        LuaValue::Float(f) if f.fract() == 0.0 && f.is_finite() => LuaValue::Integer(*f as i64),
        _ => LuaValue::Nil,
    };
    Ok(MultiValue::single(result))
}

/// math.type: "integer", "float", or nil for non-numbers.
fn math_type(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let value = get_arg(vm, 0).unwrap_or(LuaValue::Nil);
    let result = match value {
        LuaValue::Integer(_) => LuaValue::str("integer"),
        LuaValue::Float(_) => LuaValue::str("float"),
        _ => LuaValue::Nil,
    };
    Ok(MultiValue::single(result))
}

fn math_random(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    match arg_count(vm) {
        0 => {
            let r: f64 = vm.rng.r#gen();
            Ok(MultiValue::single(LuaValue::Float(r)))
        }
        1 => {
            let upper = require_arg(vm, 0, "random")?
                .as_integer()
                .ok_or_else(|| vm.error("bad argument #1 to 'random' (number expected)"))?;
            if upper < 1 {
                return Err(vm.error("bad argument #1 to 'random' (interval is empty)"));
            }
            let r = vm.rng.gen_range(1..=upper);
            Ok(MultiValue::single(LuaValue::Integer(r)))
        }
        _ => {
            let low = require_arg(vm, 0, "random")?
                .as_integer()
                .ok_or_else(|| vm.error("bad argument #1 to 'random' (number expected)"))?;
            let upper = require_arg(vm, 1, "random")?
                .as_integer()
                .ok_or_else(|| vm.error("bad argument #2 to 'random' (number expected)"))?;
            if low > upper {
                return Err(vm.error("bad argument #2 to 'random' (interval is empty)"));
            }
            let r = vm.rng.gen_range(low..=upper);
            Ok(MultiValue::single(LuaValue::Integer(r)))
        }
    }
}

fn math_randomseed(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let seed = match get_arg(vm, 0) {
        Some(v) if !v.is_nil() => v
            .as_float()
            .ok_or_else(|| vm.error("bad argument #1 to 'randomseed' (number expected)"))?
            .to_bits(),
        _ => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    };
    vm.rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let _ = vm.rng.next_u32();
    Ok(MultiValue::empty())
}
