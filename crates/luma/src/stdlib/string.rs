// String library
// lower, upper, len, sub, find, match, gmatch, gsub, format, rep, reverse,
// byte, char. Pattern functions ride on lua_pattern; indices are 1-based
// bytes with negative-from-the-end handling.

use crate::lib_registry::{LibraryModule, get_arg, get_args, require_arg};
use crate::lua_pattern::{Capture, MatchResult, first_match};
use crate::lua_value::{LuaValue, MultiValue, float_to_lua_string};
use crate::lua_vm::{LuaResult, LuaVM};
use std::cell::RefCell;
use std::rc::Rc;

pub fn create_string_lib() -> LibraryModule {
    crate::lib_module!("string", {
        "lower" => str_lower,
        "upper" => str_upper,
        "len" => str_len,
        "sub" => str_sub,
        "find" => str_find,
        "match" => str_match,
        "gmatch" => str_gmatch,
        "gsub" => str_gsub,
        "format" => str_format,
        "rep" => str_rep,
        "reverse" => str_reverse,
        "byte" => str_byte,
        "char" => str_char,
    })
}

fn check_string(vm: &LuaVM, index: usize, func: &str) -> LuaResult<String> {
    match get_arg(vm, index) {
        Some(LuaValue::String(s)) => Ok(s.as_str().to_string()),
        Some(LuaValue::Integer(i)) => Ok(i.to_string()),
        Some(LuaValue::Float(f)) => Ok(float_to_lua_string(f)),
        other => Err(vm.error(format!(
            "bad argument #{} to '{}' (string expected, got {})",
            index + 1,
            func,
            other.map(|v| v.type_name()).unwrap_or("no value")
        ))),
    }
}

/// Lua's relative position rule: negative counts back from the end.
fn rel_index(pos: i64, len: usize) -> i64 {
    if pos >= 0 { pos } else { len as i64 + pos + 1 }
}

fn str_lower(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "lower")?;
    let result = vm.create_string_value(s.to_ascii_lowercase());
    Ok(MultiValue::single(result))
}

fn str_upper(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "upper")?;
    let result = vm.create_string_value(s.to_ascii_uppercase());
    Ok(MultiValue::single(result))
}

fn str_len(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "len")?;
    Ok(MultiValue::single(LuaValue::Integer(s.len() as i64)))
}

fn str_sub(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "sub")?;
    let len = s.len();
    let i = get_arg(vm, 1).and_then(|v| v.as_integer()).unwrap_or(1);
    let j = get_arg(vm, 2).and_then(|v| v.as_integer()).unwrap_or(-1);

    let start = rel_index(i, len).max(1) as usize;
    let end = rel_index(j, len).min(len as i64);
    let result = if end < start as i64 {
        String::new()
    } else {
        String::from_utf8_lossy(&s.as_bytes()[start - 1..end as usize]).into_owned()
    };
    let value = vm.create_string_value(result);
    Ok(MultiValue::single(value))
}

fn str_rep(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "rep")?;
    let n = get_arg(vm, 1).and_then(|v| v.as_integer()).unwrap_or(0);
    let sep = get_arg(vm, 2)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default();

    let result = if n <= 0 {
        String::new()
    } else {
        let mut out = String::with_capacity(s.len() * n as usize);
        for i in 0..n {
            if i > 0 {
                out.push_str(&sep);
            }
            out.push_str(&s);
        }
        out
    };
    let value = vm.create_string_value(result);
    Ok(MultiValue::single(value))
}

fn str_reverse(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "reverse")?;
    let result = vm.create_string_value(s.chars().rev().collect());
    Ok(MultiValue::single(result))
}

fn str_byte(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "byte")?;
    let len = s.len();
    let i = get_arg(vm, 1).and_then(|v| v.as_integer()).unwrap_or(1);
    let j = get_arg(vm, 2).and_then(|v| v.as_integer()).unwrap_or(i);

    let start = rel_index(i, len).max(1) as usize;
    let end = rel_index(j, len).min(len as i64);
    let mut out = Vec::new();
    if end >= start as i64 {
        for &b in &s.as_bytes()[start - 1..end as usize] {
            out.push(LuaValue::Integer(b as i64));
        }
    }
    Ok(MultiValue::multiple(out))
}

fn str_char(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let args = get_args(vm);
    let mut out = String::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let code = arg
            .as_integer()
            .filter(|c| (0..=255).contains(c))
            .ok_or_else(|| {
                vm.error(format!("bad argument #{} to 'char' (value out of range)", i + 1))
            })?;
        out.push(char::from_u32(code as u32).unwrap_or('\u{fffd}'));
    }
    let result = vm.create_string_value(out);
    Ok(MultiValue::single(result))
}

// ---- pattern functions ----------------------------------------------------

/// Captures of a finished match, or the whole match when there are none.
fn capture_values(vm: &mut LuaVM, src: &[u8], m: &MatchResult) -> Vec<LuaValue> {
    if m.captures.is_empty() {
        vec![vm.create_string_value(String::from_utf8_lossy(&src[m.start..m.end]).into_owned())]
    } else {
        m.captures
            .iter()
            .map(|cap| match cap {
                Capture::Span { start, end } => vm.create_string_value(
                    String::from_utf8_lossy(&src[*start..*end]).into_owned(),
                ),
                Capture::Position(p) => LuaValue::Integer(*p as i64),
            })
            .collect()
    }
}

fn find_init(vm: &LuaVM, index: usize, len: usize) -> LuaResult<usize> {
    let init = get_arg(vm, index).and_then(|v| v.as_integer()).unwrap_or(1);
    let pos = rel_index(init, len).max(1);
    Ok((pos - 1) as usize)
}

fn str_find(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "find")?;
    let pattern = check_string(vm, 1, "find")?;
    let init = find_init(vm, 2, s.len())?;
    let plain = get_arg(vm, 3).map(|v| v.is_truthy()).unwrap_or(false);

    if init > s.len() {
        return Ok(MultiValue::single(LuaValue::Nil));
    }

    if plain {
        let found = s.as_bytes()[init..]
            .windows(pattern.len().max(1))
            .position(|w| w == pattern.as_bytes());
        return Ok(match found {
            Some(offset) if !pattern.is_empty() => MultiValue::multiple(vec![
                LuaValue::Integer((init + offset + 1) as i64),
                LuaValue::Integer((init + offset + pattern.len()) as i64),
            ]),
            _ if pattern.is_empty() => MultiValue::multiple(vec![
                LuaValue::Integer((init + 1) as i64),
                LuaValue::Integer(init as i64),
            ]),
            _ => MultiValue::single(LuaValue::Nil),
        });
    }

    match first_match(s.as_bytes(), pattern.as_bytes(), init)
        .map_err(|e| vm.error(e.to_string()))?
    {
        None => Ok(MultiValue::single(LuaValue::Nil)),
        Some(m) => {
            let mut out = vec![
                LuaValue::Integer((m.start + 1) as i64),
                LuaValue::Integer(m.end as i64),
            ];
            if !m.captures.is_empty() {
                out.extend(capture_values(vm, s.as_bytes(), &m));
            }
            Ok(MultiValue::multiple(out))
        }
    }
}

fn str_match(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "match")?;
    let pattern = check_string(vm, 1, "match")?;
    let init = find_init(vm, 2, s.len())?;

    match first_match(s.as_bytes(), pattern.as_bytes(), init)
        .map_err(|e| vm.error(e.to_string()))?
    {
        None => Ok(MultiValue::single(LuaValue::Nil)),
        Some(m) => Ok(MultiValue::multiple(capture_values(vm, s.as_bytes(), &m))),
    }
}

/// gmatch returns a stateful iterator closure over the subject.
fn str_gmatch(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "gmatch")?;
    let pattern = check_string(vm, 1, "gmatch")?;
    let pos = Rc::new(RefCell::new(0usize));

    let iter = vm.create_callback("gmatch iterator", move |vm| {
        let start = *pos.borrow();
        if start > s.len() {
            return Ok(MultiValue::single(LuaValue::Nil));
        }
        match first_match(s.as_bytes(), pattern.as_bytes(), start)
            .map_err(|e| vm.error(e.to_string()))?
        {
            None => {
                *pos.borrow_mut() = s.len() + 1;
                Ok(MultiValue::single(LuaValue::Nil))
            }
            Some(m) => {
                *pos.borrow_mut() = if m.end > m.start { m.end } else { m.end + 1 };
                Ok(MultiValue::multiple(capture_values(vm, s.as_bytes(), &m)))
            }
        }
    });
    Ok(MultiValue::single(iter))
}

fn str_gsub(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let s = check_string(vm, 0, "gsub")?;
    let pattern = check_string(vm, 1, "gsub")?;
    let repl = require_arg(vm, 2, "gsub")?;
    let max = get_arg(vm, 3)
        .and_then(|v| v.as_integer())
        .unwrap_or(i64::MAX);

    let src = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(src.len());
    let mut pos = 0usize;
    let mut count: i64 = 0;

    while count < max && pos <= src.len() {
        let m = match first_match(src, pattern.as_bytes(), pos)
            .map_err(|e| vm.error(e.to_string()))?
        {
            None => break,
            Some(m) => m,
        };
        out.extend_from_slice(&src[pos..m.start]);
        count += 1;

        let whole = String::from_utf8_lossy(&src[m.start..m.end]).into_owned();
        let replacement = apply_replacement(vm, &repl, src, &m, &whole)?;
        match replacement {
            Some(text) => out.extend_from_slice(text.as_bytes()),
            None => out.extend_from_slice(&src[m.start..m.end]),
        }

        if m.end > m.start {
            pos = m.end;
        } else {
            // Empty match: copy one byte and move on.
            if m.end < src.len() {
                out.push(src[m.end]);
            }
            pos = m.end + 1;
        }
    }
    if pos <= src.len() {
        out.extend_from_slice(&src[pos.min(src.len())..]);
    }

    let result = vm.create_string_value(String::from_utf8_lossy(&out).into_owned());
    Ok(MultiValue::multiple(vec![
        result,
        LuaValue::Integer(count),
    ]))
}

/// One gsub replacement: string template (%0-%9, %%), table lookup, or
/// function call. None keeps the original match.
fn apply_replacement(
    vm: &mut LuaVM,
    repl: &LuaValue,
    src: &[u8],
    m: &MatchResult,
    whole: &str,
) -> LuaResult<Option<String>> {
    let captures = capture_values(vm, src, m);
    match repl {
        LuaValue::String(template) => {
            let t = template.as_str().as_bytes();
            let mut out = String::new();
            let mut i = 0;
            while i < t.len() {
                if t[i] == b'%' && i + 1 < t.len() {
                    let d = t[i + 1];
                    if d == b'%' {
                        out.push('%');
                    } else if d == b'0' {
                        out.push_str(whole);
                    } else if d.is_ascii_digit() {
                        let idx = (d - b'1') as usize;
                        let cap = captures
                            .get(idx)
                            .ok_or_else(|| vm.error("invalid capture index in replacement"))?;
                        out.push_str(&cap.to_display_string());
                    } else {
                        out.push(d as char);
                    }
                    i += 2;
                } else {
                    out.push(t[i] as char);
                    i += 1;
                }
            }
            Ok(Some(out))
        }
        LuaValue::Table(t) => {
            let key = captures.first().cloned().unwrap_or(LuaValue::Nil);
            let value = t.borrow().raw_get(&key);
            replacement_value(vm, value)
        }
        func if func.is_callable() => {
            let value = vm.call_value_single(func.clone(), captures)?;
            replacement_value(vm, value)
        }
        _ => Err(vm.error("bad argument #3 to 'gsub' (string/function/table expected)")),
    }
}

fn replacement_value(vm: &mut LuaVM, value: LuaValue) -> LuaResult<Option<String>> {
    match value {
        LuaValue::Nil | LuaValue::Boolean(false) => Ok(None),
        LuaValue::String(s) => Ok(Some(s.as_str().to_string())),
        LuaValue::Integer(_) | LuaValue::Float(_) => Ok(Some(value.to_display_string())),
        other => Err(vm.error(format!(
            "invalid replacement value (a {})",
            other.type_name()
        ))),
    }
}

// ---- string.format --------------------------------------------------------

fn str_format(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let template = check_string(vm, 0, "format")?;
    let args = get_args(vm);
    let mut next_arg = 1usize;

    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        if i + 1 < bytes.len() && bytes[i + 1] == b'%' {
            out.push('%');
            i += 2;
            continue;
        }

        // Parse flags, width, precision, conversion.
        let spec_start = i;
        i += 1;
        while i < bytes.len() && matches!(bytes[i], b'-' | b'+' | b' ' | b'#' | b'0') {
            i += 1;
        }
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if i >= bytes.len() {
            return Err(vm.error("invalid format string to 'format'"));
        }
        let conversion = bytes[i];
        let spec = std::str::from_utf8(&bytes[spec_start..i]).unwrap_or("%");
        i += 1;

        let arg = args.get(next_arg).cloned();
        next_arg += 1;
        let piece = format_one(vm, spec, conversion, arg, next_arg)?;
        out.push_str(&piece);
    }

    let result = vm.create_string_value(out);
    Ok(MultiValue::single(result))
}

/// Render one directive. `spec` is the "%-08.3"-style prefix without the
/// conversion letter.
fn format_one(
    vm: &mut LuaVM,
    spec: &str,
    conversion: u8,
    arg: Option<LuaValue>,
    argn: usize,
) -> LuaResult<String> {
    let (width, precision, flags) = parse_spec(spec);
    let missing = || {
        vm.error(format!(
            "bad argument #{} to 'format' (no value)",
            argn
        ))
    };

    let int_arg = |vm: &LuaVM, v: &Option<LuaValue>| -> LuaResult<i64> {
        v.as_ref()
            .and_then(|v| match v {
                LuaValue::Integer(i) => Some(*i),
                LuaValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
                LuaValue::String(s) => crate::lua_vm::arith::str_to_number(s.as_str())
                    .and_then(|n| n.as_integer()),
                _ => None,
            })
            .ok_or_else(|| {
                vm.error(format!(
                    "bad argument #{} to 'format' (number expected)",
                    argn
                ))
            })
    };
    let float_arg = |vm: &LuaVM, v: &Option<LuaValue>| -> LuaResult<f64> {
        v.as_ref().and_then(|v| v.as_float()).ok_or_else(|| {
            vm.error(format!(
                "bad argument #{} to 'format' (number expected)",
                argn
            ))
        })
    };

    let body = match conversion {
        b'd' | b'i' => itoa::Buffer::new().format(int_arg(vm, &arg)?).to_string(),
        b'u' => (int_arg(vm, &arg)? as u64).to_string(),
        b'c' => {
            let c = int_arg(vm, &arg)?;
            char::from_u32(c as u32).unwrap_or('\u{fffd}').to_string()
        }
        b'x' => format!("{:x}", int_arg(vm, &arg)?),
        b'X' => format!("{:X}", int_arg(vm, &arg)?),
        b'o' => format!("{:o}", int_arg(vm, &arg)?),
        b'e' => format!("{:.*e}", precision.unwrap_or(6), float_arg(vm, &arg)?),
        b'E' => format!("{:.*e}", precision.unwrap_or(6), float_arg(vm, &arg)?).to_uppercase(),
        b'f' | b'F' => format!("{:.*}", precision.unwrap_or(6), float_arg(vm, &arg)?),
        b'g' | b'G' => {
            let v = float_arg(vm, &arg)?;
            let s = float_to_lua_string(v);
            if conversion == b'G' {
                s.to_uppercase()
            } else {
                s
            }
        }
        b's' => {
            let v = arg.ok_or_else(missing)?;
            let mut s = vm.tostring_value(&v)?;
            if let Some(p) = precision {
                s.truncate(p);
            }
            s
        }
        b'q' => {
            let v = arg.ok_or_else(missing)?;
            quote_string(&vm.tostring_value(&v)?)
        }
        other => {
            return Err(vm.error(format!(
                "invalid conversion '%{}' to 'format'",
                other as char
            )));
        }
    };

    Ok(pad(body, width, flags.left_align, flags.zero_pad))
}

struct SpecFlags {
    left_align: bool,
    zero_pad: bool,
}

fn parse_spec(spec: &str) -> (usize, Option<usize>, SpecFlags) {
    let bytes = &spec.as_bytes()[1..]; // past '%'
    let mut i = 0;
    let mut flags = SpecFlags {
        left_align: false,
        zero_pad: false,
    };
    while i < bytes.len() && matches!(bytes[i], b'-' | b'+' | b' ' | b'#' | b'0') {
        match bytes[i] {
            b'-' => flags.left_align = true,
            b'0' => flags.zero_pad = true,
            _ => {}
        }
        i += 1;
    }
    let mut width = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        width = width * 10 + (bytes[i] - b'0') as usize;
        i += 1;
    }
    let mut precision = None;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let mut p = 0usize;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            p = p * 10 + (bytes[i] - b'0') as usize;
            i += 1;
        }
        precision = Some(p);
    }
    (width, precision, flags)
}

fn pad(body: String, width: usize, left_align: bool, zero_pad: bool) -> String {
    if body.len() >= width {
        return body;
    }
    let fill = width - body.len();
    if left_align {
        let mut out = body;
        out.extend(std::iter::repeat_n(' ', fill));
        out
    } else if zero_pad {
        // Keep a leading sign ahead of the zeros.
        if let Some(rest) = body.strip_prefix('-') {
            let mut out = String::from("-");
            out.extend(std::iter::repeat_n('0', fill));
            out.push_str(rest);
            out
        } else {
            let mut out: String = std::iter::repeat_n('0', fill).collect();
            out.push_str(&body);
            out
        }
    } else {
        let mut out: String = std::iter::repeat_n(' ', fill).collect();
        out.push_str(&body);
        out
    }
}

/// %q: a string readable back by the Lua lexer.
fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
