// OS library
// clock, time, date, difftime, getenv, execute, exit, remove, rename,
// tmpname, setlocale. The process/filesystem members exist so the sandbox
// has real functions to stub; the default sandbox replaces them.

use crate::lib_registry::{LibraryModule, get_arg};
use crate::lua_value::{LuaValue, MultiValue};
use crate::lua_vm::{LuaResult, LuaVM};
use chrono::{Local, TimeZone};

pub fn create_os_lib() -> LibraryModule {
    crate::lib_module!("os", {
        "clock" => os_clock,
        "time" => os_time,
        "date" => os_date,
        "difftime" => os_difftime,
        "getenv" => os_getenv,
        "execute" => os_execute,
        "exit" => os_exit,
        "remove" => os_remove,
        "rename" => os_rename,
        "tmpname" => os_tmpname,
        "setlocale" => os_setlocale,
    })
}

fn os_clock(_vm: &mut LuaVM) -> LuaResult<MultiValue> {
    use std::time::Instant;
    thread_local! {
        static START: Instant = Instant::now();
    }
    let elapsed = START.with(|start| start.elapsed().as_secs_f64());
    Ok(MultiValue::single(LuaValue::Float(elapsed)))
}

fn os_time(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    match get_arg(vm, 0) {
        Some(LuaValue::Table(t)) => {
            let field = |name: &str, default: i64| -> i64 {
                t.borrow()
                    .raw_get_str(name)
                    .as_integer()
                    .unwrap_or(default)
            };
            let (year, month, day) = (field("year", 1970), field("month", 1), field("day", 1));
            let (hour, min, sec) = (field("hour", 12), field("min", 0), field("sec", 0));
            let stamp = Local
                .with_ymd_and_hms(
                    year as i32,
                    month as u32,
                    day as u32,
                    hour as u32,
                    min as u32,
                    sec as u32,
                )
                .single()
                .map(|dt| dt.timestamp())
                .ok_or_else(|| vm.error("time result cannot be represented"))?;
            Ok(MultiValue::single(LuaValue::Integer(stamp)))
        }
        _ => {
            let now = Local::now().timestamp();
            Ok(MultiValue::single(LuaValue::Integer(now)))
        }
    }
}

fn os_date(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let format = get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "%c".to_string());
    let when = get_arg(vm, 1)
        .and_then(|v| v.as_integer())
        .unwrap_or_else(|| Local::now().timestamp());

    let datetime = Local
        .timestamp_opt(when, 0)
        .single()
        .ok_or_else(|| vm.error("bad argument #2 to 'date' (time out of range)"))?;

    // "*t" / "!*t" return a broken-down table instead of a string.
    if format.trim_start_matches('!').starts_with("*t") {
        use chrono::{Datelike, Timelike};
        let table = vm.create_table();
        {
            let mut t = table.borrow_mut();
            t.raw_set_str("year", LuaValue::Integer(datetime.year() as i64));
            t.raw_set_str("month", LuaValue::Integer(datetime.month() as i64));
            t.raw_set_str("day", LuaValue::Integer(datetime.day() as i64));
            t.raw_set_str("hour", LuaValue::Integer(datetime.hour() as i64));
            t.raw_set_str("min", LuaValue::Integer(datetime.minute() as i64));
            t.raw_set_str("sec", LuaValue::Integer(datetime.second() as i64));
            t.raw_set_str("wday", LuaValue::Integer(datetime.weekday().number_from_sunday() as i64));
            t.raw_set_str("yday", LuaValue::Integer(datetime.ordinal() as i64));
            t.raw_set_str("isdst", LuaValue::Boolean(false));
        }
        return Ok(MultiValue::single(LuaValue::Table(table)));
    }

    let rendered = render_date(&datetime, format.trim_start_matches('!'));
    let result = vm.create_string_value(rendered);
    Ok(MultiValue::single(result))
}

/// strftime subset. Unknown directives pass through literally instead of
/// aborting the whole call.
fn render_date(dt: &chrono::DateTime<Local>, format: &str) -> String {
    use chrono::{Datelike, Timelike};
    let mut out = String::with_capacity(format.len() + 16);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&dt.year().to_string()),
            Some('y') => out.push_str(&format!("{:02}", dt.year() % 100)),
            Some('m') => out.push_str(&format!("{:02}", dt.month())),
            Some('d') => out.push_str(&format!("{:02}", dt.day())),
            Some('H') => out.push_str(&format!("{:02}", dt.hour())),
            Some('M') => out.push_str(&format!("{:02}", dt.minute())),
            Some('S') => out.push_str(&format!("{:02}", dt.second())),
            Some('p') => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
            Some('A') => out.push_str(weekday_name(dt.weekday())),
            Some('a') => out.push_str(&weekday_name(dt.weekday())[..3]),
            Some('B') => out.push_str(month_name(dt.month())),
            Some('b') => out.push_str(&month_name(dt.month())[..3]),
            Some('j') => out.push_str(&format!("{:03}", dt.ordinal())),
            Some('c') => out.push_str(&render_date(dt, "%a %b %d %H:%M:%S %Y")),
            Some('x') => out.push_str(&render_date(dt, "%m/%d/%y")),
            Some('X') => out.push_str(&render_date(dt, "%H:%M:%S")),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

fn weekday_name(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

fn os_difftime(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let t2 = get_arg(vm, 0).and_then(|v| v.as_float()).unwrap_or(0.0);
    let t1 = get_arg(vm, 1).and_then(|v| v.as_float()).unwrap_or(0.0);
    Ok(MultiValue::single(LuaValue::Float(t2 - t1)))
}

fn os_getenv(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let name = get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| vm.error("bad argument #1 to 'getenv' (string expected)"))?;
    let result = match std::env::var(&name) {
        Ok(value) => vm.create_string_value(value),
        Err(_) => LuaValue::Nil,
    };
    Ok(MultiValue::single(result))
}

fn os_execute(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let Some(command) = get_arg(vm, 0).and_then(|v| v.as_str().map(|s| s.to_string())) else {
        // os.execute() probes for a shell.
        return Ok(MultiValue::single(LuaValue::Boolean(true)));
    };
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .status()
        .map_err(|e| vm.error(format!("cannot run command: {}", e)))?;
    let code = status.code().unwrap_or(-1) as i64;
    Ok(MultiValue::multiple(vec![
        LuaValue::Boolean(status.success()),
        LuaValue::str("exit"),
        LuaValue::Integer(code),
    ]))
}

fn os_exit(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let code = get_arg(vm, 0)
        .map(|v| match v {
            LuaValue::Boolean(true) => 0,
            LuaValue::Boolean(false) => 1,
            other => other.as_integer().unwrap_or(0) as i32,
        })
        .unwrap_or(0);
    std::process::exit(code);
}

fn os_remove(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let path = get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| vm.error("bad argument #1 to 'remove' (string expected)"))?;
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(MultiValue::single(LuaValue::Boolean(true))),
        Err(e) => {
            let message = vm.create_string_value(format!("{}: {}", path, e));
            Ok(MultiValue::multiple(vec![LuaValue::Nil, message]))
        }
    }
}

fn os_rename(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let from = get_arg(vm, 0)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| vm.error("bad argument #1 to 'rename' (string expected)"))?;
    let to = get_arg(vm, 1)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| vm.error("bad argument #2 to 'rename' (string expected)"))?;
    match std::fs::rename(&from, &to) {
        Ok(()) => Ok(MultiValue::single(LuaValue::Boolean(true))),
        Err(e) => {
            let message = vm.create_string_value(format!("{}: {}", from, e));
            Ok(MultiValue::multiple(vec![LuaValue::Nil, message]))
        }
    }
}

fn os_tmpname(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let name = std::env::temp_dir().join(format!("lua_{}", std::process::id()));
    let result = vm.create_string_value(name.to_string_lossy().into_owned());
    Ok(MultiValue::single(result))
}

fn os_setlocale(vm: &mut LuaVM) -> LuaResult<MultiValue> {
    let result = vm.create_string_value("C".to_string());
    Ok(MultiValue::single(result))
}
