// Arithmetic, comparison, and concatenation with Lua 5.3's number tower:
// integer ops wrap, mixing promotes to float, '/' and '^' are always float,
// arithmetic coerces numeric strings, bitwise does not.

use super::{Instruction, LuaResult, LuaVM, OpCode};
use crate::lua_value::{LuaValue, float_to_lua_string};

/// Parse a string as a Lua number (decimal or hex, integer or float).
/// Used by arithmetic coercion and `tonumber`.
pub fn str_to_number(s: &str) -> Option<LuaValue> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let (negative, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, t),
    };
    let body = body.strip_prefix('+').unwrap_or(body);

    if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        let mut value: u64 = 0;
        let mut any = false;
        for ch in hex.chars() {
            let d = ch.to_digit(16)?;
            value = value.wrapping_mul(16).wrapping_add(d as u64);
            any = true;
        }
        if !any {
            return None;
        }
        let v = value as i64;
        return Some(LuaValue::Integer(if negative { v.wrapping_neg() } else { v }));
    }

    if let Ok(i) = body.parse::<i64>() {
        return Some(LuaValue::Integer(if negative { i.wrapping_neg() } else { i }));
    }
    if let Ok(f) = body.parse::<f64>() {
        return Some(LuaValue::Float(if negative { -f } else { f }));
    }
    None
}

/// Arithmetic operand view: number, or numeric string.
fn coerce_number(v: &LuaValue) -> Option<LuaValue> {
    match v {
        LuaValue::Integer(_) | LuaValue::Float(_) => Some(v.clone()),
        LuaValue::String(s) => str_to_number(s.as_str()),
        _ => None,
    }
}

fn floor_div_int(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q.wrapping_sub(1)
    } else {
        q
    }
}

fn floor_mod_int(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r.wrapping_add(b)
    } else {
        r
    }
}

fn floor_mod_float(a: f64, b: f64) -> f64 {
    a - (a / b).floor() * b
}

impl LuaVM {
    pub(super) fn op_arith(&mut self, op: OpCode, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let lhs = self.reg(b);
        let rhs = self.reg(c);
        let value = self.arith_values(op, &lhs, &rhs)?;
        self.set_reg(a, value);
        Ok(())
    }

    /// The arithmetic core shared by the dispatch loop and metamethod-free
    /// library paths.
    pub fn arith_values(
        &mut self,
        op: OpCode,
        lhs: &LuaValue,
        rhs: &LuaValue,
    ) -> LuaResult<LuaValue> {
        if let (Some(l), Some(r)) = (coerce_number(lhs), coerce_number(rhs)) {
            return self.arith_numbers(op, l, r);
        }
        let event = match op {
            OpCode::Add => "__add",
            OpCode::Sub => "__sub",
            OpCode::Mul => "__mul",
            OpCode::Div => "__div",
            OpCode::IDiv => "__idiv",
            OpCode::Mod => "__mod",
            OpCode::Pow => "__pow",
            _ => unreachable!("arith_values on non-arithmetic opcode"),
        };
        if let Some(result) = self.try_binary_metamethod(event, lhs, rhs)? {
            return Ok(result);
        }
        let offender = if coerce_number(lhs).is_none() { lhs } else { rhs };
        Err(self.error(format!(
            "attempt to perform arithmetic on a {} value",
            offender.type_name()
        )))
    }

    fn arith_numbers(&mut self, op: OpCode, l: LuaValue, r: LuaValue) -> LuaResult<LuaValue> {
        use LuaValue::{Float, Integer};
        let value = match (op, &l, &r) {
            (OpCode::Add, Integer(x), Integer(y)) => Integer(x.wrapping_add(*y)),
            (OpCode::Sub, Integer(x), Integer(y)) => Integer(x.wrapping_sub(*y)),
            (OpCode::Mul, Integer(x), Integer(y)) => Integer(x.wrapping_mul(*y)),
            (OpCode::IDiv, Integer(x), Integer(y)) => {
                if *y == 0 {
                    return Err(self.error("attempt to perform 'n//0'"));
                }
                Integer(floor_div_int(*x, *y))
            }
            (OpCode::Mod, Integer(x), Integer(y)) => {
                if *y == 0 {
                    return Err(self.error("attempt to perform 'n%0'"));
                }
                Integer(floor_mod_int(*x, *y))
            }
            _ => {
                // Float arithmetic (also the '/' and '^' cases).
                let x = l.as_float().unwrap_or(f64::NAN);
                let y = r.as_float().unwrap_or(f64::NAN);
                match op {
                    OpCode::Add => Float(x + y),
                    OpCode::Sub => Float(x - y),
                    OpCode::Mul => Float(x * y),
                    OpCode::Div => Float(x / y),
                    OpCode::Pow => Float(x.powf(y)),
                    OpCode::IDiv => Float((x / y).floor()),
                    OpCode::Mod => Float(floor_mod_float(x, y)),
                    _ => unreachable!(),
                }
            }
        };
        Ok(value)
    }

    pub(super) fn op_unm(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let operand = self.reg(b);
        let value = match coerce_number(&operand) {
            Some(LuaValue::Integer(i)) => LuaValue::Integer(i.wrapping_neg()),
            Some(LuaValue::Float(f)) => LuaValue::Float(-f),
            _ => {
                if let Some(result) =
                    self.try_binary_metamethod("__unm", &operand, &operand)?
                {
                    result
                } else {
                    return Err(self.error(format!(
                        "attempt to perform arithmetic on a {} value",
                        operand.type_name()
                    )));
                }
            }
        };
        self.set_reg(a, value);
        Ok(())
    }

    pub(super) fn op_not(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let value = LuaValue::Boolean(!self.reg(b).is_truthy());
        self.set_reg(a, value);
        Ok(())
    }

    pub(super) fn op_len(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let operand = self.reg(b);
        let value = self.length_of(&operand)?;
        self.set_reg(a, value);
        Ok(())
    }

    /// `#v`: byte length for strings; `__len` then the border rule for
    /// tables.
    pub fn length_of(&mut self, v: &LuaValue) -> LuaResult<LuaValue> {
        match v {
            LuaValue::String(s) => Ok(LuaValue::Integer(s.as_str().len() as i64)),
            LuaValue::Table(t) => {
                if let Some(handler) = self.get_metamethod(v, "__len") {
                    return self.call_value_single(handler, vec![v.clone()]);
                }
                Ok(LuaValue::Integer(t.borrow().border()))
            }
            other => Err(self.error(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        }
    }

    // ---- bitwise ----------------------------------------------------------

    /// Bitwise operand: an integer, an exact float, or a string spelling an
    /// integer. Anything else fails naming the offending type.
    fn bit_operand(&self, v: &LuaValue) -> LuaResult<i64> {
        match v {
            LuaValue::Integer(i) => Ok(*i),
            LuaValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
            LuaValue::Float(_) => Err(self.error("number has no integer representation")),
            LuaValue::String(s) => match str_to_number(s.as_str()) {
                Some(LuaValue::Integer(i)) => Ok(i),
                Some(LuaValue::Float(f)) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
                _ => Err(self.error(
                    "attempt to perform bitwise operation on a string value".to_string(),
                )),
            },
            other => Err(self.error(format!(
                "attempt to perform bitwise operation on a {} value",
                other.type_name()
            ))),
        }
    }

    pub(super) fn op_bitwise(&mut self, op: OpCode, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let lhs = self.reg(b);
        let rhs = self.reg(c);

        // Metamethods get a chance before the integer check fails hard.
        if !(lhs.is_number() && rhs.is_number()) {
            let event = match op {
                OpCode::BAnd => "__band",
                OpCode::BOr => "__bor",
                OpCode::BXor => "__bxor",
                OpCode::Shl => "__shl",
                OpCode::Shr => "__shr",
                _ => unreachable!(),
            };
            if let Some(result) = self.try_binary_metamethod(event, &lhs, &rhs)? {
                self.set_reg(a, result);
                return Ok(());
            }
        }

        let x = self.bit_operand(&lhs)?;
        let y = self.bit_operand(&rhs)?;
        let value = match op {
            OpCode::BAnd => x & y,
            OpCode::BOr => x | y,
            OpCode::BXor => x ^ y,
            OpCode::Shl => shift_left(x, y),
            OpCode::Shr => shift_left(x, y.wrapping_neg()),
            _ => unreachable!(),
        };
        self.set_reg(a, LuaValue::Integer(value));
        Ok(())
    }

    pub(super) fn op_bnot(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let operand = self.reg(b);
        if !operand.is_number() {
            if let Some(result) = self.try_binary_metamethod("__bnot", &operand, &operand)? {
                self.set_reg(a, result);
                return Ok(());
            }
        }
        let x = self.bit_operand(&operand)?;
        self.set_reg(a, LuaValue::Integer(!x));
        Ok(())
    }

    // ---- comparisons ------------------------------------------------------

    pub(super) fn op_compare(&mut self, op: OpCode, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let lhs = self.reg(b);
        let rhs = self.reg(c);

        let result = match op {
            OpCode::Eq => self.values_equal(&lhs, &rhs)?,
            OpCode::Ne => !self.values_equal(&lhs, &rhs)?,
            OpCode::Lt => self.values_less(&lhs, &rhs, false)?,
            OpCode::Le => self.values_less(&lhs, &rhs, true)?,
            OpCode::Gt => self.values_less(&rhs, &lhs, false)?,
            OpCode::Ge => self.values_less(&rhs, &lhs, true)?,
            _ => unreachable!(),
        };
        self.set_reg(a, LuaValue::Boolean(result));
        Ok(())
    }

    /// Equality with `__eq` dispatch for tables/userdata of the same type.
    pub fn values_equal(&mut self, lhs: &LuaValue, rhs: &LuaValue) -> LuaResult<bool> {
        if lhs == rhs {
            return Ok(true);
        }
        let both_tables = lhs.is_table() && rhs.is_table();
        let both_userdata =
            matches!(lhs, LuaValue::Userdata(_)) && matches!(rhs, LuaValue::Userdata(_));
        if both_tables || both_userdata {
            let handler = self
                .get_metamethod(lhs, "__eq")
                .or_else(|| self.get_metamethod(rhs, "__eq"));
            if let Some(handler) = handler {
                let result =
                    self.call_value_single(handler, vec![lhs.clone(), rhs.clone()])?;
                return Ok(result.is_truthy());
            }
        }
        Ok(false)
    }

    /// `<` / `<=` with numeric, string, and metamethod cases.
    fn values_less(&mut self, lhs: &LuaValue, rhs: &LuaValue, or_equal: bool) -> LuaResult<bool> {
        match (lhs, rhs) {
            (LuaValue::Integer(x), LuaValue::Integer(y)) => {
                Ok(if or_equal { x <= y } else { x < y })
            }
            (l, r) if l.is_number() && r.is_number() => {
                let x = l.as_float().unwrap_or(f64::NAN);
                let y = r.as_float().unwrap_or(f64::NAN);
                Ok(if or_equal { x <= y } else { x < y })
            }
            (LuaValue::String(x), LuaValue::String(y)) => {
                Ok(if or_equal {
                    x.as_str() <= y.as_str()
                } else {
                    x.as_str() < y.as_str()
                })
            }
            _ => {
                let event = if or_equal { "__le" } else { "__lt" };
                if let Some(result) = self.try_binary_metamethod(event, lhs, rhs)? {
                    return Ok(result.is_truthy());
                }
                Err(self.error(format!(
                    "attempt to compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        }
    }

    // ---- concatenation ----------------------------------------------------

    pub(super) fn op_concat(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;

        // Right-to-left pairwise, matching metamethod order.
        let mut acc = self.reg(c);
        let mut i = c;
        while i > b {
            i -= 1;
            let lhs = self.reg(i);
            acc = self.concat_pair(lhs, acc)?;
        }
        self.set_reg(a, acc);
        Ok(())
    }

    pub fn concat_pair(&mut self, lhs: LuaValue, rhs: LuaValue) -> LuaResult<LuaValue> {
        let stringable =
            |v: &LuaValue| v.is_string() || v.is_number();
        if stringable(&lhs) && stringable(&rhs) {
            let mut s = concat_text(&lhs);
            s.push_str(&concat_text(&rhs));
            return Ok(self.create_string_value(s));
        }
        if let Some(result) = self.try_binary_metamethod("__concat", &lhs, &rhs)? {
            return Ok(result);
        }
        let offender = if stringable(&lhs) { &rhs } else { &lhs };
        Err(self.error(format!(
            "attempt to concatenate a {} value",
            offender.type_name()
        )))
    }
}

fn concat_text(v: &LuaValue) -> String {
    match v {
        LuaValue::String(s) => s.as_str().to_string(),
        LuaValue::Integer(i) => {
            let mut buf = itoa::Buffer::new();
            buf.format(*i).to_string()
        }
        LuaValue::Float(f) => float_to_lua_string(*f),
        _ => unreachable!("concat_text on non-stringable value"),
    }
}

/// Lua shift semantics: shifts are logical, negative counts reverse
/// direction, and |n| >= 64 yields 0.
fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> (-n)) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_strings() {
        assert_eq!(str_to_number("42"), Some(LuaValue::Integer(42)));
        assert_eq!(str_to_number("  -7 "), Some(LuaValue::Integer(-7)));
        assert_eq!(str_to_number("0x10"), Some(LuaValue::Integer(16)));
        assert_eq!(str_to_number("3.5"), Some(LuaValue::Float(3.5)));
        assert_eq!(str_to_number("1e2"), Some(LuaValue::Float(100.0)));
        assert_eq!(str_to_number("pigs"), None);
        assert_eq!(str_to_number(""), None);
    }

    #[test]
    fn floor_division_rounds_down() {
        assert_eq!(floor_div_int(7, 2), 3);
        assert_eq!(floor_div_int(-7, 2), -4);
        assert_eq!(floor_mod_int(-7, 2), 1);
        assert_eq!(floor_mod_int(7, -2), -1);
        assert_eq!(floor_mod_float(5.5, 2.0), 1.5);
    }

    #[test]
    fn shifts_saturate_at_width() {
        assert_eq!(shift_left(1, 3), 8);
        assert_eq!(shift_left(1, 64), 0);
        assert_eq!(shift_left(8, -2), 2);
        assert_eq!(shift_left(-1, -1), i64::MAX);
    }
}
