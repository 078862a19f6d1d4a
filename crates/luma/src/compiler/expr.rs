// Expression lowering. Every expression can be compiled into a chosen
// destination register; calls and varargs additionally support multi-value
// contexts where they expand in place at the register-file top.

use super::parser::ast::{BinOp, Expr, TableItem, UnOp};
use super::{Compiler, Want, helpers::*};
use crate::lua_value::LuaValue;
use crate::lua_vm::{FIELDS_PER_BATCH, Instruction, LuaError, OpCode};

/// Compile `expr` into a freshly reserved register at the current top and
/// return that register. Temporaries used along the way are reclaimed.
pub(crate) fn compile_expr(c: &mut Compiler, expr: &Expr) -> Result<u32, LuaError> {
    let reg = alloc_register(c);
    compile_expr_into(c, expr, reg)?;
    fs(c).next_register = reg + 1;
    Ok(reg)
}

/// Compile `expr` so its (single) value lands in `dest`.
pub(crate) fn compile_expr_into(c: &mut Compiler, expr: &Expr, dest: u32) -> Result<(), LuaError> {
    let line = expr.position().line;
    match expr {
        Expr::Nil(_) => {
            emit_load_nil(c, dest, 0, line);
        }
        Expr::True(_) => {
            emit(c, Instruction::encode_abc(OpCode::LoadBool, dest, 1, 0), line);
        }
        Expr::False(_) => {
            emit(c, Instruction::encode_abc(OpCode::LoadBool, dest, 0, 0), line);
        }
        Expr::Int(i, _) => {
            let k = add_constant(c, LuaValue::Integer(*i));
            emit(c, Instruction::encode_abx(OpCode::LoadK, dest, k), line);
        }
        Expr::Float(f, _) => {
            let k = add_constant(c, LuaValue::Float(*f));
            emit(c, Instruction::encode_abx(OpCode::LoadK, dest, k), line);
        }
        Expr::Str(s, _) => {
            let k = string_constant(c, s);
            emit(c, Instruction::encode_abx(OpCode::LoadK, dest, k), line);
        }
        Expr::Vararg(_) => {
            emit(c, Instruction::encode_abc(OpCode::VarArg, dest, 2, 0), line);
        }
        Expr::Name(name, _) => {
            compile_name_read(c, name, dest, line);
        }
        Expr::Paren(inner, _) => {
            // Parentheses truncate a multi-value to exactly one.
            compile_expr_into(c, inner, dest)?;
        }
        Expr::Index { obj, key, .. } => {
            let mark = fs(c).next_register.max(dest + 1);
            fs(c).next_register = mark;
            let obj_reg = compile_expr(c, obj)?;
            compile_index_read(c, obj_reg, key, dest, line)?;
            fs(c).next_register = dest + 1;
        }
        Expr::Call { .. } | Expr::MethodCall { .. } => {
            let base = compile_call_expr(c, expr, Want::Fixed(1))?;
            emit_move(c, dest, base, line);
            fs(c).next_register = dest + 1;
        }
        Expr::Function(body, _) => {
            let proto = compile_function(c, body)?;
            emit(c, Instruction::encode_abx(OpCode::Closure, dest, proto), line);
        }
        Expr::Table(items, _) => {
            compile_table(c, items, dest, line)?;
        }
        Expr::UnOp { op, operand, .. } => {
            let mark = fs(c).next_register.max(dest + 1);
            fs(c).next_register = mark;
            let src = compile_expr(c, operand)?;
            let opcode = match op {
                UnOp::Neg => OpCode::Unm,
                UnOp::Not => OpCode::Not,
                UnOp::Len => OpCode::Len,
                UnOp::BNot => OpCode::BNot,
            };
            emit(c, Instruction::encode_abc(opcode, dest, src, 0), line);
            fs(c).next_register = dest + 1;
        }
        Expr::BinOp { op, lhs, rhs, .. } => {
            compile_binop(c, *op, lhs, rhs, dest, line)?;
        }
    }
    Ok(())
}

fn compile_name_read(c: &mut Compiler, name: &str, dest: u32, line: u32) {
    let level = c.states.len() - 1;
    if let Some(reg) = resolve_local(c, level, name) {
        emit_move(c, dest, reg, line);
    } else if let Some(up) = resolve_upvalue(c, level, name) {
        emit(c, Instruction::encode_abc(OpCode::GetUpval, dest, up, 0), line);
    } else {
        let k = string_constant(c, name);
        emit(c, Instruction::encode_abx(OpCode::GetGlobal, dest, k), line);
    }
}

/// `dest := obj[key]`, using the constant-key form when it fits.
fn compile_index_read(
    c: &mut Compiler,
    obj_reg: u32,
    key: &Expr,
    dest: u32,
    line: u32,
) -> Result<(), LuaError> {
    if let Expr::Str(s, _) = key {
        let k = string_constant(c, s);
        if k <= Instruction::MAX_C {
            emit(
                c,
                Instruction::encode_abc(OpCode::GetField, dest, obj_reg, k),
                line,
            );
            return Ok(());
        }
    }
    let key_reg = compile_expr(c, key)?;
    emit(
        c,
        Instruction::encode_abc(OpCode::GetTable, dest, obj_reg, key_reg),
        line,
    );
    Ok(())
}

fn compile_binop(
    c: &mut Compiler,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    dest: u32,
    line: u32,
) -> Result<(), LuaError> {
    match op {
        BinOp::And | BinOp::Or => {
            compile_expr_into(c, lhs, dest)?;
            fs(c).next_register = fs(c).next_register.max(dest + 1);
            // and: a falsy short-circuits; or: a truthy short-circuits.
            let skip_when = if op == BinOp::And { 1 } else { 0 };
            emit(
                c,
                Instruction::encode_abc(OpCode::Test, dest, 0, skip_when),
                line,
            );
            let jump_end = emit_jump(c, line);
            compile_expr_into(c, rhs, dest)?;
            patch_jump_here(c, jump_end);
            fs(c).next_register = dest + 1;
        }
        BinOp::Concat => {
            let mark = fs(c).next_register.max(dest + 1);
            fs(c).next_register = mark;
            let mut operands = Vec::new();
            flatten_concat(lhs, &mut operands);
            flatten_concat(rhs, &mut operands);
            let base = fs(c).next_register;
            for part in &operands {
                compile_expr(c, part)?;
            }
            emit(
                c,
                Instruction::encode_abc(
                    OpCode::Concat,
                    dest,
                    base,
                    base + operands.len() as u32 - 1,
                ),
                line,
            );
            fs(c).next_register = dest + 1;
        }
        _ => {
            let mark = fs(c).next_register.max(dest + 1);
            fs(c).next_register = mark;
            let left = compile_expr(c, lhs)?;
            let right = compile_expr(c, rhs)?;
            let opcode = match op {
                BinOp::Add => OpCode::Add,
                BinOp::Sub => OpCode::Sub,
                BinOp::Mul => OpCode::Mul,
                BinOp::Div => OpCode::Div,
                BinOp::IDiv => OpCode::IDiv,
                BinOp::Mod => OpCode::Mod,
                BinOp::Pow => OpCode::Pow,
                BinOp::Eq => OpCode::Eq,
                BinOp::Ne => OpCode::Ne,
                BinOp::Lt => OpCode::Lt,
                BinOp::Le => OpCode::Le,
                BinOp::Gt => OpCode::Gt,
                BinOp::Ge => OpCode::Ge,
                BinOp::BAnd => OpCode::BAnd,
                BinOp::BOr => OpCode::BOr,
                BinOp::BXor => OpCode::BXor,
                BinOp::Shl => OpCode::Shl,
                BinOp::Shr => OpCode::Shr,
                BinOp::And | BinOp::Or | BinOp::Concat => unreachable!(),
            };
            emit(
                c,
                Instruction::encode_abc(opcode, dest, left, right),
                line,
            );
            fs(c).next_register = dest + 1;
        }
    }
    Ok(())
}

/// Collect a concat chain in source order so one Concat instruction can
/// fold the whole run.
fn flatten_concat<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    if let Expr::BinOp {
        op: BinOp::Concat,
        lhs,
        rhs,
        ..
    } = expr
    {
        flatten_concat(lhs, out);
        flatten_concat(rhs, out);
    } else {
        out.push(expr);
    }
}

/// Compile a call (or method call) with the requested result count.
/// Returns the base register: the callee slot, where results land.
pub(crate) fn compile_call_expr(
    c: &mut Compiler,
    expr: &Expr,
    want: Want,
) -> Result<u32, LuaError> {
    let line = expr.position().line;
    let (base, first_arg_offset) = match expr {
        Expr::Call { func, .. } => {
            let base = alloc_register(c);
            compile_expr_into(c, func, base)?;
            fs(c).next_register = base + 1;
            (base, 1u32)
        }
        Expr::MethodCall { obj, name, .. } => {
            let base = alloc_registers(c, 2);
            let k = string_constant(c, name);
            if k <= Instruction::MAX_C {
                compile_expr_into(c, obj, base)?;
                fs(c).next_register = base + 2;
                emit(
                    c,
                    Instruction::encode_abc(OpCode::SelfGet, base, base, k),
                    line,
                );
            } else {
                compile_expr_into(c, obj, base + 1)?;
                fs(c).next_register = base + 2;
                let key = alloc_register(c);
                emit(c, Instruction::encode_abx(OpCode::LoadK, key, k), line);
                emit(
                    c,
                    Instruction::encode_abc(OpCode::GetTable, base, base + 1, key),
                    line,
                );
                fs(c).next_register = base + 2;
            }
            (base, 2u32)
        }
        _ => {
            return Err(err_at("expected a call expression", expr.position()));
        }
    };

    let args = match expr {
        Expr::Call { args, .. } | Expr::MethodCall { args, .. } => args,
        _ => unreachable!(),
    };

    let b_field = compile_args(c, args, first_arg_offset)?;
    let c_field = match want {
        Want::Fixed(n) => n + 1,
        Want::All => 0,
    };
    emit(
        c,
        Instruction::encode_abc(OpCode::Call, base, b_field, c_field),
        line,
    );

    match want {
        Want::Fixed(n) => fs(c).next_register = base + n.max(1),
        Want::All => fs(c).next_register = base + 1,
    }
    Ok(base)
}

/// Compile call arguments at the top of the register file; returns the B
/// field (arg count + offset, or 0 when the last argument expands).
fn compile_args(c: &mut Compiler, args: &[Expr], offset: u32) -> Result<u32, LuaError> {
    if args.is_empty() {
        return Ok(offset);
    }
    for arg in &args[..args.len() - 1] {
        compile_expr(c, arg)?;
    }
    let last = args.last().unwrap();
    if last.is_multi_valued() {
        compile_multi_open(c, last)?;
        Ok(0)
    } else {
        compile_expr(c, last)?;
        Ok(args.len() as u32 + offset)
    }
}

/// Compile a multi-valued expression (call or `...`) expanding all of its
/// results at the current register top.
pub(crate) fn compile_multi_open(c: &mut Compiler, expr: &Expr) -> Result<u32, LuaError> {
    match expr {
        Expr::Call { .. } | Expr::MethodCall { .. } => compile_call_expr(c, expr, Want::All),
        Expr::Vararg(meta) => {
            let base = alloc_register(c);
            emit(
                c,
                Instruction::encode_abc(OpCode::VarArg, base, 0, 0),
                meta.position.line,
            );
            fs(c).next_register = base;
            Ok(base)
        }
        _ => Err(err_at(
            "expression cannot produce multiple values",
            expr.position(),
        )),
    }
}

/// Compile a multi-valued expression to exactly `count` values starting at
/// the current top; pads with nil / truncates as needed.
fn compile_multi_fixed(c: &mut Compiler, expr: &Expr, count: u32) -> Result<u32, LuaError> {
    match expr {
        Expr::Call { .. } | Expr::MethodCall { .. } => {
            let base = compile_call_expr(c, expr, Want::Fixed(count))?;
            fs(c).next_register = base + count;
            Ok(base)
        }
        Expr::Vararg(meta) => {
            let base = alloc_registers(c, count);
            emit(
                c,
                Instruction::encode_abc(OpCode::VarArg, base, count + 1, 0),
                meta.position.line,
            );
            Ok(base)
        }
        _ => unreachable!("compile_multi_fixed on single-valued expression"),
    }
}

/// Evaluate an expression list into exactly `count` consecutive registers
/// at the current top; returns the base register. The last expression
/// expands or is padded per the multi-value rules; surplus expressions are
/// still evaluated for their effects.
pub(crate) fn explist_to_count(
    c: &mut Compiler,
    exprs: &[Expr],
    count: u32,
    line: u32,
) -> Result<u32, LuaError> {
    let base = fs(c).next_register;

    if exprs.is_empty() {
        if count > 0 {
            let reg = alloc_registers(c, count);
            emit_load_nil(c, reg, count - 1, line);
        }
        return Ok(base);
    }

    let fixed = exprs.len() - 1;
    for expr in &exprs[..fixed] {
        compile_expr(c, expr)?;
    }
    let last = &exprs[fixed];
    let remaining = count as i64 - fixed as i64;

    if remaining <= 0 {
        // Surplus expression: evaluate and drop the value.
        compile_expr(c, last)?;
    } else if last.is_multi_valued() {
        compile_multi_fixed(c, last, remaining as u32)?;
    } else {
        compile_expr(c, last)?;
        if remaining > 1 {
            let pad = alloc_registers(c, remaining as u32 - 1);
            emit_load_nil(c, pad, remaining as u32 - 2, line);
        }
    }

    fs(c).next_register = base + count;
    Ok(base)
}

/// Evaluate an expression list for an open context (return values, open
/// call arguments). Returns (base, b_field): b_field is count+1, or 0 when
/// the last expression expanded to all its values.
pub(crate) fn explist_open(c: &mut Compiler, exprs: &[Expr]) -> Result<(u32, u32), LuaError> {
    let base = fs(c).next_register;
    if exprs.is_empty() {
        return Ok((base, 1));
    }
    for expr in &exprs[..exprs.len() - 1] {
        compile_expr(c, expr)?;
    }
    let last = exprs.last().unwrap();
    if last.is_multi_valued() {
        compile_multi_open(c, last)?;
        Ok((base, 0))
    } else {
        compile_expr(c, last)?;
        Ok((base, exprs.len() as u32 + 1))
    }
}

fn compile_table(
    c: &mut Compiler,
    items: &[TableItem],
    dest: u32,
    line: u32,
) -> Result<(), LuaError> {
    // Build at a fresh top register so SetList batches sit right above the
    // table slot, then move into place.
    let treg = alloc_register(c);
    emit(c, Instruction::encode_abc(OpCode::NewTable, treg, 0, 0), line);

    let mut flushed = 0usize; // array entries already stored
    let mut pending = 0u32; // values sitting in registers above treg

    for (idx, item) in items.iter().enumerate() {
        match item {
            TableItem::Positional(value) => {
                let is_last = idx == items.len() - 1;
                if is_last && value.is_multi_valued() {
                    compile_multi_open(c, value)?;
                    let batch = (flushed / FIELDS_PER_BATCH) as u32 + 1;
                    emit(
                        c,
                        Instruction::encode_abc(OpCode::SetList, treg, 0, batch),
                        line,
                    );
                    pending = 0;
                } else {
                    compile_expr(c, value)?;
                    pending += 1;
                    if pending as usize == FIELDS_PER_BATCH {
                        let batch = (flushed / FIELDS_PER_BATCH) as u32 + 1;
                        emit(
                            c,
                            Instruction::encode_abc(OpCode::SetList, treg, pending, batch),
                            line,
                        );
                        flushed += pending as usize;
                        pending = 0;
                        fs(c).next_register = treg + 1;
                    }
                }
            }
            TableItem::Named(name, value) => {
                let k = string_constant(c, name);
                let mark = fs(c).next_register;
                let vreg = compile_expr(c, value)?;
                if k <= Instruction::MAX_B {
                    emit(
                        c,
                        Instruction::encode_abc(OpCode::SetField, treg, k, vreg),
                        value.position().line,
                    );
                } else {
                    let kreg = alloc_register(c);
                    emit(c, Instruction::encode_abx(OpCode::LoadK, kreg, k), line);
                    emit(
                        c,
                        Instruction::encode_abc(OpCode::SetTable, treg, kreg, vreg),
                        value.position().line,
                    );
                }
                fs(c).next_register = mark;
            }
            TableItem::Keyed(key, value) => {
                let mark = fs(c).next_register;
                let kreg = compile_expr(c, key)?;
                let vreg = compile_expr(c, value)?;
                emit(
                    c,
                    Instruction::encode_abc(OpCode::SetTable, treg, kreg, vreg),
                    value.position().line,
                );
                fs(c).next_register = mark;
            }
        }
    }

    if pending > 0 {
        let batch = (flushed / FIELDS_PER_BATCH) as u32 + 1;
        emit(
            c,
            Instruction::encode_abc(OpCode::SetList, treg, pending, batch),
            line,
        );
    }

    emit_move(c, dest, treg, line);
    fs(c).next_register = dest + 1;
    Ok(())
}

/// Compile a function literal into a child prototype; returns its index.
pub(crate) fn compile_function(
    c: &mut Compiler,
    body: &super::parser::ast::FuncBody,
) -> Result<u32, LuaError> {
    c.push_state(&body.params, body.is_vararg, body.name.clone());
    super::stmt::compile_block(c, &body.block)?;
    let end_line = body
        .block
        .last()
        .map(|s| s.position().line)
        .unwrap_or(body.position.line);
    emit(
        c,
        Instruction::encode_abc(OpCode::Return, 0, 1, 0),
        end_line,
    );
    let state = c.states.pop().expect("unbalanced function state");
    let chunk = super::finish_state(state);
    let parent = fs(c);
    parent.chunk.child_protos.push(std::rc::Rc::new(chunk));
    Ok((parent.chunk.child_protos.len() - 1) as u32)
}
