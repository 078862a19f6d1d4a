// Statement lowering: scopes, assignment forms, control flow with
// back-patched jumps, and the two for-loop shapes.

use super::expr::{
    compile_call_expr, compile_expr, compile_expr_into, compile_function, explist_open,
    explist_to_count,
};
use super::parser::ast::{Expr, FuncName, Meta, Stat};
use super::{Compiler, Want, helpers::*};
use crate::lua_vm::{Instruction, LuaError, OpCode};

pub(crate) fn compile_block(c: &mut Compiler, block: &[Stat]) -> Result<(), LuaError> {
    for stat in block {
        compile_stat(c, stat)?;
        reclaim_registers(c);
    }
    Ok(())
}

pub(crate) fn compile_stat(c: &mut Compiler, stat: &Stat) -> Result<(), LuaError> {
    match stat {
        Stat::Local { names, values, meta } => compile_local(c, names, values, meta),
        Stat::LocalFunction { name, body, .. } => {
            let reg = alloc_register(c);
            // Declared before its body compiles, so the body can recurse.
            add_local(c, name, reg);
            let proto = compile_function(c, body)?;
            emit(
                c,
                Instruction::encode_abx(OpCode::Closure, reg, proto),
                body.position.line,
            );
            Ok(())
        }
        Stat::Assign {
            targets,
            values,
            meta,
        } => compile_assign(c, targets, values, meta),
        Stat::Call(expr, _) => {
            compile_call_expr(c, expr, Want::Fixed(0))?;
            Ok(())
        }
        Stat::Do(body, meta) => {
            begin_scope(c);
            compile_block(c, body)?;
            end_scope(c, meta.position.line);
            Ok(())
        }
        Stat::If {
            arms,
            else_block,
            meta,
        } => compile_if(c, arms, else_block.as_deref(), meta),
        Stat::While { cond, body, meta } => compile_while(c, cond, body, meta),
        Stat::Repeat { body, cond, meta } => compile_repeat(c, body, cond, meta),
        Stat::NumericFor {
            var,
            start,
            limit,
            step,
            body,
            meta,
        } => compile_numeric_for(c, var, start, limit, step.as_ref(), body, meta),
        Stat::GenericFor {
            names,
            exprs,
            body,
            meta,
        } => compile_generic_for(c, names, exprs, body, meta),
        Stat::Function { name, body, meta } => compile_function_stat(c, name, body, meta),
        Stat::Return { exprs, meta } => compile_return(c, exprs, meta),
        Stat::Break(meta) => emit_break(c, meta.position),
        Stat::Goto(_, meta) | Stat::Label(_, meta) => Err(err_at(
            "goto is not supported by this interpreter",
            meta.position,
        )),
    }
}

fn compile_local(
    c: &mut Compiler,
    names: &[smol_str::SmolStr],
    values: &[Expr],
    meta: &Meta,
) -> Result<(), LuaError> {
    let count = names.len() as u32;
    let base = explist_to_count(c, values, count, meta.position.line)?;
    // Locals come into scope only after their initializers ran.
    for (i, name) in names.iter().enumerate() {
        add_local(c, name, base + i as u32);
    }
    Ok(())
}

fn compile_assign(
    c: &mut Compiler,
    targets: &[Expr],
    values: &[Expr],
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;

    // Common single assignment into a local writes in place.
    if targets.len() == 1 && values.len() == 1 {
        if let Expr::Name(name, _) = &targets[0] {
            let level = c.states.len() - 1;
            if let Some(reg) = resolve_local(c, level, name) {
                compile_expr_into(c, &values[0], reg)?;
                return Ok(());
            }
        }
    }

    let base = explist_to_count(c, values, targets.len() as u32, line)?;
    for (i, target) in targets.iter().enumerate() {
        assign_to_target(c, target, base + i as u32)?;
    }
    Ok(())
}

fn assign_to_target(c: &mut Compiler, target: &Expr, src: u32) -> Result<(), LuaError> {
    let line = target.position().line;
    match target {
        Expr::Name(name, _) => {
            let level = c.states.len() - 1;
            if let Some(reg) = resolve_local(c, level, name) {
                emit_move(c, reg, src, line);
            } else if let Some(up) = resolve_upvalue(c, level, name) {
                emit(c, Instruction::encode_abc(OpCode::SetUpval, src, up, 0), line);
            } else {
                let k = string_constant(c, name);
                emit(c, Instruction::encode_abx(OpCode::SetGlobal, src, k), line);
            }
            Ok(())
        }
        Expr::Index { obj, key, .. } => {
            let mark = fs(c).next_register;
            let obj_reg = compile_expr(c, obj)?;
            if let Expr::Str(s, _) = key.as_ref() {
                let k = string_constant(c, s);
                if k <= Instruction::MAX_B {
                    emit(
                        c,
                        Instruction::encode_abc(OpCode::SetField, obj_reg, k, src),
                        line,
                    );
                    fs(c).next_register = mark;
                    return Ok(());
                }
            }
            let key_reg = compile_expr(c, key)?;
            emit(
                c,
                Instruction::encode_abc(OpCode::SetTable, obj_reg, key_reg, src),
                line,
            );
            fs(c).next_register = mark;
            Ok(())
        }
        other => Err(err_at("cannot assign to this expression", other.position())),
    }
}

fn compile_if(
    c: &mut Compiler,
    arms: &[(Expr, Vec<Stat>)],
    else_block: Option<&[Stat]>,
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;
    let mut end_jumps = Vec::new();

    for (i, (cond, body)) in arms.iter().enumerate() {
        let mark = fs(c).next_register;
        let cond_reg = compile_expr(c, cond)?;
        emit(
            c,
            Instruction::encode_abc(OpCode::Test, cond_reg, 0, 1),
            cond.position().line,
        );
        let jump_false = emit_jump(c, cond.position().line);
        fs(c).next_register = mark;

        begin_scope(c);
        compile_block(c, body)?;
        end_scope(c, line);

        let has_more = i + 1 < arms.len() || else_block.is_some();
        if has_more {
            end_jumps.push(emit_jump(c, line));
        }
        patch_jump_here(c, jump_false);
    }

    if let Some(body) = else_block {
        begin_scope(c);
        compile_block(c, body)?;
        end_scope(c, line);
    }

    for pos in end_jumps {
        patch_jump_here(c, pos);
    }
    Ok(())
}

fn compile_while(
    c: &mut Compiler,
    cond: &Expr,
    body: &[Stat],
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;
    begin_loop(c);
    let loop_start = fs_ref(c).chunk.code.len();

    let mark = fs(c).next_register;
    let cond_reg = compile_expr(c, cond)?;
    emit(
        c,
        Instruction::encode_abc(OpCode::Test, cond_reg, 0, 1),
        cond.position().line,
    );
    let exit_jump = emit_jump(c, line);
    fs(c).next_register = mark;

    begin_scope(c);
    compile_block(c, body)?;
    end_scope(c, line);

    let back = emit_jump(c, line);
    patch_jump_to(c, back, loop_start);
    patch_jump_here(c, exit_jump);
    end_loop(c);
    Ok(())
}

fn compile_repeat(
    c: &mut Compiler,
    body: &[Stat],
    cond: &Expr,
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;
    begin_loop(c);
    let loop_start = fs_ref(c).chunk.code.len();

    begin_scope(c);
    compile_block(c, body)?;

    // The until-condition still sees the body's locals.
    let cond_reg = compile_expr(c, cond)?;
    emit(
        c,
        Instruction::encode_abc(OpCode::Test, cond_reg, 0, 1),
        cond.position().line,
    );
    let continue_jump = emit_jump(c, line);
    let exit_jump = emit_jump(c, line);

    patch_jump_here(c, continue_jump);
    emit_close_scope(c, line);
    let back = emit_jump(c, line);
    patch_jump_to(c, back, loop_start);

    patch_jump_here(c, exit_jump);
    end_scope(c, line);
    end_loop(c);
    Ok(())
}

fn compile_numeric_for(
    c: &mut Compiler,
    var: &smol_str::SmolStr,
    start: &Expr,
    limit: &Expr,
    step: Option<&Expr>,
    body: &[Stat],
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;

    // Induction triple plus the user-visible loop variable.
    let base = alloc_registers(c, 4);
    compile_expr_into(c, start, base)?;
    fs(c).next_register = base + 4;
    compile_expr_into(c, limit, base + 1)?;
    fs(c).next_register = base + 4;
    match step {
        Some(expr) => {
            compile_expr_into(c, expr, base + 2)?;
            fs(c).next_register = base + 4;
        }
        None => {
            let k = add_constant(c, crate::lua_value::LuaValue::Integer(1));
            emit(c, Instruction::encode_abx(OpCode::LoadK, base + 2, k), line);
        }
    }

    begin_loop(c);
    begin_scope(c);
    add_local(c, var, base + 3);

    let prep = emit(c, Instruction::encode_asbx(OpCode::ForPrep, base, 0), line);
    let body_start = fs_ref(c).chunk.code.len();
    compile_block(c, body)?;

    // Per-iteration capture: close cells over the loop variable before the
    // next step writes it.
    end_scope(c, line);

    let loop_pc = emit(c, Instruction::encode_asbx(OpCode::ForLoop, base, 0), line);
    patch_op_sbx(c, loop_pc, body_start, OpCode::ForLoop);
    patch_op_sbx(c, prep, loop_pc, OpCode::ForPrep);
    end_loop(c);
    Ok(())
}

fn compile_generic_for(
    c: &mut Compiler,
    names: &[smol_str::SmolStr],
    exprs: &[Expr],
    body: &[Stat],
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;

    // Control triple: iterator function, state, control value.
    let base = explist_to_count(c, exprs, 3, line)?;
    fs(c).next_register = base + 3;

    begin_loop(c);
    begin_scope(c);
    let var_base = alloc_registers(c, names.len() as u32);
    for (i, name) in names.iter().enumerate() {
        add_local(c, name, var_base + i as u32);
    }

    let prep = emit_jump(c, line);
    let body_start = fs_ref(c).chunk.code.len();
    compile_block(c, body)?;
    end_scope(c, line);

    patch_jump_here(c, prep);
    emit(
        c,
        Instruction::encode_abc(OpCode::TForCall, base, 0, names.len() as u32),
        line,
    );
    let loop_pc = emit(c, Instruction::encode_asbx(OpCode::TForLoop, base, 0), line);
    patch_op_sbx(c, loop_pc, body_start, OpCode::TForLoop);
    end_loop(c);
    Ok(())
}

fn compile_function_stat(
    c: &mut Compiler,
    name: &FuncName,
    body: &super::parser::ast::FuncBody,
    meta: &Meta,
) -> Result<(), LuaError> {
    let line = meta.position.line;
    let mark = fs(c).next_register;

    let func_reg = alloc_register(c);
    let proto = compile_function(c, body)?;
    emit(
        c,
        Instruction::encode_abx(OpCode::Closure, func_reg, proto),
        line,
    );

    // Bare `function f` binds like an assignment to `f`; a dotted name
    // assigns into the table path.
    let mut keys: Vec<&str> = name.path.iter().map(|s| s.as_str()).collect();
    if let Some(m) = &name.method {
        keys.push(m.as_str());
    }

    if keys.is_empty() {
        let target = Expr::Name(name.base.clone(), Meta::at(meta.position));
        assign_to_target(c, &target, func_reg)?;
        fs(c).next_register = mark;
        return Ok(());
    }

    let obj_reg = alloc_register(c);
    let base_name = name.base.clone();
    compile_expr_into(c, &Expr::Name(base_name, Meta::at(meta.position)), obj_reg)?;
    fs(c).next_register = obj_reg + 1;

    for key in &keys[..keys.len() - 1] {
        let k = string_constant(c, key);
        if k <= Instruction::MAX_C {
            emit(
                c,
                Instruction::encode_abc(OpCode::GetField, obj_reg, obj_reg, k),
                line,
            );
        } else {
            let kreg = alloc_register(c);
            emit(c, Instruction::encode_abx(OpCode::LoadK, kreg, k), line);
            emit(
                c,
                Instruction::encode_abc(OpCode::GetTable, obj_reg, obj_reg, kreg),
                line,
            );
            fs(c).next_register = obj_reg + 1;
        }
    }

    let last = keys[keys.len() - 1];
    let k = string_constant(c, last);
    if k <= Instruction::MAX_B {
        emit(
            c,
            Instruction::encode_abc(OpCode::SetField, obj_reg, k, func_reg),
            line,
        );
    } else {
        let kreg = alloc_register(c);
        emit(c, Instruction::encode_abx(OpCode::LoadK, kreg, k), line);
        emit(
            c,
            Instruction::encode_abc(OpCode::SetTable, obj_reg, kreg, func_reg),
            line,
        );
    }
    fs(c).next_register = mark;
    Ok(())
}

fn compile_return(c: &mut Compiler, exprs: &[Expr], meta: &Meta) -> Result<(), LuaError> {
    let line = meta.position.line;

    // `return f(...)` becomes a tail call: the frame is replaced instead of
    // stacked.
    if exprs.len() == 1 {
        if let Expr::Call { .. } | Expr::MethodCall { .. } = &exprs[0] {
            compile_tail_call(c, &exprs[0])?;
            return Ok(());
        }
    }

    let (base, b_field) = explist_open(c, exprs)?;
    emit(
        c,
        Instruction::encode_abc(OpCode::Return, base, b_field, 0),
        line,
    );
    Ok(())
}

/// Emit the callee/arguments setup of a call, finishing with TailCall.
fn compile_tail_call(c: &mut Compiler, expr: &Expr) -> Result<u32, LuaError> {
    // Reuse the call compiler, then rewrite the final Call into TailCall.
    let base = compile_call_expr(c, expr, Want::All)?;
    let state = fs(c);
    let last = state.chunk.code.len() - 1;
    let instr = state.chunk.code[last];
    debug_assert_eq!(Instruction::get_opcode(instr), OpCode::Call);
    let b = Instruction::get_b(instr);
    state.chunk.code[last] = Instruction::encode_abc(OpCode::TailCall, base, b, 0);
    Ok(base)
}
