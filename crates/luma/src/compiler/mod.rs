// Bytecode compiler: lowers the parsed AST into function prototypes.
// One FuncState per nested function literal; registers are a bump allocator
// with statement-level reclamation; upvalues resolve by walking the
// enclosing states.

pub mod lexer;
pub mod parser;

mod expr;
mod helpers;
mod stmt;

use crate::lua_value::{Chunk, LocalVar};
use crate::lua_vm::{Instruction, LuaError, OpCode};
use parser::LuaParser;
use parser::ast::Block;
use smol_str::SmolStr;

pub(crate) use helpers::*;
pub(crate) use stmt::compile_block;

/// How many values the surrounding context wants from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Want {
    Fixed(u32),
    All,
}

/// Per-function compile state.
pub(crate) struct FuncState {
    pub chunk: Chunk,
    /// Locals currently in scope, in register order.
    pub actives: Vec<LocalSlot>,
    pub scope_depth: usize,
    pub next_register: u32,
    pub loop_stack: Vec<LoopInfo>,
    pub upvalues: Vec<UpvalueInfo>,
}

pub(crate) struct LocalSlot {
    pub name: SmolStr,
    pub depth: usize,
    pub register: u32,
    /// Set when an inner closure captures this slot; scope exit must then
    /// close the cell.
    pub captured: bool,
    /// Index into chunk.locals, for end_pc patching.
    pub var_index: usize,
}

pub(crate) struct LoopInfo {
    pub break_jumps: Vec<usize>,
    /// Scope depth at loop entry, so break can close everything inside.
    pub scope_depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct UpvalueInfo {
    pub name: SmolStr,
    pub from_parent_local: bool,
    pub index: u32,
}

pub struct Compiler {
    pub(crate) states: Vec<FuncState>,
    pub(crate) source_name: SmolStr,
}

impl Compiler {
    /// Compile a source chunk into a prototype. The main chunk is vararg,
    /// as in Lua.
    pub fn compile(source: &str, source_name: &str) -> Result<Chunk, LuaError> {
        let block = LuaParser::parse(source).map_err(|errors| {
            let first_pos = errors.first().map(|e| e.position);
            let message = errors
                .iter()
                .map(|e| format!("{}: {}", e.position, e.message))
                .collect::<Vec<_>>()
                .join("\n");
            LuaError::compile(message, first_pos)
        })?;
        Self::compile_block_ast(&block, source_name)
    }

    /// Compile an already-parsed block (used by `load` and the tests).
    pub fn compile_block_ast(block: &Block, source_name: &str) -> Result<Chunk, LuaError> {
        let mut c = Compiler {
            states: Vec::new(),
            source_name: SmolStr::new(source_name),
        };
        c.push_state(&[], true, None);

        compile_block(&mut c, block)?;

        let last_line = block.last().map(|s| s.position().line).unwrap_or(1);
        emit(
            &mut c,
            Instruction::encode_abc(OpCode::Return, 0, 1, 0),
            last_line,
        );

        let state = c.states.pop().expect("compiler state underflow");
        Ok(finish_state(state))
    }

    pub(crate) fn push_state(
        &mut self,
        params: &[SmolStr],
        is_vararg: bool,
        name: Option<String>,
    ) {
        let mut chunk = Chunk::new(self.source_name.clone());
        chunk.param_count = params.len();
        chunk.is_vararg = is_vararg;
        chunk.name = name;

        let mut state = FuncState {
            chunk,
            actives: Vec::new(),
            scope_depth: 0,
            next_register: 0,
            loop_stack: Vec::new(),
            upvalues: Vec::new(),
        };

        for (i, param) in params.iter().enumerate() {
            state.chunk.locals.push(LocalVar {
                name: param.clone(),
                register: i as u32,
                start_pc: 0,
                end_pc: usize::MAX,
            });
            state.actives.push(LocalSlot {
                name: param.clone(),
                depth: 0,
                register: i as u32,
                captured: false,
                var_index: i,
            });
        }
        state.next_register = params.len() as u32;
        if state.next_register as usize > state.chunk.max_stack_size {
            state.chunk.max_stack_size = state.next_register as usize;
        }

        self.states.push(state);
    }
}

/// Seal a finished FuncState into its chunk.
pub(crate) fn finish_state(mut state: FuncState) -> Chunk {
    let end = state.chunk.code.len();
    for slot in &state.actives {
        if state.chunk.locals[slot.var_index].end_pc == usize::MAX {
            state.chunk.locals[slot.var_index].end_pc = end;
        }
    }
    for var in &mut state.chunk.locals {
        if var.end_pc == usize::MAX {
            var.end_pc = end;
        }
    }
    state.chunk.upvalue_descs = state
        .upvalues
        .iter()
        .map(|u| crate::lua_value::UpvalueDesc {
            from_parent_local: u.from_parent_local,
            index: u.index,
        })
        .collect();
    state.chunk
}
