// Lua 5.3 interpreter
// Lexer -> Pratt parser -> register bytecode compiler -> VM, with a
// sandboxed host-facing embedding API.

#[cfg(test)]
mod test;

pub mod api;
pub mod compiler;
pub mod gc;
pub mod lib_registry;
pub mod lua_pattern;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

pub use api::{HostValue, Lua, SandboxOptions};
pub use compiler::Compiler;
pub use gc::GC;
pub use lib_registry::LibraryRegistry;
pub use lua_value::{Chunk, LuaFunction, LuaString, LuaTable, LuaValue};
pub use lua_vm::{Instruction, LuaError, LuaErrorKind, LuaOptions, LuaResult, LuaVM, OpCode};

use std::rc::Rc;

/// Main entry point for executing Lua code on a fresh, unsandboxed VM.
pub fn execute(source: &str) -> LuaResult<Vec<LuaValue>> {
    let mut vm = LuaVM::new();
    vm.open_libs();
    let chunk = vm.compile(source, "chunk")?;
    vm.execute(Rc::new(chunk))
}

/// Execute Lua code with a caller-provided VM instance.
pub fn execute_with_vm(vm: &mut LuaVM, source: &str) -> LuaResult<Vec<LuaValue>> {
    let chunk = vm.compile(source, "chunk")?;
    vm.execute(Rc::new(chunk))
}
