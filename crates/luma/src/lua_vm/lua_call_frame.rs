// One activation record per call. Lua frames own a register window and the
// frame's vararg list; native frames hold [callee, args...] so argument
// accessors work uniformly.

use crate::lua_value::{LuaFunction, LuaValue};
use smol_str::SmolStr;
use std::rc::Rc;

pub enum FrameFunc {
    Lua(Rc<LuaFunction>),
    /// Native call; the name is kept for tracebacks.
    Native(SmolStr),
}

pub struct LuaCallFrame {
    pub frame_id: usize,
    pub func: FrameFunc,
    pub registers: Vec<LuaValue>,
    /// Live register count for open multi-value sequences (call args "to
    /// top", open returns, vararg expansion).
    pub top: usize,
    pub pc: usize,
    pub varargs: Vec<LuaValue>,
    /// Where the caller wants results, and how many (usize::MAX = all).
    pub result_reg: usize,
    pub want_results: usize,
    /// Deliver results to the VM's return buffer instead of a caller frame
    /// (set on frames started directly by the host or by call_value).
    pub returns_to_buffer: bool,
}

impl LuaCallFrame {
    pub fn new_lua(
        frame_id: usize,
        func: Rc<LuaFunction>,
        args: Vec<LuaValue>,
        result_reg: usize,
        want_results: usize,
        returns_to_buffer: bool,
    ) -> Self {
        let chunk = func.chunk.clone();
        let mut registers = vec![LuaValue::Nil; chunk.max_stack_size.max(chunk.param_count)];

        let mut varargs = Vec::new();
        for (i, arg) in args.into_iter().enumerate() {
            if i < chunk.param_count {
                registers[i] = arg;
            } else if chunk.is_vararg {
                varargs.push(arg);
            }
        }

        LuaCallFrame {
            frame_id,
            func: FrameFunc::Lua(func),
            registers,
            top: chunk.param_count,
            pc: 0,
            varargs,
            result_reg,
            want_results,
            returns_to_buffer,
        }
    }

    pub fn new_native(frame_id: usize, name: SmolStr, callee: LuaValue, args: &[LuaValue]) -> Self {
        let mut registers = Vec::with_capacity(args.len() + 1);
        registers.push(callee);
        registers.extend_from_slice(args);
        let top = registers.len();
        LuaCallFrame {
            frame_id,
            func: FrameFunc::Native(name),
            registers,
            top,
            pc: 0,
            varargs: Vec::new(),
            result_reg: 0,
            want_results: 0,
            returns_to_buffer: false,
        }
    }

    pub fn is_lua(&self) -> bool {
        matches!(self.func, FrameFunc::Lua(_))
    }

    pub fn lua_function(&self) -> Option<Rc<LuaFunction>> {
        match &self.func {
            FrameFunc::Lua(f) => Some(Rc::clone(f)),
            FrameFunc::Native(_) => None,
        }
    }

    #[inline]
    pub fn reg(&self, i: usize) -> LuaValue {
        self.registers.get(i).cloned().unwrap_or(LuaValue::Nil)
    }

    #[inline]
    pub fn set_reg(&mut self, i: usize, value: LuaValue) {
        if i >= self.registers.len() {
            self.registers.resize(i + 1, LuaValue::Nil);
        }
        self.registers[i] = value;
    }
}
