// The register VM: frame stack, instruction dispatch, closure/upvalue
// machinery, protected calls, and error construction with tracebacks.

pub mod arith;
mod lua_call_frame;
mod lua_error;
mod metamethod;
pub mod opcode;

use crate::compiler::Compiler;
use crate::gc::GC;
use crate::lib_registry;
use crate::lua_value::{
    Chunk, LuaFunction, LuaString, LuaTable, LuaUpvalue, LuaValue, MultiValue, NativeCallback,
    StringPool,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use smol_str::SmolStr;
use std::cell::RefCell;
use std::rc::Rc;

pub use crate::compiler::lexer::Position;
pub use lua_call_frame::{FrameFunc, LuaCallFrame};
pub use lua_error::{LuaError, LuaErrorKind, LuaResult, TraceFrame};
pub use opcode::{FIELDS_PER_BATCH, Instruction, OpCode};

/// Per-instance execution limits.
#[derive(Debug, Clone)]
pub struct LuaOptions {
    pub max_call_depth: usize,
    pub max_register_stack: usize,
}

impl Default for LuaOptions {
    fn default() -> Self {
        LuaOptions {
            max_call_depth: 200,
            max_register_stack: 1_000_000,
        }
    }
}

pub struct LuaVM {
    globals: Rc<RefCell<LuaTable>>,
    pub frames: Vec<LuaCallFrame>,
    /// Cells still aliasing live registers, for sibling sharing and closing.
    open_upvalues: Vec<Rc<LuaUpvalue>>,
    string_pool: StringPool,
    /// Metatable shared by all strings; `__index` is the string library.
    string_meta: Option<Rc<RefCell<LuaTable>>>,
    gc: GC,
    pub(crate) rng: SmallRng,
    next_frame_id: usize,
    return_buffer: Vec<LuaValue>,
    options: LuaOptions,
}

impl LuaVM {
    pub fn new() -> Self {
        Self::with_options(LuaOptions::default())
    }

    pub fn with_options(options: LuaOptions) -> Self {
        let globals = Rc::new(RefCell::new(LuaTable::new()));
        let mut vm = LuaVM {
            globals,
            frames: Vec::new(),
            open_upvalues: Vec::new(),
            string_pool: StringPool::new(),
            string_meta: None,
            gc: GC::new(),
            rng: SmallRng::seed_from_u64(0x5eed),
            next_frame_id: 0,
            return_buffer: Vec::new(),
            options,
        };
        let g = LuaValue::Table(vm.globals.clone());
        vm.globals.borrow_mut().raw_set_str("_G", g);
        vm.globals
            .borrow_mut()
            .raw_set_str("_VERSION", LuaValue::str("Lua 5.3"));
        vm
    }

    /// Bind the standard library into the globals table.
    pub fn open_libs(&mut self) {
        lib_registry::create_standard_registry().load_all(self);
        crate::stdlib::math::install_constants(self);
        crate::stdlib::package::install_fields(self);

        // Strings index into the string library: ("x"):upper().
        let string_lib = self.globals.borrow().raw_get_str("string");
        let meta = Rc::new(RefCell::new(LuaTable::new()));
        meta.borrow_mut().raw_set_str("__index", string_lib);
        self.string_meta = Some(meta);
    }

    // ---- host entry points ------------------------------------------------

    pub fn compile(&mut self, source: &str, chunk_name: &str) -> LuaResult<Chunk> {
        Compiler::compile(source, chunk_name)
    }

    /// Run a compiled chunk; returns its top-level return values.
    pub fn execute(&mut self, chunk: Rc<Chunk>) -> LuaResult<Vec<LuaValue>> {
        self.gc.record_allocation(chunk.code.len() * 8);
        let func = Rc::new(LuaFunction {
            chunk,
            upvalues: Vec::new(),
        });
        self.call_value(LuaValue::Function(func), Vec::new())
    }

    /// Compile and run a source string.
    pub fn execute_string(&mut self, source: &str) -> LuaResult<Vec<LuaValue>> {
        let chunk = self.compile(source, "chunk")?;
        self.execute(Rc::new(chunk))
    }

    pub fn globals(&self) -> Rc<RefCell<LuaTable>> {
        self.globals.clone()
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.globals.borrow().raw_get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.globals.borrow_mut().raw_set_str(name, value);
    }

    pub fn create_string(&mut self, s: String) -> Rc<LuaString> {
        self.gc.record_allocation(s.len());
        self.string_pool.intern(s)
    }

    pub fn create_string_value(&mut self, s: String) -> LuaValue {
        LuaValue::String(self.create_string(s))
    }

    pub fn create_table(&mut self) -> Rc<RefCell<LuaTable>> {
        self.gc.record_allocation(std::mem::size_of::<LuaTable>());
        Rc::new(RefCell::new(LuaTable::new()))
    }

    /// Wrap a Rust closure as a callable Lua value.
    pub fn create_callback<F>(&mut self, name: &str, func: F) -> LuaValue
    where
        F: Fn(&mut LuaVM) -> LuaResult<MultiValue> + 'static,
    {
        LuaValue::Callback(NativeCallback::new(name, func))
    }

    pub(crate) fn string_metatable(&self) -> Option<Rc<RefCell<LuaTable>>> {
        self.string_meta.clone()
    }

    // ---- errors and diagnostics ------------------------------------------

    /// Nearest Lua frame, for position reporting from native code.
    fn innermost_lua_frame(&self) -> Option<&LuaCallFrame> {
        self.frames.iter().rev().find(|f| f.is_lua())
    }

    pub fn current_source(&self) -> String {
        self.innermost_lua_frame()
            .and_then(|f| f.lua_function())
            .map(|f| f.chunk.source_name.to_string())
            .unwrap_or_else(|| "?".to_string())
    }

    pub fn current_line(&self) -> u32 {
        self.innermost_lua_frame()
            .and_then(|f| {
                f.lua_function()
                    .map(|func| func.chunk.line_at(f.pc.saturating_sub(1)))
            })
            .unwrap_or(0)
    }

    /// Build a runtime error, prefixing source:line and capturing the call
    /// chain (innermost first) with argument snapshots.
    pub fn error(&self, message: impl Into<String>) -> LuaError {
        let raw = message.into();
        let line = self.current_line();
        let message = if line > 0 {
            format!("{}:{}: {}", self.current_source(), line, raw)
        } else {
            raw
        };
        let mut err = LuaError::runtime(message);
        err.position = Some(Position::new(line, 0));
        err.traceback = self.build_traceback();
        err
    }

    pub fn build_traceback(&self) -> Vec<TraceFrame> {
        let mut trace = Vec::new();
        for frame in self.frames.iter().rev() {
            match &frame.func {
                FrameFunc::Lua(func) => {
                    let chunk = &func.chunk;
                    trace.push(TraceFrame {
                        name: chunk.name.clone(),
                        args: frame.registers[..chunk.param_count.min(frame.registers.len())]
                            .to_vec(),
                        source: chunk.source_name.to_string(),
                        line: chunk.line_at(frame.pc.saturating_sub(1)),
                    });
                }
                FrameFunc::Native(name) => {
                    trace.push(TraceFrame {
                        name: Some(name.to_string()),
                        args: frame.registers[1..].to_vec(),
                        source: "[native]".to_string(),
                        line: 0,
                    });
                }
            }
        }
        trace
    }

    // ---- calls ------------------------------------------------------------

    /// Call any callable value with `args`, collecting all results. This is
    /// the re-entrant path used by the host API, pcall, metamethods, and
    /// library callbacks.
    pub fn call_value(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        match func {
            LuaValue::Function(f) => {
                self.check_call_depth()?;
                let depth = self.frames.len();
                let frame_id = self.fresh_frame_id();
                self.frames.push(LuaCallFrame::new_lua(
                    frame_id,
                    f,
                    args,
                    0,
                    usize::MAX,
                    true,
                ));
                self.run_to_depth(depth)?;
                Ok(std::mem::take(&mut self.return_buffer))
            }
            LuaValue::CFunction(_) | LuaValue::Callback(_) => {
                self.call_native(func, &args).map(MultiValue::all_values)
            }
            other => {
                if let Some(handler) = self.get_metamethod(&other, "__call") {
                    let mut call_args = Vec::with_capacity(args.len() + 1);
                    call_args.push(other);
                    call_args.extend(args);
                    self.call_value(handler, call_args)
                } else {
                    Err(self.error(format!("attempt to call a {} value", other.type_name())))
                }
            }
        }
    }

    /// Call and keep only the first result.
    pub fn call_value_single(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<LuaValue> {
        let results = self.call_value(func, args)?;
        Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
    }

    fn check_call_depth(&self) -> LuaResult<()> {
        if self.frames.len() >= self.options.max_call_depth {
            return Err(self.error("stack overflow"));
        }
        let registers: usize = self.frames.iter().map(|f| f.registers.len()).sum();
        if registers > self.options.max_register_stack {
            return Err(self.error("register stack overflow"));
        }
        Ok(())
    }

    fn fresh_frame_id(&mut self) -> usize {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        id
    }

    /// Run a native function inside a lightweight frame so argument helpers
    /// and tracebacks see it.
    fn call_native(&mut self, func: LuaValue, args: &[LuaValue]) -> LuaResult<MultiValue> {
        self.check_call_depth()?;
        let (name, call): (SmolStr, _) = match &func {
            LuaValue::CFunction(f) => (SmolStr::new("builtin"), NativeKind::Plain(*f)),
            LuaValue::Callback(cb) => (cb.name.clone(), NativeKind::Closure(cb.clone())),
            _ => unreachable!("call_native on non-native value"),
        };
        let frame_id = self.fresh_frame_id();
        self.frames
            .push(LuaCallFrame::new_native(frame_id, name, func, args));
        let result = match call {
            NativeKind::Plain(f) => f(self),
            NativeKind::Closure(cb) => (cb.func)(self),
        };
        self.frames.pop();
        result
    }

    // ---- the dispatch loop ------------------------------------------------

    /// Execute until the frame stack returns to `base_depth`. On error the
    /// frames above `base_depth` are unwound (cells closed) before the error
    /// propagates.
    fn run_to_depth(&mut self, base_depth: usize) -> LuaResult<()> {
        let mut gc_tick = 0u32;
        while self.frames.len() > base_depth {
            gc_tick += 1;
            if gc_tick >= 1024 {
                gc_tick = 0;
                if self.gc.should_collect() {
                    self.collect_garbage();
                }
            }

            let idx = self.frames.len() - 1;
            let func = match self.frames[idx].lua_function() {
                Some(f) => f,
                None => {
                    return Err(LuaError::runtime("internal: native frame in dispatch"));
                }
            };

            let pc = self.frames[idx].pc;
            if pc >= func.chunk.code.len() {
                self.do_return(Vec::new());
                continue;
            }
            let instr = func.chunk.code[pc];
            self.frames[idx].pc = pc + 1;

            if let Err(err) = self.exec_instr(instr, &func) {
                self.unwind_to(base_depth);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Pop frames down to `depth`, closing any upvalue cells that still
    /// point into them so captured locals survive the unwind.
    fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            let frame_id = self.frames.last().map(|f| f.frame_id).unwrap_or(0);
            self.close_upvalues_from(frame_id, 0);
            self.frames.pop();
        }
    }

    fn exec_instr(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        use OpCode::*;
        let op = Instruction::get_opcode(instr);
        match op {
            Move => self.op_move(instr),
            LoadK => self.op_loadk(instr, func),
            LoadNil => self.op_loadnil(instr),
            LoadBool => self.op_loadbool(instr),
            NewTable => self.op_newtable(instr),
            GetTable => self.op_gettable(instr),
            SetTable => self.op_settable(instr),
            GetField => self.op_getfield(instr, func),
            SetField => self.op_setfield(instr, func),
            SelfGet => self.op_selfget(instr, func),
            SetList => self.op_setlist(instr),
            Add | Sub | Mul | Div | IDiv | Mod | Pow => self.op_arith(op, instr),
            Unm => self.op_unm(instr),
            Not => self.op_not(instr),
            Len => self.op_len(instr),
            BAnd | BOr | BXor | Shl | Shr => self.op_bitwise(op, instr),
            BNot => self.op_bnot(instr),
            Eq | Ne | Lt | Le | Gt | Ge => self.op_compare(op, instr),
            Concat => self.op_concat(instr),
            Jmp => self.op_jmp(instr),
            Test => self.op_test(instr),
            Call => self.op_call(instr),
            TailCall => self.op_tailcall(instr),
            Return => self.op_return(instr),
            VarArg => self.op_vararg(instr),
            Closure => self.op_closure(instr, func),
            GetUpval => self.op_getupval(instr, func),
            SetUpval => self.op_setupval(instr, func),
            CloseUpvals => self.op_closeupvals(instr),
            GetGlobal => self.op_getglobal(instr, func),
            SetGlobal => self.op_setglobal(instr, func),
            ForPrep => self.op_forprep(instr),
            ForLoop => self.op_forloop(instr),
            TForCall => self.op_tforcall(instr),
            TForLoop => self.op_tforloop(instr),
        }
    }

    #[inline]
    fn cur(&self) -> usize {
        self.frames.len() - 1
    }

    #[inline]
    fn reg(&self, i: usize) -> LuaValue {
        self.frames[self.cur()].reg(i)
    }

    #[inline]
    fn set_reg(&mut self, i: usize, value: LuaValue) {
        let idx = self.cur();
        self.frames[idx].set_reg(i, value);
    }

    // ---- loads ------------------------------------------------------------

    fn op_move(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let value = self.reg(b);
        self.set_reg(a, value);
        Ok(())
    }

    fn op_loadk(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let bx = Instruction::get_bx(instr) as usize;
        let value = func.chunk.constants[bx].clone();
        self.set_reg(a, value);
        Ok(())
    }

    fn op_loadnil(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let extra = Instruction::get_b(instr) as usize;
        for i in 0..=extra {
            self.set_reg(a + i, LuaValue::Nil);
        }
        Ok(())
    }

    fn op_loadbool(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr);
        self.set_reg(a, LuaValue::Boolean(b != 0));
        Ok(())
    }

    // ---- tables -----------------------------------------------------------

    fn op_newtable(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let table = self.create_table();
        self.set_reg(a, LuaValue::Table(table));
        Ok(())
    }

    fn op_gettable(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let container = self.reg(b);
        let key = self.reg(c);
        let value = self.index_value(&container, &key)?;
        self.set_reg(a, value);
        Ok(())
    }

    fn op_settable(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let container = self.reg(a);
        let key = self.reg(b);
        let value = self.reg(c);
        self.newindex_value(&container, key, value)
    }

    fn op_getfield(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let container = self.reg(b);
        let key = func.chunk.constants[c].clone();
        let value = self.index_value(&container, &key)?;
        self.set_reg(a, value);
        Ok(())
    }

    fn op_setfield(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let container = self.reg(a);
        let key = func.chunk.constants[b].clone();
        let value = self.reg(c);
        self.newindex_value(&container, key, value)
    }

    fn op_selfget(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let obj = self.reg(b);
        let key = func.chunk.constants[c].clone();
        let method = self.index_value(&obj, &key)?;
        self.set_reg(a + 1, obj);
        self.set_reg(a, method);
        Ok(())
    }

    fn op_setlist(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let idx = self.cur();
        let count = if b == 0 {
            self.frames[idx].top.saturating_sub(a + 1)
        } else {
            b
        };
        let table = match self.reg(a) {
            LuaValue::Table(t) => t,
            other => {
                return Err(self.error(format!(
                    "internal: SetList on a {} value",
                    other.type_name()
                )));
            }
        };
        let start = (c - 1) * FIELDS_PER_BATCH;
        for i in 0..count {
            let value = self.reg(a + 1 + i);
            table
                .borrow_mut()
                .raw_set_int((start + i + 1) as i64, value);
        }
        Ok(())
    }

    // ---- control flow -----------------------------------------------------

    fn op_jmp(&mut self, instr: u32) -> LuaResult<()> {
        let sbx = Instruction::get_sbx(instr);
        let idx = self.cur();
        self.frames[idx].pc = (self.frames[idx].pc as i64 + sbx as i64) as usize;
        Ok(())
    }

    fn op_test(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let c = Instruction::get_c(instr);
        if self.reg(a).is_truthy() == (c != 0) {
            let idx = self.cur();
            self.frames[idx].pc += 1;
        }
        Ok(())
    }

    // ---- calls ------------------------------------------------------------

    fn gather_call(&self, a: usize, b: usize) -> (LuaValue, Vec<LuaValue>) {
        let frame = &self.frames[self.cur()];
        let func = frame.reg(a);
        let nargs = if b == 0 {
            frame.top.saturating_sub(a + 1)
        } else {
            b - 1
        };
        let args = (0..nargs).map(|i| frame.reg(a + 1 + i)).collect();
        (func, args)
    }

    fn op_call(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let (func, args) = self.gather_call(a, b);
        let want = if c == 0 { usize::MAX } else { c - 1 };
        self.call_into_register(func, args, a, want)
    }

    /// Begin a call whose results land in the current frame at `result_reg`.
    /// Lua callees push a frame and return control to the dispatch loop;
    /// native callees complete synchronously.
    fn call_into_register(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        result_reg: usize,
        want: usize,
    ) -> LuaResult<()> {
        match func {
            LuaValue::Function(f) => {
                self.check_call_depth()?;
                let frame_id = self.fresh_frame_id();
                self.frames.push(LuaCallFrame::new_lua(
                    frame_id, f, args, result_reg, want, false,
                ));
                Ok(())
            }
            LuaValue::CFunction(_) | LuaValue::Callback(_) => {
                let results = self.call_native(func, &args)?.all_values();
                let idx = self.cur();
                deliver_results(&mut self.frames[idx], result_reg, want, results);
                Ok(())
            }
            other => {
                if let Some(handler) = self.get_metamethod(&other, "__call") {
                    let mut call_args = Vec::with_capacity(args.len() + 1);
                    call_args.push(other);
                    call_args.extend(args);
                    self.call_into_register(handler, call_args, result_reg, want)
                } else {
                    Err(self.error(format!("attempt to call a {} value", other.type_name())))
                }
            }
        }
    }

    fn op_tailcall(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let (func, args) = self.gather_call(a, b);

        // The current frame ends here; the callee inherits its return slot.
        let frame = {
            let frame_id = self.frames.last().map(|f| f.frame_id).unwrap_or(0);
            self.close_upvalues_from(frame_id, 0);
            self.frames.pop().expect("tail call without a frame")
        };

        match func {
            LuaValue::Function(f) => {
                let frame_id = self.fresh_frame_id();
                self.frames.push(LuaCallFrame::new_lua(
                    frame_id,
                    f,
                    args,
                    frame.result_reg,
                    frame.want_results,
                    frame.returns_to_buffer,
                ));
                Ok(())
            }
            LuaValue::CFunction(_) | LuaValue::Callback(_) => {
                let results = self.call_native(func, &args)?.all_values();
                self.finish_return(&frame, results);
                Ok(())
            }
            other => {
                if let Some(handler) = self.get_metamethod(&other, "__call") {
                    let mut call_args = Vec::with_capacity(args.len() + 1);
                    call_args.push(other);
                    call_args.extend(args);
                    let frame_id = self.fresh_frame_id();
                    match handler {
                        LuaValue::Function(f) => {
                            self.frames.push(LuaCallFrame::new_lua(
                                frame_id,
                                f,
                                call_args,
                                frame.result_reg,
                                frame.want_results,
                                frame.returns_to_buffer,
                            ));
                            Ok(())
                        }
                        native @ (LuaValue::CFunction(_) | LuaValue::Callback(_)) => {
                            let results = self.call_native(native, &call_args)?.all_values();
                            self.finish_return(&frame, results);
                            Ok(())
                        }
                        _ => Err(self.error("attempt to call a non-callable '__call'")),
                    }
                } else {
                    Err(self.error(format!("attempt to call a {} value", other.type_name())))
                }
            }
        }
    }

    fn op_return(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let frame = &self.frames[self.cur()];
        let count = if b == 0 {
            frame.top.saturating_sub(a)
        } else {
            b - 1
        };
        let results: Vec<LuaValue> = (0..count).map(|i| frame.reg(a + i)).collect();
        self.do_return(results);
        Ok(())
    }

    /// Pop the current frame and deliver its results.
    fn do_return(&mut self, results: Vec<LuaValue>) {
        let frame_id = self.frames.last().map(|f| f.frame_id).unwrap_or(0);
        self.close_upvalues_from(frame_id, 0);
        let frame = self.frames.pop().expect("return without a frame");
        self.finish_return(&frame, results);
    }

    fn finish_return(&mut self, frame: &LuaCallFrame, results: Vec<LuaValue>) {
        if frame.returns_to_buffer || self.frames.is_empty() {
            self.return_buffer = results;
        } else {
            let idx = self.cur();
            deliver_results(
                &mut self.frames[idx],
                frame.result_reg,
                frame.want_results,
                results,
            );
        }
    }

    fn op_vararg(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let idx = self.cur();
        let varargs = self.frames[idx].varargs.clone();
        if b == 0 {
            for (i, v) in varargs.iter().enumerate() {
                self.frames[idx].set_reg(a + i, v.clone());
            }
            self.frames[idx].top = a + varargs.len();
        } else {
            for i in 0..(b - 1) {
                let v = varargs.get(i).cloned().unwrap_or(LuaValue::Nil);
                self.frames[idx].set_reg(a + i, v);
            }
        }
        Ok(())
    }

    // ---- closures and upvalues --------------------------------------------

    fn op_closure(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let bx = Instruction::get_bx(instr) as usize;
        let proto = func.chunk.child_protos[bx].clone();
        let frame_id = self.frames[self.cur()].frame_id;

        let mut upvalues = Vec::with_capacity(proto.upvalue_descs.len());
        for desc in &proto.upvalue_descs {
            if desc.from_parent_local {
                upvalues.push(self.find_or_create_upvalue(frame_id, desc.index as usize));
            } else {
                upvalues.push(func.upvalues[desc.index as usize].clone());
            }
        }

        self.gc.record_allocation(std::mem::size_of::<LuaFunction>());
        self.set_reg(
            a,
            LuaValue::Function(Rc::new(LuaFunction {
                chunk: proto,
                upvalues,
            })),
        );
        Ok(())
    }

    /// One cell per (frame, register): siblings capturing the same local
    /// share the cell this returns.
    fn find_or_create_upvalue(&mut self, frame_id: usize, register: usize) -> Rc<LuaUpvalue> {
        for cell in &self.open_upvalues {
            if cell.points_to(frame_id, register) {
                return cell.clone();
            }
        }
        let cell = LuaUpvalue::new_open(frame_id, register);
        self.open_upvalues.push(cell.clone());
        cell
    }

    fn op_getupval(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let value = func.upvalues[b].get(&self.frames);
        self.set_reg(a, value);
        Ok(())
    }

    fn op_setupval(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let b = Instruction::get_b(instr) as usize;
        let value = self.reg(a);
        func.upvalues[b].set(&mut self.frames, value);
        Ok(())
    }

    fn op_closeupvals(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let frame_id = self.frames[self.cur()].frame_id;
        self.close_upvalues_from(frame_id, a);
        Ok(())
    }

    /// Close every open cell aliasing `frame_id` at register >= `from`,
    /// migrating the current register value into the cell.
    fn close_upvalues_from(&mut self, frame_id: usize, from: usize) {
        let cells = std::mem::take(&mut self.open_upvalues);
        let mut kept = Vec::with_capacity(cells.len());
        for cell in cells {
            match cell.location() {
                Some((fid, reg)) if fid == frame_id && reg >= from => {
                    let value = self
                        .frames
                        .iter()
                        .rev()
                        .find(|f| f.frame_id == fid)
                        .map(|f| f.reg(reg))
                        .unwrap_or(LuaValue::Nil);
                    cell.close(value);
                }
                Some(_) => kept.push(cell),
                None => {}
            }
        }
        self.open_upvalues = kept;
    }

    // ---- globals ----------------------------------------------------------

    fn op_getglobal(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let bx = Instruction::get_bx(instr) as usize;
        let key = func.chunk.constants[bx].clone();
        let container = LuaValue::Table(self.globals.clone());
        let value = self.index_value(&container, &key)?;
        self.set_reg(a, value);
        Ok(())
    }

    fn op_setglobal(&mut self, instr: u32, func: &Rc<LuaFunction>) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let bx = Instruction::get_bx(instr) as usize;
        let key = func.chunk.constants[bx].clone();
        let value = self.reg(a);
        let container = LuaValue::Table(self.globals.clone());
        self.newindex_value(&container, key, value)
    }

    // ---- loops ------------------------------------------------------------

    fn op_forprep(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let sbx = Instruction::get_sbx(instr);

        let init = self.reg(a);
        let limit = self.reg(a + 1);
        let step = self.reg(a + 2);

        let all_int = init.is_integer() && limit.is_integer() && step.is_integer();
        if all_int {
            let (i, l, s) = (
                init.as_integer().unwrap(),
                limit.as_integer().unwrap(),
                step.as_integer().unwrap(),
            );
            if s == 0 {
                return Err(self.error("'for' step is zero"));
            }
            self.set_reg(a, LuaValue::Integer(i.wrapping_sub(s)));
            self.set_reg(a + 1, LuaValue::Integer(l));
            self.set_reg(a + 2, LuaValue::Integer(s));
        } else {
            let i = init
                .as_float()
                .ok_or_else(|| self.error("'for' initial value must be a number"))?;
            let l = limit
                .as_float()
                .ok_or_else(|| self.error("'for' limit must be a number"))?;
            let s = step
                .as_float()
                .ok_or_else(|| self.error("'for' step must be a number"))?;
            if s == 0.0 {
                return Err(self.error("'for' step is zero"));
            }
            self.set_reg(a, LuaValue::Float(i - s));
            self.set_reg(a + 1, LuaValue::Float(l));
            self.set_reg(a + 2, LuaValue::Float(s));
        }

        let idx = self.cur();
        self.frames[idx].pc = (self.frames[idx].pc as i64 + sbx as i64) as usize;
        Ok(())
    }

    fn op_forloop(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let sbx = Instruction::get_sbx(instr);

        let continue_loop = match (self.reg(a), self.reg(a + 1), self.reg(a + 2)) {
            (LuaValue::Integer(i), LuaValue::Integer(l), LuaValue::Integer(s)) => {
                let next = i.wrapping_add(s);
                let wrapped = (s > 0 && next < i) || (s < 0 && next > i);
                let in_range = !wrapped && if s > 0 { next <= l } else { next >= l };
                if in_range {
                    self.set_reg(a, LuaValue::Integer(next));
                    self.set_reg(a + 3, LuaValue::Integer(next));
                }
                in_range
            }
            (init, limit, step) => {
                let i = init.as_float().unwrap_or(f64::NAN);
                let l = limit.as_float().unwrap_or(f64::NAN);
                let s = step.as_float().unwrap_or(f64::NAN);
                let next = i + s;
                let in_range = if s > 0.0 { next <= l } else { next >= l };
                if in_range {
                    self.set_reg(a, LuaValue::Float(next));
                    self.set_reg(a + 3, LuaValue::Float(next));
                }
                in_range
            }
        };

        if continue_loop {
            let idx = self.cur();
            self.frames[idx].pc = (self.frames[idx].pc as i64 + sbx as i64) as usize;
        }
        Ok(())
    }

    fn op_tforcall(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let c = Instruction::get_c(instr) as usize;
        let iter = self.reg(a);
        let state = self.reg(a + 1);
        let control = self.reg(a + 2);
        self.call_into_register(iter, vec![state, control], a + 3, c)
    }

    fn op_tforloop(&mut self, instr: u32) -> LuaResult<()> {
        let a = Instruction::get_a(instr) as usize;
        let sbx = Instruction::get_sbx(instr);
        let first = self.reg(a + 3);
        if !first.is_nil() {
            self.set_reg(a + 2, first);
            let idx = self.cur();
            self.frames[idx].pc = (self.frames[idx].pc as i64 + sbx as i64) as usize;
        }
        Ok(())
    }

    // ---- gc ---------------------------------------------------------------

    pub fn collect_garbage(&mut self) {
        let mut roots: Vec<LuaValue> = vec![LuaValue::Table(self.globals.clone())];
        for frame in &self.frames {
            roots.extend(frame.registers.iter().cloned());
            roots.extend(frame.varargs.iter().cloned());
        }
        for cell in &self.open_upvalues {
            if let Some(v) = cell.closed_value() {
                roots.push(v);
            }
        }
        self.gc.collect(&roots);
    }

    pub fn gc_stats(&self) -> crate::gc::GCStats {
        self.gc.stats()
    }
}

impl Default for LuaVM {
    fn default() -> Self {
        Self::new()
    }
}

enum NativeKind {
    Plain(crate::lua_value::CFunction),
    Closure(Rc<NativeCallback>),
}

/// Copy call results into the caller's frame per the wanted count.
fn deliver_results(
    frame: &mut LuaCallFrame,
    result_reg: usize,
    want: usize,
    results: Vec<LuaValue>,
) {
    if want == usize::MAX {
        let n = results.len();
        for (i, v) in results.into_iter().enumerate() {
            frame.set_reg(result_reg + i, v);
        }
        frame.top = result_reg + n;
    } else {
        for i in 0..want {
            let v = results.get(i).cloned().unwrap_or(LuaValue::Nil);
            frame.set_reg(result_reg + i, v);
        }
    }
}
