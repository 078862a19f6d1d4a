// Runtime value representation for Lua 5.3
// Integers and floats are distinct tags, tables carry array + hash parts,
// upvalues are shared cells that migrate from stack slots to the heap.

mod lua_table;
mod lua_value;

use crate::lua_vm::{LuaCallFrame, LuaResult, LuaVM, Position};
use smol_str::SmolStr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::rc::Rc;

pub use lua_table::LuaTable;
pub use lua_value::{LuaValue, float_to_lua_string};

/// Multi-return values from Lua or native functions.
#[derive(Debug, Clone)]
pub struct MultiValue {
    pub values: Option<Vec<LuaValue>>,
}

impl MultiValue {
    pub fn empty() -> Self {
        MultiValue { values: None }
    }

    pub fn single(value: LuaValue) -> Self {
        MultiValue {
            values: Some(vec![value]),
        }
    }

    pub fn multiple(values: Vec<LuaValue>) -> Self {
        MultiValue {
            values: Some(values),
        }
    }

    pub fn all_values(self) -> Vec<LuaValue> {
        self.values.unwrap_or_default()
    }

    pub fn first(&self) -> LuaValue {
        self.values
            .as_ref()
            .and_then(|v| v.first().cloned())
            .unwrap_or(LuaValue::Nil)
    }
}

/// Plain native function registered in the standard library tables.
pub type CFunction = fn(&mut LuaVM) -> LuaResult<MultiValue>;

/// Native closure value. Unlike [`CFunction`] it can capture environment,
/// which the host facade and iterator factories (`gmatch`) rely on.
pub struct NativeCallback {
    pub name: SmolStr,
    pub func: Box<dyn Fn(&mut LuaVM) -> LuaResult<MultiValue>>,
}

impl NativeCallback {
    pub fn new<F>(name: &str, func: F) -> Rc<Self>
    where
        F: Fn(&mut LuaVM) -> LuaResult<MultiValue> + 'static,
    {
        Rc::new(NativeCallback {
            name: SmolStr::new(name),
            func: Box::new(func),
        })
    }
}

impl fmt::Debug for NativeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeCallback({})", self.name)
    }
}

/// Immutable Lua string with a cached hash so table lookups and interning
/// only hash the bytes once.
#[derive(Debug, Clone)]
pub struct LuaString {
    data: String,
    hash: u64,
}

impl LuaString {
    pub fn new(s: String) -> Self {
        let mut hasher = ahash::AHasher::default();
        std::hash::Hash::hash(&s, &mut hasher);
        let hash = hasher.finish();
        LuaString { data: s, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    #[inline]
    pub fn cached_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for LuaString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}

impl Eq for LuaString {}

impl std::hash::Hash for LuaString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Runtime upvalue cell. Open cells alias a live register of an activation,
/// closed cells own their value. All closures that captured the same outer
/// local share one `Rc<LuaUpvalue>`, so writes through one closure are seen
/// by every sibling.
pub struct LuaUpvalue {
    state: RefCell<UpvalueState>,
}

#[derive(Debug)]
enum UpvalueState {
    Open { frame_id: usize, register: usize },
    Closed(LuaValue),
}

impl LuaUpvalue {
    pub fn new_open(frame_id: usize, register: usize) -> Rc<Self> {
        Rc::new(LuaUpvalue {
            state: RefCell::new(UpvalueState::Open { frame_id, register }),
        })
    }

    pub fn new_closed(value: LuaValue) -> Rc<Self> {
        Rc::new(LuaUpvalue {
            state: RefCell::new(UpvalueState::Closed(value)),
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), UpvalueState::Open { .. })
    }

    pub fn points_to(&self, frame_id: usize, register: usize) -> bool {
        match *self.state.borrow() {
            UpvalueState::Open {
                frame_id: fid,
                register: reg,
            } => fid == frame_id && reg == register,
            _ => false,
        }
    }

    pub fn location(&self) -> Option<(usize, usize)> {
        match *self.state.borrow() {
            UpvalueState::Open { frame_id, register } => Some((frame_id, register)),
            _ => None,
        }
    }

    /// Migrate the value out of the stack slot. No-op on closed cells.
    pub fn close(&self, stack_value: LuaValue) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, UpvalueState::Open { .. }) {
            *state = UpvalueState::Closed(stack_value);
        }
    }

    pub fn get(&self, frames: &[LuaCallFrame]) -> LuaValue {
        let state = self.state.borrow();
        match *state {
            UpvalueState::Open { frame_id, register } => {
                drop(state);
                frames
                    .iter()
                    .rev()
                    .find(|f| f.frame_id == frame_id)
                    .and_then(|f| f.registers.get(register).cloned())
                    .unwrap_or(LuaValue::Nil)
            }
            UpvalueState::Closed(ref val) => val.clone(),
        }
    }

    pub fn set(&self, frames: &mut [LuaCallFrame], value: LuaValue) {
        let state = self.state.borrow();
        match *state {
            UpvalueState::Open { frame_id, register } => {
                drop(state);
                if let Some(frame) = frames.iter_mut().rev().find(|f| f.frame_id == frame_id) {
                    if register < frame.registers.len() {
                        frame.registers[register] = value;
                    }
                }
            }
            UpvalueState::Closed(_) => {
                drop(state);
                *self.state.borrow_mut() = UpvalueState::Closed(value);
            }
        }
    }

    /// Closed value for the GC mark pass; open cells are reached through
    /// their frame registers instead.
    pub fn closed_value(&self) -> Option<LuaValue> {
        match *self.state.borrow() {
            UpvalueState::Closed(ref val) => Some(val.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for LuaUpvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.state.borrow() {
            UpvalueState::Open { frame_id, register } => {
                write!(f, "Upvalue::Open(frame={}, reg={})", frame_id, register)
            }
            UpvalueState::Closed(ref val) => write!(f, "Upvalue::Closed({:?})", val),
        }
    }
}

/// A closure: a compiled prototype plus one cell per upvalue descriptor.
pub struct LuaFunction {
    pub chunk: Rc<Chunk>,
    pub upvalues: Vec<Rc<LuaUpvalue>>,
}

/// How a closure obtains one upvalue at creation time: either by capturing a
/// register of the enclosing activation, or by sharing one of the enclosing
/// closure's own cells.
#[derive(Debug, Clone, Copy)]
pub struct UpvalueDesc {
    pub from_parent_local: bool,
    pub index: u32,
}

/// A local variable slot recorded for diagnostics, with the instruction
/// range where it is live.
#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: SmolStr,
    pub register: u32,
    pub start_pc: usize,
    pub end_pc: usize,
}

/// The static, immutable compiled form of a function.
#[derive(Debug)]
pub struct Chunk {
    pub code: Vec<u32>,
    pub constants: Vec<LuaValue>,
    pub locals: Vec<LocalVar>,
    pub upvalue_descs: Vec<UpvalueDesc>,
    pub child_protos: Vec<Rc<Chunk>>,
    pub param_count: usize,
    pub is_vararg: bool,
    pub max_stack_size: usize,
    pub source_name: SmolStr,
    /// Declared name for tracebacks (`function a.b.c` etc), when known.
    pub name: Option<String>,
    /// Source line of each instruction, parallel to `code`.
    pub line_info: Vec<u32>,
}

impl Chunk {
    pub fn new(source_name: SmolStr) -> Self {
        Chunk {
            code: Vec::new(),
            constants: Vec::new(),
            locals: Vec::new(),
            upvalue_descs: Vec::new(),
            child_protos: Vec::new(),
            param_count: 0,
            is_vararg: false,
            max_stack_size: 0,
            source_name,
            name: None,
            line_info: Vec::new(),
        }
    }

    pub fn line_at(&self, pc: usize) -> u32 {
        self.line_info.get(pc).copied().unwrap_or(0)
    }

    pub fn position_at(&self, pc: usize) -> Position {
        Position {
            line: self.line_at(pc),
            column: 0,
        }
    }
}

/// Userdata: host data with an optional metatable.
#[derive(Clone)]
pub struct LuaUserdata {
    data: Rc<RefCell<Box<dyn std::any::Any>>>,
    metatable: Rc<RefCell<Option<Rc<RefCell<LuaTable>>>>>,
}

impl LuaUserdata {
    pub fn new<T: std::any::Any>(data: T) -> Self {
        LuaUserdata {
            data: Rc::new(RefCell::new(Box::new(data))),
            metatable: Rc::new(RefCell::new(None)),
        }
    }

    pub fn data(&self) -> Rc<RefCell<Box<dyn std::any::Any>>> {
        self.data.clone()
    }

    pub fn metatable(&self) -> Option<Rc<RefCell<LuaTable>>> {
        self.metatable.borrow().clone()
    }

    pub fn set_metatable(&self, mt: Option<Rc<RefCell<LuaTable>>>) {
        *self.metatable.borrow_mut() = mt;
    }
}

impl fmt::Debug for LuaUserdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Userdata({:p})", self.data.as_ptr())
    }
}

/// Short-string interning pool. Short strings are deduplicated so repeated
/// constants and table keys share one allocation; long strings are not worth
/// the map probe.
pub struct StringPool {
    max_short_len: usize,
    pool: HashMap<String, Rc<LuaString>, ahash::RandomState>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::with_max_len(40)
    }

    pub fn with_max_len(max_short_len: usize) -> Self {
        StringPool {
            max_short_len,
            pool: HashMap::default(),
        }
    }

    pub fn intern(&mut self, s: String) -> Rc<LuaString> {
        if s.len() <= self.max_short_len {
            if let Some(existing) = self.pool.get(&s) {
                return Rc::clone(existing);
            }
            let lua_str = Rc::new(LuaString::new(s.clone()));
            self.pool.insert(s, Rc::clone(&lua_str));
            lua_str
        } else {
            Rc::new(LuaString::new(s))
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_short_strings() {
        let mut pool = StringPool::new();
        let a = pool.intern("hello".to_string());
        let b = pool.intern("hello".to_string());
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn skips_long_strings() {
        let mut pool = StringPool::with_max_len(8);
        let long = "x".repeat(64);
        let a = pool.intern(long.clone());
        let b = pool.intern(long);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn upvalue_cell_closes_once() {
        let cell = LuaUpvalue::new_open(7, 2);
        assert!(cell.is_open());
        assert!(cell.points_to(7, 2));
        cell.close(LuaValue::Integer(42));
        assert!(!cell.is_open());
        cell.close(LuaValue::Integer(99));
        assert_eq!(cell.closed_value(), Some(LuaValue::Integer(42)));
    }
}
