// The one error type that crosses every layer boundary. Compile failures
// (lexer, parser, compiler) and runtime failures (VM, stdlib, sandbox stubs,
// host callbacks) both travel as LuaError; only runtime errors are catchable
// by an in-guest pcall.

use crate::compiler::lexer::Position;
use crate::lua_value::LuaValue;
use std::fmt;

pub type LuaResult<T> = Result<T, LuaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaErrorKind {
    CompileError,
    RuntimeError,
}

/// One reconstructed call-chain entry, innermost first.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    /// Declared function name when the prototype carries one.
    pub name: Option<String>,
    /// Snapshot of the frame's arguments at the time of the error.
    pub args: Vec<LuaValue>,
    pub source: String,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct LuaError {
    pub kind: LuaErrorKind,
    pub message: String,
    pub position: Option<Position>,
    pub traceback: Vec<TraceFrame>,
    /// The raw Lua value passed to `error(v)`, so pcall can hand back the
    /// original value instead of a stringified rendering.
    pub value: Option<LuaValue>,
}

impl LuaError {
    pub fn compile(message: impl Into<String>, position: Option<Position>) -> Self {
        LuaError {
            kind: LuaErrorKind::CompileError,
            message: message.into(),
            position,
            traceback: Vec::new(),
            value: None,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        LuaError {
            kind: LuaErrorKind::RuntimeError,
            message: message.into(),
            position: None,
            traceback: Vec::new(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: LuaValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn kind(&self) -> LuaErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The value pcall hands to the guest: the carried error value, or the
    /// message as a string.
    pub fn error_value(&self) -> LuaValue {
        match &self.value {
            Some(v) => v.clone(),
            None => LuaValue::str(&self.message),
        }
    }

    pub fn is_runtime(&self) -> bool {
        self.kind == LuaErrorKind::RuntimeError
    }
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.traceback.is_empty() {
            write!(f, "\nstack traceback:")?;
            for frame in &self.traceback {
                let name = frame.name.as_deref().unwrap_or("?");
                if frame.line > 0 {
                    write!(f, "\n\t{}:{}: in {}", frame.source, frame.line, name)?;
                } else {
                    write!(f, "\n\t{}: in {}", frame.source, name)?;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for LuaError {}
