// The host-facing embedding facade: a `Lua` handle wrapping one VM
// instance, with sandboxing, dotted-path access to globals, chunk handles,
// host function registration, and host<->guest value translation.

pub mod sandbox;
pub mod value;

use crate::lua_value::{Chunk, LuaValue};
use crate::lua_vm::{LuaError, LuaOptions, LuaResult, LuaVM};
pub use sandbox::{DEFAULT_SANDBOXED_PATHS, SandboxOptions};
use std::rc::Rc;
pub use value::HostValue;

/// A compiled chunk, reusable across eval calls on the same instance.
pub struct ChunkHandle {
    chunk: Rc<Chunk>,
}

/// One sandboxed interpreter instance.
pub struct Lua {
    vm: LuaVM,
    chunk_counter: usize,
}

impl Lua {
    /// A VM with libraries open and the default sandbox applied.
    pub fn new(options: SandboxOptions) -> LuaResult<Self> {
        Self::with_vm_options(options, LuaOptions::default())
    }

    /// An unsandboxed VM (every library call available).
    pub fn unsandboxed() -> LuaResult<Self> {
        Self::new(SandboxOptions {
            sandboxed: Vec::new(),
            exclude: sandbox::DEFAULT_SANDBOXED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        })
    }

    pub fn with_vm_options(options: SandboxOptions, vm_options: LuaOptions) -> LuaResult<Self> {
        let mut vm = LuaVM::with_options(vm_options);
        vm.open_libs();
        sandbox::apply(&mut vm, &options)?;
        Ok(Lua {
            vm,
            chunk_counter: 0,
        })
    }

    /// Direct access to the underlying VM for advanced embedding.
    pub fn vm(&mut self) -> &mut LuaVM {
        &mut self.vm
    }

    /// Parse, compile, and run; returns the chunk's top-level return values
    /// decoded for the host.
    pub fn eval(&mut self, source: &str) -> LuaResult<Vec<HostValue>> {
        self.chunk_counter += 1;
        let name = format!("chunk_{}", self.chunk_counter);
        let chunk = self.vm.compile(source, &name)?;
        let results = self.vm.execute(Rc::new(chunk))?;
        value::decode_many(&self.vm, &results)
    }

    /// Compile only; run later with [`Lua::eval_chunk`].
    pub fn load_chunk(&mut self, source: &str) -> LuaResult<ChunkHandle> {
        self.chunk_counter += 1;
        let name = format!("chunk_{}", self.chunk_counter);
        let chunk = self.vm.compile(source, &name)?;
        Ok(ChunkHandle {
            chunk: Rc::new(chunk),
        })
    }

    pub fn eval_chunk(&mut self, handle: &ChunkHandle) -> LuaResult<Vec<HostValue>> {
        let results = self.vm.execute(handle.chunk.clone())?;
        value::decode_many(&self.vm, &results)
    }

    /// Read and execute a file, discarding its return values.
    pub fn load_file(&mut self, path: &str) -> LuaResult<()> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| LuaError::runtime(format!("cannot open {}: {}", path, e)))?;
        let chunk = self.vm.compile(&source, path)?;
        self.vm.execute(Rc::new(chunk))?;
        Ok(())
    }

    /// Set a nested global path, creating intermediate tables. Fails with
    /// an invalid_index error when a non-final component is not a table.
    pub fn set(&mut self, path: &str, host_value: HostValue) -> LuaResult<()> {
        let encoded = value::encode(&mut self.vm, host_value)?;
        self.set_value(path, encoded)
    }

    pub fn set_value(&mut self, path: &str, lua_value: LuaValue) -> LuaResult<()> {
        let parts: Vec<&str> = path.split('.').collect();
        let mut container = self.vm.globals();
        for part in &parts[..parts.len() - 1] {
            let next = container.borrow().raw_get_str(part);
            match next {
                LuaValue::Table(t) => container = t,
                LuaValue::Nil => {
                    let fresh = self.vm.create_table();
                    container
                        .borrow_mut()
                        .raw_set_str(part, LuaValue::Table(fresh.clone()));
                    container = fresh;
                }
                other => {
                    return Err(invalid_index(path, part, &other));
                }
            }
        }
        container
            .borrow_mut()
            .raw_set_str(parts[parts.len() - 1], lua_value);
        Ok(())
    }

    /// Read a nested global path; nil when any component is missing, an
    /// invalid_index error when an intermediate is not a table.
    pub fn get(&mut self, path: &str) -> LuaResult<HostValue> {
        let found = self.get_value(path)?;
        value::decode(&self.vm, &found)
    }

    pub fn get_value(&mut self, path: &str) -> LuaResult<LuaValue> {
        let parts: Vec<&str> = path.split('.').collect();
        let mut container = self.vm.globals();
        for part in &parts[..parts.len() - 1] {
            let next = container.borrow().raw_get_str(part);
            match next {
                LuaValue::Table(t) => container = t,
                LuaValue::Nil => return Ok(LuaValue::Nil),
                other => {
                    return Err(invalid_index(path, part, &other));
                }
            }
        }
        Ok(container.borrow().raw_get_str(parts[parts.len() - 1]))
    }

    /// Call a (possibly nested) global function with host arguments.
    pub fn call(&mut self, path: &str, args: Vec<HostValue>) -> LuaResult<Vec<HostValue>> {
        let func = self.get_value(path)?;
        if func.is_nil() {
            return Err(self
                .vm
                .error(format!("attempt to call a nil value ('{}')", path)));
        }
        let lua_args = value::encode_many(&mut self.vm, args)?;
        let results = self.vm.call_value(func, lua_args)?;
        value::decode_many(&self.vm, &results)
    }

    /// Bind a host function at a dotted path. The guest calls it like any
    /// Lua function: arguments arrive decoded, the returned list becomes
    /// the call's results.
    pub fn register_function<F>(&mut self, path: &str, func: F) -> LuaResult<()>
    where
        F: Fn(Vec<HostValue>) -> Result<Vec<HostValue>, String> + 'static,
    {
        let name = path.to_string();
        let callback = self.vm.create_callback(path, move |vm| {
            let raw_args = crate::lib_registry::get_args(vm);
            let args = value::decode_many(vm, &raw_args)?;
            match func(args) {
                Ok(results) => value::multi_from_host(vm, results),
                Err(message) => Err(vm.error(format!("{}: {}", name, message))),
            }
        });
        self.set_value(path, callback)
    }

    /// Bind an already-constructed Lua value (e.g. a callback built against
    /// the raw VM) at a dotted path.
    pub fn register_value(&mut self, path: &str, value: LuaValue) -> LuaResult<()> {
        self.set_value(path, value)
    }
}

fn invalid_index(path: &str, part: &str, found: &LuaValue) -> LuaError {
    LuaError::runtime(format!(
        "invalid_index: '{}' is a {} value while resolving '{}'",
        part,
        found.type_name(),
        path
    ))
}
