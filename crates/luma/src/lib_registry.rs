// Declarative registration of native library modules into the globals
// table, plus the argument helpers every library function uses.

use crate::lua_value::{CFunction, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use std::collections::HashMap;

/// A named library: `_G` entries register directly as globals, anything
/// else becomes a global table of functions.
pub struct LibraryModule {
    pub name: &'static str,
    pub functions: Vec<(&'static str, CFunction)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            functions: Vec::new(),
        }
    }
}

#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($func_name:expr => $func:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.functions.push(($func_name, $func));
        )*
        module
    }};
}

pub struct LibraryRegistry {
    modules: HashMap<&'static str, LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.insert(module.name, module);
    }

    pub fn load_all(&self, vm: &mut LuaVM) {
        for module in self.modules.values() {
            self.load_module(vm, module);
        }
    }

    pub fn load_module(&self, vm: &mut LuaVM, module: &LibraryModule) {
        if module.name == "_G" {
            for (name, func) in &module.functions {
                vm.set_global(name, LuaValue::CFunction(*func));
            }
            return;
        }

        let table = vm.create_table();
        for (name, func) in &module.functions {
            table
                .borrow_mut()
                .raw_set_str(name, LuaValue::CFunction(*func));
        }
        vm.set_global(module.name, LuaValue::Table(table));
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every standard library module this interpreter ships.
pub fn create_standard_registry() -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    registry.register(crate::stdlib::basic::create_basic_lib());
    registry.register(crate::stdlib::string::create_string_lib());
    registry.register(crate::stdlib::table::create_table_lib());
    registry.register(crate::stdlib::math::create_math_lib());
    registry.register(crate::stdlib::os::create_os_lib());
    registry.register(crate::stdlib::io::create_io_lib());
    registry.register(crate::stdlib::debug::create_debug_lib());
    registry.register(crate::stdlib::package::create_package_lib());
    registry
}

/// Arguments of the innermost native call (register 0 is the callee).
pub fn get_args(vm: &LuaVM) -> Vec<LuaValue> {
    vm.frames
        .last()
        .map(|f| f.registers.iter().skip(1).cloned().collect())
        .unwrap_or_default()
}

pub fn get_arg(vm: &LuaVM, index: usize) -> Option<LuaValue> {
    vm.frames.last().and_then(|f| {
        let i = index + 1;
        if i < f.registers.len() {
            Some(f.registers[i].clone())
        } else {
            None
        }
    })
}

pub fn arg_count(vm: &LuaVM) -> usize {
    vm.frames
        .last()
        .map(|f| f.registers.len().saturating_sub(1))
        .unwrap_or(0)
}

pub fn require_arg(vm: &LuaVM, index: usize, func_name: &str) -> LuaResult<LuaValue> {
    get_arg(vm, index).ok_or_else(|| {
        vm.error(format!(
            "bad argument #{} to '{}' (value expected)",
            index + 1,
            func_name
        ))
    })
}
