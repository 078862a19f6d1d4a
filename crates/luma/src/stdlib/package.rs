// Package library stub: the table exists (with `loaded` and `path`) so
// sandbox policies and probing scripts find the usual shape; module loading
// itself is a host concern.

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::LuaVM;

pub fn create_package_lib() -> LibraryModule {
    crate::lib_module!("package", {})
}

/// Data fields, installed after the table is registered.
pub fn install_fields(vm: &mut LuaVM) {
    let loaded = vm.create_table();
    if let Some(package) = vm.get_global("package").as_table() {
        let mut t = package.borrow_mut();
        t.raw_set_str("loaded", LuaValue::Table(loaded));
        t.raw_set_str("path", LuaValue::str("./?.lua"));
        t.raw_set_str("cpath", LuaValue::str(""));
    }
}
