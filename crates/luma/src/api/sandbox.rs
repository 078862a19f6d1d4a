// Sandbox policy: dotted paths replaced with raising stubs. Stubbing a
// function path swaps in a stub; stubbing a table path stubs every function
// member under its dotted name. Paths that do not exist yet still get a
// stub, so probing for loadfile/require fails loudly instead of silently.

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use std::cell::RefCell;
use std::rc::Rc;

/// Paths stubbed out when no explicit policy is given.
pub const DEFAULT_SANDBOXED_PATHS: &[&str] = &[
    "io",
    "file",
    "os.execute",
    "os.exit",
    "os.getenv",
    "os.remove",
    "os.rename",
    "os.tmpname",
    "package",
    "load",
    "loadfile",
    "require",
    "dofile",
    "loadstring",
];

#[derive(Debug, Clone, Default)]
pub struct SandboxOptions {
    /// Extra dotted paths to stub beyond the default set.
    pub sandboxed: Vec<String>,
    /// Paths removed from the effective set.
    pub exclude: Vec<String>,
}

impl SandboxOptions {
    /// The effective path list: defaults plus additions, minus excludes.
    pub fn effective_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = DEFAULT_SANDBOXED_PATHS
            .iter()
            .map(|p| p.to_string())
            .collect();
        for extra in &self.sandboxed {
            if !paths.contains(extra) {
                paths.push(extra.clone());
            }
        }
        paths.retain(|p| !self.exclude.contains(p));
        paths
    }
}

/// A callable that raises `"<path>(_) is sandboxed"` when invoked.
fn make_stub(vm: &mut LuaVM, path: &str) -> LuaValue {
    let message = format!("{}(_) is sandboxed", path);
    vm.create_callback(path, move |vm| Err(vm.error(message.clone())))
}

/// Apply the policy to a VM whose libraries are already open.
pub fn apply(vm: &mut LuaVM, options: &SandboxOptions) -> LuaResult<()> {
    for path in options.effective_paths() {
        sandbox_path(vm, &path)?;
    }
    Ok(())
}

fn sandbox_path(vm: &mut LuaVM, path: &str) -> LuaResult<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let globals = vm.globals();
    let (container, last) = walk_to_parent(vm, globals, &parts)?;

    let current = container.borrow().raw_get_str(last);
    match current {
        LuaValue::Table(inner) => {
            // Replace each function member, and trap calls on the table
            // itself through __call.
            let members: Vec<String> = inner
                .borrow()
                .iter_all()
                .into_iter()
                .filter_map(|(k, v)| {
                    if v.is_callable() {
                        k.as_str().map(|s| s.to_string())
                    } else {
                        None
                    }
                })
                .collect();
            for member in members {
                let stub = make_stub(vm, &format!("{}.{}", path, member));
                inner.borrow_mut().raw_set_str(&member, stub);
            }
            let call_stub = make_stub(vm, path);
            let meta = vm.create_table();
            meta.borrow_mut().raw_set_str("__call", call_stub);
            inner.borrow_mut().set_metatable(Some(meta));
        }
        _ => {
            // Function, scalar, or missing: either way, a stub takes the
            // slot so calls fail with the sandbox message.
            let stub = make_stub(vm, path);
            container.borrow_mut().raw_set_str(last, stub);
        }
    }
    Ok(())
}

/// Resolve all but the last component, creating nothing: a missing
/// intermediate just means there is nothing to stub deeper down, so the
/// stub lands on the first missing slot.
fn walk_to_parent<'a>(
    vm: &mut LuaVM,
    globals: Rc<RefCell<LuaTable>>,
    parts: &[&'a str],
) -> LuaResult<(Rc<RefCell<LuaTable>>, &'a str)> {
    let mut container = globals;
    for part in &parts[..parts.len() - 1] {
        let next = container.borrow().raw_get_str(part);
        match next {
            LuaValue::Table(t) => container = t,
            LuaValue::Nil => {
                let fresh = vm.create_table();
                container
                    .borrow_mut()
                    .raw_set_str(part, LuaValue::Table(fresh.clone()));
                container = fresh;
            }
            other => {
                return Err(vm.error(format!(
                    "cannot sandbox '{}': '{}' is a {} value",
                    parts.join("."),
                    part,
                    other.type_name()
                )));
            }
        }
    }
    Ok((container, parts[parts.len() - 1]))
}
