use crate::api::{HostValue, Lua, SandboxOptions};
use crate::lua_vm::LuaErrorKind;

fn sandboxed() -> Lua {
    Lua::new(SandboxOptions::default()).expect("vm boot failed")
}

fn open() -> Lua {
    Lua::unsandboxed().expect("vm boot failed")
}

#[test]
fn eval_returns_decoded_values() {
    let mut lua = sandboxed();
    assert_eq!(lua.eval("return 1 + 1").unwrap(), vec![HostValue::Int(2)]);
    assert_eq!(
        lua.eval("return 'hi', true, 2.5").unwrap(),
        vec![
            HostValue::Str("hi".to_string()),
            HostValue::Bool(true),
            HostValue::Float(2.5)
        ]
    );
    assert!(lua.eval("local x = 1").unwrap().is_empty());
}

#[test]
fn eval_decodes_tables() {
    let mut lua = sandboxed();
    assert_eq!(
        lua.eval("return {1, 2, 3}").unwrap(),
        vec![HostValue::List(vec![
            HostValue::Int(1),
            HostValue::Int(2),
            HostValue::Int(3)
        ])]
    );
    let result = lua.eval("return {x = 1}").unwrap();
    match &result[0] {
        HostValue::Map(entries) => {
            assert_eq!(
                entries[0],
                (HostValue::Str("x".to_string()), HostValue::Int(1))
            );
        }
        other => panic!("expected a map, got {:?}", other),
    }
}

#[test]
fn state_persists_across_evals() {
    let mut lua = sandboxed();
    lua.eval("counter = 10").unwrap();
    lua.eval("counter = counter + 5").unwrap();
    assert_eq!(lua.eval("return counter").unwrap(), vec![HostValue::Int(15)]);
}

#[test]
fn chunk_handles_compile_once_run_many() {
    let mut lua = sandboxed();
    lua.eval("n = 0").unwrap();
    let chunk = lua.load_chunk("n = n + 1 return n").unwrap();
    assert_eq!(lua.eval_chunk(&chunk).unwrap(), vec![HostValue::Int(1)]);
    assert_eq!(lua.eval_chunk(&chunk).unwrap(), vec![HostValue::Int(2)]);
    assert_eq!(lua.eval_chunk(&chunk).unwrap(), vec![HostValue::Int(3)]);
}

#[test]
fn set_and_get_nested_paths() {
    let mut lua = sandboxed();
    lua.set("config.server.port", HostValue::Int(8080)).unwrap();
    assert_eq!(
        lua.get("config.server.port").unwrap(),
        HostValue::Int(8080)
    );
    assert_eq!(
        lua.eval("return config.server.port").unwrap(),
        vec![HostValue::Int(8080)]
    );
    // Missing paths read as nil.
    assert_eq!(lua.get("config.missing.path").unwrap(), HostValue::Nil);
}

#[test]
fn set_through_non_table_fails_with_invalid_index() {
    let mut lua = sandboxed();
    lua.set("leaf", HostValue::Int(1)).unwrap();
    let err = lua.set("leaf.child", HostValue::Int(2)).unwrap_err();
    assert!(err.message().contains("invalid_index"), "{}", err.message());
    assert!(err.message().contains("leaf.child"), "{}", err.message());

    let err = lua.get("leaf.child.deeper").unwrap_err();
    assert!(err.message().contains("invalid_index"));
}

#[test]
fn call_by_path() {
    let mut lua = sandboxed();
    lua.eval("function double(n) return n * 2 end").unwrap();
    assert_eq!(
        lua.call("double", vec![HostValue::Int(21)]).unwrap(),
        vec![HostValue::Int(42)]
    );

    lua.eval("api = {} function api.greet(name) return 'hi ' .. name end")
        .unwrap();
    assert_eq!(
        lua.call("api.greet", vec![HostValue::from("lua")]).unwrap(),
        vec![HostValue::Str("hi lua".to_string())]
    );

    let err = lua.call("nonexistent", vec![]).unwrap_err();
    assert!(err.message().contains("nil"));
}

#[test]
fn registered_host_functions_are_callable() {
    let mut lua = sandboxed();
    lua.register_function("host.add", |args| {
        let a = args.first().and_then(|v| v.as_int()).unwrap_or(0);
        let b = args.get(1).and_then(|v| v.as_int()).unwrap_or(0);
        Ok(vec![HostValue::Int(a + b)])
    })
    .unwrap();

    assert_eq!(
        lua.eval("return host.add(40, 2)").unwrap(),
        vec![HostValue::Int(42)]
    );
}

#[test]
fn host_function_errors_surface_as_runtime_errors() {
    let mut lua = sandboxed();
    lua.register_function("fail", |_| Err("host refused".to_string()))
        .unwrap();
    let err = lua.eval("return fail()").unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::RuntimeError);
    assert!(err.message().contains("host refused"));
    // And the guest can catch them.
    let caught = lua
        .eval("local ok, e = pcall(fail) return ok, e")
        .unwrap();
    assert_eq!(caught[0], HostValue::Bool(false));
    assert!(caught[1].as_str().unwrap().contains("host refused"));
}

#[test]
fn encode_round_trips_lists_and_maps() {
    let mut lua = sandboxed();
    lua.set(
        "data",
        HostValue::List(vec![
            HostValue::Int(1),
            HostValue::Str("two".to_string()),
            HostValue::Bool(true),
        ]),
    )
    .unwrap();
    assert_eq!(
        lua.eval("return data[1], data[2], data[3], #data").unwrap(),
        vec![
            HostValue::Int(1),
            HostValue::Str("two".to_string()),
            HostValue::Bool(true),
            HostValue::Int(3)
        ]
    );

    lua.set(
        "settings",
        HostValue::Map(vec![(
            HostValue::Str("debug".to_string()),
            HostValue::Bool(true),
        )]),
    )
    .unwrap();
    assert_eq!(
        lua.eval("return settings.debug").unwrap(),
        vec![HostValue::Bool(true)]
    );
}

#[test]
fn default_sandbox_blocks_os_exit() {
    let mut lua = sandboxed();
    let err = lua.eval("os.exit(1)").unwrap_err();
    assert_eq!(err.kind(), LuaErrorKind::RuntimeError);
    assert!(err.message().contains("sandboxed"), "{}", err.message());
    assert!(err.message().contains("os.exit"), "{}", err.message());
}

#[test]
fn default_sandbox_blocks_io_and_load() {
    let mut lua = sandboxed();
    let err = lua.eval("io.write('x')").unwrap_err();
    assert!(err.message().contains("sandboxed"));
    let err = lua.eval("return load('return 1')").unwrap_err();
    assert!(err.message().contains("sandboxed"));
    let err = lua.eval("require('socket')").unwrap_err();
    assert!(err.message().contains("sandboxed"));
}

#[test]
fn sandbox_errors_are_catchable_in_guest() {
    let mut lua = sandboxed();
    assert_eq!(
        lua.eval("local ok, err = pcall(os.exit) return ok, err")
            .unwrap()[0],
        HostValue::Bool(false)
    );
}

#[test]
fn sandbox_exclusions_reopen_paths() {
    let mut lua = Lua::new(SandboxOptions {
        sandboxed: vec![],
        exclude: vec!["load".to_string()],
    })
    .unwrap();
    assert_eq!(
        lua.eval("local f = load('return 7') return f()").unwrap(),
        vec![HostValue::Int(7)]
    );
    // Everything else stays closed.
    assert!(lua.eval("os.exit()").is_err());
}

#[test]
fn extra_sandbox_paths() {
    let mut lua = Lua::new(SandboxOptions {
        sandboxed: vec!["math.random".to_string()],
        exclude: vec![],
    })
    .unwrap();
    let err = lua.eval("return math.random()").unwrap_err();
    assert!(err.message().contains("math.random"));
    assert!(err.message().contains("sandboxed"));
    // The rest of math still works.
    assert_eq!(
        lua.eval("return math.floor(1.5)").unwrap(),
        vec![HostValue::Int(1)]
    );
}

#[test]
fn unsandboxed_vm_allows_load() {
    let mut lua = open();
    assert_eq!(
        lua.eval("f = load('return 1 + 2') return f()").unwrap(),
        vec![HostValue::Int(3)]
    );
    assert_eq!(
        lua.eval("local _, msg = load('invalid $$') return type(msg)")
            .unwrap(),
        vec![HostValue::Str("string".to_string())]
    );
}

#[test]
fn load_file_executes_from_disk() {
    let dir = std::env::temp_dir().join(format!("luma_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("script.lua");
    std::fs::write(&path, "loaded_marker = 'from disk'").unwrap();

    let mut lua = sandboxed();
    lua.load_file(path.to_str().unwrap()).unwrap();
    assert_eq!(
        lua.eval("return loaded_marker").unwrap(),
        vec![HostValue::Str("from disk".to_string())]
    );

    let err = lua.load_file("/nonexistent/path.lua").unwrap_err();
    assert!(err.message().contains("cannot open"));

    std::fs::remove_dir_all(&dir).ok();
}
