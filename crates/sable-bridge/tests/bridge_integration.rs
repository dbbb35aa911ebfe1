//! End-to-end tests over the full pipeline: compile `.sb` sources with
//! the build service, load the resulting image into a scope, then drive
//! resolution, member access and invocation through the bridge.

use sable_bridge::{Bridge, BridgeError, HandleValue, ScriptCatalog};
use sable_build::{BuildRequest, BuildService};
use std::ffi::c_void;
use std::path::Path;

const GAME_SB: &str = r#"
module game

enum game.Mode : i32
  Idle = 0
  Walk = 1
end

interface game.IScript
  method Update(dt: f32)
end

class game.Player : game.IScript
  field Health: i32 = 100
  readonly field Id: i32 = 7
  static field Count: i32 = 0
  prop Name: str { get set }
  method Update(dt: f32)
    set Health = Health - 1
  end
  method TakeDamage(amount: i32)
    set Health = Health - amount
  end
  static method Register()
    set Count = Count + 1
  end
end
"#;

fn compile(dir: &Path, source: &str) -> String {
    std::fs::write(dir.join("game.sb"), source).unwrap();
    let manifest = dir.join("game.sproj");
    std::fs::write(
        &manifest,
        "[project]\nname = \"game\"\nsources = [\"game.sb\"]\n",
    )
    .unwrap();

    let out = dir.join("game.sbin");
    let mut service = BuildService::new();
    let response = service.handle(&BuildRequest {
        project_file: manifest.display().to_string(),
        out_file: out.display().to_string(),
    });
    assert!(response.success, "{:?}", response.diagnostics);
    "game.sbin".to_string()
}

#[test]
fn test_compiled_module_loads_and_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge
        .load_from_path(scope, &image)
        .unwrap()
        .expect("image should load");

    assert!(bridge.get_class(module, "game.Player").is_ok());
    assert!(matches!(
        bridge.get_class(module, "game.Ghost"),
        Err(BridgeError::ClassNotFound)
    ));
}

#[test]
fn test_invocation_mutates_compiled_state() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();
    let player = bridge.new_object(class).unwrap();

    let method = bridge.get_method(class, "TakeDamage", 1).unwrap();
    let amount = 30i32;
    unsafe {
        bridge
            .invoke(method, Some(player), &[&amount as *const i32 as *const c_void])
            .unwrap();
    }
    assert_eq!(bridge.get_field_value(player, "Health").unwrap(), "70");

    // Static state lives on the module, reachable through the class.
    let register = bridge.get_method(class, "Register", 0).unwrap();
    unsafe {
        bridge.invoke(register, None, &[]).unwrap();
        bridge.invoke(register, None, &[]).unwrap();
    }
    assert_eq!(bridge.get_field_value(class, "Count").unwrap(), "2");
}

#[test]
fn test_field_and_property_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();
    let player = bridge.new_object(class).unwrap();

    let health = 55i32;
    unsafe {
        bridge
            .set_field_value(player, "Health", &health as *const i32 as *const c_void)
            .unwrap();
    }
    assert_eq!(bridge.get_field_value(player, "Health").unwrap(), "55");

    let err = unsafe {
        bridge
            .set_field_value(player, "Id", &health as *const i32 as *const c_void)
            .unwrap_err()
    };
    assert!(matches!(err, BridgeError::ReadonlyField));

    let name = std::ffi::CString::new("Alice").unwrap();
    unsafe {
        bridge
            .set_property_value(player, "Name", name.as_ptr() as *const c_void)
            .unwrap();
    }
    assert_eq!(
        bridge.get_property_value(player, "Name").unwrap(),
        "\"Alice\""
    );
}

#[test]
fn test_metadata_describes_compiled_class() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&bridge.get_meta_data(class).unwrap()).unwrap();
    let fields = json["Fields"].as_array().unwrap();
    assert!(fields.iter().any(|f| f["Name"] == "Health"));
    assert!(fields
        .iter()
        .any(|f| f["Name"] == "Id" && f["CanWrite"] == false));
    let properties = json["Properties"].as_array().unwrap();
    assert!(properties
        .iter()
        .any(|p| p["Name"] == "Name" && p["CanRead"] == true));
}

#[test]
fn test_unload_then_rebuild_into_new_scope() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();

    bridge.unload_scope(scope).unwrap();
    assert!(bridge.registry().deref(module).is_err());
    assert!(bridge.registry().deref(class).is_err());

    // Overwrite the image with a changed source, then load fresh.
    let patched = GAME_SB.replace("Health: i32 = 100", "Health: i32 = 250");
    compile(dir.path(), &patched);

    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();
    let player = bridge.new_object(class).unwrap();
    assert_eq!(bridge.get_field_value(player, "Health").unwrap(), "250");
}

#[test]
fn test_release_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();

    bridge.release(class);
    bridge.release(class);
    assert!(bridge.registry().deref(class).is_err());
    assert!(matches!(
        bridge.registry().deref(module).unwrap(),
        HandleValue::Module(_)
    ));
}

#[test]
fn test_enum_argument_from_sibling_source_marshals_as_integer() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("modes.sb"),
        "module game\nenum game.Mode : i32\n  Idle = 0\n  Walk = 1\nend\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("player.sb"),
        "module game\nclass game.Player\n  field Mode: game.Mode\n  method SetMode(mode: game.Mode)\n    set Mode = mode\n  end\nend\n",
    )
    .unwrap();
    let manifest = dir.path().join("game.sproj");
    std::fs::write(
        &manifest,
        "[project]\nname = \"game\"\nsources = [\"modes.sb\", \"player.sb\"]\n",
    )
    .unwrap();

    let out = dir.path().join("game.sbin");
    let mut service = BuildService::new();
    let response = service.handle(&BuildRequest {
        project_file: manifest.display().to_string(),
        out_file: out.display().to_string(),
    });
    assert!(response.success, "{:?}", response.diagnostics);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, "game.sbin").unwrap().unwrap();
    let class = bridge.get_class(module, "game.Player").unwrap();
    let player = bridge.new_object(class).unwrap();

    // The slot carries the enum's underlying i32, not a handle token.
    let method = bridge.get_method(class, "SetMode", 1).unwrap();
    let walk = 1i32;
    unsafe {
        bridge
            .invoke(method, Some(player), &[&walk as *const i32 as *const c_void])
            .unwrap();
    }
    assert_eq!(bridge.get_field_value(player, "Mode").unwrap(), "1");
}

#[test]
fn test_script_catalog_over_compiled_module() {
    let dir = tempfile::tempdir().unwrap();
    let image = compile(dir.path(), GAME_SB);

    let bridge = Bridge::new();
    let scope = bridge.create_scope(Some(dir.path()));
    let module = bridge.load_from_path(scope, &image).unwrap();

    let mut catalog = ScriptCatalog::new();
    catalog.register(&bridge, module, "game.Player").unwrap();
    let script = catalog.create(&bridge, "game.Player").unwrap();

    let update = catalog
        .get_method(&bridge, &script, "Update", 1)
        .unwrap()
        .expect("Update(dt) exists");
    let dt = 0.016f32;
    unsafe {
        bridge
            .invoke(update, Some(script.instance), &[&dt as *const f32 as *const c_void])
            .unwrap();
    }
    assert_eq!(bridge.get_field_value(script.instance, "Health").unwrap(), "99");

    assert!(catalog
        .get_method(&bridge, &script, "Render", 0)
        .unwrap()
        .is_none());
}
