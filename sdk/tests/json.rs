#![cfg(test)]

use std::fs;
use std::path::PathBuf;

use serde_json::json;

use brine_proto::{
    decode_to_json, load_json, load_json_file, load_proto, load_proto_file, new_builder, parse_schema, Builder,
    EncodeError, MapKey, Options, ProtoError, Value,
};

const PROFILE: &str = r#"
package js;

enum Mood { HAPPY = 0; SAD = 1; }

message Profile {
  optional int64 big = 1;
  optional uint64 ubig = 2;
  optional bytes raw = 3;
  optional Mood mood = 4;
  optional string user_name = 5;
  repeated double scores = 6;
  map<int32, string> labels = 7;
  optional Profile friend = 8;
}
"#;

fn profile_builder(options: Options) -> Builder {
    load_proto(PROFILE, Some(new_builder(options)), None).expect("load_proto failed")
}

/// A fresh directory under the system temp dir, unique per test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("brine-proto-{}-{}", std::process::id(), name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create_dir_all failed");
    dir
}

#[test]
fn test_to_json() {
    let builder = profile_builder(Options::default());
    let profile = builder.build("js.Profile").expect("build failed");

    let mut friend = profile.new_message();
    profile.set(&mut friend, "user_name", Value::String("bob".into())).expect("set failed");

    let mut message = profile.new_message();
    profile.set(&mut message, "big", Value::Int64(-5)).expect("set failed");
    profile.set(&mut message, "ubig", Value::Uint64(u64::MAX)).expect("set failed");
    profile.set(&mut message, "raw", Value::Bytes(vec![0xde, 0xad])).expect("set failed");
    profile.set(&mut message, "mood", Value::String("SAD".into())).expect("set failed");
    profile
        .set(&mut message, "scores", Value::List(vec![Value::Double(1.5), Value::Double(f64::INFINITY)]))
        .expect("set failed");
    profile.add(&mut message, "scores", Value::Double(f64::NAN)).expect("add failed");
    let mut labels = std::collections::BTreeMap::new();
    labels.insert(MapKey::Int(1), Value::String("one".into()));
    profile.set(&mut message, "labels", Value::Map(labels)).expect("set failed");
    profile.set(&mut message, "friend", Value::Message(friend)).expect("set failed");

    // Check 64-bit values as strings, bytes as hex, enums by name
    assert_eq!(
        profile.to_json(&message),
        json!({
            "big": "-5",
            "ubig": "18446744073709551615",
            "raw": "dead",
            "mood": "SAD",
            "scores": [1.5, "Infinity", "NaN"],
            "labels": { "1": "one" },
            "friend": { "user_name": "bob", "scores": [], "labels": {} },
        })
    );
}

#[test]
fn test_from_json() {
    let builder = profile_builder(Options::default());
    let profile = builder.build("js.Profile").expect("build failed");

    let message = profile
        .from_json(&json!({
            "big": "-5",
            "ubig": 18446744073709551615u64,
            "raw": "00ff",
            "mood": 1,
            "userName": "amy",
            "scores": [2, "-Infinity"],
            "labels": { "-3": "neg" },
            "friend": { "mood": "HAPPY" },
        }))
        .expect("from_json failed");

    assert_eq!(profile.get(&message, "big"), Some(&Value::Int64(-5)));
    assert_eq!(profile.get(&message, "ubig"), Some(&Value::Uint64(u64::MAX)));
    assert_eq!(profile.get(&message, "raw"), Some(&Value::Bytes(vec![0x00, 0xff])));
    assert_eq!(profile.get(&message, "mood"), Some(&Value::Enum(1)));
    assert_eq!(profile.get(&message, "user_name"), Some(&Value::String("amy".into())));
    assert_eq!(
        profile.get(&message, "scores"),
        Some(&Value::List(vec![Value::Double(2.0), Value::Double(f64::NEG_INFINITY)]))
    );
    let labels = profile.get(&message, "labels").and_then(Value::as_map).expect("labels missing");
    assert_eq!(labels.get(&MapKey::Int(-3)), Some(&Value::String("neg".into())));
    let friend = profile.get(&message, "friend").and_then(Value::as_message).expect("friend missing");
    assert_eq!(friend.get(4), Some(&Value::Enum(0)));

    // What goes out as JSON comes back as the same message
    let reloaded = profile.from_json(&profile.to_json(&message)).expect("from_json failed");
    assert_eq!(reloaded, message);

    // null members stay unset
    let empty = profile.from_json(&json!({ "big": null })).expect("from_json failed");
    assert!(empty.is_empty());
}

#[test]
fn test_from_json_errors() {
    let builder = profile_builder(Options::default());
    let profile = builder.build("js.Profile").expect("build failed");

    assert!(matches!(
        profile.from_json(&json!({ "nope": 1 })),
        Err(EncodeError::UnknownField { .. })
    ));
    assert!(matches!(
        profile.from_json(&json!({ "labels": { "x": "y" } })),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(
        profile.from_json(&json!({ "mood": "ANGRY" })),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(
        profile.from_json(&json!({ "raw": "not hex" })),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(profile.from_json(&json!([1, 2])), Err(EncodeError::TypeMismatch { .. })));
}

#[test]
fn test_from_json_oneof() {
    let builder = load_proto(
        "package js; message Choice { oneof pick { int32 num = 1; string text = 2; } }",
        None,
        None,
    )
    .expect("load_proto failed");
    let choice = builder.build("js.Choice").expect("build failed");

    let message = choice.from_json(&json!({ "text": "a" })).expect("from_json failed");
    assert_eq!(choice.which_oneof(&message, "pick"), Some("text"));

    // Two members of one oneof cannot both be set
    assert!(matches!(
        choice.from_json(&json!({ "num": 5, "text": "a" })),
        Err(EncodeError::InvalidValue { .. })
    ));

    // A null member does not count as set
    let message = choice.from_json(&json!({ "num": null, "text": "a" })).expect("from_json failed");
    let encoded = choice.encode(&message).expect("encode failed");
    assert_eq!(choice.decode(&encoded).expect("decode failed"), message);
}

#[test]
fn test_camel_case_fields() {
    let options = Options { convert_fields_to_camel_case: true, ..Options::default() };
    let builder = profile_builder(options);
    let profile = builder.build("js.Profile").expect("build failed");

    let message = profile.from_json(&json!({ "user_name": "zed" })).expect("from_json failed");
    assert_eq!(profile.get(&message, "userName"), Some(&Value::String("zed".into())));
    assert_eq!(profile.to_json(&message), json!({ "userName": "zed" }));

    let accessor = profile.accessor("user_name").expect("snake_case alias missing");
    assert_eq!(accessor.field().name, "userName");

    // Without accessors only exact names resolve
    let options = Options { populate_accessors: false, ..Options::default() };
    let profile = profile_builder(options).build("js.Profile").expect("build failed");
    assert!(profile.accessor("user_name").is_none());
    assert!(matches!(
        profile.from_json(&json!({ "userName": "zed" })),
        Err(EncodeError::UnknownField { .. })
    ));
}

#[test]
fn test_decode_to_json() {
    let builder = profile_builder(Options::default());
    let text = decode_to_json(&builder, "js.Profile", &[0x08, 0x7b, 0x20, 0x01]).expect("decode_to_json failed");
    let json: serde_json::Value = serde_json::from_str(&text).expect("output is not JSON");

    assert_eq!(json["big"], json!("123"));
    assert_eq!(json["mood"], json!("SAD"));
    assert_eq!(json["ubig"], json!("0"));
    assert_eq!(json["raw"], json!(""));
    assert!(json.get("friend").is_none());

    assert!(matches!(
        decode_to_json(&builder, "js.Mood", &[]),
        Err(ProtoError::Build(_))
    ));
    assert!(matches!(
        decode_to_json(&builder, "js.Profile", &[0x08]),
        Err(ProtoError::Decode(_))
    ));
}

#[test]
fn test_load_json_schema() {
    let schema = parse_schema(PROFILE).expect("parse_schema failed");
    let text = serde_json::to_string(&schema).expect("serialize failed");

    let builder = load_json(&text, None, None).expect("load_json failed");
    let profile = builder.build(".js.Profile").expect("build failed");
    assert_eq!(profile.name(), "js.Profile");

    let dir = scratch_dir("json-schema");
    let path = dir.join("profile.json");
    fs::write(&path, &text).expect("write failed");
    let builder = load_json_file(&path, None).expect("load_json_file failed");
    assert!(builder.build("js.Profile").is_ok());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_load_proto_file_imports() {
    let dir = scratch_dir("imports");
    fs::create_dir_all(dir.join("common")).expect("create_dir_all failed");
    fs::write(
        dir.join("common/stamp.proto"),
        "package common;\nmessage Stamp { optional int64 at = 1; }\n",
    )
    .expect("write failed");
    fs::write(
        dir.join("event.proto"),
        concat!(
            "import \"common/stamp.proto\";\n",
            "import weak \"missing.proto\";\n",
            "package app;\n",
            "message Event { optional common.Stamp when = 1; }\n",
        ),
    )
    .expect("write failed");

    let builder = load_proto_file(dir.join("event.proto"), None).expect("load_proto_file failed");
    assert!(builder.is_imported(&dir.join("common/stamp.proto").to_string_lossy()));
    assert!(builder.is_imported(&dir.join("event.proto").to_string_lossy()));

    let event = builder.build("app.Event").expect("build failed");
    let message = event
        .from_json(&json!({ "when": { "at": "1700000000" } }))
        .expect("from_json failed");
    assert_eq!(event.encode(&message).expect("encode failed"), [0x0a, 0x06, 0x08, 0x80, 0xe2, 0xcf, 0xaa, 0x06]);

    // A missing strong import is an I/O error
    fs::write(dir.join("broken.proto"), "import \"gone.proto\";\n").expect("write failed");
    assert!(matches!(load_proto_file(dir.join("broken.proto"), None), Err(ProtoError::Io(_))));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_import_cycle() {
    let dir = scratch_dir("cycle");
    fs::write(
        dir.join("a.proto"),
        "import \"b.proto\";\npackage cyc;\nmessage A { optional B b = 1; }\n",
    )
    .expect("write failed");
    fs::write(
        dir.join("b.proto"),
        "import \"a.proto\";\npackage cyc;\nmessage B { optional A a = 1; }\n",
    )
    .expect("write failed");

    let builder = load_proto_file(dir.join("a.proto"), None).expect("load_proto_file failed");
    assert!(builder.build("cyc.A").is_ok());
    assert!(builder.build("cyc.B").is_ok());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_preloaded_imports() {
    // Without a file name, imported files are expected in the builder already
    let builder = load_proto(
        "package common; message Stamp { optional int64 at = 1; }",
        None,
        Some("common/stamp.proto"),
    )
    .expect("load_proto failed");
    let builder = load_proto(
        "import \"common/stamp.proto\"; package app; message Event { optional common.Stamp when = 1; }",
        Some(builder),
        None,
    )
    .expect("load_proto failed");
    assert!(builder.build("app.Event").is_ok());

    // Loading under the same name twice is rejected
    let again = load_proto("package other;", Some(builder), Some("common/stamp.proto"));
    assert!(matches!(again, Err(ProtoError::DuplicateImport(_))));
}
