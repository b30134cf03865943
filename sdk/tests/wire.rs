#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use brine_proto::{
    load_proto, new_builder, Builder, ByteBuffer, ByteBufferMut, DecodeError, EncodeError, MapKey, Message, Options, RuntimeType,
    Translator, Value,
};
use brine_proto::schema::{WireType, RECURSION_LIMIT};

const WIRE: &str = r#"
package wire;

message Test1 { optional int32 a = 1; }
message Test2 { optional string b = 2; }
message Test3 { optional Test1 c = 3; }

message Packed { repeated int32 d = 4 [packed = true]; }
message Unpacked { repeated int32 d = 4; }

message Scalars {
  optional sint32 s32 = 1;
  optional sint64 s64 = 2;
  optional fixed32 f32 = 3;
  optional sfixed64 sf64 = 4;
  optional float fl = 5;
  optional double db = 6;
  optional bool ok = 7;
  optional bytes raw = 8;
  optional uint64 big = 9;
  optional int64 neg = 10;
}

enum Kind { FIRST = 1; SECOND = 2; }

message Defaults {
  optional int32 n = 1 [default = 42];
  optional string s = 2 [default = "x"];
  repeated int32 r = 3;
  optional Kind k = 4;
  map<string, int32> m = 5;
  optional Test1 sub = 6;
}

message Req { required int32 id = 1; optional int32 other = 2; }

message Choice {
  oneof pick {
    int32 num = 1;
    string text = 2;
  }
  optional int32 tail = 3;
}

message Dict {
  map<string, int32> counts = 1;
  map<int32, Test1> items = 2;
}

message WithGroup {
  optional group Result = 1 { optional int32 a = 2; }
  repeated group Item = 3 { optional string name = 4; }
}

message Point { required sint32 x = 1; required sint32 y = 2; }
message Empty {}
message Node { optional Node child = 1; optional int32 v = 2; }
message Route { optional Point at = 1; repeated Point path = 2; }
"#;

fn builder_with(options: Options) -> Builder {
    load_proto(WIRE, Some(new_builder(options)), None).expect("load_proto failed")
}

fn build(builder: &Builder, name: &str) -> RuntimeType {
    builder.build(name).unwrap_or_else(|err| panic!("build {} failed: {}", name, err))
}

fn bytes(text: &str) -> Vec<u8> {
    hex::decode(text.replace(' ', "")).expect("bad hex in test")
}

#[test]
fn test_canonical_vectors() {
    let builder = builder_with(Options::default());
    let test1 = build(&builder, "wire.Test1");
    let test2 = build(&builder, "wire.Test2");
    let test3 = build(&builder, "wire.Test3");

    let mut one = test1.new_message();
    test1.set(&mut one, "a", Value::Int32(150)).expect("set failed");
    assert_eq!(test1.encode(&one).expect("encode failed"), bytes("08 96 01"));

    let mut two = test2.new_message();
    test2.set(&mut two, "b", Value::String("testing".into())).expect("set failed");
    assert_eq!(test2.encode(&two).expect("encode failed"), bytes("12 07 74 65 73 74 69 6e 67"));

    let mut three = test3.new_message();
    test3.set(&mut three, "c", Value::Message(one.clone())).expect("set failed");
    let encoded = test3.encode(&three).expect("encode failed");
    assert_eq!(encoded, bytes("1a 03 08 96 01"));
    assert_eq!(test3.decode(&encoded).expect("decode failed"), three);

    // Negative int32 values are sign extended to ten bytes
    test1.set(&mut one, "a", Value::Int32(-1)).expect("set failed");
    let encoded = test1.encode(&one).expect("encode failed");
    assert_eq!(encoded, bytes("08 ff ff ff ff ff ff ff ff ff 01"));
    assert_eq!(test1.get(&test1.decode(&encoded).expect("decode failed"), "a"), Some(&Value::Int32(-1)));
}

#[test]
fn test_scalar_encodings() {
    let builder = builder_with(Options::default());
    let scalars = build(&builder, "wire.Scalars");

    let mut message = scalars.new_message();
    scalars.set(&mut message, "s32", Value::Int32(-1)).expect("set failed");
    scalars.set(&mut message, "s64", Value::Int64(-2)).expect("set failed");
    scalars.set(&mut message, "f32", Value::Uint32(1)).expect("set failed");
    scalars.set(&mut message, "sf64", Value::Int64(-1)).expect("set failed");
    scalars.set(&mut message, "fl", Value::Float(1.5)).expect("set failed");
    scalars.set(&mut message, "db", Value::Double(1.0)).expect("set failed");
    scalars.set(&mut message, "ok", Value::Bool(true)).expect("set failed");
    scalars.set(&mut message, "raw", Value::Bytes(vec![0xde, 0xad])).expect("set failed");
    scalars.set(&mut message, "big", Value::Uint64(u64::MAX)).expect("set failed");
    scalars.set(&mut message, "neg", Value::Int64(-1)).expect("set failed");

    let encoded = scalars.encode(&message).expect("encode failed");
    assert_eq!(
        encoded,
        bytes(concat!(
            "08 01",
            "10 03",
            "1d 01 00 00 00",
            "21 ff ff ff ff ff ff ff ff",
            "2d 00 00 c0 3f",
            "31 00 00 00 00 00 00 f0 3f",
            "38 01",
            "42 02 de ad",
            "48 ff ff ff ff ff ff ff ff ff 01",
            "50 ff ff ff ff ff ff ff ff ff 01",
        ))
    );
    assert_eq!(scalars.decode(&encoded).expect("decode failed"), message);
}

#[test]
fn test_value_coercion() {
    let builder = builder_with(Options::default());
    let scalars = build(&builder, "wire.Scalars");
    let mut message = scalars.new_message();

    scalars.set(&mut message, "s32", Value::Int64(5)).expect("set failed");
    assert_eq!(scalars.get(&message, "s32"), Some(&Value::Int32(5)));

    scalars.set(&mut message, "big", Value::String("18446744073709551615".into())).expect("set failed");
    assert_eq!(scalars.get(&message, "big"), Some(&Value::Uint64(u64::MAX)));

    scalars.set(&mut message, "db", Value::Int32(3)).expect("set failed");
    assert_eq!(scalars.get(&message, "db"), Some(&Value::Double(3.0)));

    scalars.set(&mut message, "raw", Value::String("hi".into())).expect("set failed");
    assert_eq!(scalars.get(&message, "raw"), Some(&Value::Bytes(b"hi".to_vec())));

    // Out of range or mistyped values are rejected without touching the field
    assert!(matches!(
        scalars.set(&mut message, "f32", Value::Int32(-1)),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(
        scalars.set(&mut message, "s32", Value::Int64(i64::MAX)),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert!(matches!(
        scalars.set(&mut message, "ok", Value::String("yes".into())),
        Err(EncodeError::InvalidValue { .. })
    ));
    assert_eq!(scalars.get(&message, "f32"), None);
    assert!(matches!(
        scalars.set(&mut message, "nope", Value::Int32(1)),
        Err(EncodeError::UnknownField { .. })
    ));
}

#[test]
fn test_packed_interchange() {
    let builder = builder_with(Options::default());
    let packed = build(&builder, "wire.Packed");
    let unpacked = build(&builder, "wire.Unpacked");
    let values = Value::List(vec![Value::Int32(3), Value::Int32(270), Value::Int32(86942)]);

    let mut message = packed.new_message();
    packed.set(&mut message, "d", values.clone()).expect("set failed");
    let packed_bytes = packed.encode(&message).expect("encode failed");
    assert_eq!(packed_bytes, bytes("22 06 03 8e 02 9e a7 05"));

    let mut message = unpacked.new_message();
    unpacked.set(&mut message, "d", values.clone()).expect("set failed");
    let unpacked_bytes = unpacked.encode(&message).expect("encode failed");
    assert_eq!(unpacked_bytes, bytes("20 03 20 8e 02 20 9e a7 05"));

    // Either encoding decodes regardless of the declared packing
    let decoded = unpacked.decode(&packed_bytes).expect("decode failed");
    assert_eq!(unpacked.get(&decoded, "d"), Some(&values));
    let decoded = packed.decode(&unpacked_bytes).expect("decode failed");
    assert_eq!(packed.get(&decoded, "d"), Some(&values));

    // Runs and single elements of one field concatenate
    let mixed = bytes("22 02 03 04 20 05");
    let decoded = packed.decode(&mixed).expect("decode failed");
    assert_eq!(
        packed.get(&decoded, "d"),
        Some(&Value::List(vec![Value::Int32(3), Value::Int32(4), Value::Int32(5)]))
    );

    // An empty list writes nothing
    let empty = packed.new_message();
    assert!(packed.encode(&empty).expect("encode failed").is_empty());
}

#[test]
fn test_default_population() {
    let builder = builder_with(Options::default());
    let defaults = build(&builder, "wire.Defaults");

    let decoded = defaults.decode(&[]).expect("decode failed");
    assert_eq!(defaults.get(&decoded, "n"), Some(&Value::Int32(42)));
    assert_eq!(defaults.get(&decoded, "s"), Some(&Value::String("x".into())));
    assert_eq!(defaults.get(&decoded, "r"), Some(&Value::List(Vec::new())));
    assert_eq!(defaults.get(&decoded, "k"), Some(&Value::Enum(1)));
    assert_eq!(defaults.get(&decoded, "m"), Some(&Value::Map(BTreeMap::new())));
    assert_eq!(defaults.get(&decoded, "sub"), None);

    // Values equal to their default are not written
    let mut message = defaults.new_message();
    defaults.set(&mut message, "n", Value::Int32(42)).expect("set failed");
    assert!(defaults.encode(&message).expect("encode failed").is_empty());
    defaults.set(&mut message, "n", Value::Int32(0)).expect("set failed");
    assert_eq!(defaults.encode(&message).expect("encode failed"), bytes("08 00"));

    // Unset fields read as their default without being stored
    let empty = defaults.new_message();
    assert!(!defaults.has(&empty, "s"));
    assert_eq!(defaults.get_or_default(&empty, "s"), Some(Value::String("x".into())));

    let sparse = build(&builder_with(Options { populate_defaults: false, ..Options::default() }), "wire.Defaults");
    let decoded = sparse.decode(&[]).expect("decode failed");
    assert!(decoded.is_empty());
}

#[test]
fn test_required_fields() {
    let builder = builder_with(Options::default());
    let req = build(&builder, "wire.Req");

    // Required fields start out at their default and are always written
    let mut message = req.new_message();
    assert_eq!(req.encode(&message).expect("encode failed"), bytes("08 00"));

    req.clear(&mut message, "id").expect("clear failed");
    assert_eq!(
        req.encode(&message),
        Err(EncodeError::MissingRequired { message: "wire.Req".into(), field: "id".into() })
    );
    assert_eq!(
        req.decode(&bytes("10 02")),
        Err(DecodeError::MissingRequired { message: "wire.Req".into(), field: "id".into() })
    );
}

#[test]
fn test_oneof() {
    let builder = builder_with(Options::default());
    let choice = build(&builder, "wire.Choice");

    let mut message = choice.new_message();
    choice.set(&mut message, "num", Value::Int32(1)).expect("set failed");
    assert_eq!(choice.which_oneof(&message, "pick"), Some("num"));
    choice.set(&mut message, "text", Value::String("a".into())).expect("set failed");
    assert_eq!(choice.which_oneof(&message, "pick"), Some("text"));
    assert!(!choice.has(&message, "num"));

    // The last member on the wire wins
    let decoded = choice.decode(&bytes("12 01 61 08 05")).expect("decode failed");
    assert_eq!(choice.which_oneof(&decoded, "pick"), Some("num"));
    assert_eq!(choice.get(&decoded, "num"), Some(&Value::Int32(5)));
    assert!(!choice.has(&decoded, "text"));
    // A hand-built message with two members set is refused
    let mut both = choice.new_message();
    both.insert(1, Value::Int32(5));
    both.insert(2, Value::String("a".into()));
    assert!(matches!(choice.encode(&both), Err(EncodeError::InvalidValue { .. })));

    // Oneof members are never filled with defaults
    let decoded = choice.decode(&[]).expect("decode failed");
    assert_eq!(choice.which_oneof(&decoded, "pick"), None);
    assert_eq!(choice.get(&decoded, "tail"), Some(&Value::Int32(0)));
}

#[test]
fn test_maps() {
    let builder = builder_with(Options::default());
    let dict = build(&builder, "wire.Dict");
    let test1 = build(&builder, "wire.Test1");

    let mut counts = BTreeMap::new();
    counts.insert(MapKey::String("a".into()), Value::Int32(1));
    let mut item = test1.new_message();
    test1.set(&mut item, "a", Value::Int32(150)).expect("set failed");
    let mut items = BTreeMap::new();
    items.insert(MapKey::Int(7), Value::Message(item));

    let mut message = dict.new_message();
    dict.set(&mut message, "counts", Value::Map(counts)).expect("set failed");
    dict.set(&mut message, "items", Value::Map(items)).expect("set failed");
    let encoded = dict.encode(&message).expect("encode failed");
    assert_eq!(encoded, bytes("0a 05 0a 01 61 10 01 12 07 08 07 12 03 08 96 01"));
    assert_eq!(dict.decode(&encoded).expect("decode failed"), message);

    // Missing key or value take their type defaults
    let decoded = dict.decode(&bytes("0a 03 0a 01 61 0a 02 10 01")).expect("decode failed");
    let mut expected = BTreeMap::new();
    expected.insert(MapKey::String("a".into()), Value::Int32(0));
    expected.insert(MapKey::String(String::new()), Value::Int32(1));
    assert_eq!(dict.get(&decoded, "counts"), Some(&Value::Map(expected)));

    // Keys must fit the declared key type
    let mut bad = BTreeMap::new();
    bad.insert(MapKey::Int(i64::MAX), Value::Message(Message::new("wire.Test1")));
    assert!(matches!(
        dict.set(&mut message, "items", Value::Map(bad)),
        Err(EncodeError::InvalidValue { .. })
    ));
}

#[test]
fn test_groups() {
    let builder = builder_with(Options::default());
    let with_group = build(&builder, "wire.WithGroup");
    let result = with_group.nested("result").expect("no group type");
    let item = with_group.nested("item").expect("no group type");
    assert_eq!(result.name(), "wire.WithGroup.Result");

    let mut inner = result.new_message();
    result.set(&mut inner, "a", Value::Int32(1)).expect("set failed");
    let mut entry = item.new_message();
    item.set(&mut entry, "name", Value::String("x".into())).expect("set failed");

    let mut message = with_group.new_message();
    with_group.set(&mut message, "result", Value::Message(inner)).expect("set failed");
    with_group.add(&mut message, "item", Value::Message(entry)).expect("add failed");

    let encoded = with_group.encode(&message).expect("encode failed");
    assert_eq!(encoded, bytes("0b 10 01 0c 1b 22 01 78 1c"));
    assert_eq!(with_group.decode(&encoded).expect("decode failed"), message);

    assert_eq!(with_group.decode(&bytes("0b 10 01")), Err(DecodeError::UnterminatedGroup(1)));
    assert_eq!(with_group.decode(&bytes("0b 10 01 1c")), Err(DecodeError::UnexpectedEndGroup(3)));
}

#[test]
fn test_unknown_fields() {
    // field 2 length-delimited, field 3 fixed32, group 4 holding a varint
    let unknown = bytes("12 03 61 62 63 1d 01 00 00 00 23 08 01 24");
    let mut input = bytes("08 96 01");
    input.extend_from_slice(&unknown);

    let builder = builder_with(Options::default());
    let test1 = build(&builder, "wire.Test1");
    let decoded = test1.decode(&input).expect("decode failed");
    assert_eq!(test1.get(&decoded, "a"), Some(&Value::Int32(150)));
    assert!(decoded.unknown_fields().is_empty());

    let builder = builder_with(Options { retain_unknown_fields: true, ..Options::default() });
    let test1 = build(&builder, "wire.Test1");
    let decoded = test1.decode(&input).expect("decode failed");
    assert_eq!(decoded.unknown_fields(), unknown.as_slice());
    assert_eq!(test1.encode(&decoded).expect("encode failed"), input);
}

#[test]
fn test_malformed_input() {
    let builder = builder_with(Options::default());
    let test1 = build(&builder, "wire.Test1");
    let test2 = build(&builder, "wire.Test2");

    assert!(matches!(test1.decode(&bytes("08")), Err(DecodeError::Truncated { .. })));
    assert_eq!(
        test1.decode(&bytes("08 80 80 80 80 80 80 80 80 80 80 01")),
        Err(DecodeError::VarintOverflow)
    );
    assert_eq!(test1.decode(&bytes("0e")), Err(DecodeError::InvalidWireType(6)));
    assert_eq!(test1.decode(&bytes("00")), Err(DecodeError::InvalidFieldId(0)));
    assert_eq!(test1.decode(&bytes("0c")), Err(DecodeError::UnexpectedEndGroup(1)));
    assert_eq!(
        test1.decode(&bytes("0a 01 00")),
        Err(DecodeError::WireTypeMismatch {
            field:    "wire.Test1.a".into(),
            expected: WireType::Varint,
            actual:   WireType::Ldelim,
        })
    );
    assert_eq!(
        test2.decode(&bytes("12 05 61")),
        Err(DecodeError::Truncated { needed: 5, remaining: 1 })
    );
    assert_eq!(test2.decode(&bytes("12 02 c3 28")), Err(DecodeError::InvalidUtf8));

    // Length prefixes and tags wider than 32 bits are not truncated
    assert!(matches!(
        test2.decode(&bytes("12 81 80 80 80 10 61")),
        Err(DecodeError::Truncated { remaining: 1, .. })
    ));
    assert_eq!(test1.decode(&bytes("88 80 80 80 10 01")), Err(DecodeError::InvalidFieldId(1 << 29 | 1)));

    // Encoding a message of another type fails up front
    let other = test2.new_message();
    assert!(matches!(test1.encode(&other), Err(EncodeError::TypeMismatch { .. })));
}

/// `levels` Node messages, each one the child of the next.
fn nested_nodes(levels: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..levels {
        let mut bb = ByteBufferMut::new();
        bb.write_tag(1, WireType::Ldelim);
        bb.write_length_delimited(&bytes);
        bytes = bb.data();
    }
    bytes
}

#[test]
fn test_recursion_limit() {
    let builder = builder_with(Options::default());
    let empty = build(&builder, "wire.Empty");
    let node = build(&builder, "wire.Node");

    // Unknown groups that open and never close
    assert_eq!(
        empty.decode(&vec![0x0B; 2_000_000]),
        Err(DecodeError::RecursionLimit(RECURSION_LIMIT))
    );

    let groups = |depth: usize| {
        let mut bytes = vec![0x0B; depth];
        bytes.extend(vec![0x0C; depth]);
        bytes
    };
    assert!(empty.decode(&groups(RECURSION_LIMIT)).is_ok());
    assert_eq!(
        empty.decode(&groups(RECURSION_LIMIT + 1)),
        Err(DecodeError::RecursionLimit(RECURSION_LIMIT))
    );

    // Known submessages of a recursive type
    let decoded = node.decode(&nested_nodes(RECURSION_LIMIT)).expect("decode failed");
    assert!(node.has(&decoded, "child"));
    assert_eq!(
        node.decode(&nested_nodes(RECURSION_LIMIT + 1)),
        Err(DecodeError::RecursionLimit(RECURSION_LIMIT))
    );
    assert_eq!(
        node.decode(&nested_nodes(5_000)),
        Err(DecodeError::RecursionLimit(RECURSION_LIMIT))
    );
}

#[test]
fn test_delimited_stream() {
    let builder = builder_with(Options::default());
    let test1 = build(&builder, "wire.Test1");

    let mut stream = Vec::new();
    for n in [150, 1] {
        let mut message = test1.new_message();
        test1.set(&mut message, "a", Value::Int32(n)).expect("set failed");
        stream.extend(test1.encode_delimited(&message).expect("encode failed"));
    }
    assert_eq!(stream, bytes("03 08 96 01 02 08 01"));

    let mut bb = ByteBuffer::new(&stream);
    let first = test1.decode_delimited(&mut bb).expect("decode failed");
    let second = test1.decode_delimited(&mut bb).expect("decode failed");
    assert!(bb.is_empty());
    assert_eq!(test1.get(&first, "a"), Some(&Value::Int32(150)));
    assert_eq!(test1.get(&second, "a"), Some(&Value::Int32(1)));
    assert!(matches!(test1.decode_delimited(&mut bb), Err(DecodeError::Truncated { .. })));
}

/// Maps `"x,y"` strings onto `wire.Point`.
struct PointTranslator;

impl Translator for PointTranslator {
    fn encode(&self, value: &Value) -> Result<Message, EncodeError> {
        let invalid = || EncodeError::InvalidValue {
            field:  "wire.Point".into(),
            reason: format!("expected \"x,y\", got {:?}", value),
        };
        let (x, y) = match value {
            Value::String(text) => text.split_once(',').ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        let mut point = Message::new("wire.Point");
        point.insert(1, Value::Int32(x.trim().parse().map_err(|_| invalid())?));
        point.insert(2, Value::Int32(y.trim().parse().map_err(|_| invalid())?));
        Ok(point)
    }

    fn decode(&self, message: Message) -> Result<Value, DecodeError> {
        match (message.get(1), message.get(2)) {
            (Some(Value::Int32(x)), Some(Value::Int32(y))) => Ok(Value::String(format!("{},{}", x, y))),
            _ => Err(DecodeError::Translator {
                message: "wire.Point".into(),
                reason:  "missing coordinates".into(),
            }),
        }
    }
}

#[test]
fn test_translators() {
    let options = Options::default().with_translator(".wire.Point", Arc::new(PointTranslator));
    let builder = builder_with(options);
    let route = build(&builder, "wire.Route");

    let mut message = route.new_message();
    route.set(&mut message, "at", Value::String("3,4".into())).expect("set failed");
    route.add(&mut message, "path", Value::String("1,-1".into())).expect("add failed");
    assert!(matches!(
        route.set(&mut message, "at", Value::Int32(1)),
        Err(EncodeError::InvalidValue { .. })
    ));

    let encoded = route.encode(&message).expect("encode failed");
    assert_eq!(encoded, bytes("0a 04 08 06 10 08 12 04 08 02 10 01"));

    let decoded = route.decode(&encoded).expect("decode failed");
    assert_eq!(route.get(&decoded, "at"), Some(&Value::String("3,4".into())));
    assert_eq!(route.get(&decoded, "path"), Some(&Value::List(vec![Value::String("1,-1".into())])));
    // Translated values encode again through the translator
    assert_eq!(route.encode(&decoded).expect("encode failed"), encoded);
}

#[test]
fn test_shared_across_threads() {
    let builder = builder_with(Options::default());
    let test1 = build(&builder, "wire.Test1");

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let test1 = test1.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let mut message = test1.new_message();
                    test1.set(&mut message, "a", Value::Int32(n * 1000 + i)).expect("set failed");
                    let encoded = test1.encode(&message).expect("encode failed");
                    assert_eq!(test1.decode(&encoded).expect("decode failed"), message);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

#[test]
fn test_closed_and_open_enums() {
    let builder = builder_with(Options::default());
    let defaults = build(&builder, "wire.Defaults");
    let mut message = defaults.new_message();

    defaults.set(&mut message, "k", Value::String("SECOND".into())).expect("set failed");
    assert_eq!(defaults.get(&message, "k"), Some(&Value::Enum(2)));
    assert!(matches!(
        defaults.set(&mut message, "k", Value::Enum(7)),
        Err(EncodeError::InvalidValue { .. })
    ));

    let open = load_proto(
        "syntax = \"proto3\"; enum Color { NONE = 0; RED = 1; } message Paint { Color c = 1; }",
        None,
        None,
    )
    .expect("load_proto failed");
    let paint = build(&open, "Paint");
    let mut message = paint.new_message();
    assert_eq!(paint.get(&message, "c"), Some(&Value::Enum(0)));
    paint.set(&mut message, "c", Value::Enum(7)).expect("open enums accept unknown numbers");
    assert_eq!(paint.encode(&message).expect("encode failed"), bytes("08 07"));
}

#[test]
fn test_proto3_implicit_presence() {
    let builder = load_proto(
        "syntax = \"proto3\"; message M { int32 n = 1; string s = 2; repeated int32 r = 3; }",
        None,
        None,
    )
    .expect("load_proto failed");
    let m = build(&builder, "M");

    let mut message = m.new_message();
    assert_eq!(m.get(&message, "s"), Some(&Value::String(String::new())));
    assert!(m.encode(&message).expect("encode failed").is_empty());

    m.set(&mut message, "n", Value::Int32(1)).expect("set failed");
    m.add(&mut message, "r", Value::Int32(1)).expect("add failed");
    m.add(&mut message, "r", Value::Int32(2)).expect("add failed");
    // Repeated scalars pack by default in proto3
    assert_eq!(m.encode(&message).expect("encode failed"), bytes("08 01 1a 02 01 02"));
    assert_eq!(m.decode(&bytes("08 01 1a 02 01 02")).expect("decode failed"), message);
}

#[test]
fn test_negative_zero_is_written() {
    let builder = load_proto("syntax = \"proto3\"; message F { double d = 1; float f = 2; }", None, None)
        .expect("load_proto failed");
    let f = build(&builder, "F");

    let mut message = f.new_message();
    assert!(f.encode(&message).expect("encode failed").is_empty());

    f.set(&mut message, "d", Value::Double(-0.0)).expect("set failed");
    f.set(&mut message, "f", Value::Float(-0.0)).expect("set failed");
    let encoded = f.encode(&message).expect("encode failed");
    assert_eq!(encoded, bytes("09 00 00 00 00 00 00 00 80 15 00 00 00 80"));

    let decoded = f.decode(&encoded).expect("decode failed");
    assert!(matches!(f.get(&decoded, "d"), Some(Value::Double(d)) if d.is_sign_negative()));
    assert!(matches!(f.get(&decoded, "f"), Some(Value::Float(v)) if v.is_sign_negative()));
}
