use std::rc::Rc;

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use uast_engine::codec::{self, json::to_json};
use uast_engine::{EngineError, Format, HandleNode, Node, NodeKind};

fn decode_root(bytes: &[u8], format: Format) -> HandleNode {
    HandleNode::root(&Rc::new(codec::decode(bytes, format).unwrap())).unwrap()
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e6..1.0e6f64).prop_map(|f| json!(f)),
        "[a-zA-Z0-9 _@-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z@]{1,6}", inner), 0..6)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

proptest! {
    #[test]
    fn json_and_binary_agree(value in json_value()) {
        let text = serde_json::to_vec(&value).unwrap();
        let from_json = decode_root(&text, Format::Json);

        let binary = codec::encode(&from_json, Format::Binary).unwrap();
        let from_binary = decode_root(&binary, Format::Binary);

        prop_assert_eq!(to_json(&from_binary).unwrap(), value.clone());
        prop_assert_eq!(codec::encode(&from_binary, Format::Json).unwrap(), text);
    }
}

#[test]
fn uast_document_survives_both_formats() {
    let doc = json!({
        "@type": "File",
        "@pos": {"@type": "uast:Positions", "start": {"offset": 0, "line": 1, "col": 1}},
        "children": [{"@type": "Ident", "Name": "x"}, null, 1.5, -7]
    });
    for format in [Format::Binary, Format::Json] {
        let root = decode_root(&serde_json::to_vec(&doc).unwrap(), Format::Json);
        let bytes = codec::encode(&root, format).unwrap();
        let back = decode_root(&bytes, format);
        assert_eq!(to_json(&back).unwrap(), doc, "{format}");
    }
}

#[test]
fn decoded_kinds() {
    let root = decode_root(br#"[null, true, -1, 1.25, "s", [], {}]"#, Format::Json);
    let kinds: Vec<_> = (0..root.size().unwrap()).map(|i| root.value_at(i).unwrap().kind()).collect();
    assert_eq!(
        kinds,
        [
            NodeKind::Null,
            NodeKind::Bool,
            NodeKind::Int,
            NodeKind::Float,
            NodeKind::String,
            NodeKind::Array,
            NodeKind::Object
        ]
    );
}

#[test]
fn malformed_buffers() {
    for format in [Format::Binary, Format::Json] {
        assert!(matches!(
            codec::decode(b"\xff\xff{", format),
            Err(EngineError::Decode { .. })
        ));
    }
}
