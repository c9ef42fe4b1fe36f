use std::rc::Rc;

use serde_json::{json, Value};
use uast_engine::query::{self, ParseError};
use uast_engine::{codec, EngineError, Format, HandleNode, Node};

fn root(value: Value) -> HandleNode {
    let bytes = serde_json::to_vec(&value).unwrap();
    HandleNode::root(&Rc::new(codec::decode(&bytes, Format::Json).unwrap())).unwrap()
}

fn file() -> HandleNode {
    root(json!({
        "@type": "File",
        "limit": 2,
        "children": [
            {"@type": "Ident", "Name": "alpha", "size": 1},
            {"@type": "Call", "children": [
                {"@type": "Ident", "Name": "beta", "size": 3},
                {"@type": "Literal", "Value": "10"}
            ]},
            {"@type": "Ident", "Name": "gamma", "size": 2}
        ]
    }))
}

fn names(nodes: &[HandleNode]) -> Vec<String> {
    nodes.iter().map(|n| n.as_str().unwrap().to_string()).collect()
}

#[test]
fn recursive_filter_by_type() {
    // Matches are grouped by the container whose children were tested.
    let found = query::filter(&file(), "$..[?(@.@type == 'Ident')].Name").unwrap();
    assert_eq!(names(&found), ["alpha", "gamma", "beta"]);
}

#[test]
fn recursive_member_name() {
    let types = query::filter(&file(), "$..@type").unwrap();
    assert_eq!(names(&types), ["File", "Ident", "Call", "Ident", "Literal", "Ident"]);
}

#[test]
fn root_reference_inside_filter() {
    let found = query::filter(&file(), "$..[?(@.size >= $.limit)].Name").unwrap();
    assert_eq!(names(&found), ["gamma", "beta"]);
}

#[test]
fn slices_and_negative_indices() {
    let root = file();
    let last = query::filter(&root, "$.children[-1].Name").unwrap();
    assert_eq!(names(&last), ["gamma"]);

    let reversed = query::filter(&root, "$.children[::-2]['@type']").unwrap();
    assert_eq!(names(&reversed), ["Ident", "Ident"]);
}

#[test]
fn functions() {
    let root = file();
    let long = query::filter(&root, "$..[?length(@.Name) > 4].Name").unwrap();
    assert_eq!(names(&long), ["alpha", "gamma"]);

    let matched = query::filter(&root, "$..[?match(@.Name, 'b.*')].Name").unwrap();
    assert_eq!(names(&matched), ["beta"]);

    let searched = query::filter(&root, "$..[?search(@.Name, 'mm')].Name").unwrap();
    assert_eq!(names(&searched), ["gamma"]);

    let calls = query::filter(&root, "$.children[?count(@.children[*]) == 2]['@type']").unwrap();
    assert_eq!(names(&calls), ["Call"]);
}

#[test]
fn nothing_matches_is_empty() {
    assert!(query::filter(&file(), "$..[?(@.@type == 'Missing')]").unwrap().is_empty());
    assert!(query::filter(&file(), "$.nope.deeper").unwrap().is_empty());
}

#[test]
fn scalar_root_only_matches_itself() {
    let scalar = root(json!(5));
    assert_eq!(query::filter(&scalar, "$").unwrap().len(), 1);
    assert!(query::filter(&scalar, "$.*").unwrap().is_empty());
}

#[test]
fn malformed_query_is_a_query_error() {
    assert!(matches!(
        query::filter(&file(), "$[?(@.a =="),
        Err(EngineError::Query(_))
    ));
}

#[test]
fn invalid_regex_is_reported() {
    let err = query::filter(&file(), "$..[?match(@.Name, '(')]").unwrap_err();
    assert!(matches!(err, EngineError::Query(ParseError::InvalidRegex(_))));
}
