use std::collections::HashMap;

use miette::Diagnostic;
use tagbind::{Config, DecodeErrorKind, PathSegment, Value, destination, from_value};

destination! {
    #[derive(Debug, Default, PartialEq)]
    struct Inner tagged "bind" {
        a: i64 => "a",
    }
}

destination! {
    #[derive(Debug, Default, PartialEq)]
    struct Root tagged "bind" {
        name: String => "name",
        items: Vec<Inner> => "items",
        labels: Vec<String> => "labels",
        ids: HashMap<u32, i64> => "ids",
        p: Option<Box<String>> => "p",
        small: u8 => "small",
    }
}

fn config() -> Config {
    Config::new("bind")
}

#[test]
fn errors_carry_the_path_to_the_failing_node() {
    let source = Value::map([(
        "items",
        Value::seq([
            Value::map([("a", Value::from(1))]),
            Value::map([("a", Value::from("zzz"))]),
        ]),
    )]);

    let err = from_value::<Root>(&source, &config()).unwrap_err();

    assert_eq!(
        err.path().segments(),
        &[
            PathSegment::Key("items".to_string()),
            PathSegment::Index(1),
            PathSegment::Key("a".to_string()),
        ]
    );
    insta::assert_snapshot!(err, @"at items[1].a: type mismatch: expected i64, got string");
}

#[test]
fn top_level_errors_have_no_path() {
    let err = from_value::<Root>(&Value::Null, &config()).unwrap_err();

    assert!(err.path().is_empty());
    insta::assert_snapshot!(err, @"expected a mapping, got null");
}

#[test]
fn unknown_field_lists_expected_tags_and_suggests() {
    let source = Value::map([("nmae", Value::from(1))]);

    let err = from_value::<Root>(&source, &config()).unwrap_err();

    assert_eq!(
        err.help().map(|h| h.to_string()),
        Some("did you mean `name`?".to_string())
    );
    insta::assert_snapshot!(
        err,
        @r#"unknown field `nmae`, expected one of: ["name", "items", "labels", "ids", "p", "small"] (did you mean `name`?)"#
    );
}

#[test]
fn non_string_map_keys_are_rejected() {
    let source = Value::map([("ids", Value::map([("1", Value::from(1))]))]);

    let err = from_value::<Root>(&source, &config()).unwrap_err();

    assert!(matches!(
        err.kind(),
        DecodeErrorKind::UnsupportedKeyType { key_type: "u32" }
    ));
    insta::assert_snapshot!(
        err,
        @"at ids: unsupported map key type `u32`, only String keys are supported"
    );
}

#[test]
fn non_sequence_into_sequence_destination() {
    let source = Value::map([("labels", Value::from(5))]);

    let err = from_value::<Root>(&source, &config()).unwrap_err();

    insta::assert_snapshot!(err, @"at labels: expected a sequence, got number");
}

#[test]
fn indirection_to_non_composite_is_unsupported() {
    let source = Value::map([("p", Value::from("x"))]);

    let err = from_value::<Root>(&source, &config()).unwrap_err();

    assert!(matches!(
        err.kind(),
        DecodeErrorKind::UnsupportedShape { .. }
    ));
    insta::assert_snapshot!(err, @"at p: unsupported destination shape: scalar");
}

#[test]
fn number_out_of_range_names_value_and_target() {
    let source = Value::map([("small", Value::from(300))]);

    let err = from_value::<Root>(&source, &config()).unwrap_err();

    insta::assert_snapshot!(err, @"at small: number `300` out of range for u8");
}

#[test]
fn errors_expose_stable_codes() {
    let cases: Vec<(Value, &str)> = vec![
        (Value::Null, "tagbind::not_a_mapping"),
        (
            Value::map([("labels", Value::from(5))]),
            "tagbind::not_a_sequence",
        ),
        (
            Value::map([("name", Value::from(false))]),
            "tagbind::type_mismatch",
        ),
        (
            Value::map([("oops", Value::Null)]),
            "tagbind::unknown_field",
        ),
        (
            Value::map([("small", Value::from(300))]),
            "tagbind::number_out_of_range",
        ),
    ];

    for (source, expected_code) in cases {
        let err = from_value::<Root>(&source, &config()).unwrap_err();
        let code = err.code().expect("every decode error has a code");
        assert_eq!(code.to_string(), expected_code);
    }
}
