use std::collections::HashMap;

use tagbind::{
    Config, Context, DecodeErrorKind, Open, ResolveError, Slot, Value, destination, from_value,
};

destination! {
    #[derive(Debug, Default, PartialEq)]
    struct Payload tagged "bind" {
        d: i64 => "d",
    }
}

// A composite that picks the concrete type of its own `data` field from the
// sibling `type` key.
destination! {
    #[derive(Debug, Default)]
    struct Container tagged "bind" {
        kind: String => "type",
        data: Open => "data",
    }
    resolve = Container::pick_data;
}

impl Container {
    fn pick_data(ctx: &Context<'_>) -> Result<Option<Box<dyn Slot>>, ResolveError> {
        match ctx.sibling("type").and_then(Value::as_str) {
            Some("string") => Ok(Some(Box::new(String::new()))),
            Some("struct") => Ok(Some(Box::<Option<Box<Payload>>>::default())),
            Some(other) => Err(ResolveError::new(format!("unsupported type `{other}`"))),
            None => Ok(None),
        }
    }
}

destination! {
    #[derive(Debug, Default)]
    struct WithOpen tagged "bind" {
        value: Open => "value",
    }
}

fn config() -> Config {
    Config::new("bind")
}

#[test]
fn container_resolves_its_own_string_field() {
    let source = Value::map([
        ("type", Value::from("string")),
        ("data", Value::from("payload")),
    ]);

    let container: Container = from_value(&source, &config()).unwrap();

    assert_eq!(container.kind, "string");
    assert_eq!(
        container.data.resolved_ref::<String>(),
        Some(&"payload".to_string())
    );
}

#[test]
fn container_resolves_indirection_to_composite() {
    let source = Value::map([
        ("type", Value::from("struct")),
        ("data", Value::map([("d", Value::from(5))])),
    ]);

    let container: Container = from_value(&source, &config()).unwrap();

    let resolved = container
        .data
        .resolved_ref::<Option<Box<Payload>>>()
        .expect("data should resolve to an indirection");
    let payload = resolved.as_deref().expect("indirection should be allocated");
    assert_eq!(payload, &Payload { d: 5 });
}

#[test]
fn global_resolver_fills_open_field() {
    let config = config().with_resolver(|_ctx| Ok(Some(Box::new(String::new()))));
    let source = Value::map([("value", Value::from("test"))]);

    let with_open: WithOpen = from_value(&source, &config).unwrap();

    assert_eq!(
        with_open.value.resolved_ref::<String>(),
        Some(&"test".to_string())
    );
}

#[test]
fn global_resolver_sees_the_enclosing_composite() {
    let config = config().with_resolver(|ctx| {
        if ctx.parent_is::<WithOpen>() && ctx.key == "value" {
            Ok(Some(Box::new(0i64)))
        } else {
            Err(ResolveError::new("unexpected position"))
        }
    });
    let source = Value::map([("value", Value::from(42))]);

    let with_open: WithOpen = from_value(&source, &config).unwrap();

    assert_eq!(with_open.value.resolved_ref::<i64>(), Some(&42));
}

#[test]
fn map_entries_share_the_enclosing_field_context() {
    destination! {
        #[derive(Debug, Default)]
        struct Registry tagged "bind" {
            table: HashMap<String, Open> => "table",
        }
    }

    let config = config().with_resolver(|ctx| {
        assert_eq!(ctx.key, "table");
        Ok(Some(Box::<Option<Box<Payload>>>::default()))
    });
    let source = Value::map([(
        "table",
        Value::map([
            ("first", Value::map([("d", Value::from(1))])),
            ("second", Value::map([("d", Value::from(2))])),
        ]),
    )]);

    let registry: Registry = from_value(&source, &config).unwrap();

    for (key, expected) in [("first", 1), ("second", 2)] {
        let entry = registry.table.get(key).unwrap();
        let resolved = entry.resolved_ref::<Option<Box<Payload>>>().unwrap();
        assert_eq!(resolved.as_deref(), Some(&Payload { d: expected }));
    }
}

#[test]
fn container_hook_wins_over_global_resolver() {
    // The global resolver would store an integer; the container's own hook
    // must be the one that decides.
    let config = config().with_resolver(|_ctx| Ok(Some(Box::new(0i64))));
    let source = Value::map([
        ("type", Value::from("string")),
        ("data", Value::from("x")),
    ]);

    let container: Container = from_value(&source, &config).unwrap();

    assert_eq!(container.data.resolved_ref::<String>(), Some(&"x".to_string()));
    assert_eq!(container.data.resolved_ref::<i64>(), None);
}

#[test]
fn declining_hook_falls_back_to_global_resolver() {
    // Without a `type` sibling the container's hook declines.
    let config = config().with_resolver(|_ctx| Ok(Some(Box::new(String::new()))));
    let source = Value::map([("data", Value::from("fallback"))]);

    let container: Container = from_value(&source, &config).unwrap();

    assert_eq!(
        container.data.resolved_ref::<String>(),
        Some(&"fallback".to_string())
    );
}

#[test]
fn unresolved_open_field_is_skipped_not_fatal() {
    let source = Value::map([("value", Value::from(42))]);

    let with_open: WithOpen = from_value(&source, &config()).unwrap();

    assert!(!with_open.value.is_resolved());
}

#[test]
fn hook_error_aborts_the_decode() {
    let source = Value::map([
        ("type", Value::from("bogus")),
        ("data", Value::from(1)),
    ]);

    let err = from_value::<Container>(&source, &config()).unwrap_err();

    match err.kind() {
        DecodeErrorKind::ResolverFailed { message } => {
            assert!(message.contains("bogus"));
        }
        other => panic!("expected ResolverFailed, got {other:?}"),
    }
}

#[test]
fn global_resolver_error_aborts_the_decode() {
    let config = config().with_resolver(|_ctx| Err(ResolveError::new("no idea")));
    let source = Value::map([("value", Value::from(1))]);

    let err = from_value::<WithOpen>(&source, &config).unwrap_err();

    assert!(matches!(
        err.kind(),
        DecodeErrorKind::ResolverFailed { .. }
    ));
}
