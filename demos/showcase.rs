//! Showcase of tag-addressed decoding.
//!
//! Builds a dynamic tree the way a parser would hand it over, decodes it into
//! typed destinations, then shows a failing decode rendered as a miette
//! report.

use tagbind::{Config, Context, Open, ResolveError, Slot, Value, destination, from_value};

destination! {
    #[derive(Debug, Default)]
    pub struct Service tagged "conf" {
        pub name: String => "name",
        pub replicas: u32 => "replicas",
        pub endpoints: Vec<Endpoint> => "endpoints",
        pub transport: Open => "transport",
        pub kind: String => "transport_kind",
    }
    resolve = Service::pick_transport;
}

destination! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Endpoint tagged "conf" {
        pub host: String => "host",
        pub port: u16 => "port",
    }
}

destination! {
    #[derive(Debug, Default, PartialEq)]
    pub struct TcpTransport tagged "conf" {
        pub nodelay: bool => "nodelay",
    }
}

impl Service {
    fn pick_transport(ctx: &Context<'_>) -> Result<Option<Box<dyn Slot>>, ResolveError> {
        match ctx.sibling("transport_kind").and_then(Value::as_str) {
            Some("tcp") => Ok(Some(Box::new(TcpTransport::default()))),
            Some(other) => Err(ResolveError::new(format!("unknown transport `{other}`"))),
            None => Ok(None),
        }
    }
}

fn main() {
    let source = Value::map([
        ("name", Value::from("search")),
        ("replicas", Value::from(3)),
        (
            "endpoints",
            Value::seq([
                Value::map([("host", Value::from("10.0.0.1")), ("port", Value::from(7700))]),
                Value::map([("host", Value::from("10.0.0.2")), ("port", Value::from(7701))]),
            ]),
        ),
        ("transport_kind", Value::from("tcp")),
        ("transport", Value::map([("nodelay", Value::from(true))])),
    ]);

    let config = Config::new("conf");
    let service: Service = from_value(&source, &config).expect("well-formed input");

    println!("decoded: {service:#?}");
    println!(
        "transport resolved to: {:?}",
        service.transport.resolved_ref::<TcpTransport>()
    );

    // Now a broken document: a typo in a key and a port out of range.
    let broken = Value::map([
        ("name", Value::from("search")),
        (
            "endpoints",
            Value::seq([Value::map([
                ("host", Value::from("10.0.0.1")),
                ("port", Value::from(77000)),
            ])]),
        ),
    ]);

    if let Err(err) = from_value::<Service>(&broken, &config) {
        eprintln!("{:?}", miette::Report::new(err));
    }

    let typo = Value::map([("replcias", Value::from(3))]);
    if let Err(err) = from_value::<Service>(&typo, &config) {
        eprintln!("{:?}", miette::Report::new(err));
    }
}
