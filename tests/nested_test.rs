//! Test nested, collection and parameterized mappings through the facade.

use std::sync::Arc;

use shapemap::{
    record, BuildError, Diagnostic, MapError, MapperBuilder, MapperError, MappingConfig,
    NestedMappers, Shapes,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Line {
    sku: String,
    quantity: u32,
}

record!(Line { sku: String, quantity: u32 });

#[derive(Debug, Clone, Default, PartialEq)]
struct LineView {
    sku: String,
    quantity: String,
}

record!(LineView { sku: String, quantity: String });

#[derive(Debug, Clone, Default, PartialEq)]
struct Address {
    city: String,
}

record!(Address { city: String });

#[derive(Debug, Clone, Default, PartialEq)]
struct AddressView {
    city: String,
}

record!(AddressView { city: String });

#[derive(Debug, Clone, Default, PartialEq)]
struct Invoice {
    number: u32,
    billing: Address,
    shipping: Option<Address>,
    lines: Vec<Line>,
}

record!(Invoice {
    number: u32,
    billing: Address,
    shipping: Option<Address>,
    lines: Vec<Line>,
});

#[derive(Debug, Clone, Default, PartialEq)]
struct InvoiceView {
    number: u32,
    billing: AddressView,
    shipping: Option<AddressView>,
    lines: Vec<LineView>,
}

record!(InvoiceView {
    number: u32,
    billing: AddressView,
    shipping: Option<AddressView>,
    lines: Vec<LineView>,
});

fn invoice() -> Invoice {
    Invoice {
        number: 12,
        billing: Address {
            city: "Oslo".into(),
        },
        shipping: None,
        lines: vec![
            Line {
                sku: "A-1".into(),
                quantity: 2,
            },
            Line {
                sku: "B-7".into(),
                quantity: 10,
            },
        ],
    }
}

#[test]
fn test_nested_records_and_collections() {
    init_logging();
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Invoice, InvoiceView>::new())
        .register(MappingConfig::<Address, AddressView>::new())
        .register(MappingConfig::<Line, LineView>::new())
        .finalize();

    let view: InvoiceView = mapper.construct(&invoice()).unwrap();
    assert_eq!(view.number, 12);
    assert_eq!(view.billing.city, "Oslo");
    assert_eq!(view.shipping, None);
    assert_eq!(
        view.lines,
        vec![
            LineView {
                sku: "A-1".into(),
                quantity: "2".into(),
            },
            LineView {
                sku: "B-7".into(),
                quantity: "10".into(),
            },
        ]
    );

    let mut shipped = invoice();
    shipped.shipping = Some(Address {
        city: "Bergen".into(),
    });
    let view: InvoiceView = mapper.construct(&shipped).unwrap();
    assert_eq!(
        view.shipping,
        Some(AddressView {
            city: "Bergen".into()
        })
    );

    // Nested mappers are built on first use and cached like any other.
    assert_eq!(mapper.stats().builds, 3);
    assert!(mapper.try_mapper::<Line, LineView>(None).is_some());
}

#[test]
fn test_missing_nested_mapper_is_a_runtime_fault() {
    init_logging();
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Invoice, InvoiceView>::new())
        .register(MappingConfig::<Address, AddressView>::new())
        .finalize();

    // Building succeeds; the line mapper is only needed once a line is mapped.
    mapper.mapper::<Invoice, InvoiceView>().unwrap();
    let empty = Invoice {
        lines: Vec::new(),
        ..invoice()
    };
    assert!(mapper.construct::<Invoice, InvoiceView>(&empty).is_ok());

    let error = mapper
        .construct::<Invoice, InvoiceView>(&invoice())
        .unwrap_err();
    assert!(matches!(
        error,
        MapperError::Map(MapError::NestedMapperMissing { .. })
    ));
}

#[test]
fn test_broken_nested_mapping_surfaces_build_error() {
    init_logging();
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Invoice, InvoiceView>::new().ignore("lines"))
        .register(MappingConfig::<Address, AddressView>::new().map_path("city", "town"))
        .finalize();

    let error = mapper
        .construct::<Invoice, InvoiceView>(&invoice())
        .unwrap_err();
    let MapperError::Map(MapError::Build(inner)) = error else {
        panic!("expected a nested build failure");
    };
    assert!(matches!(
        inner.diagnostics(),
        [Diagnostic::UnknownSourcePath { .. }]
    ));
}

#[test]
fn test_explicit_nested_mapping_with_profile() {
    init_logging();
    let config = MappingConfig::<Invoice, InvoiceView>::new()
        .ignore("lines")
        .map_nested("billing", "shipping", Some("shipping"));
    let mapper = MapperBuilder::new()
        .register(config)
        .register(MappingConfig::<Address, AddressView>::new())
        .register(
            MappingConfig::<Address, AddressView>::new()
                .profile("shipping")
                .map_from("city", |address: &Address| address.city.to_uppercase()),
        )
        .finalize();

    let mut shipped = invoice();
    shipped.shipping = Some(Address {
        city: "Bergen".into(),
    });
    let view: InvoiceView = mapper.construct(&shipped).unwrap();
    assert_eq!(view.billing.city, "BERGEN");
    assert_eq!(view.shipping.map(|address| address.city).as_deref(), Some("Bergen"));

    let view: InvoiceView = mapper.construct(&invoice()).unwrap();
    assert_eq!(view.billing, AddressView::default());
}

#[derive(Debug, Clone, Default)]
struct Category {
    name: String,
    children: Vec<Category>,
}

record!(Category { name: String, children: Vec<Category> });

#[derive(Debug, Clone, Default)]
struct CategoryView {
    name: String,
    children: Vec<CategoryView>,
}

record!(CategoryView { name: String, children: Vec<CategoryView> });

#[test]
fn test_self_referential_nesting_is_rejected() {
    init_logging();
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Category, CategoryView>::new())
        .finalize();

    let error = mapper.mapper::<Category, CategoryView>().unwrap_err();
    let MapperError::Build(BuildError::Invalid { diagnostics, .. }) = error else {
        panic!("expected an invalid specification");
    };
    assert!(matches!(
        diagnostics.as_slice(),
        [Diagnostic::SelfReferentialNesting { member, .. }] if member == "children"
    ));
}

/// Auxiliary parameter used by the tenant-aware mappings.
#[derive(Debug)]
struct Tenant {
    prefix: &'static str,
}

#[test]
fn test_parameter_shapes() {
    init_logging();
    let config = MappingConfig::<Line, LineView>::new()
        .map_from_with("sku", |line: &Line, tenant: &Tenant| {
            format!("{}{}", tenant.prefix, line.sku)
        })
        .after_with(|_: &Line, view: &mut LineView, tenant: &Tenant| {
            view.quantity.push_str(tenant.prefix);
        });
    let mapper = MapperBuilder::new().register(config).finalize();
    let tenant = Tenant { prefix: "acme/" };
    let line = Line {
        sku: "A-1".into(),
        quantity: 3,
    };

    let view: LineView = mapper.construct_with(&line, &tenant).unwrap();
    assert_eq!(view.sku, "acme/A-1");
    assert_eq!(view.quantity, "3acme/");

    let mut existing = LineView::default();
    mapper.update_with(&line, &mut existing, &tenant).unwrap();
    assert_eq!(existing, view);

    let compiled = mapper.mapper::<Line, LineView>().unwrap();
    assert_eq!(compiled.shapes(), Shapes::UPDATE_WITH | Shapes::CONSTRUCT_WITH);
    assert_eq!(
        compiled.parameter().map(|param| param.id),
        Some(std::any::TypeId::of::<Tenant>())
    );
    assert!(matches!(
        compiled.construct(&line),
        Err(MapError::ShapeNotCompiled { .. })
    ));
    assert!(matches!(
        compiled.construct_with(&line, &42u32),
        Err(MapError::ParameterType { .. })
    ));
}

#[test]
fn test_conflicting_parameter_types() {
    init_logging();
    let config = MappingConfig::<Line, LineView>::new()
        .map_from_with("sku", |line: &Line, _: &Tenant| line.sku.clone())
        .condition_with("quantity", |_: &Line, enabled: &bool| *enabled);
    let mapper = MapperBuilder::new().register(config).finalize();

    let error = mapper.mapper::<Line, LineView>().unwrap_err();
    let MapperError::Build(error) = error else {
        panic!("expected a build error");
    };
    assert!(matches!(
        error.diagnostics(),
        [Diagnostic::ConflictingParameterTypes { .. }]
    ));
}

#[test]
fn test_parameter_reaches_nested_mappers() {
    init_logging();
    let parent = MappingConfig::<Invoice, InvoiceView>::new()
        .before_with(|_: &Invoice, _: &mut InvoiceView, _: &Tenant| {});
    let child = MappingConfig::<Line, LineView>::new().map_from_with(
        "sku",
        |line: &Line, tenant: &Tenant| format!("{}{}", tenant.prefix, line.sku),
    );
    let mapper = MapperBuilder::new()
        .register(parent)
        .register(child)
        .register(MappingConfig::<Address, AddressView>::new())
        .finalize();

    let view: InvoiceView = mapper
        .construct_with(&invoice(), &Tenant { prefix: "t1:" })
        .unwrap();
    assert_eq!(view.lines[0].sku, "t1:A-1");
    assert_eq!(view.lines[1].sku, "t1:B-7");
}

#[test]
fn test_parameter_is_not_threaded_without_declaration() {
    init_logging();
    let child = MappingConfig::<Line, LineView>::new()
        .map_from_with("sku", |line: &Line, tenant: &Tenant| {
            format!("{}{}", tenant.prefix, line.sku)
        });
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Invoice, InvoiceView>::new())
        .register(child)
        .register(MappingConfig::<Address, AddressView>::new())
        .finalize();

    let error = mapper
        .construct::<Invoice, InvoiceView>(&invoice())
        .unwrap_err();
    assert!(matches!(
        error,
        MapperError::Map(MapError::ParameterMissing { .. })
    ));
}

#[test]
fn test_get_callable_returns_typed_mapper() {
    init_logging();
    let mapper = MapperBuilder::new()
        .register(MappingConfig::<Address, AddressView>::new())
        .finalize();

    let facade: &dyn NestedMappers = &*mapper;
    let callable = facade.get_callable::<Address, AddressView>(None).unwrap();
    let direct = mapper.mapper::<Address, AddressView>().unwrap();
    assert!(Arc::ptr_eq(&callable, &direct));

    let view = callable
        .construct(&Address {
            city: "Tromsø".into(),
        })
        .unwrap();
    assert_eq!(view.city, "Tromsø");
}
