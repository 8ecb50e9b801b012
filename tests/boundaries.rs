//! Boundary and invariant cases from SPEC_FULL.md §8, exercised through
//! the public API against the in-memory `mem://` scheme handler.

use component_chassis::component::ComponentDescriptor;
use component_chassis::config::ChassisConfig;
use component_chassis::bootstrap::Chassis;
use component_chassis::scheme::as_interface;
use component_chassis::test_support::MemScheme;
use std::sync::Arc;

fn chassis_with_mem(mem: MemScheme) -> Chassis {
    let chassis = Chassis::new(ChassisConfig::default().without_bootstrap_services()).unwrap();
    chassis
        .registry
        .register_service("dynamic_loader_scheme_mem", as_interface(mem.into_handler()))
        .unwrap();
    chassis
}

#[test]
fn empty_batch_load_and_unload_are_noops() {
    let chassis = Chassis::new(ChassisConfig::default().without_bootstrap_services()).unwrap();
    let report = chassis.loader.load(&[]).unwrap();
    assert!(report.urns.is_empty());
    let report = chassis.loader.unload(&[]).unwrap();
    assert!(report.success);
    assert!(report.urns.is_empty());
}

#[test]
fn descriptor_with_no_provides_and_no_requires_loads_cleanly() {
    let mem = MemScheme::new().register("noop", |_| ComponentDescriptor::new("noop"));
    let chassis = chassis_with_mem(mem);

    chassis.loader.load(&["mem://noop".to_string()]).unwrap();
    let report = chassis.loader.unload(&["mem://noop".to_string()]).unwrap();
    assert!(report.success);
}

#[test]
fn unknown_scheme_is_rejected() {
    let chassis = Chassis::new(ChassisConfig::default().without_bootstrap_services()).unwrap();
    assert!(chassis.loader.load(&["ftp://a".to_string()]).is_err());
}

#[test]
fn urn_missing_scheme_separator_is_rejected() {
    let chassis = Chassis::new(ChassisConfig::default().without_bootstrap_services()).unwrap();
    assert!(chassis.loader.load(&["not-a-urn".to_string()]).is_err());
}

#[test]
fn acquire_related_rejects_a_fully_qualified_name() {
    let mem = MemScheme::new().register("a", |_| ComponentDescriptor::new("a").provides("foo.a", Arc::new(1u32)));
    let chassis = chassis_with_mem(mem);
    chassis.loader.load(&["mem://a".to_string()]).unwrap();

    let foo = chassis.registry.acquire("foo").unwrap();
    assert!(chassis.registry.acquire_related("foo.a", &foo).is_err());
    chassis.registry.release(&foo).unwrap();
}

#[test]
fn duplicate_urn_within_a_batch_is_rejected() {
    let mem = MemScheme::new().register("a", |_| ComponentDescriptor::new("a").provides("foo.a", Arc::new(1u32)));
    let chassis = chassis_with_mem(mem);

    assert!(chassis
        .loader
        .load(&["mem://a".to_string(), "mem://a".to_string()])
        .is_err());
}

#[test]
fn registering_the_same_full_name_twice_fails_without_corrupting_the_registry() {
    let chassis = Chassis::new(ChassisConfig::default().without_bootstrap_services()).unwrap();
    chassis.registry.register_service("foo.a", Arc::new(1u32)).unwrap();
    assert!(chassis.registry.register_service("foo.a", Arc::new(2u32)).is_err());
    assert!(chassis.registry.contains("foo.a"));
    assert_eq!(chassis.registry.len(), 2); // "foo.a" and the bare default "foo"
}
