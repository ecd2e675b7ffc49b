mod common;

use berth::descriptor::{DescriptorParser, MountType, ResolvedMount, StartupPlan, Validator};
use berth::{BerthError, LoaderOptions, Project};

fn parse(yaml: &str) -> berth::descriptor::Descriptor {
    DescriptorParser::parse_str(yaml, &LoaderOptions::default()).unwrap()
}

#[test]
fn stack_validates() {
    let descriptor = parse(&common::stack_descriptor());

    assert_eq!(
        descriptor.services.keys().collect::<Vec<_>>(),
        vec!["app", "db", "admin"]
    );
    assert_eq!(
        descriptor.volumes.keys().collect::<Vec<_>>(),
        vec!["db", "export", "upload"]
    );

    let warnings = Validator::validate(&descriptor).unwrap();
    assert!(warnings.is_empty(), "{:?}", warnings);
}

#[test]
fn removing_a_mounted_volume_declaration_fails() {
    let yaml = common::stack_descriptor().replace("  upload:\n", "");
    let descriptor = parse(&yaml);
    assert!(!descriptor.volumes.contains_key("upload"));

    match Validator::validate(&descriptor) {
        Err(BerthError::UndeclaredVolume { service, volume }) => {
            assert_eq!(service, "app");
            assert_eq!(volume, "upload");
        }
        other => panic!("expected an undeclared volume error, got {:?}", other),
    }
}

#[test]
fn every_dependency_names_a_declared_service() {
    let descriptor = parse(&common::stack_descriptor());
    for (name, service) in descriptor.services.iter() {
        for dep in service.dependency_names() {
            assert!(descriptor.services.contains_key(dep), "{} -> {}", name, dep);
        }
    }

    let yaml = common::stack_descriptor().replace(
        "      - db\n    ports:\n      - \"8081",
        "      - database\n    ports:\n      - \"8081",
    );
    let broken = parse(&yaml);
    match Validator::validate(&broken) {
        Err(BerthError::UnknownDependency {
            service,
            dependency,
        }) => {
            assert_eq!(service, "admin");
            assert_eq!(dependency, "database");
        }
        other => panic!("expected an unknown dependency error, got {:?}", other),
    }
}

#[test]
fn every_binding_resolves_to_a_declared_volume() {
    let descriptor = parse(&common::stack_descriptor());
    for (name, service) in descriptor.services.iter() {
        for mount in service.volumes.iter().flatten() {
            let resolved = ResolvedMount::resolve(name, mount).unwrap();
            assert_eq!(resolved.mount_type, MountType::Volume);
            let volume = resolved.volume_name().unwrap();
            assert!(descriptor.volumes.contains_key(volume));
        }
    }
}

#[test]
fn duplicate_volume_declaration_fails_to_parse() {
    let yaml = format!("{}  db:\n", common::stack_descriptor());
    let err = DescriptorParser::parse_str(&yaml, &LoaderOptions::default()).unwrap_err();
    assert!(err.to_string().contains("db"), "{}", err);
}

#[test]
fn stack_start_order() {
    let descriptor = parse(&common::stack_descriptor());
    let plan = StartupPlan::new(&descriptor).unwrap();
    assert_eq!(plan.order(), &["db", "app", "admin"]);
    assert_eq!(plan.stages().len(), 2);
}

#[test]
fn stack_env_files_check_out() {
    let options = LoaderOptions::new(&common::stack_dir()).check_env_files(true);
    let project = Project::load(&options, &[]).unwrap();
    assert_eq!(project.name, "stack");
    assert!(project.warnings.is_empty());
}
