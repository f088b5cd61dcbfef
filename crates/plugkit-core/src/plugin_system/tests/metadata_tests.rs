use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::metadata::PluginMetadata;

#[test]
fn parse_full_descriptor() {
    let metadata = PluginMetadata::parse(
        "Chihuahua",
        r#"
name = "Chihuahua"
depends = ["Dog"]
provides = ["SmallDog", "YippyDog"]

description = "A vicious dog plugin"
"#,
    )
    .unwrap();

    assert_eq!(metadata.name(), "Chihuahua");
    assert_eq!(metadata.depends(), ["Dog"]);
    assert_eq!(metadata.provides(), ["SmallDog", "YippyDog"]);
    assert!(metadata.used_by().is_empty());
    assert_eq!(metadata.value("description"), Some("A vicious dog plugin"));
    assert_eq!(metadata.value("nonexistent"), None);
}

#[test]
fn parse_empty_descriptor() {
    let metadata = PluginMetadata::parse("Plain", "").unwrap();
    assert_eq!(metadata.name(), "Plain");
    assert!(metadata.depends().is_empty());
    assert!(metadata.provides().is_empty());
    assert!(metadata.extra().is_empty());
}

#[test]
fn parse_drops_self_alias() {
    let metadata =
        PluginMetadata::parse("Narcissus", "provides = [\"Narcissus\", \"Flower\"]\n").unwrap();
    assert_eq!(metadata.provides(), ["Flower"]);
}

#[test]
fn parse_keeps_registered_name_on_mismatch() {
    // The filename-derived name is authoritative.
    let metadata = PluginMetadata::parse("Actual", "name = \"Pretender\"\n").unwrap();
    assert_eq!(metadata.name(), "Actual");
}

#[test]
fn parse_rejects_malformed_descriptor() {
    let result = PluginMetadata::parse("Garbled", "depends = [unclosed\n");
    assert!(matches!(
        result,
        Err(PluginSystemError::DescriptorParse { .. })
    ));
}

#[test]
fn from_file_reports_missing_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let result = PluginMetadata::from_file("Ghost", &dir.path().join("Ghost.conf"));
    assert!(matches!(result, Err(PluginSystemError::DescriptorIo { .. })));
}
