//! Integration tests for Berth

#[test]
fn test_builtin_catalog_loads() {
    use berth_core::catalog::AddonCatalog;

    let catalog = AddonCatalog::builtin().expect("builtin catalog");
    assert!(catalog.contains("postgres"));
    assert!(catalog.required_infrastructure().count() >= 1);
}

#[test]
fn test_secret_tiers() {
    use berth_core::secrets::SecretTier;

    // Test that tiers rank in override order
    assert!(SecretTier::Infrastructure.rank() < SecretTier::ProjectGenerated.rank());
    assert!(SecretTier::ProjectGenerated.rank() < SecretTier::Override.rank());
}
