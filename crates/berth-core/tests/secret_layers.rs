mod support;

use berth_core::catalog::AddonCatalog;
use berth_core::pipeline::Pipeline;
use berth_core::secrets::SecretTier;
use tempfile::TempDir;

const PROJECT: &str = r#"
[project]
name = "shop"

[addons.databases.primary]
type = "postgres"
"#;

#[test]
fn higher_layers_win_key_by_key() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, PROJECT);
    support::write_infrastructure(&ctx, "A = \"1\"\nB = \"2\"\n");
    ctx.generated_store()
        .get_or_generate("B", || "3".to_string())
        .unwrap();
    ctx.generated_store()
        .get_or_generate("C", || "4".to_string())
        .unwrap();
    support::write_override(&ctx, "local.env", "C=5\n");

    let catalog = AddonCatalog::builtin().unwrap();
    let bundle = Pipeline::new(&ctx, &catalog).secret_bundle().unwrap();

    assert_eq!(bundle.value("A"), Some("1"));
    assert_eq!(bundle.value("B"), Some("3"));
    assert_eq!(bundle.value("C"), Some("5"));
    assert_eq!(bundle.entry("A").unwrap().tier, SecretTier::Infrastructure);
    assert_eq!(bundle.entry("B").unwrap().tier, SecretTier::ProjectGenerated);
    assert_eq!(bundle.entry("C").unwrap().tier, SecretTier::Override);
}

#[test]
fn later_override_files_win() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, PROJECT);
    support::write_override(&ctx, "10-team.env", "TOKEN=team\nREGION=eu\n");
    support::write_override(&ctx, "20-local.env", "# mine\nTOKEN=\"local\"\n");

    let catalog = AddonCatalog::builtin().unwrap();
    let bundle = Pipeline::new(&ctx, &catalog).secret_bundle().unwrap();

    assert_eq!(bundle.value("TOKEN"), Some("local"));
    assert_eq!(bundle.value("REGION"), Some("eu"));
}

#[test]
fn generated_secrets_survive_reruns() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, PROJECT);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let doc = pipeline.load().unwrap();

    let first = pipeline.run(&doc).unwrap();
    let second = pipeline.run(&doc).unwrap();

    let password = |output: &berth_core::pipeline::PipelineOutput| {
        output
            .variables
            .iter()
            .find_map(|v| v.get("PRIMARY_POSTGRES_PASSWORD"))
            .unwrap()
            .to_string()
    };
    assert_eq!(password(&first), password(&second));
    assert!(password(&first).len() >= 32);

    let bundle = pipeline.secret_bundle().unwrap();
    let entry = bundle.entry("DATABASES_PRIMARY_POSTGRES_PASSWORD").unwrap();
    assert_eq!(entry.tier, SecretTier::ProjectGenerated);
    assert_eq!(entry.value, password(&first));
}

#[test]
fn override_replaces_generated_value_without_touching_the_store() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, PROJECT);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let doc = pipeline.load().unwrap();

    pipeline.run(&doc).unwrap();
    support::write_override(
        &ctx,
        "prod.env",
        "DATABASES_PRIMARY_POSTGRES_PASSWORD=rotated-by-hand\n",
    );
    let output = pipeline.run(&doc).unwrap();

    let primary = output
        .variables
        .iter()
        .find(|v| v.instance.to_string() == "databases.primary")
        .unwrap();
    assert_eq!(primary.get("PRIMARY_POSTGRES_PASSWORD"), Some("rotated-by-hand"));

    let generated = ctx.generated_store().load_layer().unwrap();
    assert_ne!(
        generated.get("DATABASES_PRIMARY_POSTGRES_PASSWORD"),
        Some("rotated-by-hand")
    );
}

#[test]
fn blank_values_are_kept_but_marked_skip() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, PROJECT);
    support::write_infrastructure(&ctx, "SMTP_PASSWORD = \"\"\nSMTP_HOST = \"mail\"\n");
    support::write_override(&ctx, "local.env", "SENTRY_DSN=   \n");

    let catalog = AddonCatalog::builtin().unwrap();
    let bundle = Pipeline::new(&ctx, &catalog).secret_bundle().unwrap();

    assert!(bundle.entry("SMTP_PASSWORD").unwrap().skip);
    assert!(bundle.entry("SENTRY_DSN").unwrap().skip);
    assert_eq!(bundle.value("SMTP_PASSWORD"), None);
    assert_eq!(bundle.skipped(), vec!["SENTRY_DSN", "SMTP_PASSWORD"]);

    let distributable: Vec<&str> = bundle.distributable().map(|(k, _)| k).collect();
    assert_eq!(distributable, vec!["SMTP_HOST"]);
}
