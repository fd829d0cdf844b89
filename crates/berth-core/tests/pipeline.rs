mod support;

use std::collections::BTreeSet;

use berth_core::Error;
use berth_core::catalog::AddonCatalog;
use berth_core::lifecycle::InstanceState;
use berth_core::pipeline::Pipeline;
use berth_core::runner::{LabelRouter, ProjectMarker};
use berth_core::types::InstanceRef;
use tempfile::TempDir;

const SHOP: &str = r#"
[project]
name = "shop"

[addons.databases.primary]
type = "postgres"

[addons.caches.main]
type = "redis"

[apps.api]
addons = [
    { addon = "databases.primary", as = "DB" },
    { addon = "caches.main", as = "CACHE" },
]

[apps.worker]
addons = [{ addon = "databases.primary", as = "QUEUE_DB" }]

[apps.reports]
addons = [{ addon = "databases.primary", as = "ANALYTICS", access = "readonly" }]

[runner]
labels = ["linux", "x64"]
"#;

#[test]
fn apps_share_an_instance_under_their_own_aliases() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, SHOP);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let output = pipeline.run(&pipeline.load().unwrap()).unwrap();
    let deployment = &output.deployment;

    let api = deployment.app("api").unwrap();
    let worker = deployment.app("worker").unwrap();
    assert_eq!(api.get("DB_HOST"), Some("shop-databases-primary"));
    assert_eq!(worker.get("QUEUE_DB_HOST"), Some("shop-databases-primary"));
    assert_eq!(api.get("DB_PORT"), Some("5432"));
    assert_eq!(api.get("DB_PASSWORD"), worker.get("QUEUE_DB_PASSWORD"));
    assert!(api.get("CACHE_HOST").is_some());
    assert!(worker.get("DB_HOST").is_none());

    let reports = deployment.app("reports").unwrap();
    assert_eq!(reports.get("ANALYTICS_USER"), Some("app_readonly"));
    assert_ne!(reports.get("ANALYTICS_PASSWORD"), api.get("DB_PASSWORD"));
    assert_eq!(reports.get("ANALYTICS_HOST"), Some("shop-databases-primary"));
}

#[test]
fn redacted_artifact_hides_every_secret() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, SHOP);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let output = pipeline.run(&pipeline.load().unwrap()).unwrap();

    let json = output.deployment.redacted().to_json().unwrap();
    let bundle = pipeline.secret_bundle().unwrap();
    for (_, value) in bundle.distributable() {
        assert!(!json.contains(value));
    }
    assert!(json.contains("shop-databases-primary"));
}

#[test]
fn lifecycle_follows_resolution_and_deployment() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, SHOP);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let output = pipeline.run(&pipeline.load().unwrap()).unwrap();

    let ledger = ctx.lifecycle_ledger();
    let primary = InstanceRef::new("databases", "primary");
    assert_eq!(
        ledger.load().unwrap().state(&primary),
        Some(InstanceState::Resolved)
    );

    ledger.mark_deployed(&output.plan.order()).unwrap();
    assert_eq!(
        ledger.load().unwrap().state(&primary),
        Some(InstanceState::Deployed)
    );

    // Re-resolving a deployed project is allowed
    let rerun = pipeline.run(&pipeline.load().unwrap()).unwrap();
    assert!(rerun.orphans.is_empty());
    assert_eq!(
        ledger.load().unwrap().state(&primary),
        Some(InstanceState::Resolved)
    );
}

#[test]
fn removed_instances_are_reported_until_torn_down() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, SHOP);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let output = pipeline.run(&pipeline.load().unwrap()).unwrap();
    let ledger = ctx.lifecycle_ledger();
    ledger.mark_deployed(&output.plan.order()).unwrap();

    let trimmed = r#"
[project]
name = "shop"

[addons.databases.primary]
type = "postgres"
"#;
    std::fs::write(ctx.project_root().join("berth.toml"), trimmed).unwrap();
    let doc = pipeline.load().unwrap();
    let output = pipeline.run(&doc).unwrap();

    let cache = InstanceRef::new("caches", "main");
    assert_eq!(output.orphans, vec![cache.clone()]);
    assert_eq!(
        ledger.load().unwrap().state(&cache),
        Some(InstanceState::Deployed)
    );

    let configured: BTreeSet<InstanceRef> = output.plan.order().into_iter().collect();
    let err = ledger
        .teardown(&InstanceRef::new("databases", "primary"), &configured)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let generated = ctx.generated_store();
    assert!(generated.load_layer().unwrap().get("CACHES_MAIN_REDIS_PASSWORD").is_some());
    let removed = pipeline.teardown(&doc, &cache).unwrap();
    assert_eq!(removed, vec!["CACHES_MAIN_REDIS_PASSWORD"]);
    assert!(generated.load_layer().unwrap().get("CACHES_MAIN_REDIS_PASSWORD").is_none());
    assert!(
        generated
            .load_layer()
            .unwrap()
            .get("DATABASES_PRIMARY_POSTGRES_PASSWORD")
            .is_some()
    );
    assert_eq!(
        ledger.load().unwrap().state(&cache),
        Some(InstanceState::Removed)
    );
    assert!(pipeline.run(&doc).unwrap().orphans.is_empty());
}

#[test]
fn re_resolving_keeps_deployed_instances_tracked() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, SHOP);
    let catalog = AddonCatalog::builtin().unwrap();
    let pipeline = Pipeline::new(&ctx, &catalog);
    let output = pipeline.run(&pipeline.load().unwrap()).unwrap();
    let ledger = ctx.lifecycle_ledger();
    ledger.mark_deployed(&output.plan.order()).unwrap();

    pipeline.run(&pipeline.load().unwrap()).unwrap();

    let trimmed = "[project]\nname = \"shop\"\n\n[addons.databases.primary]\ntype = \"postgres\"\n";
    std::fs::write(ctx.project_root().join("berth.toml"), trimmed).unwrap();
    let output = pipeline.run(&pipeline.load().unwrap()).unwrap();

    let cache = InstanceRef::new("caches", "main");
    assert_eq!(output.orphans, vec![cache.clone()]);
    let doc = ledger.load().unwrap();
    assert!(doc.instances[&cache].deployed_at.is_some());
}

#[test]
fn runner_labels_and_guard_keep_projects_apart() {
    let temp = TempDir::new().unwrap();
    let ctx = support::project(&temp, SHOP);
    let catalog = AddonCatalog::builtin().unwrap();
    let doc = Pipeline::new(&ctx, &catalog).load().unwrap();

    let router = LabelRouter::from_config(&doc.config).unwrap();
    let host = router.host_labels(&doc.config.project.role).unwrap();
    let job = router.job_labels(&doc.config.project.role).unwrap();
    assert!(host.contains("shop"));
    assert!(host.contains("linux"));
    assert!(job.is_satisfied_by(&host));

    let other = LabelRouter::new("blog", vec!["linux".to_string()]).unwrap();
    let foreign_job = other.job_labels("app").unwrap();
    assert!(!foreign_job.is_satisfied_by(&host));

    let marker = ProjectMarker::new(temp.path().join("etc/berth/project"));
    match marker.verify("shop").unwrap_err() {
        Error::ProjectMismatch { host_project, .. } => {
            assert_eq!(host_project, "(unregistered)")
        }
        other => panic!("Expected ProjectMismatch, got {:?}", other),
    }

    marker.register(&doc.config.project.name, false).unwrap();
    marker.verify("shop").unwrap();

    let err = marker.verify("blog").unwrap_err();
    assert!(!err.is_retryable());
    match err {
        Error::ProjectMismatch {
            job_project,
            host_project,
        } => {
            assert_eq!(job_project, "blog");
            assert_eq!(host_project, "shop");
        }
        other => panic!("Expected ProjectMismatch, got {:?}", other),
    }

    assert!(marker.register("blog", false).is_err());
    marker.register("blog", true).unwrap();
    marker.verify("blog").unwrap();
}
