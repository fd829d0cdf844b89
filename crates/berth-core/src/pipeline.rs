//! End-to-end orchestration of one project
//!
//! catalog -> dependency resolver -> variable resolver -> attachments ->
//! renderer, with lifecycle bookkeeping on the way. Every resolution error
//! aborts before rendering, and distribution only starts after a successful
//! resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::attach::{AttachmentResolver, readonly_instances};
use crate::catalog::AddonCatalog;
use crate::config::{ProjectConfig, ProjectDocument};
use crate::context::AppContext;
use crate::distribute::{
    DistributionReport, Encryptor, PublicKeySource, SecretDistributor, SecretStoreClient,
    TargetBinding,
};
use crate::error::Result;
use crate::instance::instances_from_config;
use crate::lifecycle::InstanceState;
use crate::render::{InstanceRenderer, RenderedDeployment};
use crate::resolve::{DependencyResolver, DeploymentPlan};
use crate::secrets::MergedBundle;
use crate::transport::{AgeCliEncryptor, CommandKeySource, HttpSecretStore};
use crate::types::{InstanceRef, env_token};
use crate::variables::{ResolvedVariables, RuntimeFacts, VariableResolver, substitute};

/// Everything one resolution pass produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub plan: DeploymentPlan,
    pub variables: Vec<ResolvedVariables>,
    pub deployment: RenderedDeployment,
    /// Deployed instances that are no longer planned
    pub orphans: Vec<InstanceRef>,
}

pub struct Pipeline<'a> {
    ctx: &'a AppContext,
    catalog: &'a AddonCatalog,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a AppContext, catalog: &'a AddonCatalog) -> Self {
        Self { ctx, catalog }
    }

    /// Load berth.toml
    pub fn load(&self) -> Result<ProjectDocument> {
        self.ctx.config_store().load()
    }

    /// Dependency resolution only
    pub fn plan(&self, config: &ProjectConfig) -> Result<DeploymentPlan> {
        DependencyResolver::new(self.catalog).resolve(instances_from_config(config))
    }

    /// Resolve, wire and render the project
    pub fn run(&self, doc: &ProjectDocument) -> Result<PipelineOutput> {
        let config = &doc.config;
        let plan = self.plan(config)?;
        let ledger = self.ctx.lifecycle_ledger();
        ledger.advance_plan(&plan, InstanceState::Resolving)?;

        let resolved = self.resolve_variables(doc, &plan).and_then(|variables| {
            let apps = AttachmentResolver::new(&variables).resolve_all(&config.apps)?;
            Ok((variables, apps))
        });
        let (variables, apps) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                if let Err(ledger_err) = ledger.advance_plan(&plan, InstanceState::Declared) {
                    warn!(error = %ledger_err, "Failed to reset instance states");
                }
                return Err(err);
            }
        };
        ledger.advance_plan(&plan, InstanceState::Resolved)?;

        let deployment =
            InstanceRenderer::new(&config.project.name, self.catalog).render(&plan, &variables, apps)?;

        let planned: BTreeSet<InstanceRef> = plan.order().into_iter().collect();
        let orphans = ledger.orphans(&planned)?;

        Ok(PipelineOutput {
            plan,
            variables,
            deployment,
            orphans,
        })
    }

    /// Tear down an instance that is no longer configured and drop the
    /// secrets generated for it; returns the removed secret keys
    pub fn teardown(&self, doc: &ProjectDocument, key: &InstanceRef) -> Result<Vec<String>> {
        let configured: BTreeSet<InstanceRef> =
            self.plan(&doc.config)?.order().into_iter().collect();
        let ledger = self.ctx.lifecycle_ledger();
        let addon_type = ledger
            .load()?
            .instances
            .get(key)
            .map(|record| record.addon_type.clone());
        ledger.teardown(key, &configured)?;

        let definition = addon_type.and_then(|t| self.catalog.get(&t, &key.to_string()).ok());
        let Some(definition) = definition else {
            warn!(instance = %key, "Addon type unknown; generated secrets left in place");
            return Ok(Vec::new());
        };

        let store = self.ctx.generated_store();
        let mut removed = Vec::new();
        for spec in definition
            .variables
            .iter()
            .chain(definition.readonly_variables.iter())
            .filter(|spec| spec.generate)
        {
            let Some(template) = spec.secret_key.as_deref() else {
                continue;
            };
            let secret_key = substitute(template, key);
            if store.remove(&secret_key)? {
                removed.push(secret_key);
            }
        }
        info!(instance = %key, secrets = removed.len(), "Removed generated secrets");
        Ok(removed)
    }

    /// Merged secret bundle as currently on disk
    pub fn secret_bundle(&self) -> Result<MergedBundle> {
        Ok(self.ctx.secret_sources().load_stack()?.merged())
    }

    /// Resolve the project (generating missing secrets), then distribute
    pub async fn distribute(
        &self,
        doc: &ProjectDocument,
        distributor: &SecretDistributor,
        bindings: &[TargetBinding],
        cancel: &CancellationToken,
    ) -> Result<DistributionReport> {
        self.run(doc)?;
        let bundle = self.secret_bundle()?;
        info!(keys = bundle.len(), targets = bindings.len(), "Distributing secrets");
        distributor.distribute(bindings, &bundle, cancel).await
    }

    fn resolve_variables(
        &self,
        doc: &ProjectDocument,
        plan: &DeploymentPlan,
    ) -> Result<Vec<ResolvedVariables>> {
        let bundle = self.secret_bundle()?;
        let facts = RuntimeFacts::new(doc.config.project.name.clone());
        let generated = self.ctx.generated_store();
        VariableResolver::new(&doc.tree, &bundle, &facts, &generated)
            .with_readonly(readonly_instances(&doc.config.apps))
            .resolve_plan(plan, self.catalog)
    }
}

/// Distributor wired to the `age` CLI and the configured key command
pub fn default_distributor(ctx: &AppContext, config: &ProjectConfig) -> Result<SecretDistributor> {
    let encryptor: Arc<dyn Encryptor> = Arc::new(AgeCliEncryptor::default());
    let mut distributor = SecretDistributor::new(encryptor, ctx.distribution_ledger());
    if let Some(key) = &config.distribution.public_key {
        let source: Arc<dyn PublicKeySource> = Arc::new(CommandKeySource::new(key.command.clone())?);
        distributor = distributor.with_key_source(source);
    }
    Ok(distributor)
}

/// Environment variable holding the bearer token of a target
pub fn token_env_var(target_name: &str) -> String {
    format!("BERTH_TOKEN_{}", env_token(target_name))
}

/// HTTP bindings for every configured target
pub fn http_bindings(config: &ProjectConfig) -> Result<Vec<TargetBinding>> {
    config
        .distribution
        .targets
        .iter()
        .map(|target| {
            let token = std::env::var(token_env_var(&target.name)).ok();
            let mut store = HttpSecretStore::for_target(target)?.with_token(token);
            if let Some(parallelism) = target.parallelism {
                store = store.with_parallelism(parallelism);
            }
            let client: Arc<dyn SecretStoreClient> = Arc::new(store);
            Ok(TargetBinding::new(target.clone(), client))
        })
        .collect()
}
