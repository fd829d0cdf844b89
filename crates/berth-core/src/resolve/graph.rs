//! Dependency resolution for addon instances
//!
//! Validates the requested instance set against the catalog, expands
//! required addon types, rejects conflicts and cycles, and computes a
//! deterministic deployment order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::catalog::{AddonCatalog, AddonDefinition};
use crate::error::{Error, Result};
use crate::instance::{AddonInstance, InstanceOrigin};
use crate::types::InstanceRef;

use super::plan::{DeploymentPlan, PlannedInstance};

/// Resolves a requested instance set into a [`DeploymentPlan`]
#[derive(Debug, Clone)]
pub struct DependencyResolver<'a> {
    catalog: &'a AddonCatalog,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a AddonCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve the requested instances.
    ///
    /// Required infrastructure is always added. Nothing is returned unless
    /// every check passes.
    pub fn resolve(&self, requested: Vec<AddonInstance>) -> Result<DeploymentPlan> {
        let mut instances = self.index_requested(requested)?;
        self.include_infrastructure(&mut instances)?;
        self.expand_requirements(&mut instances)?;
        self.check_single_instance(&instances)?;

        let dependencies = self.dependency_edges(&instances)?;
        let order = topological_order(&dependencies)?;
        self.check_conflicts(&instances)?;

        let mut entries = Vec::with_capacity(order.len());
        for key in order {
            let deps = dependencies
                .get(&key)
                .map(|d| d.iter().cloned().collect())
                .unwrap_or_default();
            if let Some(instance) = instances.remove(&key) {
                entries.push(PlannedInstance {
                    instance,
                    dependencies: deps,
                });
            }
        }

        info!(instances = entries.len(), "Computed deployment plan");
        Ok(DeploymentPlan::new(entries))
    }

    fn index_requested(
        &self,
        requested: Vec<AddonInstance>,
    ) -> Result<BTreeMap<InstanceRef, AddonInstance>> {
        let mut instances = BTreeMap::new();
        for mut instance in requested {
            let key = instance.key.to_string();
            let def = self.catalog.get(&instance.addon_type, &key)?;
            if def.plan(instance.plan_name()).is_none() {
                return Err(Error::validation(format!(
                    "addon instance '{}' uses unknown plan '{}' (available: {})",
                    key,
                    instance.plan_name(),
                    def.plans.keys().cloned().collect::<Vec<_>>().join(", ")
                )));
            }
            if instance.version.is_none() {
                instance.version = def.default_version.clone();
            }
            if instances.contains_key(&instance.key) {
                return Err(Error::DuplicateInstance(key));
            }
            instances.insert(instance.key.clone(), instance);
        }
        Ok(instances)
    }

    fn include_infrastructure(
        &self,
        instances: &mut BTreeMap<InstanceRef, AddonInstance>,
    ) -> Result<()> {
        for def in self.catalog.required_infrastructure() {
            if instances.values().any(|i| i.addon_type == def.name) {
                continue;
            }
            let instance = auto_instance(def, InstanceOrigin::Infrastructure);
            debug!(instance = %instance.key, "Including required infrastructure");
            insert_auto(instances, instance)?;
        }
        Ok(())
    }

    fn expand_requirements(
        &self,
        instances: &mut BTreeMap<InstanceRef, AddonInstance>,
    ) -> Result<()> {
        let mut pending: Vec<InstanceRef> = instances.keys().rev().cloned().collect();

        while let Some(key) = pending.pop() {
            let Some(instance) = instances.get(&key) else {
                continue;
            };
            let def = self.catalog.get(&instance.addon_type, &key.to_string())?;

            for required in &def.requires {
                if instances.values().any(|i| &i.addon_type == required) {
                    continue;
                }
                let required_def = self.catalog.get(required, &key.to_string())?;
                let added = auto_instance(
                    required_def,
                    InstanceOrigin::Required { by: key.clone() },
                );
                debug!(
                    instance = %added.key,
                    required_by = %key,
                    "Adding required addon"
                );
                pending.push(added.key.clone());
                insert_auto(instances, added)?;
            }
        }
        Ok(())
    }

    fn check_single_instance(&self, instances: &BTreeMap<InstanceRef, AddonInstance>) -> Result<()> {
        let mut by_type: BTreeMap<&str, Vec<&InstanceRef>> = BTreeMap::new();
        for instance in instances.values() {
            by_type
                .entry(instance.addon_type.as_str())
                .or_default()
                .push(&instance.key);
        }
        for (addon_type, keys) in by_type {
            let def = self.catalog.get(addon_type, &keys[0].to_string())?;
            if keys.len() > 1 && !def.multi_instance {
                return Err(Error::validation(format!(
                    "addon type '{}' allows a single instance but {} are declared: {}",
                    addon_type,
                    keys.len(),
                    keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Edges `A -> {B..}`: A requires each B to be deployed first
    fn dependency_edges(
        &self,
        instances: &BTreeMap<InstanceRef, AddonInstance>,
    ) -> Result<BTreeMap<InstanceRef, BTreeSet<InstanceRef>>> {
        let mut edges = BTreeMap::new();
        for (key, instance) in instances {
            let def = self.catalog.get(&instance.addon_type, &key.to_string())?;
            let deps: BTreeSet<InstanceRef> = instances
                .values()
                .filter(|other| def.requires.contains(&other.addon_type))
                .map(|other| other.key.clone())
                .collect();
            edges.insert(key.clone(), deps);
        }
        Ok(edges)
    }

    fn check_conflicts(&self, instances: &BTreeMap<InstanceRef, AddonInstance>) -> Result<()> {
        let all: Vec<&AddonInstance> = instances.values().collect();
        for (i, a) in all.iter().enumerate() {
            let def_a = self.catalog.get(&a.addon_type, &a.key.to_string())?;
            for b in &all[i + 1..] {
                let def_b = self.catalog.get(&b.addon_type, &b.key.to_string())?;
                if def_a.conflicts.contains(&b.addon_type) || def_b.conflicts.contains(&a.addon_type)
                {
                    return Err(Error::Conflict {
                        first: a.key.to_string(),
                        second: b.key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn auto_instance(def: &AddonDefinition, origin: InstanceOrigin) -> AddonInstance {
    AddonInstance {
        key: InstanceRef::new(&def.category, &def.name),
        addon_type: def.name.clone(),
        version: def.default_version.clone(),
        plan: None,
        options: toml::Table::new(),
        origin,
    }
}

fn insert_auto(
    instances: &mut BTreeMap<InstanceRef, AddonInstance>,
    instance: AddonInstance,
) -> Result<()> {
    if let Some(existing) = instances.get(&instance.key) {
        return Err(Error::validation(format!(
            "cannot add required addon '{}' as '{}': that name is already used by a '{}' instance",
            instance.addon_type, instance.key, existing.addon_type
        )));
    }
    instances.insert(instance.key.clone(), instance);
    Ok(())
}

/// Kahn's algorithm over `node -> dependencies`.
///
/// Ready nodes are taken in lexical order so equal inputs always produce
/// the same sequence.
fn topological_order(
    dependencies: &BTreeMap<InstanceRef, BTreeSet<InstanceRef>>,
) -> Result<Vec<InstanceRef>> {
    let mut remaining: BTreeMap<&InstanceRef, BTreeSet<&InstanceRef>> = dependencies
        .iter()
        .map(|(node, deps)| (node, deps.iter().collect()))
        .collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(node, _)| *node);

        let Some(node) = ready else {
            return Err(Error::CyclicDependency {
                members: find_cycle(&remaining),
            });
        };

        remaining.remove(node);
        for deps in remaining.values_mut() {
            deps.remove(node);
        }
        order.push(node.clone());
    }

    Ok(order)
}

/// Every remaining node has at least one unplaced dependency, so following
/// the smallest dependency from any node must revisit a node.
fn find_cycle(remaining: &BTreeMap<&InstanceRef, BTreeSet<&InstanceRef>>) -> Vec<String> {
    let Some(&start) = remaining.keys().next() else {
        return Vec::new();
    };
    let mut path: Vec<&InstanceRef> = vec![start];
    let mut current = start;

    loop {
        let next = remaining
            .get(current)
            .and_then(|deps| deps.iter().next())
            .copied();
        let Some(next) = next else {
            return path.iter().map(|n| n.to_string()).collect();
        };
        if let Some(pos) = path.iter().position(|n| *n == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_definition;

    fn def(name: &str, category: &str, requires: &[&str], conflicts: &[&str]) -> AddonDefinition {
        let mut d = parse_definition(&format!(
            "name = \"{}\"\ncategory = \"{}\"\nmulti_instance = true\n[plans.default]\ncpus = \"1\"\nmemory = \"1g\"\n",
            name, category
        ))
        .unwrap();
        d.requires = requires.iter().map(|s| s.to_string()).collect();
        d.conflicts = conflicts.iter().map(|s| s.to_string()).collect();
        d
    }

    fn inst(key: &str, addon_type: &str) -> AddonInstance {
        AddonInstance::declared(key.parse().unwrap(), addon_type)
    }

    fn keys(plan: &DeploymentPlan) -> Vec<String> {
        plan.order().iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn independent_instances_are_lexically_ordered() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("redis", "caches", &[], &[]),
            def("postgres", "databases", &[], &[]),
        ])
        .unwrap();
        let plan = DependencyResolver::new(&catalog)
            .resolve(vec![
                inst("databases.primary", "postgres"),
                inst("caches.sessions", "redis"),
                inst("caches.pages", "redis"),
            ])
            .unwrap();
        assert_eq!(
            keys(&plan),
            vec!["caches.pages", "caches.sessions", "databases.primary"]
        );
    }

    #[test]
    fn dependencies_come_first() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("postgres", "databases", &[], &[]),
            def("pooler", "aaa", &["postgres"], &[]),
        ])
        .unwrap();
        let plan = DependencyResolver::new(&catalog)
            .resolve(vec![
                inst("aaa.pool", "pooler"),
                inst("databases.primary", "postgres"),
            ])
            .unwrap();
        assert_eq!(keys(&plan), vec!["databases.primary", "aaa.pool"]);
        assert_eq!(
            plan.entries()[1].dependencies,
            vec![InstanceRef::new("databases", "primary")]
        );
    }

    #[test]
    fn missing_requirement_is_auto_added() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("postgres", "databases", &[], &[]),
            def("pooler", "proxies", &["postgres"], &[]),
        ])
        .unwrap();
        let plan = DependencyResolver::new(&catalog)
            .resolve(vec![inst("proxies.pool", "pooler")])
            .unwrap();
        assert_eq!(keys(&plan), vec!["databases.postgres", "proxies.pool"]);
        assert_eq!(
            plan.entries()[0].instance.origin,
            InstanceOrigin::Required {
                by: InstanceRef::new("proxies", "pool")
            }
        );
    }

    #[test]
    fn requirements_expand_recursively() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("a", "x", &["b"], &[]),
            def("b", "x", &["c"], &[]),
            def("c", "x", &[], &[]),
        ])
        .unwrap();
        let plan = DependencyResolver::new(&catalog)
            .resolve(vec![inst("x.top", "a")])
            .unwrap();
        assert_eq!(keys(&plan), vec!["x.c", "x.b", "x.top"]);
    }

    #[test]
    fn cycle_is_rejected_with_members() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("a", "x", &["b"], &[]),
            def("b", "x", &["a"], &[]),
        ])
        .unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("x.one", "a"), inst("x.two", "b")])
            .unwrap_err();
        match err {
            Error::CyclicDependency { members } => {
                assert!(members.contains(&"x.one".to_string()));
                assert!(members.contains(&"x.two".to_string()));
                assert_eq!(members.first(), members.last());
            }
            other => panic!("Expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn conflict_is_rejected_naming_both() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("mysql", "databases", &[], &["postgres"]),
            def("postgres", "databases", &[], &[]),
        ])
        .unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("databases.a", "mysql"), inst("databases.b", "postgres")])
            .unwrap_err();
        match err {
            Error::Conflict { first, second } => {
                assert_eq!(first, "databases.a");
                assert_eq!(second, "databases.b");
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn conflict_introduced_by_expansion_fails() {
        let catalog = AddonCatalog::from_definitions(vec![
            def("mysql", "databases", &[], &["postgres"]),
            def("postgres", "databases", &[], &[]),
            def("pooler", "proxies", &["postgres"], &[]),
        ])
        .unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("databases.main", "mysql"), inst("proxies.pool", "pooler")])
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn duplicate_instance_is_rejected() {
        let catalog =
            AddonCatalog::from_definitions(vec![def("redis", "caches", &[], &[])]).unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("caches.main", "redis"), inst("caches.main", "redis")])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateInstance(ref k) if k == "caches.main"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let catalog =
            AddonCatalog::from_definitions(vec![def("redis", "caches", &[], &[])]).unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("databases.main", "oracle")])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAddon { .. }));
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let catalog =
            AddonCatalog::from_definitions(vec![def("redis", "caches", &[], &[])]).unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("caches.main", "redis").with_plan("huge")])
            .unwrap_err();
        assert!(err.to_string().contains("huge"));
    }

    #[test]
    fn single_instance_type_declared_twice_fails() {
        let mut proxy = def("traefik", "proxies", &[], &[]);
        proxy.multi_instance = false;
        let catalog = AddonCatalog::from_definitions(vec![proxy]).unwrap();
        let err = DependencyResolver::new(&catalog)
            .resolve(vec![inst("proxies.a", "traefik"), inst("proxies.b", "traefik")])
            .unwrap_err();
        assert!(err.to_string().contains("single instance"));
    }

    #[test]
    fn required_infrastructure_is_force_included() {
        let mut git = def("forgejo", "infrastructure", &[], &[]);
        git.required_infrastructure = true;
        git.multi_instance = false;
        let catalog =
            AddonCatalog::from_definitions(vec![git, def("redis", "caches", &[], &[])]).unwrap();
        let plan = DependencyResolver::new(&catalog)
            .resolve(vec![inst("caches.main", "redis")])
            .unwrap();
        let forgejo = plan
            .get(&InstanceRef::new("infrastructure", "forgejo"))
            .unwrap();
        assert_eq!(forgejo.origin, InstanceOrigin::Infrastructure);
    }

    #[test]
    fn declared_infrastructure_is_not_duplicated() {
        let mut git = def("forgejo", "infrastructure", &[], &[]);
        git.required_infrastructure = true;
        git.multi_instance = false;
        let catalog = AddonCatalog::from_definitions(vec![git]).unwrap();
        let plan = DependencyResolver::new(&catalog)
            .resolve(vec![inst("infrastructure.git", "forgejo")])
            .unwrap();
        assert_eq!(keys(&plan), vec!["infrastructure.git"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let catalog = AddonCatalog::builtin().unwrap();
        let request = || {
            vec![
                inst("queues.jobs", "rabbitmq"),
                inst("proxies.pool", "pgbouncer"),
                inst("caches.sessions", "redis"),
            ]
        };
        let first = DependencyResolver::new(&catalog).resolve(request()).unwrap();
        let second = DependencyResolver::new(&catalog).resolve(request()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            keys(&first),
            vec![
                "caches.sessions",
                "databases.postgres",
                "infrastructure.forgejo",
                "proxies.pool",
                "queues.jobs"
            ]
        );
    }
}
