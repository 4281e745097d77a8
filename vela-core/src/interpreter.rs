//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//! Each effect is resolved against the bindings right before it runs, so
//! attributes produced by earlier creates (ARNs, IDs) flow into later ones.

use log::{debug, info};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resolver::Bindings;
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Result of executing the entire Plan
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Each executed effect (as resolved) with its outcome
    pub outcomes: Vec<(Effect, Result<EffectOutcome, ProviderError>)>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan, bindings: &mut Bindings) -> ApplyResult {
        self.apply_with_progress(plan, bindings, |_, _| {}).await
    }

    /// Execute a Plan, reporting each outcome as soon as it is known
    pub async fn apply_with_progress<F>(
        &self,
        plan: &Plan,
        bindings: &mut Bindings,
        mut on_outcome: F,
    ) -> ApplyResult
    where
        F: FnMut(&Effect, &Result<EffectOutcome, ProviderError>),
    {
        let mut result = ApplyResult::default();

        for effect in plan.effects() {
            let effect = resolve_effect(effect, bindings);
            debug!("Executing {} {}", effect.kind(), effect.resource_id());
            let outcome = self.execute_effect(&effect).await;

            match &outcome {
                Ok(EffectOutcome::Created { state }) | Ok(EffectOutcome::Updated { state }) => {
                    if let Effect::Create(resource) | Effect::Update { to: resource, .. } = &effect
                    {
                        bindings.record(resource, state);
                    }
                    result.success_count += 1;
                }
                Ok(_) => result.success_count += 1,
                Err(_) => result.failure_count += 1,
            }

            on_outcome(&effect, &outcome);
            let failed = outcome.is_err();
            result.outcomes.push((effect, outcome));

            if failed && !self.config.continue_on_error {
                info!("Stopping after first failure");
                break;
            }
        }

        result
    }

    /// Execute a single Effect
    async fn execute_effect(&self, effect: &Effect) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        match effect {
            Effect::Create(resource) => {
                ensure_resolved(resource)?;
                let state = self.provider.create(resource).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                ensure_resolved(to)?;
                let identifier = from.identifier.as_deref().ok_or_else(|| {
                    ProviderError::new("Cannot update a resource without an identifier")
                        .for_resource(id.clone())
                })?;
                let state = self.provider.update(id, identifier, from, to).await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }
}

fn resolve_effect(effect: &Effect, bindings: &Bindings) -> Effect {
    match effect {
        Effect::Create(resource) => Effect::Create(bindings.resolve_resource(resource)),
        Effect::Update {
            id,
            from,
            to,
            changed_attributes,
        } => Effect::Update {
            id: id.clone(),
            from: from.clone(),
            to: bindings.resolve_resource(to),
            changed_attributes: changed_attributes.clone(),
        },
        Effect::Delete { .. } => effect.clone(),
    }
}

fn ensure_resolved(resource: &Resource) -> ProviderResult<()> {
    for (key, value) in resource.user_attributes() {
        if !value.is_resolved() {
            return Err(ProviderError::new(format!(
                "Attribute '{}' has an unresolved reference{}",
                key,
                describe_ref(value).map(|r| format!(" to {}", r)).unwrap_or_default()
            ))
            .for_resource(resource.id.clone()));
        }
    }
    Ok(())
}

fn describe_ref(value: &Value) -> Option<String> {
    match value {
        Value::ResourceRef(binding, attr) => Some(format!("{}.{}", binding, attr)),
        Value::List(items) => items.iter().find_map(describe_ref),
        Value::Map(map) => map.values().find_map(describe_ref),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::create_plan;
    use crate::provider::BoxFuture;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory provider: stores resources and computes an `arn` attribute
    #[derive(Clone, Default)]
    struct MemoryProvider {
        resources: Arc<Mutex<HashMap<String, State>>>,
        fail_on: Option<&'static str>,
    }

    impl MemoryProvider {
        fn count(&self) -> usize {
            self.resources.lock().unwrap().len()
        }
    }

    impl Provider for MemoryProvider {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn resource_types(&self) -> Vec<Box<dyn crate::provider::ResourceType>> {
            vec![]
        }

        fn read(
            &self,
            id: &ResourceId,
            identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = identifier
                .and_then(|i| self.resources.lock().unwrap().get(i).cloned())
                .unwrap_or_else(|| State::not_found(id.clone()));
            Box::pin(async move { Ok(state) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            if self.fail_on == Some(resource.id.name.as_str()) {
                let err = ProviderError::new("boom").for_resource(resource.id.clone());
                return Box::pin(async move { Err(err) });
            }
            let identifier = format!("arn:{}", resource.id);
            let mut attributes: HashMap<String, Value> = resource
                .user_attributes()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            attributes.insert("arn".to_string(), Value::String(identifier.clone()));
            let state = State::existing(resource.id.clone(), attributes).with_identifier(&identifier);
            self.resources
                .lock()
                .unwrap()
                .insert(identifier, state.clone());
            Box::pin(async move { Ok(state) })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let mut attributes = from.attributes.clone();
            for (k, v) in to.user_attributes() {
                attributes.insert(k.clone(), v.clone());
            }
            let state = State::existing(id.clone(), attributes).with_identifier(identifier);
            self.resources
                .lock()
                .unwrap()
                .insert(identifier.to_string(), state.clone());
            Box::pin(async move { Ok(state) })
        }

        fn delete(&self, _id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            self.resources.lock().unwrap().remove(identifier);
            Box::pin(async { Ok(()) })
        }
    }

    fn s(value: &str) -> Value {
        Value::String(value.to_string())
    }

    fn topology() -> Vec<Resource> {
        vec![
            Resource::new("elbv2_load_balancer", "my-load-balancer")
                .with_attribute("_binding", s("alb"))
                .with_attribute("name", s("my-load-balancer")),
            Resource::new("elbv2_listener", "prod")
                .with_attribute("_binding", s("prod_listener"))
                .with_attribute("name", s("prod"))
                .with_attribute("port", Value::Int(80))
                .with_attribute(
                    "load_balancer_arn",
                    Value::ResourceRef("alb".to_string(), "arn".to_string()),
                ),
        ]
    }

    async fn read_all(
        provider: &MemoryProvider,
        resources: &[Resource],
        identifiers: &HashMap<ResourceId, String>,
    ) -> HashMap<ResourceId, State> {
        let mut states = HashMap::new();
        for r in resources {
            let state = provider
                .read(&r.id, identifiers.get(&r.id).map(String::as_str))
                .await
                .unwrap();
            states.insert(r.id.clone(), state);
        }
        states
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(MemoryProvider::default());
        let result = interpreter.apply(&Plan::new(), &mut Bindings::new()).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn created_attributes_flow_into_later_effects() {
        let provider = MemoryProvider::default();
        let interpreter = Interpreter::new(provider.clone());
        let desired = topology();
        let plan = create_plan(&desired, &HashMap::new(), &[]);
        let mut bindings = Bindings::from_resources(&desired, &HashMap::new());

        let result = interpreter.apply(&plan, &mut bindings).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 2);
        let (listener, _) = &result.outcomes[1];
        match listener {
            Effect::Create(r) => assert_eq!(
                r.attributes["load_balancer_arn"],
                s("arn:elbv2_load_balancer.my-load-balancer")
            ),
            other => panic!("Expected Create, got {:?}", other),
        }
        assert_eq!(provider.count(), 2);
    }

    #[tokio::test]
    async fn reapplying_identical_resources_is_a_no_op() {
        let provider = MemoryProvider::default();
        let interpreter = Interpreter::new(provider.clone());
        let desired = topology();

        let plan = create_plan(&desired, &HashMap::new(), &[]);
        let mut bindings = Bindings::from_resources(&desired, &HashMap::new());
        let result = interpreter.apply(&plan, &mut bindings).await;
        let identifiers: HashMap<ResourceId, String> = result
            .outcomes
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                Ok(EffectOutcome::Created { state }) => {
                    Some((state.id.clone(), state.identifier.clone()?))
                }
                _ => None,
            })
            .collect();

        let states = read_all(&provider, &desired, &identifiers).await;
        let bindings = Bindings::from_resources(&desired, &states);
        let resolved: Vec<Resource> = desired.iter().map(|r| bindings.resolve_resource(r)).collect();
        let recorded: Vec<ResourceId> = desired.iter().map(|r| r.id.clone()).collect();
        let second = create_plan(&resolved, &states, &recorded);

        assert!(second.is_empty(), "unexpected effects: {:?}", second.effects());
    }

    #[tokio::test]
    async fn stops_on_first_failure() {
        let provider = MemoryProvider {
            fail_on: Some("my-load-balancer"),
            ..Default::default()
        };
        let interpreter = Interpreter::new(provider.clone());
        let desired = topology();
        let plan = create_plan(&desired, &HashMap::new(), &[]);
        let mut bindings = Bindings::from_resources(&desired, &HashMap::new());

        let mut seen = Vec::new();
        let result = interpreter
            .apply_with_progress(&plan, &mut bindings, |effect, outcome| {
                seen.push((effect.resource_id().clone(), outcome.is_ok()));
            })
            .await;

        assert!(!result.is_success());
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].1);
        assert_eq!(provider.count(), 0);
    }

    #[tokio::test]
    async fn continue_on_error_reports_unresolved_dependents() {
        let provider = MemoryProvider {
            fail_on: Some("my-load-balancer"),
            ..Default::default()
        };
        let config = InterpreterConfig {
            continue_on_error: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(provider).with_config(config);
        let desired = topology();
        let plan = create_plan(&desired, &HashMap::new(), &[]);
        let mut bindings = Bindings::from_resources(&desired, &HashMap::new());

        let result = interpreter.apply(&plan, &mut bindings).await;

        assert_eq!(result.failure_count, 2);
        let err = result.outcomes[1].1.as_ref().unwrap_err();
        assert!(err.message.contains("alb.arn"), "{}", err);
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let provider = MemoryProvider::default();
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(provider.clone()).with_config(config);
        let plan = create_plan(&topology(), &HashMap::new(), &[]);

        let result = interpreter.apply(&plan, &mut Bindings::new()).await;

        assert!(result.is_success());
        assert!(matches!(
            result.outcomes[0].1,
            Ok(EffectOutcome::Skipped { .. })
        ));
        assert_eq!(provider.count(), 0);
    }

    #[tokio::test]
    async fn update_without_identifier_fails() {
        let interpreter = Interpreter::new(MemoryProvider::default());
        let id = ResourceId::new("ecs_service", "my-ecs-service");
        let mut plan = Plan::new();
        plan.add(Effect::Update {
            id: id.clone(),
            from: State::existing(id.clone(), HashMap::new()),
            to: Resource::new("ecs_service", "my-ecs-service"),
            changed_attributes: vec![],
        });

        let result = interpreter.apply(&plan, &mut Bindings::new()).await;
        assert_eq!(result.failure_count, 1);
    }

    #[tokio::test]
    async fn delete_reports_the_resource() {
        let provider = MemoryProvider::default();
        let interpreter = Interpreter::new(provider.clone());
        let mut bindings = Bindings::new();
        let created = interpreter
            .apply(&create_plan(&topology()[..1], &HashMap::new(), &[]), &mut bindings)
            .await;
        assert_eq!(provider.count(), 1);

        let id = created.outcomes[0].0.resource_id().clone();
        let mut plan = Plan::new();
        plan.add(Effect::Delete {
            id: id.clone(),
            identifier: format!("arn:{}", id),
        });
        let result = interpreter.apply(&plan, &mut bindings).await;
        assert!(matches!(
            &result.outcomes[0].1,
            Ok(EffectOutcome::Deleted { id: deleted }) if *deleted == id
        ));
        assert_eq!(provider.count(), 0);
    }
}
