//! Loading a descriptor and reading the current state of its resources

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::{debug, info};

use vela_core::parser::{self, ParsedFile};
use vela_core::provider::Provider;
use vela_core::resource::{Resource, ResourceId, State};
use vela_core::schema::ResourceSchema;
use vela_core::topology::BlueGreenTopology;
use vela_provider_awscc::{AwsccProvider, normalize_region, schemas};
use vela_state::StateFile;

use crate::file_provider::FileProvider;

/// Region used when the `awscc` provider block names none
pub const DEFAULT_REGION: &str = "us-east-1";

/// A parsed and validated descriptor
pub struct Workspace {
    pub parsed: ParsedFile,
    /// Resources in creation order
    pub resources: Vec<Resource>,
    pub topology: Option<BlueGreenTopology>,
}

impl Workspace {
    /// Parse, validate and order the descriptor at `file`.
    /// Nothing here talks to a provider.
    pub fn load(file: &Path) -> Result<Self> {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        Self::from_source(&content).with_context(|| format!("Invalid descriptor {}", file.display()))
    }

    pub fn from_source(content: &str) -> Result<Self> {
        let parsed = parser::parse_and_resolve(content).context("Parse error")?;

        validate_resources(&parsed.resources)?;

        let resources = parsed
            .dependencies
            .sort_resources(&parsed.resources)
            .context("Dependency error")?;

        let topology =
            BlueGreenTopology::from_resources(&parsed.resources).context("Blue/green topology")?;

        Ok(Self {
            parsed,
            resources,
            topology,
        })
    }

    /// Region of the `awscc` provider block, in AWS form
    pub fn region(&self) -> Option<String> {
        let provider = self.parsed.find_provider("awscc")?;
        let region = provider
            .attributes
            .get("region")
            .and_then(|v| v.as_str())
            .map(normalize_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Some(region)
    }

    /// Cloud Control when an `awscc` provider is configured, the local
    /// file provider otherwise
    pub async fn provider(&self) -> Box<dyn Provider> {
        match self.region() {
            Some(region) => {
                info!("Using awscc provider (region: {})", region);
                Box::new(AwsccProvider::new(&region).await)
            }
            None => {
                info!("Using file provider ({})", FileProvider::DEFAULT_PATH);
                Box::new(FileProvider::new(schema_map()))
            }
        }
    }

    /// Current state of every declared resource and of every resource
    /// recorded in `state`, looked up by its recorded identifier
    pub async fn read_states(
        &self,
        provider: &dyn Provider,
        state: &StateFile,
    ) -> Result<HashMap<ResourceId, State>> {
        let mut ids: Vec<ResourceId> = self.resources.iter().map(|r| r.id.clone()).collect();
        let declared: HashSet<ResourceId> = ids.iter().cloned().collect();
        ids.extend(state.resource_ids().into_iter().filter(|id| !declared.contains(id)));

        let mut states = HashMap::new();
        for id in ids {
            let identifier = state.identifier(&id);
            let current = provider
                .read(&id, identifier)
                .await
                .with_context(|| format!("Failed to read {}", id))?;
            debug!("Read {} (exists: {})", id, current.exists);
            states.insert(id, current);
        }
        Ok(states)
    }
}

/// Schemas of every resource type, keyed by type name
pub fn schema_map() -> HashMap<String, ResourceSchema> {
    schemas::all_schemas()
        .into_iter()
        .map(|schema| (schema.resource_type.clone(), schema))
        .collect()
}

/// Check every resource against its schema, collecting all errors
pub fn validate_resources(resources: &[Resource]) -> Result<()> {
    let schemas = schema_map();
    let mut all_errors = Vec::new();

    for resource in resources {
        match resource.provider() {
            Some("awscc") => {}
            Some(other) => {
                all_errors.push(format!("{}: unknown provider '{}'", resource.id, other));
                continue;
            }
            None => {
                all_errors.push(format!("{}: resource has no provider", resource.id));
                continue;
            }
        }

        let Some(schema) = schemas.get(&resource.id.resource_type) else {
            all_errors.push(format!(
                "{}: unknown resource type 'awscc.{}'",
                resource.id, resource.id.resource_type
            ));
            continue;
        };

        if let Err(errors) = schema.validate(&resource.attributes) {
            for error in errors {
                all_errors.push(format!("{}: {}", resource.id, error));
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        bail!(all_errors.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = include_str!("../../demos/bluegreen/main.vela");

    #[test]
    fn shipped_descriptor_loads() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        assert_eq!(workspace.resources.len(), workspace.parsed.resources.len());
        assert_eq!(workspace.region().as_deref(), Some("us-east-1"));

        let topology = workspace.topology.expect("deployment group is declared");
        assert_eq!(topology.production_weights.blue(), 100);
        assert_eq!(topology.production_weights.green(), 0);
    }

    #[test]
    fn creation_order_puts_dependencies_first() {
        let workspace = Workspace::from_source(DESCRIPTOR).unwrap();
        let position = |resource_type: &str| {
            workspace
                .resources
                .iter()
                .position(|r| r.id.resource_type == resource_type)
                .unwrap()
        };
        assert!(position("ec2_vpc") < position("ec2_subnet"));
        assert!(position("elbv2_load_balancer") < position("elbv2_listener"));
        assert!(position("elbv2_listener") < position("elbv2_listener_rule"));
        assert!(position("ecs_service") < position("codedeploy_deployment_group"));
    }

    #[test]
    fn schema_errors_are_collected() {
        let source = r#"
            let vpc = awscc.ec2_vpc {
                name       = "bad"
                cidr_block = "10.0.0.0/33"
                vpc_id     = "vpc-123"
            }
        "#;
        let err = Workspace::from_source(source).err().unwrap();
        let message = format!("{:#}", err);
        assert!(message.contains("ec2_vpc.bad"), "{}", message);
        assert!(message.contains("read-only"), "{}", message);
    }

    #[test]
    fn unknown_resource_type_is_rejected() {
        let source = r#"
            awscc.lambda_function {
                name = "fn"
            }
        "#;
        let err = Workspace::from_source(source).err().unwrap();
        assert!(format!("{:#}", err).contains("unknown resource type"));
    }

    #[test]
    fn duplicate_rule_priority_is_rejected_before_any_call() {
        let source = DESCRIPTOR.replace(
            "listener_arn = test_listener.listener_arn",
            "listener_arn = prod_listener.listener_arn",
        );
        let err = Workspace::from_source(&source).err().unwrap();
        assert!(format!("{:#}", err).contains("priority 10"), "{:#}", err);
    }

    #[test]
    fn without_provider_block_there_is_no_region() {
        let source = r#"
            awscc.ecs_cluster {
                name = "my-cluster"
            }
        "#;
        let workspace = Workspace::from_source(source).unwrap();
        assert_eq!(workspace.region(), None);
        assert!(workspace.topology.is_none());
    }
}
