//! AWS Cloud Control Provider implementation
//!
//! This module contains the main provider implementation that communicates
//! with AWS Cloud Control API to manage resources.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::types::OperationStatus;
use log::{debug, info};
use serde_json::json;
use vela_core::differ::find_changed_attributes;
use vela_core::provider::{ProviderError, ProviderResult};
use vela_core::resource::{Resource, ResourceId, State, Value};

use crate::case_convert::{json_to_value, value_to_json};
use crate::schemas::{AwsccSchemaConfig, Naming, find_config};

/// Attributes whose documents are sent with their keys as written
const VERBATIM_ATTRIBUTES: &[&str] = &["assume_role_policy_document"];

const MAX_POLL_ATTEMPTS: u32 = 120;
const POLL_DELAY: Duration = Duration::from_secs(5);

fn config_for(id: &ResourceId) -> ProviderResult<AwsccSchemaConfig> {
    find_config(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    cloudcontrol_client: CloudControlClient,
    region: String,
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudcontrol_client: CloudControlClient::new(&config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource by identifier using Cloud Control API
    pub async fn cc_get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        let result = self
            .cloudcontrol_client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(response) => {
                if let Some(desc) = response.resource_description()
                    && let Some(props_str) = desc.properties()
                {
                    let props: serde_json::Value = serde_json::from_str(props_str)
                        .map_err(|e| ProviderError::new("Malformed resource properties").with_cause(e))?;
                    Ok(Some(props))
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                let err_str = format!("{:?}", e);
                if err_str.contains("ResourceNotFound") || err_str.contains("NotFound") {
                    debug!("{} {} not found", type_name, identifier);
                    Ok(None)
                } else {
                    Err(ProviderError::new(format!(
                        "Failed to get resource: {:?}",
                        e
                    )))
                }
            }
        }
    }

    /// Create a resource using Cloud Control API
    pub async fn cc_create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        debug!("Creating {}: {}", type_name, desired_state);
        let result = self
            .cloudcontrol_client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to create resource: {:?}", e)))?;

        let request_token = result
            .progress_event()
            .and_then(|p| p.request_token())
            .ok_or_else(|| ProviderError::new("No request token returned"))?;

        self.wait_for_operation(request_token).await
    }

    /// Update a resource using Cloud Control API
    pub async fn cc_update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }

        let patch_document = serde_json::to_string(&patch_ops)
            .map_err(|e| ProviderError::new(format!("Failed to build patch: {}", e)))?;
        debug!("Updating {} {}: {}", type_name, identifier, patch_document);

        let result = self
            .cloudcontrol_client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to update resource: {:?}", e)))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Delete a resource using Cloud Control API
    pub async fn cc_delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<()> {
        debug!("Deleting {} {}", type_name, identifier);
        let result = self
            .cloudcontrol_client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("Failed to delete resource: {:?}", e)))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Wait for a Cloud Control operation to complete
    async fn wait_for_operation(&self, request_token: &str) -> ProviderResult<String> {
        for attempt in 0..MAX_POLL_ATTEMPTS {
            let status = self
                .cloudcontrol_client
                .get_resource_request_status()
                .request_token(request_token)
                .send()
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to get operation status: {:?}", e))
                })?;

            if let Some(progress) = status.progress_event() {
                match progress.operation_status() {
                    Some(OperationStatus::Success) => {
                        return Ok(progress.identifier().unwrap_or("").to_string());
                    }
                    Some(OperationStatus::Failed) => {
                        let msg = progress.status_message().unwrap_or("Unknown error");
                        return Err(ProviderError::new(format!("Operation failed: {}", msg)));
                    }
                    Some(OperationStatus::CancelComplete) => {
                        return Err(ProviderError::new("Operation was cancelled"));
                    }
                    other => {
                        debug!(
                            "Operation {} is {:?} (attempt {})",
                            request_token,
                            other,
                            attempt + 1
                        );
                        tokio::time::sleep(POLL_DELAY).await;
                    }
                }
            }
        }

        Err(ProviderError::new("Operation timed out"))
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by the identifier recorded at creation
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let config = config_for(id)?;

        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        let props = match self
            .cc_get_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
        {
            Some(props) => props,
            None => return Ok(State::not_found(id.clone())),
        };

        let attributes = state_attributes(&config, id, &props);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Create a resource using its configuration
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let config = config_for(&resource.id)?;
        let desired = desired_state(&config, &resource)?;

        let identifier = self
            .cc_create_resource(config.aws_type_name, serde_json::Value::Object(desired))
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        info!("Created {} ({})", resource.id, identifier);

        self.read_resource(&resource.id, Some(&identifier)).await
    }

    /// Update a resource in place, patching only the changed attributes
    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let config = config_for(&id)?;

        let changed = find_changed_attributes(&to, from);
        let patch_ops = patch_operations(&config, &changed, &to)?;

        self.cc_update_resource(config.aws_type_name, identifier, patch_ops)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        info!("Updated {} ({})", id, changed.join(", "));

        self.read_resource(&id, Some(identifier)).await
    }

    /// Delete a resource
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let config = config_for(id)?;

        self.cc_delete_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        info!("Deleted {} ({})", id, identifier);
        Ok(())
    }
}

// =============================================================================
// Document Conversion
// =============================================================================

/// Convert one attribute value to its CloudFormation form
fn attribute_json(
    resource_id: &ResourceId,
    name: &str,
    value: &Value,
) -> ProviderResult<serde_json::Value> {
    if VERBATIM_ATTRIBUTES.contains(&name) {
        if !value.is_resolved() {
            return Err(unresolved(resource_id, name));
        }
        return Ok(value.to_json());
    }
    value_to_json(value).ok_or_else(|| unresolved(resource_id, name))
}

fn unresolved(resource_id: &ResourceId, name: &str) -> ProviderError {
    ProviderError::new(format!("Attribute '{}' has an unresolved reference", name))
        .for_resource(resource_id.clone())
}

/// Build the Cloud Control desired state for a resource
pub fn desired_state(
    config: &AwsccSchemaConfig,
    resource: &Resource,
) -> ProviderResult<serde_json::Map<String, serde_json::Value>> {
    let mut desired = serde_json::Map::new();

    // Map DSL attributes to AWS properties using provider_name
    for (dsl_name, attr_schema) in &config.schema.attributes {
        if dsl_name == "tags" || attr_schema.read_only {
            continue;
        }
        if let Some(aws_name) = &attr_schema.provider_name
            && let Some(value) = resource.attributes.get(dsl_name.as_str())
        {
            desired.insert(
                aws_name.to_string(),
                attribute_json(&resource.id, dsl_name, value)?,
            );
        }
    }

    if let Naming::Property(property) = config.naming {
        desired.insert(property.to_string(), json!(resource.id.name));
    }

    if config.has_tags {
        let tags = build_tags(config.naming, &resource.id.name, resource.attributes.get("tags"));
        if !tags.is_empty() {
            desired.insert("Tags".to_string(), json!(tags));
        }
    }

    set_default_values(&resource.id.resource_type, &mut desired);
    Ok(desired)
}

/// Convert Cloud Control properties to DSL attributes
pub fn state_attributes(
    config: &AwsccSchemaConfig,
    id: &ResourceId,
    props: &serde_json::Value,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    attributes.insert("name".to_string(), Value::String(id.name.clone()));

    for (dsl_name, attr_schema) in &config.schema.attributes {
        if dsl_name == "tags" {
            continue;
        }
        if let Some(aws_name) = &attr_schema.provider_name
            && let Some(value) = props.get(aws_name.as_str())
        {
            let value = if VERBATIM_ATTRIBUTES.contains(&dsl_name.as_str()) {
                Value::from_json(value)
            } else {
                json_to_value(value)
            };
            if let Some(v) = value {
                attributes.insert(dsl_name.to_string(), v);
            }
        }
    }

    if config.has_tags
        && let Some(tags_array) = props.get("Tags").and_then(|v| v.as_array())
    {
        let mut tags = parse_tags(tags_array);
        if config.naming == Naming::Tag {
            tags.remove("Name");
        }
        if !tags.is_empty() {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
    }

    attributes
}

/// JSON Patch operations for the attributes that changed
pub fn patch_operations(
    config: &AwsccSchemaConfig,
    changed: &[String],
    to: &Resource,
) -> ProviderResult<Vec<serde_json::Value>> {
    let mut ops = Vec::new();
    for name in changed {
        if name == "tags" || (name == "name" && config.naming == Naming::Tag) {
            if config.has_tags {
                let tags = build_tags(config.naming, &to.id.name, to.attributes.get("tags"));
                ops.push(json!({"op": "replace", "path": "/Tags", "value": tags}));
            }
            continue;
        }
        if name == "name" {
            if let Naming::Property(property) = config.naming {
                ops.push(json!({
                    "op": "replace",
                    "path": format!("/{}", property),
                    "value": to.id.name
                }));
            }
            continue;
        }

        let Some(attr_schema) = config.schema.attributes.get(name) else {
            continue;
        };
        let Some(aws_name) = &attr_schema.provider_name else {
            continue;
        };
        if attr_schema.read_only {
            continue;
        }
        match to.attributes.get(name) {
            Some(value) => ops.push(json!({
                "op": "replace",
                "path": format!("/{}", aws_name),
                "value": attribute_json(&to.id, name, value)?
            })),
            None => ops.push(json!({"op": "remove", "path": format!("/{}", aws_name)})),
        }
    }
    // Tags may be reached through both `tags` and `name`
    ops.dedup();
    Ok(ops)
}

/// Set default values for create
fn set_default_values(
    resource_type: &str,
    desired_state: &mut serde_json::Map<String, serde_json::Value>,
) {
    if resource_type == "ec2_eip" && !desired_state.contains_key("Domain") {
        desired_state.insert("Domain".to_string(), json!("vpc"));
    }
}

// =============================================================================
// Tag Helpers
// =============================================================================

/// Build tags array for CloudFormation format
fn build_tags(naming: Naming, name: &str, user_tags: Option<&Value>) -> Vec<serde_json::Value> {
    let mut tags = Vec::new();
    if naming == Naming::Tag {
        tags.push(json!({"Key": "Name", "Value": name}));
    }
    if let Some(Value::Map(user_tags)) = user_tags {
        let mut keys: Vec<&String> = user_tags.keys().filter(|k| *k != "Name").collect();
        keys.sort();
        for key in keys {
            if let Some(Value::String(v)) = user_tags.get(key) {
                tags.push(json!({"Key": key, "Value": v}));
            }
        }
    }
    tags
}

/// Parse tags from CloudFormation format to map
fn parse_tags(tags_array: &[serde_json::Value]) -> HashMap<String, Value> {
    let mut tags_map = HashMap::new();
    for tag in tags_array {
        if let (Some(key), Some(value)) = (
            tag.get("Key").and_then(|v| v.as_str()),
            tag.get("Value").and_then(|v| v.as_str()),
        ) {
            tags_map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    tags_map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(resource_type: &str, name: &str) -> Resource {
        Resource::new(resource_type, name).with_attribute("name", Value::String(name.to_string()))
    }

    fn config(resource_type: &str) -> AwsccSchemaConfig {
        find_config(resource_type).unwrap()
    }

    #[test]
    fn name_is_sent_as_naming_property() {
        let cluster = resource("ecs_cluster", "my-cluster");
        let desired = desired_state(&config("ecs_cluster"), &cluster).unwrap();
        assert_eq!(desired.get("ClusterName"), Some(&json!("my-cluster")));
        assert!(!desired.contains_key("Name"));
    }

    #[test]
    fn name_is_sent_as_tag_for_ec2() {
        let vpc = resource("ec2_vpc", "my-vpc")
            .with_attribute("cidr_block", Value::String("10.0.0.0/16".to_string()));
        let desired = desired_state(&config("ec2_vpc"), &vpc).unwrap();
        assert_eq!(desired.get("CidrBlock"), Some(&json!("10.0.0.0/16")));
        assert_eq!(
            desired.get("Tags"),
            Some(&json!([{"Key": "Name", "Value": "my-vpc"}]))
        );
    }

    #[test]
    fn listener_sends_nested_actions_in_pascal_case() {
        let mut config_map = HashMap::new();
        config_map.insert("status_code".to_string(), Value::String("404".to_string()));
        config_map.insert("message_body".to_string(), Value::String("Not Found".to_string()));
        let mut action = HashMap::new();
        action.insert("type".to_string(), Value::String("fixed-response".to_string()));
        action.insert("fixed_response_config".to_string(), Value::Map(config_map));

        let listener = resource("elbv2_listener", "prod")
            .with_attribute("load_balancer_arn", Value::String("arn:lb".to_string()))
            .with_attribute("port", Value::Int(80))
            .with_attribute("default_actions", Value::List(vec![Value::Map(action)]));
        let desired = desired_state(&config("elbv2_listener"), &listener).unwrap();
        assert_eq!(desired.get("Port"), Some(&json!(80)));
        assert_eq!(
            desired.get("DefaultActions"),
            Some(&json!([{
                "Type": "fixed-response",
                "FixedResponseConfig": {"StatusCode": "404", "MessageBody": "Not Found"}
            }]))
        );
        // Local name only
        assert!(!desired.contains_key("Name"));
    }

    #[test]
    fn policy_document_keys_are_kept() {
        let mut principal = HashMap::new();
        principal.insert("Service".to_string(), Value::String("codedeploy.amazonaws.com".to_string()));
        let mut document = HashMap::new();
        document.insert("Version".to_string(), Value::String("2012-10-17".to_string()));
        document.insert("Principal".to_string(), Value::Map(principal));

        let role = resource("iam_role", "my-ecs-codedeploy-role")
            .with_attribute("assume_role_policy_document", Value::Map(document));
        let desired = desired_state(&config("iam_role"), &role).unwrap();
        assert_eq!(
            desired.get("AssumeRolePolicyDocument"),
            Some(&json!({"Version": "2012-10-17", "Principal": {"Service": "codedeploy.amazonaws.com"}}))
        );
        assert_eq!(desired.get("RoleName"), Some(&json!("my-ecs-codedeploy-role")));
    }

    #[test]
    fn unresolved_reference_is_an_error() {
        let subnet = resource("ec2_subnet", "public-a").with_attribute(
            "vpc_id",
            Value::ResourceRef("vpc".to_string(), "vpc_id".to_string()),
        );
        assert!(desired_state(&config("ec2_subnet"), &subnet).is_err());
    }

    #[test]
    fn eip_defaults_to_vpc_domain() {
        let eip = resource("ec2_eip", "nat-eip");
        let desired = desired_state(&config("ec2_eip"), &eip).unwrap();
        assert_eq!(desired.get("Domain"), Some(&json!("vpc")));
    }

    #[test]
    fn read_only_attributes_are_never_sent() {
        let tg = resource("elbv2_target_group", "blue-tg")
            .with_attribute("target_group_arn", Value::String("arn:tg".to_string()));
        let desired = desired_state(&config("elbv2_target_group"), &tg).unwrap();
        assert!(!desired.contains_key("TargetGroupArn"));
    }

    #[test]
    fn state_reads_computed_and_nested_attributes() {
        let props = json!({
            "LoadBalancerArn": "arn:lb",
            "DNSName": "my-load-balancer-1.us-east-1.elb.amazonaws.com",
            "Scheme": "internet-facing",
            "Name": "my-load-balancer",
            "Tags": [{"Key": "team", "Value": "web"}]
        });
        let id = ResourceId::new("elbv2_load_balancer", "my-load-balancer");
        let attributes = state_attributes(&config("elbv2_load_balancer"), &id, &props);
        assert_eq!(
            attributes.get("dns_name"),
            Some(&Value::String("my-load-balancer-1.us-east-1.elb.amazonaws.com".to_string()))
        );
        assert_eq!(attributes.get("name"), Some(&Value::String("my-load-balancer".to_string())));
        assert_eq!(
            attributes.get("tags").and_then(|t| t.get("team")),
            Some(&Value::String("web".to_string()))
        );
    }

    #[test]
    fn name_tag_is_not_reported_as_user_tag() {
        let props = json!({
            "VpcId": "vpc-123",
            "Tags": [{"Key": "Name", "Value": "my-vpc"}]
        });
        let id = ResourceId::new("ec2_vpc", "my-vpc");
        let attributes = state_attributes(&config("ec2_vpc"), &id, &props);
        assert!(!attributes.contains_key("tags"));
        assert_eq!(attributes.get("vpc_id"), Some(&Value::String("vpc-123".to_string())));
    }

    #[test]
    fn patch_replaces_changed_and_removes_dropped_attributes() {
        let service = resource("ecs_service", "my-ecs-service").with_attribute("desired_count", Value::Int(2));
        let changed = vec!["desired_count".to_string(), "launch_type".to_string()];
        let ops = patch_operations(&config("ecs_service"), &changed, &service).unwrap();
        assert_eq!(
            ops,
            vec![
                json!({"op": "replace", "path": "/DesiredCount", "value": 2}),
                json!({"op": "remove", "path": "/LaunchType"}),
            ]
        );
    }

    #[test]
    fn patch_rewrites_name_tag_once() {
        let vpc = resource("ec2_vpc", "renamed-vpc");
        let changed = vec!["name".to_string(), "tags".to_string()];
        let ops = patch_operations(&config("ec2_vpc"), &changed, &vpc).unwrap();
        assert_eq!(
            ops,
            vec![json!({"op": "replace", "path": "/Tags", "value": [{"Key": "Name", "Value": "renamed-vpc"}]})]
        );
    }
}
