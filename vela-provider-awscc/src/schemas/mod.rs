//! AWS Cloud Control resource schema definitions
//!
//! One config per DSL resource type, pairing the attribute schema with the
//! CloudFormation type it is managed as.

pub mod cloudwatch;
pub mod codedeploy;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod network;

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// How the DSL `name` attribute reaches AWS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// Sent as this CloudFormation property (e.g., "ClusterName")
    Property(&'static str),
    /// Sent as a `Name` tag
    Tag,
    /// Only identifies the resource within the descriptor
    Local,
}

/// AWS Cloud Control schema configuration
pub struct AwsccSchemaConfig {
    /// AWS CloudFormation type name (e.g., "AWS::ECS::Service")
    pub aws_type_name: &'static str,
    /// Whether this resource type uses tags
    pub has_tags: bool,
    pub naming: Naming,
    /// The resource schema with attribute definitions
    pub schema: ResourceSchema,
}

/// Attribute mapped to a CloudFormation property
pub(crate) fn property(name: &str, attr_type: AttributeType, provider_name: &str) -> AttributeSchema {
    AttributeSchema::new(name, attr_type).with_provider_name(provider_name)
}

/// String attribute computed by CloudFormation
pub(crate) fn computed(name: &str, provider_name: &str) -> AttributeSchema {
    property(name, AttributeType::String, provider_name)
        .read_only()
        .with_description("(read-only)")
}

/// The identity attribute every resource declares
pub(crate) fn name_attribute() -> AttributeSchema {
    AttributeSchema::new("name", AttributeType::String).required()
}

/// Tags type for AWS resources (Terraform-style map)
pub(crate) fn tags_attribute() -> AttributeSchema {
    property("tags", vela_core::schema::types::tags(), "Tags")
}

/// Returns all schema configs
pub fn configs() -> Vec<AwsccSchemaConfig> {
    vec![
        network::ec2_vpc_config(),
        network::ec2_subnet_config(),
        network::ec2_internet_gateway_config(),
        network::ec2_vpc_gateway_attachment_config(),
        network::ec2_route_table_config(),
        network::ec2_route_config(),
        network::ec2_subnet_route_table_association_config(),
        network::ec2_eip_config(),
        network::ec2_nat_gateway_config(),
        network::ec2_security_group_config(),
        elbv2::elbv2_load_balancer_config(),
        elbv2::elbv2_listener_config(),
        elbv2::elbv2_listener_rule_config(),
        elbv2::elbv2_target_group_config(),
        ecs::ecs_cluster_config(),
        ecs::ecs_task_definition_config(),
        ecs::ecs_service_config(),
        iam::iam_role_config(),
        codedeploy::codedeploy_application_config(),
        codedeploy::codedeploy_deployment_config_config(),
        codedeploy::codedeploy_deployment_group_config(),
        cloudwatch::cloudwatch_alarm_config(),
    ]
}

/// Get the schema config for a DSL resource type (e.g., "ecs_service")
pub fn find_config(resource_type: &str) -> Option<AwsccSchemaConfig> {
    configs()
        .into_iter()
        .find(|c| c.schema.resource_type == resource_type)
}

/// Returns all schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    configs().into_iter().map(|c| c.schema).collect()
}
