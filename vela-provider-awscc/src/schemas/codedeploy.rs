//! CodeDeploy schemas: AWS::CodeDeploy::*

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, Naming, name_attribute, property, tags_attribute};

fn compute_platform() -> AttributeType {
    types::one_of(&["ECS", "Lambda", "Server"])
}

/// Returns the schema config for codedeploy_application (AWS::CodeDeploy::Application)
pub fn codedeploy_application_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::CodeDeploy::Application",
        has_tags: true,
        naming: Naming::Property("ApplicationName"),
        schema: ResourceSchema::new("codedeploy_application")
            .attribute(name_attribute())
            .attribute(property("compute_platform", compute_platform(), "ComputePlatform"))
            .attribute(tags_attribute()),
    }
}

/// Returns the schema config for codedeploy_deployment_config
/// (AWS::CodeDeploy::DeploymentConfig)
pub fn codedeploy_deployment_config_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::CodeDeploy::DeploymentConfig",
        has_tags: false,
        naming: Naming::Property("DeploymentConfigName"),
        schema: ResourceSchema::new("codedeploy_deployment_config")
            .attribute(name_attribute())
            .attribute(property("compute_platform", compute_platform(), "ComputePlatform"))
            .attribute(
                property("traffic_routing_config", AttributeType::Any, "TrafficRoutingConfig")
                    .with_description("AllAtOnce, TimeBasedLinear or TimeBasedCanary shifting"),
            ),
    }
}

/// Returns the schema config for codedeploy_deployment_group
/// (AWS::CodeDeploy::DeploymentGroup)
pub fn codedeploy_deployment_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::CodeDeploy::DeploymentGroup",
        has_tags: true,
        naming: Naming::Property("DeploymentGroupName"),
        schema: ResourceSchema::new("codedeploy_deployment_group")
            .attribute(name_attribute())
            .attribute(
                property("application_name", AttributeType::String, "ApplicationName").required(),
            )
            .attribute(
                property("service_role_arn", AttributeType::String, "ServiceRoleArn").required(),
            )
            .attribute(property(
                "deployment_config_name",
                AttributeType::String,
                "DeploymentConfigName",
            ))
            .attribute(property("deployment_style", AttributeType::Any, "DeploymentStyle"))
            .attribute(property(
                "blue_green_deployment_configuration",
                AttributeType::Any,
                "BlueGreenDeploymentConfiguration",
            ))
            .attribute(property(
                "ecs_services",
                AttributeType::List(Box::new(AttributeType::Any)),
                "ECSServices",
            ))
            .attribute(property("load_balancer_info", AttributeType::Any, "LoadBalancerInfo"))
            .attribute(property("alarm_configuration", AttributeType::Any, "AlarmConfiguration"))
            .attribute(property(
                "auto_rollback_configuration",
                AttributeType::Any,
                "AutoRollbackConfiguration",
            ))
            .attribute(tags_attribute()),
    }
}
