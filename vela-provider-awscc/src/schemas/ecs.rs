//! ECS schemas: AWS::ECS::*

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, Naming, computed, name_attribute, property, tags_attribute};

/// Returns the schema config for ecs_cluster (AWS::ECS::Cluster)
pub fn ecs_cluster_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::Cluster",
        has_tags: true,
        naming: Naming::Property("ClusterName"),
        schema: ResourceSchema::new("ecs_cluster")
            .attribute(name_attribute())
            .attribute(tags_attribute())
            .attribute(computed("arn", "Arn")),
    }
}

/// Returns the schema config for ecs_task_definition (AWS::ECS::TaskDefinition)
pub fn ecs_task_definition_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::TaskDefinition",
        has_tags: true,
        naming: Naming::Property("Family"),
        schema: ResourceSchema::new("ecs_task_definition")
            .with_description("A task definition family; `name` is the family")
            .attribute(name_attribute())
            .attribute(property("cpu", AttributeType::String, "Cpu"))
            .attribute(property("memory", AttributeType::String, "Memory"))
            .attribute(property(
                "network_mode",
                types::one_of(&["bridge", "host", "awsvpc", "none"]),
                "NetworkMode",
            ))
            .attribute(property(
                "requires_compatibilities",
                AttributeType::List(Box::new(types::one_of(&["EC2", "FARGATE", "EXTERNAL"]))),
                "RequiresCompatibilities",
            ))
            .attribute(property("execution_role_arn", AttributeType::String, "ExecutionRoleArn"))
            .attribute(property("task_role_arn", AttributeType::String, "TaskRoleArn"))
            .attribute(
                property(
                    "container_definitions",
                    AttributeType::List(Box::new(AttributeType::Any)),
                    "ContainerDefinitions",
                )
                .required(),
            )
            .attribute(tags_attribute())
            .attribute(computed("task_definition_arn", "TaskDefinitionArn")),
    }
}

/// Returns the schema config for ecs_service (AWS::ECS::Service)
pub fn ecs_service_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ECS::Service",
        has_tags: true,
        naming: Naming::Property("ServiceName"),
        schema: ResourceSchema::new("ecs_service")
            .attribute(name_attribute())
            .attribute(property("cluster", AttributeType::String, "Cluster"))
            .attribute(property("task_definition", AttributeType::String, "TaskDefinition"))
            .attribute(property("desired_count", AttributeType::Int, "DesiredCount"))
            .attribute(property(
                "launch_type",
                types::one_of(&["EC2", "FARGATE", "EXTERNAL"]),
                "LaunchType",
            ))
            .attribute(
                property("deployment_controller", AttributeType::Any, "DeploymentController")
                    .with_description("`{ type = \"CODE_DEPLOY\" }` hands deployments to CodeDeploy"),
            )
            .attribute(property(
                "network_configuration",
                AttributeType::Any,
                "NetworkConfiguration",
            ))
            .attribute(property(
                "load_balancers",
                AttributeType::List(Box::new(AttributeType::Any)),
                "LoadBalancers",
            ))
            .attribute(tags_attribute())
            .attribute(computed("service_arn", "ServiceArn")),
    }
}
