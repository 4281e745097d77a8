//! Resource type definitions for AWS Cloud Control
//!
//! Each DSL resource type implements `ResourceType`, exposing the schema
//! defined in `schemas`.

use vela_core::provider::ResourceType;
use vela_core::schema::ResourceSchema;

use crate::schemas::{cloudwatch, codedeploy, ecs, elbv2, iam, network};

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $config:path) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $config().schema
            }
        }
    };
}

define_resource_type!(VpcType, "ec2_vpc", network::ec2_vpc_config);
define_resource_type!(SubnetType, "ec2_subnet", network::ec2_subnet_config);
define_resource_type!(InternetGatewayType, "ec2_internet_gateway", network::ec2_internet_gateway_config);
define_resource_type!(
    VpcGatewayAttachmentType,
    "ec2_vpc_gateway_attachment",
    network::ec2_vpc_gateway_attachment_config
);
define_resource_type!(RouteTableType, "ec2_route_table", network::ec2_route_table_config);
define_resource_type!(RouteType, "ec2_route", network::ec2_route_config);
define_resource_type!(
    RouteTableAssociationType,
    "ec2_subnet_route_table_association",
    network::ec2_subnet_route_table_association_config
);
define_resource_type!(EipType, "ec2_eip", network::ec2_eip_config);
define_resource_type!(NatGatewayType, "ec2_nat_gateway", network::ec2_nat_gateway_config);
define_resource_type!(SecurityGroupType, "ec2_security_group", network::ec2_security_group_config);
define_resource_type!(LoadBalancerType, "elbv2_load_balancer", elbv2::elbv2_load_balancer_config);
define_resource_type!(ListenerType, "elbv2_listener", elbv2::elbv2_listener_config);
define_resource_type!(ListenerRuleType, "elbv2_listener_rule", elbv2::elbv2_listener_rule_config);
define_resource_type!(TargetGroupType, "elbv2_target_group", elbv2::elbv2_target_group_config);
define_resource_type!(ClusterType, "ecs_cluster", ecs::ecs_cluster_config);
define_resource_type!(TaskDefinitionType, "ecs_task_definition", ecs::ecs_task_definition_config);
define_resource_type!(ServiceType, "ecs_service", ecs::ecs_service_config);
define_resource_type!(RoleType, "iam_role", iam::iam_role_config);
define_resource_type!(
    ApplicationType,
    "codedeploy_application",
    codedeploy::codedeploy_application_config
);
define_resource_type!(
    DeploymentConfigType,
    "codedeploy_deployment_config",
    codedeploy::codedeploy_deployment_config_config
);
define_resource_type!(
    DeploymentGroupType,
    "codedeploy_deployment_group",
    codedeploy::codedeploy_deployment_group_config
);
define_resource_type!(AlarmType, "cloudwatch_alarm", cloudwatch::cloudwatch_alarm_config);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(VpcType),
        Box::new(SubnetType),
        Box::new(InternetGatewayType),
        Box::new(VpcGatewayAttachmentType),
        Box::new(RouteTableType),
        Box::new(RouteType),
        Box::new(RouteTableAssociationType),
        Box::new(EipType),
        Box::new(NatGatewayType),
        Box::new(SecurityGroupType),
        Box::new(LoadBalancerType),
        Box::new(ListenerType),
        Box::new(ListenerRuleType),
        Box::new(TargetGroupType),
        Box::new(ClusterType),
        Box::new(TaskDefinitionType),
        Box::new(ServiceType),
        Box::new(RoleType),
        Box::new(ApplicationType),
        Box::new(DeploymentConfigType),
        Box::new(DeploymentGroupType),
        Box::new(AlarmType),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_match_schemas() {
        for resource_type in resource_types() {
            assert_eq!(resource_type.schema().resource_type, resource_type.name());
        }
    }

    #[test]
    fn every_schema_has_a_resource_type() {
        assert_eq!(resource_types().len(), crate::schemas::configs().len());
    }
}
