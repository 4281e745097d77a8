//! Load balancer schemas: AWS::ElasticLoadBalancingV2::*

use vela_core::resource::Value;
use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, Naming, computed, name_attribute, property, tags_attribute};

/// Listener rule priority (1-50000)
pub fn rule_priority() -> AttributeType {
    AttributeType::Custom {
        name: "RulePriority".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (1..=50000).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("Priority {} is out of range 1-50000", n)),
            _ => Err("Expected integer".to_string()),
        },
    }
}

fn blocks() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::Any))
}

/// Returns the schema config for elbv2_load_balancer
pub fn elbv2_load_balancer_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::LoadBalancer",
        has_tags: true,
        naming: Naming::Property("Name"),
        schema: ResourceSchema::new("elbv2_load_balancer")
            .with_description("An Application, Network or Gateway Load Balancer")
            .attribute(name_attribute())
            .attribute(property(
                "type",
                types::one_of(&["application", "network", "gateway"]),
                "Type",
            ))
            .attribute(property(
                "scheme",
                types::one_of(&["internet-facing", "internal"]),
                "Scheme",
            ))
            .attribute(property("subnets", types::string_list(), "Subnets"))
            .attribute(property("security_groups", types::string_list(), "SecurityGroups"))
            .attribute(property(
                "ip_address_type",
                types::one_of(&["ipv4", "dualstack"]),
                "IpAddressType",
            ))
            .attribute(tags_attribute())
            .attribute(computed("load_balancer_arn", "LoadBalancerArn"))
            .attribute(computed("dns_name", "DNSName"))
            .attribute(computed("load_balancer_full_name", "LoadBalancerFullName"))
            .attribute(computed("load_balancer_name", "LoadBalancerName"))
            .attribute(computed("canonical_hosted_zone_id", "CanonicalHostedZoneID")),
    }
}

/// Returns the schema config for elbv2_listener
pub fn elbv2_listener_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::Listener",
        has_tags: false,
        naming: Naming::Local,
        schema: ResourceSchema::new("elbv2_listener")
            .attribute(name_attribute())
            .attribute(
                property("load_balancer_arn", AttributeType::String, "LoadBalancerArn").required(),
            )
            .attribute(property("port", types::port(), "Port"))
            .attribute(property(
                "protocol",
                types::one_of(&["HTTP", "HTTPS", "TCP", "TLS", "UDP", "TCP_UDP"]),
                "Protocol",
            ))
            .attribute(
                property("default_actions", blocks(), "DefaultActions")
                    .required()
                    .with_description("Action for requests no rule matches"),
            )
            .attribute(computed("listener_arn", "ListenerArn")),
    }
}

/// Returns the schema config for elbv2_listener_rule
pub fn elbv2_listener_rule_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::ListenerRule",
        has_tags: false,
        naming: Naming::Local,
        schema: ResourceSchema::new("elbv2_listener_rule")
            .attribute(name_attribute())
            .attribute(property("listener_arn", AttributeType::String, "ListenerArn").required())
            .attribute(property("priority", rule_priority(), "Priority").required())
            .attribute(property("conditions", blocks(), "Conditions").required())
            .attribute(property("actions", blocks(), "Actions").required())
            .attribute(computed("rule_arn", "RuleArn")),
    }
}

/// Returns the schema config for elbv2_target_group
pub fn elbv2_target_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::ElasticLoadBalancingV2::TargetGroup",
        has_tags: true,
        naming: Naming::Property("Name"),
        schema: ResourceSchema::new("elbv2_target_group")
            .attribute(name_attribute())
            .attribute(property("port", types::port(), "Port"))
            .attribute(property(
                "protocol",
                types::one_of(&["HTTP", "HTTPS", "TCP", "TLS", "UDP", "TCP_UDP", "GENEVE"]),
                "Protocol",
            ))
            .attribute(property(
                "target_type",
                types::one_of(&["instance", "ip", "lambda", "alb"]),
                "TargetType",
            ))
            .attribute(property("vpc_id", AttributeType::String, "VpcId"))
            .attribute(property("health_check_path", AttributeType::String, "HealthCheckPath"))
            .attribute(property(
                "health_check_interval_seconds",
                types::positive_int(),
                "HealthCheckIntervalSeconds",
            ))
            .attribute(tags_attribute())
            .attribute(computed("target_group_arn", "TargetGroupArn"))
            .attribute(computed("target_group_full_name", "TargetGroupFullName")),
    }
}
