//! VPC networking schemas: AWS::EC2::*

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, Naming, computed, name_attribute, property, tags_attribute};

/// Returns the schema config for ec2_vpc (AWS::EC2::VPC)
pub fn ec2_vpc_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPC",
        has_tags: true,
        naming: Naming::Tag,
        schema: ResourceSchema::new("ec2_vpc")
            .with_description("A virtual private cloud")
            .attribute(name_attribute())
            .attribute(
                property("cidr_block", types::cidr(), "CidrBlock")
                    .required()
                    .with_description("The IPv4 network range for the VPC, in CIDR notation"),
            )
            .attribute(property("enable_dns_hostnames", AttributeType::Bool, "EnableDnsHostnames"))
            .attribute(property("enable_dns_support", AttributeType::Bool, "EnableDnsSupport"))
            .attribute(property(
                "instance_tenancy",
                types::one_of(&["default", "dedicated", "host"]),
                "InstanceTenancy",
            ))
            .attribute(tags_attribute())
            .attribute(computed("vpc_id", "VpcId"))
            .attribute(computed("default_security_group", "DefaultSecurityGroup")),
    }
}

/// Returns the schema config for ec2_subnet (AWS::EC2::Subnet)
pub fn ec2_subnet_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Subnet",
        has_tags: true,
        naming: Naming::Tag,
        schema: ResourceSchema::new("ec2_subnet")
            .attribute(name_attribute())
            .attribute(property("vpc_id", AttributeType::String, "VpcId").required())
            .attribute(property("cidr_block", types::cidr(), "CidrBlock").required())
            .attribute(property("availability_zone", AttributeType::String, "AvailabilityZone"))
            .attribute(property(
                "map_public_ip_on_launch",
                AttributeType::Bool,
                "MapPublicIpOnLaunch",
            ))
            .attribute(tags_attribute())
            .attribute(computed("subnet_id", "SubnetId")),
    }
}

/// Returns the schema config for ec2_internet_gateway (AWS::EC2::InternetGateway)
pub fn ec2_internet_gateway_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::InternetGateway",
        has_tags: true,
        naming: Naming::Tag,
        schema: ResourceSchema::new("ec2_internet_gateway")
            .attribute(name_attribute())
            .attribute(tags_attribute())
            .attribute(computed("internet_gateway_id", "InternetGatewayId")),
    }
}

/// Returns the schema config for ec2_vpc_gateway_attachment (AWS::EC2::VPCGatewayAttachment)
pub fn ec2_vpc_gateway_attachment_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::VPCGatewayAttachment",
        has_tags: false,
        naming: Naming::Local,
        schema: ResourceSchema::new("ec2_vpc_gateway_attachment")
            .attribute(name_attribute())
            .attribute(property("vpc_id", AttributeType::String, "VpcId").required())
            .attribute(property(
                "internet_gateway_id",
                AttributeType::String,
                "InternetGatewayId",
            )),
    }
}

/// Returns the schema config for ec2_route_table (AWS::EC2::RouteTable)
pub fn ec2_route_table_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::RouteTable",
        has_tags: true,
        naming: Naming::Tag,
        schema: ResourceSchema::new("ec2_route_table")
            .attribute(name_attribute())
            .attribute(property("vpc_id", AttributeType::String, "VpcId").required())
            .attribute(tags_attribute())
            .attribute(computed("route_table_id", "RouteTableId")),
    }
}

/// Returns the schema config for ec2_route (AWS::EC2::Route)
pub fn ec2_route_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::Route",
        has_tags: false,
        naming: Naming::Local,
        schema: ResourceSchema::new("ec2_route")
            .attribute(name_attribute())
            .attribute(property("route_table_id", AttributeType::String, "RouteTableId").required())
            .attribute(property(
                "destination_cidr_block",
                types::cidr(),
                "DestinationCidrBlock",
            ))
            .attribute(property("gateway_id", AttributeType::String, "GatewayId"))
            .attribute(property("nat_gateway_id", AttributeType::String, "NatGatewayId")),
    }
}

/// Returns the schema config for ec2_subnet_route_table_association
/// (AWS::EC2::SubnetRouteTableAssociation)
pub fn ec2_subnet_route_table_association_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SubnetRouteTableAssociation",
        has_tags: false,
        naming: Naming::Local,
        schema: ResourceSchema::new("ec2_subnet_route_table_association")
            .attribute(name_attribute())
            .attribute(property("subnet_id", AttributeType::String, "SubnetId").required())
            .attribute(property("route_table_id", AttributeType::String, "RouteTableId").required())
            .attribute(computed("id", "Id")),
    }
}

/// Returns the schema config for ec2_eip (AWS::EC2::EIP)
pub fn ec2_eip_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::EIP",
        has_tags: true,
        naming: Naming::Tag,
        schema: ResourceSchema::new("ec2_eip")
            .attribute(name_attribute())
            .attribute(property("domain", types::one_of(&["vpc", "standard"]), "Domain"))
            .attribute(tags_attribute())
            .attribute(computed("allocation_id", "AllocationId"))
            .attribute(computed("public_ip", "PublicIp")),
    }
}

/// Returns the schema config for ec2_nat_gateway (AWS::EC2::NatGateway)
pub fn ec2_nat_gateway_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::NatGateway",
        has_tags: true,
        naming: Naming::Tag,
        schema: ResourceSchema::new("ec2_nat_gateway")
            .attribute(name_attribute())
            .attribute(property("subnet_id", AttributeType::String, "SubnetId").required())
            .attribute(property("allocation_id", AttributeType::String, "AllocationId"))
            .attribute(property(
                "connectivity_type",
                types::one_of(&["public", "private"]),
                "ConnectivityType",
            ))
            .attribute(tags_attribute())
            .attribute(computed("nat_gateway_id", "NatGatewayId")),
    }
}

/// Returns the schema config for ec2_security_group (AWS::EC2::SecurityGroup)
pub fn ec2_security_group_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::EC2::SecurityGroup",
        has_tags: true,
        naming: Naming::Property("GroupName"),
        schema: ResourceSchema::new("ec2_security_group")
            .attribute(name_attribute())
            .attribute(
                property("group_description", AttributeType::String, "GroupDescription")
                    .required(),
            )
            .attribute(property("vpc_id", AttributeType::String, "VpcId"))
            .attribute(
                property(
                    "security_group_ingress",
                    AttributeType::List(Box::new(AttributeType::Any)),
                    "SecurityGroupIngress",
                )
                .with_description("Inbound rules, one block per rule"),
            )
            .attribute(property(
                "security_group_egress",
                AttributeType::List(Box::new(AttributeType::Any)),
                "SecurityGroupEgress",
            ))
            .attribute(tags_attribute())
            .attribute(computed("group_id", "GroupId")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vela_core::resource::Value;

    #[test]
    fn subnet_rejects_invalid_cidr() {
        let schema = ec2_subnet_config().schema;
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::String("public-a".to_string()));
        attributes.insert("vpc_id".to_string(), Value::String("vpc-123".to_string()));
        attributes.insert("cidr_block".to_string(), Value::String("10.0.0.0/33".to_string()));
        assert!(schema.validate(&attributes).is_err());

        attributes.insert("cidr_block".to_string(), Value::String("10.0.0.0/18".to_string()));
        assert!(schema.validate(&attributes).is_ok());
    }

    #[test]
    fn computed_ids_cannot_be_set() {
        let schema = ec2_vpc_config().schema;
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::String("my-vpc".to_string()));
        attributes.insert("cidr_block".to_string(), Value::String("10.0.0.0/16".to_string()));
        attributes.insert("vpc_id".to_string(), Value::String("vpc-123".to_string()));
        assert!(schema.validate(&attributes).is_err());
    }
}
