//! IAM schemas: AWS::IAM::*

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, Naming, computed, name_attribute, property, tags_attribute};

/// Returns the schema config for iam_role (AWS::IAM::Role)
pub fn iam_role_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::IAM::Role",
        has_tags: true,
        naming: Naming::Property("RoleName"),
        schema: ResourceSchema::new("iam_role")
            .attribute(name_attribute())
            .attribute(
                property(
                    "assume_role_policy_document",
                    AttributeType::Any,
                    "AssumeRolePolicyDocument",
                )
                .required()
                .with_description("IAM policy JSON; keys are sent as written"),
            )
            .attribute(property("managed_policy_arns", types::string_list(), "ManagedPolicyArns"))
            .attribute(property("path", AttributeType::String, "Path"))
            .attribute(tags_attribute())
            .attribute(computed("arn", "Arn"))
            .attribute(computed("role_id", "RoleId")),
    }
}
