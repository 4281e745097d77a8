//! CloudWatch schemas: AWS::CloudWatch::*

use vela_core::schema::{AttributeType, ResourceSchema, types};

use super::{AwsccSchemaConfig, Naming, computed, name_attribute, property};

/// Returns the schema config for cloudwatch_alarm (AWS::CloudWatch::Alarm)
pub fn cloudwatch_alarm_config() -> AwsccSchemaConfig {
    AwsccSchemaConfig {
        aws_type_name: "AWS::CloudWatch::Alarm",
        has_tags: false,
        naming: Naming::Property("AlarmName"),
        schema: ResourceSchema::new("cloudwatch_alarm")
            .attribute(name_attribute())
            .attribute(property("namespace", AttributeType::String, "Namespace"))
            .attribute(property("metric_name", AttributeType::String, "MetricName"))
            .attribute(property(
                "statistic",
                types::one_of(&["SampleCount", "Average", "Sum", "Minimum", "Maximum"]),
                "Statistic",
            ))
            .attribute(property("period", types::positive_int(), "Period"))
            .attribute(property("threshold", AttributeType::Int, "Threshold"))
            .attribute(
                property("evaluation_periods", types::positive_int(), "EvaluationPeriods")
                    .required(),
            )
            .attribute(
                property(
                    "comparison_operator",
                    types::one_of(&[
                        "GreaterThanOrEqualToThreshold",
                        "GreaterThanThreshold",
                        "LessThanThreshold",
                        "LessThanOrEqualToThreshold",
                    ]),
                    "ComparisonOperator",
                )
                .required(),
            )
            .attribute(property(
                "treat_missing_data",
                types::one_of(&["breaching", "notBreaching", "ignore", "missing"]),
                "TreatMissingData",
            ))
            .attribute(property(
                "dimensions",
                AttributeType::List(Box::new(AttributeType::Any)),
                "Dimensions",
            ))
            .attribute(property("alarm_actions", types::string_list(), "AlarmActions"))
            .attribute(computed("arn", "Arn")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vela_core::resource::Value;

    #[test]
    fn missing_data_treatment_is_an_enum() {
        let schema = cloudwatch_alarm_config().schema;
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::String("my-alarm".to_string()));
        attributes.insert("evaluation_periods".to_string(), Value::Int(1));
        attributes.insert(
            "comparison_operator".to_string(),
            Value::String("GreaterThanOrEqualToThreshold".to_string()),
        );
        attributes.insert("treat_missing_data".to_string(), Value::String("notBreaching".to_string()));
        assert!(schema.validate(&attributes).is_ok());

        attributes.insert("treat_missing_data".to_string(), Value::String("never".to_string()));
        assert!(schema.validate(&attributes).is_err());
    }
}
