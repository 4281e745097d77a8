//! Utility functions for value normalization

/// Normalize region value (e.g., "awscc.Region.us_east_1" -> "us-east-1")
pub fn normalize_region(s: &str) -> String {
    let region_part = if s.contains('.') {
        s.split('.').next_back().unwrap_or(s)
    } else {
        s
    };
    region_part.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_region() {
        assert_eq!(normalize_region("us_east_1"), "us-east-1");
        assert_eq!(normalize_region("awscc.Region.us_east_1"), "us-east-1");
        assert_eq!(normalize_region("eu-west-1"), "eu-west-1");
    }
}
