//! Backend implementations for state storage

mod local;
mod s3;

pub use local::LocalBackend;
pub use s3::S3Backend;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};

/// Create a backend from configuration
///
/// Without a `backend` block the state lives in a local file.
pub async fn create_backend(config: Option<&BackendConfig>) -> BackendResult<Box<dyn StateBackend>> {
    let Some(config) = config else {
        return Ok(Box::new(LocalBackend::new()));
    };

    match config.backend_type.as_str() {
        "local" => Ok(Box::new(LocalBackend::from_config(config)?)),
        "s3" => {
            let backend = S3Backend::from_config(config).await?;
            Ok(Box::new(backend))
        }
        other => Err(BackendError::unsupported_backend(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vela_core::resource::Value;

    #[tokio::test]
    async fn test_unsupported_backend() {
        let config = BackendConfig {
            backend_type: "gcs".to_string(),
            attributes: HashMap::new(),
        };

        match create_backend(Some(&config)).await {
            Err(BackendError::UnsupportedBackend(name)) => assert_eq!(name, "gcs"),
            _ => panic!("Expected UnsupportedBackend error"),
        }
    }

    #[tokio::test]
    async fn test_default_is_local() {
        let backend = create_backend(None).await.unwrap();
        assert_eq!(backend.location(), LocalBackend::DEFAULT_STATE_FILE);
    }

    #[tokio::test]
    async fn test_local_backend_path() {
        let config = BackendConfig {
            backend_type: "local".to_string(),
            attributes: HashMap::from([(
                "path".to_string(),
                Value::String("state/bluegreen.json".to_string()),
            )]),
        };

        let backend = create_backend(Some(&config)).await.unwrap();
        assert_eq!(backend.location(), "state/bluegreen.json");
    }

    #[tokio::test]
    async fn test_s3_backend_requires_bucket() {
        let config = BackendConfig {
            backend_type: "s3".to_string(),
            attributes: HashMap::new(),
        };

        match create_backend(Some(&config)).await {
            Err(BackendError::Configuration(message)) => assert!(message.contains("bucket")),
            _ => panic!("Expected Configuration error"),
        }
    }
}
