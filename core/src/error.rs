use thiserror::Error;

/// bpack error types
#[derive(Error, Debug)]
pub enum BuildError {
    /// Stack or build image could not be resolved, or a config file is unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Base image, module metadata or module directory is missing
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Module metadata disagrees with the build spec
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Filesystem or archive failure while producing a layer
    #[error("Layer error: {0}")]
    LayerError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image daemon failure (pull, read, append)
    #[error("Daemon error: {image} - {message}")]
    DaemonError { image: String, message: String },

    /// Repository store failure
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl BuildError {
    /// Prefix the error message with `context`, keeping the error class.
    ///
    /// Used where an error crosses a component boundary so the caller sees
    /// which module, image or file the failure belongs to.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            BuildError::ConfigError(m) => BuildError::ConfigError(format!("{}: {}", context, m)),
            BuildError::NotFoundError(m) => {
                BuildError::NotFoundError(format!("{}: {}", context, m))
            }
            BuildError::ValidationError(m) => {
                BuildError::ValidationError(format!("{}: {}", context, m))
            }
            BuildError::LayerError(m) => BuildError::LayerError(format!("{}: {}", context, m)),
            BuildError::IoError(e) => BuildError::LayerError(format!("{}: {}", context, e)),
            BuildError::DaemonError { image, message } => BuildError::DaemonError {
                image,
                message: format!("{}: {}", context, message),
            },
            BuildError::RegistryError { registry, message } => BuildError::RegistryError {
                registry,
                message: format!("{}: {}", context, message),
            },
            BuildError::SerializationError(m) => {
                BuildError::SerializationError(format!("{}: {}", context, m))
            }
        }
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::SerializationError(err.to_string())
    }
}

impl From<toml::ser::Error> for BuildError {
    fn from(err: toml::ser::Error) -> Self {
        BuildError::SerializationError(err.to_string())
    }
}

/// Result type alias for bpack operations
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = BuildError::ConfigError("stack \"x\" not found".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: stack \"x\" not found"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let error = BuildError::ValidationError("buildpack ids did not match".to_string());
        assert_eq!(
            error.to_string(),
            "Validation error: buildpack ids did not match"
        );
    }

    #[test]
    fn test_daemon_error_display() {
        let error = BuildError::DaemonError {
            image: "packs/build".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Daemon error: packs/build - connection refused"
        );
    }

    #[test]
    fn test_registry_error_display() {
        let error = BuildError::RegistryError {
            registry: "ghcr.io".to_string(),
            message: "push rejected".to_string(),
        };
        assert_eq!(error.to_string(), "Registry error: ghcr.io - push rejected");
    }

    #[test]
    fn test_context_keeps_variant() {
        let error = BuildError::ValidationError("ids differ".to_string())
            .context("buildpack \"java\"");
        assert!(matches!(error, BuildError::ValidationError(_)));
        assert_eq!(
            error.to_string(),
            "Validation error: buildpack \"java\": ids differ"
        );
    }

    #[test]
    fn test_context_on_daemon_error() {
        let error = BuildError::DaemonError {
            image: "packs/build".to_string(),
            message: "timeout".to_string(),
        }
        .context("pull");
        match error {
            BuildError::DaemonError { image, message } => {
                assert_eq!(image, "packs/build");
                assert_eq!(message, "pull: timeout");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_context_turns_io_into_layer_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = BuildError::from(io_error).context("/tmp/order.tgz");
        assert!(matches!(error, BuildError::LayerError(_)));
        assert!(error.to_string().contains("/tmp/order.tgz: denied"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: BuildError = result.unwrap_err().into();
        assert!(matches!(error, BuildError::SerializationError(_)));
    }
}
