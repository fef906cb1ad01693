use promgate_config::GenericConfiguration;
use serde::Deserialize;

use crate::{sink::TagMap, GenericError};

/// Writer configuration.
///
/// All fields are optional, and an empty configuration forwards metric and tag names unchanged with no extra tags.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct WriterConfiguration {
    /// Prefix prepended to every metric name, joined with an underscore.
    #[serde(default)]
    pub prefix: String,

    /// Tags added to every outgoing point.
    ///
    /// These override any tag of the same name derived from series labels. Tags with an empty value, or named
    /// `instance`, are ignored with a warning when the writer is built.
    #[serde(default)]
    pub tags: TagMap,

    /// Whether to convert underscores to dots in metric and tag names.
    ///
    /// Tag values are never affected.
    #[serde(default)]
    pub convert_paths: bool,
}

impl WriterConfiguration {
    /// Creates a new `WriterConfiguration` from the given configuration.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(config.as_typed()?)
    }

    /// Sets the metric name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Adds a static tag.
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Sets whether underscores in names are converted to dots.
    pub fn with_convert_paths(mut self, convert_paths: bool) -> Self {
        self.convert_paths = convert_paths;
        self
    }
}

#[cfg(test)]
mod tests {
    use promgate_config::ConfigurationLoader;
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config = ConfigurationLoader::default()
            .add_static_values(json!({}))
            .into_generic();

        let writer_config = WriterConfiguration::from_configuration(&config).unwrap();
        assert_eq!(writer_config, WriterConfiguration::default());
    }

    #[test]
    fn from_generic_configuration() {
        let config = ConfigurationLoader::default()
            .add_static_values(json!({
                "prefix": "myapp",
                "convert_paths": true,
                "tags": { "env": "prod" }
            }))
            .into_generic();

        let writer_config = WriterConfiguration::from_configuration(&config).unwrap();
        let expected = WriterConfiguration::default()
            .with_prefix("myapp")
            .with_convert_paths(true)
            .with_tag("env", "prod");
        assert_eq!(writer_config, expected);
    }

    #[test]
    fn rejects_mistyped_values() {
        let config = ConfigurationLoader::default()
            .add_static_values(json!({ "convert_paths": "yes please" }))
            .into_generic();

        assert!(WriterConfiguration::from_configuration(&config).is_err());
    }
}
