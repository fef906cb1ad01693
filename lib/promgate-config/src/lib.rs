//! Primitives for loading layered configuration.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{borrow::Cow, collections::HashSet, path::Path, sync::Arc};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

mod provider;

use self::provider::{FileFormat, FileProvider};

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Requested field had a different data type than expected.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load or query configuration."))]
    Generic {
        /// Error source.
        source: anyhow::Error,
    },
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LookupSource {
    Environment { prefix: String },
}

impl LookupSource {
    fn transform_key(&self, key: &str) -> String {
        match self {
            // The stored prefix is already uppercased with its trailing underscore.
            LookupSource::Environment { prefix } => format!("{}{}", prefix, key.replace('.', "_").to_uppercase()),
        }
    }
}

struct BoxedProvider(Box<dyn Provider + Send + Sync>);

impl Provider for BoxedProvider {
    fn metadata(&self) -> figment::Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        self.0.data()
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources are layered in the order they are added: sources added later take precedence over sources added earlier.
/// The merged result can either be extracted as a typed value ([`into_typed`][Self::into_typed]) or kept around in
/// raw form for key-based queries ([`into_generic`][Self::into_generic]).
///
/// # Supported sources
///
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
/// - static values serialized from an in-memory type
#[derive(Default)]
pub struct ConfigurationLoader {
    lookup_sources: HashSet<LookupSource>,
    providers: Vec<BoxedProvider>,
}

impl ConfigurationLoader {
    fn add_file<P>(mut self, path: P, format: FileFormat) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = FileProvider::load(&path, format)
            .map_err(anyhow::Error::from)
            .context(Generic)?;
        self.providers.push(BoxedProvider(Box::new(provider)));
        Ok(self)
    }

    fn try_add_file<P>(mut self, path: P, format: FileFormat) -> Self
    where
        P: AsRef<Path>,
    {
        match FileProvider::load(&path, format) {
            Ok(provider) => self.providers.push(BoxedProvider(Box::new(provider))),
            Err(e) => {
                debug!(error = %e, file_path = %path.as_ref().to_string_lossy(), ?format, "Unable to read configuration file. Ignoring.");
            }
        }
        self
    }

    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        self.add_file(path, FileFormat::Yaml)
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    pub fn try_from_yaml<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        self.try_add_file(path, FileFormat::Yaml)
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        self.add_file(path, FileFormat::Json)
    }

    /// Attempts to load the given JSON configuration file, ignoring any errors.
    pub fn try_from_json<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        self.try_add_file(path, FileFormat::Json)
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. For example, with a
    /// prefix of `promgate`, any environment variable starting with `PROMGATE_` would be matched. The prefix is
    /// case-insensitive, and the remainder of the variable name is lowercased to form the key.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_uppercase()
        } else {
            format!("{}_", prefix.to_uppercase())
        };

        // `Env` itself isn't `Send + Sync`, so we snapshot it into a serialized provider.
        let values = Env::prefixed(&prefix)
            .data()
            .map_err(anyhow::Error::from)
            .context(Generic)?;
        if let Some(default_dict) = values.get(&figment::Profile::Default) {
            self.providers
                .push(BoxedProvider(Box::new(Serialized::defaults(default_dict.clone()))));
            self.lookup_sources.insert(LookupSource::Environment { prefix });
        }
        Ok(self)
    }

    /// Adds a set of static values, taking precedence over every source added before it.
    pub fn add_static_values<T>(mut self, values: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.providers.push(BoxedProvider(Box::new(Serialized::defaults(values))));
        self
    }

    fn build_figment(providers: &[BoxedProvider]) -> Figment {
        providers
            .iter()
            .fold(Figment::new(), |figment, provider| figment.admerge(provider))
    }

    /// Consumes the configuration loader, deserializing it as `T`.
    ///
    /// ## Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<T>(self) -> Result<T, ConfigurationError>
    where
        T: for<'de> Deserialize<'de>,
    {
        Self::build_figment(&self.providers)
            .extract()
            .map_err(|e| from_figment_error(&self.lookup_sources, e))
    }

    /// Consumes the configuration loader and wraps it in a generic wrapper.
    pub fn into_generic(self) -> GenericConfiguration {
        GenericConfiguration {
            inner: Arc::new(Inner {
                figment: Self::build_figment(&self.providers),
                lookup_sources: self.lookup_sources,
            }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    figment: Figment,
    lookup_sources: HashSet<LookupSource>,
}

/// A generic configuration object.
///
/// This represents the merged configuration derived from [`ConfigurationLoader`] in its raw form. Values can be
/// queried by key, where keys take the form `a.b.c` and periods indicate a nested value.
#[derive(Clone, Debug)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    fn get<T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.inner.figment.extract_inner(key) {
            Ok(value) => Ok(value),
            Err(e) if matches!(e.kind, Kind::MissingField(_)) => {
                // Nested keys given as `foo.bar` may only exist as `foo_bar` when sourced from the environment.
                let fallback_key = key.replace('.', "_");
                self.inner
                    .figment
                    .extract_inner(&fallback_key)
                    .map_err(|fallback_e| from_figment_error(&self.inner.lookup_sources, fallback_e))
            }
            Err(e) => Err(from_figment_error(&self.inner.lookup_sources, e)),
        }
    }

    /// Gets a configuration value by key.
    ///
    /// ## Errors
    ///
    /// If the key does not exist in the configuration, or if the value could not be deserialized into `T`, an error
    /// variant will be returned.
    pub fn get_typed<T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.get(key)
    }

    /// Gets a configuration value by key, or the default value if a key does not exist or could not be deserialized.
    pub fn get_typed_or_default<T>(&self, key: &str) -> T
    where
        T: Default + for<'de> Deserialize<'de>,
    {
        self.get(key).unwrap_or_default()
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// ## Errors
    ///
    /// If the value exists but could not be deserialized into `T`, an error will be returned.
    pub fn try_get_typed<T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to deserialize the entire configuration as `T`.
    ///
    /// ## Errors
    ///
    /// If the value could not be deserialized into `T`, an error will be returned.
    pub fn as_typed<T>(&self) -> Result<T, ConfigurationError>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.inner
            .figment
            .extract()
            .map_err(|e| from_figment_error(&self.inner.lookup_sources, e))
    }
}

fn from_figment_error(lookup_sources: &HashSet<LookupSource>, e: figment::Error) -> ConfigurationError {
    match e.kind {
        Kind::MissingField(field) => {
            let mut valid_keys = lookup_sources
                .iter()
                .map(|source| source.transform_key(&field))
                .collect::<Vec<_>>();

            valid_keys.insert(0, field.to_string());

            let help_text = format!("Try setting `{}`.", valid_keys.join("` or `"));

            ConfigurationError::MissingField { help_text, field }
        }
        Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
            field: e.path.join("."),
            expected_ty,
            actual_ty: actual_ty.to_string(),
        },
        _ => ConfigurationError::Generic { source: e.into() },
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, io::Write as _};

    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Settings {
        prefix: String,
        #[serde(default)]
        tags: BTreeMap<String, String>,
        #[serde(default)]
        convert_paths: bool,
    }

    fn write_temp_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn yaml_file_into_typed() {
        let file = write_temp_file(
            ".yaml",
            "prefix: myapp\nconvert_paths: true\ntags:\n  env: prod\n  region: eu\n",
        );

        let settings: Settings = ConfigurationLoader::default()
            .from_yaml(file.path())
            .unwrap()
            .into_typed()
            .unwrap();

        assert_eq!(settings.prefix, "myapp");
        assert!(settings.convert_paths);
        assert_eq!(settings.tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(settings.tags.len(), 2);
    }

    #[test]
    fn later_sources_take_precedence() {
        let file = write_temp_file(".json", r#"{ "prefix": "from_file", "convert_paths": true }"#);

        let settings: Settings = ConfigurationLoader::default()
            .from_json(file.path())
            .unwrap()
            .add_static_values(json!({ "prefix": "from_static" }))
            .into_typed()
            .unwrap();

        assert_eq!(settings.prefix, "from_static");
        assert!(settings.convert_paths);
    }

    #[test]
    fn missing_file_is_ignored_by_try_variant() {
        let config = ConfigurationLoader::default()
            .try_from_yaml("/nonexistent/promgate.yaml")
            .add_static_values(json!({ "prefix": "fallback" }))
            .into_generic();

        assert_eq!(config.get_typed::<String>("prefix").unwrap(), "fallback");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = ConfigurationLoader::default().from_yaml("/nonexistent/promgate.yaml");
        assert!(matches!(result, Err(ConfigurationError::Generic { .. })));
    }

    #[test]
    fn empty_environment_prefix() {
        let result = ConfigurationLoader::default().from_environment("");
        assert!(matches!(result, Err(ConfigurationError::EmptyPrefix)));
    }

    #[test]
    fn environment_values_are_loaded() {
        std::env::set_var("PGCFGTEST_ENV_PREFIX", "from_env");

        let config = ConfigurationLoader::default()
            .from_environment("pgcfgtest_env")
            .unwrap()
            .into_generic();

        assert_eq!(config.get_typed::<String>("prefix").unwrap(), "from_env");

        std::env::remove_var("PGCFGTEST_ENV_PREFIX");
    }

    #[test]
    fn missing_field_help_text_mentions_environment() {
        std::env::set_var("PGCFGTEST_HELP_UNRELATED", "1");

        let config = ConfigurationLoader::default()
            .from_environment("pgcfgtest_help")
            .unwrap()
            .into_generic();

        match config.get_typed::<String>("listen_address") {
            Err(ConfigurationError::MissingField { field, help_text }) => {
                assert_eq!(field, "listen_address");
                assert!(help_text.contains("PGCFGTEST_HELP_LISTEN_ADDRESS"), "{}", help_text);
            }
            other => panic!("expected missing field error, got {:?}", other),
        }

        std::env::remove_var("PGCFGTEST_HELP_UNRELATED");
    }

    #[test]
    fn optional_and_defaulted_lookups() {
        let config = ConfigurationLoader::default()
            .add_static_values(json!({ "convert_paths": "not-a-bool" }))
            .into_generic();

        assert_eq!(config.try_get_typed::<String>("prefix").unwrap(), None);
        assert!(!config.get_typed_or_default::<bool>("convert_paths"));
        assert!(matches!(
            config.get_typed::<bool>("convert_paths"),
            Err(ConfigurationError::InvalidFieldType { .. })
        ));
    }
}
