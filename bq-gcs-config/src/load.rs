use std::{
    borrow::Cow,
    collections::HashMap,
    fmt, io,
    path::{Path, PathBuf},
};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing optional configuration files relative to application root.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Separator for list elements in environment variables.
const LIST_SEPARATOR: &str = ",";

/// Trait implemented by configuration structures that require list parsing help.
pub trait Config {
    /// Keys whose values should be parsed as lists when loading the configuration.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Identifies which configuration file is currently being loaded.
#[derive(Debug, Clone)]
enum ConfigFileKind {
    /// Base configuration shared by every environment.
    Base,
    /// Environment-specific overrides.
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'_, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// A configuration file existed but could not be parsed.
    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    /// The configuration could not be deserialized, usually because a required variable is
    /// missing.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),

    /// Failed to determine the runtime environment (`ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    /// Failed to initialize the configuration builder.
    #[error("failed to initialize configuration builder: {0}")]
    Builder(#[source] config::ConfigError),
}

/// Where configuration values are read from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Directory holding `base.*` and `{environment}.*` files, if any.
    pub directory: Option<PathBuf>,
    /// Environment variables; [`None`] reads the process environment.
    pub variables: Option<HashMap<String, String>>,
}

impl ConfigSources {
    /// Sources used by the running function: the `configuration` directory next to the
    /// working directory when it exists, and the process environment.
    pub fn from_process() -> Result<Self, LoadConfigError> {
        let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
        let configuration_directory = base_path.join(CONFIGURATION_DIR);

        Ok(Self {
            directory: configuration_directory
                .is_dir()
                .then_some(configuration_directory),
            variables: None,
        })
    }

    /// Sources made only of the given variables.
    pub fn from_variables(variables: HashMap<String, String>) -> Self {
        Self {
            directory: None,
            variables: Some(variables),
        }
    }

    fn environment(&self) -> Result<Environment, io::Error> {
        match &self.variables {
            Some(variables) => {
                Environment::from_lookup(|name| variables.get(name).cloned())
            }
            None => Environment::load(),
        }
    }
}

/// Loads configuration from the process sources.
///
/// See [`load_config_from`] for the layering rules.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    load_config_from(ConfigSources::from_process()?)
}

/// Loads layered configuration from files and environment variables.
///
/// When a configuration directory is present, `base.(yaml|yml|json)` and
/// `{ENVIRONMENT}.(yaml|yml|json)` are loaded from it if they exist. Environment variables are
/// applied last, unprefixed and lowercased (`BUCKET` sets `bucket`); nested keys use double
/// underscores (`PUBLISHER__MAX_IN_FLIGHT`) and list values are comma-separated.
pub fn load_config_from<T>(sources: ConfigSources) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let mut builder = config::Config::builder();

    if let Some(directory) = &sources.directory {
        let environment = sources.environment()?;

        for kind in [ConfigFileKind::Base, ConfigFileKind::Environment(environment)] {
            if let Some(path) = find_configuration_file(directory, &kind) {
                builder = builder.add_source(config::File::from(path.clone()));
                validate_configuration_source(&builder, &kind, &path)?;
            }
        }
    }

    let mut environment_source = config::Environment::default().separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    if let Some(variables) = sources.variables {
        environment_source = environment_source.source(Some(variables.into_iter().collect()));
    }

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Finds the configuration file that matches the requested kind and supported extensions.
fn find_configuration_file(directory: &Path, kind: &ConfigFileKind) -> Option<PathBuf> {
    let stem = kind.stem();

    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: &ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}
