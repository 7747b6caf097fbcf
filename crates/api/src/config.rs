//! Types for use when configuring loader modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> LoaderResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| LoaderError::other_src("encode", e))?,
    )
    .map_err(|e| LoaderError::other_src("decode", e))
}

/// Denotes a type used to configure a specific loader module.
///
/// A module config is a struct with a single top-level field named after
/// the module (e.g. `coreLoader`) holding the actual parameters. This lets
/// all module configs share one flat json map without stepping on each
/// other.
///
/// The types should be tolerant to missing properties, setting sane
/// defaults, since the config may be loaded from a human-edited file.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

impl<T> ModConfig for T where
    T: 'static
        + Sized
        + Default
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned
        + Send
        + Sync
{
}

/// Loader configuration.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// Merge a module config into this config. Every top-level key of the
    /// module config replaces the existing value of that key.
    ///
    /// Factories call this from `default_config` to contribute their
    /// defaults. Applications call it afterwards to override them.
    pub fn set_module_config<M: ModConfig>(
        &mut self,
        module_config: &M,
    ) -> LoaderResult<()> {
        let value: serde_json::Value = tc(module_config)?;
        match value {
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    self.0.insert(key, value);
                }
                Ok(())
            }
            oth => Err(LoaderError::other(format!(
                "module config must serialize to an object, got: {oth}"
            ))),
        }
    }

    /// Extract a module config. Missing keys produce the module defaults,
    /// keys belonging to other modules are ignored.
    pub fn get_module_config<M: ModConfig>(&self) -> LoaderResult<M> {
        tc(&self.0)
    }

    /// Overlay the values of another config on top of this one.
    /// Nested objects are merged recursively.
    pub fn merge(&mut self, other: Config) {
        fn merge_value(into: &mut serde_json::Value, from: serde_json::Value) {
            match (into, from) {
                (
                    serde_json::Value::Object(into),
                    serde_json::Value::Object(from),
                ) => {
                    for (key, value) in from {
                        match into.get_mut(&key) {
                            Some(existing) => merge_value(existing, value),
                            None => {
                                into.insert(key, value);
                            }
                        }
                    }
                }
                (into, from) => *into = from,
            }
        }

        for (key, value) in other.0 {
            match self.0.get_mut(&key) {
                Some(existing) => merge_value(existing, value),
                None => {
                    self.0.insert(key, value);
                }
            }
        }
    }
}
