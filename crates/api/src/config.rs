//! Types for use when configuring SeqGate modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> SgResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| SgError::other_src("encode", e))?,
    )
    .map_err(|e| SgError::other_src("decode", e))
}

/// Denotes a type used to configure a specific SeqGate module.
///
/// The types behind this trait are for configuration that cannot change at
/// runtime, the likes of which would be found in a configuration file.
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

/// SeqGate configuration: a module-name-keyed map of module configs.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// When a default or example configuration file is being generated, the
    /// configured module factories are handed a mutable reference to this
    /// struct; each should call this to contribute its default parameters.
    pub fn add_default_module_config<M: ModConfig>(
        &mut self,
        module_name: String,
    ) -> SgResult<()> {
        if self.0.contains_key(&module_name) {
            return Err(SgError::other(format!(
                "Refusing to overwrite conflicting module name: {module_name}"
            )));
        }
        self.0.insert(module_name, tc(&M::default())?);
        Ok(())
    }

    /// Set (or replace) a module config explicitly.
    pub fn set_module_config<M: ModConfig>(
        &mut self,
        module_name: String,
        config: &M,
    ) -> SgResult<()> {
        self.0.insert(module_name, tc(config)?);
        Ok(())
    }

    /// Extract a module config. This map is loaded from disk and edited by
    /// humans, so module config serialization should tolerate missing
    /// properties with sane defaults; an unset module yields the default.
    pub fn get_module_config<M: ModConfig>(
        &self,
        module_name: &str,
    ) -> SgResult<M> {
        self.0
            .get(module_name)
            .map(tc)
            .unwrap_or_else(|| Ok(M::default()))
    }
}
