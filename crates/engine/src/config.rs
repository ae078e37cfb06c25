use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

pub const ENV_EVENT_BUFFER: &str = "TABKEEPER_EVENT_BUFFER";
pub const ENV_DEDUPE_ON_SETTLE: &str = "TABKEEPER_DEDUPE";
pub const ENV_SORT_AFTER_MERGE: &str = "TABKEEPER_SORT_AFTER_MERGE";
pub const ENV_SERIALIZE_MERGES: &str = "TABKEEPER_SERIALIZE_MERGES";

/// Runtime knobs for the engine and its event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,

    /// Capacity of the user command channel
    pub command_buffer: usize,

    /// Capacity of the action broadcast; slow subscribers lag rather than block
    pub action_buffer: usize,

    /// Close newer same-window duplicates when a tab's URL settles
    pub dedupe_on_settle: bool,

    /// Sort the target window after merging windows
    pub sort_after_merge: bool,

    /// Refuse a merge while another merge is still moving tabs
    pub serialize_merges: bool,

    /// Rebuild the index from the host before consuming events
    pub rebuild_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1024,
            command_buffer: 16,
            action_buffer: 256,
            dedupe_on_settle: true,
            sort_after_merge: true,
            serialize_merges: true,
            rebuild_on_start: true,
        }
    }
}

impl EngineConfig {
    /// Load a config file. TOML is the documented format; JSON is accepted
    /// too so the same file can be produced by other tooling.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::parse(&raw)
            .map_err(|err| EngineError::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        match toml::from_str::<Self>(raw) {
            Ok(config) => Ok(config),
            Err(toml_err) => serde_json::from_str::<Self>(raw).map_err(|json_err| {
                format!("not valid TOML ({toml_err}) or JSON ({json_err})")
            }),
        }
    }

    /// Apply `TABKEEPER_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(raw) = lookup(ENV_EVENT_BUFFER) {
            self.event_buffer = raw.trim().parse().map_err(|_| {
                EngineError::Config(format!("{ENV_EVENT_BUFFER} must be a number, got {raw:?}"))
            })?;
        }
        if let Some(value) = lookup(ENV_DEDUPE_ON_SETTLE).and_then(|raw| parse_flag(&raw)) {
            self.dedupe_on_settle = value;
        }
        if let Some(value) = lookup(ENV_SORT_AFTER_MERGE).and_then(|raw| parse_flag(&raw)) {
            self.sort_after_merge = value;
        }
        if let Some(value) = lookup(ENV_SERIALIZE_MERGES).and_then(|raw| parse_flag(&raw)) {
            self.serialize_merges = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(EngineError::Config("event_buffer must be > 0".to_string()));
        }
        if self.command_buffer == 0 {
            return Err(EngineError::Config("command_buffer must be > 0".to_string()));
        }
        if self.action_buffer == 0 {
            return Err(EngineError::Config("action_buffer must be > 0".to_string()));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw == "1" || raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("on") {
        Some(true)
    } else if raw == "0" || raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::parse("dedupe_on_settle = false\nevent_buffer = 64\n")
            .expect("toml config");
        assert_eq!(
            config,
            EngineConfig {
                dedupe_on_settle: false,
                event_buffer: 64,
                ..EngineConfig::default()
            }
        );
    }

    #[test]
    fn json_is_accepted() {
        let config =
            EngineConfig::parse(r#"{ "serialize_merges": false }"#).expect("json config");
        assert!(!config.serialize_merges);
        assert!(config.sort_after_merge);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::parse("dedupe = true\n").expect_err("unknown key");
        assert!(err.contains("TOML"), "{err}");
    }

    #[test]
    fn load_validates_capacities() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "command_buffer = 0").expect("write");
        let err = EngineConfig::load(file.path()).expect_err("zero capacity");
        assert!(err.to_string().contains("command_buffer"), "{err}");
    }

    #[test]
    fn env_overrides_apply_on_top_of_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_EVENT_BUFFER, "32"),
            (ENV_DEDUPE_ON_SETTLE, "off"),
            (ENV_SORT_AFTER_MERGE, "maybe"),
        ]);
        let config = EngineConfig::default()
            .with_overrides_from(|key| env.get(key).map(|v| (*v).to_string()))
            .expect("overrides");
        assert_eq!(config.event_buffer, 32);
        assert!(!config.dedupe_on_settle);
        // Unrecognised flag values leave the setting alone.
        assert!(config.sort_after_merge);
    }

    #[test]
    fn bad_numeric_override_is_an_error() {
        let err = EngineConfig::default()
            .with_overrides_from(|key| (key == ENV_EVENT_BUFFER).then(|| "lots".to_string()))
            .expect_err("not a number");
        assert!(matches!(err, EngineError::Config(_)));
    }
}
