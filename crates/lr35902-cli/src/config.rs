use log::warn;
use lr35902_core::BreakpointSets;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

/// A 16-bit address written either as a TOML integer (`0xC000`) or as a hex
/// string (`"$C000"`, `"0xC000"`, `"C000"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AddressRepr")]
pub struct Address(pub u16);

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Int(u16),
    Text(String),
}

impl TryFrom<AddressRepr> for Address {
    type Error = String;

    fn try_from(repr: AddressRepr) -> Result<Self, Self::Error> {
        match repr {
            AddressRepr::Int(v) => Ok(Address(v)),
            AddressRepr::Text(s) => parse_addr(&s).map(Address),
        }
    }
}

/// Parse a hex address with an optional `$` or `0x` prefix.
pub fn parse_addr(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let digits = s
        .strip_prefix('$')
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s:?}: {e}"))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BreakpointConfig {
    pub read: Vec<Address>,
    pub write: Vec<Address>,
    pub jump: Vec<Address>,
}

impl BreakpointConfig {
    pub fn to_sets(&self) -> BreakpointSets {
        let collect = |addrs: &[Address]| addrs.iter().map(|a| a.0).collect();
        BreakpointSets {
            read: collect(&self.read),
            write: collect(&self.write),
            jump: collect(&self.jump),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Overrides the post-boot PC.
    pub start: Option<Address>,
    pub steps: u64,
    /// Follow both edges of conditional branches when disassembling.
    pub permissive: bool,
    pub breakpoints: BreakpointConfig,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            start: None,
            steps: DEFAULT_STEP_LIMIT,
            permissive: true,
            breakpoints: BreakpointConfig::default(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("lr35902").join("debugger.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("lr35902").join("debugger.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("lr35902")
            .join("debugger.toml");
    }

    PathBuf::from("debugger.toml")
}

pub fn load_from_file(path: &Path) -> DebuggerConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return DebuggerConfig::default(),
    };

    match toml::from_str::<DebuggerConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse debugger config {}: {e}; using defaults",
                path.display()
            );
            DebuggerConfig::default()
        }
    }
}
