//! Configuration for the compiler and the engine.

use serde::{Deserialize, Serialize};

use super::types::{JitError, JitResult};
use crate::host::RuntimeLayout;

/// Default number of `JitEngine::enter` calls before a program is compiled
pub const DEFAULT_HOT_THRESHOLD: u32 = 1;

/// Cranelift `opt_level` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value understood by `settings::builder().set("opt_level", ..)`
    pub fn as_str(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Cranelift optimization level
    pub opt_level: OptLevel,
    /// Run the IR verifier before code generation
    pub verify: bool,
    /// Emit the IR of every compiled function at trace level
    pub dump_ir: bool,
    /// Calls counted by the engine before compiling
    pub hot_threshold: u32,
    /// Leave runtime names without an explicit binding to the process symbol table
    pub resolve_from_process: bool,
    /// Host record offsets
    pub layout: RuntimeLayout,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            verify: true,
            dump_ir: false,
            hot_threshold: DEFAULT_HOT_THRESHOLD,
            resolve_from_process: false,
            layout: RuntimeLayout::lua53(),
        }
    }
}

impl JitConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> JitResult<Self> {
        let config: JitConfig =
            toml::from_str(text).map_err(|e| JitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject layouts the code generator cannot use
    pub fn validate(&self) -> JitResult<()> {
        let tvalue = &self.layout.tvalue;
        if tvalue.size <= 0 {
            return Err(JitError::Config(format!(
                "TValue size must be positive, got {}",
                tvalue.size
            )));
        }
        if tvalue.value.offset < 0 || tvalue.tag.offset < 0 {
            return Err(JitError::Config("negative TValue field offset".to_string()));
        }
        if self.layout.closure.upval_stride <= 0 {
            return Err(JitError::Config(format!(
                "upvalue stride must be positive, got {}",
                self.layout.closure.upval_stride
            )));
        }
        Ok(())
    }

    pub fn with_opt_level(mut self, level: OptLevel) -> Self {
        self.opt_level = level;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Enable the trace-level IR dump
    pub fn with_ir_dump(mut self) -> Self {
        self.dump_ir = true;
        self
    }

    pub fn with_hot_threshold(mut self, threshold: u32) -> Self {
        self.hot_threshold = threshold;
        self
    }

    pub fn with_process_symbols(mut self) -> Self {
        self.resolve_from_process = true;
        self
    }

    pub fn with_layout(mut self, layout: RuntimeLayout) -> Self {
        self.layout = layout;
        self
    }
}
