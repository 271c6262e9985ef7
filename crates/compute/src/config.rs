//! Runtime configuration for the compute context, the sorter and the demo.
//!
//! Files are JSON or YAML; [`ComputeConfig::load`] picks the format from the
//! extension. Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub sort: SortConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Which GPU adapter to open.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub power_preference: PowerPreference,
    #[serde(default)]
    pub backends: BackendSelection,
    #[serde(default)]
    pub force_fallback_adapter: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

impl PowerPreference {
    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSelection {
    #[default]
    Primary,
    All,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl BackendSelection {
    pub fn to_wgpu(self) -> wgpu::Backends {
        match self {
            BackendSelection::Primary => wgpu::Backends::PRIMARY,
            BackendSelection::All => wgpu::Backends::all(),
            BackendSelection::Vulkan => wgpu::Backends::VULKAN,
            BackendSelection::Metal => wgpu::Backends::METAL,
            BackendSelection::Dx12 => wgpu::Backends::DX12,
            BackendSelection::Gl => wgpu::Backends::GL,
        }
    }
}

/// Sorter tuning.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    /// Upper bound on threads per workgroup, below the device limit.
    #[serde(default)]
    pub max_workgroup_size: Option<u32>,
}

/// Inputs of the demo binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_element_count")]
    pub element_count: u32,
    /// Fixed RNG seed; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Reduction inputs are drawn from `0..reduce_max_value`.
    #[serde(default = "default_reduce_max_value")]
    pub reduce_max_value: i32,
}

fn default_element_count() -> u32 {
    1024 * 512
}

fn default_reduce_max_value() -> i32 {
    256
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            element_count: default_element_count(),
            seed: None,
            reduce_max_value: default_reduce_max_value(),
        }
    }
}

impl ComputeConfig {
    /// Load from `path`, YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if is_yaml(path) {
            Self::load_yaml(path)
        } else {
            Self::load_json(path)
        }
    }

    /// Save to `path` in the format its extension names.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if is_yaml(path) {
            self.save_yaml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn load_json(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save configuration to YAML file
    pub fn save_yaml(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Load configuration from YAML file
    pub fn load_yaml(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&yaml)?)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}
