use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level, validated configuration for the [`crate::coordinator::Coordinator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub data_dir: PathBuf,
    pub pagination: PaginationConfig,
    pub search: SearchConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_page_size: usize,
    pub min_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub min_score_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub enable_reranking: bool,
    pub enable_knowledge_graph: bool,
    pub enable_compute_hooks: bool,
}

impl CoordinatorConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.pagination.default_page_size == 0 {
            return Err("pagination.default_page_size must be > 0".into());
        }
        if self.pagination.min_page_size == 0 {
            return Err("pagination.min_page_size must be > 0".into());
        }
        if self.pagination.min_page_size > self.pagination.max_page_size {
            return Err("pagination.min_page_size must be <= pagination.max_page_size".into());
        }
        if self.search.default_k == 0 {
            return Err("search.default_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_score_threshold) {
            return Err("search.min_score_threshold must be in [0.0, 1.0]".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing
    /// fields via `#[serde(default)]`, and to `Default::default()` entirely
    /// when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {}", e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Clamp a requested page size into `[min_page_size, max_page_size]`,
    /// substituting `default_page_size` for `limit <= 0`.
    pub fn clamp_page_size(&self, limit: i64) -> usize {
        if limit <= 0 {
            return self.pagination.default_page_size;
        }
        (limit as usize)
            .max(self.pagination.min_page_size)
            .min(self.pagination.max_page_size)
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            min_page_size: 1,
            max_page_size: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            min_score_threshold: 0.0,
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_reranking: true,
            enable_knowledge_graph: true,
            enable_compute_hooks: true,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shodh-segments");

        Self {
            data_dir,
            pagination: PaginationConfig::default(),
            search: SearchConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}
