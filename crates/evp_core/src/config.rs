use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackendKind {
    #[default]
    BruteForce,
    Quantized,
}

/// Application configuration. Every field has a default so a partial YAML file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub storage_dir: PathBuf,
    pub packs_dir: PathBuf,
    pub drafts_dir: PathBuf,
    /// Searched in order when locating an evidence source file by name.
    pub source_dirs: Vec<PathBuf>,
    pub embedding_dim: usize,
    pub index_backend: IndexBackendKind,
    pub default_max_items: usize,
    pub excerpt_max_chars: usize,
    pub redaction_config: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
            packs_dir: PathBuf::from("packs"),
            drafts_dir: PathBuf::from("storage").join("drafts"),
            source_dirs: vec![PathBuf::from("data").join("uploads"), PathBuf::from("data")],
            embedding_dim: 384,
            index_backend: IndexBackendKind::BruteForce,
            default_max_items: 30,
            excerpt_max_chars: 300,
            redaction_config: PathBuf::from("config").join("redaction.yaml"),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Reads YAML config from `path` when it exists; otherwise returns defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read config file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to parse config file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
    }

    /// Re-bases every relative path onto `base`.
    pub fn rooted(mut self, base: &Path) -> Self {
        let rebase = |p: &Path| -> PathBuf {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        self.storage_dir = rebase(&self.storage_dir);
        self.packs_dir = rebase(&self.packs_dir);
        self.drafts_dir = rebase(&self.drafts_dir);
        self.source_dirs = self.source_dirs.iter().map(|p| rebase(p)).collect();
        self.redaction_config = rebase(&self.redaction_config);
        self.log_dir = self.log_dir.as_deref().map(rebase);
        self
    }

    pub fn index_dir(&self) -> PathBuf {
        self.storage_dir.join("index")
    }
}

/// Region entries are accepted and counted only; image-region redaction is not performed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RedactionConfig {
    pub mode: Option<String>,
    pub patterns: Vec<String>,
    pub regions: Vec<serde_json::Value>,
}

impl RedactionConfig {
    /// A missing file is an empty config. A broken one is logged and treated as empty;
    /// redaction config problems never abort a pack build.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed reading redaction config");
                return Self::default();
            }
        };
        match serde_yaml::from_str::<Option<RedactionConfig>>(&raw) {
            Ok(cfg) => cfg.unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed parsing redaction config");
                Self::default()
            }
        }
    }

    /// Default patterns plus caller patterns, deduplicated and sorted so the
    /// application order is reproducible.
    pub fn merged_patterns(&self, extra: &[String]) -> Vec<String> {
        let mut out: Vec<String> = self.patterns.iter().chain(extra.iter()).cloned().collect();
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("evp.yaml");
        fs::write(&p, "embedding_dim: 16\nindex_backend: quantized\n").unwrap();
        let cfg = AppConfig::load(Some(&p)).unwrap();
        assert_eq!(cfg.embedding_dim, 16);
        assert_eq!(cfg.index_backend, IndexBackendKind::Quantized);
        assert_eq!(cfg.default_max_items, 30);
        assert_eq!(cfg.packs_dir, PathBuf::from("packs"));
    }

    #[test]
    fn rooted_rebases_relative_paths_only() {
        let base = Path::new("/srv/evp");
        let mut cfg = AppConfig::default();
        cfg.log_dir = Some(PathBuf::from("/var/log/evp"));
        let cfg = cfg.rooted(base);
        assert_eq!(cfg.packs_dir, base.join("packs"));
        assert_eq!(cfg.source_dirs[0], base.join("data").join("uploads"));
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/var/log/evp")));
    }

    #[test]
    fn broken_redaction_config_is_empty_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("redaction.yaml");
        fs::write(&p, "patterns: [unterminated").unwrap();
        assert_eq!(RedactionConfig::load(&p), RedactionConfig::default());
    }

    #[test]
    fn merged_patterns_are_sorted_and_unique() {
        let cfg = RedactionConfig {
            mode: None,
            patterns: vec!["b".into(), "a".into()],
            regions: vec![],
        };
        assert_eq!(
            cfg.merged_patterns(&["a".to_string(), "c".to_string()]),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
