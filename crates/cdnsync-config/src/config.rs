use std::{
    fs,
    path::{Path, PathBuf},
};

use cdnsync_utils::path::{resolve_path, xdg_cache_home, xdg_config_home};
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::{
    annotations::{annotate_section, annotate_toml_table},
    error::{ConfigError, Result},
};

/// Which KV store implementation receives metadata writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackendKind {
    #[default]
    Cloudflare,
    Memory,
}

/// How the optimization step is isolated from the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    #[default]
    Container,
    Landlock,
    Disabled,
}

/// cdnsync configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct Config {
    /// Directory containing one `<name>.json` document per tracked package.
    /// Default: $XDG_CONFIG_HOME/cdnsync/packages
    pub packages_path: String,

    /// Working directory for downloaded tarballs, staged versions and git mirrors.
    /// Default: $XDG_CACHE_HOME/cdnsync
    pub cache_path: String,

    /// Number of most recent versions imported for a package with no published history.
    /// Default: 10
    pub max_initial_versions: usize,

    /// Number of compression workers. 0 uses the available CPU count.
    /// Default: 0
    pub workers: usize,

    /// KV metadata store
    pub kv: KvConfig,

    /// npm registry access
    pub npm: NpmConfig,

    /// Isolation for the optimization step
    pub sandbox: SandboxConfig,

    /// Optimizer command lines. `{input}` and `{output}` are replaced with file paths.
    pub optimize: OptimizeConfig,

    /// Audit trail
    pub audit: AuditConfig,

    /// Search index sync
    pub search: SearchConfig,
}

/// KV metadata store
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct KvConfig {
    /// Store implementation: "cloudflare" or "memory".
    pub backend: KvBackendKind,

    /// Cloudflare account that owns the namespaces.
    pub account_id: String,

    /// Base URL of the Cloudflare API.
    pub api_url: String,

    /// Environment variable holding the API token.
    pub api_token_env: String,

    /// Attempts made for a read that fails with a service error.
    /// Default: 5
    pub read_attempts: u32,

    /// Maximum records sent in a single bulk write request.
    /// Default: 10000
    pub bulk_chunk_size: usize,

    /// Namespace identifiers
    pub namespaces: NamespaceIds,
}

/// Namespace identifiers
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct NamespaceIds {
    /// Namespace holding package records.
    pub packages: String,

    /// Namespace holding per-version file lists.
    pub versions: String,

    /// Namespace holding file contents.
    pub files: String,

    /// Namespace holding aggregated per-package asset lists.
    pub aggregated: String,

    /// Namespace holding integrity hashes.
    pub sri: String,
}

/// npm registry access
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct NpmConfig {
    /// Registry base URL.
    pub registry: String,
}

/// Isolation for the optimization step
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct SandboxConfig {
    /// "container", "landlock" or "disabled".
    pub kind: SandboxKind,

    /// Container runtime binary.
    pub runtime: String,

    /// Image run by the container sandbox.
    pub image: String,
}

/// Optimizer command lines
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct OptimizeConfig {
    /// JavaScript minifier.
    pub js: String,

    /// CSS minifier.
    pub css: String,

    /// Lossless PNG re-encoder.
    pub png: String,

    /// Lossless JPEG re-encoder.
    pub jpg: String,
}

/// Audit trail
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct AuditConfig {
    /// Root of the mounted audit bucket. Auditing is disabled when unset.
    pub path: Option<String>,
}

/// Search index sync
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct SearchConfig {
    /// Algolia application id. Search sync is disabled when unset.
    pub app_id: Option<String>,

    /// Environment variable holding the Algolia admin key.
    pub api_key_env: String,

    /// Index receiving package entries.
    pub index: String,

    /// Environment variable holding a GitHub token for repository stats.
    pub github_token_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packages_path: format!("{}/cdnsync/packages", xdg_config_home().display()),
            cache_path: format!("{}/cdnsync", xdg_cache_home().display()),
            max_initial_versions: 10,
            workers: 0,
            kv: KvConfig::default(),
            npm: NpmConfig::default(),
            sandbox: SandboxConfig::default(),
            optimize: OptimizeConfig::default(),
            audit: AuditConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: KvBackendKind::Cloudflare,
            account_id: String::new(),
            api_url: "https://api.cloudflare.com/client/v4".to_string(),
            api_token_env: "CLOUDFLARE_API_TOKEN".to_string(),
            read_attempts: 5,
            bulk_chunk_size: 10_000,
            namespaces: NamespaceIds::default(),
        }
    }
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            registry: "https://registry.npmjs.org".to_string(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            kind: SandboxKind::Container,
            runtime: "docker".to_string(),
            image: "ghcr.io/cdnsync/optimize:latest".to_string(),
        }
    }
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            js: "terser {input} --compress --mangle --output {output}".to_string(),
            css: "cleancss -O1 -o {output} {input}".to_string(),
            png: "zopflipng -y {input} {output}".to_string(),
            jpg: "jpegtran -optimize -copy all -outfile {output} {input}".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            api_key_env: "ALGOLIA_API_KEY".to_string(),
            index: "libraries".to_string(),
            github_token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

/// Location of the configuration file: `CDNSYNC_CONFIG`, or
/// `$XDG_CONFIG_HOME/cdnsync/config.toml`.
pub fn config_path() -> PathBuf {
    match std::env::var("CDNSYNC_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => xdg_config_home().join("cdnsync").join("config.toml"),
    }
}

impl Config {
    /// Loads the configuration from `path`, or from [`config_path`].
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);

        let mut config: Config = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Config::default()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn resolve(&mut self) -> Result<()> {
        if self.max_initial_versions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_initial_versions",
                reason: "must be at least 1".into(),
            });
        }
        if self.kv.read_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "kv.read_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.kv.bulk_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "kv.bulk_chunk_size",
                reason: "must be at least 1".into(),
            });
        }
        self.npm.registry = self.npm.registry.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Fails unless every Cloudflare setting needed for live writes is present.
    pub fn require_cloudflare(&self) -> Result<()> {
        if self.kv.account_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "kv.account_id",
                reason: "required for the cloudflare backend".into(),
            });
        }
        let ns = &self.kv.namespaces;
        for (field, id) in [
            ("kv.namespaces.packages", &ns.packages),
            ("kv.namespaces.versions", &ns.versions),
            ("kv.namespaces.files", &ns.files),
            ("kv.namespaces.aggregated", &ns.aggregated),
            ("kv.namespaces.sri", &ns.sri),
        ] {
            if id.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "namespace id is required for the cloudflare backend".into(),
                });
            }
        }
        Ok(())
    }

    pub fn get_packages_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("CDNSYNC_PACKAGES") {
            return Ok(resolve_path(&env_path)?);
        }
        Ok(resolve_path(&self.packages_path)?)
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("CDNSYNC_CACHE") {
            return Ok(resolve_path(&env_path)?);
        }
        Ok(resolve_path(&self.cache_path)?)
    }

    pub fn get_audit_path(&self) -> Result<Option<PathBuf>> {
        match &self.audit.path {
            Some(path) => Ok(Some(resolve_path(path)?)),
            None => Ok(None),
        }
    }

    /// Effective compression worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn kv_api_token(&self) -> Result<String> {
        read_secret(&self.kv.api_token_env)
    }

    pub fn search_api_key(&self) -> Result<String> {
        read_secret(&self.search.api_key_env)
    }

    /// GitHub token, if one is configured in the environment.
    pub fn github_token(&self) -> Option<String> {
        read_secret(&self.search.github_token_env).ok()
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        let root = doc.as_table_mut();
        annotate_toml_table::<Config>(root, true)?;
        annotate_section::<KvConfig>(root, "kv")?;
        if let Some(kv) = root.get_mut("kv").and_then(|i| i.as_table_mut()) {
            annotate_section::<NamespaceIds>(kv, "namespaces")?;
        }
        annotate_section::<NpmConfig>(root, "npm")?;
        annotate_section::<SandboxConfig>(root, "sandbox")?;
        annotate_section::<OptimizeConfig>(root, "optimize")?;
        annotate_section::<AuditConfig>(root, "audit")?;
        annotate_section::<SearchConfig>(root, "search")?;

        Ok(doc)
    }
}

fn read_secret(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(var.to_string()))
}

/// Writes an annotated default configuration to `path`, or [`config_path`].
pub fn generate_default_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);

    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists(path.display().to_string()));
    }

    let annotated_doc = Config::default().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(path)
}
