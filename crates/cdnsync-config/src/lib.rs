pub mod annotations;
pub mod config;
pub mod error;

#[cfg(test)]
pub mod test_utils;

pub use config::{
    config_path, generate_default_config, AuditConfig, Config, KvBackendKind, KvConfig,
    NamespaceIds, NpmConfig, OptimizeConfig, SandboxConfig, SandboxKind, SearchConfig,
};
pub use error::{ConfigError, Result};
