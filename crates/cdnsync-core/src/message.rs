//! Hand-off records between staging and the optimization sandbox.

use std::{collections::BTreeMap, fs, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cdnsync_package::Package;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult, ErrorContext};

pub const MESSAGE_FILE: &str = "message.json";
pub const UPLOAD_METADATA_FILE: &str = "upload-metadata.json";

/// Describes one staged version to the processing step.
///
/// The package document travels with the message as an opaque blob, so the
/// processing step never looks it up separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMessage {
    /// Where processed output is delivered.
    #[serde(rename = "outgoingSignedURL")]
    pub outgoing_signed_url: String,
    /// Location of the staged files.
    pub tar: String,
    pub package: String,
    pub version: String,
    pub config: Value,
}

impl StageMessage {
    pub fn new(
        package: &Package,
        version: impl Into<String>,
        staged: &Path,
        output: &Path,
    ) -> CoreResult<Self> {
        let config = serde_json::to_value(package)
            .map_err(|err| CoreError::InvalidMessage(err.to_string()))?;
        Ok(Self {
            outgoing_signed_url: format!("file://{}", output.display()),
            tar: staged.display().to_string(),
            package: package.name.clone(),
            version: version.into(),
            config,
        })
    }

    /// The package document carried in `config`.
    pub fn package_document(&self) -> CoreResult<Package> {
        serde_json::from_value(self.config.clone()).map_err(|err| {
            CoreError::InvalidMessage(format!("config of {}@{}: {err}", self.package, self.version))
        })
    }

    pub fn write(&self, path: &Path) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| CoreError::InvalidMessage(err.to_string()))?;
        fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
    }

    pub fn read(path: &Path) -> CoreResult<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| CoreError::InvalidMessage(format!("{}: {err}", path.display())))
    }
}

/// Metadata attached to an uploaded staging artifact. Values must be plain
/// header-safe strings, so the package document is base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub package: String,
    pub version: String,
    pub config: String,
}

impl UploadMetadata {
    pub fn from_message(message: &StageMessage) -> CoreResult<Self> {
        let json = serde_json::to_vec(&message.config)
            .map_err(|err| CoreError::InvalidMessage(err.to_string()))?;
        Ok(Self {
            package: message.package.clone(),
            version: message.version.clone(),
            config: STANDARD.encode(json),
        })
    }

    pub fn decode_config(&self) -> CoreResult<Package> {
        let json = STANDARD
            .decode(&self.config)
            .map_err(|err| CoreError::InvalidMessage(format!("upload metadata: {err}")))?;
        Package::from_slice(&json).map_err(CoreError::from)
    }

    pub fn to_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("package".to_string(), self.package.clone()),
            ("version".to_string(), self.version.clone()),
            ("config".to_string(), self.config.clone()),
        ])
    }

    pub fn write(&self, path: &Path) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.to_headers())
            .map_err(|err| CoreError::InvalidMessage(err.to_string()))?;
        fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
    }
}
