use std::{path::Path, process::Command};

use tracing::{debug, info};

use crate::{
    error::{CoreError, CoreResult},
    message::StageMessage,
    optimize::{plan, OptimizeKind},
    sandbox::{OptimizeReport, Sandbox},
};

/// Runs the optimizer image with no network, the staged files mounted
/// read-only and a writable output mount.
pub struct ContainerSandbox {
    runtime: String,
    image: String,
}

impl ContainerSandbox {
    pub fn new(runtime: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
        }
    }

    /// Arguments passed to the runtime. Only formats the package opted into
    /// are switched on.
    pub fn run_args(
        &self,
        message: &StageMessage,
        input: &Path,
        output: &Path,
    ) -> CoreResult<Vec<String>> {
        let flags = message.package_document()?.optimization();
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--network=none".to_string(),
            "-v".to_string(),
            format!("{}:/input:ro", input.display()),
            "-v".to_string(),
            format!("{}:/output", output.display()),
        ];
        for kind in OptimizeKind::ALL {
            if kind.enabled(&flags) {
                args.push("-e".to_string());
                args.push(format!("{}=1", kind.env_var()));
            }
        }
        args.push(self.image.clone());
        Ok(args)
    }
}

impl Sandbox for ContainerSandbox {
    fn name(&self) -> &'static str {
        "container"
    }

    fn optimize(
        &self,
        message: &StageMessage,
        input: &Path,
        output: &Path,
    ) -> CoreResult<OptimizeReport> {
        let args = self.run_args(message, input, output)?;
        debug!("{} {}", self.runtime, args.join(" "));

        let result = Command::new(&self.runtime)
            .args(&args)
            .output()
            .map_err(|e| CoreError::SandboxExecution(format!("{}: {e}", self.runtime)))?;

        if !result.status.success() {
            return Err(CoreError::SandboxFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let staged = super::relative_files(input)?;
        let flags = message.package_document()?.optimization();
        let optimized = plan(&staged, &flags)
            .into_iter()
            .filter(|job| output.join(&job.output).is_file())
            .map(|job| job.output)
            .collect::<Vec<_>>();
        info!(
            "{}@{}: container optimized {} file(s)",
            message.package,
            message.version,
            optimized.len()
        );

        Ok(OptimizeReport {
            optimized,
            failed: Vec::new(),
        })
    }
}
