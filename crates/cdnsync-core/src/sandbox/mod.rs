//! Isolation for the third-party optimizers run on untrusted package files.

mod container;
mod landlock;

use std::{
    fs,
    path::{Path, PathBuf},
};

use cdnsync_config::{OptimizeConfig, SandboxConfig, SandboxKind};
use cdnsync_utils::fs::{copy_file, list_files, safe_remove, to_slash_path};
use tracing::{debug, warn};

pub use self::{
    container::ContainerSandbox,
    landlock::{is_landlock_supported, RestrictedCommand},
};
use crate::{
    error::{CoreResult, ErrorContext},
    message::StageMessage,
    optimize::{plan, OptimizeJob},
};

/// What the optimizer did to one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Files written or re-encoded by an optimizer.
    pub optimized: Vec<String>,
    /// Inputs whose optimizer failed, with the reason. These are published
    /// unoptimized.
    pub failed: Vec<(String, String)>,
}

/// Produces the optimized file set of a staged version in `output`.
///
/// `input` must be left untouched. An `Err` means the version cannot be
/// published; failures of individual files are reported in
/// [`OptimizeReport::failed`] instead.
pub trait Sandbox: Send + Sync {
    fn name(&self) -> &'static str;

    fn optimize(
        &self,
        message: &StageMessage,
        input: &Path,
        output: &Path,
    ) -> CoreResult<OptimizeReport>;
}

pub fn from_config(sandbox: &SandboxConfig, commands: &OptimizeConfig) -> Box<dyn Sandbox> {
    match sandbox.kind {
        SandboxKind::Container => {
            Box::new(ContainerSandbox::new(&sandbox.runtime, &sandbox.image))
        }
        SandboxKind::Landlock => Box::new(LocalSandbox::new(commands.clone(), true)),
        SandboxKind::Disabled => Box::new(LocalSandbox::new(commands.clone(), false)),
    }
}

pub(crate) fn relative_files(root: &Path) -> CoreResult<Vec<String>> {
    Ok(list_files(root)?.iter().map(to_slash_path).collect())
}

/// Splits a command template into arguments and substitutes the
/// `{input}`/`{output}` placeholders in each.
pub fn render_command(template: &str, input: &Path, output: &Path) -> Vec<String> {
    let input = input.display().to_string();
    let output = output.display().to_string();
    template
        .split_whitespace()
        .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
        .collect()
}

/// Scratch name used while re-encoding a file in place.
fn scratch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".cdnsync-{name}"))
}

/// Runs optimizer commands on the host, confined with Landlock unless
/// disabled.
pub struct LocalSandbox {
    commands: OptimizeConfig,
    restricted: bool,
}

impl LocalSandbox {
    pub fn new(commands: OptimizeConfig, restricted: bool) -> Self {
        Self {
            commands,
            restricted,
        }
    }

    fn run_job(&self, job: &OptimizeJob, output: &Path) -> Result<(), String> {
        let template = job.kind.template(&self.commands);
        let source = output.join(&job.input);
        let target = if job.kind.in_place() {
            scratch_path(&output.join(&job.output))
        } else {
            output.join(&job.output)
        };

        let argv = render_command(template, &source, &target);
        let Some((program, args)) = argv.split_first() else {
            return Err(format!("no {} optimizer configured", job.kind));
        };

        let mut cmd = RestrictedCommand::new(program.as_str())
            .args(args.iter().cloned())
            .working_dir(output)
            .write_path(output);
        if !self.restricted {
            cmd = cmd.unrestricted();
        }

        let result = cmd.output().map_err(|err| err.to_string())?;
        if !result.status.success() {
            let _ = safe_remove(&target);
            return Err(format!(
                "{program} exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        if !target.is_file() {
            return Err(format!("{program} produced no output"));
        }

        if job.kind.in_place() {
            fs::rename(&target, &source).map_err(|err| {
                let _ = safe_remove(&target);
                err.to_string()
            })?;
        }
        Ok(())
    }
}

impl Sandbox for LocalSandbox {
    fn name(&self) -> &'static str {
        if self.restricted {
            "landlock"
        } else {
            "disabled"
        }
    }

    fn optimize(
        &self,
        message: &StageMessage,
        input: &Path,
        output: &Path,
    ) -> CoreResult<OptimizeReport> {
        let flags = message.package_document()?.optimization();
        let files = relative_files(input)?;
        for file in &files {
            copy_file(input.join(file), output.join(file))?;
        }

        let mut report = OptimizeReport::default();
        for job in plan(&files, &flags) {
            if job.kind.template(&self.commands).trim().is_empty() {
                debug!("no {} optimizer configured, skipping {}", job.kind, job.input);
                continue;
            }
            match self.run_job(&job, output) {
                Ok(()) => report.optimized.push(job.output),
                Err(reason) => {
                    warn!(
                        "{}@{}: failed to optimize {}: {reason}",
                        message.package, message.version, job.input
                    );
                    report.failed.push((job.input, reason));
                }
            }
        }

        Ok(report)
    }
}

/// Removes and recreates the sandbox output directory.
pub fn prepare_output(output: &Path) -> CoreResult<()> {
    safe_remove(output)?;
    fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))
}
