//! Landlock confinement for optimizer processes.
//!
//! Landlock lets an unprivileged process restrict its own filesystem and,
//! from ABI v4, network access. Restrictions are applied in the child between
//! fork and exec, so the pipeline process itself is never confined.

use std::{
    os::unix::process::CommandExt as _,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use landlock::{
    Access as _, AccessFs, AccessNet, BitFlags, PathBeneath, PathFd, Ruleset, RulesetAttr as _,
    RulesetCreatedAttr as _, ABI,
};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

pub fn is_landlock_supported() -> bool {
    match Ruleset::default().handle_access(AccessFs::from_all(ABI::V1)) {
        Ok(_) => true,
        Err(e) => {
            debug!("Landlock not supported: {}", e);
            false
        }
    }
}

fn get_best_abi() -> ABI {
    for abi in [ABI::V5, ABI::V4, ABI::V3, ABI::V2, ABI::V1] {
        if Ruleset::default()
            .handle_access(AccessFs::from_all(abi))
            .is_ok()
        {
            return abi;
        }
    }
    ABI::V1
}

fn is_network_supported(abi: ABI) -> bool {
    matches!(abi, ABI::V4 | ABI::V5)
}

/// Toolchain locations optimizers need to start.
fn default_read_paths() -> Vec<PathBuf> {
    [
        "/usr",
        "/lib",
        "/lib64",
        "/bin",
        "/sbin",
        "/opt",
        "/etc/ld.so.cache",
        "/etc/ld.so.conf",
        "/etc/ld.so.conf.d",
        "/etc/passwd",
        "/etc/group",
        "/etc/localtime",
        "/proc",
        "/sys",
        "/dev/null",
        "/dev/zero",
        "/dev/urandom",
        "/dev/random",
        "/dev/fd",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

fn default_write_paths() -> Vec<PathBuf> {
    ["/dev/null", "/dev/stdout", "/dev/stderr", "/dev/fd", "/tmp"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

fn add_path_rules(
    ruleset: landlock::RulesetCreated,
    paths: &[PathBuf],
    access: BitFlags<AccessFs>,
) -> CoreResult<landlock::RulesetCreated> {
    let mut current_ruleset = ruleset;

    for path in paths {
        if !path.exists() {
            continue;
        }

        match PathFd::new(path) {
            Ok(fd) => {
                current_ruleset = current_ruleset
                    .add_rule(PathBeneath::new(fd, access))
                    .map_err(|e| {
                        CoreError::SandboxPathRule {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        }
                    })?;
            }
            Err(e) => {
                warn!(
                    "Failed to open path for sandbox rule: {} ({})",
                    path.display(),
                    e
                );
            }
        }
    }

    Ok(current_ruleset)
}

/// Confines the calling process. Network access is handled without any port
/// rule, which denies every TCP bind and connect where the ABI supports it.
fn apply_landlock_restrictions(
    read_paths: &[PathBuf],
    write_paths: &[PathBuf],
) -> std::io::Result<()> {
    let abi = get_best_abi();
    let read_access = AccessFs::from_read(abi);
    let write_access = AccessFs::from_all(abi);

    let ruleset_builder = Ruleset::default()
        .handle_access(AccessFs::from_all(abi))
        .map_err(|e| std::io::Error::other(format!("Landlock FS access setup failed: {}", e)))?;

    let ruleset_builder = if is_network_supported(abi) {
        ruleset_builder
            .handle_access(AccessNet::from_all(abi))
            .map_err(|e| {
                std::io::Error::other(format!("Landlock network access setup failed: {}", e))
            })?
    } else {
        ruleset_builder
    };

    let ruleset = ruleset_builder
        .create()
        .map_err(|e| std::io::Error::other(format!("Landlock ruleset creation failed: {}", e)))?;

    let ruleset = add_path_rules(ruleset, read_paths, read_access)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let ruleset = add_path_rules(ruleset, write_paths, write_access)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    ruleset
        .restrict_self()
        .map_err(|e| std::io::Error::other(format!("Failed to enforce Landlock: {}", e)))?;

    Ok(())
}

/// Builder for an optimizer process with restricted filesystem access.
///
/// The program is executed directly, never through a shell, so file names
/// are passed as single arguments.
pub struct RestrictedCommand {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    read_paths: Vec<PathBuf>,
    write_paths: Vec<PathBuf>,
    restricted: bool,
}

impl RestrictedCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("/"),
            read_paths: Vec::new(),
            write_paths: Vec::new(),
            restricted: true,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn read_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.read_paths.push(path.into());
        self
    }

    /// Add an extra writable path (also grants read access).
    pub fn write_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.write_paths.push(path.into());
        self
    }

    /// Run without confinement.
    pub fn unrestricted(mut self) -> Self {
        self.restricted = false;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the command to completion, capturing its output.
    pub fn output(self) -> CoreResult<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.working_dir);

        if !self.restricted {
            return cmd
                .output()
                .map_err(|e| CoreError::SandboxExecution(format!("{}: {e}", self.program)));
        }

        if !is_landlock_supported() {
            warn!("Landlock not supported, running {} without sandbox", self.program);
            return cmd
                .output()
                .map_err(|e| CoreError::SandboxExecution(format!("{}: {e}", self.program)));
        }

        // Everything the child needs is allocated before fork.
        let mut read_paths = default_read_paths();
        read_paths.extend(self.read_paths);
        if let Some(dir) = resolve_program_dir(&self.program) {
            read_paths.push(dir);
        }

        let mut write_paths = default_write_paths();
        write_paths.extend(self.write_paths);

        // SAFETY: `pre_exec` runs in the forked child process after fork() but before exec().
        unsafe {
            cmd.pre_exec(move || apply_landlock_restrictions(&read_paths, &write_paths));
        }

        cmd.output()
            .map_err(|e| CoreError::SandboxExecution(format!("{}: {e}", self.program)))
    }
}

/// Directory of an explicitly pathed program, so it stays executable once
/// confined.
fn resolve_program_dir(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        path.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_program_dir() {
        assert_eq!(
            resolve_program_dir("/opt/tools/bin/terser"),
            Some(PathBuf::from("/opt/tools/bin"))
        );
        assert_eq!(resolve_program_dir("terser"), None);
    }

    #[test]
    fn test_unrestricted_captures_output() {
        let output = RestrictedCommand::new("sh")
            .args(["-c", "printf hello"])
            .unrestricted()
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn test_missing_program() {
        let result = RestrictedCommand::new("cdnsync-definitely-missing-binary")
            .unrestricted()
            .output();
        assert!(matches!(result, Err(CoreError::SandboxExecution(_))));
    }
}
