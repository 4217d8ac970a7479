use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};

/// Runs the toolchain's codegen and build steps for one entry file.
///
/// Codegen failures are reported and skipped; build failures abort the
/// cycle. The toolchain program defaults to `go` and is overridable so
/// tests can substitute a stub.
pub struct BuildPipeline {
    toolchain: String,
    entry: PathBuf,
    output: PathBuf,
}

impl BuildPipeline {
    pub fn new(entry: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            toolchain: "go".to_string(),
            entry: entry.into(),
            output: output.into(),
        }
    }

    pub fn with_toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.toolchain = toolchain.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Best-effort codegen pass over the entry file.
    pub fn generate(&self) {
        let mut command = Command::new(&self.toolchain);
        command.arg("generate").arg(&self.entry);
        if let Err(err) = run_build_command(&mut command, &self.command_line("generate")) {
            eprintln!("code generation failed, continuing: {err:#}");
        }
    }

    /// Compiles the entry file into the output artifact and marks it
    /// executable. Build tools do not guarantee the permission bit when
    /// the output path already exists.
    pub fn compile(&self) -> Result<()> {
        let mut command = Command::new(&self.toolchain);
        command
            .arg("build")
            .arg("-o")
            .arg(&self.output)
            .arg(&self.entry);
        run_build_command(&mut command, &self.command_line("build"))?;
        mark_executable(&self.output)
    }

    fn command_line(&self, verb: &str) -> String {
        match verb {
            "build" => format!(
                "{} build -o {} {}",
                self.toolchain,
                self.output.display(),
                self.entry.display()
            ),
            _ => format!("{} {verb} {}", self.toolchain, self.entry.display()),
        }
    }
}

fn run_build_command(command: &mut Command, command_line: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("command failed to start: {command_line}"))?;
    if output.status.success() {
        return Ok(());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!(
        "command failed: {command_line}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to stat build output {}", path.display()))?;
    let mut perms = metadata.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(path: &Path) -> Result<()> {
    fs::metadata(path)
        .map(|_| ())
        .with_context(|| format!("failed to stat build output {}", path.display()))
}
