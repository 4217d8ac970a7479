use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use skm_core::layout::ARCHIVE_NAME;
use skm_core::release_url;

/// Fetches and unpacks a release archive into a target directory.
///
/// The update engine talks to this seam only, so tests can drive the
/// engine with a fake fetcher and never touch the network.
pub trait ReleaseFetcher {
    fn fetch_release(&self, version: &str, dest: &Path) -> Result<()>;
}

/// Downloads the release archive over HTTP and unpacks it, shelling out
/// to whatever transfer and archive tools the host has.
pub struct HttpReleaseFetcher;

impl ReleaseFetcher for HttpReleaseFetcher {
    fn fetch_release(&self, version: &str, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;

        let url = release_url(version);
        let archive_path = dest.join(ARCHIVE_NAME);
        if let Err(err) = download_file(&url, &archive_path) {
            let _ = fs::remove_file(&archive_path);
            return Err(err).with_context(|| format!("failed to download release: {url}"));
        }

        if let Err(err) = extract_zip(&archive_path, dest) {
            let _ = fs::remove_file(&archive_path);
            return Err(err)
                .with_context(|| format!("failed to unpack release archive: {url}"));
        }

        fs::remove_file(&archive_path).with_context(|| {
            format!(
                "failed to remove release archive after unpack: {}",
                archive_path.display()
            )
        })?;
        Ok(())
    }
}

/// Downloads into a `.part` file first and renames into place so an
/// interrupted transfer never leaves a plausible-looking archive behind.
pub fn download_file(url: &str, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut part_path = out_path.as_os_str().to_os_string();
    part_path.push(".part");
    let part_path = std::path::PathBuf::from(part_path);
    let _ = fs::remove_file(&part_path);

    let downloaded = if cfg!(windows) {
        download_with_powershell(url, &part_path)
    } else {
        download_with_curl(url, &part_path).or_else(|_| download_with_wget(url, &part_path))
    };
    if let Err(err) = downloaded {
        let _ = fs::remove_file(&part_path);
        return Err(err);
    }

    fs::rename(&part_path, out_path).with_context(|| {
        format!(
            "failed to move downloaded file into place: {}",
            out_path.display()
        )
    })?;
    Ok(())
}

fn download_with_curl(url: &str, out_path: &Path) -> Result<()> {
    let mut command = Command::new("curl");
    command
        .arg("-fsSL")
        .arg("--retry")
        .arg("2")
        .arg("-o")
        .arg(out_path)
        .arg(url);
    run_command(&mut command, "curl download failed")
}

fn download_with_wget(url: &str, out_path: &Path) -> Result<()> {
    let mut command = Command::new("wget");
    command.arg("-q").arg("-O").arg(out_path).arg(url);
    run_command(&mut command, "wget download failed")
}

fn download_with_powershell(url: &str, out_path: &Path) -> Result<()> {
    let mut command = Command::new("powershell");
    command.arg("-NoProfile").arg("-Command").arg(format!(
        "Invoke-WebRequest -Uri '{}' -OutFile '{}'",
        url.replace('\'', "''"),
        escape_ps_single_quote(out_path)
    ));
    run_command(&mut command, "powershell download failed")
}

pub fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            escape_ps_single_quote(archive_path),
            escape_ps_single_quote(dst)
        ));
        if run_command(&mut command, "failed to extract zip archive with powershell").is_ok() {
            return Ok(());
        }
    }

    let mut unzip_command = Command::new("unzip");
    unzip_command.arg("-qo").arg(archive_path).arg("-d").arg(dst);
    if run_command(&mut unzip_command, "failed to extract zip archive with unzip").is_ok() {
        return Ok(());
    }

    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(dst),
        "failed to extract zip archive with tar fallback",
    )
}

fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

fn escape_ps_single_quote(path: &Path) -> String {
    let mut os = OsString::new();
    os.push(path.as_os_str());
    os.to_string_lossy().replace('\'', "''")
}
