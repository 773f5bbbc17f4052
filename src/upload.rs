//! Remote log mirroring over ssh/scp.
//!
//! This is a thin boundary: given named local files, push each to the
//! configured remote directory with key-based auth. Failures are reported
//! per file and never affect the monitoring cadence.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use crate::config::RemoteSection;

/// Upload error types.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to execute {0}: {1}")]
    Spawn(&'static str, std::io::Error),
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: &'static str,
        status: String,
        stderr: String,
    },
}

/// Copies files to `user@host:remote_dir` using the system ssh/scp.
pub struct Uploader {
    hostname: String,
    username: String,
    key_file: PathBuf,
    remote_directory: String,
    port: u16,
}

impl Uploader {
    pub fn new(remote: &RemoteSection) -> Self {
        Self {
            hostname: remote.hostname.clone(),
            username: remote.username.clone(),
            key_file: expand_home(&remote.key_file),
            remote_directory: remote.remote_directory.clone(),
            port: remote.port,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }

    async fn run(&self, program: &'static str, args: &[String]) -> Result<(), UploadError> {
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| UploadError::Spawn(program, e))?;

        if !output.status.success() {
            return Err(UploadError::Failed {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn ensure_remote_dir(&self) -> Result<(), UploadError> {
        let args = vec![
            "-i".to_string(),
            self.key_file.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.destination(),
            format!("mkdir -p {}", self.remote_directory),
        ];
        self.run("ssh", &args).await
    }

    async fn copy_file(&self, file: &Path) -> Result<(), UploadError> {
        let args = vec![
            "-i".to_string(),
            self.key_file.display().to_string(),
            "-P".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            file.display().to_string(),
            format!("{}:{}/", self.destination(), self.remote_directory),
        ];
        self.run("scp", &args).await
    }

    /// Copy each existing file to the remote directory, returning the
    /// per-file outcome. Files that do not exist locally yet are skipped.
    pub async fn upload(
        &self,
        files: &[PathBuf],
    ) -> Result<Vec<(PathBuf, Result<(), UploadError>)>, UploadError> {
        tracing::info!(
            "uploading logs to {}:{}",
            self.destination(),
            self.remote_directory
        );

        self.ensure_remote_dir().await?;

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            if !file.exists() {
                tracing::debug!("{} not found locally, skipping", file.display());
                continue;
            }

            let outcome = self.copy_file(file).await;
            match &outcome {
                Ok(()) => tracing::debug!("uploaded {}", file.display()),
                Err(e) => tracing::error!("upload of {} failed: {}", file.display(), e),
            }
            results.push((file.clone(), outcome));
        }

        Ok(results)
    }
}

/// Expand a leading `~/` against $HOME; ssh key paths are usually written
/// that way in the config file.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_paths_expand_against_home() {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        std::env::set_var("HOME", &home);

        let expanded = expand_home(Path::new("~/.ssh/id_rsa"));
        assert_eq!(expanded, PathBuf::from(&home).join(".ssh/id_rsa"));

        let absolute = expand_home(Path::new("/etc/keys/id_rsa"));
        assert_eq!(absolute, PathBuf::from("/etc/keys/id_rsa"));
    }

    #[test]
    fn destination_formats_user_at_host() {
        let uploader = Uploader::new(&RemoteSection {
            enabled: true,
            hostname: "vps.example.net".to_string(),
            username: "monitor".to_string(),
            key_file: PathBuf::from("/tmp/key"),
            remote_directory: "/opt/internet-monitor".to_string(),
            port: 2222,
        });
        assert_eq!(uploader.destination(), "monitor@vps.example.net");
        assert_eq!(uploader.port, 2222);
    }
}
