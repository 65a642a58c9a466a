//! Firmware flashing for the RP2040 co-processor.
//!
//! The board is wiped with the flash-nuke image, MicroPython is flashed, then
//! the application files are pushed over the UART with `ampy`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

use crate::config::FirmwareSection;
use crate::orchestrator::{FirmwareUploader, UploadReport};

/// Why a flash run stopped.
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("No RPI-RP2 volume found")]
    NoVolume,

    #[error("Failed to copy {image} to {volume}: {reason}")]
    CopyFailed {
        image: String,
        volume: PathBuf,
        reason: String,
    },

    #[error("Device did not disappear after flash nuke")]
    DidNotDisappear,

    #[error("Device did not reappear after flash nuke")]
    DidNotReappear,

    #[error("No UART port found matching {0}")]
    NoUartPort(String),

    #[error("Failed to upload {file}: {detail}")]
    UploadFailed { file: String, detail: String },
}

pub struct Uf2Uploader {
    settings: FirmwareSection,
    uf2_dir: PathBuf,
    files_dir: PathBuf,
}

impl Uf2Uploader {
    /// `uf2_dir` and `files_dir` are the resolved image and application directories.
    pub fn new(settings: FirmwareSection, uf2_dir: PathBuf, files_dir: PathBuf) -> Self {
        Self {
            settings,
            uf2_dir,
            files_dir,
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings.poll_interval_ms.max(1))
    }

    /// First configured volume that carries the bootloader marker.
    fn mounted_volume(&self) -> Option<PathBuf> {
        self.settings
            .volume_paths
            .iter()
            .find(|v| v.join(&self.settings.info_marker).exists())
            .cloned()
    }

    async fn wait_for_volume(&self, limit: Duration) -> Option<PathBuf> {
        let start = Instant::now();
        loop {
            if let Some(volume) = self.mounted_volume() {
                tracing::debug!(volume = %volume.display(), "bootloader volume found");
                return Some(volume);
            }
            if start.elapsed() >= limit {
                return None;
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    async fn wait_for_unmount(&self, limit: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.mounted_volume().is_none() {
                return true;
            }
            if start.elapsed() >= limit {
                return false;
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    async fn copy_image(&self, image: &str, volume: &Path) -> Result<(), FlashError> {
        let source = self.uf2_dir.join(image);
        tracing::info!(image, volume = %volume.display(), "flashing uf2 image");
        tokio::fs::copy(&source, volume.join(image))
            .await
            .map(|_| ())
            .map_err(|e| FlashError::CopyFailed {
                image: image.to_string(),
                volume: volume.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn find_uart_port(&self) -> Result<PathBuf, FlashError> {
        let no_port = || FlashError::NoUartPort(self.settings.uart_glob.clone());
        let mut ports: Vec<PathBuf> = glob::glob(&self.settings.uart_glob)
            .map_err(|_| no_port())?
            .filter_map(|entry| entry.ok())
            .collect();
        ports.sort();
        ports.into_iter().next().ok_or_else(no_port)
    }

    async fn put_file(&self, port: &Path, file: &str) -> Result<(), FlashError> {
        let path = self.files_dir.join(file);
        let failed = |detail: String| FlashError::UploadFailed {
            file: file.to_string(),
            detail,
        };

        let child = Command::new(&self.settings.ampy_cmd)
            .arg("--port")
            .arg(port)
            .arg("put")
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("failed to spawn {}: {}", self.settings.ampy_cmd, e)))?;

        let limit = Duration::from_secs(self.settings.file_timeout_secs);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| failed(e.to_string()))?,
            Err(_) => return Err(failed(format!("timed out after {}s", limit.as_secs()))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(stderr.trim().to_string()));
        }
        Ok(())
    }

    /// Run the full wipe, flash and upload sequence.
    pub async fn flash(&self) -> Result<String, FlashError> {
        let mount_limit = Duration::from_secs(self.settings.mount_timeout_secs);
        let unmount_limit = Duration::from_secs(self.settings.unmount_timeout_secs);

        let volume = self
            .wait_for_volume(mount_limit)
            .await
            .ok_or(FlashError::NoVolume)?;
        self.copy_image(&self.settings.nuke_image, &volume).await?;

        if !self.wait_for_unmount(unmount_limit).await {
            return Err(FlashError::DidNotDisappear);
        }
        tokio::time::sleep(Duration::from_secs(self.settings.reappear_delay_secs)).await;

        let volume = self
            .wait_for_volume(mount_limit)
            .await
            .ok_or(FlashError::DidNotReappear)?;
        self.copy_image(&self.settings.micropython_image, &volume)
            .await?;

        if !self.wait_for_unmount(unmount_limit).await {
            tracing::warn!("bootloader volume still mounted after flashing MicroPython");
        }
        tokio::time::sleep(Duration::from_secs(self.settings.settle_delay_secs)).await;

        let port = self.find_uart_port()?;
        tracing::info!(port = %port.display(), "using uart port");

        let total = self.settings.files.len();
        let mut uploaded = 0;
        for (i, file) in self.settings.files.iter().enumerate() {
            if !self.files_dir.join(file).exists() {
                tracing::warn!(file = %file, "file not found, skipping");
                continue;
            }
            tracing::info!(file = %file, "uploading {}/{}", i + 1, total);
            self.put_file(&port, file).await?;
            uploaded += 1;
        }

        Ok(if uploaded == total {
            "All files uploaded successfully".to_string()
        } else {
            format!("Uploaded {} of {} files ({} missing)", uploaded, total, total - uploaded)
        })
    }
}

#[async_trait]
impl FirmwareUploader for Uf2Uploader {
    async fn upload(&self) -> UploadReport {
        match self.flash().await {
            Ok(message) => UploadReport::ok(message),
            Err(e) => {
                tracing::warn!(error = %e, "firmware upload failed");
                UploadReport::failed(e.to_string())
            }
        }
    }
}
