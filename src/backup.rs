//! Fixed-path backup archives for configuration, user data, and firmware.
//!
//! Each kind owns exactly one archive under the backup directory; creating a
//! new backup of a kind replaces the previous one atomically (tmp sibling,
//! then rename). Entries are stored relative to the system root so a restore
//! lands on the same paths the backup was taken from.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

use crate::config::WardenConfig;
use crate::errors::WardenError;
use crate::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// System configuration under /etc that hardening rewrites.
    Config,
    /// Home directories.
    User,
    /// Installed firmware files, captured before an update touches them.
    Firmware,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Config => "config",
            BackupKind::User => "user",
            BackupKind::Firmware => "firmware",
        }
    }

    pub fn archive_name(&self) -> String {
        format!("{}-backup.tar.zst", self.as_str())
    }

    fn manifest_name(&self) -> String {
        format!("{}-backup.manifest.json", self.as_str())
    }
}

/// Sidecar written next to each archive, describing what went into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub kind: String,
    pub created_at: String,
    pub sources: Vec<String>,
    pub entries: usize,
}

/// Result of a successful `create_backup`.
#[derive(Debug)]
pub struct Backup {
    pub kind: BackupKind,
    pub archive: PathBuf,
    pub entries: usize,
}

pub struct BackupManager<'a> {
    config: &'a WardenConfig,
}

impl<'a> BackupManager<'a> {
    pub fn new(config: &'a WardenConfig) -> Self {
        Self { config }
    }

    /// Source paths for a kind. Configuration and user sources come from the
    /// config; firmware sources are the currently installed firmware files.
    pub fn sources(&self, kind: BackupKind) -> Vec<PathBuf> {
        match kind {
            BackupKind::Config => self.config.config_backup_sources.clone(),
            BackupKind::User => self.config.user_backup_sources.clone(),
            BackupKind::Firmware => {
                let mut paths: Vec<PathBuf> = self
                    .config
                    .firmware_boot_files
                    .iter()
                    .map(|name| self.config.boot_dir.join(name))
                    .collect();
                paths.extend(
                    self.config
                        .firmware_lib_files
                        .iter()
                        .map(|name| self.config.firmware_lib_dir.join(name)),
                );
                paths
            }
        }
    }

    pub fn archive_path(&self, kind: BackupKind) -> PathBuf {
        self.config.backup_dir.join(kind.archive_name())
    }

    pub fn manifest_path(&self, kind: BackupKind) -> PathBuf {
        self.config.backup_dir.join(kind.manifest_name())
    }

    /// A backup is usable when its archive exists and is non-empty. An empty
    /// file can be left behind by an interrupted transfer and must not be
    /// treated as restorable.
    pub fn is_valid(&self, kind: BackupKind) -> bool {
        fs::metadata(self.archive_path(kind))
            .map(|md| md.is_file() && md.len() > 0)
            .unwrap_or(false)
    }

    /// Archive every existing source of `kind`, replacing any previous
    /// archive. Missing sources are skipped with a warning; if none exist the
    /// backup fails rather than writing an empty archive.
    pub fn create_backup(&self, kind: BackupKind) -> Result<Backup> {
        let mut present = Vec::new();
        for source in self.sources(kind) {
            if source.exists() {
                present.push(source);
            } else {
                log::warn!("backup source missing, skipping: {}", source.display());
            }
        }
        if present.is_empty() {
            bail!("nothing to back up for '{}': no source paths exist", kind.as_str());
        }

        fs::create_dir_all(&self.config.backup_dir).with_context(|| {
            format!(
                "Failed to create backup directory {}",
                self.config.backup_dir.display()
            )
        })?;

        // Deterministic, deduplicated entry set keyed by in-archive path.
        let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();
        for source in &present {
            for ent in WalkDir::new(source)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
            {
                let rel = archive_rel(ent.path(), &self.config.system_root);
                if rel.as_os_str().is_empty() {
                    continue;
                }
                entries.insert(rel.to_string_lossy().into_owned(), ent.path().to_path_buf());
            }
        }

        let archive = self.archive_path(kind);
        let tmp = self.config.backup_dir.join(format!(".{}.tmp", kind.archive_name()));
        self.write_archive(&tmp, &entries)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &archive).with_context(|| {
            format!("Failed to move {} to {}", tmp.display(), archive.display())
        })?;

        let manifest = BackupManifest {
            kind: kind.as_str().to_string(),
            created_at: logging::file_stamp(),
            sources: present
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            entries: entries.len(),
        };
        self.write_manifest(kind, &manifest)?;

        log::info!(
            "{} backup created: {} ({} entries)",
            kind.as_str(),
            archive.display(),
            entries.len()
        );
        Ok(Backup {
            kind,
            archive,
            entries: entries.len(),
        })
    }

    /// Restore the archive of `kind` over the system root. Returns the number
    /// of files and links put back.
    pub fn restore_backup(&self, kind: BackupKind) -> Result<usize> {
        if !self.is_valid(kind) {
            return Err(WardenError::BackupMissing(kind).into());
        }
        let archive = self.archive_path(kind);

        // Extract into a sibling staging dir first; a truncated archive then
        // fails before anything lands on the live tree.
        let staging = self
            .config
            .backup_dir
            .join(format!(".{}-restore.tmp", kind.as_str()));
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }
        fs::create_dir_all(&staging)?;

        let result = self.unpack_and_merge(&archive, &staging);
        let _ = fs::remove_dir_all(&staging);
        let restored = result?;

        log::info!(
            "{} backup restored: {} files from {}",
            kind.as_str(),
            restored,
            archive.display()
        );
        Ok(restored)
    }

    pub fn read_manifest(&self, kind: BackupKind) -> Result<Option<BackupManifest>> {
        let path = self.manifest_path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    fn write_archive(&self, out_path: &Path, entries: &BTreeMap<String, PathBuf>) -> Result<()> {
        let out = File::create(out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        let encoder = zstd::stream::Encoder::new(out, 3)?;
        let mut builder = TarBuilder::new(encoder);
        builder.follow_symlinks(false);

        for (rel, path) in entries {
            builder
                .append_path_with_name(path, rel)
                .with_context(|| format!("Failed to archive {}", path.display()))?;
        }

        let encoder = builder
            .into_inner()
            .context("Failed to finalize archive")?;
        encoder.finish()?;
        Ok(())
    }

    fn write_manifest(&self, kind: BackupKind, manifest: &BackupManifest) -> Result<()> {
        let path = self.manifest_path(kind);
        let tmp = self.config.backup_dir.join(format!(".{}.tmp", kind.manifest_name()));
        let bytes = serde_json::to_vec_pretty(manifest)?;
        fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn unpack_and_merge(&self, archive: &Path, staging: &Path) -> Result<usize> {
        let f = File::open(archive)
            .with_context(|| format!("Failed to open {}", archive.display()))?;
        let decoder = zstd::stream::Decoder::new(f)?;
        let mut tar = tar::Archive::new(decoder);
        tar.set_preserve_permissions(true);
        tar.unpack(staging)
            .with_context(|| format!("Failed to unpack {}", archive.display()))?;

        let mut restored = 0usize;
        for ent in WalkDir::new(staging)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            let src = ent.path();
            if src == staging {
                continue;
            }
            let rel = src.strip_prefix(staging).unwrap_or(src);
            let dest = self.config.system_root.join(rel);
            let file_type = ent.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&dest)
                    .with_context(|| format!("Failed to create {}", dest.display()))?;
            } else if file_type.is_symlink() {
                let target = fs::read_link(src)?;
                if dest.exists() || fs::symlink_metadata(&dest).is_ok() {
                    let _ = fs::remove_file(&dest);
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                std::os::unix::fs::symlink(&target, &dest).with_context(|| {
                    format!("Failed to restore symlink {}", dest.display())
                })?;
                restored += 1;
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(src, &dest).with_context(|| {
                    format!("Failed to restore {}", dest.display())
                })?;
                restored += 1;
            }
        }
        Ok(restored)
    }
}

/// In-archive path for `path`: relative to `root` when it lies underneath,
/// otherwise its own components with the leading root stripped.
fn archive_rel(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect(),
    }
}
