//! Uploaded document storage on the local filesystem

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

/// Writes uploads under a single directory
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub async fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create upload directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save an upload as `user_<id>_<unix ts>_<safe name>`
    pub async fn save(&self, user_id: &str, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let filename = format!(
            "user_{}_{}_{}",
            user_id,
            chrono::Utc::now().timestamp(),
            secure_filename(original_name)
        );
        let path = self.unique_path(&filename);

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Two uploads of the same name in the same second must not collide
    fn unique_path(&self, filename: &str) -> PathBuf {
        let candidate = self.root.join(filename);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
            None => (filename.to_string(), String::new()),
        };
        (1..)
            .map(|n| self.root.join(format!("{}-{}{}", stem, n, ext)))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    /// Delete a stored file; a missing file is not an error
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    /// Delete several files, logging failures instead of stopping
    pub async fn remove_all(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = self.remove(path).await {
                warn!("{:#}", e);
            }
        }
    }
}

/// Reduce a client-supplied name to a safe ASCII file name.
///
/// The extension is cleaned separately so a name made only of non-ASCII
/// characters still keeps it (`Анализ.csv` → `upload.csv`).
pub fn secure_filename(name: &str) -> String {
    // Browsers on Windows send full paths
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, ascii_part(ext).replace('.', "")),
        _ => (base, String::new()),
    };

    let stem = ascii_part(stem);
    let stem = match stem.trim_start_matches('.').trim_matches('_') {
        "" => "upload",
        trimmed => trimmed,
    };

    match ext.trim_matches('_') {
        "" => stem.to_string(),
        ext => format!("{}.{}", stem, ext),
    }
}

fn ascii_part(text: &str) -> String {
    text.nfkd()
        .filter(|c| c.is_ascii())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Recover the uploaded name from a stored path
pub fn original_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parts: Vec<&str> = file_name.splitn(4, '_').collect();
    match parts.as_slice() {
        ["user", _, _, rest] if !rest.is_empty() => rest.to_string(),
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("Análise joelho.csv"), "Analise_joelho.csv");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\ana\\coleta 1.xlsx"), "coleta_1.xlsx");
        assert_eq!(secure_filename("...."), "upload");
        assert_eq!(secure_filename("日本"), "upload");
        assert_eq!(secure_filename("Анализ.csv"), "upload.csv");
        assert_eq!(secure_filename("歩行データ.XLSX"), "upload.XLSX");
        assert_eq!(secure_filename(".csv"), "upload.csv");
    }

    #[tokio::test]
    async fn test_non_ascii_upload_keeps_its_format() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path()).await.unwrap();

        let path = store.save("u1", "Анализ.csv", b"Time;Knee Angle\n0;1\n").await.unwrap();
        assert_eq!(original_name(&path), "upload.csv");

        let format = crate::analysis::FileFormat::from_name(&path.to_string_lossy()).unwrap();
        assert_eq!(format, crate::analysis::FileFormat::Csv);
    }

    #[test]
    fn test_original_name() {
        let path = Path::new("docs/user_abc123_1700000000_gait_trial_2.csv");
        assert_eq!(original_name(path), "gait_trial_2.csv");
        assert_eq!(original_name(Path::new("docs/plain.csv")), "plain.csv");
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("docs")).await.unwrap();

        let first = store.save("u1", "trial.csv", b"Time,Angle\n0,1\n").await.unwrap();
        let second = store.save("u1", "trial.csv", b"Time,Angle\n0,2\n").await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with(store.root()));
        assert_eq!(original_name(&first), "trial.csv");

        store.remove(&first).await.unwrap();
        assert!(!first.exists());
        // already gone
        store.remove(&first).await.unwrap();

        store.remove_all(&[second.clone()]).await;
        assert!(!second.exists());
    }
}
