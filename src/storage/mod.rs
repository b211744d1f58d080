//! Persistence for template bytes and cache rows
//!
//! Raw template bytes go through the narrow `ObjectStore` contract
//! (`put(key, bytes)` / `get(key) -> bytes`); `FormTemplate` cache rows are
//! stored as one JSON file per program. Writes are idempotent and
//! last-writer-wins, so concurrent fill requests need no locking.

use crate::models::FormTemplate;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Narrow object-store contract for raw template bytes
pub trait ObjectStore: Send {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    fn exists(&self, key: &str) -> bool;
}

/// Filesystem-backed object store rooted at a directory
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are slash-separated logical paths; reject traversal outright
        if key.contains("..") || key.starts_with('/') {
            return Err(anyhow!("Invalid object key: {}", key));
        }
        Ok(self.root.join(key))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write object {:?}", path))?;
        log::debug!("[Storage] Put object {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).with_context(|| format!("Failed to read object {:?}", path))
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Store for `FormTemplate` cache rows, one JSON file per program
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn row_path(&self, program_id: &str) -> PathBuf {
        let sanitized: String = program_id
            .chars()
            .filter(|c| !['/', '\\', '\0', '.'].contains(c))
            .take(100)
            .collect();
        self.root.join(format!("{}.json", sanitized))
    }

    /// Insert or replace the row for a program. Last successful write wins.
    pub fn upsert(&self, template: &FormTemplate) -> Result<()> {
        ensure_dir(&self.root)?;
        let path = self.row_path(&template.program_id);
        let json = serde_json::to_string_pretty(template)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write template row {:?}", path))?;
        log::debug!(
            "[Storage] Upserted template row for program {} (status: {:?})",
            template.program_id,
            template.status
        );
        Ok(())
    }

    pub fn find_by_program(&self, program_id: &str) -> Result<Option<FormTemplate>> {
        let path = self.row_path(program_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template row {:?}", path))?;
        let template: FormTemplate = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt template row {:?}", path))?;
        Ok(Some(template))
    }

    /// Drop the persisted row so the next fill re-acquires the template
    pub fn invalidate(&self, program_id: &str) -> Result<()> {
        let path = self.row_path(program_id);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete template row {:?}", path))?;
            log::info!("[Storage] Invalidated template row for program {}", program_id);
        }
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {:?}", path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerKind, TemplateStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_template(program_id: &str) -> FormTemplate {
        FormTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            program_id: program_id.to_string(),
            source_url: "https://example.go.kr/form.hwpx".to_string(),
            container_kind: ContainerKind::ZipXml,
            storage_key: Some(format!("templates/{}", program_id)),
            parsed_form: None,
            status: TemplateStatus::Ready,
            error_detail: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_object_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        store.put("templates/prog-1", b"PK\x03\x04data").unwrap();
        assert!(store.exists("templates/prog-1"));
        assert_eq!(store.get("templates/prog-1").unwrap(), b"PK\x03\x04data");
    }

    #[test]
    fn test_object_store_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        assert!(store.put("../escape", b"x").is_err());
        assert!(store.get("/etc/passwd").is_err());
    }

    #[test]
    fn test_template_row_upsert_and_find() {
        let temp_dir = TempDir::new().unwrap();
        let store = TemplateStore::new(temp_dir.path());

        assert!(store.find_by_program("prog-1").unwrap().is_none());

        let template = sample_template("prog-1");
        store.upsert(&template).unwrap();

        let found = store.find_by_program("prog-1").unwrap().unwrap();
        assert_eq!(found.program_id, "prog-1");
        assert_eq!(found.status, TemplateStatus::Ready);
    }

    #[test]
    fn test_upsert_is_last_writer_wins() {
        let temp_dir = TempDir::new().unwrap();
        let store = TemplateStore::new(temp_dir.path());

        let mut template = sample_template("prog-1");
        store.upsert(&template).unwrap();

        template.status = TemplateStatus::Failed;
        template.error_detail = Some("legacy binary".to_string());
        store.upsert(&template).unwrap();

        let found = store.find_by_program("prog-1").unwrap().unwrap();
        assert_eq!(found.status, TemplateStatus::Failed);
    }

    #[test]
    fn test_invalidate_removes_row() {
        let temp_dir = TempDir::new().unwrap();
        let store = TemplateStore::new(temp_dir.path());

        store.upsert(&sample_template("prog-1")).unwrap();
        store.invalidate("prog-1").unwrap();
        assert!(store.find_by_program("prog-1").unwrap().is_none());

        // Invalidating a missing row is a no-op
        store.invalidate("prog-1").unwrap();
    }
}
