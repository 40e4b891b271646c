use super::write_atomic_async;
use crate::error::{Error, Result};
use crate::models::{ClientContext, ClientDocument};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// One JSON document per client under a single directory
#[derive(Debug, Clone)]
pub struct ClientStore {
    dir: PathBuf,
}

impl ClientStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn filename(id: &str) -> Result<String> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Persistence(format!("invalid client id '{}'", id)));
        }
        Ok(format!("{}.json", id))
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    async fn write(&self, client: &ClientContext) -> Result<()> {
        let json = serde_json::to_vec_pretty(client)
            .map_err(|e| Error::persistence("Failed to serialize client", e))?;
        write_atomic_async(self.dir.clone(), Self::filename(&client.id)?, json, true)
            .await
            .map_err(|e| Error::persistence(&format!("Cannot save client {}", client.name), e))?;
        Ok(())
    }

    async fn ensure_unique_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        if let Some(existing) = self.get_by_name(name).await? {
            if Some(existing.id.as_str()) != except_id {
                return Err(Error::Persistence(format!(
                    "a client named '{}' already exists ({})",
                    existing.name, existing.id
                )));
            }
        }
        Ok(())
    }

    /// Stores a new client under a fresh id; names are unique ignoring case
    pub async fn create(&self, mut client: ClientContext) -> Result<ClientContext> {
        client.name = client.name.trim().to_string();
        if client.name.is_empty() {
            return Err(Error::Persistence("client name cannot be empty".to_string()));
        }
        self.ensure_unique_name(&client.name, None).await?;

        client.id = Self::new_id();
        let now = Local::now();
        client.created_at = now;
        client.updated_at = now;
        client.normalize_rules();

        self.write(&client).await?;
        info!("🆕 Created client {} ({})", client.name, client.id);
        Ok(client)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ClientContext>> {
        let path = self.dir.join(Self::filename(id)?);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::persistence(&format!("Cannot read {}", path.display()), e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::persistence(&format!("Corrupt client file {}", path.display()), e))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<ClientContext>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|c| c.name.to_lowercase() == wanted))
    }

    /// Looks a client up by id first, then by name
    pub async fn find(&self, id_or_name: &str) -> Result<Option<ClientContext>> {
        if let Ok(Some(client)) = self.get(id_or_name).await {
            return Ok(Some(client));
        }
        self.get_by_name(id_or_name).await
    }

    /// All readable clients sorted by name; unreadable files are skipped with a warning
    pub async fn list(&self) -> Result<Vec<ClientContext>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::persistence(
                    &format!("Cannot list {}", self.dir.display()),
                    e,
                ))
            }
        };

        let mut clients = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::persistence("Cannot list clients", e))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<ClientContext>(&content).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(client) => clients.push(client),
                Err(e) => warn!("Failed to load client file {}: {}", path.display(), e),
            }
        }

        clients.sort_by_key(|c| c.name.to_lowercase());
        debug!("📁 Loaded {} clients from {}", clients.len(), self.dir.display());
        Ok(clients)
    }

    /// Saves changes to an existing client and bumps `updated_at`
    pub async fn update(&self, client: &mut ClientContext) -> Result<()> {
        if self.get(&client.id).await?.is_none() {
            return Err(Error::Persistence(format!("client {} not found", client.id)));
        }
        client.name = client.name.trim().to_string();
        self.ensure_unique_name(&client.name, Some(&client.id)).await?;

        client.normalize_rules();
        client.updated_at = Local::now();
        self.write(client).await?;
        debug!("💾 Updated client {}", client.id);
        Ok(())
    }

    /// Returns whether a client file was removed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.dir.join(Self::filename(id)?);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("🗑️ Deleted client {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::persistence(&format!("Cannot delete {}", path.display()), e)),
        }
    }

    /// Attaches a reference document, replacing one with the same filename
    pub async fn add_document(&self, id: &str, document: ClientDocument) -> Result<ClientContext> {
        let mut client = self
            .get(id)
            .await?
            .ok_or_else(|| Error::Persistence(format!("client {} not found", id)))?;

        client.documents.retain(|d| d.filename != document.filename);
        client.documents.push(document);
        self.update(&mut client).await?;
        Ok(client)
    }

    pub async fn remove_document(&self, id: &str, filename: &str) -> Result<ClientContext> {
        let mut client = self
            .get(id)
            .await?
            .ok_or_else(|| Error::Persistence(format!("client {} not found", id)))?;

        let before = client.documents.len();
        client.documents.retain(|d| d.filename != filename);
        if client.documents.len() == before {
            return Err(Error::Persistence(format!(
                "client {} has no document named {}",
                id, filename
            )));
        }
        self.update(&mut client).await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_assigns_short_id() {
        let dir = TempDir::new().unwrap();
        let store = ClientStore::new(dir.path());
        let client = store.create(ClientContext::new("  Acme  ")).await.unwrap();
        assert_eq!(client.id.len(), 8);
        assert_eq!(client.name, "Acme");
        assert!(dir.path().join(format!("{}.json", client.id)).exists());
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ClientStore::new(dir.path());
        store.create(ClientContext::new("Acme")).await.unwrap();
        assert!(store.create(ClientContext::new("ACME")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_documents() {
        let dir = TempDir::new().unwrap();
        let store = ClientStore::new(dir.path());
        let mut client = store.create(ClientContext::new("Acme")).await.unwrap();

        client.add_rule(RuleKind::Business, "Orders over $100 ship free");
        store.update(&mut client).await.unwrap();

        let document = ClientDocument {
            filename: "style.md".to_string(),
            file_type: "md".to_string(),
            content: "Use data-testid selectors".to_string(),
            uploaded_at: Local::now(),
        };
        let updated = store.add_document(&client.id, document).await.unwrap();
        assert_eq!(updated.documents.len(), 1);
        assert_eq!(updated.business_rules, vec!["Orders over $100 ship free".to_string()]);

        let updated = store.remove_document(&client.id, "style.md").await.unwrap();
        assert!(updated.documents.is_empty());
        assert!(store.remove_document(&client.id, "style.md").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ClientStore::new(dir.path());
        assert!(store.get("../settings").await.is_err());
        assert!(!store.delete("abc123").await.unwrap());
    }
}
