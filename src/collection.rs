use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::PicbedError;
use crate::files;
use crate::order::{merge_order, OrderStore};

/// Image listing of a single collection with derived access URLs.
#[derive(Debug, Serialize)]
pub struct CollectionDetail {
    pub collection: String,
    pub images: Vec<String>,
    pub urls: Vec<String>,
}

/// Collection lifecycle on top of the upload root. Directories are the
/// records; the order store only contributes relative position.
#[derive(Debug, Clone)]
pub struct Collections {
    root: PathBuf,
    order: OrderStore,
}

impl Collections {
    pub fn new(root: PathBuf, order: OrderStore) -> Self {
        Self { root, order }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn checked_dir(&self, name: &str) -> Result<PathBuf, PicbedError> {
        if !files::valid_name(name) {
            return Err(PicbedError::InvalidInput(
                "collection name cannot be empty".to_string(),
            ));
        }
        Ok(self.dir(name))
    }

    pub async fn create(&self, name: &str) -> Result<(), PicbedError> {
        let dir = self.checked_dir(name)?;

        if dir.exists() {
            return Err(PicbedError::Conflict("collection already exists".to_string()));
        }

        tokio::fs::create_dir_all(&dir).await?;
        self.order.append(name).await;

        info!("Created collection {name}");
        Ok(())
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<(), PicbedError> {
        let old_dir = self.checked_dir(old)?;
        let new_dir = self.checked_dir(new)?;

        if !old_dir.exists() {
            return Err(PicbedError::NotFound("collection not found".to_string()));
        }

        if new_dir.exists() {
            return Err(PicbedError::Conflict(
                "target collection already exists".to_string(),
            ));
        }

        tokio::fs::rename(&old_dir, &new_dir).await?;
        self.order.rename(old, new).await;

        info!("Renamed collection {old} -> {new}");
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), PicbedError> {
        let dir = self.checked_dir(name)?;

        if !dir.exists() {
            return Err(PicbedError::NotFound("collection not found".to_string()));
        }

        tokio::fs::remove_dir_all(&dir).await?;
        self.order.remove(name).await;

        info!("Deleted collection {name}");
        Ok(())
    }

    /// All collections: persisted order first (dropping stale entries), then
    /// anything new on disk in directory order.
    pub async fn list(&self) -> Result<Vec<String>, PicbedError> {
        files::ensure_dir(&self.root)?;

        let on_disk = files::list_dirs(&self.root)?;
        let saved = self.order.load().await;

        Ok(merge_order(&on_disk, &saved))
    }

    pub async fn detail(&self, name: &str) -> Result<CollectionDetail, PicbedError> {
        let dir = self.checked_dir(name)?;

        if !dir.exists() {
            return Err(PicbedError::NotFound("collection not found".to_string()));
        }

        let images = files::list_images(&dir)?;
        let urls = images.iter().map(|n| format!("/{name}/{n}")).collect();

        Ok(CollectionDetail {
            collection: name.to_string(),
            images,
            urls,
        })
    }

    pub async fn save_order(&self, order: &[String]) {
        self.order.replace(order).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStore;

    fn collections(dir: &tempfile::TempDir) -> Collections {
        let order = OrderStore::new(dir.path().join("order.json"));
        Collections::new(dir.path().join("uploads"), order)
    }

    #[tokio::test]
    async fn create_then_list_contains_it() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("cats").await.unwrap();
        assert!(collections.list().await.unwrap().contains(&"cats".to_string()));
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("cats").await.unwrap();
        assert!(matches!(
            collections.create("cats").await,
            Err(PicbedError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_blank_names() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        assert!(matches!(
            collections.create("   ").await,
            Err(PicbedError::InvalidInput(_))
        ));
        assert!(matches!(
            collections.create("../escape").await,
            Err(PicbedError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn rename_keeps_ordinal_position() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("a").await.unwrap();
        collections.create("b").await.unwrap();
        collections.create("c").await.unwrap();

        collections.rename("b", "z").await.unwrap();

        let listed = collections.list().await.unwrap();
        assert_eq!(listed, vec!["a", "z", "c"]);
    }

    #[tokio::test]
    async fn rename_conflicts_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("a").await.unwrap();
        collections.create("b").await.unwrap();

        assert!(matches!(
            collections.rename("a", "b").await,
            Err(PicbedError::Conflict(_))
        ));
        assert!(matches!(
            collections.rename("ghost", "x").await,
            Err(PicbedError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_then_detail_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("cats").await.unwrap();
        std::fs::write(collections.dir("cats").join("a.png"), b"x").unwrap();

        collections.delete("cats").await.unwrap();

        assert!(matches!(
            collections.detail("cats").await,
            Err(PicbedError::NotFound(_))
        ));
        assert!(!collections.list().await.unwrap().contains(&"cats".to_string()));
    }

    #[tokio::test]
    async fn detail_filters_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("cats").await.unwrap();
        std::fs::write(collections.dir("cats").join("a.png"), b"x").unwrap();
        std::fs::write(collections.dir("cats").join("notes.txt"), b"x").unwrap();

        let detail = collections.detail("cats").await.unwrap();
        assert_eq!(detail.images, vec!["a.png"]);
        assert_eq!(detail.urls, vec!["/cats/a.png"]);
    }

    #[tokio::test]
    async fn untracked_directories_appear_after_ordered_ones() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("a").await.unwrap();
        // Dropped onto disk without going through create.
        std::fs::create_dir_all(collections.dir("manual")).unwrap();

        let listed = collections.list().await.unwrap();
        assert_eq!(listed[0], "a");
        assert!(listed.contains(&"manual".to_string()));
    }

    #[tokio::test]
    async fn save_order_roundtrip_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let collections = collections(&dir);

        collections.create("a").await.unwrap();
        collections.create("b").await.unwrap();

        let listed = collections.list().await.unwrap();
        collections.save_order(&listed).await;

        assert_eq!(collections.list().await.unwrap(), listed);
    }
}
