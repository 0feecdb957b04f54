//! 影像文件存储管理
//!
//! 目录布局：`<root>/images/<id>.webp` 和 `<root>/thumbnails/<id>_thumb.webp`。
//! 数据库中的base64列作为回退来源，磁盘文件是首选读取路径。

use mirs_core::{MirsError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// 影像文件存储管理器
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 创建存储目录结构
    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join("images")).await?;
        tokio::fs::create_dir_all(self.root.join("thumbnails")).await?;
        Ok(())
    }

    pub fn image_path(&self, id: Uuid) -> PathBuf {
        self.root.join("images").join(format!("{}.webp", id))
    }

    pub fn thumbnail_path(&self, id: Uuid) -> PathBuf {
        self.root.join("thumbnails").join(format!("{}_thumb.webp", id))
    }

    /// 存储全尺寸影像
    pub async fn save_image(&self, id: Uuid, data: &[u8]) -> Result<PathBuf> {
        let path = self.image_path(id);
        self.write(&path, data).await?;
        Ok(path)
    }

    /// 存储缩略图
    pub async fn save_thumbnail(&self, id: Uuid, data: &[u8]) -> Result<PathBuf> {
        let path = self.thumbnail_path(id);
        self.write(&path, data).await?;
        Ok(path)
    }

    /// 读取全尺寸影像，文件不存在时返回None（由调用方回退数据库）
    pub async fn load_image(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        self.read(&self.image_path(id)).await
    }

    /// 读取缩略图
    pub async fn load_thumbnail(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        self.read(&self.thumbnail_path(id)).await
    }

    /// 删除影像及其缩略图。文件缺失不视为错误
    pub async fn delete(&self, id: Uuid) {
        for path in [self.image_path(id), self.thumbnail_path(id)] {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("删除影像文件失败 {:?}: {}", path, e);
                }
            }
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        debug!("已写入影像文件: {:?} ({} bytes)", path, data.len());
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MirsError::Storage(format!(
                "读取影像文件失败 {:?}: {}",
                path, e
            ))),
        }
    }
}

/// 计算上传内容的SHA-256校验和（十六进制）
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_paths_contain_id() {
        let store = ImageStore::new("/tmp/mirs");
        let id = Uuid::new_v4();
        assert!(store.image_path(id).to_string_lossy().contains(&id.to_string()));
        assert!(store
            .thumbnail_path(id)
            .to_string_lossy()
            .ends_with("_thumb.webp"));
    }

    #[tokio::test]
    async fn test_save_load_delete_roundtrip() {
        let dir = std::env::temp_dir().join(format!("mirs-store-{}", Uuid::new_v4()));
        let store = ImageStore::new(&dir);
        store.ensure_dirs().await.unwrap();

        let id = Uuid::new_v4();
        store.save_image(id, b"RIFF-image").await.unwrap();
        store.save_thumbnail(id, b"RIFF-thumb").await.unwrap();

        assert_eq!(store.load_image(id).await.unwrap().unwrap(), b"RIFF-image");
        assert_eq!(
            store.load_thumbnail(id).await.unwrap().unwrap(),
            b"RIFF-thumb"
        );

        store.delete(id).await;
        assert!(store.load_image(id).await.unwrap().is_none());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let store = ImageStore::new(std::env::temp_dir().join("mirs-store-missing"));
        assert!(store.load_image(Uuid::new_v4()).await.unwrap().is_none());
    }
}
