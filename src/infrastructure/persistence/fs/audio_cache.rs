//! Filesystem Audio Cache - 内容寻址的 TTS 音频缓存
//!
//! 一个 key 对应一个 `tts-<key>.<ext>` 文件。并发写入靠 O_EXCL
//! 独占创建裁决：第一个创建者负责填充，其余并发请求拿不到
//! writer，旁路缓存。写入先落在 `.part` 文件上，commit 时原子
//! rename 到最终名，保证 find 看到的永远是完整条目。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::application::ports::{AudioCachePort, CacheError, CacheHit, CacheWriter};

/// 已知的 (content-type, 扩展名) 组合，同时是 find 的探测顺序
const KNOWN_TYPES: &[(&str, &str)] = &[("audio/mpeg", "mp3"), ("audio/wav", "wav")];

fn ext_for(content_type: &str) -> Option<&'static str> {
    KNOWN_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

/// Filesystem Audio Cache
pub struct FsAudioCache {
    dir: PathBuf,
}

impl FsAudioCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("tts-{}.{}", key, ext))
    }

    fn staging_path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("tts-{}.{}.part", key, ext))
    }
}

#[async_trait]
impl AudioCachePort for FsAudioCache {
    async fn find(&self, key: &str) -> Option<CacheHit> {
        for (content_type, ext) in KNOWN_TYPES {
            let path = self.entry_path(key, ext);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    return Some(CacheHit {
                        path,
                        content_type,
                        content_length: meta.len(),
                    });
                }
                _ => continue,
            }
        }
        None
    }

    async fn begin_write(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Option<Box<dyn CacheWriter>>, CacheError> {
        let Some(ext) = ext_for(content_type) else {
            // 未知类型不进缓存
            return Ok(None);
        };
        if self.find(key).await.is_some() {
            return Ok(None);
        }
        let staging = self.staging_path(key, ext);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .await
        {
            Ok(file) => Ok(Some(Box::new(FsCacheWriter {
                file,
                staging,
                target: self.entry_path(key, ext),
            }))),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(CacheError::IoError(e.to_string())),
        }
    }

    async fn insert_file(&self, key: &str, content_type: &str, source: &Path) {
        let Some(ext) = ext_for(content_type) else {
            return;
        };
        let staging = self.staging_path(key, ext);
        let target = self.entry_path(key, ext);
        if tokio::fs::metadata(&target).await.is_ok() {
            return;
        }

        let result: std::io::Result<()> = async {
            let mut dest = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staging)
                .await?;
            let mut src = File::open(source).await?;
            let copied = tokio::io::copy(&mut src, &mut dest).await?;
            dest.flush().await?;
            drop(dest);
            if copied == 0 {
                tokio::fs::remove_file(&staging).await?;
                return Ok(());
            }
            tokio::fs::rename(&staging, &target).await
        }
        .await;

        if let Err(e) = result {
            tracing::debug!(key = %key, error = %e, "TTS cache insert skipped");
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                let _ = tokio::fs::remove_file(&staging).await;
            }
        }
    }
}

struct FsCacheWriter {
    file: File,
    staging: PathBuf,
    target: PathBuf,
}

#[async_trait]
impl CacheWriter for FsCacheWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| CacheError::IoError(e.to_string()))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), CacheError> {
        self.file
            .flush()
            .await
            .map_err(|e| CacheError::IoError(e.to_string()))?;

        let len = self
            .file
            .metadata()
            .await
            .map_err(|e| CacheError::IoError(e.to_string()))?
            .len();
        drop(self.file);

        // 零字节产物视为无效
        if len == 0 {
            let _ = tokio::fs::remove_file(&self.staging).await;
            return Ok(());
        }

        tokio::fs::rename(&self.staging, &self.target)
            .await
            .map_err(|e| CacheError::IoError(e.to_string()))
    }

    async fn abort(self: Box<Self>) {
        drop(self.file);
        let _ = tokio::fs::remove_file(&self.staging).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &Path) -> FsAudioCache {
        FsAudioCache::new(dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_committed_entry_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let mut writer = cache
            .begin_write("abc123", "audio/mpeg")
            .await
            .unwrap()
            .unwrap();
        writer.write(b"mp3 bytes").await.unwrap();
        writer.commit().await.unwrap();

        let hit = cache.find("abc123").await.unwrap();
        assert_eq!(hit.content_type, "audio/mpeg");
        assert_eq!(hit.content_length, 9);
        assert!(hit.path.ends_with("tts-abc123.mp3"));
    }

    #[tokio::test]
    async fn test_in_progress_write_is_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let mut writer = cache.begin_write("k", "audio/mpeg").await.unwrap().unwrap();
        writer.write(b"some bytes already written").await.unwrap();

        // rename 之前对外不可见
        assert!(cache.find("k").await.is_none());

        writer.commit().await.unwrap();
        assert!(cache.find("k").await.is_some());
    }

    #[tokio::test]
    async fn test_second_writer_for_same_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let first = cache.begin_write("k", "audio/mpeg").await.unwrap();
        assert!(first.is_some());
        let second = cache.begin_write("k", "audio/mpeg").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_aborted_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let mut writer = cache.begin_write("k", "audio/wav").await.unwrap().unwrap();
        writer.write(b"partial").await.unwrap();
        writer.abort().await;

        assert!(cache.find("k").await.is_none());
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
        // 之后的写入者可以重新占据该 key
        assert!(cache.begin_write("k", "audio/wav").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_commit_is_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let writer = cache.begin_write("k", "audio/mpeg").await.unwrap().unwrap();
        writer.commit().await.unwrap();

        assert!(cache.find("k").await.is_none());
    }

    #[tokio::test]
    async fn test_insert_file_copies_once_then_yields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let source = dir.path().join("source.mp3");
        tokio::fs::write(&source, b"complete audio").await.unwrap();

        cache.insert_file("k", "audio/mpeg", &source).await;
        let hit = cache.find("k").await.unwrap();
        assert_eq!(hit.content_length, 14);

        // 重复插入静默跳过，不破坏既有条目
        cache.insert_file("k", "audio/mpeg", &source).await;
        assert!(cache.find("k").await.is_some());
    }

    #[tokio::test]
    async fn test_wav_entry_probes_with_its_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let mut writer = cache.begin_write("k", "audio/wav").await.unwrap().unwrap();
        writer.write(b"RIFF").await.unwrap();
        writer.commit().await.unwrap();

        let hit = cache.find("k").await.unwrap();
        assert_eq!(hit.content_type, "audio/wav");
    }
}
