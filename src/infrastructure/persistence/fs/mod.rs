//! 文件系统持久化实现

mod audio_cache;

pub use audio_cache::FsAudioCache;
