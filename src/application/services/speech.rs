//! Speech Service - TTS 合成与内容寻址缓存
//!
//! 命中缓存直接回放；未命中时解析 Provider 合成，并在流式返回的
//! 同时以独占创建方式填充缓存。同一 key 的并发请求只有一个写入者，
//! 其余请求旁路缓存直接交付，互不等待。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    cache_key, AudioCachePort, AudioStream, CacheWriter, ProviderSpeakRequest, SpeakOutput,
    SpeakRequest, TokenEntry, TokenStorePort, TtsError, TtsMode, TtsProviderPort, Voice,
};

/// 令牌有效期上限（秒）；实际有效期取 min(会话 TTL, 此值)
const MAX_TOKEN_TTL_SECS: u64 = 300;

/// 在线/离线两端的音色清单
#[derive(Debug, Clone, serde::Serialize)]
pub struct VoiceCatalog {
    pub online: Vec<Voice>,
    pub offline: Vec<Voice>,
}

/// 默认选择：有离线音色优先离线，其次在线
#[derive(Debug, Clone, serde::Serialize)]
pub struct DefaultSelection {
    pub mode: TtsMode,
    pub voice: String,
}

/// Provider 注册表
///
/// None 表示该模式未配置（在线缺 API key / 离线无可用模型），
/// 解析失败以 ConfigurationError 直接上抛，不涉及任何记录状态。
pub struct TtsRegistry {
    online: Option<Arc<dyn TtsProviderPort>>,
    offline: Option<Arc<dyn TtsProviderPort>>,
}

impl TtsRegistry {
    pub fn new(
        online: Option<Arc<dyn TtsProviderPort>>,
        offline: Option<Arc<dyn TtsProviderPort>>,
    ) -> Self {
        Self { online, offline }
    }

    fn resolve(&self, mode: TtsMode) -> Result<Arc<dyn TtsProviderPort>, TtsError> {
        match mode {
            TtsMode::Online => self
                .online
                .clone()
                .ok_or_else(|| TtsError::NotConfigured("Online TTS not configured.".to_string())),
            TtsMode::Offline => self
                .offline
                .clone()
                .ok_or_else(|| TtsError::NotConfigured("Offline TTS not available.".to_string())),
        }
    }

    /// 并行查询两端音色；未配置的一端贡献空表而非错误
    async fn list_all(&self) -> VoiceCatalog {
        let online = async {
            match &self.online {
                Some(provider) => provider.list_voices().await.unwrap_or_default(),
                None => Vec::new(),
            }
        };
        let offline = async {
            match &self.offline {
                Some(provider) => provider.list_voices().await.unwrap_or_default(),
                None => Vec::new(),
            }
        };
        let (online, offline) = tokio::join!(online, offline);
        VoiceCatalog { online, offline }
    }
}

/// speak 的交付结果
pub enum SpeakResult {
    /// 完整文件（缓存命中或 Provider 直接产出文件），长度已知，可做 Range
    File {
        path: std::path::PathBuf,
        content_type: &'static str,
        content_length: u64,
        /// 是否来自缓存（命中文件不得在交付后删除）
        cached: bool,
    },
    /// 活的字节流，长度未知
    Stream {
        stream: AudioStream,
        content_type: &'static str,
    },
}

/// Speech Service
pub struct SpeechService {
    registry: TtsRegistry,
    cache: Arc<dyn AudioCachePort>,
    tokens: Arc<dyn TokenStorePort>,
    session_ttl: Duration,
}

impl SpeechService {
    pub fn new(
        registry: TtsRegistry,
        cache: Arc<dyn AudioCachePort>,
        tokens: Arc<dyn TokenStorePort>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            tokens,
            session_ttl,
        }
    }

    /// 合成（或回放缓存）
    pub async fn speak(&self, request: SpeakRequest) -> Result<SpeakResult, ApplicationError> {
        // 归一化：缺省语速按 1 计，保证与显式 1 同 key
        let request = SpeakRequest {
            rate: Some(request.rate_or_default()),
            ..request
        };
        let key = cache_key(&request);

        if let Some(hit) = self.cache.find(&key).await {
            tracing::debug!(key = %key, "TTS cache hit");
            return Ok(SpeakResult::File {
                path: hit.path,
                content_type: hit.content_type,
                content_length: hit.content_length,
                cached: true,
            });
        }

        let provider = self.registry.resolve(request.mode)?;
        let output = provider
            .speak(&ProviderSpeakRequest {
                text: request.text.clone(),
                voice: request.voice.clone(),
                rate: request.rate_or_default(),
            })
            .await?;

        match output {
            SpeakOutput::File { path, content_type } => {
                // 完成的文件：独占复制进缓存，失败静默放弃
                self.cache.insert_file(&key, content_type, &path).await;
                let content_length = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len())
                    .map_err(|e| ApplicationError::storage(e.to_string()))?;
                Ok(SpeakResult::File {
                    path,
                    content_type,
                    content_length,
                    cached: false,
                })
            }
            SpeakOutput::Stream {
                stream,
                content_type,
            } => {
                let stream = match self.cache.begin_write(&key, content_type).await {
                    Ok(Some(writer)) => tee_to_cache(stream, writer),
                    // 另一写入者已占据该 key，或缓存不可写：直接旁路
                    Ok(None) | Err(_) => stream,
                };
                Ok(SpeakResult::Stream {
                    stream,
                    content_type,
                })
            }
        }
    }

    /// 列出两端音色
    pub async fn list_voices(&self) -> VoiceCatalog {
        self.registry.list_all().await
    }

    /// 默认模式/音色选择
    ///
    /// 两端都为空时返回离线 + 空音色 id，调用方在播放前必须把
    /// 空音色清单当作错误状态处理。
    pub fn default_selection(catalog: &VoiceCatalog) -> DefaultSelection {
        let mode = if !catalog.offline.is_empty() {
            TtsMode::Offline
        } else if !catalog.online.is_empty() {
            TtsMode::Online
        } else {
            TtsMode::Offline
        };
        let voice = match mode {
            TtsMode::Offline => catalog.offline.first(),
            TtsMode::Online => catalog.online.first(),
        }
        .map(|v| v.id.clone())
        .unwrap_or_default();
        DefaultSelection { mode, voice }
    }

    /// 为延迟播放签发短时令牌
    pub fn issue_token(&self, owner_id: &str, request: SpeakRequest) -> String {
        let ttl = self
            .session_ttl
            .min(Duration::from_secs(MAX_TOKEN_TTL_SECS));
        self.tokens.issue(owner_id, request, ttl)
    }

    /// 解析令牌并校验属主
    ///
    /// 不存在、已过期、属主不符三种情况一律 NotFound，不泄露区别。
    pub fn resolve_token(&self, token: &str, owner_id: &str) -> Option<TokenEntry> {
        self.tokens
            .resolve(token)
            .filter(|entry| entry.owner_id == owner_id)
    }
}

/// 去除控制字符噪声并 trim；空结果由调用方拒绝
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// 把单次读取的源流扇出到调用方与缓存文件两个去向
///
/// - 调用方走有背压的通道，源的读取节奏由调用方决定
/// - 缓存写走 try_send：写入跟不上时放弃缓存而不拖慢调用方
/// - 源失败/调用方断开 → 缓存写中止并删除部分文件
/// - 只有源正常走完，缓存文件才会 commit
fn tee_to_cache(mut source: AudioStream, writer: Box<dyn CacheWriter>) -> AudioStream {
    let (caller_tx, caller_rx) = mpsc::channel::<std::io::Result<Bytes>>(16);
    let (cache_tx, cache_rx) = mpsc::channel::<CacheMessage>(64);

    tokio::spawn(cache_sink(cache_rx, writer));

    tokio::spawn(async move {
        let mut cache_tx = Some(cache_tx);
        while let Some(item) = source.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(tx) = &cache_tx {
                        if tx.try_send(CacheMessage::Chunk(chunk.clone())).is_err() {
                            // 缓存沉降跟不上：放弃本次填充
                            cache_tx = None;
                        }
                    }
                    if caller_tx.send(Ok(chunk)).await.is_err() {
                        // 调用方断开；丢弃 cache_tx 使缓存任务中止清理
                        return;
                    }
                }
                Err(err) => {
                    cache_tx = None;
                    let _ = caller_tx.send(Err(err)).await;
                    return;
                }
            }
        }
        if let Some(tx) = cache_tx {
            let _ = tx.send(CacheMessage::Done).await;
        }
    });

    futures_util::stream::unfold(caller_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

enum CacheMessage {
    Chunk(Bytes),
    Done,
}

/// 缓存沉降任务：通道未以 Done 收尾（源失败/调用方断开/被放弃）
/// 一律 abort，绝不留下看似完整的半成品文件
async fn cache_sink(mut rx: mpsc::Receiver<CacheMessage>, writer: Box<dyn CacheWriter>) {
    let mut writer = Some(writer);
    while let Some(message) = rx.recv().await {
        match message {
            CacheMessage::Chunk(chunk) => {
                if let Some(w) = writer.as_mut() {
                    if w.write(&chunk).await.is_err() {
                        if let Some(w) = writer.take() {
                            w.abort().await;
                        }
                        // 继续抽干通道，避免阻塞发送端
                    }
                }
            }
            CacheMessage::Done => {
                if let Some(w) = writer.take() {
                    if let Err(e) = w.commit().await {
                        tracing::warn!(error = %e, "TTS cache commit failed");
                    }
                }
                return;
            }
        }
    }
    if let Some(w) = writer.take() {
        w.abort().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::infrastructure::memory::InMemoryTokenStore;
    use crate::infrastructure::persistence::fs::FsAudioCache;

    /// 记录调用次数的假 Provider
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        payload: Vec<u8>,
        /// 每次产出的流分几块发
        chunks: usize,
        fail_mid_stream: bool,
    }

    impl CountingProvider {
        fn new(payload: &[u8]) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: calls.clone(),
                    payload: payload.to_vec(),
                    chunks: 4,
                    fail_mid_stream: false,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl TtsProviderPort for CountingProvider {
        async fn list_voices(&self) -> Result<Vec<Voice>, TtsError> {
            Ok(vec![Voice {
                id: "fake".to_string(),
                name: "Fake".to_string(),
                locale: None,
            }])
        }

        async fn speak(&self, _request: &ProviderSpeakRequest) -> Result<SpeakOutput, TtsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let chunk_size = (self.payload.len() / self.chunks).max(1);
            let mut items: Vec<std::io::Result<Bytes>> = self
                .payload
                .chunks(chunk_size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            if self.fail_mid_stream {
                items.truncate(1);
                items.push(Err(std::io::Error::other("synthesis died")));
            }
            Ok(SpeakOutput::Stream {
                stream: futures_util::stream::iter(items).boxed(),
                content_type: "audio/mpeg",
            })
        }
    }

    /// 产出完成文件而非流的假 Provider
    struct FileProvider {
        calls: Arc<AtomicUsize>,
        path: std::path::PathBuf,
    }

    #[async_trait]
    impl TtsProviderPort for FileProvider {
        async fn list_voices(&self) -> Result<Vec<Voice>, TtsError> {
            Ok(Vec::new())
        }

        async fn speak(&self, _request: &ProviderSpeakRequest) -> Result<SpeakOutput, TtsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SpeakOutput::File {
                path: self.path.clone(),
                content_type: "audio/mpeg",
            })
        }
    }

    fn speech_with(
        dir: &std::path::Path,
        provider: impl TtsProviderPort + 'static,
    ) -> SpeechService {
        let registry = TtsRegistry::new(None, Some(Arc::new(provider)));
        SpeechService::new(
            registry,
            Arc::new(FsAudioCache::new(dir.to_path_buf())),
            Arc::new(InMemoryTokenStore::new()),
            Duration::from_secs(3600),
        )
    }

    fn request(text: &str) -> SpeakRequest {
        SpeakRequest {
            mode: TtsMode::Offline,
            voice: "fake".to_string(),
            rate: None,
            text: text.to_string(),
        }
    }

    async fn collect(result: SpeakResult) -> Vec<u8> {
        match result {
            SpeakResult::File { path, .. } => tokio::fs::read(path).await.unwrap(),
            SpeakResult::Stream { mut stream, .. } => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk.unwrap());
                }
                out
            }
        }
    }

    #[tokio::test]
    async fn test_second_identical_speak_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, calls) = CountingProvider::new(b"AUDIOBYTES");
        let speech = speech_with(dir.path(), provider);

        let first = speech.speak(request("hello")).await.unwrap();
        assert_eq!(collect(first).await, b"AUDIOBYTES");

        // 等待缓存沉降任务 commit
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = speech.speak(request("hello")).await.unwrap();
        match &second {
            SpeakResult::File {
                cached,
                content_type,
                content_length,
                ..
            } => {
                assert!(cached);
                assert_eq!(*content_type, "audio/mpeg");
                assert_eq!(*content_length, 10);
            }
            SpeakResult::Stream { .. } => panic!("expected cache hit"),
        }
        assert_eq!(collect(second).await, b"AUDIOBYTES");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_text_misses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, calls) = CountingProvider::new(b"AUDIOBYTES");
        let speech = speech_with(dir.path(), provider);

        speech.speak(request("one")).await.unwrap();
        speech.speak(request("two")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_mode_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, _) = CountingProvider::new(b"X");
        let speech = speech_with(dir.path(), provider);

        let mut online = request("hello");
        online.mode = TtsMode::Online;
        let err = speech.speak(online).await;
        assert!(matches!(err, Err(ApplicationError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut provider, _) = CountingProvider::new(b"AUDIOBYTES");
        provider.fail_mid_stream = true;
        let speech = speech_with(dir.path(), provider);

        let result = speech.speak(request("doomed")).await.unwrap();
        match result {
            SpeakResult::Stream { mut stream, .. } => {
                let mut saw_error = false;
                while let Some(item) = stream.next().await {
                    if item.is_err() {
                        saw_error = true;
                    }
                }
                assert!(saw_error);
            }
            SpeakResult::File { .. } => panic!("expected stream"),
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        // 半成品必须被清除，后续请求不得命中
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "partial cache file left behind");
    }

    #[tokio::test]
    async fn test_concurrent_speaks_leave_one_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, calls) = CountingProvider::new(b"CONCURRENTAUDIO");
        let speech = Arc::new(speech_with(dir.path(), provider));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let speech = speech.clone();
            handles.push(tokio::spawn(async move {
                let result = speech.speak(request("same text")).await.unwrap();
                collect(result).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), b"CONCURRENTAUDIO");
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(entries.len(), 1, "exactly one cache file expected");
        let content = std::fs::read(entries[0].path()).unwrap();
        assert_eq!(content, b"CONCURRENTAUDIO");

        // 并发全部未命中是允许的，但之后必须命中
        let before = calls.load(Ordering::SeqCst);
        let result = speech.speak(request("same text")).await.unwrap();
        assert!(matches!(result, SpeakResult::File { cached: true, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_file_output_is_returned_as_is_and_copied_into_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let synth = dir.path().join("synth.mp3");
        std::fs::write(&synth, b"FILEAUDIO").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let speech = speech_with(
            &cache_dir,
            FileProvider {
                calls: calls.clone(),
                path: synth.clone(),
            },
        );

        // 首次：返回 Provider 的原始文件，同时复制进缓存
        let first = speech.speak(request("hello")).await.unwrap();
        match &first {
            SpeakResult::File {
                path,
                content_type,
                content_length,
                cached,
            } => {
                assert_eq!(path, &synth);
                assert_eq!(*content_type, "audio/mpeg");
                assert_eq!(*content_length, 9);
                assert!(!cached);
            }
            SpeakResult::Stream { .. } => panic!("expected file result"),
        }

        // 复制是同步完成的：第二次直接命中缓存条目，不再调 Provider
        let second = speech.speak(request("hello")).await.unwrap();
        match second {
            SpeakResult::File { path, cached, .. } => {
                assert!(cached);
                assert_ne!(path, synth);
            }
            SpeakResult::Stream { .. } => panic!("expected cache hit"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_round_trip_and_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, _) = CountingProvider::new(b"X");
        let speech = speech_with(dir.path(), provider);

        let token = speech.issue_token("alice", request("hi"));
        assert!(speech.resolve_token(&token, "alice").is_some());
        // 属主不符与不存在同样表现为 None
        assert!(speech.resolve_token(&token, "bob").is_none());
        assert!(speech.resolve_token("no-such-token", "alice").is_none());
    }

    #[test]
    fn test_default_selection_prefers_offline() {
        let voice = |id: &str| Voice {
            id: id.to_string(),
            name: id.to_string(),
            locale: None,
        };
        let both = VoiceCatalog {
            online: vec![voice("nova")],
            offline: vec![voice("amy")],
        };
        let selection = SpeechService::default_selection(&both);
        assert_eq!(selection.mode, TtsMode::Offline);
        assert_eq!(selection.voice, "amy");

        let online_only = VoiceCatalog {
            online: vec![voice("nova")],
            offline: vec![],
        };
        let selection = SpeechService::default_selection(&online_only);
        assert_eq!(selection.mode, TtsMode::Online);
        assert_eq!(selection.voice, "nova");

        let neither = VoiceCatalog {
            online: vec![],
            offline: vec![],
        };
        let selection = SpeechService::default_selection(&neither);
        assert_eq!(selection.mode, TtsMode::Offline);
        assert_eq!(selection.voice, "");
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  hello\u{0007} world \n"), "hello world");
        assert_eq!(sanitize_text("\u{0000}\u{0001}"), "");
    }
}
