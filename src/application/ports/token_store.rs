//! Token Store Port - 短时播放令牌
//!
//! 令牌把一次完整的合成请求折叠为一个可放进 URL 的不透明字符串。
//! 进程内存态，重启即失效；多实例部署需要外部存储（不在范围内）。

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::tts::SpeakRequest;

/// 令牌对应的条目
#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub request: SpeakRequest,
    pub owner_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Token Store Port
///
/// resolve 不区分"不存在 / 已过期"，统一返回 None；
/// 属主校验由调用方对比 owner_id 完成，同样只得到 None。
pub trait TokenStorePort: Send + Sync {
    /// 签发令牌，并顺带清理已过期条目
    fn issue(&self, owner_id: &str, request: SpeakRequest, ttl: Duration) -> String;

    /// 解析令牌；过期条目在首次失败查询时删除
    fn resolve(&self, token: &str) -> Option<TokenEntry>;
}
