//! 下載結果分類模塊
//!
//! 將每個節點的份額下載結果確定性地映射為審計結果。判定表
//! （按序求值，首個命中生效）：
//!
//! 1. 無錯誤 → 成功
//! 2. 撥號超時 → 離線
//! 3. 撥號失敗（原因未知）→ 離線
//! 4. 其他撥號層錯誤 → 隔離
//! 5. 協議層「piece 不存在」→ 失敗
//! 6. 協議層下載超時（撥號已成功）→ 隔離
//! 7. 其他任何錯誤 → 隔離
//!
//! 只有兩種明確的撥號失敗計為離線（影響在線率信譽）；「piece
//! 不存在」是唯一直接判失敗的結果（節點聲稱沒有被明確授權請求
//! 的數據，結論性錯誤）；其餘一律隔離，留待複審再作裁定。

use crate::transport::{DownloadError, ProtocolError, TransportError};

/// 單個節點在一次審計中的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 份額成功下載
    Success,

    /// 節點不可達（影響在線率，不算審計失敗）
    Offline,

    /// 審計失敗（結論性，無複審機會）
    Failed,

    /// 結果不明確，節點進入隔離等待複審
    Contained,
}

/// 將份額下載錯誤映射為審計結果；`None` 表示下載成功
pub fn classify(error: Option<&DownloadError>) -> Outcome {
    match error {
        None => Outcome::Success,
        Some(DownloadError::Transport(TransportError::DeadlineExceeded)) => Outcome::Offline,
        Some(DownloadError::Transport(TransportError::ConnectionFailed(_))) => Outcome::Offline,
        Some(DownloadError::Transport(TransportError::Other(_))) => Outcome::Contained,
        Some(DownloadError::Protocol(ProtocolError::NotFound(_))) => Outcome::Failed,
        Some(DownloadError::Protocol(ProtocolError::DeadlineExceeded)) => Outcome::Contained,
        Some(DownloadError::Protocol(ProtocolError::Unknown(_))) => Outcome::Contained,
        Some(DownloadError::ShortRead { .. }) => Outcome::Contained,
    }
}
