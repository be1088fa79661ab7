//! 審計引擎統一錯誤類型定義
//!
//! 本模塊定義審計過程中的系統性（調用層級）錯誤，
//! 使用 thiserror crate 提供良好的錯誤鏈和上下文信息。
//!
//! 單個節點的下載錯誤不在此處：它們由 transport 模塊的
//! [`DownloadError`](crate::transport::DownloadError) 封閉枚舉表示，
//! 被 classify 模塊完全吸收為節點分類，永不上升為調用層級失敗。

use thiserror::Error;

use crate::report::Report;

/// 審計調用層級錯誤
///
/// 涵蓋所有使單次 verify/reverify 無法完整進行的系統性情況：
/// - 段在審計期間被刪除或覆寫
/// - 乾淨下載的份額不足以重建
/// - 糾刪碼修正無法收斂
/// - 外部協作方（訂單服務、元數據、隔離存儲）故障
#[derive(Error, Debug)]
pub enum AuditError {
    /// 段在審計期間被刪除或替換
    ///
    /// 通過比較指針創建時間戳檢測；總是中止當前 verify 調用
    #[error("segment deleted during audit: {path}")]
    SegmentDeleted { path: String },

    /// 成功下載的份額數少於重建所需
    #[error("not enough shares for successful audit: got {got}, required {required}")]
    NotEnoughShares { got: usize, required: usize },

    /// 糾刪碼修正失敗
    ///
    /// 表示「此條帶審計無結論」，而非任何節點層級的裁定
    #[error("erasure correction failed: {0}")]
    Erasure(#[from] stripe_fec::FecError),

    /// 冗餘方案參數無效
    #[error("invalid redundancy scheme: {0}")]
    InvalidRedundancy(String),

    /// 訂單服務錯誤
    #[error("order service error: {0}")]
    Orders(String),

    /// 元數據查詢錯誤
    #[error("metainfo error: {0}")]
    Metainfo(String),

    /// 隔離存儲 I/O 錯誤
    ///
    /// 複審期間按節點累積，不使其他節點的處理失敗
    #[error("containment store error: {0}")]
    Containment(String),

    /// 配置錯誤
    #[error("configuration error: {0}")]
    Config(String),

    /// 複審期間累積的多個錯誤
    #[error("{}", format_combined(.0))]
    Combined(Vec<AuditError>),

    /// 通用錯誤
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_combined(errors: &[AuditError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 審計調用失敗：錯誤連同已累積的部分報告一併返回
///
/// 部分報告中的離線/失敗節點是有效結論，調用方不得因為
/// 存在錯誤而丟棄報告
#[derive(Error, Debug)]
#[error("{error}")]
pub struct AuditFailure {
    pub error: AuditError,
    pub report: Report,
}

impl AuditFailure {
    pub fn new(error: AuditError, report: Report) -> Self {
        Self { error, report }
    }
}

/// Result 類型別名
///
/// 使用統一的錯誤類型簡化函數簽名
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_error_message() {
        let combined = AuditError::Combined(vec![
            AuditError::Containment("db unavailable".to_string()),
            AuditError::Orders("signing failed".to_string()),
        ]);
        assert_eq!(
            combined.to_string(),
            "containment store error: db unavailable; order service error: signing failed"
        );
    }

    #[test]
    fn test_failure_keeps_partial_report() {
        let mut report = Report::default();
        report.offlines.push(crate::types::NodeId::from_byte(1));

        let failure = AuditFailure::new(
            AuditError::NotEnoughShares { got: 2, required: 4 },
            report,
        );
        assert_eq!(failure.report.offlines.len(), 1);
        assert_eq!(
            failure.to_string(),
            "not enough shares for successful audit: got 2, required 4"
        );
    }
}
