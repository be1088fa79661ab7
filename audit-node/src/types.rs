//! 共享數據類型定義
//!
//! 本模塊定義審計引擎中各個子系統共享的數據結構

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuditError;
use crate::transport::DownloadError;

/// 節點 ID（32 字節標識符）
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// 由單一字節擴展生成 ID（測試與示例用）
    pub const fn from_byte(byte: u8) -> Self {
        Self([byte; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

/// Piece ID（32 字節，標識段在儲存節點上的根piece）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceId(pub [u8; 32]);

impl PieceId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self([byte; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceId({})", hex::encode(&self.0[..8]))
    }
}

/// 冗餘方案（糾刪碼參數）
///
/// 不變量: `0 < required_shares <= repair_shares <= success_shares <= total_shares`，
/// 且 `share_size > 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyScheme {
    /// 重建所需的最少份額數（k）
    pub required_shares: u16,

    /// 低於此數量觸發修復
    pub repair_shares: u16,

    /// 上傳視為成功的份額數
    pub success_shares: u16,

    /// 總份額數（n）
    pub total_shares: u16,

    /// 每個糾刪份額的字節數
    pub share_size: u32,
}

impl RedundancyScheme {
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.required_shares == 0
            || self.required_shares > self.repair_shares
            || self.repair_shares > self.success_shares
            || self.success_shares > self.total_shares
        {
            return Err(AuditError::InvalidRedundancy(format!(
                "share counts must satisfy 0 < required ({}) <= repair ({}) <= success ({}) <= total ({})",
                self.required_shares, self.repair_shares, self.success_shares, self.total_shares
            )));
        }
        if self.share_size == 0 {
            return Err(AuditError::InvalidRedundancy(
                "share_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 段的一個遠端piece：節點與其在糾刪碼中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePiece {
    pub node_id: NodeId,

    /// 糾刪碼中的piece編號（0 到 total_shares - 1）
    pub piece_num: u16,
}

/// 段指針元數據（衛星側記錄）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPointer {
    /// 創建時間戳；審計中途用於檢測段被刪除或覆寫
    pub created_at: DateTime<Utc>,

    /// 冗餘方案
    pub redundancy: RedundancyScheme,

    /// 根 piece ID（各節點的piece由此派生）
    pub root_piece_id: PieceId,

    /// 遠端piece列表（最多 total_shares 個，各在不同節點）
    pub pieces: Vec<RemotePiece>,
}

/// 審計條帶：段內一個垂直切片的座標
///
/// 由外部 cursor 在每個審計週期選取；單次 verify 調用內只讀
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stripe {
    /// 標識 project/bucket/object/segment 的邏輯路徑
    pub segment_path: String,

    /// 段內條帶編號
    pub index: i64,

    /// 選取時的段指針快照
    pub segment: SegmentPointer,
}

/// 許可授權的動作類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitAction {
    Get,
    GetAudit,
    GetRepair,
}

/// 簽名的、限時單次使用的下載許可
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLimit {
    /// 簽發許可的衛星
    pub satellite_id: NodeId,

    /// 許可指向的儲存節點
    pub node_id: NodeId,

    /// 儲存節點地址
    pub node_address: String,

    /// 被授權下載的piece
    pub piece_id: PieceId,

    /// 授權動作
    pub action: LimitAction,

    /// 單次使用序列號
    pub serial_number: [u8; 16],

    /// 授權下載的最大字節數
    pub limit_bytes: u64,

    /// 許可過期時間
    pub order_expiration: DateTime<Utc>,
}

/// 單次份額下載的結果
///
/// 每次下載嘗試產生一個；不可變，僅供分類與糾刪修正消費
#[derive(Debug)]
pub struct Share {
    /// 糾刪碼中的位置
    pub piece_num: u16,

    /// 份額所在節點
    pub node_id: NodeId,

    /// 成功時為恰好 share_size 字節，失敗時為已分類的錯誤
    pub result: Result<Vec<u8>, DownloadError>,
}

/// 待複審記錄（被隔離節點）
///
/// 節點審計結果不明確時由 Verifier 創建，複審時消費並刪除
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAudit {
    pub node_id: NodeId,

    pub piece_id: PieceId,

    /// 原審計的條帶編號
    pub stripe_index: i64,

    pub share_size: u32,

    /// 經糾刪修正後該piece應有內容的 SHA-256
    pub expected_share_hash: [u8; 32],
}

/// 審計引擎運行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// 每個節點的最低下載吞吐率（bytes/s）；0 表示不附加下載超時
    pub min_bytes_per_second: u64,

    /// 單次份額下載的最短超時（秒）
    pub min_download_timeout_secs: u64,

    /// 儲存節點 HTTP 請求超時（秒）
    pub http_timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            min_bytes_per_second: std::env::var("MIN_BYTES_PER_SECOND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(128),
            min_download_timeout_secs: std::env::var("MIN_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(25),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(required: u16, repair: u16, success: u16, total: u16) -> RedundancyScheme {
        RedundancyScheme {
            required_shares: required,
            repair_shares: repair,
            success_shares: success,
            total_shares: total,
            share_size: 256,
        }
    }

    #[test]
    fn test_redundancy_validation() {
        // 有效方案
        assert!(scheme(4, 5, 6, 6).validate().is_ok());
        assert!(scheme(1, 1, 1, 1).validate().is_ok());
        assert!(scheme(29, 35, 80, 95).validate().is_ok());

        // 無效方案
        assert!(scheme(0, 5, 6, 6).validate().is_err()); // required = 0
        assert!(scheme(6, 5, 6, 6).validate().is_err()); // required > repair
        assert!(scheme(4, 6, 5, 6).validate().is_err()); // repair > success
        assert!(scheme(4, 5, 7, 6).validate().is_err()); // success > total

        let mut zero_share = scheme(4, 5, 6, 6);
        zero_share.share_size = 0;
        assert!(zero_share.validate().is_err());
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from_byte(0xab);
        assert_eq!(id.to_string(), "ab".repeat(32));
        assert_eq!(format!("{:?}", id), format!("NodeId({})", "ab".repeat(8)));
    }

    #[test]
    fn test_default_config() {
        let config = VerifierConfig::default();
        assert!(config.min_download_timeout_secs > 0);
        assert!(config.http_timeout_secs > 0);
    }
}
