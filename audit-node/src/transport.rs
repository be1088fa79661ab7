//! 傳輸層與 piece 下載協議的抽象接口及錯誤分類
//!
//! 錯誤分類是審計裁定的基礎：撥號層（連接建立）錯誤與協議層
//! （撥號成功後的遠端狀態）錯誤必須嚴格區分，且各自攜帶可判別
//! 的原因。classify 模塊對這些封閉枚舉做模式匹配，將每個節點的
//! 下載結果映射為審計結果。

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{NodeId, OrderLimit};

/// 撥號層錯誤：連接未能建立
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 撥號超時
    #[error("dial deadline exceeded")]
    DeadlineExceeded,

    /// 連接失敗，原因未知
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// 其他傳輸層故障
    #[error("transport failure: {0}")]
    Other(String),
}

/// 協議層錯誤：撥號成功後遠端返回的結構化失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 節點明確表示沒有該 piece
    #[error("piece not found: {0}")]
    NotFound(String),

    /// 撥號成功但數據傳輸超時
    #[error("download deadline exceeded")]
    DeadlineExceeded,

    /// 未知的遠端狀態
    #[error("remote failure: {0}")]
    Unknown(String),
}

/// 單次份額下載的完整錯誤
///
/// Transport 與 Protocol 變體保留了錯誤發生在撥號前還是撥號後
/// 的信息，下游分類依賴這一區分
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// 讀取的字節數與 share_size 不符
    #[error("short read: got {got} bytes, want {want}")]
    ShortRead { got: usize, want: usize },
}

/// 撥號層接口：與單個儲存節點建立連接
///
/// 實現不負責超時預算；調用方（份額下載器）以 deadline 包裹
/// 撥號與下載全程
#[async_trait]
pub trait PieceTransport: Send + Sync {
    async fn dial(
        &self,
        node_id: NodeId,
        address: &str,
    ) -> Result<Box<dyn PieceConnection>, TransportError>;
}

/// 已建立的節點連接
///
/// 連接的釋放由所有權作用域保證：下載結束（無論成敗）後值被
/// 丟棄，底層資源隨之關閉
#[async_trait]
pub trait PieceConnection: Send {
    /// 按簽名許可下載 piece 的一段字節範圍
    ///
    /// 返回的字節數可能少於請求長度；恰好讀滿由調用方校驗
    async fn download(
        &mut self,
        limit: &OrderLimit,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, ProtocolError>;
}
