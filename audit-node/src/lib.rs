//! 分佈式對象存儲審計驗證引擎
//!
//! 本 crate 實現衛星側的審計驗證引擎，負責:
//! 1. 對條帶的所有遠端 piece 併發下載糾刪份額
//! 2. 將每個節點的下載結果確定性分類（成功/離線/失敗/隔離）
//! 3. 以糾刪碼修正檢測內容篡改
//! 4. 為結果不明的節點生成待複審記錄，並支持複審協議
//!
//! # 架構
//!
//! ```text
//! ┌──────────────┐
//! │   Verifier   │  ← 核心審計邏輯
//! └──────┬───────┘
//!        │
//!   ┌────┴─────┬──────────┬───────────┬───────────┐
//!   ▼          ▼          ▼           ▼           ▼
//! Orders    Share      Outcome   Containment   Metrics
//! Service  Downloader Classifier    Store        Sink
//! ```
//!
//! 條帶選取（cursor）、許可簽名、信譽更新與報告持久化均在本
//! crate 之外；引擎只消費它們的接口，產出 [`Report`]。

// 公開模塊
pub mod classify;
pub mod config;
pub mod containment;
pub mod downloader;
pub mod error;
pub mod metainfo;
pub mod metrics;
pub mod orders;
pub mod report;
pub mod storage_node_client; // PieceTransport 的 HTTP 實現
pub mod transport;
pub mod types;
pub mod verifier;

// Re-export 常用類型
pub use error::{AuditError, AuditFailure, Result};
pub use report::{Report, ReportStats};
pub use types::{
    NodeId, OrderLimit, PendingAudit, PieceId, RedundancyScheme, RemotePiece, SegmentPointer,
    Share, Stripe, VerifierConfig,
};
pub use verifier::Verifier;
