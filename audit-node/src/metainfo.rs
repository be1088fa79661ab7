//! 段指針元數據查詢接口
//!
//! 審計引擎只在一處使用元數據：下載完成後重新查詢段指針，
//! 通過創建時間戳比較檢測段在審計期間被刪除或覆寫。

use async_trait::async_trait;
use thiserror::Error;

use crate::types::SegmentPointer;

/// 元數據查詢錯誤
#[derive(Error, Debug)]
pub enum MetainfoError {
    /// 路徑下沒有段指針
    #[error("segment not found: {0}")]
    NotFound(String),

    /// 其他元數據存儲故障
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 段指針存儲接口
#[async_trait]
pub trait PointerStore: Send + Sync {
    async fn get(&self, segment_path: &str) -> Result<SegmentPointer, MetainfoError>;
}
