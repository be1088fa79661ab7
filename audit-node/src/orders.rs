//! 訂單服務接口
//!
//! 審計引擎不簽發許可，只向外部訂單服務請求。許可按piece編號
//! 對齊返回，無法簽發的位置為 None（節點離線、已取消資格或在
//! 跳過集中）；對審計引擎而言這些情況一律計為離線。

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::types::{NodeId, OrderLimit, PieceId, SegmentPointer};

/// 訂單服務錯誤
#[derive(Error, Debug)]
pub enum OrdersError {
    /// 節點不可達，無法為其簽發許可
    #[error("node {0} is offline")]
    NodeOffline(NodeId),

    /// 其他訂單服務故障
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 簽名許可服務接口
#[async_trait]
pub trait OrderService: Send + Sync {
    /// 為段的每個遠端piece簽發審計下載許可
    ///
    /// 返回向量以piece編號為索引，長度等於冗餘方案的
    /// total_shares；無法簽發的位置為 None
    async fn create_audit_order_limits(
        &self,
        auditor_id: NodeId,
        bucket_id: &str,
        pointer: &SegmentPointer,
        skip: &HashSet<NodeId>,
    ) -> Result<Vec<Option<OrderLimit>>, OrdersError>;

    /// 為單個節點的複審簽發許可
    ///
    /// 節點不可達時返回 [`OrdersError::NodeOffline`]，調用方據此
    /// 將節點計為離線而非錯誤
    async fn create_audit_order_limit(
        &self,
        auditor_id: NodeId,
        bucket_id: &str,
        node_id: NodeId,
        piece_id: PieceId,
        share_size: u32,
    ) -> Result<OrderLimit, OrdersError>;
}
