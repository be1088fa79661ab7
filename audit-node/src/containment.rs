//! 隔離存儲模塊
//!
//! 持久化待複審記錄：審計結果不明確的節點以 node ID 為鍵寫入，
//! 複審通過或記錄失效時刪除。接口只要求單鍵原子性；並發複審
//! 任務操作不同的鍵，引擎內部不需要跨任務加鎖。
//!
//! 內存實現用單一互斥鎖守護主映射與按到期時間排序的索引，
//! 在每次訪問時惰性清掃過期記錄。

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::types::{NodeId, PendingAudit};

/// 隔離存儲錯誤
#[derive(Error, Debug)]
pub enum ContainmentError {
    /// 節點沒有待複審記錄
    #[error("pending audit not found for node {0}")]
    NotFound(NodeId),

    /// 存儲 I/O 故障
    #[error("containment store failure: {0}")]
    Io(String),
}

/// 待複審記錄存儲接口
#[async_trait]
pub trait Containment: Send + Sync {
    async fn get(&self, node_id: NodeId) -> Result<PendingAudit, ContainmentError>;

    /// 寫入或覆蓋節點的待複審記錄
    async fn put(&self, pending: PendingAudit) -> Result<(), ContainmentError>;

    /// 刪除節點的待複審記錄；返回記錄先前是否存在
    async fn delete(&self, node_id: NodeId) -> Result<bool, ContainmentError>;
}

struct Inner {
    entries: HashMap<NodeId, (PendingAudit, Option<Instant>)>,
    expirations: BTreeSet<(Instant, NodeId)>,
}

/// 內存隔離存儲
///
/// 可選 TTL：配置後記錄在 TTL 過後對讀取不可見並被惰性移除。
/// 默認不過期，與持久化實現的語義一致。
pub struct MemoryContainment {
    inner: Mutex<Inner>,
    ttl: Option<Duration>,
}

impl MemoryContainment {
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                expirations: BTreeSet::new(),
            }),
            ttl,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, ContainmentError> {
        self.inner
            .lock()
            .map_err(|_| ContainmentError::Io("containment lock poisoned".to_string()))
    }
}

impl Default for MemoryContainment {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// 移除所有已到期的記錄
    fn sweep(&mut self, now: Instant) {
        while let Some(&(expires_at, node_id)) = self.expirations.iter().next() {
            if expires_at > now {
                break;
            }
            self.expirations.remove(&(expires_at, node_id));
            self.entries.remove(&node_id);
            debug!(node = %node_id, "expired pending audit swept");
        }
    }

    fn unindex(&mut self, node_id: NodeId) {
        if let Some((_, Some(expires_at))) = self.entries.get(&node_id) {
            self.expirations.remove(&(*expires_at, node_id));
        }
    }
}

#[async_trait]
impl Containment for MemoryContainment {
    async fn get(&self, node_id: NodeId) -> Result<PendingAudit, ContainmentError> {
        let mut inner = self.lock()?;
        inner.sweep(Instant::now());
        inner
            .entries
            .get(&node_id)
            .map(|(pending, _)| pending.clone())
            .ok_or(ContainmentError::NotFound(node_id))
    }

    async fn put(&self, pending: PendingAudit) -> Result<(), ContainmentError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.sweep(now);

        let node_id = pending.node_id;
        inner.unindex(node_id);

        let expires_at = self.ttl.map(|ttl| now + ttl);
        if let Some(expires_at) = expires_at {
            inner.expirations.insert((expires_at, node_id));
        }
        inner.entries.insert(node_id, (pending, expires_at));
        Ok(())
    }

    async fn delete(&self, node_id: NodeId) -> Result<bool, ContainmentError> {
        let mut inner = self.lock()?;
        inner.sweep(Instant::now());
        inner.unindex(node_id);
        Ok(inner.entries.remove(&node_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceId;

    fn pending(node: u8) -> PendingAudit {
        PendingAudit {
            node_id: NodeId::from_byte(node),
            piece_id: PieceId::from_byte(0x10),
            stripe_index: 5,
            share_size: 256,
            expected_share_hash: [node; 32],
        }
    }

    #[tokio::test]
    async fn test_put_get_delete_round_trip() {
        let store = MemoryContainment::new();
        let record = pending(1);

        store.put(record.clone()).await.unwrap();
        assert_eq!(store.get(record.node_id).await.unwrap(), record);

        assert!(store.delete(record.node_id).await.unwrap());
        assert!(!store.delete(record.node_id).await.unwrap());
        assert!(matches!(
            store.get(record.node_id).await,
            Err(ContainmentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_node_is_not_found() {
        let store = MemoryContainment::new();
        assert!(matches!(
            store.get(NodeId::from_byte(9)).await,
            Err(ContainmentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_record() {
        let store = MemoryContainment::new();
        let mut record = pending(2);
        store.put(record.clone()).await.unwrap();

        record.stripe_index = 99;
        store.put(record.clone()).await.unwrap();
        assert_eq!(store.get(record.node_id).await.unwrap().stripe_index, 99);
    }

    #[tokio::test]
    async fn test_ttl_expires_records() {
        let store = MemoryContainment::with_ttl(Some(Duration::from_millis(10)));
        let record = pending(3);
        store.put(record.clone()).await.unwrap();
        assert!(store.get(record.node_id).await.is_ok());

        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(
            store.get(record.node_id).await,
            Err(ContainmentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_without_ttl_records_persist() {
        let store = MemoryContainment::new();
        let record = pending(4);
        store.put(record.clone()).await.unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get(record.node_id).await.is_ok());
    }
}
