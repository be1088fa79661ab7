//! 份額下載器模塊
//!
//! 給定簽名許可與條帶座標，從單個儲存節點下載一個糾刪份額。
//!
//! # 超時預算
//!
//! 配置了最低吞吐率時，單次下載的允許時長為
//! `max(share_size / min_bytes_per_second, min_download_timeout)`，
//! 同一個 deadline 覆蓋撥號與數據讀取全程：
//! - deadline 在撥號階段到期 → 撥號層超時（節點判離線）
//! - deadline 在撥號成功後到期 → 協議層超時（節點判隔離）
//!
//! 未配置吞吐率下限時不附加超時，僅受調用方取消約束。

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::transport::{DownloadError, PieceTransport, ProtocolError, TransportError};
use crate::types::{OrderLimit, Share};

/// 份額下載器
///
/// 可廉價克隆（內部共享傳輸層），每個並發下載任務持有一份
#[derive(Clone)]
pub struct ShareDownloader {
    transport: Arc<dyn PieceTransport>,
    min_bytes_per_second: u64,
    min_download_timeout: Duration,
}

impl ShareDownloader {
    pub fn new(
        transport: Arc<dyn PieceTransport>,
        min_bytes_per_second: u64,
        min_download_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            min_bytes_per_second,
            min_download_timeout,
        }
    }

    /// 計算單次下載允許的時長；未配置吞吐率下限時為 None
    fn budget(&self, share_size: u32) -> Option<Duration> {
        if self.min_bytes_per_second == 0 {
            return None;
        }
        let transfer = Duration::from_secs_f64(
            f64::from(share_size) / self.min_bytes_per_second as f64,
        );
        Some(transfer.max(self.min_download_timeout))
    }

    /// 下載一個份額
    ///
    /// 錯誤被完整保留在返回的 [`Share`] 中（含撥號層/協議層歸屬），
    /// 供分類消費；本方法自身不會失敗
    pub async fn download(
        &self,
        limit: &OrderLimit,
        stripe_index: i64,
        share_size: u32,
        piece_num: u16,
    ) -> Share {
        let result = self.fetch(limit, stripe_index, share_size).await;
        match &result {
            Ok(data) => debug!(
                node = %limit.node_id,
                piece = piece_num,
                bytes = data.len(),
                "share downloaded"
            ),
            Err(err) => debug!(
                node = %limit.node_id,
                piece = piece_num,
                error = %err,
                "share download failed"
            ),
        }
        Share {
            piece_num,
            node_id: limit.node_id,
            result,
        }
    }

    async fn fetch(
        &self,
        limit: &OrderLimit,
        stripe_index: i64,
        share_size: u32,
    ) -> Result<Vec<u8>, DownloadError> {
        debug_assert!(share_size > 0 && stripe_index >= 0);

        let offset = u64::from(share_size) * stripe_index as u64;
        let length = u64::from(share_size);
        let deadline = self.budget(share_size).map(|budget| Instant::now() + budget);

        let mut conn = match deadline {
            Some(deadline) => timeout_at(
                deadline,
                self.transport.dial(limit.node_id, &limit.node_address),
            )
            .await
            .map_err(|_| TransportError::DeadlineExceeded)??,
            None => self.transport.dial(limit.node_id, &limit.node_address).await?,
        };

        let data = match deadline {
            Some(deadline) => timeout_at(deadline, conn.download(limit, offset, length))
                .await
                .map_err(|_| ProtocolError::DeadlineExceeded)??,
            None => conn.download(limit, offset, length).await?,
        };

        if data.len() != share_size as usize {
            return Err(DownloadError::ShortRead {
                got: data.len(),
                want: share_size as usize,
            });
        }

        // 連接在此離開作用域，底層資源隨之釋放
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::transport::PieceConnection;
    use crate::types::{LimitAction, NodeId, PieceId};

    /// 可編程的測試傳輸層
    struct FakeTransport {
        dial_delay: Duration,
        download_delay: Duration,
        payload: Vec<u8>,
    }

    struct FakeConnection {
        download_delay: Duration,
        payload: Vec<u8>,
    }

    #[async_trait]
    impl PieceTransport for FakeTransport {
        async fn dial(
            &self,
            _node_id: NodeId,
            _address: &str,
        ) -> Result<Box<dyn PieceConnection>, TransportError> {
            tokio::time::sleep(self.dial_delay).await;
            Ok(Box::new(FakeConnection {
                download_delay: self.download_delay,
                payload: self.payload.clone(),
            }))
        }
    }

    #[async_trait]
    impl PieceConnection for FakeConnection {
        async fn download(
            &mut self,
            _limit: &OrderLimit,
            offset: u64,
            length: u64,
        ) -> Result<Vec<u8>, ProtocolError> {
            tokio::time::sleep(self.download_delay).await;
            let start = (offset as usize).min(self.payload.len());
            let end = (start + length as usize).min(self.payload.len());
            Ok(self.payload[start..end].to_vec())
        }
    }

    fn test_limit() -> OrderLimit {
        OrderLimit {
            satellite_id: NodeId::from_byte(0xff),
            node_id: NodeId::from_byte(1),
            node_address: "http://localhost:7777".to_string(),
            piece_id: PieceId::from_byte(9),
            action: LimitAction::GetAudit,
            serial_number: [0u8; 16],
            limit_bytes: 256,
            order_expiration: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn downloader(transport: FakeTransport, floor: u64) -> ShareDownloader {
        ShareDownloader::new(Arc::new(transport), floor, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_successful_download_reads_exact_range() {
        let transport = FakeTransport {
            dial_delay: Duration::ZERO,
            download_delay: Duration::ZERO,
            payload: (0..=255).collect(),
        };
        let dl = downloader(transport, 0);

        // stripe_index = 2, share_size = 64 → 偏移 128
        let share = dl.download(&test_limit(), 2, 64, 3).await;
        let data = share.result.expect("download should succeed");
        assert_eq!(data.len(), 64);
        assert_eq!(data[0], 128);
        assert_eq!(share.piece_num, 3);
    }

    #[tokio::test]
    async fn test_short_read_is_an_error() {
        let transport = FakeTransport {
            dial_delay: Duration::ZERO,
            download_delay: Duration::ZERO,
            payload: vec![7u8; 100],
        };
        let dl = downloader(transport, 0);

        let share = dl.download(&test_limit(), 0, 256, 0).await;
        assert_eq!(
            share.result.unwrap_err(),
            DownloadError::ShortRead { got: 100, want: 256 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_dial_times_out_as_transport_error() {
        let transport = FakeTransport {
            dial_delay: Duration::from_secs(3600),
            download_delay: Duration::ZERO,
            payload: vec![0u8; 256],
        };
        let dl = downloader(transport, 1024 * 1024);

        let share = dl.download(&test_limit(), 0, 256, 0).await;
        assert_eq!(
            share.result.unwrap_err(),
            DownloadError::Transport(TransportError::DeadlineExceeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_download_times_out_as_protocol_error() {
        let transport = FakeTransport {
            dial_delay: Duration::ZERO,
            download_delay: Duration::from_secs(3600),
            payload: vec![0u8; 256],
        };
        let dl = downloader(transport, 1024 * 1024);

        let share = dl.download(&test_limit(), 0, 256, 0).await;
        assert_eq!(
            share.result.unwrap_err(),
            DownloadError::Protocol(ProtocolError::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn test_budget_arithmetic() {
        let transport = FakeTransport {
            dial_delay: Duration::ZERO,
            download_delay: Duration::ZERO,
            payload: vec![],
        };

        // 吞吐率下限為 0 時無預算
        let dl = downloader(transport, 0);
        assert_eq!(dl.budget(256), None);

        // 大份額按吞吐率計算: 1 MiB / 1024 B/s = 1024s
        let transport = FakeTransport {
            dial_delay: Duration::ZERO,
            download_delay: Duration::ZERO,
            payload: vec![],
        };
        let dl = ShareDownloader::new(Arc::new(transport), 1024, Duration::from_secs(5));
        assert_eq!(dl.budget(1024 * 1024), Some(Duration::from_secs(1024)));

        // 小份額不低於最短超時
        assert_eq!(dl.budget(16), Some(Duration::from_secs(5)));
    }
}
