//! 儲存節點 HTTP 客戶端模塊
//!
//! [`PieceTransport`] 的 HTTP 實現，負責與儲存節點通信:
//! - 撥號階段: `GET /health` 探測節點可達性
//! - 下載階段: `GET /v1/pieces/{piece_id}` 按 Range 讀取字節範圍，
//!   簽名許可經 `x-order-limit` 頭轉發給節點驗證
//!
//! # 錯誤映射
//!
//! 審計分類依賴撥號層/協議層的嚴格區分:
//! - 健康探測超時 → 撥號超時（離線）
//! - 連接被拒/無法建立 → 撥號失敗（離線）
//! - HTTP 404 → piece 不存在（審計失敗）
//! - 撥號成功後請求超時 / 408 / 504 → 下載超時（隔離）
//! - 其他狀態碼與讀取錯誤 → 未知遠端錯誤（隔離）
//!
//! 審計下載不重試：超時與失敗本身就是審計要觀測的信號。

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::transport::{PieceConnection, PieceTransport, ProtocolError, TransportError};
use crate::types::{NodeId, OrderLimit};

/// 默認請求超時（秒）
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 轉發簽名許可的請求頭
const ORDER_LIMIT_HEADER: &str = "x-order-limit";

/// 儲存節點 HTTP 傳輸層
///
/// 單個實例服務所有節點；按節點地址撥號後返回綁定該節點的連接
pub struct StorageNodeClient {
    http_client: Client,
}

impl StorageNodeClient {
    /// 創建默認超時的客戶端
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// 創建帶自定義請求超時的客戶端
    pub fn with_timeout(timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { http_client }
    }
}

impl Default for StorageNodeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PieceTransport for StorageNodeClient {
    async fn dial(
        &self,
        node_id: NodeId,
        address: &str,
    ) -> Result<Box<dyn PieceConnection>, TransportError> {
        let url = format!("{}/health", address);
        debug!(node = %node_id, url = %url, "dialing storage node");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|err| dial_error(address, &err))?;

        if !response.status().is_success() {
            return Err(TransportError::Other(format!(
                "{}: health check returned HTTP {}",
                address,
                response.status()
            )));
        }

        Ok(Box::new(StorageNodeConnection {
            http_client: self.http_client.clone(),
            base_url: address.to_string(),
            node_id,
        }))
    }
}

/// 與單個儲存節點的已建立連接
pub struct StorageNodeConnection {
    http_client: Client,
    base_url: String,
    node_id: NodeId,
}

#[async_trait]
impl PieceConnection for StorageNodeConnection {
    async fn download(
        &mut self,
        limit: &OrderLimit,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, ProtocolError> {
        let url = piece_url(&self.base_url, limit);
        let order_limit = serde_json::to_string(limit)
            .map_err(|err| ProtocolError::Unknown(format!("order limit encoding: {}", err)))?;

        debug!(
            node = %self.node_id,
            url = %url,
            offset,
            length,
            "requesting piece range"
        );

        let response = self
            .http_client
            .get(&url)
            .header(ORDER_LIMIT_HEADER, order_limit)
            .header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", offset, offset + length - 1),
            )
            .send()
            .await
            .map_err(|err| request_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(status_error(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| request_error(&err))?;
        Ok(bytes.to_vec())
    }
}

fn piece_url(base_url: &str, limit: &OrderLimit) -> String {
    format!("{}/v1/pieces/{}", base_url, limit.piece_id)
}

/// 撥號階段的 reqwest 錯誤映射
fn dial_error(address: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::DeadlineExceeded
    } else if err.is_connect() {
        TransportError::ConnectionFailed(format!("{}: {}", address, err))
    } else {
        TransportError::Other(format!("{}: {}", address, err))
    }
}

/// 撥號成功後的 reqwest 錯誤映射
fn request_error(err: &reqwest::Error) -> ProtocolError {
    if err.is_timeout() {
        ProtocolError::DeadlineExceeded
    } else {
        ProtocolError::Unknown(err.to_string())
    }
}

/// 非成功狀態碼映射為協議層錯誤
fn status_error(status: StatusCode, body: &str) -> ProtocolError {
    match status {
        StatusCode::NOT_FOUND => ProtocolError::NotFound(body.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ProtocolError::DeadlineExceeded
        }
        _ => ProtocolError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
