//! 核心審計驗證邏輯模塊
//!
//! 對單個條帶執行一次審計（verify）以及對先前被隔離節點的
//! 複審（reverify）。
//!
//! # Verify 狀態機
//!
//! ```text
//! 簽發許可 → 併發下載份額 → 校驗段未變 → 分類結果
//!          → 糾刪修正 → 生成待複審記錄 → 組裝報告
//! ```
//!
//! 無回環；「校驗段未變」或「糾刪修正」失敗時直接短路到報告
//! 組裝，錯誤連同已累積的離線/失敗數據一併返回。
//!
//! # 併發模型
//!
//! 每個遠端節點派發一個下載任務，經計數屏障收齊全部結果後，
//! 分類、修正與報告組裝在單線程內順序完成。任務集在丟棄時中止
//! 所有在途任務，父級取消得以傳播。結果以piece編號為鍵，桶歸屬
//! 與任務完成順序無關。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use stripe_fec::{Fec, Share as FecShare};

use crate::classify::{classify, Outcome};
use crate::containment::{Containment, ContainmentError};
use crate::downloader::ShareDownloader;
use crate::error::{AuditError, AuditFailure};
use crate::metainfo::{MetainfoError, PointerStore};
use crate::metrics::MetricsSink;
use crate::orders::{OrderService, OrdersError};
use crate::report::{Report, ReportStats};
use crate::transport::PieceTransport;
use crate::types::{
    NodeId, OrderLimit, PendingAudit, SegmentPointer, Share, Stripe, VerifierConfig,
};

/// 條帶審計驗證器
pub struct Verifier {
    metainfo: Arc<dyn PointerStore>,
    orders: Arc<dyn OrderService>,
    containment: Arc<dyn Containment>,
    metrics: Arc<dyn MetricsSink>,
    downloader: ShareDownloader,
    auditor_id: NodeId,
}

impl Verifier {
    pub fn new(
        metainfo: Arc<dyn PointerStore>,
        orders: Arc<dyn OrderService>,
        containment: Arc<dyn Containment>,
        transport: Arc<dyn PieceTransport>,
        metrics: Arc<dyn MetricsSink>,
        auditor_id: NodeId,
        config: &VerifierConfig,
    ) -> Self {
        let downloader = ShareDownloader::new(
            transport,
            config.min_bytes_per_second,
            Duration::from_secs(config.min_download_timeout_secs),
        );
        Self {
            metainfo,
            orders,
            containment,
            metrics,
            downloader,
            auditor_id,
        }
    }

    /// 對指定條帶執行一次完整審計
    ///
    /// `skip` 中的節點（如已取消資格者）不簽發許可也不計入任何桶。
    /// 系統性失敗（段被刪除、份額不足、修正失敗）時，錯誤連同
    /// 已累積的部分報告一併返回；部分報告中的離線/失敗節點是
    /// 有效結論。
    pub async fn verify(
        &self,
        stripe: &Stripe,
        skip: &HashSet<NodeId>,
    ) -> Result<Report, AuditFailure> {
        let pointer = &stripe.segment;
        if let Err(err) = pointer.redundancy.validate() {
            return Err(AuditFailure::new(err, Report::default()));
        }
        let redundancy = pointer.redundancy;
        let bucket = bucket_id(&stripe.segment_path).unwrap_or_default();

        let limits = match self
            .orders
            .create_audit_order_limits(self.auditor_id, &bucket, pointer, skip)
            .await
        {
            Ok(limits) => limits,
            Err(err) => {
                return Err(AuditFailure::new(
                    AuditError::Orders(err.to_string()),
                    Report::default(),
                ))
            }
        };

        // 沒有拿到許可的節點（含已取消資格者）直接計為離線
        let mut offline_nodes = offline_nodes(pointer, &limits, skip);
        if !offline_nodes.is_empty() {
            debug!(
                nodes = ?offline_nodes,
                "order limits not created for some nodes (offline/disqualified)"
            );
        }

        let shares = self
            .download_shares(&limits, stripe.index, redundancy.share_size)
            .await;

        if let Err(err) = self.check_segment_unchanged(stripe).await {
            return Err(AuditFailure::new(
                err,
                Report {
                    offlines: offline_nodes,
                    ..Report::default()
                },
            ));
        }

        let mut failed_nodes: Vec<NodeId> = Vec::new();
        let mut contained: HashMap<u16, NodeId> = HashMap::new();
        let mut shares_to_audit: Vec<&Share> = Vec::new();

        for share in shares.values() {
            match classify(share.result.as_ref().err()) {
                Outcome::Success => shares_to_audit.push(share),
                Outcome::Offline => {
                    debug!(
                        node = %share.node_id,
                        error = ?share.result.as_ref().err(),
                        "dial failed or timed out (offline)"
                    );
                    offline_nodes.push(share.node_id);
                }
                Outcome::Failed => {
                    debug!(
                        node = %share.node_id,
                        error = ?share.result.as_ref().err(),
                        "piece not found (audit failed)"
                    );
                    failed_nodes.push(share.node_id);
                }
                Outcome::Contained => {
                    debug!(
                        node = %share.node_id,
                        error = ?share.result.as_ref().err(),
                        "ambiguous failure (contained)"
                    );
                    contained.insert(share.piece_num, share.node_id);
                }
            }
        }

        let required = usize::from(redundancy.required_shares);
        let total = usize::from(redundancy.total_shares);

        if shares_to_audit.len() < required {
            return Err(AuditFailure::new(
                AuditError::NotEnoughShares {
                    got: shares_to_audit.len(),
                    required,
                },
                Report {
                    fails: failed_nodes,
                    offlines: offline_nodes,
                    ..Report::default()
                },
            ));
        }

        let (altered_pieces, corrected) = match audit_shares(required, total, &shares_to_audit) {
            Ok(result) => result,
            Err(err) => {
                return Err(AuditFailure::new(
                    err,
                    Report {
                        fails: failed_nodes,
                        offlines: offline_nodes,
                        ..Report::default()
                    },
                ))
            }
        };

        // 內容與修正結果不符的節點判為審計失敗，覆蓋其下載成功
        // 的分類：網絡層通過不等於審計層通過
        for &piece_num in &altered_pieces {
            if let Some(share) = shares.get(&piece_num) {
                warn!(
                    node = %share.node_id,
                    piece = usize::from(piece_num),
                    "share content mismatch after correction (audit failed)"
                );
                failed_nodes.push(share.node_id);
            }
        }

        let success_nodes = success_nodes(&shares, &failed_nodes, &offline_nodes, &contained);

        let stats = ReportStats::new(
            success_nodes.len(),
            failed_nodes.len(),
            offline_nodes.len(),
            contained.len(),
            pointer.pieces.len(),
        );
        emit_verify_metrics(self.metrics.as_ref(), &stats);

        let pending_audits = match create_pending_audits(&contained, &corrected, stripe) {
            Ok(pending) => pending,
            Err(err) => {
                return Err(AuditFailure::new(
                    err,
                    Report {
                        successes: success_nodes,
                        fails: failed_nodes,
                        offlines: offline_nodes,
                        ..Report::default()
                    },
                ))
            }
        };

        info!(
            successes = success_nodes.len(),
            fails = failed_nodes.len(),
            offlines = offline_nodes.len(),
            contained = pending_audits.len(),
            "stripe audit complete"
        );

        Ok(Report {
            successes: success_nodes,
            fails: failed_nodes,
            offlines: offline_nodes,
            pending_audits,
        })
    }

    /// 併發下載所有已簽發許可的份額
    ///
    /// 同步屏障：每個派發的任務恰好貢獻一個結果，全部收齊後才
    /// 返回。結果以piece編號為鍵；沒有許可的位置不派發任務。
    pub async fn download_shares(
        &self,
        limits: &[Option<OrderLimit>],
        stripe_index: i64,
        share_size: u32,
    ) -> HashMap<u16, Share> {
        let mut tasks = JoinSet::new();
        for (piece_num, limit) in limits.iter().enumerate() {
            let Some(limit) = limit.clone() else { continue };
            let downloader = self.downloader.clone();
            tasks.spawn(async move {
                downloader
                    .download(&limit, stripe_index, share_size, piece_num as u16)
                    .await
            });
        }

        let mut shares = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(share) => {
                    shares.insert(share.piece_num, share);
                }
                Err(err) => error!(error = %err, "share download task failed"),
            }
        }
        shares
    }

    /// 複審當前段中持有待複審記錄的節點
    ///
    /// 只重新下載有記錄的piece，不對整個條帶重新審計。每個節點
    /// 的終態: 成功 / 離線 / 失敗 / 再次隔離（沿用原期望哈希）/
    /// 跳過（記錄已不存在）。隔離存儲自身的 I/O 錯誤逐節點累積，
    /// 與部分報告一併返回，不中斷其他節點的處理。
    pub async fn reverify(&self, stripe: &Stripe) -> Result<Report, AuditFailure> {
        enum Status {
            Skipped,
            Success,
            Offline,
            Failed,
            Contained(PendingAudit),
            Erred(AuditError),
        }

        let pieces = &stripe.segment.pieces;
        let bucket = bucket_id(&stripe.segment_path).unwrap_or_default();
        let mut results: Vec<(NodeId, Status)> = Vec::new();
        let mut tasks: JoinSet<(NodeId, Status)> = JoinSet::new();
        let mut contained_in_segment = 0i64;

        for piece in pieces {
            let pending = match self.containment.get(piece.node_id).await {
                Ok(pending) => pending,
                Err(ContainmentError::NotFound(_)) => {
                    results.push((piece.node_id, Status::Skipped));
                    continue;
                }
                Err(err) => {
                    debug!(node = %piece.node_id, error = %err, "error getting from containment store");
                    results.push((
                        piece.node_id,
                        Status::Erred(AuditError::Containment(err.to_string())),
                    ));
                    continue;
                }
            };
            contained_in_segment += 1;

            let orders = Arc::clone(&self.orders);
            let containment = Arc::clone(&self.containment);
            let downloader = self.downloader.clone();
            let auditor_id = self.auditor_id;
            let bucket = bucket.clone();
            let node_id = piece.node_id;
            let piece_num = piece.piece_num;

            tasks.spawn(async move {
                let limit = match orders
                    .create_audit_order_limit(
                        auditor_id,
                        &bucket,
                        pending.node_id,
                        pending.piece_id,
                        pending.share_size,
                    )
                    .await
                {
                    Ok(limit) => limit,
                    Err(OrdersError::NodeOffline(_)) => {
                        debug!(node = %node_id, "order limit not created (offline)");
                        return (node_id, Status::Offline);
                    }
                    Err(err) => {
                        debug!(node = %node_id, error = %err, "error creating order limit");
                        return (node_id, Status::Erred(AuditError::Orders(err.to_string())));
                    }
                };

                let share = downloader
                    .download(&limit, pending.stripe_index, pending.share_size, piece_num)
                    .await;

                // 下載期間記錄可能已被其他審計週期移除；消失則跳
                // 過，避免重複計數
                match containment.get(node_id).await {
                    Ok(_) => {}
                    Err(ContainmentError::NotFound(_)) => {
                        debug!(node = %node_id, "pending audit deleted during reverification");
                        return (node_id, Status::Skipped);
                    }
                    Err(err) => {
                        debug!(node = %node_id, error = %err, "error getting from containment store");
                        return (
                            node_id,
                            Status::Erred(AuditError::Containment(err.to_string())),
                        );
                    }
                }

                match &share.result {
                    Err(err) => match classify(Some(err)) {
                        Outcome::Offline => {
                            debug!(node = %node_id, error = %err, "dial failed or timed out (offline)");
                            (node_id, Status::Offline)
                        }
                        Outcome::Failed => {
                            debug!(node = %node_id, error = %err, "piece not found (audit failed)");
                            (node_id, Status::Failed)
                        }
                        _ => {
                            debug!(node = %node_id, error = %err, "ambiguous failure (contained)");
                            (node_id, Status::Contained(pending))
                        }
                    },
                    Ok(data) => {
                        if sha256(data) == pending.expected_share_hash {
                            debug!(node = %node_id, "hashes match (audit success)");
                            (node_id, Status::Success)
                        } else {
                            debug!(node = %node_id, "hash mismatch (audit failed)");
                            (node_id, Status::Failed)
                        }
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(error = %err, "reverification task failed"),
            }
        }

        let mut report = Report::default();
        let mut errors: Vec<AuditError> = Vec::new();
        for (node_id, status) in results {
            match status {
                Status::Skipped => {}
                Status::Success => report.successes.push(node_id),
                Status::Offline => report.offlines.push(node_id),
                Status::Failed => report.fails.push(node_id),
                Status::Contained(pending) => report.pending_audits.push(pending),
                Status::Erred(err) => errors.push(err),
            }
        }

        emit_reverify_metrics(
            self.metrics.as_ref(),
            &report,
            contained_in_segment,
            pieces.len(),
        );

        info!(
            successes = report.successes.len(),
            fails = report.fails.len(),
            offlines = report.offlines.len(),
            contained = report.pending_audits.len(),
            errors = errors.len(),
            "reverification complete"
        );

        if errors.is_empty() {
            Ok(report)
        } else {
            let error = if errors.len() == 1 {
                errors.remove(0)
            } else {
                AuditError::Combined(errors)
            };
            Err(AuditFailure::new(error, report))
        }
    }

    /// 校驗條帶選取後段指針未被刪除或替換（比較創建時間戳）
    async fn check_segment_unchanged(&self, stripe: &Stripe) -> Result<(), AuditError> {
        let pointer = match self.metainfo.get(&stripe.segment_path).await {
            Ok(pointer) => pointer,
            Err(MetainfoError::NotFound(_)) => {
                return Err(AuditError::SegmentDeleted {
                    path: stripe.segment_path.clone(),
                })
            }
            Err(MetainfoError::Other(err)) => return Err(AuditError::Metainfo(err.to_string())),
        };

        if pointer.created_at != stripe.segment.created_at {
            return Err(AuditError::SegmentDeleted {
                path: stripe.segment_path.clone(),
            });
        }
        Ok(())
    }
}

/// 以糾刪碼修正下載成功的份額
///
/// 返回內容與修正結果不符的piece編號，以及修正後的完整份額集
fn audit_shares(
    required: usize,
    total: usize,
    shares: &[&Share],
) -> Result<(Vec<u16>, Vec<FecShare>), AuditError> {
    let fec = Fec::new(required, total)?;

    let mut originals = Vec::with_capacity(shares.len());
    for share in shares {
        if let Ok(data) = &share.result {
            originals.push(FecShare::new(usize::from(share.piece_num), data.clone()));
        }
    }

    let corrected = fec.correct(&originals)?;

    let mut altered = Vec::new();
    for fixed in &corrected {
        if let Some(original) = originals.iter().find(|o| o.number == fixed.number) {
            if original.data != fixed.data {
                altered.push(original.number as u16);
            }
        }
    }
    Ok((altered, corrected))
}

/// 找出指針中沒有獲得簽發許可且不在跳過集中的節點
fn offline_nodes(
    pointer: &SegmentPointer,
    limits: &[Option<OrderLimit>],
    skip: &HashSet<NodeId>,
) -> Vec<NodeId> {
    let with_limit: HashSet<NodeId> = limits.iter().flatten().map(|l| l.node_id).collect();
    pointer
        .pieces
        .iter()
        .map(|piece| piece.node_id)
        .filter(|id| !with_limit.contains(id) && !skip.contains(id))
        .collect()
}

/// 根據失敗/離線/隔離集合推導通過審計的節點
fn success_nodes(
    shares: &HashMap<u16, Share>,
    failed: &[NodeId],
    offline: &[NodeId],
    contained: &HashMap<u16, NodeId>,
) -> Vec<NodeId> {
    let mut excluded: HashSet<NodeId> = HashSet::new();
    excluded.extend(failed.iter().copied());
    excluded.extend(offline.iter().copied());
    excluded.extend(contained.values().copied());

    shares
        .values()
        .filter(|share| !excluded.contains(&share.node_id))
        .map(|share| share.node_id)
        .collect()
}

/// 由段路徑推導 bucket ID: `project_id/bucket_name`
fn bucket_id(segment_path: &str) -> Option<String> {
    let comps: Vec<&str> = segment_path.split('/').collect();
    if comps.len() < 3 {
        return None;
    }
    Some(format!("{}/{}", comps[0], comps[2]))
}

/// 為每個被隔離節點重建其份額的期望哈希並生成待複審記錄
///
/// 由修正後的份額重建條帶，再按piece編號單獨編碼出該節點
/// 應持有的份額，其 SHA-256 即複審時的比對基準
fn create_pending_audits(
    contained: &HashMap<u16, NodeId>,
    corrected: &[FecShare],
    stripe: &Stripe,
) -> Result<Vec<PendingAudit>, AuditError> {
    if contained.is_empty() {
        return Ok(Vec::new());
    }

    let redundancy = &stripe.segment.redundancy;
    let fec = Fec::new(
        usize::from(redundancy.required_shares),
        usize::from(redundancy.total_shares),
    )?;

    let stripe_data = fec.rebuild(corrected)?;

    let mut pending = Vec::with_capacity(contained.len());
    for (&piece_num, &node_id) in contained {
        let expected_share = fec.encode_single(&stripe_data, usize::from(piece_num))?;
        pending.push(PendingAudit {
            node_id,
            piece_id: stripe.segment.root_piece_id,
            stripe_index: stripe.index,
            share_size: redundancy.share_size,
            expected_share_hash: sha256(&expected_share),
        });
    }
    Ok(pending)
}

/// SHA-256 摘要
fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn emit_verify_metrics(metrics: &dyn MetricsSink, stats: &ReportStats) {
    metrics.meter("audit_success_nodes_global", stats.successful);
    metrics.meter("audit_fail_nodes_global", stats.failed);
    metrics.meter("audit_offline_nodes_global", stats.offline);
    metrics.meter("audit_contained_nodes_global", stats.contained);
    metrics.meter("audit_total_nodes_global", stats.total_audited);
    metrics.meter("audit_total_pointer_nodes_global", stats.total_in_pointer);

    metrics.observe_int("audit_success_nodes", stats.successful as i64);
    metrics.observe_int("audit_fail_nodes", stats.failed as i64);
    metrics.observe_int("audit_offline_nodes", stats.offline as i64);
    metrics.observe_int("audit_contained_nodes", stats.contained as i64);
    metrics.observe_int("audit_total_nodes", stats.total_audited as i64);
    metrics.observe_int("audit_total_pointer_nodes", stats.total_in_pointer as i64);
    metrics.observe_float("audited_percentage", stats.audited_percentage);
    metrics.observe_float("audit_successful_percentage", stats.success_percentage);
    metrics.observe_float("audit_failed_percentage", stats.fail_percentage);
    metrics.observe_float("audit_offline_percentage", stats.offline_percentage);
    metrics.observe_float("audit_contained_percentage", stats.contained_percentage);
}

fn emit_reverify_metrics(
    metrics: &dyn MetricsSink,
    report: &Report,
    contained_in_segment: i64,
    total_in_segment: usize,
) {
    metrics.meter("reverify_successes_global", report.successes.len());
    metrics.meter("reverify_offlines_global", report.offlines.len());
    metrics.meter("reverify_fails_global", report.fails.len());
    metrics.meter("reverify_contained_global", report.pending_audits.len());

    metrics.observe_int("reverify_successes", report.successes.len() as i64);
    metrics.observe_int("reverify_offlines", report.offlines.len() as i64);
    metrics.observe_int("reverify_fails", report.fails.len() as i64);
    metrics.observe_int("reverify_contained", report.pending_audits.len() as i64);

    metrics.observe_int("reverify_contained_in_segment", contained_in_segment);
    metrics.observe_int("reverify_total_in_segment", total_in_segment as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::types::{LimitAction, PieceId, RedundancyScheme, RemotePiece};

    fn test_limit(node: u8) -> OrderLimit {
        OrderLimit {
            satellite_id: NodeId::from_byte(0xff),
            node_id: NodeId::from_byte(node),
            node_address: format!("http://node-{}.example:7777", node),
            piece_id: PieceId::from_byte(0x42),
            action: LimitAction::GetAudit,
            serial_number: [node; 16],
            limit_bytes: 256,
            order_expiration: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn test_pointer(node_count: u8) -> SegmentPointer {
        SegmentPointer {
            created_at: Utc::now(),
            redundancy: RedundancyScheme {
                required_shares: 2,
                repair_shares: 3,
                success_shares: 4,
                total_shares: 4,
                share_size: 8,
            },
            root_piece_id: PieceId::from_byte(0x42),
            pieces: (0..node_count)
                .map(|i| RemotePiece {
                    node_id: NodeId::from_byte(i + 1),
                    piece_num: u16::from(i),
                })
                .collect(),
        }
    }

    #[test]
    fn test_bucket_id_derivation() {
        assert_eq!(
            bucket_id("project-1/s0/my-bucket/path/to/object"),
            Some("project-1/my-bucket".to_string())
        );
        assert_eq!(
            bucket_id("project-1/l/my-bucket"),
            Some("project-1/my-bucket".to_string())
        );
        assert_eq!(bucket_id("project-1/s0"), None);
        assert_eq!(bucket_id(""), None);
    }

    #[test]
    fn test_offline_nodes_excludes_skip_set() {
        let pointer = test_pointer(4);
        // 節點 1 與 2 有許可，節點 3、4 沒有
        let limits = vec![Some(test_limit(1)), Some(test_limit(2)), None, None];
        // 節點 4 在跳過集中
        let skip: HashSet<NodeId> = [NodeId::from_byte(4)].into_iter().collect();

        let offline = offline_nodes(&pointer, &limits, &skip);
        assert_eq!(offline, vec![NodeId::from_byte(3)]);
    }

    #[test]
    fn test_success_nodes_excludes_all_failure_buckets() {
        let mut shares: HashMap<u16, Share> = HashMap::new();
        for i in 1..=4u8 {
            shares.insert(
                u16::from(i - 1),
                Share {
                    piece_num: u16::from(i - 1),
                    node_id: NodeId::from_byte(i),
                    result: Ok(vec![0u8; 8]),
                },
            );
        }

        let failed = vec![NodeId::from_byte(2)];
        let offline = vec![NodeId::from_byte(3)];
        let mut contained = HashMap::new();
        contained.insert(3u16, NodeId::from_byte(4));

        let mut successes = success_nodes(&shares, &failed, &offline, &contained);
        successes.sort();
        assert_eq!(successes, vec![NodeId::from_byte(1)]);
    }

    #[test]
    fn test_audit_shares_flags_altered_content() {
        let fec = Fec::new(2, 4).unwrap();
        let stripe_data: Vec<u8> = (0..16).collect();
        let encoded = fec.encode(&stripe_data).unwrap();

        let mut shares: Vec<Share> = encoded
            .iter()
            .map(|s| Share {
                piece_num: s.number as u16,
                node_id: NodeId::from_byte(s.number as u8 + 1),
                result: Ok(s.data.clone()),
            })
            .collect();

        // 節點 2（piece 1）返回被改動的內容
        if let Ok(data) = shares[1].result.as_mut() {
            data[0] ^= 0xff;
        }

        let refs: Vec<&Share> = shares.iter().collect();
        let (altered, corrected) = audit_shares(2, 4, &refs).unwrap();
        assert_eq!(altered, vec![1]);
        assert_eq!(corrected.len(), 4);

        // 修正後的份額應與原始編碼一致
        for fixed in &corrected {
            assert_eq!(fixed.data, encoded[fixed.number].data);
        }
    }

    #[test]
    fn test_sha256_is_stable() {
        let a = sha256(b"share data");
        let b = sha256(b"share data");
        let c = sha256(b"other data");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
