//! 審計報告模塊
//!
//! [`Report`] 是審計引擎對外的唯一產出，交由調用方送入信譽
//! 更新與隔離持久化。一次 verify/reverify 構建一份，構建後不再
//! 修改。

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, PendingAudit};

/// 一次審計的結果報告
///
/// 不變量：段遠端piece列表引用的每個節點，在一次成功的
/// verify/reverify 後恰好出現在一個桶中（或被有意跳過），
/// 沒有節點結果被丟棄
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// 通過審計的節點
    pub successes: Vec<NodeId>,

    /// 審計失敗的節點（piece 缺失或內容被改動）
    pub fails: Vec<NodeId>,

    /// 不可達的節點
    pub offlines: Vec<NodeId>,

    /// 進入隔離、等待複審的節點記錄
    pub pending_audits: Vec<PendingAudit>,
}

impl Report {
    /// 本次審計實際得出結論的節點總數
    pub fn total_audited(&self) -> usize {
        self.successes.len() + self.fails.len() + self.offlines.len() + self.pending_audits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_audited() == 0
    }

    /// 對照指針中的piece總數推導統計值
    pub fn stats(&self, total_in_pointer: usize) -> ReportStats {
        ReportStats::new(
            self.successes.len(),
            self.fails.len(),
            self.offlines.len(),
            self.pending_audits.len(),
            total_in_pointer,
        )
    }
}

/// 審計統計（供指標上報）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportStats {
    pub successful: usize,
    pub failed: usize,
    pub offline: usize,
    pub contained: usize,
    pub total_audited: usize,
    pub total_in_pointer: usize,
    pub audited_percentage: f64,
    pub success_percentage: f64,
    pub fail_percentage: f64,
    pub offline_percentage: f64,
    pub contained_percentage: f64,
}

impl ReportStats {
    pub fn new(
        successful: usize,
        failed: usize,
        offline: usize,
        contained: usize,
        total_in_pointer: usize,
    ) -> Self {
        let total_audited = successful + failed + offline + contained;
        let ratio = |part: usize| {
            if total_audited > 0 {
                part as f64 / total_audited as f64
            } else {
                0.0
            }
        };
        let audited_percentage = if total_in_pointer > 0 {
            total_audited as f64 / total_in_pointer as f64
        } else {
            0.0
        };

        Self {
            successful,
            failed,
            offline,
            contained,
            total_audited,
            total_in_pointer,
            audited_percentage,
            success_percentage: ratio(successful),
            fail_percentage: ratio(failed),
            offline_percentage: ratio(offline),
            contained_percentage: ratio(contained),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PieceId;

    #[test]
    fn test_empty_report() {
        let report = Report::default();
        assert!(report.is_empty());
        assert_eq!(report.total_audited(), 0);

        let stats = report.stats(0);
        assert_eq!(stats.audited_percentage, 0.0);
        assert_eq!(stats.success_percentage, 0.0);
    }

    #[test]
    fn test_stats_percentages() {
        let report = Report {
            successes: vec![NodeId::from_byte(1), NodeId::from_byte(2)],
            fails: vec![NodeId::from_byte(3)],
            offlines: vec![NodeId::from_byte(4)],
            pending_audits: vec![PendingAudit {
                node_id: NodeId::from_byte(5),
                piece_id: PieceId::from_byte(0),
                stripe_index: 0,
                share_size: 256,
                expected_share_hash: [0; 32],
            }],
        };

        let stats = report.stats(6);
        assert_eq!(stats.total_audited, 5);
        assert_eq!(stats.total_in_pointer, 6);
        assert_eq!(stats.success_percentage, 2.0 / 5.0);
        assert_eq!(stats.fail_percentage, 1.0 / 5.0);
        assert_eq!(stats.offline_percentage, 1.0 / 5.0);
        assert_eq!(stats.contained_percentage, 1.0 / 5.0);
        assert_eq!(stats.audited_percentage, 5.0 / 6.0);
    }
}
