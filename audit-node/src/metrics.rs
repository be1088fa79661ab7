//! 審計指標上報接口
//!
//! 指標是觀測信號而非功能契約：接口為同步、不可失敗，
//! 實現不得阻塞審計流程。由調用方注入，引擎不持有全局狀態。

use tracing::debug;

/// 指標接收端
pub trait MetricsSink: Send + Sync {
    /// 累計計數器
    fn meter(&self, name: &'static str, count: usize);

    /// 整數觀測值
    fn observe_int(&self, name: &'static str, value: i64);

    /// 浮點觀測值
    fn observe_float(&self, name: &'static str, value: f64);
}

/// 丟棄所有指標
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn meter(&self, _name: &'static str, _count: usize) {}
    fn observe_int(&self, _name: &'static str, _value: i64) {}
    fn observe_float(&self, _name: &'static str, _value: f64) {}
}

/// 將指標寫入結構化日誌
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn meter(&self, name: &'static str, count: usize) {
        debug!(metric = name, count, "meter");
    }

    fn observe_int(&self, name: &'static str, value: i64) {
        debug!(metric = name, value, "observe");
    }

    fn observe_float(&self, name: &'static str, value: f64) {
        debug!(metric = name, value, "observe");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        meters: Mutex<Vec<(&'static str, usize)>>,
    }

    impl MetricsSink for Recording {
        fn meter(&self, name: &'static str, count: usize) {
            self.meters.lock().unwrap().push((name, count));
        }
        fn observe_int(&self, _name: &'static str, _value: i64) {}
        fn observe_float(&self, _name: &'static str, _value: f64) {}
    }

    #[test]
    fn test_sink_usable_as_trait_object() {
        let recording = Recording::default();
        let sink: &dyn MetricsSink = &recording;

        sink.meter("audit_success_nodes", 4);
        sink.observe_float("audited_percentage", 0.5);

        assert_eq!(
            recording.meters.lock().unwrap().as_slice(),
            &[("audit_success_nodes", 4)]
        );
    }
}
