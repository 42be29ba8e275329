//! 遥测流水线指标
//!
//! 各阶段在处理每条消息时调用这些函数，经 `metrics` facade 导出到 Prometheus。

use metrics::{counter, gauge, histogram};

/// 记录从总线收到的原始消息
pub fn record_message_received(topic: &str) {
    counter!(
        "telemetry_messages_received_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// 记录解码成功
pub fn record_message_decoded(device_type: &str) {
    counter!(
        "telemetry_messages_decoded_total",
        "device_type" => device_type.to_string()
    )
    .increment(1);
}

/// 记录解码失败 (MalformedPayload)
pub fn record_decode_failure() {
    counter!("telemetry_decode_failures_total").increment(1);
}

/// 记录持久化结果
pub fn record_persist_result(sink_name: &str, success: bool) {
    if success {
        counter!(
            "telemetry_records_persisted_total",
            "sink" => sink_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            "telemetry_persist_failures_total",
            "sink" => sink_name.to_string()
        )
        .increment(1);
    }
}

/// 记录持久化耗时
pub fn record_persist_latency_ms(sink_name: &str, latency_ms: f64) {
    histogram!(
        "telemetry_persist_latency_ms",
        "sink" => sink_name.to_string()
    )
    .record(latency_ms);
}

/// 记录因队列满被丢弃的消息 (DropNewest 策略)
pub fn record_message_dropped(stage: &'static str) {
    counter!("telemetry_messages_dropped_total", "stage" => stage).increment(1);
}

/// 记录阶段输入队列深度
pub fn record_queue_depth(stage: &'static str, depth: usize) {
    gauge!("telemetry_queue_depth", "stage" => stage).set(depth as f64);
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// 生成摘要
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean(),
            std_dev: self.std_dev(),
        }
    }
}

/// 统计摘要
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.std_dev() - 2.5_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_empty_summary_display() {
        assert_eq!(RunningStats::default().summary().to_string(), "N/A");
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        record_message_received("iot-messages");
        record_message_decoded("TempRH");
        record_decode_failure();
        record_persist_result("log", true);
        record_persist_result("log", false);
        record_persist_latency_ms("log", 1.5);
        record_message_dropped("decode");
        record_queue_depth("persist", 3);
    }
}
