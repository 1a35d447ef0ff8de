use std::collections::VecDeque;

/// 滚动基线窗口
///
/// 保存最近 N 个读数，FIFO 淘汰最旧值。均值/方差靠增量维护的
/// sum 与 sum_sq 得到，每次插入摊还 O(1)，不会全量重算。
#[derive(Debug)]
pub struct BaselineWindow {
    values: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    sum_sq: f64,
}

impl BaselineWindow {
    /// 容量下限为 1，窗口永远有界
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// 插入新值，窗口满时淘汰最旧值
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            if let Some(evicted) = self.values.pop_front() {
                self.sum -= evicted;
                self.sum_sq -= evicted * evicted;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum / self.values.len() as f64
    }

    /// 总体方差；浮点误差可能产生微小负值，截到 0
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let n = self.values.len() as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bounded_by_capacity() {
        let mut window = BaselineWindow::new(5);
        for i in 0..20 {
            window.push(i as f64);
        }
        assert_eq!(window.len(), 5);
        // 最旧的被 FIFO 淘汰，剩 15..=19
        assert!((window.mean() - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_incremental_stats_match_naive() {
        let mut window = BaselineWindow::new(8);
        let values = [3.2, 7.9, 1.1, 4.4, 9.6, 2.3, 5.5, 8.8, 6.1, 0.7];
        for v in values {
            window.push(v);
        }

        // 与朴素全量计算对比（窗口里是最后 8 个）
        let tail = &values[2..];
        let mean: f64 = tail.iter().sum::<f64>() / tail.len() as f64;
        let var: f64 = tail.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / tail.len() as f64;

        assert!((window.mean() - mean).abs() < 1e-9);
        assert!((window.variance() - var).abs() < 1e-9);
    }

    #[test]
    fn test_constant_signal_has_zero_variance() {
        let mut window = BaselineWindow::new(10);
        for _ in 0..10 {
            window.push(42.0);
        }
        assert_eq!(window.variance(), 0.0);
        assert_eq!(window.stddev(), 0.0);
    }

    #[test]
    fn test_zero_capacity_stays_bounded() {
        let mut window = BaselineWindow::new(0);
        for i in 0..10 {
            window.push(i as f64);
        }
        // 容量被抬到 1，只保留最新值
        assert_eq!(window.len(), 1);
        assert!((window.mean() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window() {
        let window = BaselineWindow::new(4);
        assert!(window.is_empty());
        assert_eq!(window.mean(), 0.0);
        assert_eq!(window.variance(), 0.0);
    }
}
