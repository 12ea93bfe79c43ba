use serde::{Deserialize, Serialize};

/// 任务类型，同时决定其MLFQ优先级：
/// Text = 高优先级，Image = 中优先级，Reel = 低优先级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    Text,
    Image,
    Reel,
}

impl TaskType {
    /// 该类型任务长度（MI）的取值区间，用于归一化
    pub fn mi_range(&self) -> (u64, u64) {
        match self {
            TaskType::Text => (1_000, 10_000),
            TaskType::Image => (500_000, 30_000_000),
            TaskType::Reel => (10_000_000, 1_000_000_000),
        }
    }

    /// 任务长度在其类型区间内的归一化比例，截断到 [0, 1]
    pub fn normalized_demand(&self, length_mi: u64) -> f64 {
        let (min, max) = self.mi_range();
        if max == min {
            return 0.0;
        }
        let p = (length_mi as f64 - min as f64) / (max as f64 - min as f64);
        p.clamp(0.0, 1.0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Text => "Text",
            TaskType::Image => "Image",
            TaskType::Reel => "Reel",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Queued,
    Running,
    Success,
    Quarantined,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Quarantined => "QUARANTINED",
        }
    }
}

/// 仿真任务。不变式：任一时刻任务只存在于一个位置
/// （某个优先级队列 / 溢出队列 / 隔离队列 / 某VM上在途）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,
    pub length_mi: u64,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// 首次入队时间，用于老化判定，仅在未设置时写入
    pub submission_time: Option<f64>,
    /// 最早一次提交时间，设置一次后不再改变，用于端到端时延统计
    pub original_submission_time: Option<f64>,
    pub retry_count: u32,
    pub assigned_vm: Option<u32>,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
}

impl Task {
    pub fn new(id: u64, length_mi: u64, task_type: TaskType) -> Self {
        Self {
            id,
            length_mi,
            task_type,
            status: TaskStatus::Created,
            submission_time: None,
            original_submission_time: None,
            retry_count: 0,
            assigned_vm: None,
            start_time: None,
            finish_time: None,
        }
    }

    /// 仅首次入队时记录提交时间
    pub fn mark_submitted(&mut self, now: f64) {
        if self.submission_time.is_none() {
            self.submission_time = Some(now);
        }
    }

    /// 最早提交时间只写一次，重试与重入队均不覆盖
    pub fn mark_original_submission(&mut self, now: f64) {
        if self.original_submission_time.is_none() {
            self.original_submission_time = Some(now);
        }
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// 从最早提交到最终完成的真实响应时间
    pub fn true_response_time(&self) -> Option<f64> {
        match (self.original_submission_time, self.finish_time) {
            (Some(orig), Some(finish)) => Some(finish - orig),
            (None, Some(finish)) => self.submission_time.map(|s| finish - s),
            _ => None,
        }
    }
}
