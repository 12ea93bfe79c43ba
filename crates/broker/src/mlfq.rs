//! # MLFQ多级反馈队列
//!
//! 三级优先队列（Text=高 / Image=中 / Reel=低，级内FIFO），
//! 外加溢出队列与终态隔离队列。老化：低优先级任务等待超过
//! 阈值后提升为中优先级并改写类型，只升不降。

use std::collections::VecDeque;

use tracing::info;

use lbsim_core::models::{Task, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLevel {
    High,
    Medium,
    Low,
}

impl QueueLevel {
    pub const DISPATCH_ORDER: [QueueLevel; 3] =
        [QueueLevel::High, QueueLevel::Medium, QueueLevel::Low];
}

#[derive(Debug, Default)]
pub struct MlfqQueues {
    high: VecDeque<Task>,
    medium: VecDeque<Task>,
    low: VecDeque<Task>,
    overflow: VecDeque<Task>,
    /// 终态：隔离任务保留供检查，绝不再出队
    quarantine: Vec<Task>,
}

impl MlfqQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按任务类型入队
    pub fn push(&mut self, task: Task) {
        match task.task_type {
            TaskType::Text => self.high.push_back(task),
            TaskType::Image => self.medium.push_back(task),
            TaskType::Reel => self.low.push_back(task),
        }
    }

    /// 故障重试的快速通道：无视类型直接进高优先级队列
    pub fn push_high(&mut self, task: Task) {
        self.high.push_back(task);
    }

    pub fn push_quarantine(&mut self, task: Task) {
        self.quarantine.push(task);
    }

    pub fn queue(&self, level: QueueLevel) -> &VecDeque<Task> {
        match level {
            QueueLevel::High => &self.high,
            QueueLevel::Medium => &self.medium,
            QueueLevel::Low => &self.low,
        }
    }

    pub fn queue_mut(&mut self, level: QueueLevel) -> &mut VecDeque<Task> {
        match level {
            QueueLevel::High => &mut self.high,
            QueueLevel::Medium => &mut self.medium,
            QueueLevel::Low => &mut self.low,
        }
    }

    pub fn overflow(&self) -> &VecDeque<Task> {
        &self.overflow
    }

    pub fn quarantine(&self) -> &[Task] {
        &self.quarantine
    }

    /// 三个优先级队列是否全空（工作窃取的触发条件）
    pub fn is_idle(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty() && self.low.is_empty()
    }

    /// 排队中的任务总数（不含隔离）
    pub fn queued_len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len() + self.overflow.len()
    }

    /// 老化检查：低优先级队列中等待超过阈值的任务提升为中优先级，
    /// 类型改写为Image。单次调用每任务至多提升一次，且只升不降。
    /// 返回被提升的任务id。
    pub fn age_low_queue(&mut self, now: f64, threshold: f64) -> Vec<u64> {
        let mut promoted = Vec::new();
        let mut i = 0;
        while i < self.low.len() {
            let waited = self.low[i]
                .submission_time
                .map(|t| now - t)
                .unwrap_or(0.0);
            if waited > threshold {
                if let Some(mut task) = self.low.remove(i) {
                    task.task_type = TaskType::Image;
                    info!("任务 {} 老化提升: Low -> Medium", task.id);
                    promoted.push(task.id);
                    self.medium.push_back(task);
                } else {
                    i += 1;
                }
            } else {
                i += 1;
            }
        }
        promoted
    }

    /// 供对端窃取一批任务：按 溢出 -> 低 -> 中 的顺序，
    /// 高优先级队列绝不外流，总数不超过limit
    pub fn steal_batch(&mut self, limit: usize) -> Vec<Task> {
        let mut stolen = Vec::new();
        for source in [&mut self.overflow, &mut self.low, &mut self.medium] {
            while stolen.len() < limit {
                match source.pop_front() {
                    Some(task) => stolen.push(task),
                    None => break,
                }
            }
            if stolen.len() >= limit {
                break;
            }
        }
        stolen
    }

    /// 接管时按id取出任务，依次搜索高/中/低/溢出四个队列
    pub fn remove_by_id(&mut self, task_id: u64) -> Option<Task> {
        for queue in [
            &mut self.high,
            &mut self.medium,
            &mut self.low,
            &mut self.overflow,
        ] {
            if let Some(pos) = queue.iter().position(|t| t.id == task_id) {
                return queue.remove(pos);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reel_task(id: u64, submitted_at: f64) -> Task {
        let mut task = Task::new(id, 20_000_000, TaskType::Reel);
        task.mark_submitted(submitted_at);
        task
    }

    #[test]
    fn test_push_routes_by_type() {
        let mut queues = MlfqQueues::new();
        queues.push(Task::new(1, 5_000, TaskType::Text));
        queues.push(Task::new(2, 1_000_000, TaskType::Image));
        queues.push(Task::new(3, 20_000_000, TaskType::Reel));

        assert_eq!(queues.queue(QueueLevel::High).len(), 1);
        assert_eq!(queues.queue(QueueLevel::Medium).len(), 1);
        assert_eq!(queues.queue(QueueLevel::Low).len(), 1);
    }

    #[test]
    fn test_aging_promotes_once_and_rewrites_type() {
        let mut queues = MlfqQueues::new();
        queues.push(reel_task(1, 0.0));
        queues.push(reel_task(2, 8.0));

        // t=10: 任务1已等待10s > 5s，任务2仅2s
        let promoted = queues.age_low_queue(10.0, 5.0);
        assert_eq!(promoted, vec![1]);
        assert_eq!(queues.queue(QueueLevel::Low).len(), 1);
        assert_eq!(queues.queue(QueueLevel::Medium).len(), 1);
        // 类型改写为Image而非Text
        assert_eq!(queues.queue(QueueLevel::Medium)[0].task_type, TaskType::Image);

        // 再次老化扫描不重复提升（已不在低队列）
        let promoted = queues.age_low_queue(11.0, 5.0);
        assert!(promoted.is_empty());
        assert_eq!(queues.queue(QueueLevel::Medium).len(), 1);
    }

    #[test]
    fn test_steal_batch_order_and_limit() {
        let mut queues = MlfqQueues::new();
        queues.push(Task::new(1, 5_000, TaskType::Text)); // 高优先级，不可窃取
        queues.push(Task::new(2, 20_000_000, TaskType::Reel));
        queues.push(Task::new(3, 20_000_000, TaskType::Reel));
        queues.push(Task::new(4, 1_000_000, TaskType::Image));

        let stolen = queues.steal_batch(2);
        assert_eq!(stolen.len(), 2);
        // 溢出队列为空，先偷低优先级
        assert_eq!(stolen[0].id, 2);
        assert_eq!(stolen[1].id, 3);
        // 高优先级队列原封不动
        assert_eq!(queues.queue(QueueLevel::High).len(), 1);
        assert_eq!(queues.queue(QueueLevel::Medium).len(), 1);
    }

    #[test]
    fn test_steal_batch_never_exceeds_available() {
        let mut queues = MlfqQueues::new();
        queues.push(Task::new(1, 1_000_000, TaskType::Image));
        let stolen = queues.steal_batch(5);
        assert_eq!(stolen.len(), 1);
        assert!(queues.is_idle());

        // 空队列窃取为no-op
        assert!(queues.steal_batch(5).is_empty());
    }

    #[test]
    fn test_remove_by_id_searches_all_queues() {
        let mut queues = MlfqQueues::new();
        queues.push(Task::new(1, 5_000, TaskType::Text));
        queues.push(Task::new(2, 20_000_000, TaskType::Reel));

        assert_eq!(queues.remove_by_id(2).unwrap().id, 2);
        assert!(queues.remove_by_id(2).is_none());
        assert_eq!(queues.queued_len(), 1);
    }

    #[test]
    fn test_quarantine_is_terminal() {
        let mut queues = MlfqQueues::new();
        queues.push_quarantine(Task::new(7, 5_000, TaskType::Text));
        assert_eq!(queues.quarantine().len(), 1);
        // 隔离任务不参与窃取也不可按id取出
        assert!(queues.steal_batch(5).is_empty());
        assert!(queues.remove_by_id(7).is_none());
    }
}
