//! 合成负载生成
//!
//! 按类型权重抽取任务类型，长度在该类型的指令数区间内
//! 均匀抽取。相同种子产生完全相同的负载序列。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lbsim_core::models::{Task, TaskType};

/// 类型权重：文本短任务为主，图片次之，短视频最少
const TYPE_WEIGHTS: [(TaskType, f64); 3] = [
    (TaskType::Text, 0.6),
    (TaskType::Image, 0.3),
    (TaskType::Reel, 0.1),
];

pub struct WorkloadGenerator {
    rng: StdRng,
    next_id: u64,
}

impl WorkloadGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            next_id: 1,
        }
    }

    /// 生成一批任务，编号在生成器生命周期内全局唯一
    pub fn generate(&mut self, count: usize) -> Vec<Task> {
        (0..count).map(|_| self.next_task()).collect()
    }

    fn next_task(&mut self) -> Task {
        let task_type = self.pick_type();
        let (min, max) = task_type.mi_range();
        let length_mi = self.rng.random_range(min..=max);
        let id = self.next_id;
        self.next_id += 1;
        Task::new(id, length_mi, task_type)
    }

    fn pick_type(&mut self) -> TaskType {
        let roll: f64 = self.rng.random_range(0.0..1.0);
        let mut acc = 0.0;
        for (task_type, weight) in TYPE_WEIGHTS {
            acc += weight;
            if roll < acc {
                return task_type;
            }
        }
        TaskType::Reel
    }
}
