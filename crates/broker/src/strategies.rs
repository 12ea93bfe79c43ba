//! # 放置策略
//!
//! 统一的策略接口取代按子类划分的broker实现：每个算法一个
//! 实现，由配置选择。VM任务计数由broker持有并在放置/释放时
//! 维护，策略只读。

use std::collections::HashMap;

use tracing::debug;

use lbsim_core::config::{SchedulerConfig, StrategyKind};
use lbsim_core::models::{Task, Vm};

/// 放置策略接口：从候选VM中为一个任务挑选目标。
/// 返回None表示没有VM可接纳，调用方必须将任务留在队列中。
pub trait PlacementStrategy {
    fn pick_vm(&mut self, vms: &[Vm], task_counts: &HashMap<u32, u32>, task: &Task) -> Option<u32>;

    fn name(&self) -> &'static str;
}

pub fn make_strategy(kind: StrategyKind, config: &SchedulerConfig) -> Box<dyn PlacementStrategy> {
    match kind {
        StrategyKind::Sbdlb => Box::new(SbdlbStrategy::new(config.task_threshold)),
        StrategyKind::RoundRobin => Box::new(RoundRobinStrategy::new()),
        StrategyKind::WeightedRoundRobin => Box::new(WeightedRoundRobinStrategy::new()),
        StrategyKind::HoneyBee => Box::new(HoneyBeeStrategy::new()),
    }
}

fn count_of(task_counts: &HashMap<u32, u32>, vm_id: u32) -> u32 {
    task_counts.get(&vm_id).copied().unwrap_or(0)
}

/// 评分式动态负载均衡（SBDLB）
///
/// 1. 准入过滤：并发任务数达到阈值的VM直接排除
/// 2. 可用容量按均分近似估算：available = total − total × count / T
///    （刻意的简化模型，下游评分依赖此近似，不做精确记账）
/// 3. 任务需求 = VM总容量 × 任务长度在类型区间内的归一化比例
/// 4. 任一维度可用量不足即拒绝，得分 = 三维可用量之和
/// 5. 取最高分，平分保留先遍历到的VM，无随机性
pub struct SbdlbStrategy {
    threshold: u32,
}

impl SbdlbStrategy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    fn available(&self, total: f64, count: u32) -> f64 {
        let used = total * count as f64 / self.threshold as f64;
        (total - used).max(0.0)
    }
}

impl PlacementStrategy for SbdlbStrategy {
    fn pick_vm(&mut self, vms: &[Vm], task_counts: &HashMap<u32, u32>, task: &Task) -> Option<u32> {
        let demand = task.task_type.normalized_demand(task.length_mi);
        let mut best: Option<(u32, f64)> = None;

        for vm in vms {
            let count = count_of(task_counts, vm.id);
            if count >= self.threshold {
                continue;
            }

            let avail_mips = self.available(vm.total_mips(), count);
            let avail_ram = self.available(vm.ram, count);
            let avail_bw = self.available(vm.bw, count);

            // 需求按VM总容量的比例计算，而非可用容量
            let req_mips = vm.total_mips() * demand;
            let req_ram = vm.ram * demand;
            let req_bw = vm.bw * demand;

            if avail_mips < req_mips || avail_ram < req_ram || avail_bw < req_bw {
                debug!("VM #{} 资源不足，跳过 (任务 {})", vm.id, task.id);
                continue;
            }

            let score = avail_mips + avail_ram + avail_bw;
            // 严格大于才替换：平分保留先遍历到的VM
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((vm.id, score));
            }
        }

        best.map(|(id, _)| id)
    }

    fn name(&self) -> &'static str {
        "SBDLB"
    }
}

/// 轮询策略：按候选列表顺序循环分发
pub struct RoundRobinStrategy {
    cursor: usize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for RoundRobinStrategy {
    fn pick_vm(&mut self, vms: &[Vm], _task_counts: &HashMap<u32, u32>, _task: &Task) -> Option<u32> {
        if vms.is_empty() {
            return None;
        }
        let vm = &vms[self.cursor % vms.len()];
        self.cursor += 1;
        Some(vm.id)
    }

    fn name(&self) -> &'static str {
        "RoundRobin"
    }
}

/// 加权轮询：权重 = VM总算力 / 最小总算力，经典交错加权轮询
pub struct WeightedRoundRobinStrategy {
    weights: Vec<u32>,
    current_index: usize,
    current_weight: i64,
    gcd: i64,
    max_weight: i64,
    started: bool,
}

impl WeightedRoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            weights: Vec::new(),
            current_index: 0,
            current_weight: 0,
            gcd: 1,
            max_weight: 0,
            started: false,
        }
    }

    fn init_weights(&mut self, vms: &[Vm]) {
        let min_mips = vms
            .iter()
            .map(Vm::total_mips)
            .fold(f64::INFINITY, f64::min);
        self.weights = vms
            .iter()
            .map(|vm| ((vm.total_mips() / min_mips) as u32).max(1))
            .collect();
        self.max_weight = i64::from(*self.weights.iter().max().unwrap_or(&1));
        self.gcd = self
            .weights
            .iter()
            .map(|&w| i64::from(w))
            .fold(0, gcd_i64)
            .max(1);
        self.current_index = 0;
        self.current_weight = 0;
        self.started = false;
        debug!("WRR权重初始化: {:?} (gcd: {})", self.weights, self.gcd);
    }
}

fn gcd_i64(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd_i64(b, a % b)
    }
}

impl Default for WeightedRoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for WeightedRoundRobinStrategy {
    fn pick_vm(&mut self, vms: &[Vm], _task_counts: &HashMap<u32, u32>, _task: &Task) -> Option<u32> {
        if vms.is_empty() {
            return None;
        }
        // 候选池变化（如接管合并VM）时重新计算权重
        if self.weights.len() != vms.len() {
            self.init_weights(vms);
        }

        loop {
            if self.started {
                self.current_index = (self.current_index + 1) % self.weights.len();
            } else {
                self.started = true;
            }
            if self.current_index == 0 {
                self.current_weight -= self.gcd;
                if self.current_weight <= 0 {
                    self.current_weight = self.max_weight;
                }
            }
            if i64::from(self.weights[self.current_index]) >= self.current_weight {
                return Some(vms[self.current_index].id);
            }
        }
    }

    fn name(&self) -> &'static str {
        "WeightedRoundRobin"
    }
}

/// 蜂群觅食策略：当前"蜜源"未过载时持续利用，
/// 过载后摇摆舞切换到负载最低的VM
pub struct HoneyBeeStrategy {
    current: Option<u32>,
    cutoff: u32,
}

impl HoneyBeeStrategy {
    const CUTOFF_THRESHOLD: u32 = 2;

    pub fn new() -> Self {
        Self {
            current: None,
            cutoff: Self::CUTOFF_THRESHOLD,
        }
    }

    fn waggle_dance(&self, vms: &[Vm], task_counts: &HashMap<u32, u32>) -> Option<u32> {
        vms.iter()
            .map(|vm| (vm.id, count_of(task_counts, vm.id)))
            .min_by_key(|&(_, load)| load)
            .map(|(id, _)| id)
    }
}

impl Default for HoneyBeeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for HoneyBeeStrategy {
    fn pick_vm(&mut self, vms: &[Vm], task_counts: &HashMap<u32, u32>, _task: &Task) -> Option<u32> {
        if vms.is_empty() {
            return None;
        }
        let current = match self.current {
            Some(id) if vms.iter().any(|vm| vm.id == id) => id,
            _ => vms[0].id,
        };

        let picked = if count_of(task_counts, current) < self.cutoff {
            current
        } else {
            self.waggle_dance(vms, task_counts).unwrap_or(current)
        };
        self.current = Some(picked);
        Some(picked)
    }

    fn name(&self) -> &'static str {
        "HoneyBee"
    }
}
