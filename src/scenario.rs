//! 仿真场景装配与驱动
//!
//! 四个场景共用同一套双区域拓扑：每区域一个数据中心、
//! 一个broker与三台异构VM，broker互为对端。场景之间只在
//! 负载分布与故障注入上有差异。

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use tracing::info;

use lbsim_broker::{Broker, BrokerHandle};
use lbsim_core::config::SimConfig;
use lbsim_core::events::{EventPayload, EventTag};
use lbsim_core::models::Vm;
use lbsim_engine::{new_store_handle, Datacenter, Simulation};

use crate::report::SummaryReport;
use crate::workload::WorkloadGenerator;

/// VM故障 / LB故障场景的注入时刻（虚拟秒）
const FAILURE_INJECT_TIME: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// 双区域均衡负载
    Baseline,
    /// A区首台VM在运行中静默故障
    VmFailure,
    /// B区broker致命故障，A区接管
    LbFailure,
    /// 负载全部压在A区，B区靠窃取分担
    WorkStealing,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Baseline => "baseline",
            Scenario::VmFailure => "vm-failure",
            Scenario::LbFailure => "lb-failure",
            Scenario::WorkStealing => "work-stealing",
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Scenario::Baseline),
            "vm-failure" => Ok(Scenario::VmFailure),
            "lb-failure" => Ok(Scenario::LbFailure),
            "work-stealing" => Ok(Scenario::WorkStealing),
            other => Err(format!("未知场景: {other}")),
        }
    }
}

pub struct ScenarioRunner {
    scenario: Scenario,
    config: SimConfig,
    tasks_per_region: usize,
    seed: u64,
    horizon: f64,
}

impl ScenarioRunner {
    pub fn new(
        scenario: Scenario,
        config: SimConfig,
        tasks_per_region: usize,
        seed: u64,
        horizon: f64,
    ) -> Self {
        Self {
            scenario,
            config,
            tasks_per_region,
            seed,
            horizon,
        }
    }

    pub fn run(&self) -> Result<SummaryReport> {
        let store = new_store_handle();
        let mut sim = Simulation::new();

        let dc_a = sim.add_entity(Rc::new(RefCell::new(Datacenter::new("DC-A", 16))));
        let dc_b = sim.add_entity(Rc::new(RefCell::new(Datacenter::new("DC-B", 16))));

        let broker_a = Rc::new(RefCell::new(Broker::new(
            1,
            "A",
            self.config.clone(),
            store.clone(),
            vec![dc_a, dc_b],
            region_vms(1, "A"),
        )));
        let broker_b = Rc::new(RefCell::new(Broker::new(
            2,
            "B",
            self.config.clone(),
            store.clone(),
            vec![dc_b, dc_a],
            region_vms(4, "B"),
        )));

        let id_a = sim.add_entity(broker_a.clone());
        broker_a.borrow_mut().set_entity_id(id_a);
        let id_b = sim.add_entity(broker_b.clone());
        broker_b.borrow_mut().set_entity_id(id_b);

        broker_a.borrow_mut().set_peer(broker_b.clone());
        broker_b.borrow_mut().set_peer(broker_a.clone());

        // 负载分布：work-stealing场景把全部任务压在A区
        let mut generator = WorkloadGenerator::new(self.seed);
        let total_tasks = self.tasks_per_region * 2;
        match self.scenario {
            Scenario::WorkStealing => {
                broker_a
                    .borrow_mut()
                    .submit_tasks(generator.generate(total_tasks));
            }
            _ => {
                broker_a
                    .borrow_mut()
                    .submit_tasks(generator.generate(self.tasks_per_region));
                broker_b
                    .borrow_mut()
                    .submit_tasks(generator.generate(self.tasks_per_region));
            }
        }

        // 故障注入
        match self.scenario {
            Scenario::VmFailure => {
                sim.schedule(
                    id_a,
                    FAILURE_INJECT_TIME,
                    EventTag::InjectVmFailure,
                    EventPayload::VmId(1),
                );
            }
            Scenario::LbFailure => {
                broker_b.borrow_mut().set_failure_time(FAILURE_INJECT_TIME);
            }
            _ => {}
        }

        info!(
            "场景 {} 启动: {} 个任务, 策略 {}, 时间上限 {}s",
            self.scenario.as_str(),
            total_tasks,
            self.config.strategy.as_str(),
            self.horizon
        );

        sim.start();
        let processed = sim.run_until(self.horizon);
        info!(
            "仿真结束于 {:.3}s, 共处理 {processed} 个事件",
            sim.now()
        );

        let brokers: Vec<BrokerHandle> = vec![broker_a, broker_b];
        Ok(SummaryReport::collect(
            self.scenario.as_str(),
            self.config.strategy.as_str(),
            total_tasks,
            &brokers,
        ))
    }
}

/// 每区域三台异构VM，算力按1:2:4递增
fn region_vms(first_id: u32, region: &str) -> Vec<Vm> {
    vec![
        Vm::new(first_id, 1000.0, 2, 4096.0, 10_000.0, region),
        Vm::new(first_id + 1, 2000.0, 2, 4096.0, 10_000.0, region),
        Vm::new(first_id + 2, 4000.0, 2, 8192.0, 10_000.0, region),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbsim_core::config::StrategyKind;

    #[test]
    fn test_scenario_parsing() {
        assert_eq!("baseline".parse::<Scenario>().unwrap(), Scenario::Baseline);
        assert_eq!(
            "work-stealing".parse::<Scenario>().unwrap(),
            Scenario::WorkStealing
        );
        assert!("unknown".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_baseline_scenario_completes_all_tasks() {
        let runner = ScenarioRunner::new(
            Scenario::Baseline,
            SimConfig::default(),
            20,
            42,
            10_000_000.0,
        );
        let summary = runner.run().unwrap();
        assert_eq!(summary.total_tasks, 40);
        assert_eq!(summary.completed, 40);
        assert_eq!(summary.quarantined, 0);
        assert_eq!(summary.unfinished, 0);
        assert!(summary.makespan > 0.0);
    }

    #[test]
    fn test_work_stealing_scenario_spreads_load() {
        let runner = ScenarioRunner::new(
            Scenario::WorkStealing,
            SimConfig::default(),
            20,
            42,
            10_000_000.0,
        );
        let summary = runner.run().unwrap();
        assert_eq!(summary.completed, 40);
        // B区没有收到任何初始任务，完成数全部来自窃取
        assert!(summary.brokers[1].completed > 0);
    }

    #[test]
    fn test_lb_failure_scenario_triggers_takeover() {
        let mut config = SimConfig::default();
        config.strategy = StrategyKind::Sbdlb;
        let runner = ScenarioRunner::new(Scenario::LbFailure, config, 20, 42, 10_000_000.0);
        let summary = runner.run().unwrap();
        assert!(summary.brokers[1].failed);
        assert!(summary.brokers[0].takeover_done);
    }
}
