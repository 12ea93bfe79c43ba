//! # 仿真配置
//!
//! 配置来源：默认值 < TOML配置文件 < 命令行覆盖。
//! 所有时间参数单位为仿真秒。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{SimError, SimResult};

/// 放置策略选择，替代按子类划分的broker实现
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sbdlb,
    RoundRobin,
    WeightedRoundRobin,
    HoneyBee,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sbdlb => "SBDLB",
            StrategyKind::RoundRobin => "RoundRobin",
            StrategyKind::WeightedRoundRobin => "WeightedRoundRobin",
            StrategyKind::HoneyBee => "HoneyBee",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sbdlb" => Ok(StrategyKind::Sbdlb),
            "round_robin" | "roundrobin" | "rr" => Ok(StrategyKind::RoundRobin),
            "weighted_round_robin" | "wrr" => Ok(StrategyKind::WeightedRoundRobin),
            "honey_bee" | "honeybee" => Ok(StrategyKind::HoneyBee),
            other => Err(SimError::config_error(format!("未知的放置策略: {other}"))),
        }
    }
}

/// 调度器（MLFQ + 工作窃取）参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// 单VM并发任务准入阈值
    pub task_threshold: u32,
    /// 低优先级任务老化提升阈值（秒）
    pub aging_threshold: f64,
    /// 单次工作窃取的最大任务数
    pub steal_limit: usize,
    /// 任务最大重试次数
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_threshold: DEFAULT_TASK_THRESHOLD,
            aging_threshold: DEFAULT_AGING_THRESHOLD,
            steal_limit: DEFAULT_STEAL_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// 容错子系统参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaultConfig {
    pub vm_heartbeat_interval: f64,
    pub vm_heartbeat_ttl: f64,
    pub lb_heartbeat_interval: f64,
    pub lb_heartbeat_ttl: f64,
    pub monitor_interval: f64,
    pub vm_restart_delay: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            vm_heartbeat_interval: DEFAULT_VM_HEARTBEAT_INTERVAL,
            vm_heartbeat_ttl: DEFAULT_VM_HEARTBEAT_TTL,
            lb_heartbeat_interval: DEFAULT_LB_HEARTBEAT_INTERVAL,
            lb_heartbeat_ttl: DEFAULT_LB_HEARTBEAT_TTL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            vm_restart_delay: DEFAULT_VM_RESTART_DELAY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub strategy: StrategyKind,
    pub scheduler: SchedulerConfig,
    pub fault: FaultConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Sbdlb,
            scheduler: SchedulerConfig::default(),
            fault: FaultConfig::default(),
        }
    }
}

impl SimConfig {
    /// 从TOML文件加载配置，缺省字段取默认值
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SimConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.scheduler.task_threshold == 0 {
            return Err(SimError::validation_error("task_threshold 必须大于0"));
        }
        if self.scheduler.aging_threshold <= 0.0 {
            return Err(SimError::validation_error("aging_threshold 必须为正数"));
        }
        if self.scheduler.steal_limit == 0 {
            return Err(SimError::validation_error("steal_limit 必须大于0"));
        }
        if self.fault.vm_heartbeat_interval <= 0.0
            || self.fault.lb_heartbeat_interval <= 0.0
            || self.fault.monitor_interval <= 0.0
        {
            return Err(SimError::validation_error("心跳与监控间隔必须为正数"));
        }
        if self.fault.vm_heartbeat_ttl < self.fault.vm_heartbeat_interval {
            return Err(SimError::validation_error(
                "vm_heartbeat_ttl 不能小于 vm_heartbeat_interval",
            ));
        }
        if self.fault.lb_heartbeat_ttl < self.fault.lb_heartbeat_interval {
            return Err(SimError::validation_error(
                "lb_heartbeat_ttl 不能小于 lb_heartbeat_interval",
            ));
        }
        if self.fault.vm_restart_delay < 0.0 {
            return Err(SimError::validation_error("vm_restart_delay 不能为负数"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, StrategyKind::Sbdlb);
        assert_eq!(config.scheduler.task_threshold, 3);
        assert_eq!(config.scheduler.aging_threshold, 5.0);
        assert_eq!(config.fault.vm_restart_delay, 30.0);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
strategy = "round_robin"

[scheduler]
task_threshold = 5
aging_threshold = 2.0
steal_limit = 3
max_retries = 2

[fault]
vm_heartbeat_interval = 1.0
vm_heartbeat_ttl = 4.0
lb_heartbeat_interval = 1.0
lb_heartbeat_ttl = 4.0
monitor_interval = 1.0
vm_restart_delay = 10.0
"#
        )
        .unwrap();

        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.strategy, StrategyKind::RoundRobin);
        assert_eq!(config.scheduler.task_threshold, 5);
        assert_eq!(config.fault.vm_restart_delay, 10.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strategy = \"honey_bee\"").unwrap();

        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.strategy, StrategyKind::HoneyBee);
        // 未给出的字段取默认值
        assert_eq!(config.scheduler.steal_limit, 5);
        assert_eq!(config.fault.monitor_interval, 3.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SimConfig::default();
        config.scheduler.task_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.fault.vm_heartbeat_ttl = 1.0; // 小于间隔5.0
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("sbdlb".parse::<StrategyKind>().unwrap(), StrategyKind::Sbdlb);
        assert_eq!("wrr".parse::<StrategyKind>().unwrap(), StrategyKind::WeightedRoundRobin);
        assert!("bogus".parse::<StrategyKind>().is_err());
    }
}
