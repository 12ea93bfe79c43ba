//! # lbsim-core
//!
//! 云任务放置仿真系统的共享基础模块
//!
//! 本模块提供：
//! - 数据模型定义（任务、虚拟机）
//! - 事件标签与载荷定义
//! - 系统常量定义
//! - 错误类型定义
//! - 仿真配置

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod models;

// Re-export commonly used items
pub use config::{FaultConfig, SchedulerConfig, SimConfig, StrategyKind};
pub use constants::*;
pub use errors::{SimError, SimResult};
pub use events::{CompletionRecord, EntityId, EventPayload, EventTag};
pub use models::{Task, TaskStatus, TaskType, Vm, VmStatus};
