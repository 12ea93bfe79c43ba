//! # lbsim-broker
//!
//! 仿真核心：每个区域实例化一个broker，由四个子系统组成：
//! - 放置评分器（SBDLB及对比策略，统一策略接口）
//! - MLFQ优先级调度器（三级队列 + 溢出 + 隔离，带老化提升）
//! - 跨区域工作窃取协调
//! - 容错子系统（心跳、VM故障恢复、LB接管）

pub mod broker;
pub mod fault;
pub mod mlfq;
pub mod strategies;

pub use broker::{Broker, BrokerHandle};
pub use mlfq::{MlfqQueues, QueueLevel};
pub use strategies::{make_strategy, PlacementStrategy};
