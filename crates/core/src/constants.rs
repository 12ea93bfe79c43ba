//! # 系统常量定义
//!
//! 负载均衡仿真系统的默认参数，均可通过配置覆盖

/// 系统名称
pub const SYSTEM_NAME: &str = "lbsim";

/// 系统版本
pub const SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 单VM并发任务准入阈值
pub const DEFAULT_TASK_THRESHOLD: u32 = 3;

/// 低优先级任务老化提升阈值（仿真秒）
pub const DEFAULT_AGING_THRESHOLD: f64 = 5.0;

/// 单次工作窃取的最大任务数
pub const DEFAULT_STEAL_LIMIT: usize = 5;

/// 任务最大重试次数，超过即隔离
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// VM心跳发送间隔（仿真秒）
pub const DEFAULT_VM_HEARTBEAT_INTERVAL: f64 = 5.0;

/// VM心跳超时时间（仿真秒）
pub const DEFAULT_VM_HEARTBEAT_TTL: f64 = 10.0;

/// LB心跳发送间隔（仿真秒）
pub const DEFAULT_LB_HEARTBEAT_INTERVAL: f64 = 5.0;

/// LB心跳超时时间（仿真秒）
pub const DEFAULT_LB_HEARTBEAT_TTL: f64 = 10.0;

/// 周期健康监控间隔（仿真秒）
pub const DEFAULT_MONITOR_INTERVAL: f64 = 3.0;

/// VM重启耗时（仿真秒）
pub const DEFAULT_VM_RESTART_DELAY: f64 = 30.0;

/// 协调存储的全局层级
pub const STORE_LEVEL_GLOBAL: u8 = 1;

/// 协调存储的区域层级
pub const STORE_LEVEL_REGIONAL: u8 = 2;

/// 全局层级使用的区域名
pub const GLOBAL_REGION: &str = "Global";

/// 键过期事件发布的频道
pub const EXPIRED_CHANNEL: &str = "keyspace:expired";

/// 任务完成事件发布的频道
pub const TASK_COMPLETE_CHANNEL: &str = "tasks:complete";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "LBSIM";
