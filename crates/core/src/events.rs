//! # 仿真事件定义
//!
//! 事件基底在实体之间传递的标签与载荷。标签集合对应
//! broker 的全部入口：资源目录流量、周期心跳与故障注入。

use serde::{Deserialize, Serialize};

use crate::models::{Task, Vm};

/// 仿真实体编号，由事件基底在注册时分配
pub type EntityId = usize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventTag {
    /// 外部向broker投递一批新任务
    SubmitTasks,
    /// broker向数据中心提交任务执行
    TaskSubmit,
    /// 数据中心回送任务完成
    TaskReturn,
    /// broker请求数据中心创建VM
    VmCreate,
    /// 数据中心回送VM创建结果
    VmCreateAck,
    /// 周期健康监控
    PeriodicMonitor,
    /// VM心跳
    VmHeartbeat,
    /// VM重启完成
    VmRestartComplete,
    /// LB自身心跳
    LbHeartbeat,
    /// 注入VM静默故障
    InjectVmFailure,
    /// 注入LB故障（自毁）
    InjectLbFailure,
}

/// 任务完成记录，由资源目录随 TaskReturn 事件送回
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub task_id: u64,
    pub vm_id: u32,
    pub success: bool,
    pub start_time: f64,
    pub finish_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Empty,
    /// 心跳、重启、故障注入等针对单个VM的事件
    VmId(u32),
    /// 新任务批次
    TaskBatch(Vec<Task>),
    /// VM创建请求：requester为发起broker，用于回送ack
    Provision { requester: EntityId, vm: Vm },
    /// VM创建结果
    CreateAck {
        datacenter: EntityId,
        vm_id: u32,
        success: bool,
    },
    /// 任务提交：owner为持有任务的broker，完成事件将回送给它
    Submit {
        owner: EntityId,
        task_id: u64,
        vm_id: u32,
        length_mi: u64,
    },
    /// 任务完成
    Completion(CompletionRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_record_roundtrip() {
        let rec = CompletionRecord {
            task_id: 7,
            vm_id: 2,
            success: true,
            start_time: 1.0,
            finish_time: 3.5,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: CompletionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
