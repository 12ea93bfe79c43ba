//! # 数据中心资源目录
//!
//! 仿真核心通过窄接口消费的外部资源池：接受VM供给请求
//! （按槽位容量应答成败），执行任务并在完成时回送事件。
//! 不建模物理级的CPU/内存/带宽争用。

use std::collections::HashMap;

use tracing::{debug, info, warn};

use lbsim_core::events::{CompletionRecord, EventPayload, EventTag};
use lbsim_core::models::Vm;

use crate::simulation::{SimContext, SimEntity};

pub struct Datacenter {
    name: String,
    /// 可承载的VM槽位数
    vm_slots: usize,
    hosted: HashMap<u32, Vm>,
}

impl Datacenter {
    pub fn new(name: impl Into<String>, vm_slots: usize) -> Self {
        Self {
            name: name.into(),
            vm_slots,
            hosted: HashMap::new(),
        }
    }

    pub fn hosted_count(&self) -> usize {
        self.hosted.len()
    }

    fn handle_provision(&mut self, ctx: &mut SimContext, requester: usize, vm: Vm) {
        let vm_id = vm.id;
        let success = self.hosted.len() < self.vm_slots;
        if success {
            info!("{}: 承载 VM #{vm_id}", self.name);
            self.hosted.insert(vm_id, vm);
        } else {
            warn!("{}: 槽位耗尽，拒绝 VM #{vm_id}", self.name);
        }
        ctx.send_now(
            requester,
            EventTag::VmCreateAck,
            EventPayload::CreateAck {
                datacenter: ctx.self_id(),
                vm_id,
                success,
            },
        );
    }

    fn handle_submit(
        &mut self,
        ctx: &mut SimContext,
        owner: usize,
        task_id: u64,
        vm_id: u32,
        length_mi: u64,
    ) {
        let Some(vm) = self.hosted.get(&vm_id) else {
            warn!("{}: 收到未承载VM #{vm_id} 的任务 {task_id}，忽略", self.name);
            return;
        };
        // 固定速率执行，不建模并发争用
        let exec_time = length_mi as f64 / vm.total_mips();
        debug!(
            "{}: 任务 {task_id} 在 VM #{vm_id} 上开始执行，预计 {exec_time:.3}s",
            self.name
        );
        ctx.schedule(
            owner,
            exec_time,
            EventTag::TaskReturn,
            EventPayload::Completion(CompletionRecord {
                task_id,
                vm_id,
                success: true,
                start_time: ctx.now(),
                finish_time: ctx.now() + exec_time,
            }),
        );
    }
}

impl SimEntity for Datacenter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, _ctx: &mut SimContext) {}

    fn on_event(&mut self, ctx: &mut SimContext, tag: EventTag, payload: EventPayload) {
        match (tag, payload) {
            (EventTag::VmCreate, EventPayload::Provision { requester, vm }) => {
                self.handle_provision(ctx, requester, vm);
            }
            (
                EventTag::TaskSubmit,
                EventPayload::Submit {
                    owner,
                    task_id,
                    vm_id,
                    length_mi,
                },
            ) => {
                self.handle_submit(ctx, owner, task_id, vm_id, length_mi);
            }
            (tag, _) => {
                warn!("{}: 未预期的事件 {tag:?}", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_respects_slot_capacity() {
        let mut dc = Datacenter::new("DC_0", 1);
        let mut ctx = SimContext::new(0.0, 1);

        dc.handle_provision(&mut ctx, 0, Vm::new(1, 1000.0, 1, 512.0, 100.0, "A"));
        dc.handle_provision(&mut ctx, 0, Vm::new(2, 1000.0, 1, 512.0, 100.0, "A"));
        assert_eq!(dc.hosted_count(), 1);

        let acks = ctx.take_outgoing();
        assert_eq!(acks.len(), 2);
        match (&acks[0].payload, &acks[1].payload) {
            (
                EventPayload::CreateAck { success: first, .. },
                EventPayload::CreateAck { success: second, .. },
            ) => {
                assert!(*first);
                assert!(!*second);
            }
            _ => panic!("应答载荷类型错误"),
        }
    }

    #[test]
    fn test_submit_schedules_completion() {
        let mut dc = Datacenter::new("DC_0", 4);
        let mut ctx = SimContext::new(0.0, 1);
        dc.handle_provision(&mut ctx, 0, Vm::new(1, 1000.0, 2, 512.0, 100.0, "A"));
        ctx.take_outgoing();

        // 4000 MI / 2000 MIPS = 2s
        dc.handle_submit(&mut ctx, 0, 42, 1, 4000);
        let out = ctx.take_outgoing();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tag, EventTag::TaskReturn);
        assert!((out[0].delay - 2.0).abs() < 1e-9);
        match &out[0].payload {
            EventPayload::Completion(rec) => {
                assert_eq!(rec.task_id, 42);
                assert_eq!(rec.vm_id, 1);
                assert!(rec.success);
                assert!((rec.finish_time - 2.0).abs() < 1e-9);
            }
            _ => panic!("完成载荷类型错误"),
        }
    }

    #[test]
    fn test_submit_to_unknown_vm_is_dropped() {
        let mut dc = Datacenter::new("DC_0", 4);
        let mut ctx = SimContext::new(0.0, 1);
        dc.handle_submit(&mut ctx, 0, 1, 99, 4000);
        assert!(ctx.take_outgoing().is_empty());
    }
}
