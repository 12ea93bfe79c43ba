//! # 容错子系统
//!
//! 三个独立的周期循环（broker存活期间自我重调度）：
//! - VM心跳：刷新每个活跃VM的最近心跳记录
//! - LB心跳：刷新broker自身在全局存储中的存活记录
//! - 周期监控：检出VM心跳超时（触发故障恢复）与对端LB
//!   心跳超时（触发一次性接管）
//!
//! 恢复路径：VM故障 -> 在途任务重试（超过重试预算进隔离）->
//! 定时重启 -> 首个心跳确认后恢复存活。

use tracing::{debug, info, warn};

use lbsim_core::constants::{GLOBAL_REGION, STORE_LEVEL_GLOBAL, STORE_LEVEL_REGIONAL};
use lbsim_core::events::{EventPayload, EventTag};
use lbsim_core::models::{TaskStatus, VmStatus};
use lbsim_engine::simulation::SimContext;

use crate::broker::{Broker, BrokerHandle};

const LB_STATUS_KEY: &str = "LB_Status";

impl Broker {
    /// 刷新自身在全局存储中的存活记录
    pub(crate) fn send_lb_heartbeat(&mut self, now: f64) {
        let mut store = self.store.borrow_mut();
        store.hset(
            STORE_LEVEL_GLOBAL,
            GLOBAL_REGION,
            LB_STATUS_KEY,
            &format!("LB_{}_Heartbeat", self.lb_id),
            &now.to_string(),
        );
        store.hset(
            STORE_LEVEL_GLOBAL,
            GLOBAL_REGION,
            LB_STATUS_KEY,
            &format!("LB_{}_Status", self.lb_id),
            "ALIVE",
        );
    }

    pub(crate) fn on_lb_heartbeat(&mut self, ctx: &mut SimContext) {
        self.send_lb_heartbeat(ctx.now());
        if !self.finished && !self.failed {
            ctx.schedule(
                self.entity_id,
                self.config.fault.lb_heartbeat_interval,
                EventTag::LbHeartbeat,
                EventPayload::Empty,
            );
        }
    }

    /// 为VM启动心跳循环（幂等：已活跃的循环不重复启动）
    pub(crate) fn start_vm_heartbeat(&mut self, ctx: &mut SimContext, vm_id: u32) {
        if self.heartbeat_vms.insert(vm_id) {
            info!("{}: 启动 VM #{vm_id} 心跳循环", self.name);
            ctx.schedule(
                self.entity_id,
                self.config.fault.vm_heartbeat_interval,
                EventTag::VmHeartbeat,
                EventPayload::VmId(vm_id),
            );
        }
    }

    /// VM心跳：刷新最近心跳并确认存活。重启后的VM在此处
    /// 发出首个心跳时才恢复ALIVE，恢复由心跳确认而非定时器确认
    pub(crate) fn on_vm_heartbeat(&mut self, ctx: &mut SimContext, vm_id: u32) {
        if !self.heartbeat_vms.contains(&vm_id) {
            // 静默故障或已停机的VM：不刷新也不再重调度
            return;
        }
        let vm_key = format!("VM_{vm_id}");
        {
            let mut store = self.store.borrow_mut();
            store.hset(
                STORE_LEVEL_REGIONAL,
                &self.region,
                &vm_key,
                "Last_Heartbeat",
                &ctx.now().to_string(),
            );
            store.hset(
                STORE_LEVEL_REGIONAL,
                &self.region,
                &vm_key,
                "status",
                VmStatus::Alive.as_str(),
            );
        }
        if !self.finished && !self.failed {
            ctx.schedule(
                self.entity_id,
                self.config.fault.vm_heartbeat_interval,
                EventTag::VmHeartbeat,
                EventPayload::VmId(vm_id),
            );
        }
    }

    /// 周期监控：存储过期检查、对端LB健康与本区域VM健康
    pub(crate) fn on_periodic_monitor(&mut self, ctx: &mut SimContext) {
        self.store.borrow_mut().tick(ctx.now());
        self.check_peer_health(ctx);
        self.check_vm_health(ctx);
        if !self.finished && !self.failed {
            ctx.schedule(
                self.entity_id,
                self.config.fault.monitor_interval,
                EventTag::PeriodicMonitor,
                EventPayload::Empty,
            );
        }
    }

    /// 扫描本区域的VM心跳记录，ALIVE但心跳超时的VM触发故障处理
    pub(crate) fn check_vm_health(&mut self, ctx: &mut SimContext) {
        let now = ctx.now();
        let ttl = self.config.fault.vm_heartbeat_ttl;

        let mut failed_vms = Vec::new();
        {
            let store = self.store.borrow();
            for key in store.scan_keys(STORE_LEVEL_REGIONAL, &self.region, "VM_") {
                let status = store.hget(STORE_LEVEL_REGIONAL, &self.region, &key, "status");
                let heartbeat = store
                    .hget(STORE_LEVEL_REGIONAL, &self.region, &key, "Last_Heartbeat")
                    .and_then(|v| v.parse::<f64>().ok());
                if let (Some(status), Some(last)) = (status, heartbeat) {
                    if status == VmStatus::Alive.as_str() && now - last > ttl {
                        if let Ok(vm_id) = key.trim_start_matches("VM_").parse::<u32>() {
                            failed_vms.push(vm_id);
                        }
                    }
                }
            }
        }

        for vm_id in failed_vms {
            warn!("{}: 心跳超时，检出 VM #{vm_id} 故障", self.name);
            self.notify_vm_failure(ctx, vm_id);
        }
    }

    /// VM故障恢复：标记死亡、回收在途任务（重试或隔离）、
    /// 清零本地计数、清除存储记录、调度定时重启
    pub fn notify_vm_failure(&mut self, ctx: &mut SimContext, vm_id: u32) {
        warn!("{}: VM #{vm_id} 故障，启动恢复流程", self.name);
        let vm_key = format!("VM_{vm_id}");
        self.store.borrow_mut().hset(
            STORE_LEVEL_REGIONAL,
            &self.region,
            &vm_key,
            "status",
            VmStatus::Dead.as_str(),
        );
        self.heartbeat_vms.remove(&vm_id);

        // 回收该VM上全部在途任务
        let mut lost = Vec::new();
        let mut i = 0;
        while i < self.in_flight.len() {
            if self.in_flight[i].assigned_vm == Some(vm_id) {
                lost.push(self.in_flight.swap_remove(i));
            } else {
                i += 1;
            }
        }
        info!(
            "{}: VM #{vm_id} 上有 {} 个在途任务待重试",
            self.name,
            lost.len()
        );
        for mut task in lost {
            task.assigned_vm = None;
            self.retry_task(task);
        }

        // 清零计数并清除存储记录
        self.vm_task_count.insert(vm_id, 0);
        self.store
            .borrow_mut()
            .del(STORE_LEVEL_REGIONAL, &self.region, &vm_key);

        // 自动恢复：标记重启中并调度重启完成事件
        self.store.borrow_mut().hset(
            STORE_LEVEL_REGIONAL,
            &self.region,
            &vm_key,
            "status",
            VmStatus::Restarting.as_str(),
        );
        let delay = self.config.fault.vm_restart_delay;
        ctx.schedule(
            self.entity_id,
            delay,
            EventTag::VmRestartComplete,
            EventPayload::VmId(vm_id),
        );
        info!("{}: VM #{vm_id} 重启中 (预计 {delay}s)", self.name);
    }

    /// 重试预算内的任务快速通道回高优先级队列，超限进隔离（终态）
    pub(crate) fn retry_task(&mut self, mut task: lbsim_core::models::Task) {
        task.increment_retry();
        info!(
            "{}: 重试任务 {} (第 {} 次)",
            self.name, task.id, task.retry_count
        );
        let task_key = format!("Task_{}", task.id);

        if task.retry_count > self.config.scheduler.max_retries {
            warn!("{}: 任务 {} 重试超限，移入隔离队列", self.name, task.id);
            task.status = TaskStatus::Quarantined;
            self.store.borrow_mut().hset(
                STORE_LEVEL_GLOBAL,
                GLOBAL_REGION,
                &task_key,
                "status",
                "QUARANTINED",
            );
            self.queues.push_quarantine(task);
        } else {
            task.status = TaskStatus::Created;
            self.store.borrow_mut().hset(
                STORE_LEVEL_GLOBAL,
                GLOBAL_REGION,
                &task_key,
                "status",
                "QUEUED",
            );
            self.queues.push_high(task);
        }
    }

    /// VM重启完成：重启心跳循环，但状态保持RESTARTING，
    /// 直到周期心跳确认存活
    pub(crate) fn complete_vm_restart(&mut self, ctx: &mut SimContext, vm_id: u32) {
        info!(
            "{}: VM #{vm_id} 重启完成，等待首个心跳确认",
            self.name
        );
        self.start_vm_heartbeat(ctx, vm_id);
        // 重启后的VM重新可用，立即补一轮调度消化重试积压
        self.schedule_pass(ctx);
    }

    /// 读取对端LB的存活记录，心跳超时则执行一次性接管
    pub(crate) fn check_peer_health(&mut self, ctx: &mut SimContext) {
        let Some(peer) = self.peer.clone() else {
            return;
        };
        if self.takeover_done {
            return;
        }

        let peer_lb_id = peer.borrow().lb_id;
        let heartbeat = self
            .store
            .borrow()
            .hget(
                STORE_LEVEL_GLOBAL,
                GLOBAL_REGION,
                LB_STATUS_KEY,
                &format!("LB_{peer_lb_id}_Heartbeat"),
            )
            .and_then(|v| v.parse::<f64>().ok());

        if let Some(last) = heartbeat {
            if ctx.now() - last > self.config.fault.lb_heartbeat_ttl {
                warn!(
                    "{}: 检出对端 LB{peer_lb_id} 心跳超时，启动接管",
                    self.name
                );
                self.take_over(ctx, peer);
                self.takeover_done = true;
            }
        }
    }

    /// 接管故障对端：把全局存储中归属对端且仍排队的任务改写
    /// 归属并移入本地队列，合并对端的VM候选池与路由表。
    /// takeover_done置位后的再次调用不扫描不变更（幂等）。
    pub fn take_over(&mut self, ctx: &mut SimContext, victim: BrokerHandle) {
        if self.takeover_done {
            return;
        }
        info!(
            "{}: 接管 {} 的排队任务与VM注册",
            self.name,
            victim.borrow().name
        );

        // 1. 扫描全局存储，找出归属对端且状态为QUEUED的任务
        let victim_lb = victim.borrow().name.clone();
        let task_keys = self
            .store
            .borrow()
            .scan_keys(STORE_LEVEL_GLOBAL, GLOBAL_REGION, "Task_");

        let mut rescued = Vec::new();
        {
            let mut victim_ref = victim.borrow_mut();
            for key in &task_keys {
                let (owner, status) = {
                    let store = self.store.borrow();
                    (
                        store.hget(STORE_LEVEL_GLOBAL, GLOBAL_REGION, key, "assigned_lb"),
                        store.hget(STORE_LEVEL_GLOBAL, GLOBAL_REGION, key, "status"),
                    )
                };
                if owner.as_deref() != Some(victim_lb.as_str())
                    || status.as_deref() != Some("QUEUED")
                {
                    continue;
                }
                let Ok(task_id) = key.trim_start_matches("Task_").parse::<u64>() else {
                    continue;
                };
                // 从对端四个队列中取出任务对象
                if let Some(task) = victim_ref.queues.remove_by_id(task_id) {
                    rescued.push(task);
                }
            }
        }

        info!("{}: 从全局存储救回 {} 个排队任务", self.name, rescued.len());
        let now = ctx.now();
        for task in rescued {
            // 常规入队路径改写归属字段，完成所有权转移
            self.enqueue_task(now, task);
        }

        // 2. 合并对端区域的VM注册与路由表，后续放置可直达
        let victim_region = victim.borrow().region.clone();
        let vm_keys = self
            .store
            .borrow()
            .scan_keys(STORE_LEVEL_REGIONAL, &victim_region, "VM_");

        let mut adopted = 0usize;
        {
            let victim_ref = victim.borrow();
            for key in &vm_keys {
                let Ok(vm_id) = key.trim_start_matches("VM_").parse::<u32>() else {
                    continue;
                };
                let Some(vm) = victim_ref.vms.iter().find(|vm| vm.id == vm_id) else {
                    continue;
                };
                if !self.vms.iter().any(|v| v.id == vm_id) {
                    self.vms.push(vm.clone());
                    adopted += 1;
                }
                if let Some(&dc) = victim_ref.vm_dc_map.get(&vm_id) {
                    self.vm_dc_map.insert(vm_id, dc);
                }
            }
        }
        info!("{}: 合并了对端 {} 个VM注册", self.name, adopted);

        debug!("{}: 接管完成，触发一轮调度", self.name);
        self.schedule_pass(ctx);
    }
}
