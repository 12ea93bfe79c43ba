//! # 区域broker
//!
//! 组合放置策略、MLFQ调度器、工作窃取与容错子系统，
//! 由仿真驱动为每个区域实例化一个。broker之间通过共享
//! 句柄互联，工作窃取与接管是仅有的跨broker变更点
//! （单线程下天然互斥）。

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use lbsim_core::config::SimConfig;
use lbsim_core::constants::{
    GLOBAL_REGION, STORE_LEVEL_GLOBAL, STORE_LEVEL_REGIONAL, TASK_COMPLETE_CHANNEL,
};
use lbsim_core::events::{CompletionRecord, EntityId, EventPayload, EventTag};
use lbsim_core::models::{Task, TaskStatus, Vm, VmStatus};
use lbsim_engine::simulation::{SimContext, SimEntity};
use lbsim_engine::store::StoreHandle;

use crate::mlfq::{MlfqQueues, QueueLevel};
use crate::strategies::{make_strategy, PlacementStrategy};

pub type BrokerHandle = Rc<RefCell<Broker>>;

pub struct Broker {
    pub(crate) entity_id: EntityId,
    pub(crate) lb_id: u32,
    pub(crate) name: String,
    pub(crate) region: String,
    pub(crate) config: SimConfig,
    pub(crate) store: StoreHandle,
    strategy: Box<dyn PlacementStrategy>,

    pub(crate) queues: MlfqQueues,
    /// 已创建的候选VM池
    pub(crate) vms: Vec<Vm>,
    /// broker本地的VM并发任务计数
    pub(crate) vm_task_count: HashMap<u32, u32>,
    /// VM -> 数据中心路由表，提交任务时查询
    pub(crate) vm_dc_map: HashMap<u32, EntityId>,
    datacenters: Vec<EntityId>,
    /// 等待供给确认的VM及已尝试的数据中心下标
    pending_vms: HashMap<u32, (Vm, usize)>,
    /// 在途任务（已提交到VM，未收到完成）
    pub(crate) in_flight: Vec<Task>,
    completed: Vec<Task>,
    /// 启动时一次性投递的初始任务
    initial_tasks: Vec<Task>,

    /// 已在存储中登记过状态的VM
    registered_vms: HashSet<u32>,
    /// 心跳循环活跃的VM集合
    pub(crate) heartbeat_vms: HashSet<u32>,

    pub(crate) peer: Option<BrokerHandle>,
    pub(crate) failed: bool,
    pub(crate) takeover_done: bool,
    pub(crate) finished: bool,
    /// 配置的自毁时刻（LB故障实验）
    failure_time: Option<f64>,
}

impl Broker {
    pub fn new(
        lb_id: u32,
        region: impl Into<String>,
        config: SimConfig,
        store: StoreHandle,
        datacenters: Vec<EntityId>,
        provision: Vec<Vm>,
    ) -> Self {
        let strategy = make_strategy(config.strategy, &config.scheduler);
        let pending_vms = provision
            .into_iter()
            .map(|vm| (vm.id, (vm, 0usize)))
            .collect();
        Self {
            entity_id: 0,
            lb_id,
            name: format!("LB{lb_id}"),
            region: region.into(),
            config,
            store,
            strategy,
            queues: MlfqQueues::new(),
            vms: Vec::new(),
            vm_task_count: HashMap::new(),
            vm_dc_map: HashMap::new(),
            datacenters,
            pending_vms,
            in_flight: Vec::new(),
            completed: Vec::new(),
            initial_tasks: Vec::new(),
            registered_vms: HashSet::new(),
            heartbeat_vms: HashSet::new(),
            peer: None,
            failed: false,
            takeover_done: false,
            finished: false,
            failure_time: None,
        }
    }

    /// 注册到事件基底后回填实体编号
    pub fn set_entity_id(&mut self, id: EntityId) {
        self.entity_id = id;
    }

    pub fn set_peer(&mut self, peer: BrokerHandle) {
        self.peer = Some(peer);
    }

    /// 配置自毁时刻（LB故障注入实验）
    pub fn set_failure_time(&mut self, time: f64) {
        self.failure_time = Some(time);
    }

    /// 启动前投递初始任务批次
    pub fn submit_tasks(&mut self, tasks: Vec<Task>) {
        self.initial_tasks.extend(tasks);
    }

    // --- 只读访问（实验报表与测试用） ---

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn lb_id(&self) -> u32 {
        self.lb_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn queues(&self) -> &MlfqQueues {
        &self.queues
    }

    pub fn vms(&self) -> &[Vm] {
        &self.vms
    }

    pub fn in_flight(&self) -> &[Task] {
        &self.in_flight
    }

    pub fn completed(&self) -> &[Task] {
        &self.completed
    }

    pub fn task_count(&self, vm_id: u32) -> u32 {
        self.vm_task_count.get(&vm_id).copied().unwrap_or(0)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn takeover_done(&self) -> bool {
        self.takeover_done
    }

    pub fn has_datacenter_route(&self, vm_id: u32) -> bool {
        self.vm_dc_map.contains_key(&vm_id)
    }

    // --- 任务入队与调度 ---

    /// 常规入队路径：登记全局存储中的任务状态与归属broker，
    /// 再按类型放入对应队列。窃取与接管的任务同样走这里，
    /// 从而改写归属字段完成所有权转移。
    pub fn enqueue_task(&mut self, now: f64, mut task: Task) {
        task.mark_submitted(now);
        task.status = TaskStatus::Queued;
        let key = format!("Task_{}", task.id);
        let mut store = self.store.borrow_mut();
        store.hset(STORE_LEVEL_GLOBAL, GLOBAL_REGION, &key, "status", "QUEUED");
        store.hset(
            STORE_LEVEL_GLOBAL,
            GLOBAL_REGION,
            &key,
            "assigned_lb",
            &self.name,
        );
        drop(store);
        self.queues.push(task);
    }

    /// 一轮调度：老化 -> （空闲时）工作窃取 -> 按优先级分发
    pub fn schedule_pass(&mut self, ctx: &mut SimContext) {
        self.queues
            .age_low_queue(ctx.now(), self.config.scheduler.aging_threshold);

        if self.queues.is_idle() {
            self.steal_work(ctx);
        }

        for level in QueueLevel::DISPATCH_ORDER {
            self.process_queue(ctx, level);
        }
    }

    /// 对队列中的每个任务尝试放置（整队扫描而非队首阻塞），
    /// 成功者出队提交，失败者原地等待下一轮
    fn process_queue(&mut self, ctx: &mut SimContext, level: QueueLevel) {
        let mut i = 0;
        while i < self.queues.queue(level).len() {
            let picked = {
                let task = &self.queues.queue(level)[i];
                self.strategy.pick_vm(&self.vms, &self.vm_task_count, task)
            };
            match picked {
                Some(vm_id) => {
                    if let Some(task) = self.queues.queue_mut(level).remove(i) {
                        self.dispatch_task(ctx, task, vm_id);
                    }
                }
                None => i += 1,
            }
        }
    }

    /// 把任务提交到选中的VM：更新本地计数与存储记录，
    /// 经路由表发往对应数据中心
    fn dispatch_task(&mut self, ctx: &mut SimContext, mut task: Task, vm_id: u32) {
        let Some(&dc) = self.vm_dc_map.get(&vm_id) else {
            error!("{}: VM #{vm_id} 无数据中心路由，任务 {} 回队", self.name, task.id);
            self.queues.push(task);
            return;
        };

        *self.vm_task_count.entry(vm_id).or_insert(0) += 1;

        let now = ctx.now();
        let vm_key = format!("VM_{vm_id}");
        let task_key = format!("Task_{}", task.id);
        {
            let mut store = self.store.borrow_mut();
            store.hset(
                STORE_LEVEL_REGIONAL,
                &self.region,
                &vm_key,
                &task_key,
                "RUNNING",
            );
            // VM状态记录只登记一次，后续由心跳刷新
            if self.registered_vms.insert(vm_id) {
                store.hset(
                    STORE_LEVEL_REGIONAL,
                    &self.region,
                    &vm_key,
                    "status",
                    VmStatus::Alive.as_str(),
                );
                store.hset(
                    STORE_LEVEL_REGIONAL,
                    &self.region,
                    &vm_key,
                    "Last_Heartbeat",
                    &now.to_string(),
                );
            }
            store.hset(
                STORE_LEVEL_GLOBAL,
                GLOBAL_REGION,
                &task_key,
                "status",
                "RUNNING",
            );
        }

        task.mark_original_submission(now);
        task.status = TaskStatus::Running;
        task.assigned_vm = Some(vm_id);
        task.start_time = Some(now);

        debug!(
            "{}: 任务 {} (长度 {}) 提交到 VM #{vm_id}，当前并发 {}",
            self.name,
            task.id,
            task.length_mi,
            self.task_count(vm_id)
        );

        ctx.send_now(
            dc,
            EventTag::TaskSubmit,
            EventPayload::Submit {
                owner: self.entity_id,
                task_id: task.id,
                vm_id,
                length_mi: task.length_mi,
            },
        );
        self.in_flight.push(task);
    }

    /// 释放VM上的一个任务槽位，计数下限为零
    pub fn release_vm(&mut self, vm_id: u32) {
        if let Some(count) = self.vm_task_count.get_mut(&vm_id) {
            *count = count.saturating_sub(1);
        }
    }

    fn handle_completion(&mut self, ctx: &mut SimContext, rec: CompletionRecord) {
        // 按(任务, 提交时刻)匹配：故障VM的迟到完成事件不能
        // 冒领重试后再次提交的同一任务
        let Some(pos) = self
            .in_flight
            .iter()
            .position(|t| t.id == rec.task_id && t.start_time == Some(rec.start_time))
        else {
            debug!("{}: 忽略迟到的完成事件 (任务 {})", self.name, rec.task_id);
            return;
        };
        let mut task = self.in_flight.swap_remove(pos);
        task.status = TaskStatus::Success;
        task.finish_time = Some(rec.finish_time);

        self.release_vm(rec.vm_id);

        let task_key = format!("Task_{}", task.id);
        {
            let mut store = self.store.borrow_mut();
            store.hset(
                STORE_LEVEL_GLOBAL,
                GLOBAL_REGION,
                &task_key,
                "status",
                "SUCCESS",
            );
            // 简化处理：直接清除VM记录，下一次心跳会重建
            store.del(
                STORE_LEVEL_REGIONAL,
                &self.region,
                &format!("VM_{}", rec.vm_id),
            );
            store.publish(
                TASK_COMPLETE_CHANNEL,
                &format!("Task {} completed on VM {}", task.id, rec.vm_id),
            );
        }

        debug!(
            "{}: 任务 {} 在 VM #{} 上完成于 {:.3}",
            self.name, task.id, rec.vm_id, rec.finish_time
        );
        self.completed.push(task);

        self.schedule_pass(ctx);

        if self.initial_tasks.is_empty() && self.queues.queued_len() == 0 && self.in_flight.is_empty()
        {
            self.finished = true;
            info!("{}: 全部任务完成，停止心跳循环", self.name);
        }
    }

    /// 工作窃取：仅在本地三个优先级队列全空时触发，从对端按
    /// 溢出 -> 低 -> 中 的顺序窃取至多steal_limit个任务，
    /// 经常规入队路径完成所有权转移
    fn steal_work(&mut self, ctx: &mut SimContext) {
        let Some(peer) = self.peer.clone() else {
            return;
        };
        let stolen = peer
            .borrow_mut()
            .queues
            .steal_batch(self.config.scheduler.steal_limit);
        if stolen.is_empty() {
            return;
        }
        info!(
            "{}: 从 {} 窃取了 {} 个任务",
            self.name,
            peer.borrow().name,
            stolen.len()
        );
        let now = ctx.now();
        for task in stolen {
            self.enqueue_task(now, task);
        }
    }

    // --- VM供给 ---

    fn handle_provision_ack(
        &mut self,
        ctx: &mut SimContext,
        datacenter: EntityId,
        vm_id: u32,
        success: bool,
    ) {
        let Some((vm, attempt)) = self.pending_vms.remove(&vm_id) else {
            warn!("{}: 未知VM #{vm_id} 的供给应答", self.name);
            return;
        };

        if success {
            info!("{}: VM #{vm_id} 创建成功", self.name);
            self.vm_dc_map.insert(vm_id, datacenter);
            self.vms.push(vm);
            self.start_vm_heartbeat(ctx, vm_id);
            self.flush_initial_tasks(ctx);
            self.schedule_pass(ctx);
            return;
        }

        // 供给失败：按列表顺序尝试下一个资源池，全部耗尽则放弃该VM
        let next = attempt + 1;
        match self.datacenters.get(next) {
            Some(&next_dc) => {
                warn!(
                    "{}: VM #{vm_id} 在数据中心 {datacenter} 创建失败，转投下一资源池",
                    self.name
                );
                self.pending_vms.insert(vm_id, (vm.clone(), next));
                ctx.send_now(
                    next_dc,
                    EventTag::VmCreate,
                    EventPayload::Provision {
                        requester: self.entity_id,
                        vm,
                    },
                );
            }
            None => {
                error!(
                    "{}: VM #{vm_id} 在所有数据中心均创建失败，仿真继续但缺少该VM",
                    self.name
                );
            }
        }
    }

    /// 首个VM就绪后投递初始任务批次
    fn flush_initial_tasks(&mut self, ctx: &mut SimContext) {
        if self.initial_tasks.is_empty() {
            return;
        }
        let tasks = std::mem::take(&mut self.initial_tasks);
        let now = ctx.now();
        for task in tasks {
            self.enqueue_task(now, task);
        }
    }
}

impl SimEntity for Broker {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, ctx: &mut SimContext) {
        self.send_lb_heartbeat(ctx.now());

        // 向首个资源池发起全部VM供给请求
        match self.datacenters.first().copied() {
            Some(dc) => {
                for (vm, _) in self.pending_vms.values() {
                    ctx.send_now(
                        dc,
                        EventTag::VmCreate,
                        EventPayload::Provision {
                            requester: self.entity_id,
                            vm: vm.clone(),
                        },
                    );
                }
            }
            None => error!("{}: 没有可用的数据中心", self.name),
        }

        // 启动周期健康监控与LB心跳循环
        ctx.schedule(
            self.entity_id,
            self.config.fault.monitor_interval,
            EventTag::PeriodicMonitor,
            EventPayload::Empty,
        );
        ctx.schedule(
            self.entity_id,
            self.config.fault.lb_heartbeat_interval,
            EventTag::LbHeartbeat,
            EventPayload::Empty,
        );
        info!(
            "{}: 启动完成 (策略: {}, 监控间隔: {}s)",
            self.name,
            self.strategy.name(),
            self.config.fault.monitor_interval
        );

        if let Some(t) = self.failure_time {
            ctx.schedule(
                self.entity_id,
                t,
                EventTag::InjectLbFailure,
                EventPayload::Empty,
            );
            warn!("{}: 已配置 {t}s 后自毁", self.name);
        }
    }

    fn on_event(&mut self, ctx: &mut SimContext, tag: EventTag, payload: EventPayload) {
        // 已失效的broker不再处理任何事件，失效在本轮仿真内不可逆
        if self.failed {
            return;
        }

        match (tag, payload) {
            (EventTag::SubmitTasks, EventPayload::TaskBatch(tasks)) => {
                let now = ctx.now();
                for task in tasks {
                    self.enqueue_task(now, task);
                }
                self.schedule_pass(ctx);
            }
            (EventTag::VmCreateAck, EventPayload::CreateAck { datacenter, vm_id, success }) => {
                self.handle_provision_ack(ctx, datacenter, vm_id, success);
            }
            (EventTag::TaskReturn, EventPayload::Completion(rec)) => {
                self.handle_completion(ctx, rec);
            }
            (EventTag::PeriodicMonitor, _) => {
                self.on_periodic_monitor(ctx);
            }
            (EventTag::VmHeartbeat, EventPayload::VmId(vm_id)) => {
                self.on_vm_heartbeat(ctx, vm_id);
            }
            (EventTag::LbHeartbeat, _) => {
                self.on_lb_heartbeat(ctx);
            }
            (EventTag::VmRestartComplete, EventPayload::VmId(vm_id)) => {
                self.complete_vm_restart(ctx, vm_id);
            }
            (EventTag::InjectVmFailure, EventPayload::VmId(vm_id)) => {
                // 静默故障：仅停掉心跳循环，由周期监控检出
                warn!("{}: 注入VM #{vm_id} 静默故障，停止其心跳", self.name);
                self.heartbeat_vms.remove(&vm_id);
            }
            (EventTag::InjectLbFailure, _) => {
                error!("{}: 注入致命故障，停止所有操作", self.name);
                self.failed = true;
            }
            (tag, _) => {
                warn!("{}: 未预期的事件 {tag:?}", self.name);
            }
        }
    }
}
