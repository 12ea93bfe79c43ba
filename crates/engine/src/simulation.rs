//! # 虚拟时钟事件基底
//!
//! 单线程协作式仿真：全部"延时"都表现为向优先级队列调度一个
//! 未来回调，调度后立即返回调用者。同一broker的回调严格按
//! (触发时间, 入队序号) 顺序执行，同刻事件先入先出。
//! 不提供取消：失效broker对送达事件自行no-op。

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use tracing::{debug, warn};

use lbsim_core::events::{EntityId, EventPayload, EventTag};

#[derive(Debug)]
struct Event {
    time: f64,
    seq: u64,
    target: EntityId,
    tag: EventTag,
    payload: EventPayload,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap是最大堆，这里反转得到最小堆：时间早者先出，
        // 同刻按入队序号保持FIFO
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 送往实体的待发事件，由上下文缓冲、运行循环统一入队
#[derive(Debug)]
pub struct PendingEvent {
    pub target: EntityId,
    pub delay: f64,
    pub tag: EventTag,
    pub payload: EventPayload,
}

/// 实体在回调中可见的仿真上下文。实体不持有引擎引用，
/// 出站事件先缓冲在此，回调返回后由运行循环入队。
pub struct SimContext {
    now: f64,
    self_id: EntityId,
    outgoing: Vec<PendingEvent>,
}

impl SimContext {
    pub fn new(now: f64, self_id: EntityId) -> Self {
        Self {
            now,
            self_id,
            outgoing: Vec::new(),
        }
    }

    /// 当前仿真时间
    pub fn now(&self) -> f64 {
        self.now
    }

    /// 当前实体自身的编号
    pub fn self_id(&self) -> EntityId {
        self.self_id
    }

    /// 延时delay后向target投递事件
    pub fn schedule(&mut self, target: EntityId, delay: f64, tag: EventTag, payload: EventPayload) {
        self.outgoing.push(PendingEvent {
            target,
            delay: delay.max(0.0),
            tag,
            payload,
        });
    }

    /// 立即投递（当前时刻，排在已入队同刻事件之后）
    pub fn send_now(&mut self, target: EntityId, tag: EventTag, payload: EventPayload) {
        self.schedule(target, 0.0, tag, payload);
    }

    pub fn take_outgoing(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.outgoing)
    }
}

/// 由事件基底驱动的仿真实体
pub trait SimEntity {
    fn name(&self) -> &str;

    /// 仿真启动时调用一次
    fn on_start(&mut self, ctx: &mut SimContext);

    /// 事件送达入口
    fn on_event(&mut self, ctx: &mut SimContext, tag: EventTag, payload: EventPayload);
}

/// 单线程离散事件仿真引擎
pub struct Simulation {
    entities: Vec<Rc<RefCell<dyn SimEntity>>>,
    queue: BinaryHeap<Event>,
    now: f64,
    seq: u64,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            queue: BinaryHeap::new(),
            now: 0.0,
            seq: 0,
        }
    }

    /// 注册实体，返回其编号
    pub fn add_entity(&mut self, entity: Rc<RefCell<dyn SimEntity>>) -> EntityId {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// 外部注入事件（实验脚本用，如故障注入与任务批次）
    pub fn schedule(&mut self, target: EntityId, delay: f64, tag: EventTag, payload: EventPayload) {
        let time = self.now + delay.max(0.0);
        self.push_event(time, target, tag, payload);
    }

    fn push_event(&mut self, time: f64, target: EntityId, tag: EventTag, payload: EventPayload) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Event {
            time,
            seq,
            target,
            tag,
            payload,
        });
    }

    /// 调用所有实体的on_start
    pub fn start(&mut self) {
        for id in 0..self.entities.len() {
            let entity = Rc::clone(&self.entities[id]);
            let mut ctx = SimContext::new(self.now, id);
            entity.borrow_mut().on_start(&mut ctx);
            self.flush(ctx);
        }
    }

    fn flush(&mut self, mut ctx: SimContext) {
        for pending in ctx.take_outgoing() {
            let time = self.now + pending.delay;
            self.push_event(time, pending.target, pending.tag, pending.payload);
        }
    }

    /// 运行直到队列耗尽或超过时间上限，返回处理的事件数
    pub fn run_until(&mut self, t_max: f64) -> u64 {
        let mut processed = 0u64;
        while let Some(event) = self.queue.pop() {
            if event.time > t_max {
                // 放回并停止，保持队列状态以便继续运行
                self.queue.push(event);
                self.now = t_max;
                break;
            }
            self.now = event.time;

            let Some(entity) = self.entities.get(event.target).cloned() else {
                warn!("事件目标实体不存在: {}", event.target);
                continue;
            };

            debug!(
                time = self.now,
                target = event.target,
                tag = ?event.tag,
                "dispatch"
            );

            let mut ctx = SimContext::new(self.now, event.target);
            entity
                .borrow_mut()
                .on_event(&mut ctx, event.tag, event.payload);
            self.flush(ctx);
            processed += 1;
        }
        processed
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 记录事件送达顺序的测试实体
    struct Recorder {
        log: Rc<RefCell<Vec<(f64, EventTag)>>>,
    }

    impl SimEntity for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_start(&mut self, _ctx: &mut SimContext) {}

        fn on_event(&mut self, ctx: &mut SimContext, tag: EventTag, _payload: EventPayload) {
            self.log.borrow_mut().push((ctx.now(), tag));
        }
    }

    #[test]
    fn test_events_fire_in_time_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let id = sim.add_entity(Rc::new(RefCell::new(Recorder { log: Rc::clone(&log) })));

        sim.schedule(id, 5.0, EventTag::LbHeartbeat, EventPayload::Empty);
        sim.schedule(id, 1.0, EventTag::PeriodicMonitor, EventPayload::Empty);
        sim.schedule(id, 3.0, EventTag::VmHeartbeat, EventPayload::Empty);
        sim.run_until(100.0);

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], (1.0, EventTag::PeriodicMonitor));
        assert_eq!(log[1], (3.0, EventTag::VmHeartbeat));
        assert_eq!(log[2], (5.0, EventTag::LbHeartbeat));
    }

    #[test]
    fn test_same_time_events_are_fifo() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let id = sim.add_entity(Rc::new(RefCell::new(Recorder { log: Rc::clone(&log) })));

        sim.schedule(id, 2.0, EventTag::LbHeartbeat, EventPayload::Empty);
        sim.schedule(id, 2.0, EventTag::VmHeartbeat, EventPayload::Empty);
        sim.schedule(id, 2.0, EventTag::PeriodicMonitor, EventPayload::Empty);
        sim.run_until(10.0);

        let log = log.borrow();
        assert_eq!(log[0].1, EventTag::LbHeartbeat);
        assert_eq!(log[1].1, EventTag::VmHeartbeat);
        assert_eq!(log[2].1, EventTag::PeriodicMonitor);
    }

    #[test]
    fn test_run_until_bounds_clock() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new();
        let id = sim.add_entity(Rc::new(RefCell::new(Recorder { log: Rc::clone(&log) })));

        sim.schedule(id, 1.0, EventTag::VmHeartbeat, EventPayload::Empty);
        sim.schedule(id, 50.0, EventTag::VmHeartbeat, EventPayload::Empty);
        let processed = sim.run_until(10.0);

        assert_eq!(processed, 1);
        assert_eq!(sim.now(), 10.0);
        // 超限事件保留在队列中，继续运行仍会处理
        let processed = sim.run_until(100.0);
        assert_eq!(processed, 1);
        assert_eq!(log.borrow().len(), 2);
    }
}
