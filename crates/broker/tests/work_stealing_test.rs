//! 跨区域工作窃取的端到端验证

mod common;

use common::{image_task, reel_task, standard_vm, text_task, two_region_world};
use lbsim_broker::QueueLevel;
use lbsim_core::config::SimConfig;
use lbsim_core::constants::{GLOBAL_REGION, STORE_LEVEL_GLOBAL};
use lbsim_core::events::{EventPayload, EventTag};

#[test]
fn test_idle_broker_steals_batch_but_never_high_queue() {
    let mut world = two_region_world(
        SimConfig::default(),
        vec![standard_vm(1, "A")],
        Vec::new(),
    );
    let id_a = world.broker_a.borrow().entity_id();
    let id_b = world.broker_b.borrow().entity_id();

    // B区无VM，积压7个任务：2高 + 2中 + 3低
    let backlog = vec![
        text_task(1, 2000),
        text_task(2, 2000),
        image_task(3, 500_000),
        image_task(4, 500_000),
        reel_task(5, 10_000_000),
        reel_task(6, 10_000_000),
        reel_task(7, 10_000_000),
    ];
    world
        .sim
        .schedule(id_b, 0.5, EventTag::SubmitTasks, EventPayload::TaskBatch(backlog));
    // 空批次触发A区的一轮调度，空闲时发起窃取
    world
        .sim
        .schedule(id_a, 1.0, EventTag::SubmitTasks, EventPayload::TaskBatch(Vec::new()));

    world.sim.start();
    world.sim.run_until(1.5);

    {
        // 窃取顺序 溢出->低->中，上限5个，高优先级队列不可窃取
        let victim = world.broker_b.borrow();
        assert_eq!(victim.queues().queue(QueueLevel::High).len(), 2);
        assert_eq!(victim.queues().queue(QueueLevel::Medium).len(), 0);
        assert_eq!(victim.queues().queue(QueueLevel::Low).len(), 0);
    }
    {
        // 3低 + 2中 落入A区：2中先派发，1低补满并发槽位，余2排队
        let thief = world.broker_a.borrow();
        assert_eq!(thief.in_flight().len(), 3);
        assert_eq!(thief.queues().queued_len(), 2);
        assert_eq!(thief.task_count(1), 3);
    }
    // 归属字段已改写，所有权完成转移
    let store = world.store.borrow();
    for id in [3, 4, 5, 6, 7] {
        assert_eq!(
            store
                .hget(STORE_LEVEL_GLOBAL, GLOBAL_REGION, &format!("Task_{id}"), "assigned_lb")
                .as_deref(),
            Some("LB1")
        );
    }
    for id in [1, 2] {
        assert_eq!(
            store
                .hget(STORE_LEVEL_GLOBAL, GLOBAL_REGION, &format!("Task_{id}"), "assigned_lb")
                .as_deref(),
            Some("LB2")
        );
    }
}
