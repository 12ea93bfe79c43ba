//! VM供给失败的转移重试与资源池耗尽

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{standard_vm, text_task};
use lbsim_broker::Broker;
use lbsim_core::config::SimConfig;
use lbsim_engine::{new_store_handle, Datacenter, Simulation};

#[test]
fn test_provision_retries_next_pool_and_gives_up_after_exhaustion() {
    let store = new_store_handle();
    let mut sim = Simulation::new();
    // 首个资源池无槽位，次池只容得下一台VM
    let dc_full = sim.add_entity(Rc::new(RefCell::new(Datacenter::new("DC-A", 0))));
    let dc_one = sim.add_entity(Rc::new(RefCell::new(Datacenter::new("DC-B", 1))));

    let broker = Rc::new(RefCell::new(Broker::new(
        1,
        "A",
        SimConfig::default(),
        store,
        vec![dc_full, dc_one],
        vec![standard_vm(1, "A"), standard_vm(2, "A")],
    )));
    let id = sim.add_entity(broker.clone());
    broker.borrow_mut().set_entity_id(id);
    broker.borrow_mut().submit_tasks(vec![text_task(7, 2000)]);

    sim.start();
    sim.run_until(1.0);
    {
        // 两台VM都被首池拒绝：一台转投次池成功拿到路由，
        // 另一台耗尽所有资源池后被放弃
        let broker = broker.borrow();
        assert_eq!(broker.vms().len(), 1);
        let survivor = broker.vms()[0].id;
        assert!(broker.has_datacenter_route(survivor));
        let abandoned = if survivor == 1 { 2 } else { 1 };
        assert!(!broker.has_datacenter_route(abandoned));
        // 幸存VM照常接收任务，仿真不中断
        assert_eq!(broker.in_flight().len(), 1);
    }

    sim.run_until(5.0);
    let broker = broker.borrow();
    assert_eq!(broker.completed().len(), 1);
    assert!(broker.is_finished());
}
