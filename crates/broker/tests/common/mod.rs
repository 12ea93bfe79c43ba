#![allow(dead_code)]
//! 双区域仿真世界搭建辅助

use std::cell::RefCell;
use std::rc::Rc;

use lbsim_broker::{Broker, BrokerHandle};
use lbsim_core::config::SimConfig;
use lbsim_core::models::{Task, TaskType, Vm};
use lbsim_engine::{new_store_handle, Datacenter, Simulation, StoreHandle};

pub struct World {
    pub sim: Simulation,
    pub store: StoreHandle,
    pub broker_a: BrokerHandle,
    pub broker_b: BrokerHandle,
}

pub fn standard_vm(id: u32, region: &str) -> Vm {
    Vm::new(id, 1000.0, 1, 2048.0, 1000.0, region)
}

pub fn slow_vm(id: u32, region: &str) -> Vm {
    Vm::new(id, 100.0, 1, 2048.0, 1000.0, region)
}

pub fn text_task(id: u64, length_mi: u64) -> Task {
    Task::new(id, length_mi, TaskType::Text)
}

pub fn image_task(id: u64, length_mi: u64) -> Task {
    Task::new(id, length_mi, TaskType::Image)
}

pub fn reel_task(id: u64, length_mi: u64) -> Task {
    Task::new(id, length_mi, TaskType::Reel)
}

/// 两区域各一个数据中心与broker，互为对端
pub fn two_region_world(config: SimConfig, vms_a: Vec<Vm>, vms_b: Vec<Vm>) -> World {
    let store = new_store_handle();
    let mut sim = Simulation::new();

    let dc_a = sim.add_entity(Rc::new(RefCell::new(Datacenter::new("DC-A", 16))));
    let dc_b = sim.add_entity(Rc::new(RefCell::new(Datacenter::new("DC-B", 16))));

    let broker_a = Rc::new(RefCell::new(Broker::new(
        1,
        "A",
        config.clone(),
        store.clone(),
        vec![dc_a],
        vms_a,
    )));
    let broker_b = Rc::new(RefCell::new(Broker::new(
        2,
        "B",
        config,
        store.clone(),
        vec![dc_b],
        vms_b,
    )));

    let id_a = sim.add_entity(broker_a.clone());
    broker_a.borrow_mut().set_entity_id(id_a);
    let id_b = sim.add_entity(broker_b.clone());
    broker_b.borrow_mut().set_entity_id(id_b);

    broker_a.borrow_mut().set_peer(broker_b.clone());
    broker_b.borrow_mut().set_peer(broker_a.clone());

    World {
        sim,
        store,
        broker_a,
        broker_b,
    }
}
