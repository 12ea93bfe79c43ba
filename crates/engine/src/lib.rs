//! # lbsim-engine
//!
//! 仿真核心消费的三个外部协作者：
//! - 事件基底：单线程虚拟时钟 + (触发时间, 回调) 优先级队列的运行循环
//! - 协调存储：按区域分区的两级KV存储，带哈希字段、TTL与发布订阅
//! - 数据中心：VM供给与任务执行的资源目录

pub mod datacenter;
pub mod simulation;
pub mod store;

pub use datacenter::Datacenter;
pub use simulation::{SimContext, SimEntity, Simulation};
pub use store::{new_store_handle, CoordStore, StoreHandle};
