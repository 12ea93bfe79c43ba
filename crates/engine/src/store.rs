//! # 协调存储
//!
//! 模拟两级Redis缓存架构：
//! - 第1级：全局（跨区域共享），记录任务状态与归属broker
//! - 第2级：区域（按zone分区），记录VM状态与最近心跳
//!
//! 存储句柄在构造broker时显式注入，不使用全局单例；
//! `reset` 仅供测试隔离。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use lbsim_core::constants::{EXPIRED_CHANNEL, STORE_LEVEL_GLOBAL, STORE_LEVEL_REGIONAL};

type Hash = HashMap<String, String>;
type KeySpace = HashMap<String, Hash>;

/// 频道订阅回调。回调内不得再次访问存储（单线程可重入限制）
pub type Subscriber = Box<dyn FnMut(&str, &str)>;

/// 共享存储句柄，构造时注入各broker
pub type StoreHandle = Rc<RefCell<CoordStore>>;

pub fn new_store_handle() -> StoreHandle {
    Rc::new(RefCell::new(CoordStore::new()))
}

pub struct CoordStore {
    /// 第1级：全局键空间
    global: KeySpace,
    /// 第2级：按区域分区的键空间
    zonal: HashMap<String, KeySpace>,
    /// 键 -> 过期时刻（仿真时间）
    expiry: HashMap<String, f64>,
    subscribers: HashMap<String, Vec<Subscriber>>,
}

impl CoordStore {
    pub fn new() -> Self {
        Self {
            global: HashMap::new(),
            zonal: HashMap::new(),
            expiry: HashMap::new(),
            subscribers: HashMap::new(),
        }
    }

    /// 清空全部状态，仅用于测试隔离
    pub fn reset(&mut self) {
        self.global.clear();
        self.zonal.clear();
        self.expiry.clear();
        self.subscribers.clear();
    }

    fn space(&self, level: u8, region: &str) -> Option<&KeySpace> {
        match level {
            STORE_LEVEL_GLOBAL => Some(&self.global),
            STORE_LEVEL_REGIONAL => self.zonal.get(region),
            _ => None,
        }
    }

    fn space_mut(&mut self, level: u8, region: &str) -> Option<&mut KeySpace> {
        match level {
            STORE_LEVEL_GLOBAL => Some(&mut self.global),
            STORE_LEVEL_REGIONAL => Some(self.zonal.entry(region.to_string()).or_default()),
            _ => None,
        }
    }

    pub fn hset(&mut self, level: u8, region: &str, key: &str, field: &str, value: &str) {
        if let Some(space) = self.space_mut(level, region) {
            space
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        }
    }

    pub fn hget(&self, level: u8, region: &str, key: &str, field: &str) -> Option<String> {
        self.space(level, region)?.get(key)?.get(field).cloned()
    }

    pub fn hget_all(&self, level: u8, region: &str, key: &str) -> Option<Hash> {
        self.space(level, region)?.get(key).cloned()
    }

    pub fn del(&mut self, level: u8, region: &str, key: &str) {
        if let Some(space) = self.space_mut(level, region) {
            space.remove(key);
        }
        self.expiry.remove(key);
    }

    /// 按前缀扫描键名
    pub fn scan_keys(&self, level: u8, region: &str, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = match self.space(level, region) {
            Some(space) => space
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        // HashMap遍历顺序不稳定，排序保证扫描结果可复现
        keys.sort();
        keys
    }

    /// 简化的SETEX：写入status字段并登记过期时间
    pub fn set_ex(&mut self, level: u8, region: &str, key: &str, value: &str, now: f64, ttl: f64) {
        self.hset(level, region, key, "status", value);
        self.expiry.insert(key.to_string(), now + ttl);
    }

    pub fn expire(&mut self, key: &str, now: f64, ttl: f64) {
        if self.expiry.contains_key(key) || self.exists_anywhere(key) {
            self.expiry.insert(key.to_string(), now + ttl);
        }
    }

    fn exists_anywhere(&self, key: &str) -> bool {
        self.global.contains_key(key) || self.zonal.values().any(|space| space.contains_key(key))
    }

    /// 过期检查：删除超时键并在 `keyspace:expired` 频道发布键名
    pub fn tick(&mut self, now: f64) {
        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, &deadline)| now >= deadline)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            self.expiry.remove(&key);
            self.global.remove(&key);
            for space in self.zonal.values_mut() {
                space.remove(&key);
            }
            debug!("键过期: {key}");
            self.publish(EXPIRED_CHANNEL, &key);
        }
    }

    pub fn subscribe(&mut self, channel: &str, subscriber: Subscriber) {
        self.subscribers
            .entry(channel.to_string())
            .or_default()
            .push(subscriber);
    }

    pub fn publish(&mut self, channel: &str, message: &str) {
        if let Some(subs) = self.subscribers.get_mut(channel) {
            for sub in subs.iter_mut() {
                sub(channel, message);
            }
        }
    }
}

impl Default for CoordStore {
    fn default() -> Self {
        Self::new()
    }
}
