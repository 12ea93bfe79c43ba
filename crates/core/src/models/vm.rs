use serde::{Deserialize, Serialize};

/// 虚拟机容量描述，仿真全程不销毁，仅变更状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vm {
    pub id: u32,
    /// 单核算力（MIPS）
    pub mips: f64,
    /// 核心数
    pub pes: u32,
    /// 内存容量（MB）
    pub ram: f64,
    /// 带宽容量（Mbps）
    pub bw: f64,
    /// 所属区域，如 "A" / "B"
    pub region: String,
}

impl Vm {
    pub fn new(id: u32, mips: f64, pes: u32, ram: f64, bw: f64, region: impl Into<String>) -> Self {
        Self {
            id,
            mips,
            pes,
            ram,
            bw,
            region: region.into(),
        }
    }

    /// 总算力 = 单核算力 × 核心数
    pub fn total_mips(&self) -> f64 {
        self.mips * self.pes as f64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VmStatus {
    Alive,
    Dead,
    Restarting,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Alive => "ALIVE",
            VmStatus::Dead => "DEAD",
            VmStatus::Restarting => "RESTARTING",
        }
    }
}
