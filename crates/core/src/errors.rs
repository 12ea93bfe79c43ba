use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("任务未找到: {id}")]
    TaskNotFound { id: u64 },
    #[error("虚拟机未找到: {id}")]
    VmNotFound { id: u32 },
    #[error("虚拟机 {vm_id} 在所有数据中心均创建失败")]
    ProvisioningExhausted { vm_id: u32 },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("仿真内部错误: {0}")]
    Simulation(String),
    #[error("资源不足: {0}")]
    ResourceExhausted(String),
    #[error("文件读取错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置解析错误: {0}")]
    Parse(String),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn task_not_found(id: u64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn vm_not_found(id: u32) -> Self {
        Self::VmNotFound { id }
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::Configuration(_) | SimError::Validation(_) | SimError::Simulation(_)
        )
    }
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SimError::ResourceExhausted(_) | SimError::ProvisioningExhausted { .. }
        )
    }
}

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        SimError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::task_not_found(42);
        assert_eq!(err.to_string(), "任务未找到: 42");
        let err = SimError::vm_not_found(5);
        assert_eq!(err.to_string(), "虚拟机未找到: 5");
    }

    #[test]
    fn test_error_classification() {
        assert!(SimError::config_error("bad").is_fatal());
        assert!(!SimError::config_error("bad").is_recoverable());
        assert!(SimError::ResourceExhausted("no vm".to_string()).is_recoverable());
        assert!(SimError::ProvisioningExhausted { vm_id: 1 }.is_recoverable());
    }
}
