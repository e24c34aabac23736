use roomscan_engine::errors::EngineError;
use roomscan_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("加载图纸失败: {0}")]
    Load(#[from] IoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("命令执行失败: {0}")]
    Command(String),
    #[error("序列化报告失败: {0}")]
    Report(#[from] serde_json::Error),
}
