pub mod cli;
pub mod errors;
pub mod loader;

use errors::FrontendError;
use roomscan_config::AppConfig;
use tracing::info;

pub use cli::CliOptions;

/// 运行 CLI 前端：加载图纸、检测房间并输出报告。
pub fn run_cli(options: &CliOptions, config: &AppConfig) -> Result<(), FrontendError> {
    info!("启动 CLI 前端");
    cli::run(options, config)
}
