use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use roomscan_config::{AppConfig, ConfigError, ReportFormat};
use roomscan_frontend::CliOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 从 CAD 图纸中检测房间。
#[derive(Debug, Parser)]
#[command(name = "roomscan", version, about)]
struct Args {
    /// 配置文件路径，缺省时读取 `ROOMSCAN_CONFIG` 或 `./config/default.toml`。
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 已解码图纸（JSON）。缺省时读取 `ROOMSCAN_SAMPLE_DRAWING`，再回退到内置示例。
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// 仅在这些图层上检测，可重复。
    #[arg(long = "layer", value_name = "NAME")]
    layers: Vec<String>,

    /// 报告格式，覆盖配置文件。
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("执行失败: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_configuration(args.config)?;
    info!("启动 roomscan");

    let options = CliOptions {
        input: args.input,
        layers: args.layers,
        format: args.format.map(ReportFormat::from),
    };
    roomscan_frontend::run_cli(&options, &config).context("房间检测失败")
}

/// 显式指定的配置加载失败时报错；自动发现失败时回退到默认配置。
fn load_configuration(override_path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    if let Some(path) = override_path {
        let loaded = AppConfig::from_file(&path);
        init_logging(loaded.as_ref().map(|cfg| cfg.logging.level.as_str()).unwrap_or("info"));
        return loaded.with_context(|| format!("无法加载配置文件 {}", path.display()));
    }

    match AppConfig::discover() {
        Ok(cfg) => {
            init_logging(&cfg.logging.level);
            Ok(cfg)
        }
        Err(err) => {
            init_logging("info");
            match &err {
                ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                    warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                }
                ConfigError::Context { .. } | ConfigError::Invalid(_) => {
                    warn!(error = %err, "加载默认配置失败，使用内建默认值");
                }
            }
            Ok(AppConfig::default())
        }
    }
}

/// 日志写入标准错误，保持标准输出只包含报告。
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
