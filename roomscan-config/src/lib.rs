use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指向配置文件的环境变量。
pub const CONFIG_ENV_VAR: &str = "ROOMSCAN_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

impl AppConfig {
    /// 从显式路径加载配置，并校验检测参数。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.detection.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `ROOMSCAN_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,
    /// 文本报告中是否列出构成房间的实体。
    #[serde(default = "ReportConfig::default_show_entities")]
    pub show_entities: bool,
}

impl ReportConfig {
    fn default_show_entities() -> bool {
        true
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            show_entities: Self::default_show_entities(),
        }
    }
}

/// 房间检测的全部阈值。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionConfig {
    /// 参与检测的实体上限（按输入顺序截断），缺省不限。
    #[serde(default)]
    pub max_entities: Option<usize>,
    #[serde(default)]
    pub polygon: PolygonConfig,
    #[serde(default)]
    pub rectangle: RectangleConfig,
    #[serde(default)]
    pub circle: CircleConfig,
}

impl DetectionConfig {
    /// 拒绝反向区间、非正容差以及超出 `[0,1]` 的重叠比例。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let polygon = &self.polygon;
        positive("detection.polygon.closure_tolerance", polygon.closure_tolerance)?;
        window(
            "detection.polygon.min_area",
            "detection.polygon.max_area",
            polygon.min_area,
            polygon.max_area,
        )?;
        positive("detection.polygon.max_aspect_ratio", polygon.max_aspect_ratio)?;

        let rectangle = &self.rectangle;
        non_negative(
            "detection.rectangle.min_segment_length",
            rectangle.min_segment_length,
        )?;
        positive(
            "detection.rectangle.angle_tolerance_deg",
            rectangle.angle_tolerance_deg,
        )?;
        if rectangle.angle_tolerance_deg > 45.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.rectangle.angle_tolerance_deg 不能超过 45，当前为 {}",
                rectangle.angle_tolerance_deg
            )));
        }
        window(
            "detection.rectangle.min_span",
            "detection.rectangle.max_span",
            rectangle.min_span,
            rectangle.max_span,
        )?;
        window(
            "detection.rectangle.min_area",
            "detection.rectangle.max_area",
            rectangle.min_area,
            rectangle.max_area,
        )?;
        non_negative(
            "detection.rectangle.vertical_cover_slack",
            rectangle.vertical_cover_slack,
        )?;
        non_negative(
            "detection.rectangle.horizontal_cover_slack",
            rectangle.horizontal_cover_slack,
        )?;
        positive(
            "detection.rectangle.max_aspect_ratio",
            rectangle.max_aspect_ratio,
        )?;
        if !(0.0..=1.0).contains(&rectangle.max_overlap_ratio) {
            return Err(ConfigError::Invalid(format!(
                "detection.rectangle.max_overlap_ratio 必须位于 [0, 1]，当前为 {}",
                rectangle.max_overlap_ratio
            )));
        }
        if rectangle.max_pending_candidates == 0 {
            return Err(ConfigError::Invalid(
                "detection.rectangle.max_pending_candidates 必须大于 0".to_string(),
            ));
        }

        let circle = &self.circle;
        window(
            "detection.circle.min_area",
            "detection.circle.max_area",
            circle.min_area,
            circle.max_area,
        )?;
        non_negative("detection.circle.min_diameter", circle.min_diameter)?;
        Ok(())
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} 必须是非负有限值，当前为 {value}"
        )))
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && !value.is_nan() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} 必须为正，当前为 {value}")))
    }
}

/// 区间下限必须为正。
fn window(min_name: &str, max_name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    positive(min_name, min)?;
    if max.is_nan() || max < min {
        return Err(ConfigError::Invalid(format!(
            "{min_name} ({min}) 不能大于 {max_name} ({max})"
        )));
    }
    Ok(())
}

/// 闭合多段线检测参数。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolygonConfig {
    pub closure_tolerance: f64,
    pub min_area: f64,
    pub max_area: f64,
    pub max_aspect_ratio: f64,
    pub max_rooms: Option<usize>,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            closure_tolerance: 10.0,
            min_area: 1_000.0,
            max_area: 10_000_000.0,
            max_aspect_ratio: 20.0,
            max_rooms: None,
        }
    }
}

/// 矩形候选的抑制顺序。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectangleOrder {
    /// 按嵌套循环的枚举顺序，先到先得。
    #[default]
    Enumeration,
    /// 先收集候选（至多 `max_pending_candidates` 个面积最大者），再按面积从大到小抑制。
    AreaDescending,
}

/// 由水平/竖直线段重建矩形房间的参数。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RectangleConfig {
    /// 闭合多段线房间少于该数量时才运行。
    pub trigger_below: usize,
    pub max_lines: usize,
    pub min_segment_length: f64,
    pub angle_tolerance_deg: f64,
    pub max_segments_per_axis: usize,
    pub min_span: f64,
    pub max_span: f64,
    pub min_area: f64,
    pub max_area: f64,
    pub vertical_cover_slack: f64,
    pub horizontal_cover_slack: f64,
    pub max_aspect_ratio: f64,
    pub max_overlap_ratio: f64,
    pub order: RectangleOrder,
    /// `area_descending` 时最多保留的候选数，超出时只留面积最大者。
    pub max_pending_candidates: usize,
    pub max_rooms: usize,
}

impl Default for RectangleConfig {
    fn default() -> Self {
        Self {
            trigger_below: 10,
            max_lines: 300,
            min_segment_length: 20.0,
            angle_tolerance_deg: 15.0,
            max_segments_per_axis: 60,
            min_span: 50.0,
            max_span: 10_000.0,
            min_area: 10.0,
            max_area: 1_000_000_000.0,
            vertical_cover_slack: 200.0,
            horizontal_cover_slack: 50.0,
            max_aspect_ratio: 50.0,
            max_overlap_ratio: 0.3,
            order: RectangleOrder::default(),
            max_pending_candidates: 100_000,
            max_rooms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    pub min_area: f64,
    pub max_area: f64,
    pub min_diameter: f64,
    pub max_rooms: Option<usize>,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            min_area: 500.0,
            max_area: 10_000_000.0,
            min_diameter: 50.0,
            max_rooms: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置无效: {0}")]
    Invalid(String),
}
