use std::path::PathBuf;

use roomscan_config::{AppConfig, ReportFormat};
use roomscan_core::geometry::Point2;
use roomscan_engine::command::{CommandBus, CommandContext, CommandRequest};
use roomscan_engine::detect::{DetectionStats, Room, RoomSource};
use roomscan_engine::session::DetectionSession;
use serde::Serialize;
use tracing::info;

use crate::errors::FrontendError;
use crate::loader::{LoadedSession, load_session};

/// 命令行选项，由二进制解析后传入。
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub input: Option<PathBuf>,
    /// 仅显示这些图层；为空时显示全部。
    pub layers: Vec<String>,
    /// 覆盖配置中的报告格式。
    pub format: Option<ReportFormat>,
}

#[derive(Debug, Serialize)]
pub struct LayerReport {
    pub name: String,
    pub entities: usize,
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomReport {
    pub index: usize,
    pub id: String,
    pub source: &'static str,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub center: [f64; 2],
    pub area: f64,
    pub is_enclosed: bool,
    pub entities: Vec<u64>,
}

impl RoomReport {
    fn from_room(index: usize, room: &Room) -> Self {
        let center = room.center();
        Self {
            index,
            id: room.id.clone(),
            source: room.source.as_str(),
            min_x: room.bounds.min_x(),
            min_y: room.bounds.min_y(),
            max_x: room.bounds.max_x(),
            max_y: room.bounds.max_y(),
            center: [center.x(), center.y()],
            area: room.area,
            is_enclosed: room.is_enclosed,
            entities: room.entities.iter().map(|id| id.get()).collect(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct StatsReport {
    pub total_entities: usize,
    pub visible_entities: usize,
    pub polygon_rooms: usize,
    pub rectangle_rooms: usize,
    pub circle_rooms: usize,
    pub rectangle_stage_ran: bool,
    pub skipped_entities: usize,
    pub skipped_records: usize,
}

impl StatsReport {
    fn new(stats: Option<&DetectionStats>, skipped_records: usize) -> Self {
        let Some(stats) = stats else {
            return Self {
                skipped_records,
                ..Self::default()
            };
        };
        Self {
            total_entities: stats.total_entities,
            visible_entities: stats.visible_entities,
            polygon_rooms: stats.polygon.accepted,
            rectangle_rooms: stats.rectangle.accepted,
            circle_rooms: stats.circle.accepted,
            rectangle_stage_ran: stats.rectangle_ran,
            skipped_entities: stats.skipped(),
            skipped_records,
        }
    }
}

/// 一次检测的完整报告。
#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub source: String,
    pub layers: Vec<LayerReport>,
    pub rooms: Vec<RoomReport>,
    pub stats: StatsReport,
}

impl DetectionReport {
    pub fn from_session(loaded: &LoadedSession) -> Self {
        let session = &loaded.session;
        let drawing = session.drawing();
        let layers = drawing
            .layers()
            .into_iter()
            .map(|name| LayerReport {
                entities: drawing.layer_entity_count(&name),
                visible: session.visible_layers().contains(&name),
                name,
            })
            .collect();
        let rooms = session
            .rooms()
            .iter()
            .enumerate()
            .map(|(index, room)| RoomReport::from_room(index, room))
            .collect();
        Self {
            source: loaded.source.describe(),
            layers,
            rooms,
            stats: StatsReport::new(session.last_stats(), loaded.skipped_records),
        }
    }
}

/// 加载图纸、应用图层过滤并通过命令总线运行检测，最后输出报告到标准输出。
pub fn run(options: &CliOptions, config: &AppConfig) -> Result<(), FrontendError> {
    let loaded = prepare(options, config)?;
    let format = options.format.unwrap_or(config.report.format);
    let output = render(&loaded, format, config.report.show_entities)?;
    print!("{output}");
    Ok(())
}

/// 加载并完成检测，返回可渲染的会话。
pub fn prepare(options: &CliOptions, config: &AppConfig) -> Result<LoadedSession, FrontendError> {
    let mut loaded = load_session(options.input.as_deref(), &config.detection)?;
    if !options.layers.is_empty() {
        loaded
            .session
            .isolate_layers(options.layers.iter().map(String::as_str))?;
    }

    let command_bus = CommandBus::new();
    let mut context = CommandContext {
        session: &mut loaded.session,
    };
    dispatch_cli_command(&command_bus, "detect_rooms", &mut context)?;

    info!(
        source = %loaded.source.describe(),
        rooms = loaded.session.rooms().len(),
        "CLI 检测完成"
    );
    Ok(loaded)
}

pub fn render(
    loaded: &LoadedSession,
    format: ReportFormat,
    show_entities: bool,
) -> Result<String, FrontendError> {
    match format {
        ReportFormat::Json => {
            let report = DetectionReport::from_session(loaded);
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            Ok(json)
        }
        ReportFormat::Text => Ok(render_text(loaded, show_entities)),
    }
}

fn render_text(loaded: &LoadedSession, show_entities: bool) -> String {
    let session: &DetectionSession = &loaded.session;
    let drawing = session.drawing();
    let mut out = String::new();

    out.push_str("roomscan 房间检测报告\n");
    out.push_str(&format!("来源: {}\n", loaded.source.describe()));
    if let Some(ids) = &loaded.demo_entities {
        out.push_str(&format!(
            "内置示例: 办公室多段线 #{}, 大厅墙线 #{}-#{}, 圆柱 #{}\n",
            ids.office.get(),
            ids.hall_walls[0].get(),
            ids.hall_walls[3].get(),
            ids.column.get()
        ));
    }

    let layers = drawing.layers();
    out.push_str(&format!("图层 ({}):\n", layers.len()));
    for name in &layers {
        out.push_str(&format!(
            "  - {} 实体={} 可见={}\n",
            name,
            drawing.layer_entity_count(name),
            yes_no(session.visible_layers().contains(name))
        ));
    }

    let rooms = session.rooms();
    if rooms.is_empty() {
        out.push_str("未找到房间\n");
    } else {
        out.push_str(&format!("房间 ({}):\n", rooms.len()));
        for (index, room) in rooms.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {} 来源={} 范围={}-{} 面积={:.2} 封闭={}\n",
                index,
                room.id,
                room.source.as_str(),
                format_point(room.bounds.min()),
                format_point(room.bounds.max()),
                room.area,
                yes_no(room.is_enclosed)
            ));
            if show_entities {
                let ids: Vec<String> = room.entities.iter().map(ToString::to_string).collect();
                out.push_str(&format!("      实体: {}\n", ids.join(", ")));
            }
        }
    }

    let count = |source: RoomSource| rooms.iter().filter(|room| room.source == source).count();
    let stats = StatsReport::new(session.last_stats(), loaded.skipped_records);
    out.push_str(&format!(
        "合计: {} 个房间 (多段线 {}, 矩形 {}, 圆形 {}), 可见实体 {}/{}, 跳过 {}\n",
        rooms.len(),
        count(RoomSource::Polygon),
        count(RoomSource::Rectangle),
        count(RoomSource::Circle),
        stats.visible_entities,
        stats.total_entities,
        stats.skipped_entities + stats.skipped_records
    ));
    out
}

fn dispatch_cli_command(
    bus: &CommandBus,
    name: &str,
    context: &mut CommandContext<'_>,
) -> Result<(), FrontendError> {
    let request = CommandRequest::new(name);
    let response = bus.dispatch(&request, context);
    if response.success {
        if let Some(message) = response.message {
            info!("[命令] {message}");
        }
        Ok(())
    } else {
        Err(FrontendError::Command(
            response.message.unwrap_or_else(|| "未知错误".to_string()),
        ))
    }
}

fn format_point(point: Point2) -> String {
    format!("({:.2}, {:.2})", point.x(), point.y())
}

fn yes_no(value: bool) -> &'static str {
    if value { "是" } else { "否" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_text_report_lists_rooms() {
        let loaded = prepare(&CliOptions::default(), &AppConfig::default()).expect("prepare demo");
        let text = render(&loaded, ReportFormat::Text, true).expect("render text");
        assert!(text.contains("来源: demo"));
        assert!(text.contains("[0] poly_room_1 来源=polygon"));
        assert!(text.contains("[1] rect_room_1 来源=rectangle"));
        assert!(text.contains("[2] circle_room_1 来源=circle"));
        assert!(text.contains("实体: #1, #2, #3, #4"));
        assert!(text.contains("合计: 3 个房间"));
    }

    #[test]
    fn layer_filter_limits_detection() {
        let options = CliOptions {
            layers: vec!["COLUMNS".to_string()],
            ..CliOptions::default()
        };
        let loaded = prepare(&options, &AppConfig::default()).expect("prepare demo");
        let text = render(&loaded, ReportFormat::Text, false).expect("render text");
        assert!(text.contains("circle_room_1"));
        assert!(!text.contains("poly_room_1"));
        assert!(!text.contains("实体: "));
        assert!(text.contains("  - WALLS 实体=5 可见=否"));
    }

    #[test]
    fn unknown_layer_is_an_error() {
        let options = CliOptions {
            layers: vec!["NOPE".to_string()],
            ..CliOptions::default()
        };
        let err = prepare(&options, &AppConfig::default()).expect_err("未知图层应失败");
        assert!(matches!(err, FrontendError::Engine(_)));
    }

    #[test]
    fn json_report_is_structured() {
        let loaded = prepare(&CliOptions::default(), &AppConfig::default()).expect("prepare demo");
        let json = render(&loaded, ReportFormat::Json, true).expect("render json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["source"], "demo");
        assert_eq!(value["rooms"].as_array().map(Vec::len), Some(3));
        assert_eq!(value["rooms"][1]["id"], "rect_room_1");
        assert_eq!(value["rooms"][1]["is_enclosed"], false);
        assert_eq!(value["rooms"][1]["center"][0], 7000.0);
        assert_eq!(value["stats"]["visible_entities"], 7);
        assert_eq!(value["layers"][0]["name"], "ANNOTATION");
    }
}
