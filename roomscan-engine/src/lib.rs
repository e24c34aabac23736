pub mod command;
pub mod detect;

pub mod errors {
    use roomscan_config::ConfigError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("room detection is already running")]
        Busy,
        #[error("room with index {0} not found")]
        RoomNotFound(usize),
        #[error("layer {0:?} not found")]
        LayerNotFound(String),
        #[error("invalid detection config: {0}")]
        InvalidConfig(#[from] ConfigError),
    }
}

pub mod session {
    use roomscan_config::DetectionConfig;
    use roomscan_core::document::{Drawing, Entity, EntityId, Text};
    use roomscan_core::geometry::Point2;
    use roomscan_core::layer::LayerSet;
    use tracing::{debug, info, warn};

    use crate::detect::{DetectionOutcome, DetectionStats, Room, detect_rooms};
    use crate::errors::EngineError;

    /// 检测状态机：`Idle → Analyzing → Idle`。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub enum AnalysisState {
        #[default]
        Idle,
        Analyzing,
    }

    /// 视口中心，用于“居中显示房间”。
    #[derive(Debug, Clone, Copy)]
    pub struct ViewportState {
        pub center: Point2,
    }

    impl Default for ViewportState {
        fn default() -> Self {
            Self {
                center: Point2::new(0.0, 0.0),
            }
        }
    }

    /// 会话持有图纸、可见图层、检测结果以及检测状态。
    #[derive(Debug)]
    pub struct DetectionSession {
        drawing: Drawing,
        visible: LayerSet,
        config: DetectionConfig,
        rooms: Vec<Room>,
        last_stats: Option<DetectionStats>,
        state: AnalysisState,
        viewport: ViewportState,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct DemoEntities {
        pub office: EntityId,
        pub hall_walls: [EntityId; 4],
        pub column: EntityId,
        pub label: EntityId,
    }

    impl DetectionSession {
        pub fn new() -> Self {
            Self::with_config(DetectionConfig::default())
        }

        pub fn with_config(config: DetectionConfig) -> Self {
            Self {
                drawing: Drawing::new(),
                visible: LayerSet::new(),
                config,
                rooms: Vec::new(),
                last_stats: None,
                state: AnalysisState::Idle,
                viewport: ViewportState::default(),
            }
        }

        /// 使用现有图纸初始化会话。
        pub fn with_drawing(drawing: Drawing, config: DetectionConfig) -> Self {
            let mut session = Self::with_config(config);
            session.load_drawing(drawing);
            session
        }

        /// 替换当前图纸：显示全部图层，清空房间，视口移到图纸中心。
        pub fn load_drawing(&mut self, drawing: Drawing) {
            self.drawing = drawing;
            self.visible = self.drawing.all_layers();
            self.rooms.clear();
            self.last_stats = None;
            self.state = AnalysisState::Idle;
            self.viewport.center = self.drawing.extent(None).center();
        }

        /// 清空图纸与全部运行时状态，保留配置。
        pub fn reset(&mut self) {
            let config = std::mem::take(&mut self.config);
            *self = Self::with_config(config);
        }

        #[inline]
        pub fn drawing(&self) -> &Drawing {
            &self.drawing
        }

        #[inline]
        pub fn config(&self) -> &DetectionConfig {
            &self.config
        }

        pub fn set_config(&mut self, config: DetectionConfig) {
            self.config = config;
        }

        #[inline]
        pub fn state(&self) -> AnalysisState {
            self.state
        }

        #[inline]
        pub fn is_analyzing(&self) -> bool {
            self.state == AnalysisState::Analyzing
        }

        #[inline]
        pub fn visible_layers(&self) -> &LayerSet {
            &self.visible
        }

        /// 显示图层（按显示名称）。图纸中不存在该图层时返回错误。
        pub fn show_layer(&mut self, name: &str) -> Result<bool, EngineError> {
            self.ensure_layer(name)?;
            Ok(self.visible.show(name))
        }

        pub fn hide_layer(&mut self, name: &str) -> Result<bool, EngineError> {
            self.ensure_layer(name)?;
            Ok(self.visible.hide(name))
        }

        /// 切换图层可见性，返回切换后的状态。
        pub fn toggle_layer(&mut self, name: &str) -> Result<bool, EngineError> {
            self.ensure_layer(name)?;
            Ok(self.visible.toggle(name))
        }

        pub fn show_all_layers(&mut self) {
            self.visible = self.drawing.all_layers();
        }

        pub fn hide_all_layers(&mut self) {
            self.visible.clear();
        }

        /// 只保留给定图层可见。
        pub fn isolate_layers<'a, I>(&mut self, names: I) -> Result<(), EngineError>
        where
            I: IntoIterator<Item = &'a str>,
        {
            let mut visible = LayerSet::new();
            for name in names {
                self.ensure_layer(name)?;
                visible.show(name);
            }
            self.visible = visible;
            Ok(())
        }

        fn ensure_layer(&self, name: &str) -> Result<(), EngineError> {
            if self.drawing.layer_entity_count(name) == 0 {
                return Err(EngineError::LayerNotFound(name.to_string()));
            }
            Ok(())
        }

        /// 进入 `Analyzing`。已在检测中时返回 [`EngineError::Busy`]。
        pub fn begin_detection(&mut self) -> Result<(), EngineError> {
            if self.is_analyzing() {
                return Err(EngineError::Busy);
            }
            self.state = AnalysisState::Analyzing;
            Ok(())
        }

        /// 写入检测结果并回到 `Idle`。失败时清空房间列表后返回原错误。
        pub fn finish_detection(
            &mut self,
            result: Result<DetectionOutcome, EngineError>,
        ) -> Result<usize, EngineError> {
            self.state = AnalysisState::Idle;
            match result {
                Ok(outcome) => {
                    info!(
                        rooms = outcome.rooms.len(),
                        skipped = outcome.stats.skipped(),
                        "房间检测完成"
                    );
                    self.rooms = outcome.rooms;
                    self.last_stats = Some(outcome.stats);
                    Ok(self.rooms.len())
                }
                Err(err) => {
                    warn!(error = %err, "房间检测失败，未找到房间");
                    self.rooms.clear();
                    self.last_stats = None;
                    Err(err)
                }
            }
        }

        /// 对当前图纸和可见图层运行一次检测，返回房间数量。
        pub fn run_detection(&mut self) -> Result<usize, EngineError> {
            self.begin_detection()?;
            let result = detect_rooms(&self.drawing, &self.visible, &self.config);
            self.finish_detection(result)
        }

        #[inline]
        pub fn rooms(&self) -> &[Room] {
            &self.rooms
        }

        #[inline]
        pub fn room(&self, index: usize) -> Option<&Room> {
            self.rooms.get(index)
        }

        #[inline]
        pub fn last_stats(&self) -> Option<&DetectionStats> {
            self.last_stats.as_ref()
        }

        pub fn clear_rooms(&mut self) {
            self.rooms.clear();
            self.last_stats = None;
        }

        /// 将视口中心移到指定房间外框中心。
        pub fn focus_room(&mut self, index: usize) -> Result<Point2, EngineError> {
            let center = self
                .rooms
                .get(index)
                .map(Room::center)
                .ok_or(EngineError::RoomNotFound(index))?;
            self.viewport.center = center;
            Ok(center)
        }

        #[inline]
        pub fn viewport(&self) -> ViewportState {
            self.viewport
        }

        /// 为 CLI / 快速验证载入一张示例平面图，返回关键实体 ID。
        pub fn populate_demo(&mut self) -> DemoEntities {
            let mut drawing = Drawing::new();

            let office = drawing.add_polyline(
                [
                    Point2::new(0.0, 0.0),
                    Point2::new(3_000.0, 0.0),
                    Point2::new(3_000.0, 2_500.0),
                    Point2::new(0.0, 2_500.0),
                ],
                true,
                "WALLS",
            );
            let hall_walls = [
                drawing.add_line(Point2::new(5_000.0, 0.0), Point2::new(9_000.0, 0.0), "WALLS"),
                drawing.add_line(
                    Point2::new(5_000.0, 3_000.0),
                    Point2::new(9_000.0, 3_000.0),
                    "WALLS",
                ),
                drawing.add_line(
                    Point2::new(5_000.0, 0.0),
                    Point2::new(5_000.0, 3_000.0),
                    "WALLS",
                ),
                drawing.add_line(
                    Point2::new(9_000.0, 0.0),
                    Point2::new(9_000.0, 3_000.0),
                    "WALLS",
                ),
            ];
            let column = drawing.add_circle(Point2::new(11_000.0, 1_500.0), 600.0, "COLUMNS");
            let label = drawing.add_entity(Entity::Text(Text {
                anchor: Some(Point2::new(1_500.0, 1_250.0)),
                content: Some("Office".to_string()),
                layer: "ANNOTATION".to_string(),
            }));

            self.load_drawing(drawing);

            let ids = DemoEntities {
                office,
                hall_walls,
                column,
                label,
            };

            debug!(
                office = ids.office.get(),
                column = ids.column.get(),
                label = ids.label.get(),
                "已创建演示图纸"
            );

            ids
        }
    }

    impl Default for DetectionSession {
        fn default() -> Self {
            Self::new()
        }
    }

}
