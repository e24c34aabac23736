//! 房间检测流水线：闭合多段线、矩形重建、圆形房间三个阶段依次运行。

mod circle;
mod polygon;
mod rectangle;

use roomscan_config::DetectionConfig;
use roomscan_core::document::{Drawing, Entity, EntityId};
use roomscan_core::geometry::{Bounds2D, Point2};
use roomscan_core::layer::LayerSet;
use tracing::info;

use crate::errors::EngineError;

/// 产生房间的检测阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomSource {
    Polygon,
    Rectangle,
    Circle,
}

impl RoomSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomSource::Polygon => "polygon",
            RoomSource::Rectangle => "rectangle",
            RoomSource::Circle => "circle",
        }
    }
}

/// 候选房间。`entities` 按构成顺序列出来源实体。
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub bounds: Bounds2D,
    pub area: f64,
    pub entities: Vec<EntityId>,
    pub is_enclosed: bool,
    pub source: RoomSource,
}

impl Room {
    /// 房间外框中心，用于“居中显示”。
    #[inline]
    pub fn center(&self) -> Point2 {
        self.bounds.center()
    }
}

/// 单个阶段的计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// 通过初筛、进入判定的候选数。
    pub candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// 因坐标非有限值而跳过的实体数。
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub total_entities: usize,
    pub visible_entities: usize,
    pub polygon: StageStats,
    pub rectangle: StageStats,
    pub circle: StageStats,
    pub rectangle_ran: bool,
}

impl DetectionStats {
    #[inline]
    pub fn skipped(&self) -> usize {
        self.polygon.skipped + self.rectangle.skipped + self.circle.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutcome {
    pub rooms: Vec<Room>,
    pub stats: DetectionStats,
}

/// 对可见图层上的实体运行完整检测流程。
///
/// 纯函数：不修改图纸，也不持有状态。配置无效时返回 [`EngineError::InvalidConfig`]。
pub fn detect_rooms(
    drawing: &Drawing,
    visible: &LayerSet,
    config: &DetectionConfig,
) -> Result<DetectionOutcome, EngineError> {
    config.validate()?;

    let limit = config.max_entities.unwrap_or(usize::MAX);
    let candidates: Vec<(EntityId, &Entity)> = drawing
        .entities()
        .take(limit)
        .filter(|(_, entity)| visible.is_visible(entity.layer_name()))
        .map(|(id, entity)| (*id, entity))
        .collect();

    let mut stats = DetectionStats {
        total_entities: drawing.len(),
        visible_entities: candidates.len(),
        ..DetectionStats::default()
    };

    let mut rooms = polygon::detect(&candidates, &config.polygon, &mut stats.polygon);
    info!(
        visible = stats.visible_entities,
        found = stats.polygon.accepted,
        rejected = stats.polygon.rejected,
        "闭合多段线阶段完成"
    );

    if rooms.len() < config.rectangle.trigger_below {
        stats.rectangle_ran = true;
        let rectangles = rectangle::detect(&candidates, &config.rectangle, &mut stats.rectangle);
        info!(
            found = stats.rectangle.accepted,
            rejected = stats.rectangle.rejected,
            "矩形重建阶段完成"
        );
        rooms.extend(rectangles);
    }

    let circles = circle::detect(&candidates, &config.circle, &mut stats.circle);
    info!(
        found = stats.circle.accepted,
        rejected = stats.circle.rejected,
        "圆形房间阶段完成"
    );
    rooms.extend(circles);

    Ok(DetectionOutcome { rooms, stats })
}

fn all_finite(points: &[Point2]) -> bool {
    points.iter().all(|point| point.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomscan_config::RectangleOrder;

    fn rect_lines(drawing: &mut Drawing, min: (f64, f64), max: (f64, f64), layer: &str) {
        let (x0, y0) = min;
        let (x1, y1) = max;
        drawing.add_line(Point2::new(x0, y0), Point2::new(x1, y0), layer);
        drawing.add_line(Point2::new(x0, y1), Point2::new(x1, y1), layer);
        drawing.add_line(Point2::new(x0, y0), Point2::new(x0, y1), layer);
        drawing.add_line(Point2::new(x1, y0), Point2::new(x1, y1), layer);
    }

    fn closed_rect(drawing: &mut Drawing, width: f64, height: f64, layer: &str) -> EntityId {
        drawing.add_polyline(
            [
                Point2::new(0.0, 0.0),
                Point2::new(width, 0.0),
                Point2::new(width, height),
                Point2::new(0.0, height),
            ],
            true,
            layer,
        )
    }

    #[test]
    fn closed_polyline_becomes_enclosed_room() {
        let mut drawing = Drawing::new();
        let id = closed_rect(&mut drawing, 100.0, 200.0, "WALLS");

        let outcome = detect_rooms(&drawing, &drawing.all_layers(), &DetectionConfig::default())
            .expect("检测应成功");
        assert_eq!(outcome.rooms.len(), 1);
        let room = &outcome.rooms[0];
        assert_eq!(room.id, "poly_room_1");
        assert!((room.area - 20_000.0).abs() < 1e-6);
        assert!(room.is_enclosed);
        assert_eq!(room.source, RoomSource::Polygon);
        assert_eq!(room.entities, vec![id]);
        assert_eq!(room.bounds, Bounds2D::from_extents(0.0, 0.0, 100.0, 200.0));
        assert!(outcome.stats.rectangle_ran);
    }

    #[test]
    fn four_lines_form_rectangle_room() {
        let mut drawing = Drawing::new();
        rect_lines(&mut drawing, (0.0, 0.0), (500.0, 500.0), "WALLS");

        let outcome = detect_rooms(&drawing, &drawing.all_layers(), &DetectionConfig::default())
            .expect("检测应成功");
        assert_eq!(outcome.rooms.len(), 1);
        let room = &outcome.rooms[0];
        assert_eq!(room.id, "rect_room_1");
        assert_eq!(room.bounds, Bounds2D::from_extents(0.0, 0.0, 500.0, 500.0));
        assert!((room.area - 250_000.0).abs() < 1e-6);
        assert!(!room.is_enclosed);
        assert_eq!(room.source, RoomSource::Rectangle);
        assert_eq!(
            room.entities,
            vec![
                EntityId::new(0),
                EntityId::new(1),
                EntityId::new(2),
                EntityId::new(3)
            ]
        );
    }

    #[test]
    fn circle_becomes_round_room() {
        let mut drawing = Drawing::new();
        drawing.add_circle(Point2::new(0.0, 0.0), 50.0, "COLUMNS");

        let outcome = detect_rooms(&drawing, &drawing.all_layers(), &DetectionConfig::default())
            .expect("检测应成功");
        assert_eq!(outcome.rooms.len(), 1);
        let room = &outcome.rooms[0];
        assert_eq!(room.id, "circle_room_1");
        assert!((room.area - 7_853.981_633_974_483).abs() < 1e-6);
        assert_eq!(room.bounds, Bounds2D::from_extents(-50.0, -50.0, 50.0, 50.0));
        assert!(room.is_enclosed);
    }

    #[test]
    fn hidden_layers_yield_no_rooms() {
        let mut drawing = Drawing::new();
        closed_rect(&mut drawing, 100.0, 200.0, "WALLS");
        rect_lines(&mut drawing, (0.0, 0.0), (500.0, 500.0), "WALLS");
        drawing.add_circle(Point2::new(0.0, 0.0), 50.0, "COLUMNS");

        let outcome =
            detect_rooms(&drawing, &LayerSet::new(), &DetectionConfig::default()).expect("检测应成功");
        assert!(outcome.rooms.is_empty());
        assert_eq!(outcome.stats.visible_entities, 0);
        assert_eq!(outcome.stats.total_entities, 6);
    }

    #[test]
    fn stages_are_merged_in_order() {
        let mut drawing = Drawing::new();
        drawing.add_circle(Point2::new(2_000.0, 2_000.0), 100.0, "COLUMNS");
        rect_lines(&mut drawing, (0.0, 0.0), (500.0, 500.0), "WALLS");
        closed_rect(&mut drawing, 100.0, 200.0, "WALLS");

        let outcome = detect_rooms(&drawing, &drawing.all_layers(), &DetectionConfig::default())
            .expect("检测应成功");
        let sources: Vec<RoomSource> = outcome.rooms.iter().map(|room| room.source).collect();
        assert_eq!(
            sources,
            vec![RoomSource::Polygon, RoomSource::Rectangle, RoomSource::Circle]
        );
    }

    #[test]
    fn rectangle_stage_skipped_when_enough_polygons() {
        let mut drawing = Drawing::new();
        closed_rect(&mut drawing, 100.0, 200.0, "WALLS");
        rect_lines(&mut drawing, (0.0, 0.0), (500.0, 500.0), "WALLS");

        let mut config = DetectionConfig::default();
        config.rectangle.trigger_below = 1;
        let outcome = detect_rooms(&drawing, &drawing.all_layers(), &config).expect("检测应成功");
        assert!(!outcome.stats.rectangle_ran);
        assert_eq!(outcome.rooms.len(), 1);
        assert_eq!(outcome.rooms[0].source, RoomSource::Polygon);
    }

    #[test]
    fn max_entities_truncates_before_filtering() {
        let mut drawing = Drawing::new();
        drawing.add_circle(Point2::new(0.0, 0.0), 50.0, "COLUMNS");
        closed_rect(&mut drawing, 100.0, 200.0, "WALLS");

        let mut config = DetectionConfig::default();
        config.max_entities = Some(1);
        let outcome = detect_rooms(&drawing, &drawing.all_layers(), &config).expect("检测应成功");
        assert_eq!(outcome.stats.visible_entities, 1);
        assert_eq!(outcome.rooms.len(), 1);
        assert_eq!(outcome.rooms[0].source, RoomSource::Circle);
    }

    #[test]
    fn invalid_config_is_reported() {
        let drawing = Drawing::new();
        let mut config = DetectionConfig::default();
        config.rectangle.max_overlap_ratio = 2.0;
        let err = detect_rooms(&drawing, &LayerSet::new(), &config).expect_err("应拒绝无效配置");
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn overlap_policy_changes_winner() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(1_000.0, 0.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 500.0), Point2::new(1_000.0, 500.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 500.0), "WALLS");
        drawing.add_line(Point2::new(500.0, 0.0), Point2::new(500.0, 500.0), "WALLS");
        drawing.add_line(Point2::new(520.0, 0.0), Point2::new(520.0, 500.0), "WALLS");

        let layers = drawing.all_layers();
        let outcome =
            detect_rooms(&drawing, &layers, &DetectionConfig::default()).expect("检测应成功");
        assert_eq!(outcome.rooms.len(), 1);
        assert_eq!(
            outcome.rooms[0].bounds,
            Bounds2D::from_extents(0.0, 0.0, 500.0, 500.0)
        );

        let mut config = DetectionConfig::default();
        config.rectangle.order = RectangleOrder::AreaDescending;
        let outcome = detect_rooms(&drawing, &layers, &config).expect("检测应成功");
        assert_eq!(outcome.rooms.len(), 1);
        assert_eq!(
            outcome.rooms[0].bounds,
            Bounds2D::from_extents(0.0, 0.0, 520.0, 500.0)
        );
        assert_eq!(outcome.rooms[0].id, "rect_room_1");
    }
}
