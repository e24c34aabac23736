use roomscan_config::PolygonConfig;
use roomscan_core::document::{Entity, EntityId};
use roomscan_core::geometry::{Bounds2D, Point2, polygon_area};
use tracing::{debug, warn};

use super::{Room, RoomSource, StageStats, all_finite};

/// 闭合判定：显式标记，或首尾点在两个方向上的差都严格小于容差（至少 3 个点）。
pub(crate) fn is_closed(points: &[Point2], flagged: bool, tolerance: f64) -> bool {
    if flagged {
        return true;
    }
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() > 2 => {
            (first.x() - last.x()).abs() < tolerance && (first.y() - last.y()).abs() < tolerance
        }
        _ => false,
    }
}

pub(crate) fn detect(
    candidates: &[(EntityId, &Entity)],
    config: &PolygonConfig,
    stats: &mut StageStats,
) -> Vec<Room> {
    let mut rooms = Vec::new();
    let limit = config.max_rooms.unwrap_or(usize::MAX);

    for (id, entity) in candidates {
        if rooms.len() >= limit {
            break;
        }
        let Entity::Polyline(polyline) = entity else {
            continue;
        };
        let points = &polyline.vertices;
        if !all_finite(points) {
            warn!(entity = id.get(), "多段线包含非有限坐标，已跳过");
            stats.skipped += 1;
            continue;
        }
        if points.len() < 3 || !is_closed(points, polyline.is_closed, config.closure_tolerance) {
            continue;
        }
        stats.candidates += 1;

        let Some(bounds) = Bounds2D::from_points(points.iter().copied()) else {
            continue;
        };
        let area = polygon_area(points);
        // 自交多段线的鞋带面积可能为零
        if area <= 0.0 || area < config.min_area || area > config.max_area {
            debug!(entity = id.get(), area, "多段线面积超出范围");
            stats.rejected += 1;
            continue;
        }
        let aspect = bounds.aspect_ratio();
        if aspect >= config.max_aspect_ratio {
            debug!(entity = id.get(), aspect, "多段线过于狭长");
            stats.rejected += 1;
            continue;
        }

        stats.accepted += 1;
        rooms.push(Room {
            id: format!("poly_room_{}", rooms.len() + 1),
            bounds,
            area,
            entities: vec![*id],
            is_enclosed: true,
            source: RoomSource::Polygon,
        });
    }

    rooms
}
