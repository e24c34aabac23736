use std::f64::consts::PI;

use roomscan_config::CircleConfig;
use roomscan_core::document::{Entity, EntityId};
use roomscan_core::geometry::Bounds2D;
use tracing::{debug, warn};

use super::{Room, RoomSource, StageStats, all_finite};

pub(crate) fn detect(
    candidates: &[(EntityId, &Entity)],
    config: &CircleConfig,
    stats: &mut StageStats,
) -> Vec<Room> {
    let mut rooms = Vec::new();
    let limit = config.max_rooms.unwrap_or(usize::MAX);

    for (id, entity) in candidates {
        if rooms.len() >= limit {
            break;
        }
        if !matches!(entity, Entity::Circle(_) | Entity::Arc(_)) {
            continue;
        }
        let points = entity.points();
        if !all_finite(&points) {
            warn!(entity = id.get(), "圆形实体包含非有限坐标，已跳过");
            stats.skipped += 1;
            continue;
        }
        let Some(bounds) = Bounds2D::from_points(points) else {
            continue;
        };
        stats.candidates += 1;

        let diameter = bounds.width();
        let radius = diameter / 2.0;
        let area = PI * radius * radius;
        if area < config.min_area || area > config.max_area || diameter <= config.min_diameter {
            debug!(entity = id.get(), diameter, area, "圆形尺寸不符合房间条件");
            stats.rejected += 1;
            continue;
        }

        stats.accepted += 1;
        rooms.push(Room {
            id: format!("circle_room_{}", rooms.len() + 1),
            bounds,
            area,
            entities: vec![*id],
            is_enclosed: true,
            source: RoomSource::Circle,
        });
    }

    rooms
}
