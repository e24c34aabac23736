use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use roomscan_config::{RectangleConfig, RectangleOrder};
use roomscan_core::document::{Entity, EntityId};
use roomscan_core::geometry::{Bounds2D, Point2};
use tracing::{debug, warn};

use super::{Room, RoomSource, StageStats, all_finite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// 已分类的轴向线段。
#[derive(Debug, Clone, Copy)]
struct Segment {
    entity: EntityId,
    start: Point2,
    end: Point2,
}

impl Segment {
    fn min_x(&self) -> f64 {
        self.start.x().min(self.end.x())
    }

    fn max_x(&self) -> f64 {
        self.start.x().max(self.end.x())
    }

    fn min_y(&self) -> f64 {
        self.start.y().min(self.end.y())
    }

    fn max_y(&self) -> f64 {
        self.start.y().max(self.end.y())
    }
}

fn classify(start: Point2, end: Point2, tolerance_deg: f64) -> Option<Axis> {
    let dx = (end.x() - start.x()).abs();
    let dy = (end.y() - start.y()).abs();
    let angle = dy.atan2(dx).to_degrees();
    if !(angle < tolerance_deg || angle > 90.0 - tolerance_deg) {
        return None;
    }
    if dx > dy {
        Some(Axis::Horizontal)
    } else {
        Some(Axis::Vertical)
    }
}

/// 收集可见 LINE 并分为水平、竖直两组，各自按起点坐标稳定排序后截断。
fn collect_segments(
    candidates: &[(EntityId, &Entity)],
    config: &RectangleConfig,
    stats: &mut StageStats,
) -> (Vec<Segment>, Vec<Segment>) {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();

    let lines = candidates
        .iter()
        .filter_map(|(id, entity)| match entity {
            Entity::Line(line) => Some((*id, line)),
            _ => None,
        })
        .take(config.max_lines);

    for (id, line) in lines {
        let (Some(start), Some(end)) = (line.start, line.end) else {
            continue;
        };
        if !all_finite(&[start, end]) {
            warn!(entity = id.get(), "线段包含非有限坐标，已跳过");
            stats.skipped += 1;
            continue;
        }
        if start.vector_to(end).length() < config.min_segment_length {
            continue;
        }
        let segment = Segment { entity: id, start, end };
        match classify(start, end, config.angle_tolerance_deg) {
            Some(Axis::Horizontal) => horizontal.push(segment),
            Some(Axis::Vertical) => vertical.push(segment),
            None => {}
        }
    }

    horizontal.sort_by(|a, b| a.start.y().total_cmp(&b.start.y()));
    vertical.sort_by(|a, b| a.start.x().total_cmp(&b.start.x()));
    horizontal.truncate(config.max_segments_per_axis);
    vertical.truncate(config.max_segments_per_axis);
    (horizontal, vertical)
}

#[derive(Debug, Clone)]
struct Candidate {
    bounds: Bounds2D,
    area: f64,
    entities: [EntityId; 4],
}

/// 按面积排序的候选；面积相同时枚举序号小者优先。
#[derive(Debug)]
struct Ranked {
    seq: usize,
    candidate: Candidate,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.candidate
            .area
            .total_cmp(&other.candidate.area)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// 只保留排名最靠前的 `capacity` 个候选，返回按名次排好的列表与总枚举数。
fn best_candidates(
    horizontal: &[Segment],
    vertical: &[Segment],
    config: &RectangleConfig,
    capacity: usize,
) -> (Vec<Candidate>, usize) {
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::new();
    let mut seen = 0usize;
    for_each_candidate(horizontal, vertical, config, |candidate| {
        let ranked = Ranked {
            seq: seen,
            candidate,
        };
        seen += 1;
        if heap.len() < capacity {
            heap.push(Reverse(ranked));
        } else if heap.peek().is_some_and(|Reverse(worst)| ranked > *worst) {
            heap.pop();
            heap.push(Reverse(ranked));
        }
        true
    });

    let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(ranked)| ranked).collect();
    ranked.sort_by(|a, b| b.cmp(a));
    (
        ranked.into_iter().map(|ranked| ranked.candidate).collect(),
        seen,
    )
}

fn within(value: f64, min: f64, max: f64) -> bool {
    value >= min && value <= max
}

/// 几何判定：跨度、重叠、面积、覆盖与长宽比。不含重叠抑制。
fn evaluate(
    h1: &Segment,
    h2: &Segment,
    v1: &Segment,
    v2: &Segment,
    config: &RectangleConfig,
) -> Option<Candidate> {
    let width = (v1.start.x() - v2.start.x()).abs();
    if !within(width, config.min_span, config.max_span) {
        return None;
    }

    let min_x = v1.start.x().min(v2.start.x());
    let max_x = v1.start.x().max(v2.start.x());
    let min_y = h1.start.y().min(h2.start.y());
    let max_y = h1.start.y().max(h2.start.y());
    let height = max_y - min_y;
    let area = width * height;
    if !within(area, config.min_area, config.max_area) {
        return None;
    }

    let slack = config.vertical_cover_slack;
    let vertical_covers =
        |v: &Segment| v.min_y() <= min_y + slack && v.max_y() >= max_y - slack;
    if !vertical_covers(v1) || !vertical_covers(v2) {
        return None;
    }

    let slack = config.horizontal_cover_slack;
    let horizontal_covers =
        |h: &Segment| h.min_x() <= min_x + slack && h.max_x() >= max_x - slack;
    if !horizontal_covers(h1) || !horizontal_covers(h2) {
        return None;
    }

    let bounds = Bounds2D::from_extents(min_x, min_y, max_x, max_y);
    if bounds.aspect_ratio() >= config.max_aspect_ratio {
        return None;
    }

    Some(Candidate {
        bounds,
        area,
        entities: [h1.entity, h2.entity, v1.entity, v2.entity],
    })
}

/// 与已接受矩形的重叠面积超过自身面积的给定比例时拒绝。
fn overlaps_accepted(candidate: &Candidate, accepted: &[Room], ratio: f64) -> bool {
    accepted
        .iter()
        .any(|room| candidate.bounds.intersection_area(&room.bounds) > candidate.area * ratio)
}

fn accept(rooms: &mut Vec<Room>, candidate: Candidate) {
    debug!(
        min_x = candidate.bounds.min_x(),
        min_y = candidate.bounds.min_y(),
        max_x = candidate.bounds.max_x(),
        max_y = candidate.bounds.max_y(),
        area = candidate.area,
        "接受矩形房间"
    );
    rooms.push(Room {
        id: format!("rect_room_{}", rooms.len() + 1),
        bounds: candidate.bounds,
        area: candidate.area,
        entities: candidate.entities.to_vec(),
        is_enclosed: false,
        source: RoomSource::Rectangle,
    });
}

/// 按给定顺序遍历水平线对与竖直线对。回调返回 `false` 时提前结束。
fn for_each_candidate<F>(
    horizontal: &[Segment],
    vertical: &[Segment],
    config: &RectangleConfig,
    mut visit: F,
) where
    F: FnMut(Candidate) -> bool,
{
    for (i, h1) in horizontal.iter().enumerate() {
        for h2 in &horizontal[i + 1..] {
            let height = (h1.start.y() - h2.start.y()).abs();
            if !within(height, config.min_span, config.max_span) {
                continue;
            }
            let overlap_x = h1.max_x().min(h2.max_x()) - h1.min_x().max(h2.min_x());
            if overlap_x < config.min_span {
                continue;
            }
            for (k, v1) in vertical.iter().enumerate() {
                for v2 in &vertical[k + 1..] {
                    if let Some(candidate) = evaluate(h1, h2, v1, v2, config) {
                        if !visit(candidate) {
                            return;
                        }
                    }
                }
            }
        }
    }
}

pub(crate) fn detect(
    candidates: &[(EntityId, &Entity)],
    config: &RectangleConfig,
    stats: &mut StageStats,
) -> Vec<Room> {
    let (horizontal, vertical) = collect_segments(candidates, config, stats);
    debug!(
        horizontal = horizontal.len(),
        vertical = vertical.len(),
        "线段分类完成"
    );

    let mut rooms: Vec<Room> = Vec::new();
    if config.max_rooms == 0 {
        return rooms;
    }

    match config.order {
        RectangleOrder::Enumeration => {
            for_each_candidate(&horizontal, &vertical, config, |candidate| {
                stats.candidates += 1;
                if overlaps_accepted(&candidate, &rooms, config.max_overlap_ratio) {
                    stats.rejected += 1;
                } else {
                    stats.accepted += 1;
                    accept(&mut rooms, candidate);
                }
                rooms.len() < config.max_rooms
            });
        }
        RectangleOrder::AreaDescending => {
            let (pending, seen) =
                best_candidates(&horizontal, &vertical, config, config.max_pending_candidates);
            stats.candidates += seen;
            if seen > pending.len() {
                debug!(
                    seen,
                    kept = pending.len(),
                    "候选超过上限，仅保留面积最大者"
                );
            }
            for candidate in pending {
                if rooms.len() >= config.max_rooms {
                    break;
                }
                if overlaps_accepted(&candidate, &rooms, config.max_overlap_ratio) {
                    stats.rejected += 1;
                } else {
                    stats.accepted += 1;
                    accept(&mut rooms, candidate);
                }
            }
        }
    }

    rooms
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomscan_core::document::Drawing;

    fn run(drawing: &Drawing, config: &RectangleConfig) -> (Vec<Room>, StageStats) {
        let candidates: Vec<(EntityId, &Entity)> =
            drawing.entities().map(|(id, entity)| (*id, entity)).collect();
        let mut stats = StageStats::default();
        let rooms = detect(&candidates, config, &mut stats);
        (rooms, stats)
    }

    #[test]
    fn classify_respects_tolerance() {
        let origin = Point2::new(0.0, 0.0);
        assert_eq!(
            classify(origin, Point2::new(100.0, 10.0), 15.0),
            Some(Axis::Horizontal)
        );
        assert_eq!(
            classify(origin, Point2::new(-10.0, -100.0), 15.0),
            Some(Axis::Vertical)
        );
        assert_eq!(classify(origin, Point2::new(100.0, 100.0), 15.0), None);
        assert_eq!(classify(origin, Point2::new(100.0, 30.0), 15.0), None);
    }

    #[test]
    fn skewed_walls_still_form_room() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(800.0, 5.0), "WALLS");
        drawing.add_line(Point2::new(-20.0, 600.0), Point2::new(820.0, 600.0), "WALLS");
        drawing.add_line(Point2::new(0.0, -10.0), Point2::new(0.0, 610.0), "WALLS");
        drawing.add_line(Point2::new(800.0, 100.0), Point2::new(800.0, 550.0), "WALLS");

        let (rooms, stats) = run(&drawing, &RectangleConfig::default());
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].bounds, Bounds2D::from_extents(0.0, 0.0, 800.0, 600.0));
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn short_vertical_does_not_cover() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(800.0, 0.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 800.0), Point2::new(800.0, 800.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 800.0), "WALLS");
        drawing.add_line(Point2::new(800.0, 0.0), Point2::new(800.0, 300.0), "WALLS");

        let (rooms, _) = run(&drawing, &RectangleConfig::default());
        assert!(rooms.is_empty());
    }

    #[test]
    fn short_and_diagonal_lines_are_discarded() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(15.0, 0.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(300.0, 300.0), "WALLS");
        let candidates: Vec<(EntityId, &Entity)> =
            drawing.entities().map(|(id, entity)| (*id, entity)).collect();
        let mut stats = StageStats::default();
        let (horizontal, vertical) =
            collect_segments(&candidates, &RectangleConfig::default(), &mut stats);
        assert!(horizontal.is_empty());
        assert!(vertical.is_empty());
    }

    #[test]
    fn separate_rooms_are_capped_by_max_rooms() {
        let mut drawing = Drawing::new();
        for index in 0..12 {
            let x = index as f64 * 2_000.0;
            drawing.add_line(Point2::new(x, 0.0), Point2::new(x + 500.0, 0.0), "WALLS");
            drawing.add_line(Point2::new(x, 500.0), Point2::new(x + 500.0, 500.0), "WALLS");
            drawing.add_line(Point2::new(x, 0.0), Point2::new(x, 500.0), "WALLS");
            drawing.add_line(Point2::new(x + 500.0, 0.0), Point2::new(x + 500.0, 500.0), "WALLS");
        }

        let (rooms, stats) = run(&drawing, &RectangleConfig::default());
        assert_eq!(rooms.len(), 10);
        assert_eq!(stats.accepted, 10);
        assert_eq!(rooms[9].id, "rect_room_10");
        assert_eq!(
            rooms[9].bounds,
            Bounds2D::from_extents(18_000.0, 0.0, 18_500.0, 500.0)
        );

        let config = RectangleConfig {
            max_rooms: 20,
            ..RectangleConfig::default()
        };
        let (rooms, _) = run(&drawing, &config);
        assert_eq!(rooms.len(), 12);

        let config = RectangleConfig {
            max_rooms: 2,
            ..RectangleConfig::default()
        };
        let (rooms, _) = run(&drawing, &config);
        assert_eq!(rooms.len(), 2);
    }

    #[test]
    fn area_descending_keeps_only_largest_pending() {
        let mut drawing = Drawing::new();
        for (index, size) in [300.0, 700.0, 500.0].into_iter().enumerate() {
            let x = index as f64 * 2_000.0;
            drawing.add_line(Point2::new(x, 0.0), Point2::new(x + size, 0.0), "WALLS");
            drawing.add_line(Point2::new(x, size), Point2::new(x + size, size), "WALLS");
            drawing.add_line(Point2::new(x, 0.0), Point2::new(x, size), "WALLS");
            drawing.add_line(Point2::new(x + size, 0.0), Point2::new(x + size, size), "WALLS");
        }

        let config = RectangleConfig {
            order: RectangleOrder::AreaDescending,
            ..RectangleConfig::default()
        };
        let (rooms, stats) = run(&drawing, &config);
        let widths: Vec<f64> = rooms.iter().map(|room| room.bounds.width()).collect();
        assert_eq!(widths, vec![700.0, 500.0, 300.0]);
        assert_eq!(stats.candidates, 3);

        let config = RectangleConfig {
            order: RectangleOrder::AreaDescending,
            max_pending_candidates: 2,
            ..RectangleConfig::default()
        };
        let (rooms, stats) = run(&drawing, &config);
        let widths: Vec<f64> = rooms.iter().map(|room| room.bounds.width()).collect();
        assert_eq!(widths, vec![700.0, 500.0]);
        assert_eq!(rooms[0].id, "rect_room_1");
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.accepted, 2);
    }

    #[test]
    fn dense_grid_stays_bounded_in_area_order() {
        let mut drawing = Drawing::new();
        for step in 0..30 {
            let offset = step as f64 * 100.0;
            drawing.add_line(Point2::new(0.0, offset), Point2::new(2_900.0, offset), "GRID");
            drawing.add_line(Point2::new(offset, 0.0), Point2::new(offset, 2_900.0), "GRID");
        }

        let config = RectangleConfig {
            order: RectangleOrder::AreaDescending,
            max_pending_candidates: 64,
            ..RectangleConfig::default()
        };
        let (rooms, stats) = run(&drawing, &config);
        assert_eq!(stats.candidates, 435 * 435);
        assert_eq!(rooms.len(), 1);
        assert_eq!(
            rooms[0].bounds,
            Bounds2D::from_extents(0.0, 0.0, 2_900.0, 2_900.0)
        );
    }

    #[test]
    fn max_lines_limits_input() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(500.0, 0.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 500.0), Point2::new(500.0, 500.0), "WALLS");
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 500.0), "WALLS");
        drawing.add_line(Point2::new(500.0, 0.0), Point2::new(500.0, 500.0), "WALLS");

        let config = RectangleConfig {
            max_lines: 3,
            ..RectangleConfig::default()
        };
        let (rooms, _) = run(&drawing, &config);
        assert!(rooms.is_empty());
    }
}
