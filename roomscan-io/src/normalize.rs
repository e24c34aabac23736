//! 将上游解码器输出的松散实体记录归一化为 [`Entity`]。
//!
//! 每个语义字段对应一张别名表，按顺序尝试，首个命中者生效。

use roomscan_core::{
    document::{
        Arc, BlockReference, Circle, Ellipse, Entity, EntityKind, Line, PointMarker, Polyline,
        Spline, Text, UnknownEntity,
    },
    geometry::{Point2, Vector2},
};
use serde_json::{Map, Value};

pub const TYPE_FIELDS: &[&str] = &["type", "objectType"];
pub const LAYER_FIELDS: &[&str] = &["layer", "layerName"];
pub const HANDLE_FIELDS: &[&str] = &["handle", "objectHandle"];
pub const DEFAULT_LAYER: &str = "0";

const LINE_START_FIELDS: &[&str] = &["start", "startPoint"];
const LINE_END_FIELDS: &[&str] = &["end", "endPoint"];
const CENTER_FIELDS: &[&str] = &["center", "centerPoint"];
const RADIUS_FIELDS: &[&str] = &["radius", "r"];
const POLYLINE_VERTEX_FIELDS: &[&str] = &["vertices", "points"];
const POINT_FIELDS: &[&str] = &["position", "point", "location"];
const TEXT_ANCHOR_FIELDS: &[&str] = &["startPoint", "position", "insertionPoint"];
const INSERT_FIELDS: &[&str] = &["position", "insertionPoint", "basePoint"];
const BLOCK_NAME_FIELDS: &[&str] = &["name", "blockName"];
const MAJOR_AXIS_FIELDS: &[&str] = &["majorAxisEndpoint", "majorAxisEndPoint"];
const SPLINE_FIELDS: &[&str] = &["controlPoints", "fitPoints", "vertices"];
const FALLBACK_FIELDS: &[&str] = &["start", "end", "center", "position", "point", "vertices"];

/// 通用点解析：长度不小于 2 且前两项为数字的数组，或带数值 `x`/`y` 的对象。
pub fn extract_point(value: &Value) -> Option<Point2> {
    match value {
        Value::Array(items) if items.len() >= 2 => {
            let x = items[0].as_f64()?;
            let y = items[1].as_f64()?;
            Some(Point2::new(x, y))
        }
        Value::Object(map) => {
            let x = map.get("x")?.as_f64()?;
            let y = map.get("y")?.as_f64()?;
            Some(Point2::new(x, y))
        }
        _ => None,
    }
}

/// 将单条记录归一化。记录必须为 JSON 对象，否则返回 `None`。
pub fn normalize_entity(record: &Value) -> Option<Entity> {
    let map = record.as_object()?;
    let type_name = first_string(map, TYPE_FIELDS)
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| EntityKind::Unknown.as_str().to_string());
    let layer = layer_of(map);

    let entity = match EntityKind::from_tag(&type_name) {
        EntityKind::Line => normalize_line(map, layer),
        EntityKind::Circle => Entity::Circle(Circle {
            center: first_point(map, CENTER_FIELDS),
            radius: first_number(map, RADIUS_FIELDS),
            layer,
        }),
        EntityKind::Arc => Entity::Arc(Arc {
            center: first_point(map, CENTER_FIELDS),
            radius: first_number(map, RADIUS_FIELDS),
            start_angle: first_number(map, &["startAngle"]),
            end_angle: first_number(map, &["endAngle"]),
            layer,
        }),
        kind @ (EntityKind::Polyline | EntityKind::LwPolyline) => Entity::Polyline(Polyline {
            vertices: first_point_list(map, POLYLINE_VERTEX_FIELDS),
            is_closed: map.get("closed").and_then(Value::as_bool).unwrap_or(false),
            is_lightweight: kind == EntityKind::LwPolyline,
            layer,
        }),
        EntityKind::Point => Entity::Point(PointMarker {
            position: first_point(map, POINT_FIELDS),
            layer,
        }),
        kind @ (EntityKind::Text | EntityKind::MText) => {
            let text = Text {
                anchor: first_point(map, TEXT_ANCHOR_FIELDS),
                content: first_string(map, &["text"]).map(str::to_string),
                layer,
            };
            if kind == EntityKind::MText {
                Entity::MText(text)
            } else {
                Entity::Text(text)
            }
        }
        EntityKind::Insert => Entity::BlockReference(BlockReference {
            insert: first_point(map, INSERT_FIELDS),
            name: first_string(map, BLOCK_NAME_FIELDS).map(str::to_string),
            layer,
        }),
        EntityKind::Ellipse => normalize_ellipse(map, layer),
        EntityKind::Spline => Entity::Spline(Spline {
            points: first_point_list(map, SPLINE_FIELDS),
            layer,
        }),
        EntityKind::Unknown => Entity::Unknown(UnknownEntity {
            points: collect_fallback_points(map),
            type_name,
            layer,
        }),
    };
    Some(entity)
}

/// 记录上的句柄（`handle` 或 `objectHandle`），数字句柄转为字符串。
pub fn handle_of(record: &Value) -> Option<String> {
    let map = record.as_object()?;
    HANDLE_FIELDS.iter().find_map(|field| match map.get(*field)? {
        Value::String(handle) => Some(handle.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn layer_of(map: &Map<String, Value>) -> String {
    first_string(map, LAYER_FIELDS)
        .unwrap_or(DEFAULT_LAYER)
        .to_string()
}

fn normalize_line(map: &Map<String, Value>, layer: String) -> Entity {
    let (start, end) = match first_point(map, LINE_START_FIELDS) {
        Some(start) => (Some(start), first_point(map, LINE_END_FIELDS)),
        None => match map.get("vertices").and_then(Value::as_array) {
            Some(vertices) if vertices.len() >= 2 => {
                (extract_point(&vertices[0]), extract_point(&vertices[1]))
            }
            _ => (None, None),
        },
    };
    Entity::Line(Line { start, end, layer })
}

fn normalize_ellipse(map: &Map<String, Value>, layer: String) -> Entity {
    let major_axis = MAJOR_AXIS_FIELDS.iter().find_map(|field| {
        let axis = map.get(*field)?.as_object()?;
        let x = axis.get("x")?.as_f64()?;
        let y = axis.get("y")?.as_f64()?;
        Some(Vector2::new(x, y))
    });
    let ratio = match map.get("axisRatio").and_then(Value::as_f64) {
        Some(ratio) if ratio != 0.0 && !ratio.is_nan() => ratio,
        _ => 1.0,
    };
    Entity::Ellipse(Ellipse {
        center: map.get("center").and_then(extract_point),
        major_axis,
        ratio,
        layer,
    })
}

fn collect_fallback_points(map: &Map<String, Value>) -> Vec<Point2> {
    let mut points = Vec::new();
    for field in FALLBACK_FIELDS {
        match map.get(*field) {
            Some(Value::Array(items)) => points.extend(items.iter().filter_map(extract_point)),
            Some(value) => points.extend(extract_point(value)),
            None => {}
        }
    }
    points
}

fn first_point(map: &Map<String, Value>, fields: &[&str]) -> Option<Point2> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(extract_point))
}

fn first_point_list(map: &Map<String, Value>, fields: &[&str]) -> Vec<Point2> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_array))
        .map(|items| items.iter().filter_map(extract_point).collect())
        .unwrap_or_default()
}

fn first_number(map: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_f64))
}

fn first_string<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|field| map.get(*field).and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn points_of(record: Value) -> Vec<Point2> {
        normalize_entity(&record).expect("记录应为对象").points()
    }

    #[test]
    fn extract_point_accepts_pairs_and_objects() {
        assert_eq!(extract_point(&json!([1.5, -2])), Some(Point2::new(1.5, -2.0)));
        assert_eq!(extract_point(&json!([1, 2, 3])), Some(Point2::new(1.0, 2.0)));
        assert_eq!(
            extract_point(&json!({"x": 3, "y": 4, "z": 5})),
            Some(Point2::new(3.0, 4.0))
        );
        assert_eq!(extract_point(&json!([1])), None);
        assert_eq!(extract_point(&json!(["a", "b"])), None);
        assert_eq!(extract_point(&json!({"x": "1", "y": 2})), None);
        assert_eq!(extract_point(&json!(null)), None);
    }

    #[test]
    fn line_aliases_produce_same_points() {
        let expected = vec![Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)];
        assert_eq!(
            points_of(json!({"type": "LINE", "start": {"x": 0, "y": 0}, "end": {"x": 10, "y": 0}})),
            expected
        );
        assert_eq!(
            points_of(json!({
                "type": "line",
                "startPoint": {"x": 0, "y": 0},
                "endPoint": {"x": 10, "y": 0}
            })),
            expected
        );
        assert_eq!(
            points_of(json!({"type": "LINE", "vertices": [[0, 0], [10, 0], [20, 0]]})),
            expected
        );
    }

    #[test]
    fn line_start_alias_wins_over_vertices() {
        let record = json!({
            "type": "LINE",
            "start": {"x": 0, "y": 0},
            "vertices": [[5, 5], [6, 6]]
        });
        assert!(points_of(record).is_empty());
    }

    #[test]
    fn circle_uses_first_numeric_radius() {
        let record = json!({"type": "CIRCLE", "centerPoint": [0, 0], "radius": "big", "r": 5});
        assert_eq!(
            points_of(record),
            vec![Point2::new(-5.0, -5.0), Point2::new(5.0, 5.0)]
        );
    }

    #[test]
    fn polyline_first_array_wins_even_if_empty() {
        let record = json!({
            "type": "LWPOLYLINE",
            "vertices": [],
            "points": [[0, 0], [1, 0], [1, 1]]
        });
        assert!(points_of(record).is_empty());

        let entity = normalize_entity(&json!({
            "type": "POLYLINE",
            "closed": true,
            "points": [{"x": 0, "y": 0}, "bad", [4, 0], [4, 4]]
        }))
        .expect("记录应为对象");
        match entity {
            Entity::Polyline(polyline) => {
                assert!(polyline.is_closed);
                assert!(!polyline.is_lightweight);
                assert_eq!(polyline.vertices.len(), 3);
            }
            other => panic!("期望多段线，得到 {:?}", other.kind()),
        }
    }

    #[test]
    fn text_insert_and_point_anchors() {
        assert_eq!(
            points_of(json!({"type": "MTEXT", "position": [1, 2], "insertionPoint": [9, 9]})),
            vec![Point2::new(1.0, 2.0)]
        );
        assert_eq!(
            points_of(json!({"type": "INSERT", "position": "bad", "basePoint": [3, 4]})),
            vec![Point2::new(3.0, 4.0)]
        );
        assert_eq!(
            points_of(json!({"type": "POINT", "location": {"x": 7, "y": 8}})),
            vec![Point2::new(7.0, 8.0)]
        );
    }

    #[test]
    fn ellipse_ratio_defaults_to_one() {
        let points = points_of(json!({
            "type": "ELLIPSE",
            "center": [0, 0],
            "majorAxisEndPoint": {"x": 0, "y": 10},
            "axisRatio": 0
        }));
        assert_eq!(
            points,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(-10.0, -10.0),
                Point2::new(10.0, 10.0)
            ]
        );
    }

    #[test]
    fn ellipse_prefers_major_axis_endpoint() {
        let points = points_of(json!({
            "type": "ELLIPSE",
            "center": [0, 0],
            "majorAxisEndpoint": {"x": 10, "y": 0},
            "majorAxisEndPoint": {"x": 40, "y": 0},
            "axisRatio": 0.5
        }));
        assert_eq!(
            points,
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(-10.0, -5.0),
                Point2::new(10.0, 5.0)
            ]
        );

        // 主别名无法解析时回退到次别名
        let points = points_of(json!({
            "type": "ELLIPSE",
            "center": [0, 0],
            "majorAxisEndpoint": [10, 0],
            "majorAxisEndPoint": {"x": 0, "y": 20}
        }));
        assert_eq!(points[2], Point2::new(20.0, 20.0));
    }

    #[test]
    fn spline_and_unknown_collect_points() {
        assert_eq!(
            points_of(json!({"type": "SPLINE", "fitPoints": [[0, 0], [1, 1]]})).len(),
            2
        );

        let entity = normalize_entity(&json!({
            "objectType": "HATCH",
            "layerName": "FILL",
            "center": [5, 5],
            "vertices": [[0, 0], [1, 1]]
        }))
        .expect("记录应为对象");
        assert_eq!(entity.kind(), EntityKind::Unknown);
        assert_eq!(entity.layer_name(), "FILL");
        assert_eq!(
            entity.points(),
            vec![Point2::new(5.0, 5.0), Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)]
        );
    }

    #[test]
    fn missing_type_and_layer_use_defaults() {
        let entity = normalize_entity(&json!({"start": [1, 1]})).expect("记录应为对象");
        assert_eq!(entity.layer_name(), DEFAULT_LAYER);
        match entity {
            Entity::Unknown(unknown) => assert_eq!(unknown.type_name, "UNKNOWN"),
            other => panic!("期望未知实体，得到 {:?}", other.kind()),
        }
        assert!(normalize_entity(&json!(42)).is_none());
    }

    #[test]
    fn handle_accepts_strings_and_numbers() {
        assert_eq!(handle_of(&json!({"handle": "1A"})), Some("1A".to_string()));
        assert_eq!(handle_of(&json!({"objectHandle": 61})), Some("61".to_string()));
        assert_eq!(handle_of(&json!({"layer": "0"})), None);
    }
}
