pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 图纸为空时使用的兜底范围半边长。
    pub const FALLBACK_HALF_EXTENT: f64 = 100.0;

    /// 二维点，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        /// 坐标是否均为有限值（排除 NaN 与无穷大）。
        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，用于线段方向与椭圆主轴。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算图纸范围以及房间外框。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn from_extents(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
            Self::new(Point2::new(min_x, min_y), Point2::new(max_x, max_y))
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 没有任何可绘制点时的兜底范围 `{-100,-100,100,100}`，调用方应理解为“无内容”。
        #[inline]
        pub fn fallback() -> Self {
            Self::from_extents(
                -FALLBACK_HALF_EXTENT,
                -FALLBACK_HALF_EXTENT,
                FALLBACK_HALF_EXTENT,
                FALLBACK_HALF_EXTENT,
            )
        }

        /// 折叠点集得到范围；点集为空时返回 `None`。
        pub fn from_points<I>(points: I) -> Option<Self>
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn min_x(&self) -> f64 {
            self.min.x()
        }

        #[inline]
        pub fn min_y(&self) -> f64 {
            self.min.y()
        }

        #[inline]
        pub fn max_x(&self) -> f64 {
            self.max.x()
        }

        #[inline]
        pub fn max_y(&self) -> f64 {
            self.max.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        #[inline]
        pub fn area(&self) -> f64 {
            self.width() * self.height()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }

        /// 长边与短边之比。任一边长为 0 时视为无穷大。
        pub fn aspect_ratio(&self) -> f64 {
            let width = self.width();
            let height = self.height();
            let shorter = width.min(height);
            if shorter <= 0.0 {
                f64::INFINITY
            } else {
                width.max(height) / shorter
            }
        }

        /// 四周各外扩 `margin`。
        pub fn expanded(&self, margin: f64) -> Self {
            let offset = DVec2::splat(margin);
            Self {
                min: Point2::from_vec(self.min.as_vec2() - offset),
                max: Point2::from_vec(self.max.as_vec2() + offset),
            }
        }

        /// 两个范围相交部分的面积，不相交为 0。
        pub fn intersection_area(&self, other: &Bounds2D) -> f64 {
            let overlap_x = (self.max_x().min(other.max_x()) - self.min_x().max(other.min_x())).max(0.0);
            let overlap_y = (self.max_y().min(other.max_y()) - self.min_y().max(other.min_y())).max(0.0);
            overlap_x * overlap_y
        }
    }

    /// 计算点集范围（不加边距）。空点集返回 [`Bounds2D::fallback`]，不会报错。
    pub fn compute_bounds(points: &[Point2]) -> Bounds2D {
        Bounds2D::from_points(points.iter().copied()).unwrap_or_else(Bounds2D::fallback)
    }

    /// Shoelace 公式求多边形面积；少于 3 个点时为 0。自相交多边形的结果没有几何意义。
    pub fn polygon_area(points: &[Point2]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for (index, current) in points.iter().enumerate() {
            let next = points[(index + 1) % points.len()];
            sum += current.x() * next.y();
            sum -= next.x() * current.y();
        }
        sum.abs() / 2.0
    }

}

pub mod layer {
    use std::borrow::Cow;
    use std::collections::BTreeSet;

    use once_cell::sync::Lazy;
    use regex::Regex;
    use serde::{Deserialize, Serialize};

    static GARBLED_NAME: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[\x{FFFD}_\-\s0-9A-Za-z]+$").expect("图层名匹配表达式无效")
    });
    static REPLACEMENT_RUN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\x{FFFD}+").expect("替换字符表达式无效"));
    static UNDERSCORE_RUN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"_{2,}").expect("下划线表达式无效"));

    /// 将编码损坏的图层名整理为可显示形式。
    ///
    /// 仅当名称只包含替换字符（U+FFFD）、ASCII 单词字符、`-` 与空白时才处理：
    /// 连续替换字符改为 `Layer`，连续下划线合并，首尾空白去除。其余名称原样返回。
    pub fn display_layer_name(raw: &str) -> Cow<'_, str> {
        if !GARBLED_NAME.is_match(raw) {
            return Cow::Borrowed(raw);
        }
        let replaced = REPLACEMENT_RUN.replace_all(raw, "Layer");
        let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
        let trimmed = collapsed.trim();
        if trimmed == raw {
            Cow::Borrowed(raw)
        } else {
            Cow::Owned(trimmed.to_string())
        }
    }

    /// 可见图层集合，元素为整理后的显示名称。
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LayerSet {
        names: BTreeSet<String>,
    }

    impl LayerSet {
        pub fn new() -> Self {
            Self::default()
        }

        /// 判断原始图层名（整理后）是否可见。
        #[inline]
        pub fn is_visible(&self, raw_layer: &str) -> bool {
            self.names.contains(&*display_layer_name(raw_layer))
        }

        #[inline]
        pub fn contains(&self, display_name: &str) -> bool {
            self.names.contains(display_name)
        }

        pub fn show(&mut self, display_name: impl Into<String>) -> bool {
            self.names.insert(display_name.into())
        }

        pub fn hide(&mut self, display_name: &str) -> bool {
            self.names.remove(display_name)
        }

        /// 切换可见状态，返回切换后是否可见。
        pub fn toggle(&mut self, display_name: &str) -> bool {
            if self.names.remove(display_name) {
                false
            } else {
                self.names.insert(display_name.to_string());
                true
            }
        }

        #[inline]
        pub fn clear(&mut self) {
            self.names.clear();
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.names.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.names.is_empty()
        }

        pub fn iter(&self) -> impl Iterator<Item = &str> {
            self.names.iter().map(String::as_str)
        }
    }

    impl<S: Into<String>> FromIterator<S> for LayerSet {
        fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
            Self {
                names: iter.into_iter().map(Into::into).collect(),
            }
        }
    }

}

pub mod document {
    use std::collections::{BTreeSet, HashMap};
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Vector2};
    use crate::layer::{LayerSet, display_layer_name};

    /// 图纸范围外扩比例（相对长边）。
    pub const EXTENT_MARGIN_RATIO: f64 = 0.1;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    impl fmt::Display for EntityId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "#{}", self.0)
        }
    }

    /// 实体类型标签，对应 DXF 的 `type` 字段。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum EntityKind {
        Line,
        Circle,
        Arc,
        Polyline,
        LwPolyline,
        Point,
        Text,
        MText,
        Insert,
        Ellipse,
        Spline,
        Unknown,
    }

    impl EntityKind {
        /// 按 DXF 类型名解析（调用方负责转大写）。
        pub fn from_tag(tag: &str) -> Self {
            match tag {
                "LINE" => EntityKind::Line,
                "CIRCLE" => EntityKind::Circle,
                "ARC" => EntityKind::Arc,
                "POLYLINE" => EntityKind::Polyline,
                "LWPOLYLINE" => EntityKind::LwPolyline,
                "POINT" => EntityKind::Point,
                "TEXT" => EntityKind::Text,
                "MTEXT" => EntityKind::MText,
                "INSERT" => EntityKind::Insert,
                "ELLIPSE" => EntityKind::Ellipse,
                "SPLINE" => EntityKind::Spline,
                _ => EntityKind::Unknown,
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                EntityKind::Line => "LINE",
                EntityKind::Circle => "CIRCLE",
                EntityKind::Arc => "ARC",
                EntityKind::Polyline => "POLYLINE",
                EntityKind::LwPolyline => "LWPOLYLINE",
                EntityKind::Point => "POINT",
                EntityKind::Text => "TEXT",
                EntityKind::MText => "MTEXT",
                EntityKind::Insert => "INSERT",
                EntityKind::Ellipse => "ELLIPSE",
                EntityKind::Spline => "SPLINE",
                EntityKind::Unknown => "UNKNOWN",
            }
        }
    }

    /// 归一化后的图元。几何字段按来源可能缺失，缺失时对应实体不贡献点。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Polyline(Polyline),
        Point(PointMarker),
        Text(Text),
        MText(Text),
        BlockReference(BlockReference),
        Ellipse(Ellipse),
        Spline(Spline),
        Unknown(UnknownEntity),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Point(marker) => &marker.layer,
                Entity::Text(text) | Entity::MText(text) => &text.layer,
                Entity::BlockReference(reference) => &reference.layer,
                Entity::Ellipse(ellipse) => &ellipse.layer,
                Entity::Spline(spline) => &spline.layer,
                Entity::Unknown(unknown) => &unknown.layer,
            }
        }

        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::Line(_) => EntityKind::Line,
                Entity::Circle(_) => EntityKind::Circle,
                Entity::Arc(_) => EntityKind::Arc,
                Entity::Polyline(polyline) if polyline.is_lightweight => EntityKind::LwPolyline,
                Entity::Polyline(_) => EntityKind::Polyline,
                Entity::Point(_) => EntityKind::Point,
                Entity::Text(_) => EntityKind::Text,
                Entity::MText(_) => EntityKind::MText,
                Entity::BlockReference(_) => EntityKind::Insert,
                Entity::Ellipse(_) => EntityKind::Ellipse,
                Entity::Spline(_) => EntityKind::Spline,
                Entity::Unknown(_) => EntityKind::Unknown,
            }
        }

        /// 按实体类型给出有序点列。圆与圆弧返回外接正方形的两个角点，而非多边形近似。
        pub fn points(&self) -> Vec<Point2> {
            match self {
                Entity::Line(line) => match (line.start, line.end) {
                    (Some(start), Some(end)) => vec![start, end],
                    _ => Vec::new(),
                },
                Entity::Circle(circle) => round_corners(circle.center, circle.radius),
                Entity::Arc(arc) => round_corners(arc.center, arc.radius),
                Entity::Polyline(polyline) => polyline.vertices.clone(),
                Entity::Point(marker) => marker.position.into_iter().collect(),
                Entity::Text(text) | Entity::MText(text) => text.anchor.into_iter().collect(),
                Entity::BlockReference(reference) => reference.insert.into_iter().collect(),
                Entity::Ellipse(ellipse) => ellipse_points(ellipse),
                Entity::Spline(spline) => spline.points.clone(),
                Entity::Unknown(unknown) => unknown.points.clone(),
            }
        }

        /// 实体点列的范围；无点时为 `None`。
        pub fn bounds(&self) -> Option<Bounds2D> {
            Bounds2D::from_points(self.points())
        }
    }

    fn round_corners(center: Option<Point2>, radius: Option<f64>) -> Vec<Point2> {
        match (center, radius) {
            (Some(center), Some(radius)) if radius != 0.0 && !radius.is_nan() => {
                let r = radius.abs();
                vec![
                    Point2::new(center.x() - r, center.y() - r),
                    Point2::new(center.x() + r, center.y() + r),
                ]
            }
            _ => Vec::new(),
        }
    }

    fn ellipse_points(ellipse: &Ellipse) -> Vec<Point2> {
        let Some(center) = ellipse.center else {
            return Vec::new();
        };
        let mut points = vec![center];
        if let Some(axis) = ellipse.major_axis {
            let major = axis.length();
            let minor = major * ellipse.ratio;
            points.push(Point2::new(center.x() - major, center.y() - minor));
            points.push(Point2::new(center.x() + major, center.y() + minor));
        }
        points
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Option<Point2>,
        pub end: Option<Point2>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Option<Point2>,
        pub radius: Option<f64>,
        pub layer: String,
    }

    /// 圆弧实体；角度仅作记录，取点规则与圆一致。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Option<Point2>,
        pub radius: Option<f64>,
        pub start_angle: Option<f64>,
        pub end_angle: Option<f64>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        /// 来源为 LWPOLYLINE。
        pub is_lightweight: bool,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PointMarker {
        pub position: Option<Point2>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub anchor: Option<Point2>,
        pub content: Option<String>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub insert: Option<Point2>,
        pub name: Option<String>,
        pub layer: String,
    }

    /// 椭圆实体，`major_axis` 为相对圆心的主轴端点向量，`ratio` 为短轴与主轴之比。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Ellipse {
        pub center: Option<Point2>,
        pub major_axis: Option<Vector2>,
        pub ratio: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub points: Vec<Point2>,
        pub layer: String,
    }

    /// 未识别类型：保留原始类型名，以及从通用字段收集到的点。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UnknownEntity {
        pub type_name: String,
        pub points: Vec<Point2>,
        pub layer: String,
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Drawing {
        entities: Vec<(EntityId, Entity)>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        handles: HashMap<EntityId, String>,
        next_entity_id: u64,
    }

    impl Drawing {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        /// 记录实体在源文件中的句柄，便于追溯。
        pub fn set_handle(&mut self, id: EntityId, handle: impl Into<String>) {
            self.handles.insert(id, handle.into());
        }

        pub fn handle(&self, id: EntityId) -> Option<&str> {
            self.handles.get(&id).map(String::as_str)
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) -> EntityId {
            self.add_entity(Entity::Line(Line {
                start: Some(start),
                end: Some(end),
                layer: layer.into(),
            }))
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Circle(Circle {
                center: Some(center),
                radius: Some(radius),
                layer: layer.into(),
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            self.add_entity(Entity::Polyline(Polyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                is_lightweight: true,
                layer: layer.into(),
            }))
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.entities.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.entities.is_empty()
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find(|(entity_id, _)| *entity_id == id)
                .map(|(_, entity)| entity)
        }

        /// 可见图层上的实体，保持原始顺序。
        pub fn visible_entities<'a>(
            &'a self,
            visible: &'a LayerSet,
        ) -> impl Iterator<Item = &'a (EntityId, Entity)> + 'a {
            self.entities
                .iter()
                .filter(move |(_, entity)| visible.is_visible(entity.layer_name()))
        }

        /// 所有实体图层的显示名称，去重并排序。
        pub fn layers(&self) -> Vec<String> {
            let names: BTreeSet<String> = self
                .entities
                .iter()
                .map(|(_, entity)| display_layer_name(entity.layer_name()).into_owned())
                .collect();
            names.into_iter().collect()
        }

        /// 全部图层均可见的集合。
        pub fn all_layers(&self) -> LayerSet {
            self.layers().into_iter().collect()
        }

        pub fn layer_entity_count(&self, display_name: &str) -> usize {
            self.entities
                .iter()
                .filter(|(_, entity)| display_layer_name(entity.layer_name()) == display_name)
                .count()
        }

        /// 图纸绘制范围：汇总（可见）实体的全部点，并按长边 10% 外扩。
        /// 无任何可提取点时返回 [`Bounds2D::fallback`]。
        pub fn extent(&self, visible: Option<&LayerSet>) -> Bounds2D {
            let points = self
                .entities
                .iter()
                .filter(|(_, entity)| visible.is_none_or(|set| set.is_visible(entity.layer_name())))
                .flat_map(|(_, entity)| entity.points());
            match Bounds2D::from_points(points) {
                Some(bounds) => {
                    let margin = bounds.width().max(bounds.height()) * EXTENT_MARGIN_RATIO;
                    bounds.expanded(margin)
                }
                None => Bounds2D::fallback(),
            }
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}
