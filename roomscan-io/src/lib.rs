use std::fs;
use std::path::{Path, PathBuf};

use roomscan_core::document::Drawing;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub mod normalize;

pub use normalize::extract_point;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

/// 已解码图纸：归一化实体加上原样保留的 `header`/`blocks`/`tables`。
#[derive(Debug, Default, Clone)]
pub struct LoadedDrawing {
    pub drawing: Drawing,
    pub header: Map<String, Value>,
    pub blocks: Map<String, Value>,
    pub tables: Map<String, Value>,
    /// 被跳过的非对象实体记录数。
    pub skipped: usize,
}

pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<LoadedDrawing, IoError>;
}

/// 读取上游解码器输出的 `DXFData` 形式 JSON 文件。
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDrawingLoader;

impl JsonDrawingLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DrawingLoader for JsonDrawingLoader {
    fn load(&self, path: &Path) -> Result<LoadedDrawing, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        parse_drawing_str(&data)
    }
}

pub fn parse_drawing_str(source: &str) -> Result<LoadedDrawing, IoError> {
    let value: Value = serde_json::from_str(source)
        .map_err(|err| IoError::InvalidDocument(format!("JSON 解析失败: {err}")))?;
    from_value(&value)
}

/// 从 JSON 值构建图纸。所有成员均可缺省；实体字段不做校验。
pub fn from_value(value: &Value) -> Result<LoadedDrawing, IoError> {
    let root = value
        .as_object()
        .ok_or_else(|| IoError::InvalidDocument("顶层必须是对象".to_string()))?;

    let mut loaded = LoadedDrawing {
        header: object_member(root, "header")?,
        blocks: object_member(root, "blocks")?,
        tables: object_member(root, "tables")?,
        ..LoadedDrawing::default()
    };

    let records = match root.get("entities") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(records)) => records.as_slice(),
        Some(_) => {
            return Err(IoError::InvalidDocument(
                "entities 必须是数组".to_string(),
            ));
        }
    };

    for (index, record) in records.iter().enumerate() {
        let Some(entity) = normalize::normalize_entity(record) else {
            warn!(index, "跳过非对象实体记录");
            loaded.skipped += 1;
            continue;
        };
        let id = loaded.drawing.add_entity(entity);
        if let Some(handle) = normalize::handle_of(record) {
            loaded.drawing.set_handle(id, handle);
        }
    }

    debug!(
        entities = loaded.drawing.len(),
        skipped = loaded.skipped,
        layers = loaded.drawing.layers().len(),
        "图纸解析完成"
    );
    Ok(loaded)
}

fn object_member(root: &Map<String, Value>, key: &str) -> Result<Map<String, Value>, IoError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(IoError::InvalidDocument(format!("{key} 必须是对象"))),
    }
}
