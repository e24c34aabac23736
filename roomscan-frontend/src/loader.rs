use std::env;
use std::path::{Path, PathBuf};

use roomscan_config::DetectionConfig;
use roomscan_engine::session::{DemoEntities, DetectionSession};
use roomscan_io::{DrawingLoader, JsonDrawingLoader};
use tracing::{info, warn};

use crate::errors::FrontendError;

/// 未指定输入文件时读取的环境变量。
pub const SAMPLE_DRAWING_ENV_VAR: &str = "ROOMSCAN_SAMPLE_DRAWING";

/// 图纸来源，便于前端呈现加载信息。
#[derive(Debug, Clone)]
pub enum DrawingSource {
    File(PathBuf),
    Demo,
}

impl DrawingSource {
    pub fn describe(&self) -> String {
        match self {
            DrawingSource::File(path) => path.display().to_string(),
            DrawingSource::Demo => "demo".to_string(),
        }
    }
}

/// 统一封装加载后的会话与元信息。
#[derive(Debug)]
pub struct LoadedSession {
    pub session: DetectionSession,
    pub source: DrawingSource,
    pub demo_entities: Option<DemoEntities>,
    /// 被跳过的非对象实体记录数。
    pub skipped_records: usize,
}

/// 加载图纸并建立检测会话。
///
/// 显式给出的路径加载失败时直接返回错误；来自环境变量 `ROOMSCAN_SAMPLE_DRAWING`
/// 的路径加载失败时回退到内置示例。
pub fn load_session(
    input: Option<&Path>,
    config: &DetectionConfig,
) -> Result<LoadedSession, FrontendError> {
    let loader = JsonDrawingLoader::new();

    if let Some(path) = input {
        return load_file(&loader, path, config);
    }

    if let Some(path) = env::var_os(SAMPLE_DRAWING_ENV_VAR) {
        let path = PathBuf::from(path);
        match load_file(&loader, &path, config) {
            Ok(loaded) => return Ok(loaded),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载图纸失败，回退到内置示例");
            }
        }
    }

    let mut session = DetectionSession::with_config(config.clone());
    let demo_entities = session.populate_demo();
    Ok(LoadedSession {
        session,
        source: DrawingSource::Demo,
        demo_entities: Some(demo_entities),
        skipped_records: 0,
    })
}

fn load_file(
    loader: &impl DrawingLoader,
    path: &Path,
    config: &DetectionConfig,
) -> Result<LoadedSession, FrontendError> {
    let loaded = loader.load(path)?;
    info!(
        path = %path.display(),
        entities = loaded.drawing.len(),
        skipped = loaded.skipped,
        "从 JSON 加载图纸成功"
    );
    Ok(LoadedSession {
        session: DetectionSession::with_drawing(loaded.drawing, config.clone()),
        source: DrawingSource::File(path.to_path_buf()),
        demo_entities: None,
        skipped_records: loaded.skipped,
    })
}
