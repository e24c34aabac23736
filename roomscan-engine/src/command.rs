use std::collections::HashMap;

use crate::session::DetectionSession;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut DetectionSession,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(DetectRoomsCommand);
        bus.register(ClearRoomsCommand);
        bus.register(FocusRoomCommand);
        bus.register(ShowLayerCommand);
        bus.register(HideLayerCommand);
        bus.register(ShowAllLayersCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct DetectRoomsCommand;

impl CommandHandler for DetectRoomsCommand {
    fn name(&self) -> &'static str {
        "detect_rooms"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.run_detection() {
            Ok(0) => CommandResponse::ok("未找到房间"),
            Ok(count) => CommandResponse::ok(format!("检测到 {count} 个房间")),
            Err(err) => CommandResponse::err(format!("未找到房间: {err}")),
        }
    }
}

struct ClearRoomsCommand;

impl CommandHandler for ClearRoomsCommand {
    fn name(&self) -> &'static str {
        "clear_rooms"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.session.clear_rooms();
        CommandResponse::ok("房间列表已清空")
    }
}

struct FocusRoomCommand;

impl CommandHandler for FocusRoomCommand {
    fn name(&self) -> &'static str {
        "focus_room"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(index) = request.args.first().and_then(|arg| arg.parse::<usize>().ok()) else {
            return CommandResponse::err("focus_room 需要一个房间序号");
        };
        match context.session.focus_room(index) {
            Ok(center) => CommandResponse::ok(format!(
                "视口已居中到房间 {index} ({:.3}, {:.3})",
                center.x(),
                center.y()
            )),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ShowLayerCommand;

impl CommandHandler for ShowLayerCommand {
    fn name(&self) -> &'static str {
        "show_layer"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(layer) = request.args.first() else {
            return CommandResponse::err("show_layer 需要图层名称");
        };
        match context.session.show_layer(layer) {
            Ok(_) => CommandResponse::ok(format!("图层 {layer} 已显示")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct HideLayerCommand;

impl CommandHandler for HideLayerCommand {
    fn name(&self) -> &'static str {
        "hide_layer"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(layer) = request.args.first() else {
            return CommandResponse::err("hide_layer 需要图层名称");
        };
        match context.session.hide_layer(layer) {
            Ok(_) => CommandResponse::ok(format!("图层 {layer} 已隐藏")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ShowAllLayersCommand;

impl CommandHandler for ShowAllLayersCommand {
    fn name(&self) -> &'static str {
        "show_all_layers"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.session.show_all_layers();
        CommandResponse::ok("已显示全部图层")
    }
}
