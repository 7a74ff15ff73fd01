//! Desktop automation tool
//!
//! The OS-level automation backend (mouse, keyboard, screenshots) is an
//! external collaborator behind [`DesktopBackend`]; this tool validates
//! arguments, dispatches actions, and reports `{action, screenshot}`
//! results with the capture saved under the work directory.

use async_trait::async_trait;
use cyto_core::{Error, Result};
use cyto_kernel::tool::Tool;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Mouse buttons understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// The OS automation collaborator.
///
/// Implementations block as needed; the kernel treats tool execution as
/// synchronous within a turn.
pub trait DesktopBackend: Send + Sync {
    /// Display size in pixels, `(width, height)`
    fn screen_size(&self) -> (u32, u32);

    /// Press the keys down in order, then release in reverse order
    fn key(&self, keys: &[String]) -> Result<()>;

    /// Type a string of text on the keyboard
    fn type_text(&self, text: &str) -> Result<()>;

    /// Move the cursor
    fn mouse_move(&self, x: i32, y: i32) -> Result<()>;

    /// Click at a coordinate; `clicks` > 1 repeats with a short interval
    fn click(&self, button: MouseButton, x: i32, y: i32, clicks: u32) -> Result<()>;

    /// Drag with the left button held to a coordinate
    fn drag_to(&self, x: i32, y: i32) -> Result<()>;

    /// Vertical scroll; positive is up
    fn scroll(&self, pixels: i32) -> Result<()>;

    /// Horizontal scroll. Backends without horizontal support inherit the
    /// vertical fallback.
    fn hscroll(&self, pixels: i32) -> Result<()> {
        self.scroll(pixels)
    }

    /// Capture the screen as a PNG at `path`
    fn screenshot(&self, path: &Path) -> Result<()>;
}

fn default_work_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("workspace")
        .join("tools")
        .join("computer_use")
}

/// GUI interaction tool dispatched by `action`
pub struct ComputerUseTool {
    backend: Arc<dyn DesktopBackend>,
    work_dir: PathBuf,
    description: String,
}

impl ComputerUseTool {
    pub fn new(backend: Arc<dyn DesktopBackend>) -> Self {
        let (width, height) = backend.screen_size();
        let description = format!(
            "Use a mouse and keyboard to interact with a computer, and take screenshots.\n\
* This is an interface to a desktop GUI. You do not have access to a terminal or applications menu. You must click on desktop icons to start applications.\n\
* Some applications may take time to start or process actions, so you may need to wait and take successive screenshots to see the results of your actions.\n\
* The screen's resolution is {width}x{height}.\n\
* Whenever you intend to move the cursor to click on an element like an icon, you should consult a screenshot to determine the coordinates of the element before moving the cursor.\n\
* Make sure to click any buttons, links, icons, etc with the cursor tip in the center of the element. Don't click boxes on their edges."
        );
        Self {
            backend,
            work_dir: default_work_dir(),
            description,
        }
    }

    /// Override the screenshot directory
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Validate a 2-element numeric coordinate
    fn coerce_coord(arguments: &Value) -> Result<(i32, i32)> {
        let coord = arguments
            .get("coordinate")
            .and_then(Value::as_array)
            .filter(|items| items.len() == 2)
            .ok_or_else(|| Error::MissingArgument("coordinate must be [x, y]".to_string()))?;
        let x = coord[0]
            .as_f64()
            .ok_or_else(|| Error::MissingArgument("coordinate must be [x, y]".to_string()))?;
        let y = coord[1]
            .as_f64()
            .ok_or_else(|| Error::MissingArgument("coordinate must be [x, y]".to_string()))?;
        Ok((x as i32, y as i32))
    }

    fn require_text<'a>(arguments: &'a Value, action: &str) -> Result<&'a str> {
        arguments
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::MissingArgument(format!("'text' is required for action={action}"))
            })
    }

    fn require_pixels(arguments: &Value, action: &str) -> Result<i32> {
        arguments
            .get("pixels")
            .and_then(Value::as_f64)
            .map(|p| p as i32)
            .ok_or_else(|| {
                Error::MissingArgument(format!("'pixels' is required for action={action}"))
            })
    }

    /// Capture a screenshot into the work dir and report it
    fn screenshot_result(&self, action: &str) -> Result<Value> {
        std::fs::create_dir_all(&self.work_dir)?;
        let filename = format!("{}.png", uuid::Uuid::new_v4().simple());
        let path = self.work_dir.join(filename);
        self.backend.screenshot(&path)?;
        Ok(json!({
            "action": action,
            "screenshot": path.to_string_lossy(),
        }))
    }
}

#[async_trait]
impl Tool for ComputerUseTool {
    fn name(&self) -> &str {
        "computer_use"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "description": "\
The action to perform. The available actions are:\n\
* `key`: Performs key down presses on the arguments passed in order, then performs key releases in reverse order.\n\
* `type`: Type a string of text on the keyboard.\n\
* `mouse_move`: Move the cursor to a specified (x, y) pixel coordinate on the screen.\n\
* `left_click`: Click the left mouse button at a specified (x, y) pixel coordinate on the screen.\n\
* `left_click_drag`: Click and drag the cursor to a specified (x, y) pixel coordinate on the screen.\n\
* `right_click`: Click the right mouse button at a specified (x, y) pixel coordinate on the screen.\n\
* `middle_click`: Click the middle mouse button at a specified (x, y) pixel coordinate on the screen.\n\
* `double_click`: Double-click the left mouse button at a specified (x, y) pixel coordinate on the screen.\n\
* `triple_click`: Triple-click the left mouse button at a specified (x, y) pixel coordinate on the screen.\n\
* `scroll`: Performs a scroll of the mouse scroll wheel.\n\
* `hscroll`: Performs a horizontal scroll (falls back to a regular scroll when unsupported).\n\
* `wait`: Wait specified seconds for the change to happen.\n\
* `terminate`: Terminate the current task and report its completion status.\n\
* `answer`: Answer a question.\n\
* `screenshot`: Capture a screenshot without performing any other action.",
                    "enum": [
                        "key", "type", "mouse_move", "left_click", "left_click_drag",
                        "right_click", "middle_click", "double_click", "triple_click",
                        "scroll", "hscroll", "wait", "terminate", "answer", "screenshot",
                    ],
                    "type": "string",
                },
                "keys": {
                    "description": "Required only by `action=key`.",
                    "type": "array",
                },
                "text": {
                    "description": "Required only by `action=type` and `action=answer`.",
                    "type": "string",
                },
                "coordinate": {
                    "description": "(x, y): The x (pixels from the left edge) and y (pixels from the top edge) coordinates to move the mouse to.",
                    "type": "array",
                },
                "pixels": {
                    "description": "The amount of scrolling to perform. Positive values scroll up, negative values scroll down. Required only by `action=scroll` and `action=hscroll`.",
                    "type": "number",
                },
                "time": {
                    "description": "The seconds to wait. Required only by `action=wait`.",
                    "type": "number",
                },
                "status": {
                    "description": "The status of the task. Required only by `action=terminate`.",
                    "type": "string",
                    "enum": ["success", "failure"],
                },
            },
            "required": ["action"],
        })
    }

    async fn execute(&self, arguments: Value, _cancel: CancellationToken) -> Result<Value> {
        let action = arguments
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingArgument("Missing 'action' argument".to_string()))?;

        match action {
            "left_click" | "right_click" | "middle_click" | "double_click" | "triple_click" => {
                let (x, y) = Self::coerce_coord(&arguments)?;
                let (button, clicks) = match action {
                    "right_click" => (MouseButton::Right, 1),
                    "middle_click" => (MouseButton::Middle, 1),
                    "double_click" => (MouseButton::Left, 2),
                    // Triple-click is a 3-click sequence
                    "triple_click" => (MouseButton::Left, 3),
                    _ => (MouseButton::Left, 1),
                };
                self.backend.click(button, x, y, clicks)?;
                self.screenshot_result("click")
            }
            "key" => {
                let keys: Vec<String> = arguments
                    .get("keys")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if keys.is_empty() {
                    return Err(Error::MissingArgument(
                        "keys cannot be empty for action=key".to_string(),
                    ));
                }
                self.backend.key(&keys)?;
                self.screenshot_result("key")
            }
            "type" => {
                self.backend.type_text(Self::require_text(&arguments, "type")?)?;
                self.screenshot_result("type")
            }
            "mouse_move" => {
                let (x, y) = Self::coerce_coord(&arguments)?;
                self.backend.mouse_move(x, y)?;
                self.screenshot_result("mouse_move")
            }
            "left_click_drag" => {
                let (x, y) = Self::coerce_coord(&arguments)?;
                self.backend.drag_to(x, y)?;
                self.screenshot_result("left_click_drag")
            }
            "scroll" => {
                self.backend.scroll(Self::require_pixels(&arguments, "scroll")?)?;
                self.screenshot_result("scroll")
            }
            "hscroll" => {
                self.backend.hscroll(Self::require_pixels(&arguments, "hscroll")?)?;
                self.screenshot_result("hscroll")
            }
            "wait" => {
                // Wire field is `time`; bind it to a distinct name and
                // sleep through the runtime.
                let seconds = arguments
                    .get("time")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        Error::MissingArgument("'time' is required for action=wait".to_string())
                    })?
                    .max(0.0);
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                self.screenshot_result("wait")
            }
            "answer" => Ok(json!({"answer": Self::require_text(&arguments, "answer")?})),
            "screenshot" => self.screenshot_result("screenshot"),
            "terminate" => {
                let status = arguments.get("status").and_then(Value::as_str);
                match status {
                    Some(status @ ("success" | "failure")) => Ok(json!({"status": status})),
                    _ => Err(Error::MissingArgument(
                        "status must be 'success' or 'failure'".to_string(),
                    )),
                }
            }
            other => Err(Error::UnsupportedOperation(format!(
                "Invalid action: {other}"
            ))),
        }
    }
}
