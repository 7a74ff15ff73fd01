//! cyto-tools: built-in tools for the cyto kernel
//!
//! The shape-aware file tools (`describe_file`, `extract_section`,
//! `replace_section`) wrap the handlers in `cyto-shape`; the desktop
//! tool drives an external [`desktop::DesktopBackend`].

pub mod desktop;
pub mod files;

pub use desktop::{ComputerUseTool, DesktopBackend, MouseButton};
pub use files::{DescribeFileTool, ExtractSectionTool, ReplaceSectionTool};
