//! cyto-shape: shape-aware file inspection
//!
//! Structurally heterogeneous files (source trees, hierarchical maps,
//! tables, free text) are dispatched by extension to a handler that
//! implements three operations: `outline` (a structural summary),
//! `select` (extract one addressed section), and `replace` (write one
//! addressed section back). Everything that can grow large is paginated.

pub mod blob;
pub mod handler;
pub mod map;
pub mod page;
pub mod selector;
pub mod table;
pub mod text;
pub mod tree;

pub use blob::blob_outline;
pub use handler::{
    ShapeHandler, ShapeKind, handler_for, supported_extensions, unsupported_type_error,
};
pub use page::{DEFAULT_PAGE_SIZE, PageInfo, WHOLE_VALUE_MAX_CHARS, paginate_slice, paginate_text};
pub use selector::{BlockKind, Segment, Selector};
