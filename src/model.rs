pub mod focus;
pub mod geometry;
pub mod rules;
pub mod scratchpad;
pub mod snapshot;
pub mod tree;
pub mod window;
pub mod workspace;

pub use geometry::Rect;
pub use tree::{
    Container, ContainerId, ContainerKind, FloatingState, FullscreenMode, Layout, Orientation,
    Tree,
};
pub use window::WindowInfo;
