//! 后处理原语: 三维形态学闭运算、连通分量过滤、邻近图与标签平滑.

mod graph;
mod morph;
mod potential;
mod smooth;

pub use graph::{build_proximity_graph, Edge};
pub use morph::{
    close_and_filter, close_labels, close_multi_radii, remove_small_components, squared_distance_to,
};
pub use potential::PotentialMatrix;
pub use smooth::{smooth_labels, MAX_SWEEPS};
