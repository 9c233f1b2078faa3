pub mod attributed;
pub mod checkpoint;
pub mod command;
pub mod coord;
pub mod fileformat;
pub mod runconfig;

pub use coord::derive_tile_id;
pub use coord::extract_coordinate_key;
pub use runconfig::RunConfig;
