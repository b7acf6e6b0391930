pub mod map;
pub mod sharpen;

pub use map::{lon_lat_to_meters, meters_to_lon_lat, MapBounds, MapProjection};
pub use sharpen::{sharpen, sharpen_file};
