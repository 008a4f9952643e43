pub mod geo;
pub mod id;

pub use geo::{haversine_meters, GeoPoint};
pub use id::PrefixedId;
