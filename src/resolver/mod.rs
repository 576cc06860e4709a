pub mod asset_resolver;
pub mod registry;

pub use asset_resolver::AssetResolver;
pub use registry::{shorten_denom, AssetIndex};
