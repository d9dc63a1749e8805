pub mod config;
pub mod model;
pub mod paginate;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod youtube;
