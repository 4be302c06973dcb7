pub mod pipeline;
pub mod route;

pub use pipeline::*;
pub use route::*;
