pub mod fetch;
pub mod proxy;
pub mod stats;
pub mod validation;

pub use fetch::*;
pub use proxy::*;
pub use stats::*;
pub use validation::*;
