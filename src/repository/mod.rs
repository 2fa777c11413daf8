pub mod proxy;

pub use proxy::{Mutation, ProxyRepository};
