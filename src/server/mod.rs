pub mod http;

pub use http::{Server, StateView};
