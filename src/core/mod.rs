pub mod decoder;
pub mod http;
pub mod sink;
pub mod stream;
