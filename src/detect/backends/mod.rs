pub mod command;
pub mod http;

pub use command::CommandRecognizer;
pub use http::HttpRecognizer;
