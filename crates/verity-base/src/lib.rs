pub mod logging;
pub mod rect;
pub mod tensor;
pub mod vec2;

pub use logging::{FileLogger, StdoutLogger, init_file_logger, init_stdout_logger, parse_level};
pub use rect::Rect;
pub use tensor::Tensor;
pub use vec2::Vec2;

// Re-export log crate so downstream crates can use verity_base::log::*
pub use log;
