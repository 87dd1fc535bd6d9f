pub mod emoncms;

pub use emoncms::EmoncmsSink;
