pub mod credential;
pub mod error;
pub mod payload;
pub mod qos;

pub use credential::*;
pub use error::*;
pub use payload::*;
pub use qos::*;
