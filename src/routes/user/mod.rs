pub mod email;
pub mod handler;
pub mod model;
pub mod phone;
pub mod realname;

pub use handler::*;
