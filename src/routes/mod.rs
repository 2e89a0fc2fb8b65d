pub mod book;
pub mod rsa;
pub mod user;
