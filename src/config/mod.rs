pub mod types;
pub mod loader;
pub mod validator;
pub mod resolver;
pub mod env;

pub use types::*;
pub use loader::*;
pub use validator::*;
pub use resolver::*;
pub use env::*;
