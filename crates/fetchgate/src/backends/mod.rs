mod file;
mod git;
mod http;

pub use file::*;
pub use git::*;
pub use http::*;
