mod backend;
mod backend_error;
pub mod backends;
mod client;
mod client_error;
mod context;
mod copy;
mod detect;
mod http;
mod mode;
mod owner;
mod process;
mod registry;
mod source;
mod storage;
mod storage_error;

pub use backend::*;
pub use backend_error::*;
pub use backends::*;
pub use client::*;
pub use client_error::*;
pub use context::*;
pub use copy::*;
pub use detect::*;
pub use http::*;
pub use mode::*;
pub use owner::*;
pub use process::*;
pub use registry::*;
pub use source::*;
pub use storage::*;
pub use storage_error::*;

pub use tokio_util::sync::CancellationToken;
pub use url::Url;
