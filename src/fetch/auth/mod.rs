//! Request decorators for providers that need credentials or headers.

mod header;
mod url_param;

pub use header::Header;
pub use url_param::UrlParam;
