//! reqbind - tag-driven request binding
//!
//! Populates typed records from query strings, url-encoded and multipart
//! forms, headers, path parameters and JSON/XML payloads.
//!
//! ```
//! use bytes::Bytes;
//! use reqbind::binding::{bind, Route};
//! use reqbind::record;
//! use reqbind::validate::Validate;
//!
//! #[derive(Debug, Default)]
//! struct Paging {
//!     page: i64,
//!     size: i64,
//! }
//!
//! record!(Paging {
//!     page => [form = "page"],
//!     size => [form = "size,default=10"],
//! });
//! impl Validate for Paging {}
//!
//! let req = http::Request::get("/items?page=2").body(Bytes::new()).unwrap();
//! let mut paging = Paging::default();
//! bind(&req, &Route::new("/items"), &mut paging).unwrap();
//! assert_eq!((paging.page, paging.size), (2, 10));
//! ```

pub mod binding;
pub mod coerce;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod multipart;
pub mod payload;
pub mod schema;
pub mod source;
pub mod tag;
pub mod timefmt;
pub mod validate;
pub mod walk;

pub use binding::{bind, Binder, Binding, Route};
pub use config::BinderConfig;
pub use error::{BindError, ErrorKind, FixSuggestion, ValidationError};
pub use multipart::{FileHeader, MultipartForm};
pub use schema::{Field, FieldMeta, Record, Schema, Slot};
pub use source::{Source, Values};
pub use validate::{Validate, Validator};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}
