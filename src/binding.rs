//! Bindings and the dispatch selector
//!
//! A [`Binding`] turns one part of a request into a [`Source`] (or decodes
//! a structured payload) and fills the target. [`Binding::select`] picks one
//! per request from the method, route and content type:
//!
//! | request | binding | tags |
//! |---|---|---|
//! | `GET`/`HEAD`, route with `/:name` or `/{name}` | uri | `uri` |
//! | `GET`/`HEAD` otherwise | query | `form` |
//! | `application/json` | json | - |
//! | `application/xml`, `text/xml` | xml | - |
//! | `multipart/form-data` | multipart | `form` |
//! | anything else | form (body, then query) | `form` |
//!
//! Whatever the path, the populated target is then validated.

use bytes::Bytes;
use http::{header, Method, Request};
use tracing::debug;

use crate::config::BinderConfig;
use crate::error::{BindError, Result};
use crate::multipart::{self, MultipartForm};
use crate::schema::{Field, Slot};
use crate::source::{Source, Values};
use crate::validate::{Validate, Validator};
use crate::walk::map_slot;

pub const MIME_JSON: &str = "application/json";
pub const MIME_XML: &str = "application/xml";
pub const MIME_XML2: &str = "text/xml";
pub const MIME_POST_FORM: &str = "application/x-www-form-urlencoded";
pub const MIME_MULTIPART_POST_FORM: &str = "multipart/form-data";

/// Tag namespace for query, form and multipart values
pub const FORM_TAG: &str = "form";
/// Tag namespace for path parameters
pub const URI_TAG: &str = "uri";
/// Tag namespace for headers
pub const HEADER_TAG: &str = "header";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Json,
    Xml,
    /// Body values followed by query values
    Form,
    /// Body values only
    FormPost,
    FormMultipart,
    Query,
    Uri,
    Header,
}

impl Binding {
    pub const ALL: [Binding; 8] = [
        Binding::Json,
        Binding::Xml,
        Binding::Form,
        Binding::FormPost,
        Binding::FormMultipart,
        Binding::Query,
        Binding::Uri,
        Binding::Header,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Binding::Json => "json",
            Binding::Xml => "xml",
            Binding::Form => "form",
            Binding::FormPost => "form-urlencoded",
            Binding::FormMultipart => "multipart/form-data",
            Binding::Query => "query",
            Binding::Uri => "uri",
            Binding::Header => "header",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Pick the binding for a request
    pub fn select(method: &Method, route: &Route, content_type: &str) -> Self {
        if is_retrieval(method) {
            return if route.has_params() {
                Binding::Uri
            } else {
                Binding::Query
            };
        }

        match filter_flags(content_type).to_ascii_lowercase().as_str() {
            MIME_JSON => Binding::Json,
            MIME_XML | MIME_XML2 => Binding::Xml,
            MIME_MULTIPART_POST_FORM => Binding::FormMultipart,
            _ => Binding::Form,
        }
    }
}

fn is_retrieval(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Media type without parameters: cut at the first `;` or space
pub fn filter_flags(content: &str) -> &str {
    match content.find([';', ' ']) {
        Some(idx) => &content[..idx],
        None => content,
    }
}

/// The matched route: its pattern and the extracted path parameters
#[derive(Debug, Clone, Default)]
pub struct Route {
    pattern: String,
    params: Values,
}

impl Route {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            params: Values::new(),
        }
    }

    /// Add a path parameter, builder style
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.add(key, value);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn params(&self) -> &Values {
        &self.params
    }

    /// True when the pattern declares path parameters
    pub fn has_params(&self) -> bool {
        self.pattern.contains("/:") || self.pattern.contains("/{")
    }
}

fn content_type(req: &Request<Bytes>) -> &str {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn query_values(req: &Request<Bytes>) -> Values {
    Values::from_urlencoded(req.uri().query().unwrap_or("").as_bytes())
}

/// Binds requests into targets with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Binder {
    config: BinderConfig,
}

impl Binder {
    pub fn new(config: BinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Select a binding for the request, fill `target` and validate it
    pub fn bind<T: Field + Validate>(
        &self,
        req: &Request<Bytes>,
        route: &Route,
        target: &mut T,
    ) -> Result<Binding> {
        self.bind_with(req, route, target, &Validator::new())
    }

    /// Like [`Binder::bind`], validating with a caller-supplied validator
    pub fn bind_with<T: Field + Validate>(
        &self,
        req: &Request<Bytes>,
        route: &Route,
        target: &mut T,
        validator: &Validator<'_, T>,
    ) -> Result<Binding> {
        let binding = Binding::select(req.method(), route, content_type(req));
        debug!(binding = binding.name(), method = %req.method(), uri = %req.uri(), "binding selected");
        self.bind_as(binding, req, route, target, validator)?;
        Ok(binding)
    }

    /// Fill and validate `target` with one specific binding
    pub fn bind_as<T: Field + Validate>(
        &self,
        binding: Binding,
        req: &Request<Bytes>,
        route: &Route,
        target: &mut T,
        validator: &Validator<'_, T>,
    ) -> Result<()> {
        let set = match binding {
            Binding::Json | Binding::Xml => {
                decode_payload(binding, req.body(), target.slot())?;
                true
            }
            Binding::Query => map_slot(target.slot(), Source::Form(&query_values(req)), FORM_TAG)?,
            Binding::Uri => map_slot(target.slot(), Source::Form(route.params()), URI_TAG)?,
            Binding::Header => {
                let headers = Values::from_headers(req.headers());
                map_slot(target.slot(), Source::Header(&headers), HEADER_TAG)?
            }
            Binding::Form => {
                let mut values = self.body_values(req)?;
                values.merge(&query_values(req));
                map_slot(target.slot(), Source::Form(&values), FORM_TAG)?
            }
            Binding::FormPost => {
                let values = self.body_values(req)?;
                map_slot(target.slot(), Source::Form(&values), FORM_TAG)?
            }
            Binding::FormMultipart => {
                let form = self.multipart_form(req)?;
                map_slot(target.slot(), Source::Multipart(&form), FORM_TAG)?
            }
        };
        debug!(binding = binding.name(), set, "binding complete");

        validator.check_struct(target)
    }

    /// Decode a raw JSON or XML body into `target` and validate it
    pub fn bind_body<T: Field + Validate>(
        &self,
        binding: Binding,
        body: &[u8],
        target: &mut T,
        validator: &Validator<'_, T>,
    ) -> Result<()> {
        match binding {
            Binding::Json | Binding::Xml => decode_payload(binding, body, target.slot())?,
            other => {
                return Err(BindError::unsupported(
                    other.name(),
                    "only json and xml bind from a raw body",
                ))
            }
        }
        validator.check_struct(target)
    }

    /// Url-encoded or multipart body values
    fn body_values(&self, req: &Request<Bytes>) -> Result<Values> {
        let media = filter_flags(content_type(req)).to_ascii_lowercase();
        match media.as_str() {
            MIME_POST_FORM => Ok(Values::from_urlencoded(req.body())),
            MIME_MULTIPART_POST_FORM => Ok(self.multipart_form(req)?.values),
            _ => Ok(Values::new()),
        }
    }

    fn multipart_form(&self, req: &Request<Bytes>) -> Result<MultipartForm> {
        let ct = content_type(req);
        if !filter_flags(ct).eq_ignore_ascii_case(MIME_MULTIPART_POST_FORM) {
            return Err(BindError::Multipart {
                reason: format!("Content-Type {:?} is not {}", ct, MIME_MULTIPART_POST_FORM),
            });
        }
        multipart::parse(req.body().clone(), ct, &self.config)
    }
}

fn decode_payload(binding: Binding, body: &[u8], slot: Slot<'_>) -> Result<()> {
    if body.is_empty() {
        return Err(BindError::MissingBody);
    }

    match slot {
        Slot::Record(record) if binding == Binding::Json => record.decode_json(body),
        Slot::Record(record) => record.decode_xml(body),
        Slot::Json(target) if binding == Binding::Json => {
            let text = std::str::from_utf8(body).map_err(|e| BindError::Payload {
                format: "JSON",
                reason: e.to_string(),
            })?;
            target.decode_json(text)
        }
        Slot::Optional(target) => {
            target.with_inner(&mut |inner| decode_payload(binding, body, inner).map(|()| true))?;
            Ok(())
        }
        other => Err(BindError::unsupported(
            other.type_name(),
            format!("no {} decoder for this target", binding.name()),
        )),
    }
}

/// Bind with the default configuration
pub fn bind<T: Field + Validate>(req: &Request<Bytes>, route: &Route, target: &mut T) -> Result<Binding> {
    Binder::default().bind(req, route, target)
}
