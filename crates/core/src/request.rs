//! Intercepted requests, their policy class and the responses served for them.

use bytes::Bytes;
use url::Url;

use crate::cache::hash::compute_request_key;

/// Declared destination of an outbound request, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// No declared destination (`fetch()` / XHR calls).
    #[default]
    Empty,
    Document,
    Frame,
    Iframe,
    Image,
    Font,
    Script,
    Style,
    Manifest,
    Worker,
    Audio,
    Video,
    Other(String),
}

impl Destination {
    pub fn as_str(&self) -> &str {
        match self {
            Destination::Empty => "",
            Destination::Document => "document",
            Destination::Frame => "frame",
            Destination::Iframe => "iframe",
            Destination::Image => "image",
            Destination::Font => "font",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Manifest => "manifest",
            Destination::Worker => "worker",
            Destination::Audio => "audio",
            Destination::Video => "video",
            Destination::Other(other) => other,
        }
    }
}

impl From<&str> for Destination {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Destination::Empty,
            "document" => Destination::Document,
            "frame" => Destination::Frame,
            "iframe" => Destination::Iframe,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "manifest" => Destination::Manifest,
            "worker" => Destination::Worker,
            "audio" => Destination::Audio,
            "video" => Destination::Video,
            other => Destination::Other(other.to_string()),
        }
    }
}

/// Policy class a request is served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Documents, JSON and HTML: network first, never stored.
    Data,
    /// Everything else: network first, stored opportunistically.
    Asset,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Data => "data",
            RequestClass::Asset => "asset",
        }
    }
}

/// Identity a cache entry is matched by: upper-cased method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    /// SHA-256 hex digest used as the stored entry key.
    pub fn hash(&self) -> String {
        compute_request_key(&self.method, &self.url)
    }
}

/// One outbound fetch observed by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    method: String,
    url: Url,
    destination: Destination,
}

impl InterceptedRequest {
    /// A `GET` request with no declared destination.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".to_string(), url, destination: Destination::Empty }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.trim().to_ascii_uppercase();
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Classify the request for the fetch policy.
    ///
    /// Data when the destination is `document` or the URL path (query and
    /// fragment excluded) ends in `.json` or `.html`; Asset otherwise.
    pub fn classify(&self) -> RequestClass {
        let path = self.url.path();
        if self.destination == Destination::Document || path.ends_with(".json") || path.ends_with(".html") {
            RequestClass::Data
        } else {
            RequestClass::Asset
        }
    }

    pub fn cache_key(&self) -> RequestKey {
        let mut url = self.url.clone();
        url.set_fragment(None);
        RequestKey { method: self.method.clone(), url: url.into() }
    }
}

/// A response as handed back to the requesting context.
///
/// The body is reference-counted, so cloning duplicates the response
/// without copying bytes and both copies stay byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
