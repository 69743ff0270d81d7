//! Cache Key Module
//!
//! Hierarchical key construction: `<namespace>:<layer>:<segment>...`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Separator between key segments.
pub const KEY_DELIMITER: char = ':';

/// Glob token matching any trailing segments.
pub const WILDCARD: &str = "*";

/// Number of hex characters kept from a parameter hash.
const PARAM_HASH_LEN: usize = 12;

// == Layer ==
/// Category of cached data, selecting both key prefix and default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Raw session data loaded from the telemetry source
    Session,
    /// Metrics derived from session data
    Computed,
    /// Whole HTTP response bodies
    ApiResponse,
    /// Slow-moving reference data (drivers, teams, circuits, schedules)
    Reference,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Session,
        Layer::Computed,
        Layer::ApiResponse,
        Layer::Reference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Session => "session",
            Layer::Computed => "computed",
            Layer::ApiResponse => "api_response",
            Layer::Reference => "reference",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "session" => Ok(Layer::Session),
            "computed" => Ok(Layer::Computed),
            "api_response" | "api" => Ok(Layer::ApiResponse),
            "reference" => Ok(Layer::Reference),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown cache layer: {}. Valid layers: session, computed, api_response, reference",
                other
            ))),
        }
    }
}

// == Key Segment ==
/// One named component of a key: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Int(i64),
    Text(String),
}

impl KeySegment {
    fn validate(&self) -> Result<String> {
        let rendered = self.to_string();
        if rendered.is_empty() {
            return Err(CacheError::InvalidKeyComponent(
                "segment cannot be empty".to_string(),
            ));
        }
        if rendered.contains(KEY_DELIMITER) {
            return Err(CacheError::InvalidKeyComponent(format!(
                "segment '{}' contains the delimiter '{}'",
                rendered, KEY_DELIMITER
            )));
        }
        Ok(rendered)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Int(n) => write!(f, "{}", n),
            KeySegment::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Text(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Text(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        KeySegment::Text(value.clone())
    }
}

macro_rules! int_segment {
    ($($ty:ty),*) => {
        $(impl From<$ty> for KeySegment {
            fn from(value: $ty) -> Self {
                KeySegment::Int(i64::from(value))
            }
        })*
    };
}

int_segment!(i16, i32, i64, u8, u16, u32);

// == Cache Key ==
/// A validated, fully rendered cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    layer: Layer,
    rendered: String,
}

impl CacheKey {
    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}

impl Serialize for CacheKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.rendered)
    }
}

// == Key Pattern ==
/// Prefix selecting every key built from a superset of its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    base: String,
}

impl KeyPattern {
    /// The literal prefix (a key equal to it also matches).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Redis-style glob form: escaped base followed by `:*`.
    pub fn glob(&self) -> String {
        let mut out = String::with_capacity(self.base.len() + 2);
        push_escaped(&mut out, &self.base);
        out.push(KEY_DELIMITER);
        out.push_str(WILDCARD);
        out
    }

    /// Segment-aware match: exact base, or base followed by the delimiter.
    pub fn matches(&self, key: &str) -> bool {
        match key.strip_prefix(self.base.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with(KEY_DELIMITER),
            None => false,
        }
    }
}

/// Appends `text` with glob metacharacters escaped.
fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob())
    }
}

// == Key Builder ==
/// Builds canonical keys under a fixed namespace.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Result<Self> {
        let namespace = KeySegment::Text(namespace.into()).validate()?;
        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Starts a fluent key for `layer`.
    pub fn key(&self, layer: Layer) -> KeyParts<'_> {
        KeyParts {
            builder: self,
            layer,
            segments: Vec::new(),
        }
    }

    /// Builds `namespace:layer:seg1:seg2...`. At least one segment is required.
    pub fn build(&self, layer: Layer, segments: &[KeySegment]) -> Result<CacheKey> {
        if segments.is_empty() {
            return Err(CacheError::InvalidKeyComponent(
                "a key needs at least one segment".to_string(),
            ));
        }
        Ok(CacheKey {
            layer,
            rendered: self.render(layer, segments)?,
        })
    }

    /// Builds the invalidation pattern for keys sharing the leading `segments`.
    pub fn pattern(&self, layer: Layer, segments: &[KeySegment]) -> Result<KeyPattern> {
        Ok(KeyPattern {
            base: self.render(layer, segments)?,
        })
    }

    /// Glob for keys whose leading segments match `slots`; `None` matches any segment.
    pub fn sparse_glob(&self, layer: Layer, slots: &[Option<KeySegment>]) -> Result<String> {
        let mut out = String::new();
        push_escaped(&mut out, &self.namespace);
        out.push(KEY_DELIMITER);
        out.push_str(layer.as_str());
        for slot in slots {
            out.push(KEY_DELIMITER);
            match slot {
                Some(segment) => push_escaped(&mut out, &segment.validate()?),
                None => out.push_str(WILDCARD),
            }
        }
        out.push(KEY_DELIMITER);
        out.push_str(WILDCARD);
        Ok(out)
    }

    /// Pattern for every cached response of one endpoint.
    pub fn api_endpoint_pattern(&self, endpoint: &str) -> Result<KeyPattern> {
        self.pattern(Layer::ApiResponse, &[clean_endpoint(endpoint).into()])
    }

    /// Pattern covering a whole layer.
    pub fn layer_pattern(&self, layer: Layer) -> KeyPattern {
        KeyPattern {
            base: format!("{}{}{}", self.namespace, KEY_DELIMITER, layer.as_str()),
        }
    }

    /// Glob covering every key in the namespace.
    pub fn namespace_glob(&self) -> String {
        KeyPattern {
            base: self.namespace.clone(),
        }
        .glob()
    }

    fn render(&self, layer: Layer, segments: &[KeySegment]) -> Result<String> {
        let mut rendered = format!("{}{}{}", self.namespace, KEY_DELIMITER, layer.as_str());
        for segment in segments {
            rendered.push(KEY_DELIMITER);
            rendered.push_str(&segment.validate()?);
        }
        Ok(rendered)
    }

    // == Domain Helpers ==

    /// `ns:session:<year>:<event>:<session>`
    pub fn session_data(&self, year: i32, event: &str, session: &str) -> Result<CacheKey> {
        self.key(Layer::Session)
            .segment(year)
            .segment(event)
            .segment(session)
            .build()
    }

    /// `ns:session:<year>:<event>:<session>:laps[:<DRIVER>]`
    pub fn session_laps(
        &self,
        year: i32,
        event: &str,
        session: &str,
        driver: Option<&str>,
    ) -> Result<CacheKey> {
        let parts = self
            .key(Layer::Session)
            .segment(year)
            .segment(event)
            .segment(session)
            .segment("laps");
        match driver {
            Some(driver) => parts.segment(driver.to_uppercase()).build(),
            None => parts.build(),
        }
    }

    /// `ns:session:<year>:<event>:<session>:telemetry:<DRIVER>:lap-<n>`
    pub fn session_telemetry(
        &self,
        year: i32,
        event: &str,
        session: &str,
        driver: &str,
        lap: u32,
    ) -> Result<CacheKey> {
        self.key(Layer::Session)
            .segment(year)
            .segment(event)
            .segment(session)
            .segment("telemetry")
            .segment(driver.to_uppercase())
            .segment(format!("lap-{}", lap))
            .build()
    }

    /// `ns:computed:driver-comparison:<year>:<event>:<session>:<A-B-...>`
    ///
    /// Drivers are upper-cased and sorted so argument order does not matter.
    pub fn driver_comparison(
        &self,
        year: i32,
        event: &str,
        session: &str,
        drivers: &[&str],
    ) -> Result<CacheKey> {
        let mut codes: Vec<String> = drivers.iter().map(|d| d.to_uppercase()).collect();
        codes.sort();
        self.key(Layer::Computed)
            .segment("driver-comparison")
            .segment(year)
            .segment(event)
            .segment(session)
            .segment(codes.join("-"))
            .build()
    }

    /// `ns:computed:<metric>:<year>:<event>:<params-hash|all>`
    pub fn computed_metric(
        &self,
        metric: &str,
        year: i32,
        event: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<CacheKey> {
        let suffix = if params.is_empty() {
            "all".to_string()
        } else {
            hash_params(params)?
        };
        self.key(Layer::Computed)
            .segment(metric)
            .segment(year)
            .segment(event)
            .segment(suffix)
            .build()
    }

    /// `ns:api_response:<endpoint>:<params-hash|no-params>`
    ///
    /// The endpoint loses its leading slash and `/` becomes `-`.
    pub fn api_response(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<CacheKey> {
        let endpoint = clean_endpoint(endpoint);
        let suffix = if params.is_empty() {
            "no-params".to_string()
        } else {
            hash_params(params)?
        };
        self.key(Layer::ApiResponse)
            .segment(endpoint)
            .segment(suffix)
            .build()
    }

    /// `ns:reference:<data_type>[:<identifier>]`
    pub fn reference(&self, data_type: &str, identifier: Option<&str>) -> Result<CacheKey> {
        let parts = self.key(Layer::Reference).segment(data_type);
        match identifier {
            Some(id) => parts.segment(id).build(),
            None => parts.build(),
        }
    }
}

/// `/laps/fastest` -> `laps-fastest`
fn clean_endpoint(endpoint: &str) -> String {
    endpoint.trim_start_matches('/').replace('/', "-")
}

/// Short stable digest of sorted parameters.
fn hash_params(params: &BTreeMap<String, String>) -> Result<String> {
    let canonical = serde_json::to_string(params)?;
    let digest = Sha256::digest(canonical.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(PARAM_HASH_LEN);
    Ok(encoded)
}

// == Fluent Parts ==
/// Accumulates segments for a key or pattern.
#[derive(Debug, Clone)]
pub struct KeyParts<'a> {
    builder: &'a KeyBuilder,
    layer: Layer,
    segments: Vec<KeySegment>,
}

impl KeyParts<'_> {
    pub fn segment(mut self, segment: impl Into<KeySegment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn build(self) -> Result<CacheKey> {
        self.builder.build(self.layer, &self.segments)
    }

    pub fn pattern(self) -> Result<KeyPattern> {
        self.builder.pattern(self.layer, &self.segments)
    }
}
