//! Transport-neutral view of an inbound protocol request.

use std::collections::HashMap;

use serde_json::Value;
use url::form_urlencoded;

/// An OAuth2 request as seen by the grant handlers.
///
/// Built by the transport layer from the HTTP method, URI, headers and body.
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct OAuth2Request {
    pub method: String,
    pub uri: String,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    json: HashMap<String, String>,
}

macro_rules! param_accessors {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(&self) -> Option<&str> {
                self.data(stringify!($name))
            }
        )*
    };
}

impl OAuth2Request {
    /// Start a request from its method and URI; the query string is parsed from the URI.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let query = uri
            .split_once('?')
            .map(|(_, qs)| parse_pairs(qs.as_bytes()))
            .unwrap_or_default();
        Self {
            method: method.into().to_ascii_uppercase(),
            uri,
            query,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn with_form_body(mut self, body: &[u8]) -> Self {
        self.form.extend(parse_pairs(body));
        self
    }

    /// Take top-level scalar members of a JSON object body.
    pub fn with_json(mut self, body: &Value) -> Self {
        if let Value::Object(map) = body {
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                self.json.insert(key.clone(), value);
            }
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Resolve a parameter from the form body, then the JSON body, then the query.
    ///
    /// Empty values count as absent.
    pub fn data(&self, name: &str) -> Option<&str> {
        [&self.form, &self.json, &self.query]
            .into_iter()
            .find_map(|source| source.get(name).map(String::as_str).filter(|v| !v.is_empty()))
    }

    param_accessors!(
        client_id,
        client_secret,
        grant_type,
        response_type,
        redirect_uri,
        scope,
        state,
        nonce,
        response_mode,
        prompt,
        code,
        refresh_token,
        code_verifier,
        code_challenge,
        code_challenge_method,
        username,
        password,
    );
}

fn parse_pairs(input: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(input).into_owned().collect()
}
