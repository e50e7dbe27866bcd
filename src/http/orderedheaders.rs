use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::str::FromStr;

/// A header map that strictly preserves insertion order and the caller's
/// spelling of each name.
///
/// Keys are unique and compared case-insensitively. Used for request headers,
/// which are serialized in the order they were set, and for response headers,
/// where a repeated name is merged into a single comma-joined value.
#[derive(Debug, Clone, Default)]
pub struct OrderedHeaderMap {
    headers: Vec<(String, String)>,
}

impl OrderedHeaderMap {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing any existing value in place.
    ///
    /// Names and values are validated against the HTTP token and field-value
    /// grammars, so a value can never smuggle a line break onto the wire.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        HeaderName::from_str(name).map_err(|_| {
            tracing::warn!(name = %name, "rejecting invalid header name");
            NetError::InvalidArgument
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            tracing::warn!(name = %name, "rejecting invalid header value");
            NetError::InvalidArgument
        })?;

        self.set_unchecked(name, value);
        Ok(())
    }

    /// Append `value` to an existing header as `, value`, or add it.
    /// Empty values never produce a dangling separator.
    pub(crate) fn merge(&mut self, name: &str, value: &str) {
        if let Some((_, v)) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            if v.is_empty() {
                *v = value.to_string();
            } else if !value.is_empty() {
                v.push_str(", ");
                v.push_str(value);
            }
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub(crate) fn set_unchecked(&mut self, name: &str, value: &str) {
        if let Some((_, v)) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            *v = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether the comma-separated header `name` lists `token`
    /// (case-insensitive), as in `Connection: Keep-Alive, Upgrade`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name).is_some_and(|v| {
            v.split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
    }

    /// Headers in insertion order with original casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Converts to a standard http::HeaderMap, dropping entries that do not
    /// form valid header names or values.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
                map.append(n, v);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Content-Type", "application/json").unwrap();
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_case_insensitive_get() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("ACCEPT", "text/html").unwrap();
        assert!(headers.get("accept").is_some());
        assert!(headers.contains("Accept"));
    }

    #[test]
    fn test_update_existing_header_keeps_position() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Host", "example.com").unwrap();
        headers.insert("Accept", "*/*").unwrap();
        headers.insert("host", "updated.com").unwrap();

        assert_eq!(headers.len(), 2);
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "Accept"]);
        assert_eq!(headers.get("HOST"), Some("updated.com"));
    }

    #[test]
    fn test_merge_comma_joins() {
        let mut headers = OrderedHeaderMap::new();
        headers.merge("Set-Cookie", "a=1");
        headers.merge("set-cookie", "b=2");
        assert_eq!(headers.get("Set-Cookie"), Some("a=1, b=2"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_remove_header() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("X-Custom", "value").unwrap();
        headers.remove("x-custom");
        assert!(headers.get("X-Custom").is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_has_token() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Connection", "Keep-Alive, Upgrade").unwrap();
        assert!(headers.has_token("connection", "keep-alive"));
        assert!(headers.has_token("Connection", "upgrade"));
        assert!(!headers.has_token("Connection", "close"));
        assert!(!headers.has_token("Transfer-Encoding", "chunked"));
    }

    #[test]
    fn test_invalid_header_name() {
        let mut headers = OrderedHeaderMap::new();
        assert_eq!(
            headers.insert("Invalid Header", "value"),
            Err(NetError::InvalidArgument)
        );
    }

    #[test]
    fn test_invalid_header_value() {
        let mut headers = OrderedHeaderMap::new();
        assert!(headers.insert("Valid", "invalid\r\nInjected: yes").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_to_header_map() {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Host", "example.com").unwrap();
        headers.insert("Accept", "text/html").unwrap();

        let map = headers.to_header_map();
        let names: Vec<_> = map.keys().collect();
        assert_eq!(names[0].as_str(), "host");
        assert_eq!(map.len(), 2);
    }
}
