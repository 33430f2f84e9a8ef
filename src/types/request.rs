//! Per-request options passed through the gateway verbs

use typed_builder::TypedBuilder;

/// Extra query parameters and headers for a single gateway call
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for RequestOptions"),
    builder_type(doc = "Builder for RequestOptions", vis = "pub"),
    build_method(doc = "Build the RequestOptions")
)]
pub struct RequestOptions {
    /// Query string parameters, appended in order
    #[builder(default, setter(into))]
    pub query: Vec<(String, String)>,

    /// Additional request headers (Authorization cannot be overridden)
    #[builder(default, setter(into))]
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// Options carrying only query parameters
    pub fn with_query<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            headers: Vec::new(),
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query() {
        let opts = RequestOptions::with_query([("jql", "project = ABC"), ("maxResults", "50")]);
        assert_eq!(opts.query.len(), 2);
        assert_eq!(opts.query[0], ("jql".to_string(), "project = ABC".to_string()));
        assert!(opts.headers.is_empty());
    }

    #[test]
    fn test_builder_and_chaining() {
        let opts = RequestOptions::builder()
            .headers(vec![("X-Atlassian-Token".to_string(), "no-check".to_string())])
            .build()
            .query_param("expand", "body.storage");
        assert_eq!(opts.headers.len(), 1);
        assert_eq!(opts.query, vec![("expand".to_string(), "body.storage".to_string())]);
    }
}
