//! `BuildUpstreamURL` (spec.md §4.A). Vendor-agnostic: strips the internal
//! `/proxy/<group-name>` prefix, drops the `id` query parameter used for
//! single-credential addressing, and appends the remainder to the selected
//! upstream base. Grounded on the `build_url` helper repeated verbatim in
//! every `gproxy-provider-impl` provider module, generalized from a
//! fixed-path join to a full incoming-request passthrough.

use crate::ChannelError;

pub fn build_upstream_url(
    upstream_base: &str,
    group_name: &str,
    request_path_and_query: &str,
) -> Result<String, ChannelError> {
    let base = upstream_base.trim();
    if base.is_empty() {
        return Err(ChannelError::NoUpstreamConfigured);
    }
    let base = base.trim_end_matches('/');

    let prefix = format!("/proxy/{group_name}");
    let stripped = request_path_and_query
        .strip_prefix(&prefix)
        .unwrap_or(request_path_and_query);

    let (path, query) = match stripped.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (stripped, None),
    };
    let path = if path.is_empty() { "/" } else { path };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let mut url = format!("{base}{path}");
    if let Some(query) = query {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| pair.split('=').next() != Some("id"))
            .collect();
        if !kept.is_empty() {
            url.push('?');
            url.push_str(&kept.join("&"));
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_internal_proxy_prefix() {
        let url = build_upstream_url(
            "https://api.openai.com",
            "prod",
            "/proxy/prod/v1/chat/completions",
        )
        .unwrap();
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn drops_id_query_param_but_keeps_others() {
        let url = build_upstream_url(
            "https://api.openai.com",
            "prod",
            "/proxy/prod/v1/chat/completions?id=7&foo=bar",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://api.openai.com/v1/chat/completions?foo=bar"
        );
    }

    #[test]
    fn drops_query_entirely_when_id_is_the_only_param() {
        let url =
            build_upstream_url("https://api.openai.com", "prod", "/proxy/prod/v1/models?id=3")
                .unwrap();
        assert_eq!(url, "https://api.openai.com/v1/models");
    }

    #[test]
    fn rejects_empty_upstream_base() {
        assert!(matches!(
            build_upstream_url("", "prod", "/proxy/prod/v1/models"),
            Err(ChannelError::NoUpstreamConfigured)
        ));
    }

    #[test]
    fn passes_through_path_unchanged_when_prefix_absent() {
        let url = build_upstream_url("https://api.openai.com", "prod", "/v1/models").unwrap();
        assert_eq!(url, "https://api.openai.com/v1/models");
    }
}
