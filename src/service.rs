//! Service base URL selection
//!
//! A service reachable under several public URLs advertises documentation
//! links relative to whichever URL the client used. These helpers pick that
//! URL from the configured list.

use url::Url;

use crate::config::ServiceConfig;

/// Host, port and path of a URL with trailing slashes removed
fn base_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            let authority = match parsed.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            format!("{}{}", authority, parsed.path())
                .trim_end_matches('/')
                .to_string()
        }
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

/// Pick the allowed URL matching `request_url`, falling back to the first
///
/// Scheme and query are ignored when matching. The result never ends in `/`.
pub fn service_base_url(allowed: &[String], request_url: &str) -> Option<String> {
    let requested = base_key(request_url);
    allowed
        .iter()
        .find(|candidate| base_key(candidate) == requested)
        .or_else(|| allowed.first())
        .map(|url| url.trim_end_matches('/').to_string())
}

/// Base for resolving relative documentation links seen through `request_url`
pub fn documentation_base(config: &ServiceConfig, request_url: &str) -> Option<Url> {
    let base = service_base_url(&config.allowed_urls, request_url)?;
    // a trailing slash keeps the last path segment when joining
    Url::parse(&format!("{}/", base)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec![
            "https://ows.example.org/wms/".to_string(),
            "https://ows-alt.example.org:8443/wms".to_string(),
        ]
    }

    #[test]
    fn test_matching_url_selected() {
        assert_eq!(
            service_base_url(&allowed(), "http://ows-alt.example.org:8443/wms?request=GetCapabilities"),
            Some("https://ows-alt.example.org:8443/wms".to_string())
        );
    }

    #[test]
    fn test_falls_back_to_first() {
        assert_eq!(
            service_base_url(&allowed(), "https://elsewhere.example.org/wms"),
            Some("https://ows.example.org/wms".to_string())
        );
        assert_eq!(service_base_url(&[], "https://ows.example.org/wms"), None);
    }

    #[test]
    fn test_documentation_base_joins_under_service_path() {
        let config = ServiceConfig {
            allowed_urls: allowed(),
        };
        let base = documentation_base(&config, "https://ows.example.org/wms").unwrap();
        assert_eq!(base.join("docs/ext").unwrap().as_str(), "https://ows.example.org/wms/docs/ext");
    }
}
