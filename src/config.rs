use std::net::SocketAddr;
use tracing::debug;

/// Upstream endpoints, overridable per source so tests can point adapters
/// at a local mock server.
#[derive(Debug, Clone)]
pub struct SourceEndpoints {
    pub fundgz: String,
    pub xueqiu: String,
    pub eastmoney: String,
    pub pingzhong: String,
    pub tushare: String,
    pub suggest: String,
    pub catalog: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        SourceEndpoints {
            fundgz: "https://fundgz.1234567.com.cn".to_string(),
            xueqiu: "https://stock.xueqiu.com".to_string(),
            eastmoney: "https://api.fund.eastmoney.com".to_string(),
            pingzhong: "https://fund.eastmoney.com".to_string(),
            tushare: "https://api.tushare.pro".to_string(),
            suggest: "https://fundsuggest.eastmoney.com".to_string(),
            catalog: "https://fund.eastmoney.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub estimate_ttl_secs: u64,
    pub nav_ttl_secs: u64,
    pub watch_codes: Vec<String>,
    pub tushare_token: Option<String>,
    pub xueqiu_cookie: Option<String>,
    pub endpoints: SourceEndpoints,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        debug!("Resolving configuration from environment");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration from a key lookup. The seam keeps config
    /// parsing testable without touching process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SourceEndpoints::default();
        let endpoints = SourceEndpoints {
            fundgz: base_url(get("BACKEND_FUNDGZ_BASE_URL"), defaults.fundgz),
            xueqiu: base_url(get("BACKEND_XUEQIU_BASE_URL"), defaults.xueqiu),
            eastmoney: base_url(get("BACKEND_EASTMONEY_BASE_URL"), defaults.eastmoney),
            pingzhong: base_url(get("BACKEND_PINGZHONG_BASE_URL"), defaults.pingzhong),
            tushare: base_url(get("BACKEND_TUSHARE_BASE_URL"), defaults.tushare),
            suggest: base_url(get("BACKEND_SUGGEST_BASE_URL"), defaults.suggest),
            catalog: base_url(get("BACKEND_CATALOG_BASE_URL"), defaults.catalog),
        };

        AppConfig {
            listen_addr: get("BACKEND_LISTEN_ADDR")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_listen_addr),
            allowed_origins: {
                let origins = parse_list(get("BACKEND_ALLOWED_ORIGINS"));
                if origins.is_empty() {
                    vec!["*".to_string()]
                } else {
                    origins
                }
            },
            estimate_ttl_secs: parse_u64(get("BACKEND_CACHE_TTL_EST"), 3),
            nav_ttl_secs: parse_u64(get("BACKEND_CACHE_TTL_NAV"), 3600),
            watch_codes: parse_list(get("BACKEND_WATCH_CODES")),
            tushare_token: non_empty(get("TUSHARE_TOKEN")),
            xueqiu_cookie: non_empty(get("XUEQIU_COOKIE")),
            endpoints,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn base_url(value: Option<String>, default: String) -> String {
    non_empty(value)
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None);

        assert_eq!(config.listen_addr, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.allowed_origins, vec!["*".to_string()]);
        assert_eq!(config.estimate_ttl_secs, 3);
        assert_eq!(config.nav_ttl_secs, 3600);
        assert!(config.watch_codes.is_empty());
        assert!(config.tushare_token.is_none());
        assert!(config.xueqiu_cookie.is_none());
        assert_eq!(config.endpoints.fundgz, "https://fundgz.1234567.com.cn");
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BACKEND_LISTEN_ADDR", "127.0.0.1:9000"),
            ("BACKEND_ALLOWED_ORIGINS", "http://a.test, http://b.test"),
            ("BACKEND_CACHE_TTL_EST", "10"),
            ("BACKEND_WATCH_CODES", "110022, 161725,"),
            ("TUSHARE_TOKEN", "  tok  "),
            ("BACKEND_FUNDGZ_BASE_URL", "http://localhost:1234/"),
        ]));

        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            config.allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(config.estimate_ttl_secs, 10);
        assert_eq!(config.nav_ttl_secs, 3600);
        assert_eq!(
            config.watch_codes,
            vec!["110022".to_string(), "161725".to_string()]
        );
        assert_eq!(config.tushare_token.as_deref(), Some("tok"));
        assert_eq!(config.endpoints.fundgz, "http://localhost:1234");
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BACKEND_CACHE_TTL_EST", "not-a-number"),
            ("BACKEND_LISTEN_ADDR", "nope"),
            ("XUEQIU_COOKIE", "   "),
        ]));

        assert_eq!(config.estimate_ttl_secs, 3);
        assert_eq!(config.listen_addr, "0.0.0.0:8000".parse().unwrap());
        assert!(config.xueqiu_cookie.is_none());
    }
}
