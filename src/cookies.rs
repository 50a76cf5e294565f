use axum::http::{header, HeaderMap};

/// Attributes applied to the session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub name: String,
    pub secure: bool,
    pub max_age_secs: i64,
}

impl CookieOptions {
    /// Build a Set-Cookie value carrying a session token.
    pub fn build_set_cookie(&self, value: &str) -> String {
        let mut cookie = format!("{}={}; HttpOnly; SameSite=Lax; Path=/", self.name, value);
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str(&format!("; Max-Age={}", self.max_age_secs));
        cookie
    }

    /// Build a Set-Cookie value that expires the cookie immediately.
    pub fn build_delete_cookie(&self) -> String {
        format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", self.name)
    }
}

/// Extract a cookie value from request headers.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            if key == name {
                Some(value.to_string())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn set_cookie_carries_session_attributes() {
        let opts = CookieOptions {
            name: "flock_session".into(),
            secure: true,
            max_age_secs: 3600,
        };
        let cookie = opts.build_set_cookie("tok123");
        assert!(cookie.starts_with("flock_session=tok123"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[test]
    fn delete_cookie_zeroes_max_age() {
        let opts = CookieOptions {
            name: "flock_session".into(),
            secure: false,
            max_age_secs: 3600,
        };
        let cookie = opts.build_delete_cookie();
        assert!(cookie.starts_with("flock_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn extract_finds_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; flock_session=abc123; other=xyz"),
        );
        assert_eq!(
            extract_cookie(&headers, "flock_session"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_cookie(&headers, "foo"), Some("bar".to_string()));
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }
}
