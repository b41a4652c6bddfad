//! Relaying identity cookie mutations onto HTTP headers.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use super::gate::GateError;
use crate::identity::CookieMutation;

/// Append one `Set-Cookie` header per mutation.
pub fn append_set_cookies(
    headers: &mut HeaderMap,
    mutations: &[CookieMutation],
) -> Result<(), GateError> {
    for mutation in mutations {
        let value = HeaderValue::from_str(&mutation.to_set_cookie()).map_err(|source| {
            GateError::CookieWrite {
                name: mutation.name().to_owned(),
                source,
            }
        })?;
        headers.append(SET_COOKIE, value);
    }
    Ok(())
}

/// Drop mutations for cookies the downstream response already sets.
///
/// Browsers apply `Set-Cookie` headers in order, so a gate mutation written
/// after the handler's own header would override it.
pub fn without_downstream_overrides(
    headers: &HeaderMap,
    mutations: Vec<CookieMutation>,
) -> Vec<CookieMutation> {
    let written: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .map(|c| c.name().to_owned())
        .collect();
    if written.is_empty() {
        return mutations;
    }

    mutations
        .into_iter()
        .filter(|m| !written.iter().any(|name| name == m.name()))
        .collect()
}

/// Rewrite the request's `Cookie` header so downstream handlers see the
/// mutated cookie set.
pub fn forward_request_cookies(
    headers: &mut HeaderMap,
    jar: &CookieJar,
    mutations: &[CookieMutation],
) -> Result<(), GateError> {
    if mutations.is_empty() {
        return Ok(());
    }

    let jar = mutations
        .iter()
        .fold(jar.clone(), |jar, mutation| mutation.apply(jar));

    let rendered = jar
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ");

    headers.remove(COOKIE);
    if rendered.is_empty() {
        return Ok(());
    }

    let value = HeaderValue::from_str(&rendered).map_err(|source| GateError::CookieWrite {
        name: COOKIE.as_str().to_owned(),
        source,
    })?;
    headers.insert(COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_set_cookies_one_header_each() {
        let mut headers = HeaderMap::new();
        let mutations = vec![
            CookieMutation::Set(Cookie::new("a", "1")),
            CookieMutation::Remove(Cookie::new("b", "")),
        ];
        append_set_cookies(&mut headers, &mutations).unwrap();

        let values: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values[0].starts_with("a=1"));
        assert!(values[1].starts_with("b="));
        assert!(values[1].contains("Max-Age=0"));
    }

    #[test]
    fn test_unencodable_cookie_is_a_write_fault() {
        let mut headers = HeaderMap::new();
        let mutations = vec![CookieMutation::Set(Cookie::new("bad", "line\nbreak"))];
        let err = append_set_cookies(&mut headers, &mutations).unwrap_err();
        assert!(matches!(err, GateError::CookieWrite { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_forward_request_cookies_merges() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("wp-access-token=old; theme=dark"));
        let jar = CookieJar::from_headers(&headers);

        let mutations = vec![CookieMutation::Set(Cookie::new("wp-access-token", "new"))];
        forward_request_cookies(&mut headers, &jar, &mutations).unwrap();

        let forwarded = CookieJar::from_headers(&headers);
        assert_eq!(forwarded.get("wp-access-token").map(Cookie::value), Some("new"));
        assert_eq!(forwarded.get("theme").map(Cookie::value), Some("dark"));
    }

    #[test]
    fn test_forward_request_cookies_drops_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("wp-access-token=old"));
        let jar = CookieJar::from_headers(&headers);

        let mutations = vec![CookieMutation::Remove(Cookie::new("wp-access-token", ""))];
        forward_request_cookies(&mut headers, &jar, &mutations).unwrap();
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_handler_cookies_win_over_gate_mutations() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("wp-access-token=; Path=/; Max-Age=0"),
        );
        let mutations = vec![
            CookieMutation::Set(Cookie::new("wp-access-token", "renewed")),
            CookieMutation::Set(Cookie::new("wp-refresh-token", "renewed")),
        ];

        let kept = without_downstream_overrides(&headers, mutations);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name(), "wp-refresh-token");
    }

    #[test]
    fn test_no_handler_cookies_keeps_all_mutations() {
        let mutations = vec![CookieMutation::Set(Cookie::new("wp-access-token", "renewed"))];
        let kept = without_downstream_overrides(&HeaderMap::new(), mutations);
        assert_eq!(kept.len(), 1);
    }
}
