//! HTTP method helpers shared by the registration surfaces.
//!
//! Methods are plain [`http::Method`] values. This module owns the list of
//! verbs that get a named registration function (`get`, `post`, ...) on
//! [`Route`](crate::Route) and [`Application`](crate::Application), and the
//! rule that lets `HEAD` fall back to `GET` handlers.

use http::Method;

/// Invokes `$m!` with every `name => CONSTANT` verb pair.
macro_rules! for_each_verb {
    ($m:ident) => {
        $m! {
            connect => CONNECT,
            delete  => DELETE,
            get     => GET,
            head    => HEAD,
            options => OPTIONS,
            patch   => PATCH,
            post    => POST,
            put     => PUT,
            trace   => TRACE,
        }
    };
}

pub(crate) use for_each_verb;

/// Parses a method token. Accepts extension methods such as `PURGE`.
///
/// Lowercase input is upper-cased first, so `"get"` and `"GET"` name the
/// same method.
pub(crate) fn parse(token: &str) -> Option<Method> {
    if token.is_empty() {
        return None;
    }
    Method::from_bytes(token.to_ascii_uppercase().as_bytes()).ok()
}

/// The method used to pick handlers: `HEAD` runs the `GET` handlers unless
/// `HEAD` handlers were registered explicitly.
pub(crate) fn effective(requested: &Method, has_head: bool) -> Method {
    if *requested == Method::HEAD && !has_head {
        Method::GET
    } else {
        requested.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_standard_and_extension_tokens() {
        assert_eq!(parse("get"), Some(Method::GET));
        assert_eq!(parse("PURGE").unwrap().as_str(), "PURGE");
        assert_eq!(parse(""), None);
        assert_eq!(parse("GE T"), None);
    }

    #[test]
    fn head_falls_back_to_get_only_without_head_handlers() {
        assert_eq!(effective(&Method::HEAD, false), Method::GET);
        assert_eq!(effective(&Method::HEAD, true), Method::HEAD);
        assert_eq!(effective(&Method::POST, false), Method::POST);
    }
}
