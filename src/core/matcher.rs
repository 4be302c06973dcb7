use std::collections::HashMap;

use crate::models::{Method, Route, Segment};

/// Walk the routing table in declaration order and return the first route
/// whose method and segment list match the request path, together with the
/// bound (URL-decoded) path variables. Tie-break is purely positional.
pub fn match_route<'a>(
    routes: &'a [Route],
    method: Method,
    path: &str,
) -> Option<(&'a Route, HashMap<String, String>)> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    'routes: for route in routes {
        if route.method != method || route.pattern.segments.len() != segments.len() {
            continue;
        }
        let mut vars = HashMap::new();
        for (pat, seg) in route.pattern.segments.iter().zip(&segments) {
            match pat {
                Segment::Atom(text) => {
                    if text != seg {
                        continue 'routes;
                    }
                }
                Segment::Var(name) => {
                    let decoded = urlencoding::decode(seg)
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| (*seg).to_string());
                    vars.insert(name.clone(), decoded);
                }
            }
        }
        return Some((route, vars));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_routes;

    fn table() -> Vec<Route> {
        parse_routes(concat!(
            "GET photo/:id {..} {\"which\": \"item\"}\n",
            "GET photo/:id {..} {\"which\": \"shadowed\"}\n",
            "GET photo {..} {\"which\": \"list\"}\n",
            "DELETE photo/:id/tag/:tag {..} {\"which\": \"untag\"}\n",
        ))
        .unwrap()
    }

    fn static_which(route: &Route) -> &str {
        match &route.action {
            crate::models::Action::Static(v) => v["which"].as_str().unwrap(),
            _ => panic!("expected static action"),
        }
    }

    #[test]
    fn test_first_match_wins() {
        let routes = table();
        let (route, vars) = match_route(&routes, Method::Get, "/photo/42").unwrap();
        assert_eq!(static_which(route), "item");
        assert_eq!(vars["id"], "42");
    }

    #[test]
    fn test_leading_slash_optional() {
        let routes = table();
        assert!(match_route(&routes, Method::Get, "photo/42").is_some());
        assert!(match_route(&routes, Method::Get, "/photo").is_some());
    }

    #[test]
    fn test_method_and_length_must_match() {
        let routes = table();
        assert!(match_route(&routes, Method::Post, "/photo/42").is_none());
        assert!(match_route(&routes, Method::Get, "/photo/42/extra").is_none());
    }

    #[test]
    fn test_variables_reconstruct_path() {
        let routes = table();
        let (route, vars) =
            match_route(&routes, Method::Delete, "/photo/42/tag/sunset").unwrap();
        assert_eq!(static_which(route), "untag");
        assert_eq!(vars.len(), 2);
        let rebuilt = format!("photo/{}/tag/{}", vars["id"], vars["tag"]);
        assert_eq!(rebuilt, "photo/42/tag/sunset");
    }

    #[test]
    fn test_variables_are_url_decoded() {
        let routes = table();
        let (_, vars) = match_route(&routes, Method::Get, "/photo/a%20b").unwrap();
        assert_eq!(vars["id"], "a b");
    }

    #[test]
    fn test_atoms_are_case_sensitive() {
        let routes = table();
        assert!(match_route(&routes, Method::Get, "/Photo/42").is_none());
    }
}
