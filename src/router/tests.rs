use super::{compile, CompileError, ParamKind, ParamValue, Route, RouteError, Router, Verb};
use http::Method;

fn router_with(routes: &[(&str, &str, Verb, &'static str)]) -> Router<&'static str> {
    let mut router = Router::new();
    for (prefix, template, verb, target) in routes {
        let compiled = compile(prefix, template).unwrap();
        router.register(Route::new(compiled, *verb, *target)).unwrap();
    }
    router
}

#[test]
fn test_root_path() {
    let route = compile("/", "").unwrap();
    assert!(route.is_match("/"));
    assert!(route.params().is_empty());
}

#[test]
fn test_parameterized_path() {
    let route = compile("/items", "{id}").unwrap();
    assert!(route.is_match("/items/abc-1"));
    assert_eq!(route.params().len(), 1);
    assert_eq!(&*route.params()[0].name, "id");
    assert_eq!(route.params()[0].kind, ParamKind::String);
}

#[test]
fn test_nested_path() {
    let route = compile("/a", "{b}/c").unwrap();
    assert!(route.is_match("/a/1/c"));
    assert!(!route.is_match("/a/1/d"));
}

#[test]
fn test_int_placeholder_rejects_letters() {
    let route = compile("shop", "books/{int:id}.html").unwrap();
    assert_eq!(route.full_path(), "/shop/books/{int:id}.html");
    assert!(route.is_match("/shop/books/42.html"));
    assert!(!route.is_match("/shop/books/abc.html"));
}

#[test]
fn test_wildcard_matches_empty_and_nested_tails() {
    let route = compile("generic", "*").unwrap();
    assert!(route.is_generic());
    assert!(route.params().is_empty());
    assert!(route.is_match("/generic/"));
    assert!(route.is_match("/generic/a/b.c"));
    assert!(!route.is_match("/other/a"));
}

#[test]
fn test_round_trip_extraction() {
    let route = compile("/users", "{int:user}/posts/{slug}").unwrap();
    let params = route.captures("/users/7/posts/hello-world").unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].value, ParamValue::Int(7));
    assert_eq!(params[1].value, ParamValue::Str("hello-world".to_string()));
}

#[test]
fn test_compile_errors() {
    assert!(matches!(
        compile("bad prefix", "x"),
        Err(CompileError::InvalidPrefix { .. })
    ));
    assert!(matches!(
        compile("/", "{id"),
        Err(CompileError::UnclosedPlaceholder { .. })
    ));
    assert!(matches!(
        compile("/", "a}"),
        Err(CompileError::UnexpectedBrace { .. })
    ));
    assert!(matches!(
        compile("/", "{a{b}}"),
        Err(CompileError::UnexpectedBrace { .. })
    ));
    assert!(matches!(
        compile("/", "{int:}"),
        Err(CompileError::EmptyParamName { .. })
    ));
    assert!(matches!(
        compile("/", "{my-id}"),
        Err(CompileError::InvalidParamName { .. })
    ));
    assert!(matches!(
        compile("/", "{id}/{int:id}"),
        Err(CompileError::DuplicateParam { .. })
    ));
    assert!(matches!(
        compile("/", "/leading"),
        Err(CompileError::InvalidTemplate { .. })
    ));
    assert!(matches!(
        compile("/", "has space"),
        Err(CompileError::InvalidTemplate { .. })
    ));
}

#[test]
fn test_fixed_route_beats_generic() {
    let router = router_with(&[
        ("/shop", "books/{slug}", Verb::Get, "generic"),
        ("/shop", "books/new", Verb::Get, "fixed"),
    ]);
    let hit = router.resolve("/shop/books/new", &Method::GET).unwrap();
    assert_eq!(*hit.target(), "fixed");
    let hit = router.resolve("/shop/books/old", &Method::GET).unwrap();
    assert_eq!(*hit.target(), "generic");
}

#[test]
fn test_exact_verb_beats_all() {
    let router = router_with(&[
        ("/a", "b", Verb::All, "any"),
        ("/a", "b", Verb::Post, "post"),
    ]);
    assert_eq!(*router.resolve("/a/b", &Method::POST).unwrap().target(), "post");
    assert_eq!(*router.resolve("/a/b", &Method::GET).unwrap().target(), "any");
}

#[test]
fn test_generic_respects_verb() {
    let router = router_with(&[("/a", "{x}", Verb::Post, "post")]);
    assert!(router.resolve("/a/1", &Method::GET).is_none());
    assert!(router.resolve("/a/1", &Method::POST).is_some());
}

#[test]
fn test_first_generic_registered_wins() {
    let router = router_with(&[
        ("/p", "{a}", Verb::Get, "first"),
        ("/p", "{b}", Verb::Get, "second"),
    ]);
    let hit = router.resolve("/p/x", &Method::GET).unwrap();
    assert_eq!(*hit.target(), "first");
    assert_eq!(hit.get_param("a"), Some(&ParamValue::Str("x".into())));
}

#[test]
fn test_duplicate_fixed_route_is_rejected() {
    let mut router = Router::new();
    router
        .register(Route::new(compile("/x", "y").unwrap(), Verb::Get, 1))
        .unwrap();
    let err = router
        .register(Route::new(compile("/x", "y").unwrap(), Verb::Get, 2))
        .unwrap_err();
    assert_eq!(
        err,
        RouteError::DuplicateRoute {
            hash_key: "/x/y::GET".to_string()
        }
    );
    // Same path, different verb is fine
    router
        .register(Route::new(compile("/x", "y").unwrap(), Verb::Put, 3))
        .unwrap();
    assert_eq!(router.len(), 2);
}

#[test]
fn test_routes_listing_order() {
    let router = router_with(&[
        ("/z", "{id}", Verb::Get, "g1"),
        ("/b", "", Verb::Get, "f2"),
        ("/a", "", Verb::Get, "f1"),
        ("/y", "*", Verb::All, "g2"),
    ]);
    let targets: Vec<&str> = router.routes().iter().map(|r| *r.target()).collect();
    assert_eq!(targets, vec!["f1", "f2", "g1", "g2"]);
}

#[test]
fn test_verb_parse_and_accepts() {
    assert_eq!(Verb::parse("get"), Some(Verb::Get));
    assert_eq!(Verb::parse("All"), Some(Verb::All));
    assert_eq!(Verb::parse("PATCH"), None);
    assert!(Verb::All.accepts(&Method::DELETE));
    assert!(!Verb::Get.accepts(&Method::HEAD));
}
