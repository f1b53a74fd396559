//! Unit tests for CLI commands

use std::io::Write;

use clap::Parser;

use crate::cli::{execute, Cli, Commands};

const MANIFEST: &str = r#"
controllers:
  - name: BookController
    prefix: shop
    actions:
      - name: book_detail
        route: books/{int:id}.html
      - name: book_list
        route: books/list
"#;

fn manifest_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn run(args: &[&str]) -> (anyhow::Result<()>, String) {
    let cli = Cli::try_parse_from(args).unwrap();
    let mut out = Vec::new();
    let result = execute(&cli, &mut out);
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn test_all_commands_parse() {
    let cli = Cli::try_parse_from(["razor", "--manifest", "m.yaml", "match", "GET", "/x"]).unwrap();
    assert_eq!(
        cli.command,
        Commands::Match {
            method: "GET".to_string(),
            path: "/x".to_string()
        }
    );
    assert_eq!(cli.manifest.to_string_lossy(), "m.yaml");
    assert!(Cli::try_parse_from(["razor", "check"]).is_ok());
    assert!(Cli::try_parse_from(["razor", "routes", "-v"]).is_ok());
    assert!(Cli::try_parse_from(["razor", "match", "GET"]).is_err());
}

#[test]
fn test_check_ok() {
    let file = manifest_file(MANIFEST);
    let path = file.path().to_str().unwrap();
    let (result, out) = run(&["razor", "--manifest", path, "check"]);
    assert!(result.is_ok());
    assert_eq!(out.trim(), "ok: 2 routes (1 generic)");
}

#[test]
fn test_check_reports_every_problem() {
    let file = manifest_file(
        r#"
controllers:
  - name: C
    actions:
      - { name: a, route: "x/{int:id" }
      - { name: b, route: y }
      - { name: c, route: y }
"#,
    );
    let path = file.path().to_str().unwrap();
    let (result, out) = run(&["razor", "--manifest", path, "check"]);
    assert!(result.is_err());
    assert_eq!(out.lines().filter(|l| l.starts_with("error:")).count(), 2);
    assert!(out.contains("C::c"));
}

#[test]
fn test_match_prints_params() {
    let file = manifest_file(MANIFEST);
    let path = file.path().to_str().unwrap();
    let (result, out) = run(&["razor", "--manifest", path, "match", "get", "/shop/books/12.html"]);
    assert!(result.is_ok());
    assert!(out.contains("-> BookController::book_detail"));
    assert!(out.contains("id (int) = 12"));

    let (_, out) = run(&["razor", "--manifest", path, "match", "GET", "/nowhere"]);
    assert_eq!(out.trim(), "no match for GET /nowhere");
}

#[test]
fn test_routes_lists_fixed_then_generic() {
    let file = manifest_file(MANIFEST);
    let path = file.path().to_str().unwrap();
    let (_, out) = run(&["razor", "--manifest", path, "routes"]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("/shop/books/list"));
    assert!(lines[1].contains("/shop/books/{int:id}.html"));
}

#[test]
fn test_missing_manifest_is_error() {
    let (result, _) = run(&["razor", "--manifest", "/definitely/not/here.yaml", "routes"]);
    assert!(result.is_err());
}
