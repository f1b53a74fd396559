//! YAML route manifests.
//!
//! A manifest lists controllers and their action routes without any code,
//! so route tables can be checked and inspected offline (see the `razor`
//! binary):
//!
//! ```yaml
//! controllers:
//!   - name: BookController
//!     prefix: shop
//!     actions:
//!       - name: book_detail
//!         route: books/{int:id}.html
//!       - name: create_book
//!         verb: POST
//!         route: books
//! ```
//!
//! `prefix` defaults to `/` and `verb` to `GET`.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::router::{compile, CompileError, Route, RouteError, Router, Verb};

fn default_prefix() -> String {
    "/".to_string()
}

fn default_verb() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteManifest {
    #[serde(default)]
    pub controllers: Vec<ManifestController>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestController {
    pub name: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub actions: Vec<ManifestAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAction {
    pub name: String,
    #[serde(default = "default_verb")]
    pub verb: String,
    pub route: String,
}

/// Route payload of a manifest router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTarget {
    pub controller: String,
    pub action: String,
}

impl fmt::Display for ManifestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.controller, self.action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestProblem {
    UnknownVerb(String),
    Compile(CompileError),
    Duplicate(RouteError),
}

impl fmt::Display for ManifestProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestProblem::UnknownVerb(verb) => write!(f, "unknown verb '{verb}'"),
            ManifestProblem::Compile(e) => write!(f, "{e}"),
            ManifestProblem::Duplicate(e) => write!(f, "{e}"),
        }
    }
}

/// A rejected manifest route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIssue {
    pub controller: String,
    pub action: String,
    pub route: String,
    pub problem: ManifestProblem,
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{} ('{}'): {}",
            self.controller, self.action, self.route, self.problem
        )
    }
}

impl RouteManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid route manifest")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest = Self::from_yaml(&raw)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        info!(
            path = %path.display(),
            controllers = manifest.controllers.len(),
            actions = manifest.action_count(),
            "Route manifest loaded"
        );
        Ok(manifest)
    }

    pub fn action_count(&self) -> usize {
        self.controllers.iter().map(|c| c.actions.len()).sum()
    }

    /// Compile and register every route. All problems are collected; the
    /// router holds every route that was accepted.
    pub fn build_router(&self) -> (Router<ManifestTarget>, Vec<ManifestIssue>) {
        let mut router = Router::new();
        let mut issues = Vec::new();

        for controller in &self.controllers {
            for action in &controller.actions {
                let issue = |problem: ManifestProblem| ManifestIssue {
                    controller: controller.name.clone(),
                    action: action.name.clone(),
                    route: action.route.clone(),
                    problem,
                };

                let Some(verb) = Verb::parse(&action.verb) else {
                    issues.push(issue(ManifestProblem::UnknownVerb(action.verb.clone())));
                    continue;
                };
                let compiled = match compile(&controller.prefix, &action.route) {
                    Ok(compiled) => compiled,
                    Err(e) => {
                        issues.push(issue(ManifestProblem::Compile(e)));
                        continue;
                    }
                };
                debug!(
                    controller = %controller.name,
                    action = %action.name,
                    full_path = %compiled.full_path(),
                    verb = %verb,
                    "Manifest route compiled"
                );
                let target = ManifestTarget {
                    controller: controller.name.clone(),
                    action: action.name.clone(),
                };
                if let Err(e) = router.register(Route::new(compiled, verb, target)) {
                    issues.push(issue(ManifestProblem::Duplicate(e)));
                }
            }
        }
        (router, issues)
    }
}
