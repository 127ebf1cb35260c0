//! Deterministic stack detection from manifests and the file tree.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::extract::KeyFile;

/// Languages at or below this share of the total are dropped.
const LANGUAGE_SHARE_THRESHOLD: f64 = 0.03;

/// Technologies detected in a repository, grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackReport {
    /// Languages above the share threshold, largest first.
    pub languages: Vec<String>,
    /// Language runtimes implied by manifests.
    pub runtimes: Vec<String>,
    /// UI frameworks.
    pub frontend: Vec<String>,
    /// Server frameworks and async runtimes.
    pub backend: Vec<String>,
    /// Database drivers and ORMs.
    pub databases: Vec<String>,
    /// Test, lint and build tooling.
    pub tooling: Vec<String>,
    /// Deployment and CI.
    pub infra: Vec<String>,
    /// Package managers.
    pub package_managers: Vec<String>,
}

impl StackReport {
    /// `true` when nothing at all was detected.
    pub fn is_empty(&self) -> bool {
        self.sections().iter().all(|(_, items)| items.is_empty())
    }

    fn sections(&self) -> [(&'static str, &[String]); 8] {
        [
            ("Languages", self.languages.as_slice()),
            ("Runtime", self.runtimes.as_slice()),
            ("Frontend", self.frontend.as_slice()),
            ("Backend", self.backend.as_slice()),
            ("Databases / ORM", self.databases.as_slice()),
            ("Tooling", self.tooling.as_slice()),
            ("Infrastructure / Deploy", self.infra.as_slice()),
            ("Package Managers", self.package_managers.as_slice()),
        ]
    }

    /// Render the report under a `Stack summary for {name}` title.
    pub fn render(&self, name: &str) -> String {
        format!("Stack summary for {name}\n{self}")
    }
}

impl fmt::Display for StackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (title, items) in self.sections() {
            if items.is_empty() {
                continue;
            }
            writeln!(f, "\n{title}:")?;
            for item in items {
                writeln!(f, "- {item}")?;
            }
        }
        Ok(())
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Guess language byte shares for a tree that has no language API.
///
/// Each file counts as one unit for the language of its extension. The
/// result is ordered by count, then name.
///
/// # Examples
///
/// ```
/// use explain_signal::infer_languages;
///
/// let tree = vec!["src/main.rs".to_string(), "src/lib.rs".to_string(), "build.py".to_string()];
/// let langs = infer_languages(&tree);
/// assert_eq!(langs[0], ("Rust".to_string(), 2));
/// assert_eq!(langs[1], ("Python".to_string(), 1));
/// ```
pub fn infer_languages(tree: &[String]) -> Vec<(String, u64)> {
    let mut counts: HashMap<&'static str, u64> = HashMap::new();
    for path in tree {
        let Some((_, ext)) = path.rsplit_once('.') else {
            continue;
        };
        if let Some(lang) = language_for_extension(&ext.to_lowercase()) {
            *counts.entry(lang).or_default() += 1;
        }
    }

    let mut langs: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    langs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    langs
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "rs" => "Rust",
        "py" => "Python",
        "ts" | "tsx" => "TypeScript",
        "js" | "jsx" | "mjs" | "cjs" => "JavaScript",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "c" | "h" => "C",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "scala" => "Scala",
        "sh" | "bash" => "Shell",
        "html" | "htm" => "HTML",
        "css" | "scss" => "CSS",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "dart" => "Dart",
        "ex" | "exs" => "Elixir",
        "hs" => "Haskell",
        "lua" => "Lua",
        _ => return None,
    };
    Some(lang)
}

/// Detect the technology stack of a repository.
///
/// `languages` is a list of `(language, bytes)` pairs in the order they
/// should be reported (GitHub's languages endpoint, or [`infer_languages`]).
///
/// # Examples
///
/// ```
/// use explain_signal::{detect_stack, KeyFile};
///
/// let tree = vec!["Dockerfile".to_string(), "package.json".to_string()];
/// let files = vec![KeyFile {
///     path: "package.json".into(),
///     content: r#"{"dependencies":{"react":"18"}}"#.into(),
/// }];
/// let report = detect_stack(&[("TypeScript".into(), 100)], &tree, &files);
/// assert_eq!(report.frontend, vec!["React"]);
/// assert_eq!(report.infra, vec!["Docker"]);
/// ```
pub fn detect_stack(
    languages: &[(String, u64)],
    tree: &[String],
    key_files: &[KeyFile],
) -> StackReport {
    let mut report = StackReport::default();

    let total: u64 = languages.iter().map(|(_, bytes)| bytes).sum();
    if total > 0 {
        report.languages = languages
            .iter()
            .filter(|(_, bytes)| *bytes as f64 / total as f64 > LANGUAGE_SHARE_THRESHOLD)
            .map(|(name, _)| name.clone())
            .collect();
    }

    let paths: Vec<String> = tree.iter().map(|p| p.to_lowercase()).collect();
    let has = |name: &str| paths.iter().any(|p| p == name);

    if has("dockerfile") {
        push_unique(&mut report.infra, "Docker");
    }
    if has("docker-compose.yml") || has("docker-compose.yaml") {
        push_unique(&mut report.infra, "Docker Compose");
    }
    if has("vercel.json") {
        push_unique(&mut report.infra, "Vercel");
    }
    if has("netlify.toml") {
        push_unique(&mut report.infra, "Netlify");
    }
    if paths.iter().any(|p| p.starts_with(".github/workflows")) {
        push_unique(&mut report.infra, "GitHub Actions");
    }

    if let Some(pkg) = manifest(key_files, "package.json") {
        detect_node(&mut report, &pkg.content, &has);
    }
    if let Some(cargo) = manifest(key_files, "cargo.toml") {
        detect_rust(&mut report, &cargo.content);
    }
    let pyproject = manifest(key_files, "pyproject.toml");
    let requirements = manifest(key_files, "requirements.txt");
    if pyproject.is_some() || requirements.is_some() {
        detect_python(
            &mut report,
            pyproject.map(|f| f.content.as_str()),
            requirements.map(|f| f.content.as_str()),
            &has,
        );
    }
    if let Some(gomod) = manifest(key_files, "go.mod") {
        detect_go(&mut report, &gomod.content);
    }

    report
}

/// Prefer the root-level manifest, else the first one discovered.
fn manifest<'a>(key_files: &'a [KeyFile], basename: &str) -> Option<&'a KeyFile> {
    key_files
        .iter()
        .find(|f| f.path.to_lowercase() == basename)
        .or_else(|| key_files.iter().find(|f| f.basename() == basename))
}

fn detect_node(report: &mut StackReport, content: &str, has: &dyn Fn(&str) -> bool) {
    push_unique(&mut report.runtimes, "Node.js");
    let manager = if has("pnpm-lock.yaml") {
        "pnpm"
    } else if has("yarn.lock") {
        "Yarn"
    } else if has("bun.lockb") {
        "Bun"
    } else {
        "npm"
    };
    push_unique(&mut report.package_managers, manager);

    // Unparseable manifests still tell us the runtime.
    let Ok(pkg) = serde_json::from_str::<serde_json::Value>(content) else {
        return;
    };
    let deps: Vec<&str> = ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|section| pkg.get(section).and_then(|v| v.as_object()))
        .flat_map(|map| map.keys().map(String::as_str))
        .collect();

    let rules: &[(&str, &str, Bucket)] = &[
        ("react", "React", Bucket::Frontend),
        ("next", "Next.js", Bucket::Frontend),
        ("vue", "Vue", Bucket::Frontend),
        ("svelte", "Svelte", Bucket::Frontend),
        ("@angular/core", "Angular", Bucket::Frontend),
        ("express", "Express", Bucket::Backend),
        ("fastify", "Fastify", Bucket::Backend),
        ("@nestjs/core", "NestJS", Bucket::Backend),
        ("prisma", "Prisma", Bucket::Databases),
        ("@prisma/client", "Prisma", Bucket::Databases),
        ("mongoose", "MongoDB", Bucket::Databases),
        ("jest", "Jest", Bucket::Tooling),
        ("vitest", "Vitest", Bucket::Tooling),
        ("vite", "Vite", Bucket::Tooling),
        ("eslint", "ESLint", Bucket::Tooling),
        ("typescript", "TypeScript", Bucket::Tooling),
    ];
    apply_rules(report, &deps, rules);
}

fn detect_rust(report: &mut StackReport, content: &str) {
    push_unique(&mut report.runtimes, "Rust");
    push_unique(&mut report.package_managers, "Cargo");

    let Ok(manifest) = toml::from_str::<toml::Table>(content) else {
        return;
    };
    let mut deps: Vec<&str> = Vec::new();
    for section in ["dependencies", "dev-dependencies"] {
        if let Some(table) = manifest.get(section).and_then(|v| v.as_table()) {
            deps.extend(table.keys().map(String::as_str));
        }
    }
    if let Some(table) = manifest
        .get("workspace")
        .and_then(|w| w.get("dependencies"))
        .and_then(|v| v.as_table())
    {
        deps.extend(table.keys().map(String::as_str));
    }

    let rules: &[(&str, &str, Bucket)] = &[
        ("leptos", "Leptos", Bucket::Frontend),
        ("yew", "Yew", Bucket::Frontend),
        ("dioxus", "Dioxus", Bucket::Frontend),
        ("axum", "Axum", Bucket::Backend),
        ("actix-web", "Actix Web", Bucket::Backend),
        ("rocket", "Rocket", Bucket::Backend),
        ("warp", "Warp", Bucket::Backend),
        ("tokio", "Tokio", Bucket::Backend),
        ("sqlx", "SQLx", Bucket::Databases),
        ("diesel", "Diesel", Bucket::Databases),
        ("sea-orm", "SeaORM", Bucket::Databases),
        ("rusqlite", "SQLite", Bucket::Databases),
        ("clap", "clap", Bucket::Tooling),
        ("criterion", "Criterion", Bucket::Tooling),
    ];
    apply_rules(report, &deps, rules);
}

fn detect_python(
    report: &mut StackReport,
    pyproject: Option<&str>,
    requirements: Option<&str>,
    has: &dyn Fn(&str) -> bool,
) {
    push_unique(&mut report.runtimes, "Python");

    let mut deps: Vec<String> = Vec::new();
    let mut manager = if has("uv.lock") {
        "uv"
    } else if has("poetry.lock") {
        "Poetry"
    } else {
        "pip"
    };

    if let Some(table) = pyproject.and_then(|c| toml::from_str::<toml::Table>(c).ok()) {
        if let Some(list) = table
            .get("project")
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array())
        {
            deps.extend(list.iter().filter_map(|v| v.as_str()).map(requirement_name));
        }
        if let Some(poetry) = table
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.as_table())
        {
            manager = "Poetry";
            if let Some(map) = poetry.get("dependencies").and_then(|d| d.as_table()) {
                deps.extend(map.keys().map(|k| k.to_lowercase()));
            }
        }
    }
    if let Some(reqs) = requirements {
        deps.extend(
            reqs.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('-'))
                .map(requirement_name),
        );
    }
    push_unique(&mut report.package_managers, manager);

    let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
    let rules: &[(&str, &str, Bucket)] = &[
        ("django", "Django", Bucket::Backend),
        ("flask", "Flask", Bucket::Backend),
        ("fastapi", "FastAPI", Bucket::Backend),
        ("sqlalchemy", "SQLAlchemy", Bucket::Databases),
        ("psycopg2", "PostgreSQL", Bucket::Databases),
        ("pymongo", "MongoDB", Bucket::Databases),
        ("pytest", "pytest", Bucket::Tooling),
        ("ruff", "Ruff", Bucket::Tooling),
        ("black", "Black", Bucket::Tooling),
        ("mypy", "mypy", Bucket::Tooling),
    ];
    apply_rules(report, &deps, rules);
}

/// Package name of a PEP 508 requirement line, lowercased.
fn requirement_name(line: &str) -> String {
    let end = line
        .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .unwrap_or(line.len());
    line[..end].to_lowercase()
}

fn detect_go(report: &mut StackReport, content: &str) {
    push_unique(&mut report.runtimes, "Go");
    push_unique(&mut report.package_managers, "Go modules");

    let rules: &[(&str, &str, Bucket)] = &[
        ("github.com/gin-gonic/gin", "Gin", Bucket::Backend),
        ("github.com/labstack/echo", "Echo", Bucket::Backend),
        ("github.com/gofiber/fiber", "Fiber", Bucket::Backend),
        ("gorm.io/gorm", "GORM", Bucket::Databases),
        ("github.com/spf13/cobra", "Cobra", Bucket::Tooling),
    ];
    for (module, label, bucket) in rules {
        if content.contains(module) {
            push_unique(bucket.list(report), label);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Frontend,
    Backend,
    Databases,
    Tooling,
}

impl Bucket {
    fn list(self, report: &mut StackReport) -> &mut Vec<String> {
        match self {
            Bucket::Frontend => &mut report.frontend,
            Bucket::Backend => &mut report.backend,
            Bucket::Databases => &mut report.databases,
            Bucket::Tooling => &mut report.tooling,
        }
    }
}

fn apply_rules(report: &mut StackReport, deps: &[&str], rules: &[(&str, &str, Bucket)]) {
    for (dep, label, bucket) in rules {
        if deps.contains(dep) {
            push_unique(bucket.list(report), label);
        }
    }
}
