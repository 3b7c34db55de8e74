use crate::gate::GateDefinition;
use serde_json::Value;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// ProjectKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    Node,
    Python,
    Rust,
    Go,
    Unknown,
}

impl ProjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectKind::Node => "node",
            ProjectKind::Python => "python",
            ProjectKind::Rust => "rust",
            ProjectKind::Go => "go",
            ProjectKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker files checked in order; first match wins.
const MARKERS: &[(&str, ProjectKind)] = &[
    ("package.json", ProjectKind::Node),
    ("pyproject.toml", ProjectKind::Python),
    ("setup.py", ProjectKind::Python),
    ("requirements.txt", ProjectKind::Python),
    ("Cargo.toml", ProjectKind::Rust),
    ("go.mod", ProjectKind::Go),
];

pub fn detect_kind(dir: &Path) -> ProjectKind {
    for (marker, kind) in MARKERS {
        if dir.join(marker).exists() {
            return *kind;
        }
    }
    ProjectKind::Unknown
}

pub fn detect_package_manager(dir: &Path, kind: ProjectKind) -> &'static str {
    match kind {
        ProjectKind::Node => {
            if dir.join("pnpm-lock.yaml").exists() {
                "pnpm"
            } else if dir.join("yarn.lock").exists() {
                "yarn"
            } else {
                "npm"
            }
        }
        ProjectKind::Python => {
            if dir.join("pyproject.toml").exists() {
                "uv"
            } else {
                "pip"
            }
        }
        ProjectKind::Rust => "cargo",
        ProjectKind::Go => "go",
        ProjectKind::Unknown => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Command derivation
// ---------------------------------------------------------------------------

fn package_json(dir: &Path) -> Option<Value> {
    let data = std::fs::read_to_string(dir.join("package.json")).ok()?;
    serde_json::from_str(&data).ok()
}

fn has_script(pkg: &Value, name: &str) -> bool {
    pkg.get("scripts")
        .and_then(|s| s.get(name))
        .is_some()
}

fn has_dependency(pkg: &Value, name: &str) -> bool {
    ["dependencies", "devDependencies"]
        .iter()
        .any(|table| pkg.get(*table).and_then(|d| d.get(name)).is_some())
}

pub fn typecheck_command(dir: &Path, kind: ProjectKind) -> Option<String> {
    match kind {
        ProjectKind::Node => {
            let pkg = package_json(dir)?;
            if has_script(&pkg, "typecheck") {
                return Some("npm run typecheck".into());
            }
            if has_script(&pkg, "tsc") {
                return Some("npm run tsc".into());
            }
            if has_dependency(&pkg, "typescript") && dir.join("tsconfig.json").exists() {
                return Some("npx tsc --noEmit".into());
            }
            None
        }
        ProjectKind::Python => {
            let configured = dir.join("mypy.ini").exists()
                || dir.join(".mypy.ini").exists()
                || pyproject_has_table(dir, "[tool.mypy]");
            configured.then(|| "mypy .".into())
        }
        ProjectKind::Rust => Some("cargo check".into()),
        ProjectKind::Go => Some("go vet ./...".into()),
        ProjectKind::Unknown => None,
    }
}

pub fn lint_command(dir: &Path, kind: ProjectKind) -> Option<String> {
    match kind {
        ProjectKind::Node => {
            if let Some(pkg) = package_json(dir) {
                if has_script(&pkg, "lint") {
                    return Some("npm run lint".into());
                }
                if has_dependency(&pkg, "eslint") {
                    return Some("npx eslint .".into());
                }
            }
            let configs = [
                ".eslintrc",
                ".eslintrc.js",
                ".eslintrc.json",
                ".eslintrc.yml",
                "eslint.config.js",
            ];
            configs
                .iter()
                .any(|c| dir.join(c).exists())
                .then(|| "npx eslint .".into())
        }
        ProjectKind::Python => {
            if pyproject_has_table(dir, "[tool.ruff]") || dir.join("ruff.toml").exists() {
                return Some("ruff check .".into());
            }
            if dir.join(".pylintrc").exists()
                || dir.join("pylintrc").exists()
                || pyproject_has_table(dir, "[tool.pylint]")
            {
                return Some("pylint .".into());
            }
            None
        }
        ProjectKind::Rust => Some("cargo clippy".into()),
        ProjectKind::Go => Some("golangci-lint run".into()),
        ProjectKind::Unknown => None,
    }
}

pub fn test_command(dir: &Path, kind: ProjectKind) -> Option<String> {
    match kind {
        ProjectKind::Node => {
            let pkg = package_json(dir)?;
            has_script(&pkg, "test").then(|| "npm test".into())
        }
        ProjectKind::Python => {
            let configured = dir.join("pytest.ini").exists()
                || pyproject_has_table(dir, "[tool.pytest")
                || dir.join("tests").exists();
            configured.then(|| "pytest".into())
        }
        ProjectKind::Rust => Some("cargo test".into()),
        ProjectKind::Go => Some("go test ./...".into()),
        ProjectKind::Unknown => None,
    }
}

fn pyproject_has_table(dir: &Path, table: &str) -> bool {
    std::fs::read_to_string(dir.join("pyproject.toml"))
        .map(|content| content.contains(table))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Gate seeding
// ---------------------------------------------------------------------------

/// Derive the initial gate list for a working tree. Order matters: cheap
/// checks run before the test suite so failures surface fast.
pub fn detect_gates(dir: &Path) -> Vec<GateDefinition> {
    let kind = detect_kind(dir);
    let mut gates = Vec::new();
    if let Some(command) = typecheck_command(dir, kind) {
        gates.push(GateDefinition {
            timeout_seconds: 300,
            ..GateDefinition::new("typecheck", command)
        });
    }
    if let Some(command) = lint_command(dir, kind) {
        gates.push(GateDefinition {
            timeout_seconds: 120,
            ..GateDefinition::new("lint", command)
        });
    }
    if let Some(command) = test_command(dir, kind) {
        gates.push(GateDefinition {
            timeout_seconds: 600,
            ..GateDefinition::new("test", command)
        });
    }
    gates
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
