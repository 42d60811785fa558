//! Find the Maven modules under a code root and the JUnit test classes in
//! each, producing the project list `collect` runs from.
//!
//! A module is a directory holding both a `pom.xml` file and a `src/test`
//! directory. Nested modules are found too, since multi-module builds keep
//! their children below the parent pom.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::collect::ProjectEntry;
use crate::error::Result;

const POM_FILE: &str = "pom.xml";
const TEST_ANNOTATION: &str = "@Test";
/// Never searched, along with every hidden directory.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

#[must_use]
pub fn is_test_module(dir: &Path) -> bool {
    dir.join(POM_FILE).is_file() && dir.join("src").join("test").is_dir()
}

/// Every test module below `root` (including `root` itself), in path order.
pub fn find_test_modules(root: &Path) -> Vec<PathBuf> {
    let mut modules = Vec::new();
    walk_modules(root, &mut modules);
    modules.sort();
    modules
}

fn walk_modules(dir: &Path, out: &mut Vec<PathBuf>) {
    if is_test_module(dir) {
        out.push(dir.to_path_buf());
    }
    for sub in subdirectories(dir) {
        let skipped = sub
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.') || SKIPPED_DIRS.contains(&n));
        if !skipped {
            walk_modules(&sub, out);
        }
    }
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            Vec::new()
        }
    }
}

/// Class names of the Java files under `module/src/test` that contain a
/// `@Test` annotation, sorted and unique.
pub fn test_classes(module: &Path) -> Vec<String> {
    let mut files = Vec::new();
    walk_java(&module.join("src").join("test"), &mut files);

    let mut classes: Vec<String> = files
        .iter()
        .filter(|path| fs::read_to_string(path).is_ok_and(|text| text.contains(TEST_ANNOTATION)))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    classes.sort();
    classes.dedup();
    classes
}

fn walk_java(dir: &Path, out: &mut Vec<PathBuf>) {
    for path in subentries(dir) {
        if path.is_dir() {
            walk_java(&path, out);
        } else if path.extension().is_some_and(|e| e == "java") {
            out.push(path);
        }
    }
}

fn subentries(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}

/// `/`-joined path of `module` relative to `root`, or `.` for the root.
fn relative_dir(module: &Path, root: &Path) -> Option<String> {
    let rel = module.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        Some(".".to_string())
    } else {
        Some(parts.join("/"))
    }
}

/// One entry per test module under `code_root` that has at least one test
/// class. `project_dir` is relative to `code_root`.
pub fn discover(code_root: &Path) -> Result<Vec<ProjectEntry>> {
    // Surface a missing or unreadable root instead of an empty list.
    fs::read_dir(code_root)?;

    let modules = find_test_modules(code_root);
    tracing::info!(root = %code_root.display(), modules = modules.len(), "found test modules");

    let mut entries = Vec::new();
    for module in modules {
        let tests = test_classes(&module);
        let Some(project_dir) = relative_dir(&module, code_root) else {
            continue;
        };
        if tests.is_empty() {
            tracing::debug!(module = %project_dir, "no @Test classes");
            continue;
        }
        tracing::debug!(module = %project_dir, tests = tests.len(), "test module");
        entries.push(ProjectEntry {
            project_dir,
            test_list: tests,
        });
    }
    Ok(entries)
}

pub fn write_projects(path: &Path, entries: &[ProjectEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const TEST_CLASS: &str = "class ATest {\n  @Test\n  public void run() {}\n}\n";

    #[test]
    fn test_module_needs_pom_and_test_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("a/pom.xml"), "<project/>");
        fs::create_dir_all(root.join("a/src/test")).unwrap();
        write(&root.join("b/pom.xml"), "<project/>");
        fs::create_dir_all(root.join("b/src/main")).unwrap();
        fs::create_dir_all(root.join("c/src/test")).unwrap();

        assert!(is_test_module(&root.join("a")));
        assert!(!is_test_module(&root.join("b")));
        assert!(!is_test_module(&root.join("c")));
    }

    #[test]
    fn test_nested_modules_found_and_build_output_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for module in ["parent", "parent/child", "parent/target/copy", "parent/.git/x"] {
            write(&root.join(module).join("pom.xml"), "<project/>");
            fs::create_dir_all(root.join(module).join("src/test")).unwrap();
        }

        let modules = find_test_modules(root);
        assert_eq!(modules, vec![root.join("parent"), root.join("parent/child")]);
    }

    #[test]
    fn test_classes_require_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path();
        write(&module.join("src/test/java/p/BTest.java"), TEST_CLASS);
        write(&module.join("src/test/java/p/q/ATest.java"), TEST_CLASS);
        write(&module.join("src/test/java/p/Fixtures.java"), "class Fixtures {}\n");
        write(&module.join("src/test/resources/notes.txt"), "@Test");

        assert_eq!(test_classes(module), vec!["ATest".to_string(), "BTest".to_string()]);
    }

    #[test]
    fn test_discover_relative_project_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("hadoop/common/pom.xml"), "<project/>");
        write(&root.join("hadoop/common/src/test/java/WorkerTest.java"), TEST_CLASS);
        write(&root.join("hadoop/empty/pom.xml"), "<project/>");
        fs::create_dir_all(root.join("hadoop/empty/src/test")).unwrap();

        let entries = discover(root).unwrap();
        assert_eq!(
            entries,
            vec![ProjectEntry {
                project_dir: "hadoop/common".to_string(),
                test_list: vec!["WorkerTest".to_string()],
            }]
        );
    }

    #[test]
    fn test_discover_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_relative_dir_of_root() {
        let root = Path::new("/code");
        assert_eq!(relative_dir(root, root).as_deref(), Some("."));
        assert_eq!(relative_dir(&root.join("a/b"), root).as_deref(), Some("a/b"));
        assert_eq!(relative_dir(Path::new("/other"), root), None);
    }
}
