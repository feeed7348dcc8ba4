use std::{collections::HashSet, path::Component, path::Path, sync::LazyLock};

use regex::Regex;

use crate::{
    error::{PackageError, Result},
    package::Package,
};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._-]+$").expect("package name regex is valid")
});

/// Validates a package document against the package schema.
///
/// All violations are collected so a single error reports every bad field.
///
/// # Errors
///
/// * [`PackageError::SchemaViolation`] listing each failing rule.
pub fn validate(package: &Package) -> Result<()> {
    let mut violations = Vec::new();

    if !NAME_RE.is_match(&package.name) {
        violations.push(format!("name '{}' must match [a-zA-Z0-9._-]+", package.name));
    }

    if package.version.as_deref().is_some_and(|v| v.trim().is_empty()) {
        violations.push("version must not be empty".to_string());
    }

    if let Some(filename) = package.filename.as_deref() {
        if filename.trim().is_empty() {
            violations.push("filename must not be empty".to_string());
        } else if !is_contained(filename) {
            violations.push(format!("filename '{filename}' escapes the version root"));
        }
    }

    let mut seen = HashSet::new();
    for keyword in &package.keywords {
        if !seen.insert(keyword.as_str()) {
            violations.push(format!("duplicate keyword '{keyword}'"));
        }
    }

    if let Some(autoupdate) = &package.autoupdate {
        if autoupdate.target.trim().is_empty() {
            violations.push("autoupdate.target must not be empty".to_string());
        }
        for (idx, entry) in autoupdate.file_map.iter().enumerate() {
            if entry.files.is_empty() {
                violations.push(format!("autoupdate.fileMap[{idx}] has no file globs"));
            }
            if entry.files.iter().any(|g| g.trim().is_empty()) {
                violations.push(format!("autoupdate.fileMap[{idx}] has an empty glob"));
            }
            if !entry.base_path.is_empty() && !is_contained(&entry.base_path) {
                violations.push(format!(
                    "autoupdate.fileMap[{idx}].basePath '{}' escapes the package root",
                    entry.base_path
                ));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PackageError::SchemaViolation {
            name: package.name.clone(),
            violations,
        })
    }
}

fn is_contained(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Autoupdate, FileMapEntry, Source};

    fn valid() -> Package {
        let mut pkg = Package::new("vue");
        pkg.version = Some("3.4.0".into());
        pkg.filename = Some("vue.global.prod.js".into());
        pkg.keywords = vec!["framework".into(), "frontend".into()];
        pkg.autoupdate = Some(Autoupdate {
            source: Source::Npm,
            target: "vue".into(),
            file_map: vec![FileMapEntry {
                base_path: "dist".into(),
                files: vec!["*.js".into()],
            }],
            ignore_versions: Vec::new(),
        });
        pkg
    }

    fn violations(pkg: &Package) -> Vec<String> {
        match validate(pkg) {
            Err(PackageError::SchemaViolation { violations, .. }) => violations,
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_package() {
        validate(&valid()).unwrap();
        validate(&Package::new("bare.name_ok-1")).unwrap();
    }

    #[test]
    fn test_invalid_name() {
        let mut pkg = valid();
        pkg.name = "bad name/".into();
        assert_eq!(violations(&pkg).len(), 1);
    }

    #[test]
    fn test_filename_traversal_and_empty() {
        let mut pkg = valid();
        pkg.filename = Some("../../etc/passwd".into());
        assert!(violations(&pkg)[0].contains("escapes"));
        pkg.filename = Some("/abs.js".into());
        assert!(validate(&pkg).is_err());
        pkg.filename = Some(" ".into());
        assert!(violations(&pkg)[0].contains("empty"));
    }

    #[test]
    fn test_collects_all_violations() {
        let mut pkg = valid();
        pkg.version = Some(String::new());
        pkg.keywords.push("framework".into());
        if let Some(auto) = pkg.autoupdate.as_mut() {
            auto.target = String::new();
            auto.file_map.push(FileMapEntry {
                base_path: String::new(),
                files: Vec::new(),
            });
        }
        assert_eq!(violations(&pkg).len(), 4);
    }
}
