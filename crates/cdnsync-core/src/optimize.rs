use std::{collections::HashSet, fmt, path::Path};

use cdnsync_config::OptimizeConfig;
use cdnsync_package::Optimization;

/// File formats the optimizer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizeKind {
    Js,
    Css,
    Png,
    Jpg,
}

impl OptimizeKind {
    pub const ALL: [OptimizeKind; 4] = [
        OptimizeKind::Js,
        OptimizeKind::Css,
        OptimizeKind::Png,
        OptimizeKind::Jpg,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" => Some(OptimizeKind::Js),
            "css" => Some(OptimizeKind::Css),
            "png" => Some(OptimizeKind::Png),
            "jpg" | "jpeg" => Some(OptimizeKind::Jpg),
            _ => None,
        }
    }

    pub fn enabled(&self, flags: &Optimization) -> bool {
        match self {
            OptimizeKind::Js => flags.js,
            OptimizeKind::Css => flags.css,
            OptimizeKind::Png => flags.png,
            OptimizeKind::Jpg => flags.jpg,
        }
    }

    /// Images are re-encoded over the original; scripts and stylesheets get
    /// a `.min` sibling.
    pub fn in_place(&self) -> bool {
        matches!(self, OptimizeKind::Png | OptimizeKind::Jpg)
    }

    /// Variable that switches the format on inside the optimizer image.
    pub fn env_var(&self) -> &'static str {
        match self {
            OptimizeKind::Js => "OPTIMIZE_JS",
            OptimizeKind::Css => "OPTIMIZE_CSS",
            OptimizeKind::Png => "OPTIMIZE_PNG",
            OptimizeKind::Jpg => "OPTIMIZE_JPG",
        }
    }

    pub fn template<'a>(&self, commands: &'a OptimizeConfig) -> &'a str {
        match self {
            OptimizeKind::Js => &commands.js,
            OptimizeKind::Css => &commands.css,
            OptimizeKind::Png => &commands.png,
            OptimizeKind::Jpg => &commands.jpg,
        }
    }
}

impl fmt::Display for OptimizeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizeKind::Js => "js",
            OptimizeKind::Css => "css",
            OptimizeKind::Png => "png",
            OptimizeKind::Jpg => "jpg",
        };
        f.write_str(name)
    }
}

/// One optimizer invocation, with paths relative to the version root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeJob {
    pub kind: OptimizeKind,
    pub input: String,
    pub output: String,
}

/// `true` if the file name already carries a `.min.` infix.
pub fn is_minified(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    file_name.contains(".min.")
}

/// `dist/foo.js` -> `dist/foo.min.js`
pub fn minified_name(name: &str) -> Option<String> {
    let slash = name.rfind('/').map_or(0, |i| i + 1);
    let dot = name[slash..].rfind('.').map(|i| i + slash)?;
    if dot == slash {
        return None;
    }
    Some(format!("{}.min{}", &name[..dot], &name[dot..]))
}

/// Lists the optimizer work for a version's files.
///
/// Formats the package did not opt into are skipped, as are scripts and
/// stylesheets that are already minified or ship a minified sibling.
pub fn plan<S: AsRef<str>>(files: &[S], flags: &Optimization) -> Vec<OptimizeJob> {
    let present: HashSet<&str> = files.iter().map(AsRef::as_ref).collect();
    let mut jobs = Vec::new();

    for file in files.iter().map(AsRef::as_ref) {
        let Some(kind) = OptimizeKind::from_name(file) else {
            continue;
        };
        if !kind.enabled(flags) {
            continue;
        }

        if kind.in_place() {
            jobs.push(OptimizeJob {
                kind,
                input: file.to_string(),
                output: file.to_string(),
            });
            continue;
        }

        if is_minified(file) {
            continue;
        }
        let Some(output) = minified_name(file) else {
            continue;
        };
        if present.contains(output.as_str()) {
            continue;
        }
        jobs.push(OptimizeJob {
            kind,
            input: file.to_string(),
            output,
        });
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minified_name() {
        assert_eq!(minified_name("foo.js").as_deref(), Some("foo.min.js"));
        assert_eq!(
            minified_name("dist/v1.2/app.css").as_deref(),
            Some("dist/v1.2/app.min.css")
        );
        assert_eq!(minified_name("dist/.hidden"), None);
        assert_eq!(minified_name("LICENSE"), None);
    }

    #[test]
    fn test_is_minified() {
        assert!(is_minified("dist/foo.min.js"));
        assert!(!is_minified("dist.min.d/foo.js"));
        assert!(!is_minified("foo.js"));
    }

    #[test]
    fn test_plan_all_formats() {
        let files = ["a.js", "b.css", "c.png", "d.jpeg", "e.woff2"];
        let flags = Optimization {
            js: true,
            css: true,
            png: true,
            jpg: true,
        };
        let jobs = plan(&files, &flags);
        let summary: Vec<_> = jobs
            .iter()
            .map(|j| (j.kind, j.input.as_str(), j.output.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (OptimizeKind::Js, "a.js", "a.min.js"),
                (OptimizeKind::Css, "b.css", "b.min.css"),
                (OptimizeKind::Png, "c.png", "c.png"),
                (OptimizeKind::Jpg, "d.jpeg", "d.jpeg"),
            ]
        );
    }

    #[test]
    fn test_plan_skips_minified_and_opted_out() {
        let files = ["a.js", "a.min.js", "b.min.css", "c.css", "d.png"];
        let flags = Optimization {
            js: true,
            ..Default::default()
        };
        assert!(plan(&files, &flags).is_empty());
    }

    #[test]
    fn test_plan_without_flags_is_empty() {
        let files = ["a.js", "b.css", "c.png", "d.jpg"];
        assert!(plan(&files, &Optimization::default()).is_empty());
    }
}
