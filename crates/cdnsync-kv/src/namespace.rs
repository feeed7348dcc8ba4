use std::{fmt, str::FromStr};

/// The five logical partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Packages,
    Versions,
    Files,
    Aggregated,
    Sri,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::Packages,
        Namespace::Versions,
        Namespace::Files,
        Namespace::Aggregated,
        Namespace::Sri,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Packages => "packages",
            Namespace::Versions => "versions",
            Namespace::Files => "files",
            Namespace::Aggregated => "aggregated",
            Namespace::Sri => "sri",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown namespace '{s}', expected one of: {}",
                    Namespace::ALL.map(|ns| ns.as_str()).join(", ")
                )
            })
    }
}

/// Key builders. Every key is a pure function of its parts, so rewriting one
/// overwrites the same record.
pub mod keys {
    pub fn package(name: &str) -> String {
        name.to_string()
    }

    pub fn version(name: &str, version: &str) -> String {
        format!("{name}/{version}")
    }

    /// `relpath` keeps any `.br`/`.gz` suffix for the files namespace and has
    /// it stripped for the sri namespace.
    pub fn file(name: &str, version: &str, relpath: &str) -> String {
        format!("{name}/{version}/{relpath}")
    }

    /// Prefix shared by every version key of a package.
    pub fn versions_prefix(name: &str) -> String {
        format!("{name}/")
    }
}

/// Suffixes of the compressed siblings stored in the files namespace.
pub const COMPRESSION_SUFFIXES: [&str; 2] = [".br", ".gz"];

/// The logical (uncompressed) name of a published file.
pub fn strip_compression_suffix(name: &str) -> &str {
    COMPRESSION_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_roundtrip() {
        for ns in Namespace::ALL {
            assert_eq!(ns.as_str().parse::<Namespace>().unwrap(), ns);
        }
        assert!("bogus".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys::package("vue"), "vue");
        assert_eq!(keys::version("vue", "3.4.0"), "vue/3.4.0");
        assert_eq!(
            keys::file("vue", "3.4.0", "dist/vue.js.br"),
            "vue/3.4.0/dist/vue.js.br"
        );
    }

    #[test]
    fn test_strip_compression_suffix() {
        assert_eq!(strip_compression_suffix("dist/a.js.br"), "dist/a.js");
        assert_eq!(strip_compression_suffix("dist/a.js.gz"), "dist/a.js");
        assert_eq!(strip_compression_suffix("fonts/a.woff2"), "fonts/a.woff2");
    }
}
