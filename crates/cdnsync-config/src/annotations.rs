use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, Item, RawString, Table};
use tracing::warn;

use crate::error::{ConfigError, Result};

/// Appends each line of `docs` to the comment prefix held by `decor`.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let existing = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default()
        .to_string();

    let mut prefix = existing;
    if !prefix.is_empty() && !prefix.ends_with("\n\n") {
        prefix.push_str("#\n");
    }
    for line in docs.lines() {
        if line.is_empty() {
            prefix.push_str("#\n");
        } else {
            prefix.push_str("# ");
            prefix.push_str(line);
            prefix.push('\n');
        }
    }
    decor.set_prefix(prefix);
}

/// Annotates every key in `table` with the field docs of `T`.
///
/// Non-root tables also receive the struct-level docs of `T` above their
/// header.
pub fn annotate_toml_table<T>(table: &mut Table, is_root: bool) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if !is_root {
        append_docs_as_toml_comments(table.decor_mut(), T::DOCS);
    }

    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            warn!(
                "Field '{}' has no documentation in '{}'",
                name,
                type_name::<T>()
            );
            continue;
        };
        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            // Nested tables carry their own struct docs, see `annotate_section`.
            Item::Table(_) | Item::ArrayOfTables(_) => {}
        }
    }

    Ok(())
}

/// Annotates the sub-table `key` of `root` with the docs of `T`.
pub fn annotate_section<T>(root: &mut Table, key: &str) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if let Some(table) = root.get_mut(key).and_then(Item::as_table_mut) {
        annotate_toml_table::<T>(table, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use toml_edit::Decor;

    use super::*;

    #[test]
    fn test_append_docs_as_toml_comments() {
        let mut decor = Decor::new("", "");
        append_docs_as_toml_comments(&mut decor, "Line 1\n\nLine 2");

        let prefix = decor.prefix().and_then(|p| p.as_str()).unwrap();
        assert_eq!(prefix, "# Line 1\n#\n# Line 2\n");
    }

    #[test]
    fn test_append_docs_separates_existing_prefix() {
        let mut decor = Decor::new("\n", "");
        append_docs_as_toml_comments(&mut decor, "Doc");

        let prefix = decor.prefix().and_then(|p| p.as_str()).unwrap();
        assert_eq!(prefix, "\n#\n# Doc\n");
    }
}
