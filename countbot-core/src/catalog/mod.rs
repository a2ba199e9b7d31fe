//! The item catalog - the static table of things makers can produce.
//!
//! Each entry is an item type with an ordered (possibly empty) set of
//! variants. The catalog is immutable once constructed; construction
//! validates the prefix invariant that makes fuzzy token resolution
//! unambiguous: no two item names may share a 3-character prefix, and
//! neither may two variants of the same item.

pub mod resolver;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest token the resolver will consider. Anything shorter is too
/// ambiguous by policy.
pub const MIN_TOKEN_LEN: usize = 3;

/// A concrete (item, variant) pair, fully resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub item: String,
    pub variant: Option<String>,
}

impl Target {
    pub fn new(item: impl Into<String>, variant: Option<&str>) -> Self {
        Self {
            item: item.into(),
            variant: variant.map(str::to_string),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(v) => write!(f, "{} {}", self.item, v),
            None => write!(f, "{}", self.item),
        }
    }
}

/// One catalog row: an item and its variant names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<String>,
}

impl CatalogEntry {
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no items")]
    Empty,

    #[error("catalog name '{name}' is shorter than {MIN_TOKEN_LEN} characters and could never be matched")]
    NameTooShort { name: String },

    #[error("item names '{a}' and '{b}' share a {MIN_TOKEN_LEN}-character prefix")]
    ItemPrefixClash { a: String, b: String },

    #[error("variants '{a}' and '{b}' of item '{item}' share a {MIN_TOKEN_LEN}-character prefix")]
    VariantPrefixClash { item: String, a: String, b: String },

    #[error("failed to read catalog file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog file")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// On-disk catalog document.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    items: Vec<CatalogEntry>,
}

/// The validated, immutable item catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog, enforcing the prefix-distinctness invariant.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        check_prefix_distinct(&names, |a, b| CatalogError::ItemPrefixClash {
            a: a.to_string(),
            b: b.to_string(),
        })?;
        for entry in &entries {
            let variants: Vec<&str> = entry.variants.iter().map(String::as_str).collect();
            check_prefix_distinct(&variants, |a, b| CatalogError::VariantPrefixClash {
                item: entry.name.clone(),
                a: a.to_string(),
                b: b.to_string(),
            })?;
        }
        Ok(Self { entries })
    }

    /// Parse a YAML catalog document.
    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml_ng::from_str(text)?;
        Self::new(file.items)
    }

    /// Load a catalog from a YAML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Exact lookup by full item name (case-insensitive).
    pub fn entry(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Every legal (item, variant) combination, in catalog order.
    pub fn all_targets(&self) -> Vec<Target> {
        let mut targets = Vec::new();
        for entry in &self.entries {
            if entry.variants.is_empty() {
                targets.push(Target::new(entry.name.clone(), None));
            } else {
                for variant in &entry.variants {
                    targets.push(Target::new(entry.name.clone(), Some(variant)));
                }
            }
        }
        targets
    }

    /// Does the token prefix-match any variant name of any item?
    /// Used to classify wrong-slot tokens.
    pub fn matches_any_variant(&self, token: &str) -> bool {
        self.entries
            .iter()
            .flat_map(|e| e.variants.iter())
            .any(|v| resolver::is_prefix_of(token, v))
    }

    /// Does the token prefix-match any item name?
    pub fn matches_any_item(&self, token: &str) -> bool {
        self.entries
            .iter()
            .any(|e| resolver::is_prefix_of(token, &e.name))
    }
}

impl Default for Catalog {
    /// The built-in catalog of the original deployment: face-shield head
    /// bands, transparency visors and ear savers.
    fn default() -> Self {
        let entries = vec![
            CatalogEntry {
                name: "verkstan".into(),
                variants: vec!["PETG".into(), "PLA".into()],
            },
            CatalogEntry {
                name: "prusa".into(),
                variants: vec!["PETG".into(), "PLA".into()],
            },
            CatalogEntry {
                name: "visor".into(),
                variants: vec!["prusa".into(), "verkstan".into()],
            },
            CatalogEntry {
                name: "earsaver".into(),
                variants: vec![],
            },
        ];
        Self::new(entries).expect("built-in catalog is valid")
    }
}

fn check_prefix_distinct<'a>(
    names: &[&'a str],
    clash: impl Fn(&'a str, &'a str) -> CatalogError,
) -> Result<(), CatalogError> {
    for name in names {
        if name.len() < MIN_TOKEN_LEN {
            return Err(CatalogError::NameTooShort {
                name: name.to_string(),
            });
        }
    }
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            if a.as_bytes()[..MIN_TOKEN_LEN].eq_ignore_ascii_case(&b.as_bytes()[..MIN_TOKEN_LEN]) {
                return Err(clash(a, b));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = Catalog::default();
        assert_eq!(catalog.entries().len(), 4);
        assert!(catalog.entry("earsaver").is_some());
        assert!(!catalog.entry("earsaver").unwrap().has_variants());
    }

    #[test]
    fn all_targets_covers_variantless_items() {
        let catalog = Catalog::default();
        let targets = catalog.all_targets();
        assert!(targets.contains(&Target::new("verkstan", Some("PLA"))));
        assert!(targets.contains(&Target::new("earsaver", None)));
        assert_eq!(targets.len(), 7);
    }

    #[test]
    fn rejects_item_prefix_clash() {
        let entries = vec![
            CatalogEntry {
                name: "prusa".into(),
                variants: vec![],
            },
            CatalogEntry {
                name: "pruner".into(),
                variants: vec![],
            },
        ];
        assert!(matches!(
            Catalog::new(entries),
            Err(CatalogError::ItemPrefixClash { .. })
        ));
    }

    #[test]
    fn rejects_variant_prefix_clash_within_item() {
        let entries = vec![CatalogEntry {
            name: "visor".into(),
            variants: vec!["plain".into(), "plastic".into()],
        }];
        assert!(matches!(
            Catalog::new(entries),
            Err(CatalogError::VariantPrefixClash { .. })
        ));
    }

    #[test]
    fn rejects_short_names() {
        let entries = vec![CatalogEntry {
            name: "ab".into(),
            variants: vec![],
        }];
        assert!(matches!(
            Catalog::new(entries),
            Err(CatalogError::NameTooShort { .. })
        ));
    }

    #[test]
    fn parses_yaml_catalog() {
        let yaml = r#"
items:
  - name: widget
    variants: [steel, brass]
  - name: gadget
"#;
        let catalog = Catalog::from_yaml(yaml).unwrap();
        assert_eq!(catalog.entries().len(), 2);
        assert!(catalog.entry("gadget").unwrap().variants.is_empty());
    }
}
