//! Fuzzy token resolution against the catalog.
//!
//! The matching rule: a token of at least [`MIN_TOKEN_LEN`] characters
//! matches every candidate whose leading characters equal it,
//! case-insensitively. Exactly one match resolves; several is a listable
//! ambiguity; none is unknown. A token that fails in its own slot but
//! matches names from the other slot is classified as [`WrongSlot`] so the
//! user learns they mixed up item and variant, not that the name does not
//! exist.
//!
//! [`WrongSlot`]: CommandError::WrongSlot

use super::{Catalog, CatalogEntry, Target, MIN_TOKEN_LEN};
use crate::error::{CommandError, TokenSlot};

/// Outcome of matching one token against one candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Match(String),
    Ambiguous(Vec<String>),
    Unknown,
}

/// Is `token` a usable prefix of `candidate`?
pub(crate) fn is_prefix_of(token: &str, candidate: &str) -> bool {
    let token = token.as_bytes();
    let candidate = candidate.as_bytes();
    token.len() >= MIN_TOKEN_LEN
        && candidate.len() >= token.len()
        && candidate[..token.len()].eq_ignore_ascii_case(token)
}

/// Match a raw token against a candidate set by the prefix rule.
pub fn resolve_prefix<'a>(
    token: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Resolution {
    let mut matches: Vec<String> = candidates
        .into_iter()
        .filter(|c| is_prefix_of(token, c))
        .map(str::to_string)
        .collect();
    match matches.len() {
        0 => Resolution::Unknown,
        1 => Resolution::Match(matches.remove(0)),
        _ => Resolution::Ambiguous(matches),
    }
}

/// Resolve an item token against the catalog.
pub fn resolve_item<'c>(
    catalog: &'c Catalog,
    token: &str,
) -> Result<&'c CatalogEntry, CommandError> {
    match resolve_prefix(token, catalog.item_names()) {
        Resolution::Match(name) => Ok(catalog
            .entry(&name)
            .expect("resolved name came from the catalog")),
        Resolution::Ambiguous(candidates) => Err(CommandError::AmbiguousToken {
            token: token.to_string(),
            candidates,
        }),
        Resolution::Unknown => {
            if catalog.matches_any_variant(token) {
                Err(CommandError::WrongSlot {
                    token: token.to_string(),
                    expected: TokenSlot::Item,
                })
            } else {
                Err(CommandError::UnknownToken {
                    token: token.to_string(),
                })
            }
        }
    }
}

/// Resolve a variant token against one item's variant set.
///
/// Variant-less items accept no variant token at all. A token naming a
/// variant that exists in the catalog but not for this item is a mismatch
/// ([`CommandError::VariantNotApplicable`]), not an unknown name.
pub fn resolve_variant(
    catalog: &Catalog,
    entry: &CatalogEntry,
    token: &str,
) -> Result<String, CommandError> {
    if !entry.has_variants() {
        return Err(CommandError::VariantNotApplicable {
            item: entry.name.clone(),
            variant: token.to_string(),
        });
    }
    match resolve_prefix(token, entry.variants.iter().map(String::as_str)) {
        Resolution::Match(name) => Ok(name),
        Resolution::Ambiguous(candidates) => Err(CommandError::AmbiguousToken {
            token: token.to_string(),
            candidates,
        }),
        Resolution::Unknown => {
            if catalog.matches_any_item(token) {
                Err(CommandError::WrongSlot {
                    token: token.to_string(),
                    expected: TokenSlot::Variant,
                })
            } else if catalog.matches_any_variant(token) {
                Err(CommandError::VariantNotApplicable {
                    item: entry.name.clone(),
                    variant: token.to_string(),
                })
            } else {
                Err(CommandError::UnknownToken {
                    token: token.to_string(),
                })
            }
        }
    }
}

/// Pick the default target when the user omitted item or variant tokens.
///
/// `candidates` is the actor's current holdings already filtered by
/// whatever partial tokens were given. Exactly one row wins; zero means
/// nothing is recorded yet; several means the actor must spell it out.
pub fn infer_default(candidates: Vec<Target>) -> Result<Target, CommandError> {
    match candidates.len() {
        0 => Err(CommandError::NoRecordsYet),
        1 => Ok(candidates.into_iter().next().expect("length checked")),
        _ => Err(CommandError::AmbiguousDefault { candidates }),
    }
}
