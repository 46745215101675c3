//! Variant-selection policy shared by single and bulk resolution.

use crate::model::{ResolveAction, Variant};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no variant with id {0}")]
    UnknownVariant(String),
}

/// Pick the variant an action resolves to.
///
/// - `overwrite` with an explicit id: that variant, or [`SelectionError::UnknownVariant`].
/// - `overwrite` otherwise: first variant bringing new rows, else the first variant.
/// - `skip`: first variant with existing rows, else the first variant.
///
/// `Ok(None)` only when the variant list is empty. `skip` ignores any
/// explicit id.
pub fn select_variant(
    variants: &[Variant],
    action: ResolveAction,
    choose_variant_id: Option<&str>,
) -> Result<Option<Variant>, SelectionError> {
    let picked = match (action, choose_variant_id) {
        (ResolveAction::Overwrite, Some(wanted)) => {
            let found = variants.iter().find(|v| v.variant_id == wanted);
            return found
                .cloned()
                .map(Some)
                .ok_or_else(|| SelectionError::UnknownVariant(wanted.to_string()));
        }
        (ResolveAction::Overwrite, None) => variants.iter().find(|v| v.new_count > 0),
        (ResolveAction::Skip, _) => variants.iter().find(|v| v.existing_count > 0),
    };

    Ok(picked.or_else(|| variants.first()).cloned())
}
