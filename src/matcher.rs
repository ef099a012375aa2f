use crate::error::UpdateError;
use crate::types::AssetMatch;
use regex::Regex;

pub const TAG_PLACEHOLDER: &str = "{tag}";

/// Whether a release tag should be looked at again.
///
/// Tags are opaque: any change in the string counts, no version parsing.
pub fn should_check(recorded_tag: &str, candidate_tag: &str) -> bool {
    recorded_tag != candidate_tag
}

/// The two spellings a tag may appear with in asset names.
///
/// Projects are inconsistent about the `v` prefix, so `v1.5.0` also yields
/// `1.5.0` and `1.5.0` also yields `v1.5.0`.
pub fn tag_candidates(tag: &str) -> [String; 2] {
    let alternate = match tag.strip_prefix(['v', 'V']) {
        Some(stripped) => stripped.to_string(),
        None => format!("v{}", tag),
    };
    [tag.to_string(), alternate]
}

/// Select the asset names that satisfy `asset_match`, keeping input order.
pub fn match_assets(
    names: &[String],
    asset_match: &AssetMatch,
    tag: &str,
) -> Result<Vec<String>, UpdateError> {
    let matched: Vec<String> = match asset_match {
        AssetMatch::Fixed(pattern) => names.iter().filter(|n| *n == pattern).cloned().collect(),
        AssetMatch::Regex(pattern) => {
            let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                UpdateError::Config(format!(
                    "invalid regex pattern '{}', no assets found: {}",
                    pattern, e
                ))
            })?;
            names.iter().filter(|n| re.is_match(n)).cloned().collect()
        }
        AssetMatch::TagTemplate(pattern) => {
            let expected = tag_candidates(tag).map(|t| pattern.replacen(TAG_PLACEHOLDER, &t, 1));
            tracing::debug!("Tag template candidates: {:?}", expected);
            names
                .iter()
                .filter(|n| expected.contains(n))
                .cloned()
                .collect()
        }
        AssetMatch::All => names.to_vec(),
    };

    if matched.is_empty() {
        return Err(UpdateError::NoMatch(asset_match.to_string()));
    }
    if matched.len() > 1 && matches!(asset_match, AssetMatch::Fixed(_)) {
        tracing::warn!(
            "Release has {} assets named '{}'",
            matched.len(),
            matched[0]
        );
    }
    Ok(matched)
}
