//! WhitelistProfile entity and the domain-matching rule used by both the
//! Whitelist & Embed Policy cache (C11) and its tests (spec.md §4.11, §8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkPosition {
    Tl,
    Tr,
    Bl,
    Br,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkSettings {
    pub url: String,
    pub position: WatermarkPosition,
    pub opacity: f32,
    pub pixel_size: u32,
    pub vertical_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    Video,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreRollAd {
    pub kind: AdType,
    pub url: String,
    /// Duration in seconds, required for image ads.
    pub duration_secs: Option<f64>,
    pub skip_after_secs: f64,
    pub click_url: Option<String>,
    pub click_text: Option<String>,
    pub click_title: Option<String>,
    /// Position within the ordered list of pre-rolls (a strict total
    /// order on siblings, spec.md §3 invariant).
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistProfile {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Domain patterns: either exact (`a.com`) or leading-wildcard
    /// (`*.a.com`).
    pub domain_patterns: Vec<String>,
    pub watermark: Option<WatermarkSettings>,
    pub pre_rolls: Vec<PreRollAd>,
    pub thumbnail_override: Option<String>,
}

impl WhitelistProfile {
    /// Pre-rolls in their configured display order.
    pub fn ordered_pre_rolls(&self) -> Vec<&PreRollAd> {
        let mut rolls: Vec<&PreRollAd> = self.pre_rolls.iter().collect();
        rolls.sort_by_key(|a| a.order);
        rolls
    }

    /// Does this profile's pattern set match `domain`? `domain` must
    /// already be normalized (see `normalize_domain`).
    pub fn matches(&self, domain: &str) -> bool {
        self.active && self.domain_patterns.iter().any(|p| pattern_matches(p, domain))
    }
}

/// Strip scheme, path, query, port, and lower-case (spec.md §4.11 step 1).
pub fn normalize_domain(input: &str) -> String {
    let mut s = input.trim().to_lowercase();
    if let Some(idx) = s.find("://") {
        s = s[idx + 3..].to_string();
    }
    if let Some(idx) = s.find(['/', '?', '#']) {
        s = s[..idx].to_string();
    }
    if let Some(idx) = s.rfind(':') {
        // Only strip a port if what follows is all digits (avoids
        // mangling bare IPv6 literals, which this system does not need
        // to support for embed domains).
        if s[idx + 1..].chars().all(|c| c.is_ascii_digit()) && !s[idx + 1..].is_empty() {
            s = s[..idx].to_string();
        }
    }
    s
}

/// Core matcher satisfying the property table in spec.md §8:
/// `match("*.a.com","a.com") == true`
/// `match("*.a.com","x.a.com") == true`
/// `match("a.com","a.com") == true`
/// `match("a.com","www.a.com") == true`
/// `match("b.com","a.com") == false`
/// case-insensitive, whitespace-trimmed.
pub fn pattern_matches(pattern: &str, domain: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let domain = domain.trim().to_lowercase();

    if let Some(base) = pattern.strip_prefix("*.") {
        // Wildcard also covers the bare base domain itself.
        return domain == base || domain.ends_with(&format!(".{base}"));
    }

    if domain == pattern {
        return true;
    }

    // Leading-`www.` equivalence with the bare domain for non-wildcard
    // patterns (spec.md §4.11 step 2).
    if let Some(bare) = domain.strip_prefix("www.") {
        if bare == pattern {
            return true;
        }
    }
    if let Some(bare) = pattern.strip_prefix("www.") {
        if bare == domain {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_satisfies_spec_table() {
        assert!(pattern_matches("*.a.com", "a.com"));
        assert!(pattern_matches("*.a.com", "x.a.com"));
        assert!(pattern_matches("a.com", "a.com"));
        assert!(pattern_matches("a.com", "www.a.com"));
        assert!(!pattern_matches("b.com", "a.com"));
    }

    #[test]
    fn matcher_is_case_insensitive_and_trims_whitespace() {
        assert!(pattern_matches(" A.COM ", " a.com "));
        assert!(pattern_matches("*.A.com", "Sub.a.COM"));
    }

    #[test]
    fn wildcard_does_not_match_unrelated_domain() {
        assert!(!pattern_matches("*.a.com", "a.com.evil.net"));
    }

    #[test]
    fn normalize_strips_scheme_path_query_port() {
        assert_eq!(normalize_domain("https://Sub.Game1.com:443/embed?x=1"), "sub.game1.com");
    }

    #[test]
    fn profile_matches_requires_active() {
        let mut profile = WhitelistProfile {
            id: "p1".into(),
            name: "demo".into(),
            active: false,
            domain_patterns: vec!["*.game1.com".into()],
            watermark: None,
            pre_rolls: vec![],
            thumbnail_override: None,
        };
        assert!(!profile.matches("sub.game1.com"));
        profile.active = true;
        assert!(profile.matches("sub.game1.com"));
    }

    #[test]
    fn ordered_pre_rolls_sorts_by_order() {
        let profile = WhitelistProfile {
            id: "p1".into(),
            name: "demo".into(),
            active: true,
            domain_patterns: vec![],
            watermark: None,
            pre_rolls: vec![
                PreRollAd {
                    kind: AdType::Image,
                    url: "second".into(),
                    duration_secs: Some(5.0),
                    skip_after_secs: 3.0,
                    click_url: None,
                    click_text: None,
                    click_title: None,
                    order: 1,
                },
                PreRollAd {
                    kind: AdType::Video,
                    url: "first".into(),
                    duration_secs: None,
                    skip_after_secs: 5.0,
                    click_url: None,
                    click_text: None,
                    click_title: None,
                    order: 0,
                },
            ],
            thumbnail_override: None,
        };
        let ordered = profile.ordered_pre_rolls();
        assert_eq!(ordered[0].url, "first");
        assert_eq!(ordered[1].url, "second");
    }
}
