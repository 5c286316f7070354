//! Site profile and the rules that separate article links from navigation noise.

use common::SiteConfig;
use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://beyondchats.com/blogs/";
pub const DEFAULT_BRAND: &str = "BeyondChats";
pub const DEFAULT_BLOG_SEGMENT: &str = "blogs";
pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Listing pages and site sections that never hold an article.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/tag/",
    "/category/",
    "/author/",
    "/page/",
    "/features",
    "/integrations",
    "/pricing",
    "/about",
    "/contact",
    "/case-studies",
    "/success-stories",
    "/testimonials",
    "/faq",
    "/terms",
    "/privacy",
    "/careers",
    "/team",
    "/solutions",
];

const GENERIC_LABELS: &[&str] = &["read more", "read", "more", "→", "»", "continue reading"];

/// Minimum title length (in characters) for a title to be kept at all.
pub const MIN_TITLE_LEN: usize = 5;
/// Anchor text shorter than this is assumed not to be a title.
pub const MIN_ANCHOR_TITLE_LEN: usize = 10;

/// Everything that is specific to the blog being acquired.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub base_url: Url,
    pub brand: String,
    pub blog_segment: String,
    pub max_pages: u32,
    pub excluded_paths: Vec<String>,
}

impl SiteProfile {
    pub fn from_config(cfg: &SiteConfig) -> anyhow::Result<Self> {
        let raw = cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut base_url = Url::parse(raw)
            .map_err(|e| anyhow::anyhow!("invalid site.base_url '{}': {}", raw, e))?;
        // Page URLs are built relative to the listing root
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let max_pages = cfg.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1);
        Ok(Self {
            base_url,
            brand: cfg.brand.clone().unwrap_or_else(|| DEFAULT_BRAND.to_string()),
            blog_segment: cfg
                .blog_segment
                .clone()
                .unwrap_or_else(|| DEFAULT_BLOG_SEGMENT.to_string()),
            max_pages,
            excluded_paths: cfg.excluded_paths.clone().unwrap_or_else(|| {
                DEFAULT_EXCLUDED_PATHS.iter().map(|s| s.to_string()).collect()
            }),
        })
    }

    /// URL of listing page `n` (page 1 is the listing root itself).
    pub fn page_url(&self, n: u32) -> Url {
        if n <= 1 {
            return self.base_url.clone();
        }
        self.base_url
            .join(&format!("page/{}/", n))
            .unwrap_or_else(|_| self.base_url.clone())
    }
}

pub struct LinkClassifier {
    profile: SiteProfile,
    brand_word: Option<Regex>,
}

impl LinkClassifier {
    pub fn new(profile: SiteProfile) -> Self {
        let brand_word = if profile.brand.trim().is_empty() {
            None
        } else {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(profile.brand.trim()))).ok()
        };
        Self {
            profile,
            brand_word,
        }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Resolve an anchor `href` against the page it was found on.
    pub fn resolve(&self, page: &Url, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let mut url = page.join(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        Some(url)
    }

    /// True when `url` points at a single article directly under the blog root.
    pub fn is_article_url(&self, url: &Url) -> bool {
        let path = url.path().to_lowercase();
        let root = format!("/{}/", self.profile.blog_segment.to_lowercase());
        let Some(idx) = path.find(&root) else {
            return false;
        };

        let with_slash = if path.ends_with('/') {
            path.clone()
        } else {
            format!("{}/", path)
        };
        let excluded = self.profile.excluded_paths.iter().any(|pattern| {
            let pattern = pattern.to_lowercase();
            let pattern = if pattern.ends_with('/') {
                pattern
            } else {
                format!("{}/", pattern)
            };
            with_slash.contains(&pattern)
        });
        if excluded {
            return false;
        }

        // Exactly one slug segment under the blog root
        let slug = path[idx + root.len()..].trim_end_matches('/');
        !slug.is_empty() && !slug.contains('/')
    }

    /// Anchor text that cannot serve as a title on its own ("Read More", arrows, the brand).
    pub fn is_weak_anchor_text(&self, text: &str) -> bool {
        let text = text.trim();
        if text.chars().count() < MIN_ANCHOR_TITLE_LEN {
            return true;
        }
        let lower = text.to_lowercase();
        GENERIC_LABELS.contains(&lower.as_str()) || lower == self.profile.brand.to_lowercase()
    }

    /// Strip the brand, collapse whitespace and reject anything that is not a usable title.
    pub fn clean_title(&self, raw: &str) -> Option<String> {
        let stripped = match &self.brand_word {
            Some(re) => re.replace_all(raw, " ").into_owned(),
            None => raw.to_string(),
        };
        let collapsed = crate::dom::collapse_whitespace(&stripped);
        let title = collapsed
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '|' | '-' | '–' | '—' | ':' | '·'))
            .to_string();

        if title.chars().count() < MIN_TITLE_LEN {
            return None;
        }
        if title.eq_ignore_ascii_case(self.profile.brand.trim()) {
            return None;
        }
        Some(title)
    }

    pub fn is_brand(&self, text: &str) -> bool {
        text.trim().eq_ignore_ascii_case(self.profile.brand.trim())
    }
}

/// Title derived from the last path segment of a URL: "my-first_post" → "My First Post".
pub fn title_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())?;
    let stem = match segment.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext, "html" | "htm" | "php" | "aspx") => stem.to_string(),
        _ => segment,
    };
    let title = title_case(&stem.replace(['-', '_'], " "));
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
