//! Theme names shared by every supported application

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Suffix of the per-app base theme (`{app}-base`)
pub const BASE_THEME: &str = "base";

static THEMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "aquamarine",
        "dark",
        "dracula",
        "hotline",
        "hotpink",
        "maroon",
        "nord",
        "onedark",
        "organizr",
        "overseerr",
        "plex",
        "space-gray",
    ]
    .into_iter()
    .collect()
});

/// Whether `theme` is a published theme, including the `{app}-base` variant
pub fn is_supported(app: &str, theme: &str) -> bool {
    let theme = theme.to_ascii_lowercase();
    THEMES.contains(theme.as_str()) || theme == base_theme(app)
}

/// Base theme name for `app`
pub fn base_theme(app: &str) -> String {
    format!("{}-{BASE_THEME}", app.to_ascii_lowercase())
}
