//! Applications with published theme-park stylesheets

use once_cell::sync::Lazy;
use std::collections::HashSet;

static SUPPORTED_APPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "adguard",
        "bazarr",
        "bitwarden",
        "calibreweb",
        "deluge",
        "dozzle",
        "duplicacy",
        "duplicati",
        "emby",
        "filebrowser",
        "flood",
        "gaps",
        "gitea",
        "grafana",
        "guacamole",
        "jackett",
        "jellyfin",
        "kitana",
        "lazylibrarian",
        "librespeed",
        "lidarr",
        "logarr",
        "monitorr",
        "moviematch",
        "mylar",
        "netdata",
        "nginx-proxy-manager",
        "nzbget",
        "nzbhydra",
        "ombi",
        "organizr",
        "overseerr",
        "petio",
        "pihole",
        "plex",
        "plpp",
        "portainer",
        "prowlarr",
        "qbittorrent",
        "radarr",
        "readarr",
        "requestrr",
        "resilio-sync",
        "rutorrent",
        "sabnzbd",
        "sonarr",
        "synclounge",
        "tautulli",
        "thelounge",
        "transmission",
        "unraid",
        "uptime-kuma",
        "vuetorrent",
        "webtools",
        "whisparr",
        "xbackbone",
    ]
    .into_iter()
    .collect()
});

/// Apps whose `<head>` is replaced client-side, so links must go before `</body>`
static BODY_ANCHORED_APPS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["qbittorrent", "vuetorrent"].into_iter().collect());

/// Whether theme-park publishes stylesheets for `app`
pub fn is_supported(app: &str) -> bool {
    SUPPORTED_APPS.contains(app.to_ascii_lowercase().as_str())
}

/// Whether theme links for `app` must be injected before `</body>`
pub fn is_body_anchored(app: &str) -> bool {
    BODY_ANCHORED_APPS.contains(app.to_ascii_lowercase().as_str())
}
