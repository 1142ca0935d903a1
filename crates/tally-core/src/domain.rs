//! Domain normalization for browser usage records.
//!
//! Agents report either a bare host or a full URL depending on the
//! browser-domain-only privacy policy. Domain rules compare against the
//! normalized host. Browser records that arrive without a domain get one
//! recovered from the window title where possible.

const BROWSER_NAMES: &[&str] = &[
    "chrome", "chromium", "firefox", "safari", "edge", "brave", "opera", "vivaldi", "arc",
    "waterfox",
];

/// Reduces a URL or host to a lower-case host name.
///
/// Examples:
/// - `"https://www.GitHub.com/user/repo?tab=1"` -> `"github.com"`
/// - `"gist.github.com:443"` -> `"gist.github.com"`
/// - `"localhost"` -> `"localhost"`
///
/// Returns `None` for input with no usable host.
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop credentials and port.
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").map_or(host.clone(), str::to_string);

    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some(host)
}

/// Top-level domains accepted for bare host names found in window titles.
///
/// Kept short: file names such as `main.rs` or `setup.sh` show up in titles
/// too and must not read as hosts.
const TITLE_TLDS: &[&str] = &[
    "com", "org", "net", "io", "co", "dev", "app", "ai", "edu", "gov", "me", "us", "uk", "de",
    "fr", "jp", "ca", "au", "tv", "live", "info", "biz", "xyz", "gg", "fm",
];

/// Site names that browsers put in window titles, with the domain they stand for.
const KNOWN_SITES: &[(&str, &str)] = &[
    ("github", "github.com"),
    ("gitlab", "gitlab.com"),
    ("bitbucket", "bitbucket.org"),
    ("stack overflow", "stackoverflow.com"),
    ("npm", "npmjs.com"),
    ("pypi", "pypi.org"),
    ("docker hub", "hub.docker.com"),
    ("youtube", "youtube.com"),
    ("twitter", "twitter.com"),
    ("linkedin", "linkedin.com"),
    ("facebook", "facebook.com"),
    ("instagram", "instagram.com"),
    ("reddit", "reddit.com"),
    ("discord", "discord.com"),
    ("slack", "slack.com"),
    ("whatsapp", "web.whatsapp.com"),
    ("tiktok", "tiktok.com"),
    ("twitch", "twitch.tv"),
    ("notion", "notion.so"),
    ("figma", "figma.com"),
    ("trello", "trello.com"),
    ("asana", "asana.com"),
    ("jira", "atlassian.net"),
    ("confluence", "atlassian.net"),
    ("google docs", "docs.google.com"),
    ("google sheets", "sheets.google.com"),
    ("google slides", "slides.google.com"),
    ("google drive", "drive.google.com"),
    ("google calendar", "calendar.google.com"),
    ("google meet", "meet.google.com"),
    ("gmail", "mail.google.com"),
    ("outlook", "outlook.com"),
    ("microsoft teams", "teams.microsoft.com"),
    ("chatgpt", "chat.openai.com"),
    ("claude", "claude.ai"),
    ("amazon", "amazon.com"),
    ("netflix", "netflix.com"),
    ("spotify", "open.spotify.com"),
    ("prime video", "primevideo.com"),
    ("wikipedia", "wikipedia.org"),
    ("medium", "medium.com"),
    ("hacker news", "news.ycombinator.com"),
];

/// Recovers a domain from a browser window title.
///
/// Tried in order:
/// 1. A URL anywhere in the title (`"https://docs.rs/serde - Firefox"`).
/// 2. A bare host name (`"stackoverflow.com - Mozilla Firefox"`).
/// 3. A known site name as its own title segment
///    (`"How to Learn Rust - YouTube - Google Chrome"` -> `"youtube.com"`).
pub fn domain_from_window_title(title: &str) -> Option<String> {
    let tokens: Vec<&str> = title
        .split(|c: char| c.is_whitespace() || matches!(c, '|' | '(' | ')' | '[' | ']' | '"'))
        .filter(|token| !token.is_empty())
        .collect();

    if let Some(domain) = tokens
        .iter()
        .filter(|token| token.contains("://"))
        .find_map(|token| normalize_domain(token))
    {
        return Some(domain);
    }

    if let Some(host) = tokens.iter().find_map(|token| bare_host(token)) {
        return Some(host);
    }

    let lower = title.to_lowercase();
    let segments: Vec<&str> = lower
        .split(['-', '|', ':', '\u{b7}', '\u{2013}', '\u{2014}'])
        .map(str::trim)
        .collect();
    KNOWN_SITES
        .iter()
        .filter(|(name, _)| segments.contains(name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, domain)| (*domain).to_string())
}

/// Domain a record is classified under.
///
/// The reported domain wins. A browser record without one falls back to
/// [`domain_from_window_title`].
pub fn resolve_domain(
    app_name: &str,
    domain: Option<&str>,
    window_title: Option<&str>,
) -> Option<String> {
    match domain {
        Some(domain) => normalize_domain(domain),
        None if is_browser_app(app_name) => window_title.and_then(domain_from_window_title),
        None => None,
    }
}

fn bare_host(token: &str) -> Option<String> {
    let token = token.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let host = token.to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    let tld = labels.last()?;
    let well_formed = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if !well_formed || !TITLE_TLDS.contains(tld) {
        return None;
    }
    normalize_domain(&host)
}

/// Returns true if the application name looks like a web browser.
pub fn is_browser_app(app_name: &str) -> bool {
    let lower = app_name.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| BROWSER_NAMES.contains(&word))
        || lower.contains("browser")
}
