use lazy_static::lazy_static;
use regex::Regex;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserAgent {
    pub engine: Option<&'static str>,
    pub browser: Option<&'static str>,
}

impl UserAgent {
    pub fn parse(header: &str) -> UserAgent {
        UserAgent {
            engine: first_match(&ENGINES, header),
            browser: first_match(&BROWSERS, header),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.unwrap_or(UNKNOWN)
    }

    pub fn browser_name(&self) -> &'static str {
        self.browser.unwrap_or(UNKNOWN)
    }
}

// Order matters: most browsers also claim to be the ones listed after them.
lazy_static! {
    static ref ENGINES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"Edge/\d").unwrap(), "EdgeHTML"),
        (Regex::new(r"Trident/\d").unwrap(), "Trident"),
        (Regex::new(r"Presto/\d").unwrap(), "Presto"),
        (Regex::new(r"AppleWebKit/.*(?:Chrome|Chromium|HeadlessChrome)/\d").unwrap(), "Blink"),
        (Regex::new(r"AppleWebKit/\d").unwrap(), "WebKit"),
        (Regex::new(r"Gecko/\d").unwrap(), "Gecko"),
    ];
    static ref BROWSERS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"Edg(?:e|A|iOS)?/\d").unwrap(), "Edge"),
        (Regex::new(r"OPR/\d|Opera").unwrap(), "Opera"),
        (Regex::new(r"SamsungBrowser/\d").unwrap(), "Samsung Internet"),
        (Regex::new(r"Firefox/\d|FxiOS/\d").unwrap(), "Firefox"),
        (Regex::new(r"HeadlessChrome/\d").unwrap(), "Chrome Headless"),
        (Regex::new(r"Chromium/\d").unwrap(), "Chromium"),
        (Regex::new(r"Chrome/\d|CriOS/\d").unwrap(), "Chrome"),
        (Regex::new(r"MSIE \d|Trident/.*rv:\d").unwrap(), "IE"),
        (Regex::new(r"Version/\d.*Safari/").unwrap(), "Safari"),
    ];
}

fn first_match(table: &[(Regex, &'static str)], header: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(pattern, _)| pattern.is_match(header))
        .map(|(_, name)| *name)
}
