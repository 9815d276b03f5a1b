//! Cleanup passes applied to converted Markdown, in order.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("lang prefix regex")
});

static STRAY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?(?:div|span|section|article|figure|figcaption|details|summary)(?:\s[^>]*)?>")
        .expect("stray tag regex")
});

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("link regex"));

pub(crate) fn run_pipeline(md: &str, base: &Url) -> String {
    let md = LANG_PREFIX_RE.replace_all(md, "```$1");
    let md = outside_code(&md, |line| STRAY_TAG_RE.replace_all(line, "").into_owned());
    let md = outside_code(&md, |line| resolve_links(line, base));

    let md: Vec<&str> = md.lines().map(str::trim_end).collect();
    let md = BLANK_RUN_RE.replace_all(&md.join("\n"), "\n\n").into_owned();

    format!("{}\n", md.trim_matches('\n'))
}

/// Apply `f` to every line that is not inside a fenced code block.
fn outside_code(md: &str, f: impl Fn(&str) -> String) -> String {
    let mut in_code = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_code = !in_code;
                line.to_string()
            } else if in_code {
                line.to_string()
            } else {
                f(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve relative link targets against the page URL. Images are left alone.
fn resolve_links(line: &str, base: &Url) -> String {
    LINK_RE
        .replace_all(line, |caps: &Captures| {
            let (bang, text, href) = (&caps[1], &caps[2], &caps[3]);
            let absolute = bang == "!"
                || href.starts_with('#')
                || href.starts_with("mailto:")
                || Url::parse(href).is_ok();
            if absolute {
                return caps[0].to_string();
            }
            match base.join(href) {
                Ok(resolved) => format!("[{text}]({resolved})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}
