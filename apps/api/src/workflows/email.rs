use std::sync::OnceLock;

use regex::{Captures, NoExpand, Regex};

use crate::email::templates::escape;
use crate::tracking::{TrackingLinks, TrackingTarget};

fn name_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\{\{\s*name\s*\}\}").expect("valid placeholder regex"))
}

fn http_href() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="(http[^"]*)""#).expect("valid href regex"))
}

/// Attribute text back to the raw URL, so `?a=1&amp;b=2` is tracked as `?a=1&b=2`.
fn decode_attr(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Personalises a template body and instruments it for open/click tracking.
/// The name is HTML-escaped before it is inserted.
pub fn render_tracked_email(
    body_html: &str,
    display_name: &str,
    links: &TrackingLinks,
    target: &TrackingTarget,
) -> String {
    let name = escape(display_name);
    let personalised = name_placeholder().replace_all(body_html, NoExpand(&name));

    let rewritten = http_href().replace_all(&personalised, |caps: &Captures| {
        let destination = decode_attr(&caps[1]);
        if links.is_tracking_url(&destination) {
            caps[0].to_string()
        } else {
            format!(r#"href="{}""#, links.click_url(target, &destination))
        }
    });

    let pixel = format!(
        r#"<img src="{}" width="1" height="1" alt="" style="display:none;border:0;" />"#,
        links.open_pixel_url(target)
    );

    match rewritten.rfind("</body>") {
        Some(pos) => {
            let mut html = rewritten.into_owned();
            html.insert_str(pos, &pixel);
            html
        }
        None => format!("{rewritten}{pixel}"),
    }
}
