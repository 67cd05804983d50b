//! HTML pages served by the handlers.

use axum::response::Html;

const INDEX: &str = include_str!("../templates/index.html");
const PLAYLIST: &str = include_str!("../templates/playlist.html");

/// Home page with the song form.
pub fn index() -> Html<&'static str> {
    Html(INDEX)
}

/// Confirmation page linking to the new playlist.
pub fn playlist(url: &str) -> Html<String> {
    Html(PLAYLIST.replace("{{ playlist_url }}", &escape(url)))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
