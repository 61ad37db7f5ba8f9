//! HTML pages served by the upload UI.

use crate::process::MediaKind;

pub(crate) fn index_page() -> String {
    r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Car Damage Detection</title></head>
<body>
<h1>Car Damage Detection</h1>
<form method="post" action="/upload" enctype="multipart/form-data">
  <input type="file" name="file" accept=".png,.jpg,.jpeg,.mp4">
  <input type="submit" value="Upload">
</form>
<p><a href="/live_feed">Live camera feed</a></p>
</body>
</html>
"#
    .to_string()
}

/// Result page for a processed upload. `output_url` is a public static path.
pub(crate) fn result_page(output_url: &str, kind: MediaKind) -> String {
    let url = escape_html(output_url);
    let media = match kind {
        MediaKind::Image => format!(r#"<img src="{url}" alt="Processed image">"#),
        MediaKind::Video => format!(
            r#"<video controls><source src="{url}" type="video/mp4">Your browser does not support the video tag.</video>"#
        ),
    };
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Detection Result</title></head>
<body>
<h1>Detection Result</h1>
{media}
<p><a href="/">Upload another file</a></p>
</body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_page_embeds_media_by_kind() {
        let image = result_page("/static/uploads/output_car.JPG", MediaKind::Image);
        assert!(image.contains(r#"<img src="/static/uploads/output_car.JPG""#));
        let video = result_page("/static/uploads/output_clip.mp4", MediaKind::Video);
        assert!(video.contains(r#"<source src="/static/uploads/output_clip.mp4" type="video/mp4">"#));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html(r#"a"<b>&"#), "a&quot;&lt;b&gt;&amp;");
    }
}
