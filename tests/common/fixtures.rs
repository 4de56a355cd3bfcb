#![allow(dead_code)]

/// A short article mixing every recognized tag.
pub const ARTICLE: &str = r#"<p>Opening <strong>bold <em>both</em> bold</strong> text.</p>
<img src="https://cdn.test/hero.png" width="640" height="320">
<img src="https://cdn.test/hero.png" width="640" height="320">
<blockquote>Quoted <em>words</em></blockquote>
<a href="https://site.test/gallery"><img src="https://cdn.test/thumb.jpg" align="left" width="80" height="80"/></a>
<p>Middle</p>
<iframe src="https://video.test/embed/1" width="480" height="270"></iframe>
<video controls><source src="clip.webm"><source src="clip.mp4"></video>
<hr>
<p>Closing</p>"#;

/// Inputs that must never panic and must never leak placeholder or sentinel
/// characters into the prepared text.
pub const HOSTILE: &[&str] = &[
    "",
    "plain text only",
    "<img",
    "<img src=\"a.png",
    "<img src=\"a.png\" width=\"abc\" height=\"-4\">",
    "<strong><strong>nested</strong></strong>",
    "<strong>unclosed <em>emphasis",
    "</em>closer first<em>",
    "<blockquote><blockquote>deep</blockquote></blockquote>",
    "<a href=\"x\"><a href=\"y\"><img src=\"z\"></a></a>",
    "<video><source></video>",
    "<p>&unknown; &amp; &#x41; &#65;</p>",
    "<p b=\"unterminated>text</p>",
    "<iframe src=\"f\"><iframe src=\"g\"></iframe></iframe>",
    "\u{FFFC}\u{E000}img-1\u{E001}\u{E002}",
    "<hr/><hr><hr />",
];

/// `count` absolutely-sized images separated by short paragraphs.
pub fn sized_images(count: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        out.push_str(&format!(
            "<p>para {i}</p><img src=\"https://cdn.test/{i}.png\" width=\"{}\" height=\"{}\">",
            100 + i,
            50 + i
        ));
    }
    out
}
