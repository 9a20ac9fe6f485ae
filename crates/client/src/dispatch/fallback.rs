//! Locally generated last-resort responses.

use serde::{Deserialize, Serialize};
use shellcache_core::ResponseArtifact;

/// One record of the phrase dataset served by the primary data endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub id: i64,
    pub ukrainian: String,
    pub english: String,
    pub pronunciation: String,
    pub category: String,
}

impl Phrase {
    fn new(id: i64, ukrainian: &str, english: &str, pronunciation: &str, category: &str) -> Self {
        Self {
            id,
            ukrainian: ukrainian.into(),
            english: english.into(),
            pronunciation: pronunciation.into(),
            category: category.into(),
        }
    }
}

/// Built-in phrases for a cold cache with no connectivity.
pub fn seed_phrases() -> Vec<Phrase> {
    vec![
        Phrase::new(1, "Допоможіть!", "Help!", "Do-po-mo-zheet", "emergency"),
        Phrase::new(2, "Дякую", "Thank you", "Dya-ku-yu", "greetings"),
        Phrase::new(3, "Привіт", "Hello", "Pry-veet", "greetings"),
    ]
}

/// The seed dataset as a 200 JSON response.
pub fn seed_response() -> ResponseArtifact {
    let body = serde_json::to_vec(&seed_phrases()).unwrap_or_else(|_| b"[]".to_vec());
    ResponseArtifact::new(200, body).with_header("content-type", "application/json")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Self-contained offline notice with a retry button.
///
/// No external stylesheets or scripts. Reloads on its own once the browser
/// reports it is back online.
pub fn offline_page(app_name: &str) -> ResponseArtifact {
    let app_name = escape_html(app_name);
    let document = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Offline - {app_name}</title>
<style>
  body {{ font-family: system-ui, -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0; padding: 20px;
         min-height: 100vh; display: flex; align-items: center; justify-content: center;
         background: #eef5f8; color: #343a40; }}
  main {{ max-width: 500px; text-align: center; background: #fff; padding: 40px; border-radius: 16px;
         box-shadow: 0 10px 30px rgba(0, 0, 0, 0.1); }}
  h1 {{ color: #1a5f7a; font-size: 28px; }}
  p {{ color: #6c757d; line-height: 1.6; }}
  ul {{ list-style: none; padding: 0; text-align: left; }}
  li {{ padding: 8px 0; border-bottom: 1px solid #eee; }}
  button {{ background: #1a5f7a; color: #fff; padding: 12px 24px; border: none; border-radius: 8px;
           font-weight: 500; cursor: pointer; }}
</style>
</head>
<body>
<main>
  <h1>You're Offline</h1>
  <p>No internet connection detected. Parts of {app_name} are still available from this device.</p>
  <ul>
    <li>Cached translation phrases</li>
    <li>Previously viewed lessons</li>
    <li>Saved community information</li>
  </ul>
  <button id="retry" type="button" onclick="window.location.reload()">Try Again</button>
</main>
<script>
  window.addEventListener('online', function () {{ window.location.reload(); }});
</script>
</body>
</html>
"#
    );
    ResponseArtifact::html(document)
}
