//! Inline notice returned for navigations that fail with nothing cached.

use crate::base_path::DeploymentContext;
use crate::html::escape_html;
use crate::http::Response;

/// Render the offline notice with a link back to the site home.
pub fn render_offline_page(context: &DeploymentContext) -> String {
  let home = escape_html(&context.with_base("./"));
  format!(
    r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Offline</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
  </head>
  <body style="font-family: Arial, sans-serif; padding: 24px;">
    <div style="max-width: 600px; margin: 0 auto;">
      <h1>Offline</h1>
      <p>You're offline. Content you've already opened is available. Please reconnect to load new lessons.</p>
      <a href="{home}" style="display:inline-block; margin-top:12px; padding:10px 14px; border-radius:999px; background:#ffd166; color:#000; text-decoration:none;">Return Home</a>
    </div>
  </body>
</html>
"#
  )
}

/// The offline notice as a successful HTML response.
pub fn offline_response(context: &DeploymentContext) -> Response {
  Response::with_content_type("text/html; charset=utf-8", render_offline_page(context))
}
