//! Inline HTML template for the OAuth2 login form

use crate::flows::authorization_code::LoginForm;

/// Login form posted to `/oauth2/authorize/submit`.
///
/// Every request parameter is carried through as a hidden field so a failed
/// attempt can simply re-render the page.
pub fn login_page(form: &LoginForm) -> String {
    let error = form
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="status error">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    let challenge = if form.show_challenge {
        r#"<div class="field">
                <label for="challenge">Challenge</label>
                <input type="text" id="challenge" name="challenge" autocomplete="one-time-code" required>
            </div>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sign in</title>
    <style>{css}</style>
</head>
<body>
    <div class="container">
        <h1>Sign in</h1>
        <p>Sign in to continue to <code>{client_id}</code>.</p>
        {error}
        <form method="post" action="/oauth2/authorize/submit">
            <input type="hidden" name="client_id" value="{client_id}">
            <input type="hidden" name="redirect_uri" value="{redirect_uri}">
            <input type="hidden" name="scope" value="{scope}">
            <input type="hidden" name="state" value="{state}">
            <input type="hidden" name="nonce" value="{nonce}">
            <div class="field">
                <label for="username">Username</label>
                <input type="text" id="username" name="username" autocomplete="username" required>
            </div>
            <div class="field">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" autocomplete="current-password" required>
            </div>
            {challenge}
            <button type="submit">Sign in</button>
        </form>
    </div>
</body>
</html>"#,
        css = CSS_STYLES,
        client_id = html_escape(&form.client_id),
        redirect_uri = html_escape(&form.redirect_uri),
        scope = html_escape(&form.scope),
        state = html_escape(&form.state),
        nonce = html_escape(&form.nonce),
        error = error,
        challenge = challenge,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

const CSS_STYLES: &str = r#"
* {
    box-sizing: border-box;
}
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f5f7;
    color: #222;
    margin: 0;
    padding: 20px;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
}
.container {
    background: #fff;
    padding: 40px;
    border-radius: 8px;
    max-width: 380px;
    width: 100%;
    box-shadow: 0 2px 12px rgba(0,0,0,0.1);
}
h1 {
    margin: 0 0 10px 0;
    font-size: 22px;
}
p {
    color: #555;
    margin: 0 0 20px 0;
}
.field {
    margin-bottom: 16px;
}
label {
    display: block;
    margin-bottom: 6px;
    font-size: 14px;
}
input {
    width: 100%;
    padding: 10px;
    border: 1px solid #ccc;
    border-radius: 4px;
    font-size: 16px;
}
button {
    width: 100%;
    padding: 12px;
    background: #2563eb;
    color: #fff;
    border: none;
    border-radius: 4px;
    font-size: 16px;
    cursor: pointer;
}
button:hover {
    background: #1d4ed8;
}
.status.error {
    margin-bottom: 16px;
    padding: 10px;
    border-radius: 4px;
    background: #fee2e2;
    color: #991b1b;
    font-size: 14px;
}
code {
    background: #f0f0f0;
    padding: 2px 6px;
    border-radius: 4px;
}
"#;
