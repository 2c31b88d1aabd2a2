//! Inline HTML for the consent and sign-in-required pages

use auth_core::ConsentGrant;

use super::consent;

/// Consent page for a validated authorization request.
///
/// `action` is the original `/authorize` URI, so the decision form posts back
/// with every authorization parameter still in the query string. `token` is
/// the anti-forgery token for that URI.
pub fn consent_page(grant: &ConsentGrant, action: &str, token: &str) -> String {
    let client_name = grant
        .client
        .client_metadata
        .client_name
        .as_deref()
        .unwrap_or(&grant.client.client_id);
    let user_name = grant.user.as_ref().map(|u| u.name.as_str()).unwrap_or_default();

    let scopes = grant.scopes();
    let scope_list = if scopes.is_empty() {
        "<li>Basic access</li>".to_string()
    } else {
        scopes
            .iter()
            .map(|s| format!("<li><code>{}</code></li>", html_escape(s)))
            .collect::<Vec<_>>()
            .join("\n            ")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Authorize {client}</title>
    <style>{css}</style>
</head>
<body>
    <main class="card">
        <h1>Authorize {client}</h1>
        <p>Signed in as <strong>{user}</strong>. <strong>{client}</strong> is requesting:</p>
        <ul class="scopes">
            {scopes}
        </ul>
        <p class="muted">You will be returned to {redirect}</p>
        <form method="post" action="{action}">
            <input type="hidden" name="{field}" value="{token}">
            <button type="submit" name="decision" value="approve">Approve</button>
            <button type="submit" name="decision" value="deny" class="secondary">Deny</button>
        </form>
    </main>
</body>
</html>"#,
        css = CSS_STYLES,
        client = html_escape(client_name),
        user = html_escape(user_name),
        scopes = scope_list,
        redirect = html_escape(&grant.redirect_uri),
        action = html_escape(action),
        field = consent::FIELD,
        token = html_escape(token),
    )
}

/// Shown when no authenticated end-user accompanies an authorization request
pub fn login_required_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sign-in required</title>
    <style>{}</style>
</head>
<body>
    <main class="card">
        <h1>Sign-in required</h1>
        <p>This authorization request needs a signed-in user. Sign in through your identity provider and retry.</p>
    </main>
</body>
</html>"#,
        CSS_STYLES
    )
}

/// Shown when a consent decision arrives without the token from its consent page
pub fn consent_rejected_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Request rejected</title>
    <style>{}</style>
</head>
<body>
    <main class="card">
        <h1>Request rejected</h1>
        <p>This decision did not come from the consent page. Return to the application and start again.</p>
    </main>
</body>
</html>"#,
        CSS_STYLES
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
body {
    font-family: system-ui, -apple-system, "Segoe UI", sans-serif;
    background: #f4f5f7;
    color: #1f2937;
    margin: 0;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
}
.card {
    background: #fff;
    border: 1px solid #e5e7eb;
    border-radius: 10px;
    padding: 32px;
    max-width: 420px;
    width: 100%;
}
h1 { font-size: 22px; margin: 0 0 12px 0; }
p { line-height: 1.5; margin: 0 0 16px 0; }
.muted { color: #6b7280; font-size: 13px; word-break: break-all; }
.scopes { margin: 0 0 16px 0; padding-left: 20px; }
code { background: #f3f4f6; padding: 1px 5px; border-radius: 4px; }
form { display: flex; gap: 12px; }
button {
    flex: 1;
    padding: 12px;
    border: none;
    border-radius: 6px;
    font-size: 15px;
    cursor: pointer;
    background: #2563eb;
    color: #fff;
}
button.secondary { background: #e5e7eb; color: #1f2937; }
"#;
