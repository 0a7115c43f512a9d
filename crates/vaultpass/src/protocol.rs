//! Endpoint constants and response-payload helpers
//!
//! The service replies with small XML-ish documents; per the protocol
//! they are matched by attribute, not parsed as full XML documents.

pub(crate) mod endpoints {
    pub const ITERATIONS: &str = "/iterations.php";
    pub const LOGIN: &str = "/login.php";
    pub const LOGIN_CHECK: &str = "/login_check.php";
    pub const ACCOUNTS: &str = "/getaccts.php";
    pub const SITE: &str = "/show_website.php";
    pub const LOGOUT: &str = "/logout.php";
}

/// Extract the first `name="value"` attribute from a response body.
///
/// The attribute name must be preceded by whitespace or `<` so that
/// `aid` never matches inside `said`.
pub(crate) fn xml_attr(body: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let mut search = 0;
    while let Some(found) = body[search..].find(&needle) {
        let start = search + found;
        let value_start = start + needle.len();
        let boundary = start == 0
            || matches!(
                body.as_bytes()[start - 1],
                b' ' | b'\t' | b'\r' | b'\n' | b'<'
            );
        if boundary {
            let value_end = body[value_start..].find('"')? + value_start;
            return Some(body[value_start..value_end].to_string());
        }
        search = value_start;
    }
    None
}
