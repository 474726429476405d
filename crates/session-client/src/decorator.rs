//! Bearer credential injection for outbound requests

use reqwest::header::{AUTHORIZATION, HeaderValue};
use tracing::warn;
use transport::RequestDescriptor;

/// Attach `access_token` as `Authorization: Bearer …`.
///
/// Any existing Authorization header is replaced, so a replay never carries
/// the credential that was just rejected. With no token (or one that can't be
/// encoded as a header value) the request goes out unauthenticated and the
/// server's 401 drives the refresh flow.
pub fn decorate(request: &mut RequestDescriptor, access_token: Option<&str>) {
    request.headers.remove(AUTHORIZATION);

    let Some(token) = access_token else {
        return;
    };

    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Err(e) => {
            warn!(error = %e, "access token is not a valid header value, sending unauthenticated");
        }
    }
}
