// Resource commands
pub mod resource;

// Manifest commands
pub mod apply;

use crate::Context;
use crate::config::Settings;
use sacloud::http::HttpCloud;

/// Open an authenticated session for the resolved settings.
pub fn connect(settings: &Settings) -> converge::Result<HttpCloud> {
    sacloud::authenticate(settings.credentials.clone(), settings.zone)
        .map_err(|e| converge::Error::Auth(e.to_string()))
}

/// Whether progress indicators should be drawn.
pub fn show_progress(ctx: &Context) -> bool {
    !(ctx.quiet || ctx.json)
}
