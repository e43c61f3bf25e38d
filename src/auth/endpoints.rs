use url::Url;

use crate::http::join_path;

/// URL endpoints of the GoTrue-style identity service, derived from the
/// backend base URL (`{backend}/auth/v1/...`).
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub signup: Url,
    pub refresh: Url,
}

impl Endpoints {
    pub fn for_backend(backend: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            signup: join_path(backend, "auth/v1/signup")?,
            refresh: join_path(backend, "auth/v1/token?grant_type=refresh_token")?,
        })
    }
}
