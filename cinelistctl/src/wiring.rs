use std::sync::Arc;

use cinelist_config::{ClientConfig, ConfigLoadError};
use cinelist_core::CinelistClient;
use cinelist_core::backend::http::{
    HttpAuthBackend, HttpListStore, RestClient,
};

/// HTTP backends plus a client wired to them.
///
/// The auth backend is kept separately because password sign-in is not part
/// of the [`AuthBackend`](cinelist_core::backend::AuthBackend) contract.
pub struct Wired {
    pub auth: Arc<HttpAuthBackend>,
    pub client: CinelistClient,
}

pub fn connect(config: &ClientConfig, auto_sync: bool) -> anyhow::Result<Wired> {
    let url = config
        .backend
        .url
        .as_ref()
        .ok_or(ConfigLoadError::Missing("backend.url"))?;
    let anon_key = config
        .backend
        .anon_key
        .as_deref()
        .ok_or(ConfigLoadError::Missing("backend.anon_key"))?;

    let rest = RestClient::new(
        url.as_str(),
        anon_key,
        config.backend.request_timeout(),
    )?;
    let auth = Arc::new(HttpAuthBackend::new(rest.clone()));
    let lists = Arc::new(HttpListStore::new(rest, auth.session_handle()));

    let client = CinelistClient::builder(auth.clone(), lists)
        .config(config.core.clone())
        .auto_sync(auto_sync)
        .build();
    Ok(Wired { auth, client })
}
