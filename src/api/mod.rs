//! Client for the dog-adoption REST API.
//!
//! Authentication is cookie based: `POST /auth/login` answers with an auth
//! cookie that must accompany every later request. The agent's cookie store
//! keeps it, and when given a [`KeyValueStore`] the client writes the
//! persistent cookies through so a restored session keeps its credential
//! across restarts.

pub mod types;

use crate::storage::KeyValueStore;
use cookie_store::CookieStore;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use types::{
    Dog, DogSearchParams, DogSearchResponse, Location, LocationSearchParams,
    LocationSearchResponse, Match,
};

/// Storage key for the persisted cookie header
pub const COOKIE_KEY: &str = "auth_cookie";

/// Largest id batch `POST /dogs` accepts
pub const MAX_IDS_PER_REQUEST: usize = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the server rejected our credential
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { code: 401, .. })
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Login/logout endpoints
pub trait AuthGateway {
    fn login(&self, name: &str, email: &str) -> ApiResult<()>;
    fn logout(&self) -> ApiResult<()>;
}

/// Catalog endpoints: breeds, dog search and lookup, matching, locations
pub trait CatalogGateway {
    fn breeds(&self) -> ApiResult<Vec<String>>;
    fn search_dogs(&self, params: &DogSearchParams) -> ApiResult<DogSearchResponse>;
    fn dogs_by_ids(&self, ids: &[String]) -> ApiResult<Vec<Dog>>;
    fn match_dogs(&self, ids: &[String]) -> ApiResult<Match>;
    fn locations_by_zip(&self, zip_codes: &[String]) -> ApiResult<Vec<Location>>;
    fn search_locations(&self, params: &LocationSearchParams) -> ApiResult<LocationSearchResponse>;
}

impl<T: AuthGateway + ?Sized> AuthGateway for Rc<T> {
    fn login(&self, name: &str, email: &str) -> ApiResult<()> {
        (**self).login(name, email)
    }

    fn logout(&self) -> ApiResult<()> {
        (**self).logout()
    }
}

impl<T: CatalogGateway + ?Sized> CatalogGateway for Rc<T> {
    fn breeds(&self) -> ApiResult<Vec<String>> {
        (**self).breeds()
    }

    fn search_dogs(&self, params: &DogSearchParams) -> ApiResult<DogSearchResponse> {
        (**self).search_dogs(params)
    }

    fn dogs_by_ids(&self, ids: &[String]) -> ApiResult<Vec<Dog>> {
        (**self).dogs_by_ids(ids)
    }

    fn match_dogs(&self, ids: &[String]) -> ApiResult<Match> {
        (**self).match_dogs(ids)
    }

    fn locations_by_zip(&self, zip_codes: &[String]) -> ApiResult<Vec<Location>> {
        (**self).locations_by_zip(zip_codes)
    }

    fn search_locations(&self, params: &LocationSearchParams) -> ApiResult<LocationSearchResponse> {
        (**self).search_locations(params)
    }
}

pub struct ApiClient {
    base_url: String,
    /// Replaced wholesale on logout, which is how the cookie store is emptied
    agent: RefCell<ureq::Agent>,
    timeout: Duration,
    credentials: Option<RefCell<Box<dyn KeyValueStore>>>,
    /// Last cookie JSON written to `credentials`
    saved: RefCell<Option<String>>,
}

fn build_agent(cookies: CookieStore) -> ureq::Agent {
    ureq::AgentBuilder::new().cookie_store(cookies).build()
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: RefCell::new(build_agent(CookieStore::default())),
            timeout,
            credentials: None,
            saved: RefCell::new(None),
        }
    }

    /// Persist auth cookies in `store`, loading any cookies already there
    pub fn with_credential_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        match store.get(COOKIE_KEY) {
            Ok(Some(json)) => {
                let loaded = CookieStore::load_json(json.as_bytes());
                match loaded {
                    Ok(cookies) => {
                        *self.agent.get_mut() = build_agent(cookies);
                        *self.saved.get_mut() = Some(json);
                        tracing::debug!("restored auth cookies");
                    }
                    Err(e) => tracing::warn!("discarding unreadable stored cookies: {}", e),
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("failed to read stored auth cookies: {:#}", e),
        }
        self.credentials = Some(RefCell::new(store));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True while the cookie store holds an unexpired cookie
    pub fn has_credential(&self) -> bool {
        let agent = self.agent.borrow();
        let cookies = agent.cookie_store();
        let found = cookies.iter_unexpired().next().is_some();
        found
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .borrow()
            .request(method, &self.url(path))
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
    }

    fn send(&self, req: ureq::Request, body: Option<Value>) -> ApiResult<ureq::Response> {
        let method = req.method().to_string();
        let url = req.url().to_string();
        let resp = match body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };

        match resp {
            Ok(r) => {
                tracing::debug!(%method, %url, status = r.status(), "request ok");
                self.persist_cookies();
                Ok(r)
            }
            Err(ureq::Error::Status(code, resp)) => {
                self.persist_cookies();
                let body = resp.into_string().unwrap_or_default();
                tracing::debug!(%method, %url, code, "request rejected");
                Err(ApiError::Status { code, body })
            }
            Err(e) => Err(ApiError::Transport(e.to_string())),
        }
    }

    /// Write the agent's cookies through to the credential store when they changed.
    /// Once no live cookie is left the stored entry is removed.
    fn persist_cookies(&self) {
        let Some(store) = &self.credentials else {
            return;
        };

        let mut buf = Vec::new();
        if let Err(e) = self.agent.borrow().cookie_store().save_json(&mut buf) {
            tracing::warn!("failed to serialize auth cookies: {}", e);
            return;
        }
        let json = String::from_utf8_lossy(&buf).into_owned();
        if self.saved.borrow().as_deref() == Some(json.as_str()) {
            return;
        }

        let result = if self.has_credential() {
            store.borrow_mut().set(COOKIE_KEY, &json)
        } else {
            store.borrow_mut().remove(COOKIE_KEY)
        };
        match result {
            Ok(()) => *self.saved.borrow_mut() = Some(json),
            Err(e) => tracing::warn!("failed to persist auth cookies: {:#}", e),
        }
    }

    fn clear_cookies(&self) {
        *self.agent.borrow_mut() = build_agent(CookieStore::default());
        *self.saved.borrow_mut() = None;
        self.persist_cookies();
    }

    fn get_json<T: DeserializeOwned>(&self, req: ureq::Request) -> ApiResult<T> {
        let resp = self.send(req, None)?;
        resp.into_json().map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> ApiResult<T> {
        let resp = self.send(self.request("POST", path), Some(body))?;
        resp.into_json().map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl AuthGateway for ApiClient {
    fn login(&self, name: &str, email: &str) -> ApiResult<()> {
        // The body is plain "OK"; only the status and cookie matter
        self.send(
            self.request("POST", "/auth/login"),
            Some(json!({ "name": name, "email": email })),
        )?;
        Ok(())
    }

    fn logout(&self) -> ApiResult<()> {
        let result = self.send(self.request("POST", "/auth/logout"), None);
        // The credential is gone locally whatever the server said
        self.clear_cookies();
        result.map(|_| ())
    }
}

impl CatalogGateway for ApiClient {
    fn breeds(&self) -> ApiResult<Vec<String>> {
        self.get_json(self.request("GET", "/dogs/breeds"))
    }

    fn search_dogs(&self, params: &DogSearchParams) -> ApiResult<DogSearchResponse> {
        let mut req = self.request("GET", "/dogs/search");
        for (key, value) in params.query_pairs() {
            req = req.query(key, &value);
        }
        self.get_json(req)
    }

    fn dogs_by_ids(&self, ids: &[String]) -> ApiResult<Vec<Dog>> {
        let mut dogs = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let batch: Vec<Dog> = self.post_json("/dogs", json!(chunk))?;
            dogs.extend(batch);
        }
        Ok(dogs)
    }

    fn match_dogs(&self, ids: &[String]) -> ApiResult<Match> {
        self.post_json("/dogs/match", json!(ids))
    }

    fn locations_by_zip(&self, zip_codes: &[String]) -> ApiResult<Vec<Location>> {
        let mut locations = Vec::with_capacity(zip_codes.len());
        for chunk in zip_codes.chunks(MAX_IDS_PER_REQUEST) {
            // Unknown zip codes come back as null entries
            let batch: Vec<Option<Location>> = self.post_json("/locations", json!(chunk))?;
            locations.extend(batch.into_iter().flatten());
        }
        Ok(locations)
    }

    fn search_locations(&self, params: &LocationSearchParams) -> ApiResult<LocationSearchResponse> {
        let body = serde_json::to_value(params).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.post_json("/locations/search", body)
    }
}
