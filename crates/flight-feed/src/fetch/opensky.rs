// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP state source for the OpenSky `states/all` endpoint.
//!
//! The same source works against a pass-through proxy: point `url` at the
//! proxy and leave `auth` unset.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;

use super::{Bounds, FetchError, StateSource};
use crate::auth::TokenProvider;
use crate::protocol::{OpenSkyParser, Protocol, StateVector};

pub const OPENSKY_STATES_URL: &str = "https://opensky-network.org/api/states/all";

/// Aircraft states over HTTP, optionally authenticated with a bearer token.
#[derive(Clone)]
pub struct OpenSkySource {
    http: reqwest::Client,
    url: String,
    auth: Option<Arc<dyn TokenProvider>>,
}

impl std::fmt::Debug for OpenSkySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSkySource")
            .field("url", &self.url)
            .field("authenticated", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenSkySource {
    #[must_use]
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self {
            http,
            url,
            auth: None,
        }
    }

    /// Attach a token provider; every request then carries a bearer token.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn TokenProvider>) -> Self {
        self.auth = Some(auth);
        self
    }
}

#[async_trait]
impl StateSource for OpenSkySource {
    async fn fetch_states(&self, bounds: &Bounds) -> Result<Vec<StateVector>, FetchError> {
        let mut request = self.http.get(&self.url).query(&[
            ("lamin", bounds.south),
            ("lomin", bounds.west),
            ("lamax", bounds.north),
            ("lomax", bounds.east),
        ]);

        if let Some(auth) = &self.auth {
            let token = auth.token().await?;
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                if let Some(auth) = &self.auth {
                    warn!("Upstream rejected access token, discarding it");
                    auth.invalidate().await;
                }
            }
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        debug!("Received {} byte state payload", bytes.len());

        let mut parser = OpenSkyParser::new();
        Ok(parser.parse(&bytes)?)
    }
}
