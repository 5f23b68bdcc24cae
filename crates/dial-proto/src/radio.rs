//! radio-browser.info directory client.
//!
//! The directory is a community mirror network: a random mirror is picked at
//! construction, best effort; the round-robin alias works as a fallback.

use anyhow::{anyhow, bail, Context};
use futures_util::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://all.api.radio-browser.info";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
const MAX_PAGE_SIZE: usize = 500;
/// Response size cap, guards against a malformed mirror response.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Station {
    #[serde(rename = "stationuuid", default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "url_resolved", default)]
    pub url_resolved: String,
    #[serde(default)]
    pub country: String,
    #[serde(rename = "countrycode", default)]
    pub country_code: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub bitrate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Country {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "iso_3166_1", default)]
    pub code: String,
    #[serde(rename = "stationcount", default)]
    pub station_count: u32,
}

#[derive(Debug, Deserialize)]
struct ServerInfo {
    #[serde(default)]
    name: String,
}

pub struct RadioClient {
    base_url: String,
    http: reqwest::Client,
}

impl RadioClient {
    /// Build a client and try to pin it to one concrete mirror.
    pub async fn new(user_agent: &str) -> anyhow::Result<Self> {
        let mut client = Self::with_base_url(user_agent, DEFAULT_BASE_URL)?;
        match client.pick_random_server().await {
            Ok(base) => client.base_url = base,
            Err(e) => debug!("mirror discovery failed, using {}: {}", client.base_url, e),
        }
        Ok(client)
    }

    pub fn with_base_url(user_agent: &str, base_url: &str) -> anyhow::Result<Self> {
        if user_agent.trim().is_empty() {
            bail!("user agent is required");
        }
        let http = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetch stations by ISO country code (first page, popularity order).
    pub async fn stations_by_country(&self, country_code: &str) -> anyhow::Result<Vec<Station>> {
        self.stations_by_country_page(country_code, 200, 0).await
    }

    pub async fn stations_by_country_page(
        &self,
        country_code: &str,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<Station>> {
        let country_code = normalize_country(country_code)?;
        let (limit, offset) = sanitize_page(limit, offset)?;

        let url = format!(
            "{}/json/stations/bycountrycodeexact/{}",
            self.base_url, country_code
        );
        self.get_json(&url, &station_query(limit, offset)).await
    }

    /// Search stations by name within a country.  When the first page of the
    /// name search comes back empty, fall back to a tag search for
    /// discoverability; the fallback is only attempted at offset 0.
    pub async fn search_stations_by_country(
        &self,
        country_code: &str,
        search: &str,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<Station>> {
        let country_code = normalize_country(country_code)?;
        let search = search.trim();
        if search.is_empty() {
            bail!("search query is required");
        }
        let (limit, offset) = sanitize_page(limit, offset)?;

        let stations = self
            .search_field(&country_code, "name", search, limit, offset)
            .await?;
        if !stations.is_empty() || offset > 0 {
            return Ok(stations);
        }

        self.search_field(&country_code, "tag", search, limit, offset)
            .await
    }

    /// Fetch the country list, sorted case-insensitively by name.
    pub async fn countries(&self) -> anyhow::Result<Vec<Country>> {
        let url = format!("{}/json/countries", self.base_url);
        let mut countries: Vec<Country> = self.get_json(&url, &[]).await?;
        countries.sort_by_key(|c| c.name.to_lowercase());
        Ok(countries)
    }

    /// Resolve a station uuid to a streamable URL via `/json/url/{uuid}`.
    /// Mirrors disagree on whether the response is one object or an array.
    pub async fn resolve_station_url(&self, uuid: &str) -> anyhow::Result<String> {
        let uuid = uuid.trim();
        if uuid.is_empty() {
            bail!("station uuid is required");
        }

        let url = format!("{}/json/url/{}", self.base_url, uuid);
        let data = self.get_bytes(&url, &[]).await?;

        if let Ok(station) = serde_json::from_slice::<Station>(&data) {
            if !station.uuid.is_empty() {
                return resolved_url(&station);
            }
        }

        let stations: Vec<Station> = serde_json::from_slice(&data)?;
        match stations.first() {
            Some(station) => resolved_url(station),
            None => bail!("no station data returned"),
        }
    }

    async fn search_field(
        &self,
        country_code: &str,
        field: &str,
        value: &str,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<Station>> {
        let mut query = station_query(limit, offset);
        query.push(("countrycodeexact".into(), country_code.to_string()));
        query.push((field.into(), value.to_string()));

        let url = format!("{}/json/stations/search", self.base_url);
        self.get_json(&url, &query).await
    }

    async fn pick_random_server(&self) -> anyhow::Result<String> {
        let url = format!("{}/json/servers", DEFAULT_BASE_URL);
        let servers: Vec<ServerInfo> = self.get_json(&url, &[]).await?;
        if servers.is_empty() {
            bail!("no api servers returned");
        }

        let idx = rand::thread_rng().gen_range(0..servers.len());
        let name = servers[idx].name.trim();
        if name.is_empty() {
            bail!("empty server name");
        }
        Ok(format!("https://{name}"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> anyhow::Result<T> {
        let data = self.get_bytes(url, query).await?;
        serde_json::from_slice(&data).with_context(|| format!("decode response from {url}"))
    }

    async fn get_bytes(&self, url: &str, query: &[(String, String)]) -> anyhow::Result<Vec<u8>> {
        let resp = self.http.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("request failed: {status}");
        }

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                bail!("response from {url} exceeds {MAX_BODY_BYTES} bytes");
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn normalize_country(country_code: &str) -> anyhow::Result<String> {
    let code = country_code.trim().to_ascii_uppercase();
    if code.is_empty() {
        bail!("country code is required");
    }
    Ok(code)
}

fn station_query(limit: usize, offset: usize) -> Vec<(String, String)> {
    vec![
        ("hidebroken".into(), "true".into()),
        ("order".into(), "clickcount".into()),
        ("reverse".into(), "true".into()),
        ("limit".into(), limit.to_string()),
        ("offset".into(), offset.to_string()),
    ]
}

fn sanitize_page(limit: usize, offset: usize) -> anyhow::Result<(usize, usize)> {
    if limit == 0 {
        bail!("limit must be greater than zero");
    }
    if limit > MAX_PAGE_SIZE {
        bail!("limit must be <= {MAX_PAGE_SIZE}");
    }
    Ok((limit, offset))
}

fn resolved_url(station: &Station) -> anyhow::Result<String> {
    if !station.url_resolved.trim().is_empty() {
        return Ok(station.url_resolved.clone());
    }
    if !station.url.trim().is_empty() {
        return Ok(station.url.clone());
    }
    Err(anyhow!("station has no stream url"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_page_bounds() {
        assert!(sanitize_page(0, 0).is_err());
        assert!(sanitize_page(501, 0).is_err());
        assert_eq!(sanitize_page(500, 10).unwrap(), (500, 10));
        assert_eq!(sanitize_page(1, 0).unwrap(), (1, 0));
    }

    #[test]
    fn normalize_country_uppercases() {
        assert_eq!(normalize_country(" us ").unwrap(), "US");
        assert!(normalize_country("  ").is_err());
    }

    #[test]
    fn resolved_url_prefers_url_resolved() {
        let mut station = Station {
            url: "http://a.example/stream".into(),
            url_resolved: "http://b.example/stream".into(),
            ..Default::default()
        };
        assert_eq!(resolved_url(&station).unwrap(), "http://b.example/stream");

        station.url_resolved.clear();
        assert_eq!(resolved_url(&station).unwrap(), "http://a.example/stream");

        station.url.clear();
        assert!(resolved_url(&station).is_err());
    }

    #[test]
    fn station_deserializes_directory_json() {
        let raw = r#"{
            "stationuuid": "9617a958-0601-11e8-ae97-52543be04c81",
            "name": "Example FM",
            "url": "http://example.com/stream.mp3",
            "url_resolved": "http://example.com/stream.mp3",
            "country": "United States",
            "countrycode": "US",
            "tags": "rock,classic",
            "codec": "MP3",
            "bitrate": 128,
            "lastcheckok": 1
        }"#;
        let station: Station = serde_json::from_str(raw).unwrap();
        assert_eq!(station.uuid, "9617a958-0601-11e8-ae97-52543be04c81");
        assert_eq!(station.country_code, "US");
        assert_eq!(station.bitrate, 128);
    }

    #[test]
    fn empty_user_agent_rejected() {
        assert!(RadioClient::with_base_url("  ", DEFAULT_BASE_URL).is_err());
    }
}
