//! Etherscan API client.
//!
//! Requests are executed exactly once; whether and when a failed request is repeated is up to the caller
//! (see [`crate::retry`]). Response handlers only decide whether a response counts as a success.

use crate::error::Error;
use log::debug;
use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::Response;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub mod etherscan;

#[derive(Clone)]
struct RequestHandler {
    client: Client,
}

/// Handler responsible for the Etherscan API modules reporting their outcome in a `status` field, e.g.
/// `gastracker`.
struct EtherscanResponseHandler;

/// Handler responsible for the Etherscan `proxy` module, which forwards JSON-RPC responses.
struct ProxyResponseHandler;

trait ResponseHandler {
    /// Prepares a request by i.e. setting it's headers or query parameters.
    fn prepare(request_handler: &RequestHandler, url: &Url) -> RequestBuilder {
        request_handler.client.get(url.clone())
    }

    /// Given a successful (2xx) response body returns it if its content signals success as well.
    fn process(url: &str, content: String) -> Result<String, Error>;
}

impl RequestHandler {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(RequestHandler {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Sends a single request and returns the response body.
    fn execute<T: ResponseHandler>(&self, url: &Url) -> Result<String, Error> {
        let response: Response = T::prepare(self, url).send().map_err(Error::HttpRequest)?;
        let url = redact(response.url());

        match response.status().is_success() {
            true => {
                let content = response.text().map_err(|why| Error::HttpBody(url.clone(), why))?;
                debug!("Received {} bytes from '{url}'", content.len());

                T::process(&url, content)
            }

            false => Err(Error::HttpStatus(response.status().as_u16(), url)),
        }
    }
}

/// Returns the URL without its `apikey` query parameter, so it can be logged.
fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| match key.as_ref() {
            "apikey" => (key.into_owned(), "***".to_string()),
            _ => (key.into_owned(), value.into_owned()),
        })
        .collect();

    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Maps the `result` message of a response with `status: "0"` to an error.
fn etherscan_error(url: &str, message: &str) -> Error {
    match message {
        message if message.starts_with("Invalid API Key") => Error::EtherscanInvalidToken(url.to_string()),
        message if message.starts_with("Max rate limit reached") => Error::EtherscanRateLimited(url.to_string()),
        _ => Error::EtherscanRejected(url.to_string(), message.to_string()),
    }
}

impl ResponseHandler for EtherscanResponseHandler {
    fn process(url: &str, content: String) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct Page {
            status: String,
            message: Option<String>,
            result: serde_json::Value,
        }

        let json = serde_json::from_str::<Page>(&content)
            .map_err(|why| Error::HttpMalformedBody(url.to_string(), why))?;

        // Etherscan always returns a 200 status code regardless of whether or not the request was successful.
        // The actual status is wrapped within the JSON body, with the error message in `result`.
        match json.status.as_str() {
            "1" => Ok(content),

            _ => match json.result {
                serde_json::Value::String(message) => Err(etherscan_error(url, &message)),
                _ => Err(etherscan_error(url, json.message.as_deref().unwrap_or("NOTOK"))),
            },
        }
    }
}

impl ResponseHandler for ProxyResponseHandler {
    fn process(url: &str, content: String) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct RpcError {
            message: String,
        }

        #[derive(Deserialize)]
        struct Page {
            status: Option<String>,
            result: Option<serde_json::Value>,
            error: Option<RpcError>,
        }

        let json = serde_json::from_str::<Page>(&content)
            .map_err(|why| Error::HttpMalformedBody(url.to_string(), why))?;

        if let Some(error) = json.error {
            return Err(Error::EtherscanRejected(url.to_string(), error.message));
        }

        // Proxy responses are plain JSON-RPC, unless Etherscan itself rejected the request (e.g. because of an
        // invalid token) in which case the regular `status` / `result` pair is returned
        match (json.status.as_deref(), json.result) {
            (Some("0"), Some(serde_json::Value::String(message))) => Err(etherscan_error(url, &message)),
            (Some("0"), _) => Err(etherscan_error(url, "NOTOK")),
            _ => Ok(content),
        }
    }
}
