use crate::config::Config;
use crate::error::Error;
use std::fmt;
use std::time::Duration;
use url::Url;

use super::EtherscanResponseHandler;
use super::ProxyResponseHandler;
use super::RequestHandler;

/// Block selector of the `eth_getBlockByNumber` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Number(number) => write!(f, "0x{number:x}"),
        }
    }
}

/// Resources the collectors know how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    GasOracle,
    Block(BlockTag),
}

/// A single attempt at retrieving the raw body of a [`Resource`].
pub trait Fetch {
    fn fetch(&self, resource: &Resource) -> Result<String, Error>;
}

#[derive(Clone)]
pub struct EtherscanClient {
    request_handler: RequestHandler,
    token: String,
    url: Url,
}

impl EtherscanClient {
    /// Returns a new Etherscan API client with the token, base URL and timeout of `config`.
    pub fn new(config: &Config) -> Result<Self, Error> {
        EtherscanClient::with_url(config.etherscan_url.clone(), &config.token_etherscan, config.http_timeout)
    }

    pub fn with_url(url: Url, token: &str, timeout: Duration) -> Result<Self, Error> {
        Ok(EtherscanClient {
            request_handler: RequestHandler::new(timeout)?,
            token: token.to_string(),
            url,
        })
    }

    fn url(&self, query: &[(&str, &str)]) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().extend_pairs(query).append_pair("apikey", &self.token);

        url
    }

    /// Returns the raw `module=gastracker&action=gasoracle` response.
    pub fn get_gas_oracle(&self) -> Result<String, Error> {
        let url = self.url(&[("module", "gastracker"), ("action", "gasoracle")]);
        self.request_handler.execute::<EtherscanResponseHandler>(&url)
    }

    /// Returns the raw `module=proxy&action=eth_getBlockByNumber` response including full transaction objects.
    pub fn get_block(&self, tag: BlockTag) -> Result<String, Error> {
        let tag = tag.to_string();
        let url = self.url(&[
            ("module", "proxy"),
            ("action", "eth_getBlockByNumber"),
            ("tag", &tag),
            ("boolean", "true"),
        ]);

        self.request_handler.execute::<ProxyResponseHandler>(&url)
    }
}

impl Fetch for EtherscanClient {
    fn fetch(&self, resource: &Resource) -> Result<String, Error> {
        match resource {
            Resource::GasOracle => self.get_gas_oracle(),
            Resource::Block(tag) => self.get_block(*tag),
        }
    }
}
