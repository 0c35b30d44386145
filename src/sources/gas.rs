//! Network cost source: ETH gas (Gwei) and BTC fees (sat/vB).
//!
//! The two legs hit different endpoints and fail independently. Only when
//! both legs fail is the family itself considered unavailable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::types::GasQuote;

const ETHERSCAN_BASE: &str = "https://api.etherscan.io/api";
const MEMPOOL_SPACE_FEES: &str = "https://mempool.space/api/v1/fees/recommended";

#[async_trait]
pub trait GasSource: Send + Sync {
    async fn fetch(&self, symbol: &str, now: i64) -> Result<GasQuote>;
}

/// Etherscan gas oracle + mempool.space recommended fees.
pub struct PublicGasSource {
    client: reqwest::Client,
    etherscan_key: Option<String>,
}

impl PublicGasSource {
    /// The Etherscan leg works keyless at a lower rate limit, so a missing
    /// `ETHERSCAN_API_KEY` degrades rather than disables.
    pub fn from_env(client: reqwest::Client) -> Self {
        Self {
            client,
            etherscan_key: std::env::var("ETHERSCAN_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct EtherscanResponse {
    status: String,
    result: Option<EtherscanGasResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EtherscanGasResult {
    propose_gas_price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MempoolFees {
    half_hour_fee: f64,
}

#[async_trait]
impl GasSource for PublicGasSource {
    async fn fetch(&self, _symbol: &str, _now: i64) -> Result<GasQuote> {
        let (eth, btc) = tokio::join!(self.fetch_eth_gwei(), self.fetch_btc_sat_vb());

        let quote = GasQuote {
            eth_gwei: eth
                .map_err(|e| debug!(error = %e, "eth gas leg failed"))
                .ok(),
            btc_sat_vb: btc
                .map_err(|e| debug!(error = %e, "btc fee leg failed"))
                .ok(),
        };

        if quote.eth_gwei.is_none() && quote.btc_sat_vb.is_none() {
            anyhow::bail!("both gas legs unavailable");
        }
        Ok(quote)
    }
}

impl PublicGasSource {
    async fn fetch_eth_gwei(&self) -> Result<f64> {
        let mut params = vec![("module", "gastracker"), ("action", "gasoracle")];
        if let Some(key) = &self.etherscan_key {
            params.push(("apikey", key.as_str()));
        }

        let resp: EtherscanResponse = self
            .client
            .get(ETHERSCAN_BASE)
            .query(&params)
            .send()
            .await
            .context("GET etherscan gas oracle")?
            .json()
            .await
            .context("parse etherscan response")?;

        if resp.status != "1" {
            anyhow::bail!("etherscan gas oracle status {}", resp.status);
        }

        resp.result
            .context("etherscan result missing")?
            .propose_gas_price
            .parse()
            .context("propose gas price not a number")
    }

    async fn fetch_btc_sat_vb(&self) -> Result<f64> {
        let fees: MempoolFees = self
            .client
            .get(MEMPOOL_SPACE_FEES)
            .send()
            .await
            .context("GET mempool.space fees")?
            .json()
            .await
            .context("parse mempool.space response")?;

        Ok(fees.half_hour_fee)
    }
}
