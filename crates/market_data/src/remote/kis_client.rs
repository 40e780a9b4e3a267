use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::config::ApiCredentials;
use common::error::EngineError;
use common::models::{
    AccountBalance, Candle, OrderAck, OrderRequest, OrderType, Side, SymbolInfo,
};

use crate::traits::{MarketType, SymbolCatalog, TradingApi};

/// Tokens are valid for 24h; refresh once within an hour of expiry.
const TOKEN_LIFETIME_HOURS: i64 = 24;
const TOKEN_REFRESH_MARGIN_HOURS: i64 = 1;

struct TokenState {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// REST client for the KIS brokerage API. Requests carry a bearer token
/// plus app key/secret headers; order bodies additionally carry a hashkey
/// issued by the broker.
pub struct KisClient {
    http: Client,
    creds: ApiCredentials,
    token: Mutex<Option<TokenState>>,
}

#[derive(Deserialize)]
struct Envelope {
    rt_cd: String,
    #[serde(default)]
    msg1: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    output2: Value,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct HashkeyResponse {
    #[serde(rename = "HASH")]
    hash: String,
}

fn num(v: &Value, key: &str) -> f64 {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

fn int(v: &Value, key: &str) -> i64 {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn text(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl KisClient {
    pub fn new(creds: ApiCredentials) -> Self {
        Self {
            http: Client::new(),
            creds,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, EngineError> {
        let mut guard = self.token.lock().await;
        if let Some(state) = guard.as_ref() {
            if Utc::now() < state.expires_at - ChronoDuration::hours(TOKEN_REFRESH_MARGIN_HOURS) {
                return Ok(state.access_token.clone());
            }
            info!("access token near expiry, refreshing");
        }
        let state = self.issue_token().await?;
        let token = state.access_token.clone();
        *guard = Some(state);
        Ok(token)
    }

    async fn issue_token(&self) -> Result<TokenState, EngineError> {
        let url = format!("{}/oauth2/tokenP", self.creds.base_url);
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": self.creds.app_key,
            "appsecret": self.creds.app_secret,
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("token request: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::Transport(format!(
                "token request returned {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("token response: {e}")))?;
        info!("access token issued");
        Ok(TokenState {
            access_token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::hours(TOKEN_LIFETIME_HOURS),
        })
    }

    async fn hashkey(&self, body: &Value) -> Result<String, EngineError> {
        let url = format!("{}/uapi/hashkey", self.creds.base_url);
        let resp = self
            .http
            .post(&url)
            .header("appkey", &self.creds.app_key)
            .header("appsecret", &self.creds.app_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("hashkey request: {e}")))?;
        let hash: HashkeyResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("hashkey response: {e}")))?;
        Ok(hash.hash)
    }

    async fn get(
        &self,
        path: &str,
        tr_id: &str,
        params: &[(&str, &str)],
    ) -> Result<Envelope, EngineError> {
        let token = self.access_token().await?;
        let url = format!("{}{path}", self.creds.base_url);
        let resp = self
            .http
            .get(&url)
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.creds.app_key)
            .header("appsecret", &self.creds.app_secret)
            .header("tr_id", tr_id)
            .query(params)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("{path}: {e}")))?;
        Self::into_envelope(path, resp).await
    }

    async fn post(&self, path: &str, tr_id: &str, body: Value) -> Result<Envelope, EngineError> {
        let token = self.access_token().await?;
        let hashkey = self.hashkey(&body).await?;
        let url = format!("{}{path}", self.creds.base_url);
        let resp = self
            .http
            .post(&url)
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.creds.app_key)
            .header("appsecret", &self.creds.app_secret)
            .header("tr_id", tr_id)
            .header("hashkey", hashkey)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("{path}: {e}")))?;
        Self::into_envelope(path, resp).await
    }

    async fn into_envelope(path: &str, resp: reqwest::Response) -> Result<Envelope, EngineError> {
        if !resp.status().is_success() {
            return Err(EngineError::Transport(format!(
                "{path} returned {}",
                resp.status()
            )));
        }
        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("{path} body: {e}")))?;
        if envelope.rt_cd != "0" {
            return Err(EngineError::Rejected(format!(
                "{path}: {}",
                envelope.msg1
            )));
        }
        Ok(envelope)
    }

    fn candles_from(rows: &Value, close_key: &str, volume_key: &str, count: usize) -> Vec<Candle> {
        let Some(rows) = rows.as_array() else {
            return Vec::new();
        };
        // rows arrive newest-first; callers want oldest-first
        rows.iter()
            .take(count)
            .map(|row| Candle {
                open: num(row, "stck_oprc"),
                high: num(row, "stck_hgpr"),
                low: num(row, "stck_lwpr"),
                close: num(row, close_key),
                volume: int(row, volume_key),
            })
            .rev()
            .collect()
    }
}

#[async_trait]
impl TradingApi for KisClient {
    async fn get_account_balance(&self) -> Result<AccountBalance, EngineError> {
        let (account, product) = self.creds.account_parts();
        let envelope = self
            .get(
                "/uapi/domestic-stock/v1/trading/inquire-balance",
                "TTTC8434R",
                &[
                    ("CANO", account),
                    ("ACNT_PRDT_CD", product),
                    ("AFHR_FLPR_YN", "N"),
                    ("OFL_YN", "N"),
                    ("INQR_DVSN", "02"),
                    ("UNPR_DVSN", "01"),
                    ("FUND_STTL_ICLD_YN", "N"),
                    ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                    ("PRCS_DVSN", "01"),
                    ("CTX_AREA_FK100", ""),
                    ("CTX_AREA_NK100", ""),
                ],
            )
            .await?;
        // deposit and valuation live in the first output2 row
        let row = envelope
            .output2
            .as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .unwrap_or(Value::Null);
        Ok(AccountBalance {
            cash_balance: num(&row, "dnca_tot_amt"),
            total_balance: num(&row, "tot_evlu_amt"),
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, EngineError> {
        let (account, product) = self.creds.account_parts();
        let tr_id = match order.side {
            Side::Buy => "TTTC0802U",
            Side::Sell => "TTTC0801U",
        };
        let (ord_dvsn, unit_price) = match order.order_type {
            OrderType::Market => ("01", "0".to_string()),
            OrderType::Limit => (
                "00",
                format!("{:.0}", order.price.unwrap_or_default()),
            ),
        };
        let body = json!({
            "CANO": account,
            "ACNT_PRDT_CD": product,
            "PDNO": order.symbol,
            "ORD_DVSN": ord_dvsn,
            "ORD_QTY": order.quantity.to_string(),
            "ORD_UNPR": unit_price,
        });
        info!(
            "placing order: {} {} x{} ({})",
            order.side.as_str(),
            order.symbol,
            order.quantity,
            order.reason_tag
        );
        let envelope = self
            .post("/uapi/domestic-stock/v1/trading/order-cash", tr_id, body)
            .await?;
        Ok(OrderAck {
            order_id: text(&envelope.output, "ODNO"),
        })
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, EngineError> {
        let envelope = self
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                "FHKST01010100",
                &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", symbol)],
            )
            .await?;
        let out = &envelope.output;
        Ok(SymbolInfo {
            symbol: symbol.to_string(),
            name: text(out, "bstp_kor_isnm"),
            current_price: num(out, "stck_prpr"),
            prev_close: num(out, "stck_prdy_clpr"),
            change_rate: num(out, "prdy_ctrt"),
            volume: int(out, "acml_vol"),
        })
    }

    async fn get_minute_candles(
        &self,
        symbol: &str,
        count: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let hour = Local::now().format("%H%M%S").to_string();
        let envelope = self
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice",
                "FHKST03010200",
                &[
                    ("FID_ETC_CLS_CODE", ""),
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_INPUT_ISCD", symbol),
                    ("FID_INPUT_HOUR_1", hour.as_str()),
                    ("FID_PW_DATA_INCU_YN", "Y"),
                    ("FID_HOUR_CLS_CODE", "1"),
                ],
            )
            .await?;
        Ok(Self::candles_from(
            &envelope.output2,
            "stck_prpr",
            "cntg_vol",
            count,
        ))
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        count: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let envelope = self
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
                "FHKST01010400",
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_INPUT_ISCD", symbol),
                    ("FID_PERIOD_DIV_CODE", "D"),
                    ("FID_ORG_ADJ_PRC", "1"),
                ],
            )
            .await?;
        Ok(Self::candles_from(
            &envelope.output,
            "stck_clpr",
            "acml_vol",
            count,
        ))
    }

    async fn force_token_refresh(&self) -> Result<String, EngineError> {
        {
            let mut guard = self.token.lock().await;
            *guard = None;
        }
        match self.access_token().await {
            Ok(_) => Ok("token reissued".to_string()),
            Err(e) => {
                warn!("forced token refresh failed: {e}");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SymbolCatalog for KisClient {
    async fn get_tradable_symbols(
        &self,
        market: MarketType,
    ) -> Result<Vec<String>, EngineError> {
        let market_code = match market {
            MarketType::All => "0000",
            MarketType::Kospi => "0001",
            MarketType::Kosdaq => "1001",
        };
        let envelope = self
            .get(
                "/uapi/domestic-stock/v1/quotations/volume-rank",
                "FHPST01710000",
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_COND_SCR_DIV_CODE", "20171"),
                    ("FID_INPUT_ISCD", market_code),
                    ("FID_DIV_CLS_CODE", "0"),
                    ("FID_BLNG_CLS_CODE", "0"),
                    ("FID_TRGT_CLS_CODE", "111111111"),
                    ("FID_TRGT_EXLS_CLS_CODE", "000000"),
                    ("FID_INPUT_PRICE_1", ""),
                    ("FID_INPUT_PRICE_2", ""),
                    ("FID_VOL_CNT", ""),
                    ("FID_INPUT_DATE_1", ""),
                ],
            )
            .await
            .map_err(|e| EngineError::Catalog(e.to_string()))?;
        let symbols = envelope
            .output
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("mksc_shrn_iscd"))
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(symbols)
    }
}
