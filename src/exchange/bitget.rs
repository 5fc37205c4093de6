//! # exchange::bitget
//!
//! **Bitget USDT-M futures client**: signed REST v2, one-way position mode,
//! crossed margin.
//!
//! ## Request signing
//! ```text
//! prehash   = timestamp_ms + METHOD + request_path(+?query) + body
//! signature = base64( HMAC-SHA256(secret_key, prehash) )
//! headers   = ACCESS-KEY / ACCESS-SIGN / ACCESS-TIMESTAMP / ACCESS-PASSPHRASE
//!             (+ paptrading: 1 on demo sessions)
//! ```
//!
//! Every response is wrapped as `{ "code": "00000", "msg": ..., "data": ... }`;
//! any other code is a rejection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{Exchange, ExchangeError, HoldSide, LivePosition, OrderRequest, TriggerKind};

const PRODUCT_TYPE: &str = "USDT-FUTURES";
const MARGIN_COIN: &str = "USDT";
const MARGIN_MODE: &str = "crossed";
const SUCCESS_CODE: &str = "00000";
const FALLBACK_VOLUME_PLACE: u32 = 4;
const FALLBACK_PRICE_PLACE: u32 = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

// ─── Credentials ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct BitgetCredentials {
    pub api_key:    String,
    pub secret_key: String,
    pub passphrase: String,
}

impl BitgetCredentials {
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty() && !self.passphrase.is_empty()
    }
}

impl std::fmt::Debug for BitgetCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetCredentials")
            .field("api_key", &mask(&self.api_key))
            .finish_non_exhaustive()
    }
}

fn mask(key: &str) -> String {
    match key.get(..4) {
        Some(head) if key.len() > 8 => format!("{head}****"),
        _ => "****".to_string(),
    }
}

// ─── Wire Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg:  String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    hold_side: String,
    total:     String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractRow {
    volume_place: String,
    price_place:  String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRow {
    margin_coin: String,
    #[serde(default)]
    account_equity: String,
}

/// Precision of one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractSpec {
    pub volume_place: u32,
    pub price_place:  u32,
}

impl Default for ContractSpec {
    fn default() -> Self {
        Self { volume_place: FALLBACK_VOLUME_PLACE, price_place: FALLBACK_PRICE_PLACE }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct BitgetExchange {
    name:      String,
    base_url:  String,
    creds:     BitgetCredentials,
    demo:      bool,
    client:    reqwest::Client,
    contracts: RwLock<HashMap<String, ContractSpec>>,
}

impl BitgetExchange {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        creds: BitgetCredentials,
        demo: bool,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            creds,
            demo,
            client,
            contracts: RwLock::new(HashMap::new()),
        }
    }

    /// Send one signed request and unwrap the response envelope.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> Result<T, ExchangeError> {
        let request_path = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };
        let body = body.map(Value::to_string).unwrap_or_default();
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign(&self.creds.secret_key, &timestamp, method.as_str(), &request_path, &body)?;

        let url = format!("{}{request_path}", self.base_url);
        let mut builder = self
            .client
            .request(method, &url)
            .header("ACCESS-KEY", &self.creds.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", &self.creds.passphrase)
            .header("Content-Type", "application/json")
            .header("locale", "en-US")
            .timeout(REQUEST_TIMEOUT);
        if self.demo {
            builder = builder.header("paptrading", "1");
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        // ── HTTP ──────────────────────────────────────────────────────────────
        let response = builder.send().await.map_err(|e| {
            error!(exchange = %self.name, error = %e, "Bitget unreachable");
            ExchangeError::Transport(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        debug!(exchange = %self.name, path = %request_path, http_status = %status, "Bitget response");

        // Bitget returns its error envelope with 4xx; prefer the envelope's code.
        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(ExchangeError::Http { status: status.as_u16(), body: text });
            }
            Err(e) => return Err(ExchangeError::Decode(format!("{e}: {text}"))),
        };

        if envelope.code != SUCCESS_CODE {
            warn!(
                exchange = %self.name,
                code     = %envelope.code,
                msg      = %envelope.msg,
                "Bitget rejected request"
            );
            return Err(ExchangeError::Rejected { code: envelope.code, msg: envelope.msg });
        }
        if !status.is_success() {
            return Err(ExchangeError::Http { status: status.as_u16(), body: text });
        }

        envelope
            .data
            .ok_or_else(|| ExchangeError::Decode(format!("missing data in {request_path}")))
    }

    /// Contract precision, fetched once per symbol.
    async fn contract(&self, symbol: &str) -> ContractSpec {
        if let Some(spec) = self.contracts.read().await.get(symbol) {
            return *spec;
        }

        let query = format!("productType={PRODUCT_TYPE}&symbol={symbol}");
        let spec = match self
            .request::<Vec<ContractRow>>(Method::GET, "/api/v2/mix/market/contracts", &query, None)
            .await
        {
            Ok(rows) => rows.first().map(parse_contract).unwrap_or_default(),
            Err(e) => {
                warn!(exchange = %self.name, symbol, error = %e, "Contract info unavailable, using fallback precision");
                return ContractSpec::default();
            }
        };

        self.contracts.write().await.insert(symbol.to_string(), spec);
        spec
    }
}

fn parse_contract(row: &ContractRow) -> ContractSpec {
    ContractSpec {
        volume_place: row.volume_place.parse().unwrap_or(FALLBACK_VOLUME_PLACE),
        price_place:  row.price_place.parse().unwrap_or(FALLBACK_PRICE_PLACE),
    }
}

// ─── Pure Helpers ─────────────────────────────────────────────────────────────

pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Decode(format!("invalid secret key: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.to_uppercase().as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// `BTC` → `BTCUSDT`; already-qualified symbols pass through.
pub fn contract_symbol(base: &str) -> String {
    let upper = base.trim().to_uppercase();
    if upper.ends_with(MARGIN_COIN) {
        upper
    } else {
        format!("{upper}{MARGIN_COIN}")
    }
}

/// Truncate toward zero at `places` decimals.
pub fn round_down(amount: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    // Absorb representation error such as 0.3 * 1000 = 299.99999999999994.
    ((amount * factor) + 1e-9).floor() / factor
}

fn format_places(value: f64, places: u32) -> String {
    format!("{:.*}", places as usize, value)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

/// Endpoint and JSON body for one order.
pub fn order_payload(
    order: &OrderRequest,
    spec: ContractSpec,
    client_oid: &str,
) -> Result<(&'static str, Value), ExchangeError> {
    let size = round_down(order.amount, spec.volume_place);
    if size <= 0.0 {
        return Err(ExchangeError::Rejected {
            code: "size".into(),
            msg:  format!(
                "size {} rounds to zero at {} decimals",
                order.amount, spec.volume_place
            ),
        });
    }

    let symbol = contract_symbol(&order.symbol);
    let mut body = json!({
        "symbol":      symbol,
        "productType": PRODUCT_TYPE,
        "marginMode":  MARGIN_MODE,
        "marginCoin":  MARGIN_COIN,
        "size":        format_places(size, spec.volume_place),
        "side":        order.side.as_str(),
        "orderType":   "market",
        "reduceOnly":  yes_no(order.reduce_only),
        "clientOid":   client_oid,
    });

    match order.trigger {
        None => Ok(("/api/v2/mix/order/place-order", body)),
        Some(trigger) => {
            body["planType"] = json!("normal_plan");
            body["triggerPrice"] = json!(format_places(trigger.price, spec.price_place));
            body["triggerType"] = json!(trigger.trigger_type);
            body["reduceOnly"] = json!("YES");
            Ok(("/api/v2/mix/order/place-plan-order", body))
        }
    }
}

// ─── Exchange Impl ────────────────────────────────────────────────────────────

#[async_trait]
impl Exchange for BitgetExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        let query = format!("productType={PRODUCT_TYPE}");
        let accounts: Vec<AccountRow> = self
            .request(Method::GET, "/api/v2/mix/account/accounts", &query, None)
            .await?;

        if let Some(usdt) = accounts.iter().find(|a| a.margin_coin == MARGIN_COIN) {
            debug!(exchange = %self.name, equity = %usdt.account_equity, "Bitget account reachable");
        }
        Ok(())
    }

    async fn prepare(&self) -> Result<(), ExchangeError> {
        let body = json!({ "productType": PRODUCT_TYPE, "posMode": "one_way_mode" });
        self.request::<Value>(Method::POST, "/api/v2/mix/account/set-position-mode", "", Some(&body))
            .await?;
        info!(exchange = %self.name, "🔧 Position mode set to one-way");
        Ok(())
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<String, ExchangeError> {
        let symbol = contract_symbol(&order.symbol);
        let spec = self.contract(&symbol).await;
        let client_oid = uuid::Uuid::new_v4().simple().to_string();
        let (path, body) = order_payload(order, spec, &client_oid)?;

        info!(
            exchange  = %self.name,
            symbol    = %symbol,
            side      = order.side.as_str(),
            hold_side = order.hold_side.as_str(),
            size      = %body["size"],
            reduce    = order.reduce_only,
            trigger   = ?order.trigger.map(|t| (t.kind, t.price)),
            "🚀 [BITGET] Sending order"
        );

        let ack: OrderAck = self.request(Method::POST, path, "", Some(&body)).await?;

        let label = match order.trigger.map(|t| t.kind) {
            Some(TriggerKind::StopLoss)   => "stop-loss",
            Some(TriggerKind::TakeProfit) => "take-profit",
            None                          => "market",
        };
        info!(exchange = %self.name, order_id = %ack.order_id, kind = label, "✅ [BITGET] Order accepted");
        Ok(ack.order_id)
    }

    async fn get_positions(&self, symbol: &str) -> Result<Vec<LivePosition>, ExchangeError> {
        let query = format!(
            "symbol={}&productType={PRODUCT_TYPE}&marginCoin={MARGIN_COIN}",
            contract_symbol(symbol)
        );
        let rows: Vec<PositionRow> = self
            .request(Method::GET, "/api/v2/mix/position/single-position", &query, None)
            .await?;

        Ok(rows.iter().filter_map(parse_position).collect())
    }
}

fn parse_position(row: &PositionRow) -> Option<LivePosition> {
    let size: f64 = row.total.parse().ok()?;
    if size <= 0.0 {
        return None;
    }
    let side = match row.hold_side.as_str() {
        "long"  => HoldSide::Long,
        "short" => HoldSide::Short,
        _ => return None,
    };
    Some(LivePosition { side, size })
}
