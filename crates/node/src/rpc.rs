//! JSON-RPC query surface over the chain state.
//!
//! One HTTP POST per request, basic auth, serde_json values end to end.
//! Field names and shapes follow the legacy daemon so existing tooling
//! keeps working against `emberd`.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ember_chainstate::entry::EntryId;
use ember_chainstate::scan::ScanError;
use ember_chainstate::ChainState;
use ember_consensus::money::amount_to_value;
use ember_consensus::params::hash256_from_hex;
use ember_consensus::{hash256_to_hex, Hash256};
use ember_pow::difficulty::difficulty_from_bits;
use ember_primitives::block::Block;
use ember_primitives::encoding::encode;
use ember_primitives::transaction::Transaction;
use ember_storage::BlockStore;
use primitive_types::U256;
use rand::RngCore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::mempool::{Mempool, MempoolView};

const MAX_REQUEST_BYTES: usize = 1024 * 1024;
const COOKIE_FILE_NAME: &str = ".cookie";
const COOKIE_USER: &str = "__cookie__";

#[derive(Debug)]
pub enum RpcError {
    MethodNotFound(String),
    InvalidParameter(String),
    BlockNotFound,
    OutOfRange,
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParameter(_) => -8,
            RpcError::BlockNotFound => -5,
            RpcError::OutOfRange => -8,
            RpcError::Internal(_) => -1,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::MethodNotFound(method) => write!(f, "Method not found: {method}"),
            RpcError::InvalidParameter(message) => write!(f, "{message}"),
            RpcError::BlockNotFound => write!(f, "Block not found"),
            RpcError::OutOfRange => write!(f, "Block number out of range"),
            RpcError::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RpcError {}

pub struct RpcContext<S> {
    pub state: Arc<RwLock<ChainState<S>>>,
    pub mempool: Arc<Mutex<Mempool>>,
    /// Whether this node holds the checkpoint signing key.
    pub checkpoint_master: bool,
}

impl<S> Clone for RpcContext<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            mempool: Arc::clone(&self.mempool),
            checkpoint_master: self.checkpoint_master,
        }
    }
}

pub fn dispatch<S: BlockStore>(
    ctx: &RpcContext<S>,
    method: &str,
    params: &[Value],
) -> Result<Value, RpcError> {
    match method {
        "getbestblockhash" => getbestblockhash(ctx),
        "getblockcount" => getblockcount(ctx),
        "getdifficulty" => getdifficulty(ctx),
        "getnetworkhashps" => getnetworkhashps(ctx),
        "getblockhash" => getblockhash(ctx, params),
        "getblock" => getblock(ctx, params),
        "getblockbynumber" => getblockbynumber(ctx, params),
        "getcheckpoint" => getcheckpoint(ctx),
        "getblockchaininfo" => getblockchaininfo(ctx),
        "gettxout" => gettxout(ctx, params),
        "getrawmempool" => getrawmempool(ctx),
        other => Err(RpcError::MethodNotFound(other.to_string())),
    }
}

fn getbestblockhash<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let state = read_state(ctx)?;
    match state.best_block_hash() {
        Some(hash) => Ok(json!(hash256_to_hex(&hash))),
        None => Err(RpcError::BlockNotFound),
    }
}

fn getblockcount<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let state = read_state(ctx)?;
    Ok(json!(state.height()))
}

fn getdifficulty<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let state = read_state(ctx)?;
    Ok(json!({
        "proof-of-work": state.pow_difficulty(),
        "proof-of-stake": state.pos_difficulty(),
        "search-interval": state.stake_search_interval(),
    }))
}

fn getnetworkhashps<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let state = read_state(ctx)?;
    Ok(json!(state.network_hash_ps()))
}

fn getblockhash<S: BlockStore>(ctx: &RpcContext<S>, params: &[Value]) -> Result<Value, RpcError> {
    let height = param_i64(params, 0, "height")?;
    let state = read_state(ctx)?;
    if height < 0 || height > state.height() {
        return Err(RpcError::OutOfRange);
    }
    let id = state
        .index()
        .find_by_height(height)
        .ok_or(RpcError::OutOfRange)?;
    Ok(json!(hash256_to_hex(&state.index().entry(id).hash)))
}

fn getblock<S: BlockStore>(ctx: &RpcContext<S>, params: &[Value]) -> Result<Value, RpcError> {
    let hash = param_hash(params, 0)?;
    let verbosity = parse_verbosity(params.get(1))?;
    let state = read_state(ctx)?;
    let id = state
        .index()
        .find_by_hash(&hash)
        .ok_or(RpcError::BlockNotFound)?;
    block_response(&state, id, verbosity)
}

fn getblockbynumber<S: BlockStore>(
    ctx: &RpcContext<S>,
    params: &[Value],
) -> Result<Value, RpcError> {
    let height = param_i64(params, 0, "height")?;
    let verbosity = parse_verbosity(params.get(1))?;
    let state = read_state(ctx)?;
    if height < 0 || height > state.height() {
        return Err(RpcError::OutOfRange);
    }
    let id = state
        .index()
        .find_by_height(height)
        .ok_or(RpcError::OutOfRange)?;
    block_response(&state, id, verbosity)
}

fn getcheckpoint<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let state = read_state(ctx)?;
    let mut result = json!({
        "policy": state.checkpoints().mode().as_str(),
    });
    if let Some(hash) = state.checkpoints().sync_checkpoint() {
        result["synccheckpoint"] = json!(hash256_to_hex(&hash));
        if let Some(id) = state.index().find_by_hash(&hash) {
            let entry = state.index().entry(id);
            result["height"] = json!(entry.height);
            result["timestamp"] = json!(format_utc(entry.time as i64));
        }
    } else {
        result["synccheckpoint"] = Value::Null;
    }
    if ctx.checkpoint_master {
        result["checkpointmaster"] = json!(true);
    }
    Ok(result)
}

fn getblockchaininfo<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let state = read_state(ctx)?;
    let now = now_unix();
    let chainwork = state
        .index()
        .best_entry()
        .and_then(|entry| entry.chain_trust())
        .unwrap_or_default();
    let best = state
        .best_block_hash()
        .map(|hash| hash256_to_hex(&hash))
        .unwrap_or_default();
    Ok(json!({
        "chain": state.params().network.name(),
        "blocks": state.height(),
        "bestblockhash": best,
        "difficulty": {
            "proof-of-work": state.pow_difficulty(),
            "proof-of-stake": state.pos_difficulty(),
        },
        "initialblockdownload": state.is_initial_block_download(now),
        "verificationprogress": state.verification_progress(now),
        "chainwork": trimmed_hex(chainwork),
        "moneysupply": amount_to_value(state.money_supply()),
    }))
}

fn gettxout<S: BlockStore>(ctx: &RpcContext<S>, params: &[Value]) -> Result<Value, RpcError> {
    let txid = param_hash(params, 0)?;
    let vout = param_i64(params, 1, "vout")?;
    let include_mempool = match params.get(2) {
        None => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(RpcError::InvalidParameter(
                "includemempool must be a boolean".into(),
            ))
        }
    };
    // Negative or wider-than-u32 indexes can never name a real output.
    let Ok(vout) = u32::try_from(vout) else {
        return Ok(Value::Null);
    };

    let state = read_state(ctx)?;
    let pool = lock_mempool(ctx)?;
    let view = MempoolView(&pool);
    let lookup = if include_mempool {
        Some(&view as &dyn ember_chainstate::scan::MempoolLookup)
    } else {
        None
    };

    match state.unspent_output(&txid, vout, lookup) {
        Ok(Some(info)) => Ok(json!({
            "bestblock": hash256_to_hex(&info.best_block),
            "confirmations": info.confirmations,
            "value": amount_to_value(info.value),
            "scriptPubKey": { "hex": bytes_to_hex(&info.script_pubkey) },
            "version": info.version,
            "coinbase": info.coinbase,
            "coinstake": info.coinstake,
        })),
        // Spent, unknown, and unusable outputs all serialize as null.
        Ok(None) => Ok(Value::Null),
        Err(ScanError::UnknownTransaction)
        | Err(ScanError::OutputIndexOutOfRange)
        | Err(ScanError::NullOutput) => Ok(Value::Null),
        Err(ScanError::Store(err)) => Err(RpcError::Internal(err.to_string())),
    }
}

fn getrawmempool<S: BlockStore>(ctx: &RpcContext<S>) -> Result<Value, RpcError> {
    let pool = lock_mempool(ctx)?;
    let hashes: Vec<String> = pool
        .query_hashes()
        .iter()
        .map(hash256_to_hex)
        .collect();
    Ok(json!(hashes))
}

/// Block detail level. The legacy daemon took a `txinfo` boolean; numeric
/// verbosity is accepted alongside it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Verbosity {
    Raw,
    Summary,
    TxDetail,
}

fn parse_verbosity(param: Option<&Value>) -> Result<Verbosity, RpcError> {
    match param {
        None => Ok(Verbosity::Summary),
        Some(Value::Bool(false)) => Ok(Verbosity::Summary),
        Some(Value::Bool(true)) => Ok(Verbosity::TxDetail),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(0) => Ok(Verbosity::Raw),
            Some(1) => Ok(Verbosity::Summary),
            Some(level) if level >= 2 => Ok(Verbosity::TxDetail),
            _ => Err(RpcError::InvalidParameter("invalid verbosity".into())),
        },
        Some(_) => Err(RpcError::InvalidParameter(
            "verbosity must be a boolean or a number".into(),
        )),
    }
}

fn block_response<S: BlockStore>(
    state: &ChainState<S>,
    id: EntryId,
    verbosity: Verbosity,
) -> Result<Value, RpcError> {
    let hash = state.index().entry(id).hash;
    let block = state
        .store()
        .block(&hash)
        .map_err(|err| RpcError::Internal(err.to_string()))?
        .ok_or(RpcError::BlockNotFound)?;

    match verbosity {
        Verbosity::Raw => Ok(json!(bytes_to_hex(&encode(&block)))),
        Verbosity::Summary => Ok(block_to_json(state, id, &block, false)),
        Verbosity::TxDetail => Ok(block_to_json(state, id, &block, true)),
    }
}

fn block_to_json<S: BlockStore>(
    state: &ChainState<S>,
    id: EntryId,
    block: &Block,
    tx_detail: bool,
) -> Value {
    let index = state.index();
    let entry = index.entry(id);
    let confirmations = if index.is_in_main_chain(id) {
        index
            .best_entry()
            .map(|best| best.height - entry.height + 1)
            .unwrap_or(-1)
    } else {
        -1
    };

    let mut flags = entry.kind.as_str().to_string();
    let score = entry.score.as_ref();
    if score.is_some_and(|s| s.stake.generated) {
        flags.push_str(" stake-modifier");
    }

    let txs: Vec<Value> = block
        .vtx
        .iter()
        .map(|tx| {
            if tx_detail {
                tx_to_json(tx)
            } else {
                json!(hash256_to_hex(&tx.txid()))
            }
        })
        .collect();

    let mut result = json!({
        "hash": hash256_to_hex(&entry.hash),
        "confirmations": confirmations,
        "size": encode(block).len(),
        "height": entry.height,
        "version": entry.version,
        "merkleroot": hash256_to_hex(&entry.merkle_root),
        "mint": amount_to_value(score.map(|s| s.mint).unwrap_or(0)),
        "time": entry.time,
        "nonce": entry.nonce,
        "bits": format!("{:08x}", entry.bits),
        "difficulty": difficulty_from_bits(entry.bits),
        "blocktrust": trimmed_hex(score.map(|s| s.block_trust).unwrap_or_default()),
        "chaintrust": trimmed_hex(score.map(|s| s.chain_trust).unwrap_or_default()),
        "chainwork": trimmed_hex(score.map(|s| s.chain_work).unwrap_or_default()),
        "flags": flags,
        "proofhash": hash256_to_hex(&entry.proof_hash()),
        "entropybit": score.is_some_and(|s| s.stake.entropy_bit) as i32,
        "modifier": format!("{:016x}", score.map(|s| s.stake.modifier).unwrap_or(0)),
        "modifierchecksum": format!("{:08x}", score.map(|s| s.stake.checksum).unwrap_or(0)),
        "tx": txs,
    });

    if let Some(parent) = entry.parent {
        result["previousblockhash"] = json!(hash256_to_hex(&index.entry(parent).hash));
    }
    if let Some(successor) = entry.successor {
        result["nextblockhash"] = json!(hash256_to_hex(&index.entry(successor).hash));
    }
    if entry.is_proof_of_stake() {
        result["signature"] = json!(bytes_to_hex(&block.signature));
    }

    result
}

fn tx_to_json(tx: &Transaction) -> Value {
    let vin: Vec<Value> = tx
        .vin
        .iter()
        .map(|input| {
            if input.prevout.is_null() {
                json!({ "coinbase": bytes_to_hex(&input.script_sig) })
            } else {
                json!({
                    "txid": hash256_to_hex(&input.prevout.hash),
                    "vout": input.prevout.index,
                    "scriptSig": { "hex": bytes_to_hex(&input.script_sig) },
                    "sequence": input.sequence,
                })
            }
        })
        .collect();
    let vout: Vec<Value> = tx
        .vout
        .iter()
        .enumerate()
        .map(|(n, output)| {
            json!({
                "value": amount_to_value(output.value),
                "n": n,
                "scriptPubKey": { "hex": bytes_to_hex(&output.script_pubkey) },
            })
        })
        .collect();
    json!({
        "txid": hash256_to_hex(&tx.txid()),
        "version": tx.version,
        "time": tx.time,
        "locktime": tx.lock_time,
        "vin": vin,
        "vout": vout,
    })
}

fn read_state<S>(
    ctx: &RpcContext<S>,
) -> Result<std::sync::RwLockReadGuard<'_, ChainState<S>>, RpcError> {
    ctx.state
        .read()
        .map_err(|_| RpcError::Internal("chain state lock poisoned".into()))
}

fn lock_mempool<S>(ctx: &RpcContext<S>) -> Result<std::sync::MutexGuard<'_, Mempool>, RpcError> {
    ctx.mempool
        .lock()
        .map_err(|_| RpcError::Internal("mempool lock poisoned".into()))
}

fn param_i64(params: &[Value], position: usize, name: &str) -> Result<i64, RpcError> {
    params
        .get(position)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::InvalidParameter(format!("missing or invalid {name}")))
}

fn param_hash(params: &[Value], position: usize) -> Result<Hash256, RpcError> {
    let raw = params
        .get(position)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidParameter("missing hash parameter".into()))?;
    hash256_from_hex(raw).map_err(|_| RpcError::InvalidParameter("invalid hash".into()))
}

/// `U256` as hex with leading zeros trimmed, the legacy `leftTrim(GetHex)`.
fn trimmed_hex(value: U256) -> String {
    format!("{value:x}")
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// `YYYY-MM-DD HH:MM:SS UTC`, the legacy `DateTimeStrFormat`.
fn format_utc(unix: i64) -> String {
    const SECS_PER_DAY: i64 = 86_400;
    let days = unix.div_euclid(SECS_PER_DAY);
    let secs_of_day = unix.rem_euclid(SECS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02} UTC",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

// Howard Hinnant's civil_from_days (public domain).
fn civil_from_days(days_since_unix_epoch: i64) -> (i64, i64, i64) {
    let z = days_since_unix_epoch + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    (if month <= 2 { year + 1 } else { year }, month, day)
}

/// Basic-auth credentials for the RPC listener.
#[derive(Clone)]
pub struct RpcAuth {
    user: String,
    pass: String,
}

impl RpcAuth {
    pub fn new(user: String, pass: String) -> Self {
        Self { user, pass }
    }

    fn matches(&self, authorization: &str) -> bool {
        let Some(encoded) = authorization.trim().strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        credentials == format!("{}:{}", self.user, self.pass)
    }
}

/// Explicit credentials when configured, otherwise a random cookie written
/// to the data directory for local tooling to pick up.
pub fn load_or_create_auth(
    user: Option<String>,
    pass: Option<String>,
    data_dir: &Path,
) -> Result<RpcAuth, String> {
    if let (Some(user), Some(pass)) = (user.clone(), pass.clone()) {
        return Ok(RpcAuth::new(user, pass));
    }
    if user.is_some() != pass.is_some() {
        return Err("--rpc-user and --rpc-pass must be given together".into());
    }

    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let pass = bytes_to_hex(&secret);
    let cookie_path = data_dir.join(COOKIE_FILE_NAME);
    std::fs::write(&cookie_path, format!("{COOKIE_USER}:{pass}"))
        .map_err(|err| format!("failed to write {}: {err}", cookie_path.display()))?;
    ember_log::log_info!("rpc cookie written to {}", cookie_path.display());
    Ok(RpcAuth::new(COOKIE_USER.to_string(), pass))
}

pub async fn serve_rpc<S>(
    addr: SocketAddr,
    auth: RpcAuth,
    ctx: RpcContext<S>,
) -> Result<(), String>
where
    S: BlockStore + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| format!("rpc bind failed: {err}"))?;
    ember_log::log_info!("rpc listening on {addr}");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|err| format!("rpc accept failed: {err}"))?;
        let auth = auth.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &auth, &ctx).await {
                ember_log::log_warn!("rpc connection from {peer}: {err}");
            }
        });
    }
}

async fn handle_connection<S: BlockStore>(
    mut stream: tokio::net::TcpStream,
    auth: &RpcAuth,
    ctx: &RpcContext<S>,
) -> Result<(), String> {
    let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
    let bytes_read = stream
        .read(&mut buffer)
        .await
        .map_err(|err| err.to_string())?;
    if bytes_read == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..bytes_read]).into_owned();
    let (status, body) = match handle_request(&request, auth, ctx) {
        Ok(body) => ("200 OK", body),
        Err(RequestError::Unauthorized) => ("401 Unauthorized", String::new()),
        Err(RequestError::BadRequest(message)) => ("400 Bad Request", message),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|err| err.to_string())?;
    Ok(())
}

enum RequestError {
    Unauthorized,
    BadRequest(String),
}

fn handle_request<S: BlockStore>(
    request: &str,
    auth: &RpcAuth,
    ctx: &RpcContext<S>,
) -> Result<String, RequestError> {
    let mut lines = request.lines();
    let request_line = lines.next().unwrap_or_default();
    if !request_line.starts_with("POST ") {
        return Err(RequestError::BadRequest("POST required".into()));
    }

    let mut authorized = false;
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some(value) = line
            .strip_prefix("Authorization:")
            .or_else(|| line.strip_prefix("authorization:"))
        {
            authorized = auth.matches(value);
        }
    }
    if !authorized {
        return Err(RequestError::Unauthorized);
    }

    let body = request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or_default();
    let parsed: Value = serde_json::from_str(body)
        .map_err(|err| RequestError::BadRequest(format!("invalid request body: {err}")))?;
    let id = parsed.get("id").cloned().unwrap_or(Value::Null);
    let method = parsed.get("method").and_then(Value::as_str).unwrap_or("");
    let empty = Vec::new();
    let params = parsed
        .get("params")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let response = match dispatch(ctx, method, params) {
        Ok(result) => json!({ "result": result, "error": Value::Null, "id": id }),
        Err(err) => json!({
            "result": Value::Null,
            "error": { "code": err.code(), "message": err.to_string() },
            "id": id,
        }),
    };
    Ok(response.to_string())
}
