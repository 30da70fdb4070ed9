//! emberd node shell: configuration, startup wiring, and the JSON-RPC
//! listener. Consensus logic lives in the ember-* crates; this crate only
//! assembles them.

pub mod mempool;
pub mod rpc;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use ember_chainstate::ChainState;
use ember_consensus::params::{chain_params, CheckpointMode, Network};
use ember_log as logging;
use ember_storage::MemoryBlockStore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::mempool::Mempool;
use crate::rpc::RpcContext;

const DEFAULT_DATA_DIR: &str = "data";
const MAINNET_RPC_PORT: u16 = 17_335;
const TESTNET_RPC_PORT: u16 = 27_335;
const REGTEST_RPC_PORT: u16 = 18_335;

struct Config {
    network: Network,
    data_dir: PathBuf,
    rpc_addr: Option<SocketAddr>,
    rpc_user: Option<String>,
    rpc_pass: Option<String>,
    checkpoint_mode: Option<CheckpointMode>,
    checkpoint_key: Option<SecretKey>,
    log_level: logging::Level,
    log_format: logging::Format,
    log_timestamps: bool,
}

enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

pub async fn run_entry() -> Result<(), String> {
    let config = match parse_args()? {
        CliAction::Run(config) => config,
        CliAction::PrintHelp => {
            println!("{}", usage());
            return Ok(());
        }
        CliAction::PrintVersion => {
            println!("emberd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
    };

    logging::init(logging::LogConfig {
        level: config.log_level,
        format: config.log_format,
        timestamps: config.log_timestamps,
    });

    let mut params = chain_params(config.network);
    if let Some(mode) = config.checkpoint_mode {
        params.consensus.checkpoint_mode = mode;
    }

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|err| format!("failed to create {}: {err}", config.data_dir.display()))?;

    let checkpoint_master = config
        .checkpoint_key
        .as_ref()
        .map(|key| holds_checkpoint_key(key, params.consensus.checkpoint_public_key))
        .unwrap_or(false);
    if config.checkpoint_key.is_some() && !checkpoint_master {
        return Err("checkpoint key does not match the network checkpoint public key".into());
    }

    let rpc_addr = config
        .rpc_addr
        .unwrap_or_else(|| default_rpc_addr(config.network));
    let rpc_auth = rpc::load_or_create_auth(
        config.rpc_user.clone(),
        config.rpc_pass.clone(),
        &config.data_dir,
    )?;

    let store = Arc::new(MemoryBlockStore::new());
    let state = Arc::new(RwLock::new(ChainState::new(params, store)));
    let pool = Arc::new(Mutex::new(Mempool::default()));
    logging::log_info!(
        "initialized chain state on {}",
        config.network.name()
    );

    let ctx = RpcContext {
        state,
        mempool: pool,
        checkpoint_master,
    };
    let rpc_task = tokio::spawn(rpc::serve_rpc(rpc_addr, rpc_auth, ctx));

    tokio::select! {
        result = rpc_task => match result {
            Ok(inner) => inner,
            Err(err) => Err(format!("rpc task failed: {err}")),
        },
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| format!("signal handler failed: {err}"))?;
            logging::log_info!("shutdown requested");
            Ok(())
        }
    }
}

fn holds_checkpoint_key(secret: &SecretKey, trusted_hex: &str) -> bool {
    let secp = Secp256k1::signing_only();
    let public = PublicKey::from_secret_key(&secp, secret);
    let mut encoded = String::with_capacity(66);
    for byte in public.serialize() {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded == trusted_hex.to_ascii_lowercase()
}

fn default_rpc_addr(network: Network) -> SocketAddr {
    let port = match network {
        Network::Mainnet => MAINNET_RPC_PORT,
        Network::Testnet => TESTNET_RPC_PORT,
        Network::Regtest => REGTEST_RPC_PORT,
    };
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

fn parse_args() -> Result<CliAction, String> {
    parse_args_from(std::env::args().skip(1))
}

fn parse_args_from<I>(raw_args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut network = Network::Mainnet;
    let mut data_dir: Option<PathBuf> = None;
    let mut rpc_addr: Option<SocketAddr> = None;
    let mut rpc_user: Option<String> = None;
    let mut rpc_pass: Option<String> = None;
    let mut checkpoint_mode: Option<CheckpointMode> = None;
    let mut checkpoint_key: Option<SecretKey> = None;
    let mut log_level = logging::Level::Info;
    let mut log_format = logging::Format::Text;
    let mut log_timestamps = true;

    let mut args = raw_args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliAction::PrintHelp),
            "--version" | "-V" => return Ok(CliAction::PrintVersion),
            "--network" => {
                let value = expect_value(&mut args, "--network")?;
                network = match value.as_str() {
                    "mainnet" | "main" => Network::Mainnet,
                    "testnet" => Network::Testnet,
                    "regtest" => Network::Regtest,
                    other => return Err(format!("unknown network '{other}'\n{}", usage())),
                };
            }
            "--data-dir" => {
                data_dir = Some(PathBuf::from(expect_value(&mut args, "--data-dir")?));
            }
            "--rpc-addr" => {
                let value = expect_value(&mut args, "--rpc-addr")?;
                rpc_addr = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid rpc addr '{value}'\n{}", usage()))?,
                );
            }
            "--rpc-user" => {
                rpc_user = Some(expect_value(&mut args, "--rpc-user")?);
            }
            "--rpc-pass" => {
                rpc_pass = Some(expect_value(&mut args, "--rpc-pass")?);
            }
            "--checkpoint-mode" => {
                let value = expect_value(&mut args, "--checkpoint-mode")?;
                checkpoint_mode = Some(
                    CheckpointMode::parse(&value)
                        .ok_or_else(|| format!("invalid checkpoint mode '{value}'\n{}", usage()))?,
                );
            }
            "--checkpoint-key" => {
                let value = expect_value(&mut args, "--checkpoint-key")?;
                let bytes = decode_hex(&value)
                    .ok_or_else(|| format!("invalid checkpoint key hex\n{}", usage()))?;
                checkpoint_key = Some(
                    SecretKey::from_slice(&bytes)
                        .map_err(|err| format!("invalid checkpoint key: {err}\n{}", usage()))?,
                );
            }
            "--log-level" => {
                let value = expect_value(&mut args, "--log-level")?;
                log_level = logging::Level::parse(&value)
                    .ok_or_else(|| format!("invalid log level '{value}'\n{}", usage()))?;
            }
            "--log-format" => {
                let value = expect_value(&mut args, "--log-format")?;
                log_format = logging::Format::parse(&value)
                    .ok_or_else(|| format!("invalid log format '{value}'\n{}", usage()))?;
            }
            "--no-log-timestamps" => {
                log_timestamps = false;
            }
            other => return Err(format!("unknown argument '{other}'\n{}", usage())),
        }
    }

    Ok(CliAction::Run(Config {
        network,
        data_dir: data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        rpc_addr,
        rpc_user,
        rpc_pass,
        checkpoint_mode,
        checkpoint_key,
        log_level,
        log_format,
        log_timestamps,
    }))
}

fn expect_value<I>(args: &mut I, flag: &str) -> Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| format!("missing value for {flag}\n{}", usage()))
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(input.len() / 2);
    for i in (0..input.len()).step_by(2) {
        out.push(u8::from_str_radix(input.get(i..i + 2)?, 16).ok()?);
    }
    Some(out)
}

fn usage() -> String {
    [
        "Usage: emberd [--network mainnet|testnet|regtest] [--data-dir PATH]",
        "              [--rpc-addr IP:PORT] [--rpc-user USER] [--rpc-pass PASS]",
        "              [--checkpoint-mode strict|advisory|permissive]",
        "              [--checkpoint-key HEX]",
        "              [--log-level error|warn|info|debug|trace]",
        "              [--log-format text|json] [--no-log-timestamps]",
        "",
        "  --rpc-addr        Bind JSON-RPC server (default: 127.0.0.1:17335 mainnet,",
        "                    27335 testnet, 18335 regtest)",
        "  --checkpoint-key  Secret key matching the network checkpoint public key;",
        "                    marks this node as the checkpoint master",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn defaults_without_flags() {
        let action = parse_args_from(args(&[])).expect("parse");
        let CliAction::Run(config) = action else {
            panic!("expected a run action");
        };
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(config.rpc_addr.is_none());
        assert!(config.log_timestamps);
    }

    #[test]
    fn network_and_rpc_flags() {
        let action = parse_args_from(args(&[
            "--network",
            "regtest",
            "--rpc-addr",
            "127.0.0.1:9999",
            "--checkpoint-mode",
            "advisory",
        ]))
        .expect("parse");
        let CliAction::Run(config) = action else {
            panic!("expected a run action");
        };
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(
            config.rpc_addr,
            Some("127.0.0.1:9999".parse().expect("addr"))
        );
        assert_eq!(config.checkpoint_mode, Some(CheckpointMode::Advisory));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse_args_from(args(&["--bogus"])).is_err());
    }

    #[test]
    fn checkpoint_key_holder_detection() {
        let secret = SecretKey::from_slice(&[0x11; 32]).expect("secret");
        let secp = Secp256k1::signing_only();
        let public = PublicKey::from_secret_key(&secp, &secret);
        let mut hex = String::new();
        for byte in public.serialize() {
            hex.push_str(&format!("{byte:02x}"));
        }
        assert!(holds_checkpoint_key(&secret, &hex));
        assert!(!holds_checkpoint_key(&secret, "02deadbeef"));
    }
}
